//! Record store access.
//!
//! Collections and image records live in a PostgREST-style HTTP API:
//!
//! ```text
//! GET {url}/rest/v1/events?is_active=eq.true&select=*&order=event_date.desc
//! GET {url}/rest/v1/events?slug=eq.{slug}&is_active=eq.true&select=*
//! GET {url}/rest/v1/images?event_id=eq.{id}&select=*&order=display_order.asc
//! HEAD {url}/rest/v1/images?event_id=eq.{id}&select=id      Prefer: count=exact
//! GET {url}/rest/v1/images?event_id=eq.{id}&select=*&order=display_order.asc&limit=1
//! ```
//!
//! The last two feed the collection index: a card needs the image count,
//! read from the `Content-Range` total, and one cover row, never the full
//! image list.
//!
//! Every request carries the public key twice, as `apikey` and as a bearer
//! token. The [`RecordStore`] trait is the seam for tests; [`RestStore`] is
//! the HTTP implementation.
//!
//! Store failures never reach the user as errors: [`load_gallery`] logs them
//! and degrades to [`Gallery::NotFound`] or [`Gallery::Empty`].

use crate::config::StoreConfig;
use crate::types::{CollectionMeta, ImageRecord};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store is not configured (set [store] url and anon_key)")]
    NotConfigured,
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} did not report a row count")]
    MissingCount { url: String },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only access to collections and their images.
pub trait RecordStore: Send + Sync {
    /// Active collections, newest first.
    fn collections(&self) -> impl Future<Output = Result<Vec<CollectionMeta>, StoreError>> + Send;

    /// The active collection with `slug`, if any.
    fn collection(&self, slug: &str) -> impl Future<Output = Result<Option<CollectionMeta>, StoreError>> + Send;

    /// Images of a collection in ascending display order.
    fn images(&self, collection_id: &str) -> impl Future<Output = Result<Vec<ImageRecord>, StoreError>> + Send;

    /// Number of images in a collection, without transferring them.
    fn image_count(&self, collection_id: &str) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// First image in display order.
    fn first_image(&self, collection_id: &str)
    -> impl Future<Output = Result<Option<ImageRecord>, StoreError>> + Send;
}

pub type Query = Vec<(&'static str, String)>;

pub fn collections_query() -> Query {
    vec![
        ("is_active", "eq.true".to_string()),
        ("select", "*".to_string()),
        ("order", "event_date.desc".to_string()),
    ]
}

pub fn collection_query(slug: &str) -> Query {
    vec![
        ("slug", format!("eq.{slug}")),
        ("is_active", "eq.true".to_string()),
        ("select", "*".to_string()),
    ]
}

pub fn images_query(collection_id: &str) -> Query {
    vec![
        ("event_id", format!("eq.{collection_id}")),
        ("select", "*".to_string()),
        ("order", "display_order.asc".to_string()),
    ]
}

pub fn image_count_query(collection_id: &str) -> Query {
    vec![
        ("event_id", format!("eq.{collection_id}")),
        ("select", "id".to_string()),
    ]
}

pub fn first_image_query(collection_id: &str) -> Query {
    let mut query = images_query(collection_id);
    query.push(("limit", "1".to_string()));
    query
}

/// Total from a `Content-Range` value such as `0-24/3573` or `*/0`.
pub fn content_range_total(value: &str) -> Option<usize> {
    value.split('/').nth(1).and_then(|total| total.trim().parse().ok())
}

/// [`RecordStore`] over the REST API.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl RestStore {
    pub fn new(client: reqwest::Client, config: &StoreConfig) -> Result<Self, StoreError> {
        if config.url.trim().is_empty() || config.anon_key.trim().is_empty() {
            return Err(StoreError::NotConfigured);
        }
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.anon_key.clone(),
        })
    }

    /// `{url}/rest/v1/{table}`
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Send an authenticated request and reject non-success statuses.
    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
            .map_err(|source| StoreError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table);
        debug!(url, ?query, "Querying record store");
        let response = self.send(&url, self.client.get(&url).query(query)).await?;
        let body = response.bytes().await.map_err(|source| StoreError::Request {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| StoreError::Decode { url, source })
    }

    async fn count(&self, table: &str, query: &Query) -> Result<usize, StoreError> {
        let url = self.table_url(table);
        debug!(url, ?query, "Counting rows");
        let request = self
            .client
            .head(&url)
            .query(query)
            .header("Prefer", "count=exact");
        let response = self.send(&url, request).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or(StoreError::MissingCount { url })
    }
}

impl RecordStore for RestStore {
    async fn collections(&self) -> Result<Vec<CollectionMeta>, StoreError> {
        self.get("events", &collections_query()).await
    }

    async fn collection(&self, slug: &str) -> Result<Option<CollectionMeta>, StoreError> {
        let rows: Vec<CollectionMeta> = self.get("events", &collection_query(slug)).await?;
        Ok(rows.into_iter().next())
    }

    async fn images(&self, collection_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        self.get("images", &images_query(collection_id)).await
    }

    async fn image_count(&self, collection_id: &str) -> Result<usize, StoreError> {
        self.count("images", &image_count_query(collection_id)).await
    }

    async fn first_image(&self, collection_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        let rows: Vec<ImageRecord> = self.get("images", &first_image_query(collection_id)).await?;
        Ok(rows.into_iter().next())
    }
}

/// What a gallery view renders.
#[derive(Debug, Clone, PartialEq)]
pub enum Gallery {
    /// No active collection with that slug (or the store was unreachable).
    NotFound,
    /// The collection exists but has no images.
    Empty(CollectionMeta),
    Ready {
        meta: CollectionMeta,
        images: Vec<ImageRecord>,
    },
}

impl Gallery {
    pub fn meta(&self) -> Option<&CollectionMeta> {
        match self {
            Gallery::NotFound => None,
            Gallery::Empty(meta) | Gallery::Ready { meta, .. } => Some(meta),
        }
    }

    pub fn images(&self) -> &[ImageRecord] {
        match self {
            Gallery::Ready { images, .. } => images,
            _ => &[],
        }
    }
}

/// Load a collection and its images.
pub async fn load_gallery(store: &impl RecordStore, slug: &str) -> Gallery {
    let meta = match store.collection(slug).await {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            warn!(slug, "No active collection");
            return Gallery::NotFound;
        }
        Err(e) => {
            error!(slug, error = %e, "Failed to load collection");
            return Gallery::NotFound;
        }
    };
    match store.images(&meta.id).await {
        Ok(images) if images.is_empty() => Gallery::Empty(meta),
        Ok(images) => {
            debug!(slug, count = images.len(), "Loaded images");
            Gallery::Ready { meta, images }
        }
        Err(e) => {
            error!(slug, error = %e, "Failed to load images");
            Gallery::Empty(meta)
        }
    }
}

/// One entry of the collection index.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionCard {
    pub meta: CollectionMeta,
    pub image_count: usize,
    /// First image in display order.
    pub cover: Option<ImageRecord>,
}

/// Active collections with their image counts and covers.
///
/// Each card costs one count query and one single-row query; cards are
/// loaded concurrently and returned in collection order. A card whose
/// queries fail shows zero images and no cover.
pub async fn load_collections<S: RecordStore + 'static>(store: Arc<S>) -> Vec<CollectionCard> {
    let collections = match store.collections().await {
        Ok(collections) => collections,
        Err(e) => {
            error!(error = %e, "Failed to load collections");
            return Vec::new();
        }
    };

    let mut tasks = JoinSet::new();
    for (index, meta) in collections.iter().enumerate() {
        let store = Arc::clone(&store);
        let id = meta.id.clone();
        let slug = meta.slug.clone();
        tasks.spawn(async move {
            let (count, cover) = tokio::join!(store.image_count(&id), store.first_image(&id));
            let count = count.unwrap_or_else(|e| {
                warn!(slug, error = %e, "Failed to count images for card");
                0
            });
            let cover = cover.unwrap_or_else(|e| {
                warn!(slug, error = %e, "Failed to load cover for card");
                None
            });
            (index, count, cover)
        });
    }

    let mut cards: Vec<CollectionCard> = collections
        .into_iter()
        .map(|meta| CollectionCard {
            meta,
            image_count: 0,
            cover: None,
        })
        .collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, image_count, cover)) => {
                if let Some(card) = cards.get_mut(index) {
                    card.image_count = image_count;
                    card.cover = cover;
                }
            }
            Err(e) => error!(error = %e, "Card task failed"),
        }
    }
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockStore {
        collections: Vec<CollectionMeta>,
        images: HashMap<String, Vec<ImageRecord>>,
        fail_collections: bool,
        fail_images: bool,
        /// Image rows handed out across all calls.
        rows_served: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockStore {
        fn rows(&self, collection_id: &str) -> Vec<ImageRecord> {
            self.images.get(collection_id).cloned().unwrap_or_default()
        }

        fn served(&self, rows: Vec<ImageRecord>) -> Vec<ImageRecord> {
            self.rows_served.fetch_add(rows.len(), Ordering::SeqCst);
            rows
        }
    }

    fn failure(table: &str) -> StoreError {
        StoreError::Status {
            url: format!("mock://{table}"),
            status: 500,
        }
    }

    impl RecordStore for MockStore {
        async fn collections(&self) -> Result<Vec<CollectionMeta>, StoreError> {
            if self.fail_collections {
                return Err(failure("events"));
            }
            Ok(self.collections.clone())
        }

        async fn collection(&self, slug: &str) -> Result<Option<CollectionMeta>, StoreError> {
            if self.fail_collections {
                return Err(failure("events"));
            }
            Ok(self.collections.iter().find(|c| c.slug == slug).cloned())
        }

        async fn images(&self, collection_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
            if self.fail_images {
                return Err(failure("images"));
            }
            Ok(self.served(self.rows(collection_id)))
        }

        async fn image_count(&self, collection_id: &str) -> Result<usize, StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_images {
                return Err(failure("images"));
            }
            Ok(self.rows(collection_id).len())
        }

        async fn first_image(&self, collection_id: &str) -> Result<Option<ImageRecord>, StoreError> {
            if self.fail_images {
                return Err(failure("images"));
            }
            let first: Vec<ImageRecord> = self.rows(collection_id).into_iter().take(1).collect();
            Ok(self.served(first).into_iter().next())
        }
    }

    fn store_with(images: usize) -> MockStore {
        let mut store = MockStore {
            collections: vec![collection_meta("e1", "maite")],
            ..MockStore::default()
        };
        store.images.insert("e1".into(), legacy_collection(images));
        store
    }

    // =========================================================================
    // Query building
    // =========================================================================

    #[test]
    fn collection_query_filters_slug_and_active() {
        assert_eq!(
            collection_query("maite"),
            vec![
                ("slug", "eq.maite".to_string()),
                ("is_active", "eq.true".to_string()),
                ("select", "*".to_string()),
            ]
        );
    }

    #[test]
    fn images_query_orders_by_display_order() {
        let query = images_query("e1");
        assert!(query.contains(&("event_id", "eq.e1".to_string())));
        assert!(query.contains(&("order", "display_order.asc".to_string())));
    }

    #[test]
    fn first_image_query_limits_to_one_row() {
        let query = first_image_query("e1");
        assert!(query.contains(&("order", "display_order.asc".to_string())));
        assert_eq!(query.last(), Some(&("limit", "1".to_string())));
        assert!(image_count_query("e1").contains(&("event_id", "eq.e1".to_string())));
    }

    #[test]
    fn content_range_total_parsing() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("*/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn rest_store_requires_url_and_key() {
        let config = StoreConfig {
            url: "https://abc.supabase.co".into(),
            anon_key: String::new(),
        };
        assert!(matches!(
            RestStore::new(reqwest::Client::new(), &config),
            Err(StoreError::NotConfigured)
        ));
    }

    #[test]
    fn table_url_trims_trailing_slash() {
        let config = StoreConfig {
            url: "https://abc.supabase.co/".into(),
            anon_key: "key".into(),
        };
        let store = RestStore::new(reqwest::Client::new(), &config).unwrap();
        assert_eq!(store.table_url("images"), "https://abc.supabase.co/rest/v1/images");
    }

    // =========================================================================
    // Gallery states
    // =========================================================================

    #[tokio::test]
    async fn ready_gallery_has_meta_and_images() {
        let gallery = load_gallery(&store_with(3), "maite").await;
        assert_eq!(gallery.meta().map(|m| m.id.as_str()), Some("e1"));
        assert_eq!(gallery.images().len(), 3);
        assert!(matches!(gallery, Gallery::Ready { .. }));
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        assert_eq!(load_gallery(&store_with(3), "nobody").await, Gallery::NotFound);
    }

    #[tokio::test]
    async fn collection_without_images_is_empty() {
        let gallery = load_gallery(&store_with(0), "maite").await;
        assert!(matches!(gallery, Gallery::Empty(_)));
        assert!(gallery.images().is_empty());
    }

    #[tokio::test]
    async fn store_failures_degrade_instead_of_erroring() {
        let mut store = store_with(2);
        store.fail_images = true;
        assert!(matches!(load_gallery(&store, "maite").await, Gallery::Empty(_)));
        store.fail_collections = true;
        assert_eq!(load_gallery(&store, "maite").await, Gallery::NotFound);
    }

    #[tokio::test]
    async fn unreachable_store_is_not_found() {
        let config = StoreConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: "key".into(),
        };
        let store = RestStore::new(reqwest::Client::new(), &config).unwrap();
        assert_eq!(load_gallery(&store, "maite").await, Gallery::NotFound);
    }

    // =========================================================================
    // Collection index
    // =========================================================================

    #[tokio::test]
    async fn cards_carry_count_and_first_image_as_cover() {
        let mut store = store_with(4);
        store.collections.push(collection_meta("e2", "empty"));
        let cards = load_collections(Arc::new(store)).await;
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].image_count, 4);
        assert_eq!(cards[0].cover.as_ref().map(|r| r.id.as_str()), Some("img-1"));
        assert_eq!(cards[1].image_count, 0);
        assert!(cards[1].cover.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cards_load_concurrently_without_transferring_image_lists() {
        let mut store = MockStore::default();
        for i in 1..=3 {
            let id = format!("e{i}");
            store.collections.push(collection_meta(&id, &format!("event-{i}")));
            store.images.insert(id, legacy_collection(800));
        }
        let store = Arc::new(store);

        let cards = load_collections(Arc::clone(&store)).await;

        let slugs: Vec<&str> = cards.iter().map(|c| c.meta.slug.as_str()).collect();
        assert_eq!(slugs, vec!["event-1", "event-2", "event-3"]);
        assert!(cards.iter().all(|c| c.image_count == 800));
        // one cover row per card
        assert_eq!(store.rows_served.load(Ordering::SeqCst), 3);
        assert!(store.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn failed_card_queries_leave_an_empty_card() {
        let mut store = store_with(4);
        store.fail_images = true;
        let cards = load_collections(Arc::new(store)).await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].image_count, 0);
        assert!(cards[0].cover.is_none());
    }

    #[tokio::test]
    async fn failed_index_is_empty() {
        let store = MockStore {
            fail_collections: true,
            ..MockStore::default()
        };
        assert!(load_collections(Arc::new(store)).await.is_empty());
    }
}
