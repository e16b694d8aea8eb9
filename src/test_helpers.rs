//! Shared test utilities for the event-gallery test suite.
//!
//! Provides record builders for both origin backends, a resolver wired to
//! test origins, a recording [`MockFetcher`], and zip readers for checking
//! produced archives.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let records = legacy_collection(3);
//! let fetcher = MockFetcher::new().failing(&["https://cdn.example/missing.jpg"]);
//! let urls = test_resolver("https://abc.supabase.co/storage/v1").resolve(&records[0]);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{ImagesConfig, OriginConfig};
use crate::fetch::{Fetcher, TransportError};
use crate::types::{CollectionMeta, ImageRecord, PrecomputedUrls};
use crate::urls::UrlResolver;

// =========================================================================
// Record builders
// =========================================================================

/// Record stored in legacy object storage.
pub fn legacy_record(id: &str, bucket: &str, path: &str) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        bucket: Some(bucket.to_string()),
        path: Some(path.to_string()),
        ..ImageRecord::default()
    }
}

/// CDN record with a pre-computed URL set derived from `public_id`.
pub fn precomputed_record(id: &str, public_id: &str) -> ImageRecord {
    let url = |variant: &str| format!("https://cdn.example/{variant}/{public_id}");
    ImageRecord {
        id: id.to_string(),
        public_id: Some(public_id.to_string()),
        precomputed: Some(PrecomputedUrls {
            original: url("original"),
            w480: url("w480"),
            w960: url("w960"),
            w1280: url("w1280"),
        }),
        ..ImageRecord::default()
    }
}

/// CDN record carrying only its public id.
pub fn public_id_record(id: &str, public_id: &str, format: Option<&str>) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        public_id: Some(public_id.to_string()),
        format: format.map(str::to_string),
        ..ImageRecord::default()
    }
}

/// Record with neither shape.
pub fn invalid_record(id: &str) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        ..ImageRecord::default()
    }
}

/// `n` legacy records `img-1..=n` at `event/img-001.jpg`… in display order.
pub fn legacy_collection(n: usize) -> Vec<ImageRecord> {
    (1..=n)
        .map(|i| {
            let mut record = legacy_record(&format!("img-{i}"), "gallery", &format!("event/img-{i:03}.jpg"));
            record.display_order = Some(i as i64);
            record.event_id = Some("e1".to_string());
            record
        })
        .collect()
}

/// Active collection titled after its slug, dated 2023-09-24.
pub fn collection_meta(id: &str, slug: &str) -> CollectionMeta {
    let mut chars = slug.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    CollectionMeta {
        id: id.to_string(),
        slug: slug.to_string(),
        title,
        subtitle: None,
        event_date: "2023-09-24".to_string(),
        hero_image_id: None,
        is_active: true,
    }
}

/// Resolver with stock presets against `storage_url` and `https://cdn.example`.
pub fn test_resolver(storage_url: &str) -> UrlResolver {
    let origin = OriginConfig {
        storage_url: storage_url.to_string(),
        cdn_url: "https://cdn.example".to_string(),
    };
    UrlResolver::new(&origin, &ImagesConfig::default())
}

// =========================================================================
// MockFetcher
// =========================================================================

/// Fetcher that records requests and serves deterministic payloads.
///
/// Failing URLs answer HTTP 404. Delays use `tokio::time::sleep`, so tests
/// with a paused clock run instantly.
#[derive(Default)]
pub struct MockFetcher {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, urls: &[&str]) -> Self {
        self.failing.extend(urls.iter().map(|u| u.to_string()));
        self
    }

    /// Fetching any of `urls` panics, crashing the task running it.
    pub fn panicking(mut self, urls: &[&str]) -> Self {
        self.panicking.extend(urls.iter().map(|u| u.to_string()));
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    /// Bytes served for `url`.
    pub fn payload(url: &str) -> Vec<u8> {
        format!("bytes of {url}").into_bytes()
    }

    /// Every requested URL in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.panicking.contains(url) {
            panic!("mock fetcher crashed on {url}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(Self::payload(url))
    }
}

// =========================================================================
// Archive readers
// =========================================================================

/// Names of the file entries in a zip, in archive order (directories skipped).
pub fn zip_file_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).unwrap();
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    names
}

/// Contents of one zip entry.
pub fn zip_entry(path: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}
