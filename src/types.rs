//! Shared types read from the record store and derived from it.
//!
//! [`ImageRecord`] mirrors one row of the `images` table. The collection was
//! migrated between two storage backends over time, so a row carries either
//! a legacy `bucket` + `path` pair or a CDN `public_id` (usually with a
//! pre-computed URL set written at ingestion). [`ImageRecord::source`] turns
//! that union of optional columns into the tagged [`ImageSource`] so URL
//! resolution dispatches on one value instead of probing fields everywhere.

use serde::{Deserialize, Serialize};

/// Delivery URLs computed once at ingestion against the CDN transformation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecomputedUrls {
    pub original: String,
    pub w480: String,
    pub w960: String,
    pub w1280: String,
}

/// One photo's metadata as stored in the record store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, rename = "cloudinary_urls")]
    pub precomputed: Option<PrecomputedUrls>,
    #[serde(default)]
    pub title: Option<String>,
    /// Ascending display order. Gaps are allowed.
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Which origin backend produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// Raw object in legacy storage, rendered on demand by the storage service.
    Legacy { bucket: &'a str, path: &'a str },
    /// Asset on the CDN. At least one of `public_id` / `urls` is present.
    Transformed {
        public_id: Option<&'a str>,
        format: Option<&'a str>,
        urls: Option<&'a PrecomputedUrls>,
    },
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl ImageRecord {
    /// Classify the record by origin.
    ///
    /// A pre-computed URL set always wins; otherwise `bucket` + `path`, then a
    /// bare `public_id`. Returns `None` when the record matches neither shape.
    pub fn source(&self) -> Option<ImageSource<'_>> {
        let public_id = non_empty(&self.public_id);
        let format = non_empty(&self.format);
        if let Some(urls) = &self.precomputed {
            return Some(ImageSource::Transformed {
                public_id,
                format,
                urls: Some(urls),
            });
        }
        if let (Some(bucket), Some(path)) = (non_empty(&self.bucket), non_empty(&self.path)) {
            return Some(ImageSource::Legacy { bucket, path });
        }
        public_id.map(|public_id| ImageSource::Transformed {
            public_id: Some(public_id),
            format,
            urls: None,
        })
    }
}

/// The four delivery URLs of one image. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsiveUrlSet {
    pub thumb: String,
    pub medium: String,
    pub large: String,
    pub original: String,
}

/// Collection (event) metadata from the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// ISO date (`2023-09-24`) or timestamp; only the date part is displayed.
    pub event_date: String,
    #[serde(default)]
    pub hero_image_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
