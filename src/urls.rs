//! Delivery URL resolution.
//!
//! Every image is served at four resolutions: thumb, medium, large, and the
//! untouched original. How those URLs are built depends on the backend that
//! produced the record (see [`ImageSource`]):
//!
//! | Source | thumb / medium / large | original |
//! |--------|------------------------|----------|
//! | Transformed, pre-computed | `w480` / `w960` / `w1280` verbatim | `original` verbatim |
//! | Transformed, public id only | `{cdn}/image/upload/f_auto,q_auto,w_{w}/{id}` | `{cdn}/image/upload/{id}.{format}` |
//! | Legacy | `{storage}/render/image/public/{bucket}/{path}?width=&quality=&format=` | `{storage}/object/public/{bucket}/{path}` |
//!
//! CDN renders leave format and quality to the CDN, the same transformation
//! the ingestion step bakes into pre-computed URL sets.
//!
//! A record whose origin base is not configured is refused with
//! [`ResolveError::OriginNotConfigured`] rather than resolved to a relative
//! URL. Pre-computed URL sets need no base and always resolve.
//!
//! Resolution is a pure function of the record and the presets, so results
//! can be cached freely.

use crate::config::{ImagesConfig, OriginConfig, RenderFormat};
use crate::types::{ImageRecord, ImageSource, PrecomputedUrls, ResponsiveUrlSet};
use thiserror::Error;

/// The record has neither `bucket` + `path` nor a public id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("image record {id:?} has neither bucket+path nor a public id")]
pub struct InvalidImageRecordError {
    pub id: String,
}

/// Why a record could not be turned into delivery URLs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidRecord(#[from] InvalidImageRecordError),
    #[error("origin.{key} is not configured, cannot resolve image record {id:?}")]
    OriginNotConfigured { key: &'static str, id: String },
}

/// Width and quality of one rendered variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub quality: u32,
}

/// Collection cards use a mid-size cover render.
const COVER_SIZE: RenderSize = RenderSize {
    width: 800,
    quality: 80,
};

/// Builds delivery URLs from records. Constructed once from config.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    storage_url: Option<String>,
    cdn_url: Option<String>,
    images: ImagesConfig,
}

/// Trimmed base URL, `None` when blank.
fn base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl UrlResolver {
    pub fn new(origin: &OriginConfig, images: &ImagesConfig) -> Self {
        Self {
            storage_url: base_url(&origin.storage_url),
            cdn_url: base_url(&origin.cdn_url),
            images: images.clone(),
        }
    }

    /// Resolve the four delivery URLs of `record`.
    pub fn resolve(&self, record: &ImageRecord) -> Result<ResponsiveUrlSet, ResolveError> {
        let size = |width| RenderSize {
            width,
            quality: self.images.quality,
        };
        match self.source(record)? {
            ImageSource::Transformed {
                urls: Some(urls), ..
            } => Ok(precomputed_set(urls)),
            ImageSource::Transformed {
                public_id: Some(public_id),
                format,
                urls: None,
            } => {
                let cdn = self.cdn(record)?;
                Ok(ResponsiveUrlSet {
                    thumb: cdn_render_url(cdn, public_id, self.images.thumb_width),
                    medium: cdn_render_url(cdn, public_id, self.images.medium_width),
                    large: cdn_render_url(cdn, public_id, self.images.large_width),
                    original: cdn_original_url(cdn, public_id, format),
                })
            }
            ImageSource::Transformed {
                public_id: None,
                urls: None,
                ..
            } => Err(invalid(record).into()),
            ImageSource::Legacy { bucket, path } => {
                let storage = self.storage(record)?;
                Ok(ResponsiveUrlSet {
                    thumb: self.render_url(storage, bucket, path, size(self.images.thumb_width)),
                    medium: self.render_url(storage, bucket, path, size(self.images.medium_width)),
                    large: self.render_url(storage, bucket, path, size(self.images.large_width)),
                    original: object_url(storage, bucket, path),
                })
            }
        }
    }

    /// Fail with the first record whose origin base is missing.
    ///
    /// Malformed records are not reported here; they fail one by one when
    /// resolved.
    pub fn ensure_configured(&self, records: &[ImageRecord]) -> Result<(), ResolveError> {
        for record in records {
            match record.source() {
                Some(ImageSource::Legacy { .. }) => {
                    self.storage(record)?;
                }
                Some(ImageSource::Transformed {
                    public_id: Some(_),
                    urls: None,
                    ..
                }) => {
                    self.cdn(record)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Full-bleed hero render: pre-computed `w1280` when available, otherwise
    /// a render at hero width and the raised hero quality.
    pub fn hero_url(&self, record: &ImageRecord) -> Result<String, ResolveError> {
        let hero = RenderSize {
            width: self.images.hero_width,
            quality: self.images.hero_quality,
        };
        self.sized_url(record, hero, |urls| &urls.w1280)
    }

    /// Cover image for a collection card.
    pub fn cover_url(&self, record: &ImageRecord) -> Result<String, ResolveError> {
        self.sized_url(record, COVER_SIZE, |urls| &urls.w960)
    }

    /// `{storage}/render/image/public/{bucket}/{path}?width=&quality=&format=`
    ///
    /// With [`RenderFormat::Origin`] no transformation is requested and the
    /// raw object URL is returned instead.
    fn render_url(&self, storage: &str, bucket: &str, path: &str, size: RenderSize) -> String {
        match self.images.format {
            RenderFormat::Origin => object_url(storage, bucket, path),
            format => format!(
                "{}/render/image/public/{}/{}?width={}&quality={}&format={}",
                storage,
                bucket,
                path.trim_start_matches('/'),
                size.width,
                size.quality,
                format.as_str()
            ),
        }
    }

    fn storage(&self, record: &ImageRecord) -> Result<&str, ResolveError> {
        self.storage_url
            .as_deref()
            .ok_or_else(|| unconfigured("storage_url", record))
    }

    fn cdn(&self, record: &ImageRecord) -> Result<&str, ResolveError> {
        self.cdn_url.as_deref().ok_or_else(|| unconfigured("cdn_url", record))
    }

    fn sized_url(
        &self,
        record: &ImageRecord,
        size: RenderSize,
        pick: impl Fn(&PrecomputedUrls) -> &String,
    ) -> Result<String, ResolveError> {
        match self.source(record)? {
            ImageSource::Transformed {
                urls: Some(urls), ..
            } => Ok(pick(urls).clone()),
            ImageSource::Transformed {
                public_id: Some(public_id),
                ..
            } => Ok(cdn_render_url(self.cdn(record)?, public_id, size.width)),
            ImageSource::Transformed { .. } => Err(invalid(record).into()),
            ImageSource::Legacy { bucket, path } => {
                Ok(self.render_url(self.storage(record)?, bucket, path, size))
            }
        }
    }

    fn source<'a>(&self, record: &'a ImageRecord) -> Result<ImageSource<'a>, InvalidImageRecordError> {
        record.source().ok_or_else(|| invalid(record))
    }
}

fn invalid(record: &ImageRecord) -> InvalidImageRecordError {
    InvalidImageRecordError {
        id: record.id.clone(),
    }
}

fn unconfigured(key: &'static str, record: &ImageRecord) -> ResolveError {
    ResolveError::OriginNotConfigured {
        key,
        id: record.id.clone(),
    }
}

/// `{storage}/object/public/{bucket}/{path}`
fn object_url(storage: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/object/public/{}/{}",
        storage,
        bucket,
        path.trim_start_matches('/')
    )
}

fn cdn_render_url(cdn: &str, public_id: &str, width: u32) -> String {
    format!("{cdn}/image/upload/f_auto,q_auto,w_{width}/{public_id}")
}

fn cdn_original_url(cdn: &str, public_id: &str, format: Option<&str>) -> String {
    match format {
        Some(format) => format!("{cdn}/image/upload/{public_id}.{format}"),
        None => format!("{cdn}/image/upload/{public_id}"),
    }
}

fn precomputed_set(urls: &PrecomputedUrls) -> ResponsiveUrlSet {
    ResponsiveUrlSet {
        thumb: urls.w480.clone(),
        medium: urls.w960.clone(),
        large: urls.w1280.clone(),
        original: urls.original.clone(),
    }
}

/// The hero record of a collection: the one named by `hero_image_id`,
/// otherwise the first record.
pub fn pick_hero<'a>(records: &'a [ImageRecord], hero_image_id: Option<&str>) -> Option<&'a ImageRecord> {
    hero_image_id
        .and_then(|id| records.iter().find(|r| r.id == id))
        .or_else(|| records.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    const STORAGE: &str = "https://abc.supabase.co/storage/v1";

    fn resolver() -> UrlResolver {
        test_resolver(STORAGE)
    }

    // =========================================================================
    // Legacy storage records
    // =========================================================================

    #[test]
    fn legacy_thumb_uses_render_endpoint_with_presets() {
        let urls = resolver()
            .resolve(&legacy_record("1", "gallery", "a/b.jpg"))
            .unwrap();
        assert_eq!(
            urls.thumb,
            format!("{STORAGE}/render/image/public/gallery/a/b.jpg?width=480&quality=75&format=webp")
        );
        assert!(urls.thumb.ends_with("?width=480&quality=75&format=webp"));
        assert!(urls.medium.ends_with("?width=960&quality=75&format=webp"));
        assert!(urls.large.ends_with("?width=1280&quality=75&format=webp"));
    }

    #[test]
    fn legacy_original_has_no_query() {
        let urls = resolver()
            .resolve(&legacy_record("1", "gallery", "a/b.jpg"))
            .unwrap();
        assert_eq!(urls.original, format!("{STORAGE}/object/public/gallery/a/b.jpg"));
        assert!(!urls.original.contains('?'));
    }

    #[test]
    fn origin_format_disables_transformation() {
        let mut images = ImagesConfig::default();
        images.format = RenderFormat::Origin;
        let origin = OriginConfig {
            storage_url: STORAGE.into(),
            ..OriginConfig::default()
        };
        let urls = UrlResolver::new(&origin, &images)
            .resolve(&legacy_record("1", "gallery", "b.jpg"))
            .unwrap();
        assert_eq!(urls.thumb, urls.original);
        assert_eq!(urls.large, urls.original);
    }

    #[test]
    fn trailing_slash_on_storage_url_is_trimmed() {
        let urls = test_resolver("https://abc.supabase.co/storage/v1/")
            .resolve(&legacy_record("1", "gallery", "b.jpg"))
            .unwrap();
        assert_eq!(urls.original, format!("{STORAGE}/object/public/gallery/b.jpg"));
    }

    // =========================================================================
    // Transformed records
    // =========================================================================

    #[test]
    fn precomputed_urls_used_verbatim() {
        let record = precomputed_record("1", "plkv/IMG_0001");
        let stored = record.precomputed.clone().unwrap();
        let urls = resolver().resolve(&record).unwrap();
        assert_eq!(urls.thumb, stored.w480);
        assert_eq!(urls.medium, stored.w960);
        assert_eq!(urls.large, stored.w1280);
        assert_eq!(urls.original, stored.original);
    }

    #[test]
    fn bare_public_id_rendered_on_cdn() {
        let urls = resolver()
            .resolve(&public_id_record("1", "plkv/IMG_0002", Some("jpg")))
            .unwrap();
        assert_eq!(
            urls.thumb,
            "https://cdn.example/image/upload/f_auto,q_auto,w_480/plkv/IMG_0002"
        );
        assert_eq!(
            urls.large,
            "https://cdn.example/image/upload/f_auto,q_auto,w_1280/plkv/IMG_0002"
        );
        assert_eq!(urls.original, "https://cdn.example/image/upload/plkv/IMG_0002.jpg");
    }

    // =========================================================================
    // Unconfigured origins
    // =========================================================================

    fn unconfigured_resolver() -> UrlResolver {
        let origin = OriginConfig {
            storage_url: "  ".into(),
            cdn_url: String::new(),
        };
        UrlResolver::new(&origin, &ImagesConfig::default())
    }

    #[test]
    fn legacy_record_without_storage_url_is_refused() {
        let record = legacy_record("7", "gallery", "a/b.jpg");
        let expected = ResolveError::OriginNotConfigured {
            key: "storage_url",
            id: "7".into(),
        };
        assert_eq!(unconfigured_resolver().resolve(&record), Err(expected.clone()));
        assert_eq!(unconfigured_resolver().hero_url(&record), Err(expected));
    }

    #[test]
    fn public_id_record_without_cdn_url_is_refused() {
        let err = unconfigured_resolver()
            .resolve(&public_id_record("8", "plkv/x", Some("jpg")))
            .unwrap_err();
        assert!(matches!(err, ResolveError::OriginNotConfigured { key: "cdn_url", .. }));
        assert!(err.to_string().contains("origin.cdn_url"));
    }

    #[test]
    fn ensure_configured_reports_first_record_needing_a_base() {
        let records = vec![
            precomputed_record("1", "plkv/a"),
            invalid_record("2"),
            legacy_record("3", "gallery", "c.jpg"),
        ];
        assert_eq!(
            unconfigured_resolver().ensure_configured(&records),
            Err(ResolveError::OriginNotConfigured {
                key: "storage_url",
                id: "3".into()
            })
        );
        assert!(unconfigured_resolver().ensure_configured(&records[..2]).is_ok());
        assert!(resolver().ensure_configured(&records).is_ok());
    }

    #[test]
    fn precomputed_record_needs_no_origin() {
        let record = precomputed_record("9", "plkv/z");
        let urls = unconfigured_resolver().resolve(&record).unwrap();
        assert_eq!(urls.original, record.precomputed.unwrap().original);
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    #[test]
    fn resolve_is_deterministic() {
        let resolver = resolver();
        for record in [
            legacy_record("1", "gallery", "a/b.jpg"),
            precomputed_record("2", "plkv/x"),
            public_id_record("3", "plkv/y", None),
        ] {
            assert_eq!(resolver.resolve(&record), resolver.resolve(&record));
        }
    }

    #[test]
    fn record_without_either_shape_is_rejected() {
        let err = resolver().resolve(&invalid_record("broken-7")).unwrap_err();
        assert_eq!(
            err,
            ResolveError::InvalidRecord(InvalidImageRecordError {
                id: "broken-7".into()
            })
        );
        assert!(err.to_string().contains("broken-7"));
    }

    // =========================================================================
    // Hero and cover
    // =========================================================================

    #[test]
    fn hero_raises_quality_for_legacy_records() {
        let url = resolver()
            .hero_url(&legacy_record("1", "gallery", "hero.jpg"))
            .unwrap();
        assert!(url.ends_with("?width=1920&quality=85&format=webp"));
    }

    #[test]
    fn hero_prefers_precomputed_large() {
        let record = precomputed_record("1", "plkv/hero");
        let expected = record.precomputed.as_ref().unwrap().w1280.clone();
        assert_eq!(resolver().hero_url(&record).unwrap(), expected);
    }

    #[test]
    fn cover_uses_card_size() {
        let url = resolver()
            .cover_url(&legacy_record("1", "gallery", "c.jpg"))
            .unwrap();
        assert!(url.ends_with("?width=800&quality=80&format=webp"));
    }

    #[test]
    fn pick_hero_by_id_or_first() {
        let records = vec![
            legacy_record("a", "g", "1.jpg"),
            legacy_record("b", "g", "2.jpg"),
        ];
        assert_eq!(pick_hero(&records, Some("b")).map(|r| r.id.as_str()), Some("b"));
        assert_eq!(pick_hero(&records, Some("zzz")).map(|r| r.id.as_str()), Some("a"));
        assert_eq!(pick_hero(&records, None).map(|r| r.id.as_str()), Some("a"));
        assert!(pick_hero(&[], None).is_none());
    }
}
