//! Filename and title derivation.
//!
//! Every name this crate writes to disk or into an archive comes from here:
//!
//! - single downloads are named after the last path segment of their URL
//!   (`https://…/public/gallery/dsc_001.jpg?width=480` → `dsc_001.jpg`)
//! - archive entries are named after the record's public id or storage path,
//!   falling back to `image-{n}.jpg`
//! - archives are named after the collection slug (`{slug}-gallery.zip`)
//!
//! ## Display Titles
//!
//! Records without a title get one from their filename, the same way the
//! ingestion scripts derive titles: extension stripped, dashes to spaces.
//! - `sunset-over-the-river.jpg` → "sunset over the river"
//! - `events/maite/IMG_0042` → "IMG_0042"

use crate::types::{ImageRecord, ImageSource};
use std::path::Path;

/// Filename used when a URL has no usable last segment.
pub const FALLBACK_DOWNLOAD_NAME: &str = "image.jpg";

/// Last `/`-separated component of `value`, if it is a usable filename.
fn last_component(value: &str) -> Option<&str> {
    value
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Suggested filename for a single download of `url`.
///
/// Query string and fragment are ignored. URLs without a path segment
/// (`https://host/`) fall back to [`FALLBACK_DOWNLOAD_NAME`].
pub fn filename_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };
    last_component(path)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_DOWNLOAD_NAME.to_string())
}

/// Name of the archive entry for `record` at zero-based `index`.
///
/// Public ids carry no extension on the CDN, so the record's `format` is
/// appended when the last component has none.
pub fn archive_entry_name(record: &ImageRecord, index: usize) -> String {
    let from_public_id = record
        .public_id
        .as_deref()
        .and_then(last_component)
        .map(|name| match record.format.as_deref() {
            Some(format) if Path::new(name).extension().is_none() && !format.is_empty() => {
                format!("{name}.{format}")
            }
            _ => name.to_string(),
        });
    from_public_id
        .or_else(|| record.path.as_deref().and_then(last_component).map(str::to_string))
        .unwrap_or_else(|| format!("image-{}.jpg", index + 1))
}

/// Make a collection slug safe to use as a file or folder name.
pub fn safe_slug(slug: &str) -> String {
    let cleaned: String = slug
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "gallery".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{slug}-gallery.zip`
pub fn archive_filename(slug: &str) -> String {
    format!("{}-gallery.zip", safe_slug(slug))
}

/// Folder inside the archive that holds every entry: `{slug}-photos`.
pub fn archive_folder(slug: &str) -> String {
    format!("{}-photos", safe_slug(slug))
}

/// Turn a filename into a display title: extension stripped, dashes → spaces.
pub fn title_from_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    stem.replace('-', " ")
}

/// Title to show for a record: its own title, else one derived from its filename.
pub fn display_title(record: &ImageRecord) -> Option<String> {
    if let Some(title) = record.title.as_deref().filter(|t| !t.trim().is_empty()) {
        return Some(title.to_string());
    }
    let name = match record.source()? {
        ImageSource::Legacy { path, .. } => last_component(path)?,
        ImageSource::Transformed { public_id, .. } => last_component(public_id?)?,
    };
    Some(title_from_filename(name))
}
