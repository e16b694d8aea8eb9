//! Download one image.

use super::LocalSave;
use crate::fetch::Fetcher;
use crate::naming::filename_from_url;
use std::path::PathBuf;
use tracing::{error, info};

/// Fetch `url` and save it under the URL's last path segment.
///
/// Failures are logged and reported as `None`; a failed single download
/// never propagates into the caller.
pub async fn export_one(fetcher: &impl Fetcher, saver: &LocalSave, url: &str) -> Option<PathBuf> {
    let bytes = match fetcher.fetch(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(url, error = %e, "Download failed");
            return None;
        }
    };
    let filename = filename_from_url(url);
    let saver = saver.clone();
    let size = bytes.len();
    let saved = tokio::task::spawn_blocking(move || saver.save(&filename, &bytes)).await;
    match saved {
        Ok(Ok(path)) => {
            info!(url, path = %path.display(), bytes = size, "Saved image");
            Some(path)
        }
        Ok(Err(e)) => {
            error!(url, error = %e, "Saving download failed");
            None
        }
        Err(e) => {
            error!(url, error = %e, "Save worker failed");
            None
        }
    }
}
