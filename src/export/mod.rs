//! Saving remote images as local files.
//!
//! Two exporters share the pieces in this module:
//!
//! - [`single`] downloads one image to a file named after its URL
//! - [`archive`] downloads a whole collection into one zip archive
//!
//! Both write through a transient reference ([`LocalSave::transient`]): a
//! temporary file in the destination directory that only becomes visible
//! under its final name when [`LocalSave::commit`] succeeds. A transient that
//! is dropped on an error path is deleted, so failed or cancelled exports
//! never leave partial files behind.

pub mod archive;
pub mod single;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use tokio::sync::Notify;

pub use archive::{
    ArchiveExporter, ArchiveJob, ExportError, ExportEvent, ExportOutcome, ExportSettings, ExportSummary,
};
pub use single::export_one;

/// Destination directory for saved files.
#[derive(Debug, Clone)]
pub struct LocalSave {
    dir: PathBuf,
}

impl LocalSave {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate a transient reference in the destination directory.
    pub fn transient(&self) -> io::Result<NamedTempFile> {
        std::fs::create_dir_all(&self.dir)?;
        tempfile::Builder::new()
            .prefix(".event-gallery-")
            .suffix(".part")
            .tempfile_in(&self.dir)
    }

    /// Publish a transient under `filename`, replacing any existing file.
    pub fn commit(&self, transient: NamedTempFile, filename: &str) -> io::Result<PathBuf> {
        let dest = self.dir.join(filename);
        transient.persist(&dest).map_err(|e| e.error)?;
        Ok(dest)
    }

    /// Write `bytes` to `filename` through a transient reference.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut transient = self.transient()?;
        transient.write_all(bytes)?;
        transient.flush()?;
        self.commit(transient, filename)
    }
}

/// Cooperative cancellation shared between a caller and a running export.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
