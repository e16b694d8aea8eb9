//! Bulk export of a collection into one zip archive.
//!
//! The heaviest operation in the crate: one network round-trip per image,
//! then a single CPU-bound compression pass.
//!
//! ## Flow
//!
//! ```text
//! records ─▶ resolve original URL ─▶ semaphore-gated fetches ─▶ index slots
//!                                                                  │
//!        {slug}-gallery.zip ◀── persist ◀── deflate (blocking) ◀───┘
//! ```
//!
//! - **Re-entrancy**: an in-progress flag makes a second call while one is
//!   running return [`ExportOutcome::AlreadyRunning`] without touching the
//!   network. The flag is cleared by a guard on every exit path.
//! - **Ordering**: fetches overlap, but each result lands in the slot of its
//!   record, so archive entries follow collection order.
//! - **Failures**: an invalid record, an HTTP error, a timed-out fetch or a
//!   crashed fetch task skips that image and is counted; the batch carries
//!   on. Only a missing origin base (checked before any fetch) and
//!   serialization failures abort the export.
//! - **Cancellation**: a triggered [`CancelToken`] stops new fetches, aborts
//!   in-flight ones and drops everything accumulated so far.
//! - **Name collisions**: the later image wins and keeps the earlier entry's
//!   position.

use super::{CancelToken, LocalSave};
use crate::config::ExportConfig;
use crate::fetch::{Fetcher, TransportError};
use crate::naming;
use crate::types::ImageRecord;
use crate::urls::{ResolveError, UrlResolver};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive serialization failed: {0}")]
    Serialization(#[from] zip::result::ZipError),
    #[error("Archive worker failed: {0}")]
    Worker(#[from] JoinError),
    #[error(transparent)]
    Origin(#[from] ResolveError),
}

/// Tuning for one exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    /// Maximum simultaneous fetches.
    pub concurrency: usize,
    /// Per-image fetch timeout.
    pub timeout: Duration,
}

impl ExportSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            timeout: config.timeout(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Progress reported while an export runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Started { total: usize },
    ItemSaved { index: usize, name: String, bytes: usize },
    ItemFailed { index: usize, name: String, error: String },
    Serializing { entries: usize },
    Finished(ExportSummary),
    Cancelled,
}

/// Result of a completed export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Images fetched successfully.
    pub succeeded: usize,
    /// Images skipped (invalid record, transport error, timeout, crashed task).
    pub failed: usize,
    /// Entries in the archive; lower than `succeeded` when names collided.
    pub entries: usize,
    pub path: PathBuf,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} saved, {} skipped", self.succeeded, self.failed)?;
        if self.entries != self.succeeded {
            write!(f, " ({} entries after duplicate names)", self.entries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(ExportSummary),
    /// Another export was running; nothing was done.
    AlreadyRunning,
    /// Cancelled before serialization; nothing was written.
    Cancelled,
}

/// Entries of one export, accumulated in collection order.
#[derive(Debug)]
pub struct ArchiveJob {
    slots: Vec<Option<(String, Vec<u8>)>>,
    failed: usize,
}

impl ArchiveJob {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
            failed: 0,
        }
    }

    pub fn fill(&mut self, index: usize, name: String, bytes: Vec<u8>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some((name, bytes));
        }
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn succeeded(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Filled slots in collection order with duplicate names collapsed.
    pub fn into_entries(self) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (name, bytes) in self.slots.into_iter().flatten() {
            match positions.get(&name) {
                Some(&pos) => {
                    debug!(name, "Duplicate archive entry name, later image wins");
                    entries[pos].1 = bytes;
                }
                None => {
                    positions.insert(name.clone(), entries.len());
                    entries.push((name, bytes));
                }
            }
        }
        entries
    }
}

/// Clears the in-progress flag when dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct FetchedItem {
    index: usize,
    name: String,
    url: String,
    result: Result<Vec<u8>, TransportError>,
}

/// Exports whole collections. One instance per gallery view.
pub struct ArchiveExporter<F> {
    fetcher: Arc<F>,
    resolver: UrlResolver,
    saver: LocalSave,
    settings: ExportSettings,
    running: AtomicBool,
}

impl<F: Fetcher + 'static> ArchiveExporter<F> {
    pub fn new(fetcher: Arc<F>, resolver: UrlResolver, saver: LocalSave, settings: ExportSettings) -> Self {
        Self {
            fetcher,
            resolver,
            saver,
            settings,
            running: AtomicBool::new(false),
        }
    }

    /// Whether an export is in progress (drives the disabled trigger).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Fetch every record's original and save them as `{slug}-gallery.zip`.
    pub async fn export_all(
        &self,
        records: &[ImageRecord],
        slug: &str,
        cancel: &CancelToken,
        events: Option<&Sender<ExportEvent>>,
    ) -> Result<ExportOutcome, ExportError> {
        let Some(_running) = RunningGuard::acquire(&self.running) else {
            info!(slug, "Export already in progress, ignoring");
            return Ok(ExportOutcome::AlreadyRunning);
        };
        if let Err(e) = self.resolver.ensure_configured(records) {
            error!(slug, error = %e, "Refusing to export");
            return Err(e.into());
        }
        let emit = |event: ExportEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        info!(
            slug,
            total = records.len(),
            concurrency = self.settings.concurrency,
            "Starting archive export"
        );
        emit(ExportEvent::Started {
            total: records.len(),
        });

        let mut job = ArchiveJob::new(records.len());
        if !self.fetch_all(records, cancel, &mut job, &emit).await {
            info!(slug, "Export cancelled, discarding partial archive");
            emit(ExportEvent::Cancelled);
            return Ok(ExportOutcome::Cancelled);
        }

        let succeeded = job.succeeded();
        let failed = job.failed();
        let entries = job.into_entries();
        let entry_count = entries.len();
        emit(ExportEvent::Serializing {
            entries: entry_count,
        });

        let saver = self.saver.clone();
        let folder = naming::archive_folder(slug);
        let filename = naming::archive_filename(slug);
        let written =
            tokio::task::spawn_blocking(move || write_archive(&saver, &folder, &filename, entries))
                .await
                .map_err(ExportError::from)
                .and_then(|result| result);
        let path = match written {
            Ok(path) => path,
            Err(e) => {
                error!(slug, error = %e, "Failed to create archive");
                return Err(e);
            }
        };

        let summary = ExportSummary {
            succeeded,
            failed,
            entries: entry_count,
            path,
        };
        info!(
            slug,
            succeeded,
            failed,
            path = %summary.path.display(),
            "Archive saved"
        );
        emit(ExportEvent::Finished(summary.clone()));
        Ok(ExportOutcome::Completed(summary))
    }

    /// Run every fetch. Returns `false` when cancelled.
    async fn fetch_all(
        &self,
        records: &[ImageRecord],
        cancel: &CancelToken,
        job: &mut ArchiveJob,
        emit: &impl Fn(ExportEvent),
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        // Spawned but not yet collected, so crashed tasks can still be reported.
        let mut pending: HashMap<usize, String> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            let name = naming::archive_entry_name(record, index);
            let url = match self.resolver.resolve(record) {
                Ok(urls) => urls.original,
                Err(e) => {
                    warn!(index, error = %e, "Skipping invalid record");
                    job.fail();
                    emit(ExportEvent::ItemFailed {
                        index,
                        name,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return false;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            while let Some(joined) = tasks.try_join_next() {
                collect(joined, job, &mut pending, emit);
            }

            let fetcher = Arc::clone(&self.fetcher);
            let timeout = self.settings.timeout;
            pending.insert(index, name.clone());
            tasks.spawn(async move {
                let _permit = permit;
                let result = tokio::time::timeout(timeout, fetcher.fetch(&url)).await;
                let result = result.unwrap_or_else(|_| {
                    Err(TransportError::Timeout {
                        url: url.clone(),
                        after: timeout,
                    })
                });
                FetchedItem {
                    index,
                    name,
                    url,
                    result,
                }
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return false;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => collect(joined, job, &mut pending, emit),
                    None => break,
                },
            }
        }

        let mut crashed: Vec<(usize, String)> = pending.into_iter().collect();
        crashed.sort_unstable();
        for (index, name) in crashed {
            job.fail();
            emit(ExportEvent::ItemFailed {
                index,
                name,
                error: "fetch task failed".to_string(),
            });
        }
        true
    }
}

fn collect(
    joined: Result<FetchedItem, JoinError>,
    job: &mut ArchiveJob,
    pending: &mut HashMap<usize, String>,
    emit: &impl Fn(ExportEvent),
) {
    if let Ok(item) = &joined {
        pending.remove(&item.index);
    }
    match joined {
        Ok(FetchedItem {
            index,
            name,
            result: Ok(bytes),
            ..
        }) => {
            debug!(index, name, bytes = bytes.len(), "Fetched image");
            emit(ExportEvent::ItemSaved {
                index,
                name: name.clone(),
                bytes: bytes.len(),
            });
            job.fill(index, name, bytes);
        }
        Ok(FetchedItem {
            index,
            name,
            url,
            result: Err(e),
        }) => {
            warn!(index, url, error = %e, "Skipping image");
            job.fail();
            emit(ExportEvent::ItemFailed {
                index,
                name,
                error: e.to_string(),
            });
        }
        // Counted once every task has been joined, see `fetch_all`.
        Err(e) => error!(error = %e, "Fetch task failed"),
    }
}

/// Deflate `entries` under `folder/` and persist as `filename`.
fn write_archive(
    saver: &LocalSave,
    folder: &str,
    filename: &str,
    entries: Vec<(String, Vec<u8>)>,
) -> Result<PathBuf, ExportError> {
    let transient = saver.transient()?;
    let mut zip = ZipWriter::new(transient);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.add_directory(format!("{folder}/"), options)?;
    for (name, bytes) in entries {
        zip.start_file(format!("{folder}/{name}"), options)?;
        zip.write_all(&bytes)?;
    }
    let transient = zip.finish()?;
    Ok(saver.commit(transient, filename)?)
}
