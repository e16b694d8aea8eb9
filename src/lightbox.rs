//! Full-screen viewer navigation.
//!
//! The lightbox shows one image of a collection at large resolution and
//! wraps around at both ends. Every time the shown index changes, the large
//! renders of both neighbours start loading into a small warm cache so that
//! the next step in either direction is instant. Prefetches run as detached
//! tasks; navigation never waits for them.
//!
//! Input mapping:
//!
//! | Input | Action |
//! |-------|--------|
//! | Right arrow | next |
//! | Left arrow | previous |
//! | Escape | close |
//! | D | download the shown image's original |
//! | click on backdrop | close |
//! | click on image | nothing |

use crate::export::{LocalSave, export_one};
use crate::fetch::Fetcher;
use crate::types::{ImageRecord, ResponsiveUrlSet};
use crate::urls::UrlResolver;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Neighbour renders kept warm at once.
pub const WARM_CAPACITY: usize = 8;

/// `(i + 1) mod n`. Returns 0 for an empty collection.
pub fn next_index(index: usize, len: usize) -> usize {
    if len == 0 { 0 } else { (index + 1) % len }
}

/// `(i - 1 + n) mod n`. Returns 0 for an empty collection.
pub fn prev_index(index: usize, len: usize) -> usize {
    if len == 0 { 0 } else { (index + len - 1) % len }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightboxKey {
    Left,
    Right,
    Escape,
    Download,
    Other,
}

/// Where a pointer click landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// The displayed image itself.
    Image,
    /// Anywhere outside the image surface.
    Backdrop,
    /// Navigation or close buttons; handled by the host.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightboxAction {
    Show(usize),
    /// Save the original of the record at this index.
    Download(usize),
    Close,
    Ignore,
}

/// Navigation state over one collection's large renders.
#[derive(Debug, Clone)]
pub struct Lightbox {
    index: usize,
    /// Large URL per record; `None` for records that failed to resolve.
    urls: Vec<Option<String>>,
    originals: Vec<Option<String>>,
}

impl Lightbox {
    /// Open on `records[index]`. `None` when `index` is out of range.
    pub fn open(resolver: &UrlResolver, records: &[ImageRecord], index: usize) -> Option<Self> {
        let sets = records
            .iter()
            .map(|record| resolver.resolve(record).ok())
            .collect();
        Self::from_sets(sets, index)
    }

    pub fn from_sets(sets: Vec<Option<ResponsiveUrlSet>>, index: usize) -> Option<Self> {
        let (urls, originals) = sets
            .into_iter()
            .map(|set| match set {
                Some(set) => (Some(set.large), Some(set.original)),
                None => (None, None),
            })
            .unzip();
        Self::with_originals(urls, originals, index)
    }

    /// Large URLs only; nothing can be downloaded.
    pub fn from_urls(urls: Vec<Option<String>>, index: usize) -> Option<Self> {
        let originals = vec![None; urls.len()];
        Self::with_originals(urls, originals, index)
    }

    fn with_originals(urls: Vec<Option<String>>, originals: Vec<Option<String>>, index: usize) -> Option<Self> {
        (index < urls.len()).then_some(Self {
            index,
            urls,
            originals,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.url_at(self.index)
    }

    pub fn url_at(&self, index: usize) -> Option<&str> {
        self.urls.get(index).and_then(|url| url.as_deref())
    }

    pub fn original_at(&self, index: usize) -> Option<&str> {
        self.originals.get(index).and_then(|url| url.as_deref())
    }

    pub fn next(&mut self) -> usize {
        self.index = next_index(self.index, self.len());
        self.index
    }

    pub fn prev(&mut self) -> usize {
        self.index = prev_index(self.index, self.len());
        self.index
    }

    /// `"{i+1} / {n}"`
    pub fn position_label(&self) -> String {
        format!("{} / {}", self.index + 1, self.len())
    }

    /// Distinct neighbour indices, excluding the current one.
    pub fn neighbours(&self) -> Vec<usize> {
        let len = self.len();
        let mut out = Vec::with_capacity(2);
        for candidate in [prev_index(self.index, len), next_index(self.index, len)] {
            if candidate != self.index && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Large URLs of the neighbours that resolved.
    pub fn neighbour_urls(&self) -> Vec<String> {
        self.neighbours()
            .into_iter()
            .filter_map(|i| self.url_at(i).map(str::to_string))
            .collect()
    }

    pub fn handle_key(&mut self, key: LightboxKey) -> LightboxAction {
        match key {
            LightboxKey::Right => LightboxAction::Show(self.next()),
            LightboxKey::Left => LightboxAction::Show(self.prev()),
            LightboxKey::Escape => LightboxAction::Close,
            LightboxKey::Download => LightboxAction::Download(self.index),
            LightboxKey::Other => LightboxAction::Ignore,
        }
    }

    pub fn handle_click(&self, target: ClickTarget) -> LightboxAction {
        match target {
            ClickTarget::Backdrop => LightboxAction::Close,
            ClickTarget::Image | ClickTarget::Control => LightboxAction::Ignore,
        }
    }
}

#[derive(Debug)]
struct WarmCache {
    capacity: usize,
    entries: HashMap<String, Arc<Vec<u8>>>,
    order: VecDeque<String>,
    pending: HashSet<String>,
}

impl WarmCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            pending: HashSet::new(),
        }
    }

    /// Mark `url` as loading. `false` when it is already warm or loading.
    fn claim(&mut self, url: &str) -> bool {
        if self.entries.contains_key(url) || self.pending.contains(url) {
            return false;
        }
        self.pending.insert(url.to_string());
        true
    }

    fn fill(&mut self, url: String, bytes: Vec<u8>) {
        self.pending.remove(&url);
        if self.entries.insert(url.clone(), Arc::new(bytes)).is_none() {
            self.order.push_back(url);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                trace!(url = evicted, "Evicted from warm cache");
                self.entries.remove(&evicted);
            }
        }
    }

    fn release(&mut self, url: &str) {
        self.pending.remove(url);
    }
}

fn lock(cache: &Mutex<WarmCache>) -> MutexGuard<'_, WarmCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Loads URLs in the background into a bounded cache.
pub struct Prefetcher<F> {
    fetcher: Arc<F>,
    cache: Arc<Mutex<WarmCache>>,
}

impl<F: Fetcher + 'static> Prefetcher<F> {
    pub fn new(fetcher: Arc<F>, capacity: usize) -> Self {
        Self {
            fetcher,
            cache: Arc::new(Mutex::new(WarmCache::new(capacity))),
        }
    }

    /// Start loading `url` unless it is already warm or loading.
    ///
    /// Failures are logged and leave the URL cold, so a later call retries.
    pub fn warm(&self, url: &str) -> Option<JoinHandle<()>> {
        if !lock(&self.cache).claim(url) {
            trace!(url, "Already warm");
            return None;
        }
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let url = url.to_string();
        Some(tokio::spawn(async move {
            match fetcher.fetch(&url).await {
                Ok(bytes) => {
                    debug!(url, bytes = bytes.len(), "Prefetched");
                    lock(&cache).fill(url, bytes);
                }
                Err(e) => {
                    debug!(url, error = %e, "Prefetch failed");
                    lock(&cache).release(&url);
                }
            }
        }))
    }

    pub fn cached(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        lock(&self.cache).entries.get(url).cloned()
    }

    pub fn is_warm(&self, url: &str) -> bool {
        lock(&self.cache).entries.contains_key(url)
    }

    pub fn warm_count(&self) -> usize {
        lock(&self.cache).entries.len()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

/// A [`Lightbox`] that keeps its neighbours warm.
pub struct LightboxSession<F> {
    lightbox: Lightbox,
    prefetcher: Prefetcher<F>,
    inflight: Vec<JoinHandle<()>>,
}

impl<F: Fetcher + 'static> LightboxSession<F> {
    /// Must be called inside a tokio runtime; neighbour prefetches start immediately.
    pub fn new(lightbox: Lightbox, prefetcher: Prefetcher<F>) -> Self {
        let mut session = Self {
            lightbox,
            prefetcher,
            inflight: Vec::new(),
        };
        session.warm_neighbours();
        session
    }

    pub fn lightbox(&self) -> &Lightbox {
        &self.lightbox
    }

    pub fn prefetcher(&self) -> &Prefetcher<F> {
        &self.prefetcher
    }

    pub fn handle_key(&mut self, key: LightboxKey) -> LightboxAction {
        let action = self.lightbox.handle_key(key);
        if let LightboxAction::Show(index) = action {
            debug!(index, "Lightbox moved");
            self.warm_neighbours();
        }
        action
    }

    pub fn handle_click(&self, target: ClickTarget) -> LightboxAction {
        self.lightbox.handle_click(target)
    }

    /// Save the original of the record at `index` into `saver`'s directory.
    ///
    /// `None` when the record has no original or the download failed.
    pub async fn download(&self, index: usize, saver: &LocalSave) -> Option<PathBuf> {
        let Some(url) = self.lightbox.original_at(index) else {
            warn!(index, "No original to download");
            return None;
        };
        export_one(self.prefetcher.fetcher(), saver, url).await
    }

    /// Wait for outstanding prefetches.
    pub async fn settle(&mut self) {
        for handle in self.inflight.drain(..) {
            if let Err(e) = handle.await {
                debug!(error = %e, "Prefetch task ended abnormally");
            }
        }
    }

    fn warm_neighbours(&mut self) {
        self.inflight.retain(|handle| !handle.is_finished());
        for url in self.lightbox.neighbour_urls() {
            if let Some(handle) = self.prefetcher.warm(&url) {
                self.inflight.push(handle);
            }
        }
    }
}
