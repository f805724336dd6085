use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::files::collect_images;
use crate::loader::{ThumbnailEvent, ThumbnailJob, spawn_thumbnail_worker};
use crate::thumbnail::{CacheError, ThumbSize, ThumbnailCache};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub index: usize,
    pub path: PathBuf,
}

impl ImageRecord {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No supported images in the folder.
    Empty,
    /// Every thumbnail was already on disk; nothing runs in the background.
    Cached(usize),
    /// A worker is generating thumbnails; drain events to fill the slots.
    Pending(usize),
}

// ---------------------------------------------------------------------------
// Browser state (lives on the interactive thread)
// ---------------------------------------------------------------------------

pub struct Browser {
    cache: Arc<ThumbnailCache>,
    size: ThumbSize,
    follow_links: bool,

    folder: Option<PathBuf>,
    records: Vec<ImageRecord>,
    /// One slot per record. `None` until the worker reports it, or forever if
    /// the image could not be thumbnailed.
    thumbnails: Vec<Option<PathBuf>>,
    pub current_index: Option<usize>,

    epoch: Arc<AtomicU64>,
    tx: Sender<ThumbnailEvent>,
    rx: Receiver<ThumbnailEvent>,
    loading: bool,
    status: String,
}

impl Browser {
    pub fn new(cache: Arc<ThumbnailCache>, size: ThumbSize, follow_links: bool) -> Self {
        let (tx, rx) = unbounded();
        Self {
            cache,
            size,
            follow_links,
            folder: None,
            records: Vec::new(),
            thumbnails: Vec::new(),
            current_index: None,
            epoch: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            loading: false,
            status: "Select an image folder".to_string(),
        }
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn thumbnail(&self, index: usize) -> Option<&Path> {
        self.thumbnails.get(index).and_then(|t| t.as_deref())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    /// Replace the current collection with the images under `folder`.
    ///
    /// Any worker still running for a previous folder keeps going, but from
    /// here on its events are stale and get dropped.
    pub fn load_folder(&mut self, folder: &Path) -> Result<LoadOutcome, CacheError> {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.folder = Some(folder.to_path_buf());
        self.records.clear();
        self.thumbnails.clear();
        self.current_index = None;
        self.loading = false;

        let paths = collect_images(folder, self.follow_links);
        if paths.is_empty() {
            self.status = "No supported images found in this folder.".to_string();
            return Ok(LoadOutcome::Empty);
        }

        // Fast path: everything is on disk already. Records stay empty until
        // the cache root is known to work, so they never outnumber the slots.
        let count = paths.len();
        let mut cached = Vec::with_capacity(count);
        for path in &paths {
            let cache_path = match self.cache.cache_path(path, self.size) {
                Ok(p) => p,
                Err(e) => {
                    self.status = format!("Thumbnail cache unavailable: {}", e);
                    return Err(e);
                }
            };
            if !cache_path.is_file() {
                break;
            }
            cached.push(Some(cache_path));
        }

        self.records = paths
            .iter()
            .enumerate()
            .map(|(index, path)| ImageRecord { index, path: path.clone() })
            .collect();
        if cached.len() == count {
            self.thumbnails = cached;
            self.status = format!("Ready: {} images (cached)", count);
            log::info!("[epoch {}] All {} thumbnails cached", epoch, count);
            return Ok(LoadOutcome::Cached(count));
        }

        self.thumbnails = vec![None; count];
        self.loading = true;
        self.status = format!("Found {} images, loading thumbnails...", count);

        let job = ThumbnailJob {
            cache: Arc::clone(&self.cache),
            files: Arc::new(paths),
            size: self.size,
            epoch,
            current_epoch: Arc::clone(&self.epoch),
        };
        spawn_thumbnail_worker(job, self.tx.clone());
        Ok(LoadOutcome::Pending(count))
    }

    /// Apply one worker event. Returns false if it was dropped as stale.
    pub fn apply(&mut self, event: ThumbnailEvent) -> bool {
        let current = self.epoch();
        if event.epoch() != current {
            log::debug!("Dropping event from epoch {} (current {})", event.epoch(), current);
            return false;
        }

        match event {
            ThumbnailEvent::Ready { index, path, .. } => {
                let len = self.thumbnails.len();
                match self.thumbnails.get_mut(index) {
                    Some(slot) => {
                        *slot = Some(path);
                        true
                    }
                    None => {
                        log::debug!("Dropping thumbnail for index {} (have {})", index, len);
                        false
                    }
                }
            }
            ThumbnailEvent::Progress { done, total, .. } => {
                self.status = format!("Processed {}/{} images...", done, total);
                true
            }
            ThumbnailEvent::Completed { total, .. } => {
                self.loading = false;
                self.status = format!("Thumbnails loaded, {} images", total);
                true
            }
        }
    }

    /// Apply whatever has arrived so far without blocking.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Block for the next event and apply it. False if the channel is closed.
    pub fn recv(&mut self) -> bool {
        match self.rx.recv() {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Block until the current load reports completion.
    pub fn wait_until_loaded(&mut self) {
        while self.loading && self.recv() {}
    }

    // ------------------------------------------------------------------
    // Paging
    // ------------------------------------------------------------------

    pub fn show(&mut self, index: usize) -> Option<&ImageRecord> {
        let record = self.records.get(index)?;
        self.current_index = Some(index);
        self.status = format!("{} / {} - {}", index + 1, self.records.len(), record.file_name());
        Some(record)
    }

    pub fn has_prev(&self) -> bool {
        matches!(self.current_index, Some(i) if i > 0)
    }

    pub fn has_next(&self) -> bool {
        matches!(self.current_index, Some(i) if i + 1 < self.records.len())
    }

    pub fn show_prev(&mut self) -> Option<&ImageRecord> {
        let i = self.current_index.filter(|_| self.has_prev())?;
        self.show(i - 1)
    }

    pub fn show_next(&mut self) -> Option<&ImageRecord> {
        let i = self.current_index.filter(|_| self.has_next())?;
        self.show(i + 1)
    }

    /// Wipe the on-disk cache, then reload the current folder so its
    /// thumbnails are regenerated.
    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        self.cache.clear()?;
        self.status = "Thumbnail cache cleared.".to_string();
        if let Some(folder) = self.folder.clone() {
            if folder.is_dir() {
                self.load_folder(&folder)?;
            }
        }
        Ok(())
    }
}
