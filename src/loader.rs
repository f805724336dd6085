use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::thumbnail::{ThumbSize, ThumbnailCache};

/// Send a `Progress` event every this many images.
const PROGRESS_EVERY: usize = 50;

// ---------------------------------------------------------------------------
// Events from the worker to the interactive thread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailEvent {
    Ready { epoch: u64, index: usize, path: PathBuf },
    Progress { epoch: u64, done: usize, total: usize },
    Completed { epoch: u64, total: usize },
}

impl ThumbnailEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            ThumbnailEvent::Ready { epoch, .. }
            | ThumbnailEvent::Progress { epoch, .. }
            | ThumbnailEvent::Completed { epoch, .. } => *epoch,
        }
    }
}

// ---------------------------------------------------------------------------
// Background thumbnail worker
// ---------------------------------------------------------------------------

pub struct ThumbnailJob {
    pub cache: Arc<ThumbnailCache>,
    pub files: Arc<Vec<PathBuf>>,
    pub size: ThumbSize,
    /// The folder load this job belongs to.
    pub epoch: u64,
    /// The folder load currently on screen. Bumped by the owner on every load.
    pub current_epoch: Arc<AtomicU64>,
}

impl ThumbnailJob {
    fn is_current(&self) -> bool {
        self.current_epoch.load(Ordering::Acquire) == self.epoch
    }

    /// Fire and forget. Events for a superseded load are not sent, and a
    /// receiver that has gone away is ignored.
    fn publish(&self, tx: &Sender<ThumbnailEvent>, event: ThumbnailEvent) {
        if !self.is_current() {
            log::debug!("[epoch {}] dropping stale {:?}", self.epoch, event);
            return;
        }
        let _ = tx.send(event);
    }
}

/// Publishes the job's `Completed` when dropped, so the receiver leaves its
/// loading state even if generation unwinds part way through.
struct CompletionGuard<'a> {
    job: &'a ThumbnailJob,
    tx: &'a Sender<ThumbnailEvent>,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("[epoch {}] thumbnail worker panicked", self.job.epoch);
        }
        let total = self.job.files.len();
        self.job.publish(self.tx, ThumbnailEvent::Completed { epoch: self.job.epoch, total });
    }
}

/// Generate thumbnails for `job.files` one after another on a single thread.
///
/// Emits `Ready` per successful index in order, a `Progress` every
/// `PROGRESS_EVERY` images, and exactly one `Completed` at the end. The thread
/// always runs the whole list, even once its load has been superseded.
pub fn spawn_thumbnail_worker(job: ThumbnailJob, tx: Sender<ThumbnailEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        let _completion = CompletionGuard { job: &job, tx: &tx };
        let total = job.files.len();
        let start_time = Instant::now();
        let mut ready = 0;
        log::info!("[epoch {}] Generating thumbnails for {} images...", job.epoch, total);

        for (index, path) in job.files.iter().enumerate() {
            if index % PROGRESS_EVERY == 0 {
                let event = ThumbnailEvent::Progress { epoch: job.epoch, done: index, total };
                job.publish(&tx, event);
            }

            match job.cache.ensure_thumbnail(path, job.size) {
                Ok(Some(thumb)) => {
                    ready += 1;
                    let event = ThumbnailEvent::Ready { epoch: job.epoch, index, path: thumb };
                    job.publish(&tx, event);
                }
                Ok(None) => {}
                Err(e) => {
                    // Every remaining entry would hit the same wall
                    log::error!("[epoch {}] {}", job.epoch, e);
                    break;
                }
            }
        }

        log::info!(
            "[epoch {}] Thumbnails done in {:.2}s. {} of {} ready.",
            job.epoch,
            start_time.elapsed().as_secs_f64(),
            ready,
            total
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img{:03}.png", i));
                RgbImage::from_pixel(8 + i as u32, 8, Rgb([0, 0, 0])).save(&path).unwrap();
                path
            })
            .collect()
    }

    fn job(
        cache: Arc<ThumbnailCache>,
        files: Vec<PathBuf>,
        epoch: u64,
        current: &Arc<AtomicU64>,
    ) -> ThumbnailJob {
        ThumbnailJob {
            cache,
            files: Arc::new(files),
            size: ThumbSize::DEFAULT,
            epoch,
            current_epoch: Arc::clone(current),
        }
    }

    #[test]
    fn publishes_in_order_then_completes() {
        let dir = tempdir().unwrap();
        let mut files = write_images(dir.path(), 4);
        let broken = dir.path().join("broken.png");
        fs::write(&broken, b"nope").unwrap();
        files.insert(2, broken);

        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(7));
        let (tx, rx) = unbounded();
        spawn_thumbnail_worker(job(Arc::clone(&cache), files, 7, &current), tx)
            .join()
            .unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], ThumbnailEvent::Progress { epoch: 7, done: 0, total: 5 }));

        let ready: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ThumbnailEvent::Ready { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(ready, vec![0, 1, 3, 4]);
        assert_eq!(events.last(), Some(&ThumbnailEvent::Completed { epoch: 7, total: 5 }));
        assert_eq!(cache.generated_count(), 4);

        for e in &events {
            if let ThumbnailEvent::Ready { path, .. } = e {
                assert!(path.exists());
            }
        }
    }

    #[test]
    fn stale_worker_publishes_nothing_but_finishes() {
        let dir = tempdir().unwrap();
        let files = write_images(dir.path(), 3);
        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(2));
        let (tx, rx) = unbounded();

        spawn_thumbnail_worker(job(Arc::clone(&cache), files, 1, &current), tx)
            .join()
            .unwrap();

        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(cache.generated_count(), 3);
    }

    #[test]
    fn progress_every_fifty() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.png");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&src).unwrap();
        // Same source repeated: one encode, the rest are cache hits.
        let files = vec![src; 120];

        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();
        spawn_thumbnail_worker(job(Arc::clone(&cache), files, 0, &current), tx)
            .join()
            .unwrap();

        let progress: Vec<usize> = rx
            .try_iter()
            .filter_map(|e| match e {
                ThumbnailEvent::Progress { done, .. } => Some(done),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0, 50, 100]);
        assert_eq!(cache.generated_count(), 1);
    }

    #[test]
    fn broken_cache_root_still_completes() {
        let dir = tempdir().unwrap();
        let files = write_images(dir.path(), 2);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").unwrap();

        let cache = Arc::new(ThumbnailCache::new(blocker.join("cache")));
        let current = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();
        spawn_thumbnail_worker(job(cache, files, 0, &current), tx).join().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(!events.iter().any(|e| matches!(e, ThumbnailEvent::Ready { .. })));
        assert_eq!(events.last(), Some(&ThumbnailEvent::Completed { epoch: 0, total: 2 }));
    }

    #[test]
    fn panicking_worker_still_completes() {
        let dir = tempdir().unwrap();
        let files = write_images(dir.path(), 3);
        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(4));
        let job = job(cache, files, 4, &current);
        let (tx, rx) = unbounded();

        let handle = thread::spawn(move || {
            let _completion = CompletionGuard { job: &job, tx: &tx };
            panic!("decoder blew up");
        });
        assert!(handle.join().is_err());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events, vec![ThumbnailEvent::Completed { epoch: 4, total: 3 }]);
    }

    #[test]
    fn completion_is_sent_exactly_once() {
        let dir = tempdir().unwrap();
        let files = write_images(dir.path(), 2);
        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();
        spawn_thumbnail_worker(job(cache, files, 0, &current), tx).join().unwrap();

        let completed = rx
            .try_iter()
            .filter(|e| matches!(e, ThumbnailEvent::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let dir = tempdir().unwrap();
        let files = write_images(dir.path(), 2);
        let cache = Arc::new(ThumbnailCache::new(dir.path().join("cache")));
        let current = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();
        drop(rx);
        spawn_thumbnail_worker(job(cache, files, 0, &current), tx).join().unwrap();
    }
}
