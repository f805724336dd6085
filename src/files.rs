use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect supported images under `root`, sorted by full path.
///
/// A missing or empty directory yields an empty list. Entries that cannot be
/// read are skipped.
pub fn collect_images(root: &Path, follow_links: bool) -> Vec<PathBuf> {
    let start_time = Instant::now();

    let root = match std::path::absolute(root) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("Cannot resolve {:?}: {}", root, e);
            return Vec::new();
        }
    };
    if !root.is_dir() {
        log::debug!("{:?} is not a directory", root);
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .follow_links(follow_links)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| e.into_path())
        .collect();

    // Walk order is filesystem dependent. Compare whole path strings, not
    // components, so "a-b/x" sorts before "a/x".
    files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    log::info!(
        "Scanned {:?} in {:.2}s. Found {} images.",
        root,
        start_time.elapsed().as_secs_f64(),
        files.len()
    );
    files
}
