use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageError, ImageReader, Rgba, RgbImage, RgbaImage};
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

const JPEG_QUALITY: u8 = 85;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

// ---------------------------------------------------------------------------
// Thumbnail size
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbSize {
    pub const DEFAULT: ThumbSize = ThumbSize { width: 180, height: 180 };

    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl Default for ThumbSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ThumbSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ThumbSize {
    type Err = String;

    /// Parses `WxH`, e.g. `180x180`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("bad width {:?}: {}", w, e))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("bad height {:?}: {}", h, e))?;
        ThumbSize::new(width, height).ok_or_else(|| "dimensions must be non-zero".to_string())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that concern the cache as a whole. Per-image problems never show
/// up here; they turn into "no thumbnail" for that image.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot create cache directory {path:?}: {source}")]
    CacheRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clear cache {path:?}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
enum GenerateError {
    #[error("cannot read source: {0}")]
    Read(#[source] io::Error),
    #[error("cannot decode source: {0}")]
    Decode(#[source] ImageError),
    #[error("source has no pixels")]
    Empty,
    #[error("cannot encode thumbnail: {0}")]
    Encode(#[source] ImageError),
    #[error("cannot write thumbnail: {0}")]
    Write(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Cache usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub files: u64,
    pub bytes: u64,
}

impl CacheUsage {
    pub fn human_size(&self) -> String {
        human_size(self.bytes)
    }
}

/// `1536` -> `"1.5 KB"`. Units step by 1024 up to GB.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} GB", size)
}

// ---------------------------------------------------------------------------
// Cache engine
// ---------------------------------------------------------------------------

/// Content-addressed on-disk store of fixed-size letterboxed JPEG thumbnails.
///
/// Entries are keyed by `md5("{source}_{w}x{h}")` and live flat in `root` as
/// `<hex>.jpg`. An entry is never rewritten once it exists, even if the source
/// image changes afterwards.
#[derive(Debug)]
pub struct ThumbnailCache {
    root: PathBuf,
    generated: AtomicUsize,
}

impl ThumbnailCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generated: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of thumbnails this instance has encoded (cache hits excluded).
    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::Relaxed)
    }

    fn ensure_root(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root).map_err(|source| CacheError::CacheRoot {
            path: self.root.clone(),
            source,
        })
    }

    /// Where the thumbnail for `(source, size)` lives. Creates the cache root
    /// if needed but never touches the entry itself.
    pub fn cache_path(&self, source: &Path, size: ThumbSize) -> Result<PathBuf, CacheError> {
        self.ensure_root()?;
        Ok(self.root.join(format!("{}.jpg", cache_key(source, size))))
    }

    /// Return the cached thumbnail for `source`, generating it first on a miss.
    ///
    /// `Ok(None)` means this one image could not be thumbnailed (unreadable,
    /// corrupt, or the write failed). Only a broken cache root is an `Err`.
    pub fn ensure_thumbnail(
        &self,
        source: &Path,
        size: ThumbSize,
    ) -> Result<Option<PathBuf>, CacheError> {
        let cache_path = self.cache_path(source, size)?;
        if cache_path.exists() {
            return Ok(Some(cache_path));
        }

        match self.generate(source, size, &cache_path) {
            Ok(()) => {
                self.generated.fetch_add(1, Ordering::Relaxed);
                log::debug!("Generated thumbnail {:?} -> {:?}", source, cache_path);
                Ok(Some(cache_path))
            }
            Err(e) => {
                log::warn!("Thumbnail error for {:?}: {}", source, e);
                Ok(None)
            }
        }
    }

    fn generate(&self, source: &Path, size: ThumbSize, dest: &Path) -> Result<(), GenerateError> {
        let img = ImageReader::open(source)
            .and_then(|r| r.with_guessed_format())
            .map_err(GenerateError::Read)?
            .decode()
            .map_err(GenerateError::Decode)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(GenerateError::Empty);
        }

        let thumb = letterbox(&img, size);

        // Publish by rename so a reader never sees a half-written entry.
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&self.root)
            .map_err(GenerateError::Write)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            thumb.write_with_encoder(encoder).map_err(GenerateError::Encode)?;
            writer.flush().map_err(GenerateError::Write)?;
        }
        tmp.persist(dest).map_err(|e| GenerateError::Write(e.error))?;
        Ok(())
    }

    /// Delete every entry by removing the root, then recreate it empty.
    /// A missing root is fine. On failure the root is left as far as deletion got.
    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Clear {
                    path: self.root.clone(),
                    source,
                });
            }
        }
        fs::create_dir_all(&self.root).map_err(|source| CacheError::Clear {
            path: self.root.clone(),
            source,
        })?;
        log::info!("Cleared thumbnail cache at {:?}", self.root);
        Ok(())
    }

    pub fn usage(&self) -> CacheUsage {
        let mut usage = CacheUsage::default();
        if !self.root.is_dir() {
            return usage;
        }
        for entry in WalkDir::new(&self.root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                usage.files += 1;
                usage.bytes += meta.len();
            }
        }
        usage
    }
}

/// Hex MD5 of `"{source}_{w}x{h}"`.
///
/// The path goes in as raw bytes so that distinct non-UTF-8 names never
/// collapse onto the same key.
pub fn cache_key(source: &Path, size: ThumbSize) -> String {
    let mut ctx = md5::Context::new();
    ctx.consume(source.as_os_str().as_encoded_bytes());
    ctx.consume(format!("_{}x{}", size.width, size.height));
    format!("{:x}", ctx.compute())
}

/// Size of `src_w x src_h` scaled uniformly to fit inside `size`.
pub fn fit_dimensions(src_w: u32, src_h: u32, size: ThumbSize) -> (u32, u32) {
    let ratio = (size.width as f64 / src_w as f64).min(size.height as f64 / src_h as f64);
    let w = ((src_w as f64 * ratio).round() as u32).clamp(1, size.width);
    let h = ((src_h as f64 * ratio).round() as u32).clamp(1, size.height);
    (w, h)
}

/// Resize `img` to fit `size` and center it on a white canvas of exactly `size`.
pub fn letterbox(img: &DynamicImage, size: ThumbSize) -> RgbImage {
    let (src_w, src_h) = img.dimensions();
    let (new_w, new_h) = fit_dimensions(src_w, src_h, size);
    let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(size.width, size.height, BACKGROUND);
    let x = (size.width - new_w) / 2;
    let y = (size.height - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);

    DynamicImage::ImageRgba8(canvas).to_rgb8()
}
