use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("could not open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not load image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("could not save preview {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

/// Uniform scale that makes an `img_w x img_h` image fit a `win_w x win_h` box.
pub fn fit_scale(img_w: f32, img_h: f32, win_w: f32, win_h: f32) -> f32 {
    (win_w / img_w).min(win_h / img_h)
}

/// Decode `path` and scale it to fit inside `box_w x box_h`, aspect kept.
pub fn render_preview(path: &Path, box_w: u32, box_h: u32) -> Result<DynamicImage, PreviewError> {
    let img = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| PreviewError::Open { path: path.to_path_buf(), source })?
        .decode()
        .map_err(|source| PreviewError::Decode { path: path.to_path_buf(), source })?;

    let scale = fit_scale(img.width() as f32, img.height() as f32, box_w as f32, box_h as f32);
    let w = ((img.width() as f32 * scale).round() as u32).clamp(1, box_w.max(1));
    let h = ((img.height() as f32 * scale).round() as u32).clamp(1, box_h.max(1));
    Ok(img.resize_exact(w, h, FilterType::Triangle))
}

pub fn save_preview(img: &DynamicImage, out: &Path) -> Result<(), PreviewError> {
    let result = match ImageFormat::from_path(out) {
        // JPEG has no alpha channel
        Ok(ImageFormat::Jpeg) => DynamicImage::ImageRgb8(img.to_rgb8()).save(out),
        _ => img.save(out),
    };
    result.map_err(|source| PreviewError::Save { path: out.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fit_scale() {
        assert_eq!(fit_scale(200.0, 100.0, 100.0, 100.0), 0.5);
        assert_eq!(fit_scale(100.0, 400.0, 100.0, 100.0), 0.25);
        assert_eq!(fit_scale(50.0, 50.0, 100.0, 200.0), 2.0);
    }

    #[test]
    fn preview_fits_box() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("wide.png");
        RgbaImage::from_pixel(800, 200, Rgba([1, 2, 3, 255])).save(&src).unwrap();

        let img = render_preview(&src, 400, 400).unwrap();
        assert_eq!(img.dimensions(), (400, 100));

        let out = dir.path().join("out.jpg");
        save_preview(&img, &out).unwrap();
        assert_eq!(image::open(&out).unwrap().dimensions(), (400, 100));
    }

    #[test]
    fn unreadable_source_reports_error() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.png");
        fs::write(&bad, b"xx").unwrap();
        assert!(matches!(render_preview(&bad, 10, 10), Err(PreviewError::Decode { .. })));
        assert!(matches!(
            render_preview(&dir.path().join("gone.png"), 10, 10),
            Err(PreviewError::Open { .. })
        ));
    }
}
