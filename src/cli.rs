use clap::Parser;
use std::path::PathBuf;

use crate::thumbnail::ThumbSize;

const CACHE_DIR_NAME: &str = ".image_previewer_cache";

#[derive(Parser, Debug)]
#[command(name = "ipv", about = "Browse an image folder through a cached thumbnail index")]
pub struct Cli {
    /// Folder to scan for images (searched recursively)
    pub folder: Option<PathBuf>,

    /// Thumbnail cache directory. Default: ~/.image_previewer_cache
    #[arg(long, env = "IPV_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Thumbnail size as WIDTHxHEIGHT
    #[arg(short, long, default_value_t = ThumbSize::DEFAULT)]
    pub size: ThumbSize,

    /// Follow symbolic links while scanning
    #[arg(long)]
    pub follow_links: bool,

    /// Print every image with its thumbnail path once loading finishes
    #[arg(short, long)]
    pub list: bool,

    /// Render a scale-to-fit preview of the image at this index (0-based)
    #[arg(short, long, value_name = "INDEX", requires_all = ["folder", "output"])]
    pub preview: Option<usize>,

    /// Box the preview is fitted into
    #[arg(long, default_value = "1200x750", value_name = "WxH")]
    pub fit: ThumbSize,

    /// Where to write the preview
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Delete all cached thumbnails before doing anything else
    #[arg(long)]
    pub clear_cache: bool,

    /// Print cache location and size
    #[arg(long)]
    pub cache_info: bool,
}

impl Cli {
    pub fn cache_root(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(default_cache_root)
    }
}

pub fn default_cache_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CACHE_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["ipv", "/photos"]).unwrap();
        assert_eq!(cli.folder, Some(PathBuf::from("/photos")));
        assert_eq!(cli.size, ThumbSize::DEFAULT);
        assert_eq!(cli.fit, ThumbSize::new(1200, 750).unwrap());
        assert!(!cli.list && !cli.clear_cache && !cli.follow_links);
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let cli = Cli::try_parse_from(["ipv", "--cache-dir", "/tmp/c", "-s", "64x48"]).unwrap();
        assert_eq!(cli.cache_root(), Some(PathBuf::from("/tmp/c")));
        assert_eq!(cli.size, ThumbSize::new(64, 48).unwrap());
    }

    #[test]
    fn preview_needs_folder_and_output() {
        assert!(Cli::try_parse_from(["ipv", "--preview", "0"]).is_err());
        assert!(Cli::try_parse_from(["ipv", "/photos", "--preview", "0"]).is_err());
        assert!(Cli::try_parse_from(["ipv", "/photos", "-p", "0", "-o", "out.jpg"]).is_ok());
    }

    #[test]
    fn bad_size_is_rejected() {
        assert!(Cli::try_parse_from(["ipv", "-s", "0x0"]).is_err());
        assert!(Cli::try_parse_from(["ipv", "-s", "big"]).is_err());
    }
}
