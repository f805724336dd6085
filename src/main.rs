use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use ipv::cli::Cli;
use ipv::thumbnail::ThumbnailCache;
use ipv::ui::App;
use ipv::ui::state::{Browser, LoadOutcome};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let Some(cache_root) = cli.cache_root() else {
        log::error!("Could not determine home directory. Pass --cache-dir.");
        return ExitCode::FAILURE;
    };
    let cache = Arc::new(ThumbnailCache::new(cache_root));

    if cli.cache_info {
        let usage = cache.usage();
        println!(
            "Cache: {} ({} files, {})",
            cache.root().display(),
            usage.files,
            usage.human_size()
        );
    }

    let mut app = App::new(Browser::new(Arc::clone(&cache), cli.size, cli.follow_links));

    if cli.clear_cache {
        let usage = cache.usage();
        if let Err(e) = app.state.clear_cache() {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
        println!("Cleared thumbnail cache ({} files, {}).", usage.files, usage.human_size());
    }

    let Some(folder) = cli.folder.as_deref() else {
        if cli.cache_info || cli.clear_cache {
            return ExitCode::SUCCESS;
        }
        log::error!("No folder given. See --help.");
        return ExitCode::FAILURE;
    };

    match app.open_folder(folder) {
        Ok(LoadOutcome::Empty) => return ExitCode::SUCCESS,
        Ok(_) => {}
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    if cli.list {
        app.print_listing();
    }

    if let (Some(index), Some(out)) = (cli.preview, cli.output.as_deref()) {
        match app.preview(index, cli.fit, out) {
            Ok(true) => {}
            Ok(false) => return ExitCode::FAILURE,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    log::info!(
        "{} images, {} thumbnails generated this run",
        app.state.len(),
        cache.generated_count()
    );
    ExitCode::SUCCESS
}
