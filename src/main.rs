use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use covergrid::album::Album;
use covergrid::browser::{BrowserDeps, CellImage, CellSurface, CoverGridBrowser};
use covergrid::config_persistence::{default_config_path, load_config_file, persist_config_file};
use covergrid::image_pipeline::FileCoverDecoder;
use covergrid::registry::{LibraryScope, RegistryPool};
use log::{info, warn};

const COVER_WAIT: Duration = Duration::from_secs(10);

/// Prints cells instead of drawing them.
#[derive(Default)]
struct ConsoleSurface {
    image: String,
    markup: String,
}

impl CellSurface for ConsoleSurface {
    fn set_image(&mut self, image: &CellImage) {
        self.image = match image {
            CellImage::Blank => String::new(),
            CellImage::Placeholder(_) => "[no cover]".to_string(),
            CellImage::Cover(cover) => format!("[{}x{}]", cover.width(), cover.height()),
        };
    }

    fn set_markup(&mut self, markup: &str) {
        self.markup = markup.replace('\n', " | ");
    }
}

struct Args {
    library: PathBuf,
    query: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut library = None;
    let mut query = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--query" => {
                query = Some(args.next().ok_or("--query needs text")?);
            }
            _ if library.is_none() => library = Some(PathBuf::from(arg)),
            other => return Err(format!("unexpected argument {:?}", other)),
        }
    }
    let library = library
        .ok_or("usage: covergrid <library.json> [--query TEXT] [--config covergrid.toml]")?;
    Ok(Args {
        library,
        query,
        config,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let args = parse_args()?;
    let config_path = args
        .config
        .or_else(default_config_path)
        .ok_or("no config directory available")?;
    let mut config = load_config_file(&config_path);

    let library_text = std::fs::read_to_string(&args.library)?;
    let albums: Vec<Album> = serde_json::from_str(&library_text)?;
    info!(
        "Loaded library snapshot. path={} albums={}",
        args.library.display(),
        albums.len()
    );

    let pool = RegistryPool::shared();
    let scope = LibraryScope::new(args.library.display().to_string());
    let registry = pool.acquire(&scope);
    registry.add_albums(albums);

    let decoder = FileCoverDecoder::new(config.browser.cover_size_px);
    let mut browser = CoverGridBrowser::new(
        pool,
        &scope,
        BrowserDeps::new(Arc::new(decoder)),
        &config.browser,
    );
    browser.restore(&config.browser);
    if let Some(query) = args.query.as_deref() {
        if !browser.filter_text(query) {
            warn!("Ignoring unparsable query {:?}", query);
        }
    }

    let row_count = browser.visible_rows().len();
    browser.request_visible_covers(0..row_count, 1.0);
    while browser.pending_cover_loads() > 0 {
        if browser.wait_for_cover_completion(COVER_WAIT).is_none() {
            warn!(
                "Gave up waiting for covers. pending={}",
                browser.pending_cover_loads()
            );
            break;
        }
    }

    let mut surface = ConsoleSurface::default();
    for row in browser.visible_rows().to_vec() {
        browser.render_cover_cell(&row, &mut surface);
        browser.render_text_cell(&row, &mut surface);
        let marker = if browser.is_selected(&row) { '*' } else { ' ' };
        println!("{} {:<12} {}", marker, surface.image, surface.markup);
    }

    browser.save(&mut config.browser);
    persist_config_file(&config, &config_path);
    Ok(())
}
