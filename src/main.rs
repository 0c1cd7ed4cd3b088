use anyhow::anyhow;
use eframe::egui;
use egui::ViewportBuilder;
use image::ImageReader;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod books_client;
mod config;
mod db;
mod error;
mod models;
mod page_cache;
mod pagination;
mod text;
mod theme;

use crate::app::BookAtlasApp;
use crate::config::Config;
use crate::db::Database;
use crate::theme::AppTheme;

// Function to load an image as an icon
fn load_icon(path: &str) -> anyhow::Result<egui::IconData> {
    let img = ImageReader::open(path)?.decode()?;
    let rgba_image = img.into_rgba8();
    let (width, height) = rgba_image.dimensions();

    Ok(egui::IconData {
        rgba: rgba_image.into_raw(),
        width,
        height,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("book_atlas=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    match Database::open_default(config) {
        Ok(db) => {
            info!("opened cache database");
            Ok(db)
        }
        Err(e) => {
            // Keep running; cached pages just won't survive a restart
            error!("Failed to open database: {}", e);
            Ok(Database::in_memory()?)
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });
    let database = open_database(&config)?;
    let mut app = BookAtlasApp::new(config, database)?;

    let mut options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([720.0, 520.0])
            .with_title("BookAtlas"),
        ..Default::default()
    };
    match load_icon("logo/logo.png") {
        Ok(icon) => options.viewport.icon = Some(Arc::new(icon)),
        Err(e) => warn!("Failed to load icon: {}", e),
    }

    eframe::run_native(
        "BookAtlas",
        options,
        Box::new(move |cc| {
            if let Some(storage) = cc.storage {
                if let Some(is_dark_mode) = storage
                    .get_string("is_dark_mode")
                    .and_then(|s| s.parse::<bool>().ok())
                {
                    app.is_dark_mode = is_dark_mode;
                    app.theme = AppTheme::for_mode(is_dark_mode);
                }
            }
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow!("failed to start the window: {}", e))
}
