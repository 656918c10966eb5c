//! Album cover-grid browsing engine.
//!
//! Albums live in a registry shared by every view of a library. Each
//! [`browser::CoverGridBrowser`] filters and sorts its own rows, loads covers
//! lazily on a worker thread, and deduplicates cell drawing.

pub mod album;
pub mod album_text;
pub mod browser;
pub mod config;
pub mod config_persistence;
pub mod cover_loader;
pub mod filter;
pub mod image_pipeline;
pub mod ordering;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod render_cache;
pub mod selection;

pub use album::{Album, AlbumKey, CoverImage, GridRow, RowId, Song};
pub use browser::{BrowserDeps, CellImage, CellSurface, CoverGridBrowser};
pub use config::{BrowserConfig, Config, DisplaySettings};
pub use ordering::SortCriterion;
pub use registry::{AlbumRegistry, LibraryScope, RegistryHandle, RegistryPool};
