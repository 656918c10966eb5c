//! Notifications exchanged between the shared album registry and browser views.

use crate::album::{AlbumKey, RowId};
use crate::config::DisplaySettings;

/// Fan-out from a registry to every view attached to it.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    AlbumsAdded(Vec<AlbumKey>),
    AlbumsRemoved(Vec<AlbumKey>),
    /// Album data or cover state changed; views redraw the affected rows.
    AlbumsChanged(Vec<AlbumKey>),
    /// Layout and drawing preferences shared by all views.
    DisplaySettingsChanged(DisplaySettings),
    /// Album display pattern replaced; every text cell is stale.
    PatternChanged(String),
}

/// Selection snapshot delivered to the song-list companion of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChanged {
    /// True when the "all albums" row is part of the selection.
    pub all_albums: bool,
    /// Selected album keys in view order.
    pub album_keys: Vec<AlbumKey>,
}

/// Notifications emitted by a single browser view.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    SelectionChanged(SelectionChanged),
    /// Filter predicates changed; the whole row set was re-evaluated.
    VisibilityRecheck,
    /// Rows whose drawn content is stale.
    RowsDirty(Vec<RowId>),
    DisplaySettingsChanged(DisplaySettings),
}
