//! Persistent cover-grid preferences and defaults.

use log::warn;
use serde::{Deserialize, Deserializer, Serializer};

use crate::album_text::DEFAULT_ALBUM_PATTERN;
use crate::ordering::SortCriterion;

pub const MIN_SPACING_PX: u32 = 0;
pub const MAX_SPACING_PX: u32 = 30;
pub const MIN_COVER_SIZE_PX: u32 = 16;
pub const MAX_COVER_SIZE_PX: u32 = 512;

/// Root configuration persisted to `covergrid.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Cover-grid browser preferences and restored state.
    pub browser: BrowserConfig,
}

/// Browser preferences and the state restored on the next start.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BrowserConfig {
    #[serde(default, with = "sort_criterion_index")]
    pub sort_criterion: SortCriterion,
    #[serde(default = "default_spacing_px", deserialize_with = "deserialize_spacing_px")]
    pub row_spacing: u32,
    #[serde(default = "default_spacing_px", deserialize_with = "deserialize_spacing_px")]
    pub column_spacing: u32,
    #[serde(default = "default_spacing_px", deserialize_with = "deserialize_spacing_px")]
    pub item_padding: u32,
    #[serde(default = "default_true")]
    pub show_album_text: bool,
    #[serde(default = "default_true")]
    pub round_covers: bool,
    /// Newline separated album keys; empty selects the "all albums" row.
    #[serde(default)]
    pub selected_albums: String,
    #[serde(default)]
    pub query_text: String,
    #[serde(default = "default_album_pattern")]
    pub album_pattern: String,
    #[serde(
        default = "default_cover_size_px",
        deserialize_with = "deserialize_cover_size_px"
    )]
    pub cover_size_px: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            sort_criterion: SortCriterion::default(),
            row_spacing: default_spacing_px(),
            column_spacing: default_spacing_px(),
            item_padding: default_spacing_px(),
            show_album_text: true,
            round_covers: true,
            selected_albums: String::new(),
            query_text: String::new(),
            album_pattern: default_album_pattern(),
            cover_size_px: default_cover_size_px(),
        }
    }
}

impl BrowserConfig {
    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            row_spacing: self.row_spacing,
            column_spacing: self.column_spacing,
            item_padding: self.item_padding,
            show_album_text: self.show_album_text,
            round_covers: self.round_covers,
        }
    }

    pub fn set_display_settings(&mut self, settings: DisplaySettings) {
        let settings = settings.clamped();
        self.row_spacing = settings.row_spacing;
        self.column_spacing = settings.column_spacing;
        self.item_padding = settings.item_padding;
        self.show_album_text = settings.show_album_text;
        self.round_covers = settings.round_covers;
    }
}

/// Layout and drawing preferences shared by every open grid view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub row_spacing: u32,
    pub column_spacing: u32,
    pub item_padding: u32,
    pub show_album_text: bool,
    /// Rounded cover borders; applied at draw time.
    pub round_covers: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        BrowserConfig::default().display_settings()
    }
}

impl DisplaySettings {
    pub fn clamped(self) -> Self {
        Self {
            row_spacing: clamp_spacing_px(i64::from(self.row_spacing)),
            column_spacing: clamp_spacing_px(i64::from(self.column_spacing)),
            item_padding: clamp_spacing_px(i64::from(self.item_padding)),
            ..self
        }
    }
}

/// Clamps values that may have been set programmatically outside their ranges.
pub fn sanitize_config(config: Config) -> Config {
    let browser = config.browser;
    let display = browser.display_settings().clamped();
    let mut sanitized = BrowserConfig {
        cover_size_px: browser
            .cover_size_px
            .clamp(MIN_COVER_SIZE_PX, MAX_COVER_SIZE_PX),
        ..browser
    };
    sanitized.set_display_settings(display);
    Config { browser: sanitized }
}

pub fn clamp_spacing_px(value: i64) -> u32 {
    value.clamp(i64::from(MIN_SPACING_PX), i64::from(MAX_SPACING_PX)) as u32
}

fn deserialize_spacing_px<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    let clamped = clamp_spacing_px(raw);
    if i64::from(clamped) != raw {
        warn!("Config: spacing value {} out of range, clamped to {}", raw, clamped);
    }
    Ok(clamped)
}

fn deserialize_cover_size_px<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    let clamped = raw.clamp(i64::from(MIN_COVER_SIZE_PX), i64::from(MAX_COVER_SIZE_PX)) as u32;
    if i64::from(clamped) != raw {
        warn!("Config: cover size {} out of range, clamped to {}", raw, clamped);
    }
    Ok(clamped)
}

/// Persists the criterion as its integer index.
mod sort_criterion_index {
    use super::*;

    pub fn serialize<S>(criterion: &SortCriterion, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(criterion.index() as i64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SortCriterion, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        let criterion = SortCriterion::from_index_clamped(raw);
        if criterion.index() as i64 != raw {
            warn!(
                "Config: sort criterion {} out of range, using {}",
                raw,
                criterion.label()
            );
        }
        Ok(criterion)
    }
}

fn default_true() -> bool {
    true
}

fn default_spacing_px() -> u32 {
    6
}

fn default_cover_size_px() -> u32 {
    120
}

fn default_album_pattern() -> String {
    DEFAULT_ALBUM_PATTERN.to_string()
}
