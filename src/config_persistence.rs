//! Loading and saving `covergrid.toml` while preserving user comments.

use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{value, DocumentMut, Item, Table};

use crate::config::{sanitize_config, BrowserConfig, Config};

pub const CONFIG_FILE_NAME: &str = "covergrid.toml";

/// Default config location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join("covergrid").join(CONFIG_FILE_NAME))
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn ensure_section_table(document: &mut DocumentMut, key: &str) {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
}

fn write_browser_table(table: &mut Table, previous: &BrowserConfig, config: &BrowserConfig) {
    set_table_scalar_if_changed(
        table,
        "sort_criterion",
        previous.sort_criterion.index() as i64,
        config.sort_criterion.index() as i64,
        value,
    );
    set_table_scalar_if_changed(
        table,
        "row_spacing",
        i64::from(previous.row_spacing),
        i64::from(config.row_spacing),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "column_spacing",
        i64::from(previous.column_spacing),
        i64::from(config.column_spacing),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "item_padding",
        i64::from(previous.item_padding),
        i64::from(config.item_padding),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "show_album_text",
        previous.show_album_text,
        config.show_album_text,
        value,
    );
    set_table_scalar_if_changed(
        table,
        "round_covers",
        previous.round_covers,
        config.round_covers,
        value,
    );
    set_table_scalar_if_changed(
        table,
        "selected_albums",
        previous.selected_albums.as_str(),
        config.selected_albums.as_str(),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "query_text",
        previous.query_text.as_str(),
        config.query_text.as_str(),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "album_pattern",
        previous.album_pattern.as_str(),
        config.album_pattern.as_str(),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "cover_size_px",
        i64::from(previous.cover_size_px),
        i64::from(config.cover_size_px),
        value,
    );
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    ensure_section_table(document, "browser");
    if let Some(browser) = document["browser"].as_table_mut() {
        write_browser_table(browser, &previous.browser, &config.browser);
    }
}

pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!("Failed to create config dir {}: {}", parent.display(), err);
            return;
        }
    }
    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

/// Reads and sanitizes the config; missing or broken files yield defaults.
pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            info!(
                "Config file not readable. Using defaults. path={} error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
