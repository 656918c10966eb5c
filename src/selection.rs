//! Persisted selection encoding and selection-change batching.

use crate::album::AlbumKey;

/// The selection as it is persisted and announced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionSnapshot {
    /// The "all albums" row is selected.
    #[default]
    AllAlbums,
    Albums(Vec<AlbumKey>),
}

impl SelectionSnapshot {
    pub fn album_keys(&self) -> &[AlbumKey] {
        match self {
            Self::AllAlbums => &[],
            Self::Albums(keys) => keys,
        }
    }

    pub fn is_all_albums(&self) -> bool {
        matches!(self, Self::AllAlbums)
    }
}

/// Newline separated keys; an empty string stands for the "all albums" row.
///
/// An empty album list is stored the same way as "all albums".
pub fn serialize_selection(selection: &SelectionSnapshot) -> String {
    selection
        .album_keys()
        .iter()
        .map(AlbumKey::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a persisted selection, dropping keys `is_known` rejects.
///
/// Blank lines are skipped, so values written with a leading newline load too.
pub fn deserialize_selection(
    text: &str,
    is_known: impl Fn(&AlbumKey) -> bool,
) -> SelectionSnapshot {
    if text.trim().is_empty() {
        return SelectionSnapshot::AllAlbums;
    }
    let mut keys: Vec<AlbumKey> = Vec::new();
    for line in text.lines() {
        let Ok(key) = AlbumKey::new(line.trim_end_matches('\r')) else {
            continue;
        };
        if is_known(&key) && !keys.contains(&key) {
            keys.push(key);
        }
    }
    SelectionSnapshot::Albums(keys)
}

/// Batches selection-changed notifications while the view rebuilds its rows.
///
/// Nesting is allowed; the notification is replayed once when the outermost
/// batch ends, and only if something tried to notify inside it.
#[derive(Debug, Default)]
pub struct SelectionInhibitor {
    depth: u32,
    suppressed: bool,
}

impl SelectionInhibitor {
    pub fn is_inhibited(&self) -> bool {
        self.depth > 0
    }

    pub fn inhibit(&mut self) {
        self.depth += 1;
    }

    /// Returns true when a notification should be sent now.
    pub fn notify(&mut self) -> bool {
        if self.is_inhibited() {
            self.suppressed = true;
            return false;
        }
        true
    }

    /// Ends one batch; true when the outermost batch swallowed a notification.
    pub fn release(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return false;
        }
        std::mem::take(&mut self.suppressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn keys(values: &[&str]) -> Vec<AlbumKey> {
        values.iter().map(|value| AlbumKey::new(*value).unwrap()).collect()
    }

    #[test]
    fn test_round_trip_keeps_only_keys_still_in_registry() {
        let selected = keys(&["b", "gone", "a"]);
        let registry: BTreeSet<AlbumKey> = keys(&["a", "b", "c"]).into_iter().collect();

        let text = serialize_selection(&SelectionSnapshot::Albums(selected));
        assert_eq!(text, "b\ngone\na");
        let restored = deserialize_selection(&text, |key| registry.contains(key));
        assert_eq!(restored, SelectionSnapshot::Albums(keys(&["b", "a"])));
    }

    #[test]
    fn test_empty_string_means_all_albums() {
        assert_eq!(serialize_selection(&SelectionSnapshot::AllAlbums), "");
        assert_eq!(serialize_selection(&SelectionSnapshot::Albums(Vec::new())), "");
        assert_eq!(
            deserialize_selection("", |_| true),
            SelectionSnapshot::AllAlbums
        );
        assert_eq!(
            deserialize_selection("\n", |_| true),
            SelectionSnapshot::AllAlbums
        );
    }

    #[test]
    fn test_legacy_leading_newline_and_duplicates_are_tolerated() {
        let restored = deserialize_selection("\nx\n\ny\r\nx", |_| true);
        assert_eq!(restored, SelectionSnapshot::Albums(keys(&["x", "y"])));

        let nothing_known = deserialize_selection("x\ny", |_| false);
        assert_eq!(nothing_known, SelectionSnapshot::Albums(Vec::new()));
    }

    #[test]
    fn test_whitespace_lines_are_not_keys() {
        assert!(AlbumKey::new(" ").is_err());
        let restored = deserialize_selection(" \nx\n\t", |_| true);
        assert_eq!(restored, SelectionSnapshot::Albums(keys(&["x"])));

        let padded = SelectionSnapshot::Albums(keys(&[" x"]));
        let text = serialize_selection(&padded);
        assert_eq!(deserialize_selection(&text, |_| true), padded);
    }

    #[test]
    fn test_inhibitor_replays_one_notification_after_outermost_batch() {
        let mut inhibitor = SelectionInhibitor::default();
        assert!(inhibitor.notify());

        inhibitor.inhibit();
        inhibitor.inhibit();
        assert!(!inhibitor.notify());
        assert!(!inhibitor.notify());
        assert!(!inhibitor.release());
        assert!(inhibitor.is_inhibited());
        assert!(inhibitor.release());
        assert!(!inhibitor.is_inhibited());

        inhibitor.inhibit();
        assert!(!inhibitor.release());
    }
}
