//! Row visibility from a user query (foreground) and a library-wide scope (background).

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::album::{Album, GridRow};

/// Album predicate shared between the composer and its callers.
pub type Predicate = Arc<dyn Fn(&Album) -> bool + Send + Sync>;

/// Wraps a closure into a shared [`Predicate`].
pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&Album) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Failure to turn query text into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unterminated quote starting at column {position}")]
    UnterminatedQuote { position: usize },
    #[error("missing tag name before '=' at column {position}")]
    EmptyTag { position: usize },
    #[error("missing value after '{tag}=' at column {position}")]
    EmptyValue { tag: String, position: usize },
    #[error("unknown tag {tag:?} at column {position}")]
    UnknownTag { tag: String, position: usize },
    #[error("invalid numeric expression {expression:?} at column {position}")]
    InvalidNumeric { expression: String, position: usize },
}

/// Compiles user query text into album predicates.
pub trait QueryCompiler: Send + Sync {
    /// True when `text` matches every album and needs no predicate.
    fn is_match_all(&self, text: &str) -> bool;

    fn compile(&self, text: &str) -> Result<Predicate, QueryError>;

    fn is_parsable(&self, text: &str) -> bool {
        self.is_match_all(text) || self.compile(text).is_ok()
    }
}

/// Supplies the library-wide background predicate, which changes independently of the query.
pub trait BackgroundFilterSource: Send + Sync {
    fn background_filter(&self) -> Option<Predicate>;
}

impl<F> BackgroundFilterSource for F
where
    F: Fn() -> Option<Predicate> + Send + Sync,
{
    fn background_filter(&self) -> Option<Predicate> {
        self()
    }
}

/// Background source that never restricts visibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundFilter;

impl BackgroundFilterSource for NoBackgroundFilter {
    fn background_filter(&self) -> Option<Predicate> {
        None
    }
}

/// What a filter update requires from the owning view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChange {
    /// Predicates changed; every row needs a visibility recheck.
    RecheckAll,
    Unchanged,
}

/// Combines the optional foreground and background predicates.
#[derive(Clone, Default)]
pub struct FilterComposer {
    foreground: Option<Predicate>,
    background: Option<Predicate>,
    query_text: String,
}

impl fmt::Debug for FilterComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterComposer")
            .field("foreground", &self.foreground.is_some())
            .field("background", &self.background.is_some())
            .field("query_text", &self.query_text)
            .finish()
    }
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn has_foreground(&self) -> bool {
        self.foreground.is_some()
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.foreground.is_none() && self.background.is_none()
    }

    /// Replaces the foreground predicate from query text.
    ///
    /// On a compile error the previous foreground predicate and text are kept.
    pub fn set_query(
        &mut self,
        text: &str,
        compiler: &dyn QueryCompiler,
    ) -> Result<FilterChange, QueryError> {
        let next = if compiler.is_match_all(text) {
            None
        } else {
            match compiler.compile(text) {
                Ok(predicate) => Some(predicate),
                Err(err) => {
                    warn!("Filter: keeping previous query, failed to compile {:?}: {}", text, err);
                    return Err(err);
                }
            }
        };
        let changed = self.query_text != text || self.foreground.is_some() || next.is_some();
        self.query_text = text.to_string();
        self.foreground = next;
        debug!(
            "Filter: foreground updated active={} text={:?}",
            self.foreground.is_some(),
            self.query_text
        );
        Ok(if changed {
            FilterChange::RecheckAll
        } else {
            FilterChange::Unchanged
        })
    }

    /// Replaces the background predicate. The foreground predicate is untouched.
    pub fn set_background(&mut self, background: Option<Predicate>) -> FilterChange {
        if self.background.is_none() && background.is_none() {
            return FilterChange::Unchanged;
        }
        self.background = background;
        FilterChange::RecheckAll
    }

    pub fn is_visible(&self, row: GridRow<'_>) -> bool {
        let album = match row {
            GridRow::AllAlbums => return true,
            GridRow::Album(album) => album,
        };
        match (&self.foreground, &self.background) {
            (None, None) => true,
            (Some(foreground), None) => foreground(album),
            (None, Some(background)) => background(album),
            (Some(foreground), Some(background)) => background(album) && foreground(album),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::AlbumKey;

    struct PrefixCompiler;

    impl QueryCompiler for PrefixCompiler {
        fn is_match_all(&self, text: &str) -> bool {
            text.trim().is_empty()
        }

        fn compile(&self, text: &str) -> Result<Predicate, QueryError> {
            if text.starts_with('"') {
                return Err(QueryError::UnterminatedQuote { position: 0 });
            }
            let prefix = text.to_string();
            Ok(predicate(move |album: &Album| album.title.starts_with(&prefix)))
        }
    }

    fn album(key: &str, title: &str, genre: &str) -> Album {
        Album::new(AlbumKey::new(key).unwrap(), title).with_genre(genre)
    }

    fn key_number(album: &Album) -> u32 {
        album.key().as_str().parse().unwrap_or(0)
    }

    #[test]
    fn test_no_predicates_show_every_row() {
        let composer = FilterComposer::new();
        let untitled = album("1", "", "");
        assert!(composer.is_visible(GridRow::AllAlbums));
        assert!(composer.is_visible(GridRow::Album(&untitled)));
        assert!(composer.is_unrestricted());
    }

    #[test]
    fn test_both_predicates_are_combined_with_and() {
        let mut composer = FilterComposer::new();
        composer.foreground = Some(predicate(|album: &Album| key_number(album) % 2 == 0));
        composer.set_background(Some(predicate(|album: &Album| album.genre == "red")));

        for number in 0..8u32 {
            for genre in ["red", "blue"] {
                let row = album(&number.to_string(), "t", genre);
                let expected = number % 2 == 0 && genre == "red";
                assert_eq!(composer.is_visible(GridRow::Album(&row)), expected);
            }
        }
        assert!(composer.is_visible(GridRow::AllAlbums));
    }

    #[test]
    fn test_single_predicate_decides_alone() {
        let mut composer = FilterComposer::new();
        composer.set_background(Some(predicate(|album: &Album| album.genre == "red")));
        assert!(composer.is_visible(GridRow::Album(&album("1", "a", "red"))));
        assert!(!composer.is_visible(GridRow::Album(&album("2", "a", "blue"))));

        let mut composer = FilterComposer::new();
        composer
            .set_query("Mo", &PrefixCompiler)
            .expect("query should compile");
        assert!(composer.is_visible(GridRow::Album(&album("1", "Moon", ""))));
        assert!(!composer.is_visible(GridRow::Album(&album("2", "Sun", ""))));
    }

    #[test]
    fn test_match_all_text_clears_foreground() {
        let mut composer = FilterComposer::new();
        composer.set_query("Mo", &PrefixCompiler).unwrap();
        assert!(composer.has_foreground());
        assert_eq!(
            composer.set_query("  ", &PrefixCompiler),
            Ok(FilterChange::RecheckAll)
        );
        assert!(!composer.has_foreground());
        assert_eq!(
            composer.set_query("  ", &PrefixCompiler),
            Ok(FilterChange::Unchanged)
        );
    }

    #[test]
    fn test_compile_failure_keeps_previous_foreground() {
        let mut composer = FilterComposer::new();
        composer.set_query("Mo", &PrefixCompiler).unwrap();
        let err = composer.set_query("\"broken", &PrefixCompiler);
        assert_eq!(err, Err(QueryError::UnterminatedQuote { position: 0 }));
        assert_eq!(composer.query_text(), "Mo");
        assert!(composer.is_visible(GridRow::Album(&album("1", "Moon", ""))));
        assert!(!composer.is_visible(GridRow::Album(&album("2", "Sun", ""))));
    }

    #[test]
    fn test_background_change_leaves_foreground_intact() {
        let mut composer = FilterComposer::new();
        composer.set_query("Mo", &PrefixCompiler).unwrap();
        assert_eq!(
            composer.set_background(Some(predicate(|_: &Album| true))),
            FilterChange::RecheckAll
        );
        assert_eq!(composer.set_background(None), FilterChange::RecheckAll);
        assert_eq!(composer.set_background(None), FilterChange::Unchanged);
        assert!(composer.has_foreground());
        assert_eq!(composer.query_text(), "Mo");
    }

    #[test]
    fn test_closure_background_source() {
        let source = || Some(predicate(|album: &Album| album.rating > 0.5));
        let background = source.background_filter().expect("closure source yields predicate");
        assert!(background(&album("1", "a", "").with_rating(0.9)));
        assert!(NoBackgroundFilter.background_filter().is_none());
    }
}
