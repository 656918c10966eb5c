//! Album ordering for the five user-selectable sort criteria.
//!
//! Every criterion shares two pre-steps: the "all albums" row sorts first and
//! untitled albums sort after titled ones. Blank fields sort after any present
//! value (`cmp_empty`), and album keys break the remaining ties.

use std::cmp::Ordering;

use crate::album::{Album, GridRow};

/// Sort criteria in their persisted index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortCriterion {
    Title,
    #[default]
    Artist,
    Date,
    Genre,
    Rating,
}

type AlbumComparator = fn(&Album, &Album) -> Ordering;

impl SortCriterion {
    pub const ALL: [SortCriterion; 5] = [
        Self::Title,
        Self::Artist,
        Self::Date,
        Self::Genre,
        Self::Rating,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Title => 0,
            Self::Artist => 1,
            Self::Date => 2,
            Self::Genre => 3,
            Self::Rating => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Maps any persisted integer onto a criterion, clamping out-of-range values.
    pub fn from_index_clamped(index: i64) -> Self {
        let clamped = index.clamp(0, (Self::ALL.len() - 1) as i64) as usize;
        Self::ALL[clamped]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Artist => "Artist",
            Self::Date => "Date",
            Self::Genre => "Genre",
            Self::Rating => "Rating",
        }
    }

    fn album_comparator(self) -> AlbumComparator {
        match self {
            Self::Title => compare_title_keys,
            Self::Artist => compare_artist_keys,
            Self::Date => compare_date_keys,
            Self::Genre => compare_genre_keys,
            Self::Rating => compare_rating_keys,
        }
    }
}

/// A field that may be blank. Blank values sort after every present value.
pub trait Blankable: Ord {
    fn is_blank(&self) -> bool;
}

impl Blankable for str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blankable for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// Natural ordering, except that a blank value is greater than any present one.
pub fn cmp_empty<T: Blankable + ?Sized>(left: &T, right: &T) -> Ordering {
    match (left.is_blank(), right.is_blank()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => left.cmp(right),
    }
}

/// Three-way comparison of two grid rows under `criterion`.
pub fn compare(criterion: SortCriterion, left: GridRow<'_>, right: GridRow<'_>) -> Ordering {
    let (left, right) = match (left, right) {
        (GridRow::AllAlbums, GridRow::AllAlbums) => return Ordering::Equal,
        (GridRow::AllAlbums, GridRow::Album(_)) => return Ordering::Less,
        (GridRow::Album(_), GridRow::AllAlbums) => return Ordering::Greater,
        (GridRow::Album(left), GridRow::Album(right)) => (left, right),
    };
    compare_albums(criterion, left, right)
}

/// Album-only comparison; untitled albums sort last under every criterion.
pub fn compare_albums(criterion: SortCriterion, left: &Album, right: &Album) -> Ordering {
    match (left.title.is_empty(), right.title.is_empty()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    (criterion.album_comparator())(left, right).then_with(|| left.key().cmp(right.key()))
}

/// Sorts rows in place; stable, so equal rows keep their relative order.
pub fn sort_rows(criterion: SortCriterion, rows: &mut [GridRow<'_>]) {
    rows.sort_by(|left, right| compare(criterion, *left, *right));
}

fn compare_title_keys(left: &Album, right: &Album) -> Ordering {
    cmp_empty(&left.sort_title, &right.sort_title)
}

fn compare_artist_keys(left: &Album, right: &Album) -> Ordering {
    cmp_empty(&left.people_sort, &right.people_sort)
        .then_with(|| cmp_empty(&left.date, &right.date))
        .then_with(|| cmp_empty(&left.sort_title, &right.sort_title))
}

fn compare_date_keys(left: &Album, right: &Album) -> Ordering {
    cmp_empty(&left.date, &right.date).then_with(|| cmp_empty(&left.sort_title, &right.sort_title))
}

fn compare_genre_keys(left: &Album, right: &Album) -> Ordering {
    cmp_empty(&left.genre, &right.genre)
        .then_with(|| cmp_empty(&left.people_sort, &right.people_sort))
        .then_with(|| cmp_empty(&left.date, &right.date))
        .then_with(|| cmp_empty(&left.sort_title, &right.sort_title))
}

/// Non-finite ratings count as unrated and negative zero equals zero.
fn rating_key(album: &Album) -> f64 {
    if album.rating.is_finite() {
        album.rating + 0.0
    } else {
        0.0
    }
}

fn compare_rating_keys(left: &Album, right: &Album) -> Ordering {
    // Higher ratings first; zero is an ordinary rating here.
    rating_key(right)
        .total_cmp(&rating_key(left))
        .then_with(|| cmp_empty(&left.date, &right.date))
        .then_with(|| cmp_empty(&left.sort_title, &right.sort_title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::AlbumKey;

    fn album(key: &str, title: &str) -> Album {
        Album::new(AlbumKey::new(key).unwrap(), title)
    }

    fn ordered_keys(criterion: SortCriterion, albums: &[Album]) -> Vec<String> {
        let mut rows: Vec<GridRow<'_>> = albums.iter().map(GridRow::Album).collect();
        rows.push(GridRow::AllAlbums);
        sort_rows(criterion, &mut rows);
        rows.into_iter()
            .map(|row| match row {
                GridRow::AllAlbums => "*".to_string(),
                GridRow::Album(album) => album.key().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_cmp_empty_sorts_blank_after_present_values() {
        assert_eq!(cmp_empty("", "a"), Ordering::Greater);
        assert_eq!(cmp_empty("a", ""), Ordering::Less);
        assert_eq!(cmp_empty("", ""), Ordering::Equal);
        assert_eq!(cmp_empty("a", "b"), Ordering::Less);
        assert_eq!(cmp_empty("b", "a"), Ordering::Greater);
        assert_eq!(cmp_empty("zzz", ""), Ordering::Less);
    }

    #[test]
    fn test_untitled_album_sorts_after_titled_album_for_every_criterion() {
        let untitled = album("a", "").with_sort_title("aaa").with_rating(1.0);
        let titled = album("z", "Zebra").with_rating(0.0);
        for criterion in SortCriterion::ALL {
            assert_eq!(
                compare(criterion, GridRow::Album(&untitled), GridRow::Album(&titled)),
                Ordering::Greater,
                "criterion {:?}",
                criterion
            );
            assert_eq!(
                compare(criterion, GridRow::Album(&titled), GridRow::Album(&untitled)),
                Ordering::Less
            );
        }
    }

    #[test]
    fn test_all_albums_row_sorts_first_for_every_criterion() {
        let first = album("a", "A");
        let untitled = album("b", "");
        for criterion in SortCriterion::ALL {
            assert_eq!(
                compare(criterion, GridRow::AllAlbums, GridRow::Album(&first)),
                Ordering::Less
            );
            assert_eq!(
                compare(criterion, GridRow::Album(&untitled), GridRow::AllAlbums),
                Ordering::Greater
            );
            assert_eq!(
                compare(criterion, GridRow::AllAlbums, GridRow::AllAlbums),
                Ordering::Equal
            );
        }
    }

    #[test]
    fn test_title_sort_places_untitled_last() {
        let albums = vec![
            album("z", ""),
            album("a", "Moon").with_sort_title("moon"),
        ];
        assert_eq!(ordered_keys(SortCriterion::Title, &albums), vec!["*", "a", "z"]);
    }

    #[test]
    fn test_title_sort_blank_sort_title_after_present_and_key_breaks_ties() {
        let albums = vec![
            album("c", "X").with_sort_title(""),
            album("b", "Same").with_sort_title("same"),
            album("a", "Same").with_sort_title("same"),
        ];
        assert_eq!(
            ordered_keys(SortCriterion::Title, &albums),
            vec!["*", "a", "b", "c"]
        );
    }

    #[test]
    fn test_artist_sort_uses_people_then_date_then_title() {
        let albums = vec![
            album("1", "Later").with_people_sort("beta").with_date("2001"),
            album("2", "Earlier").with_people_sort("beta").with_date("1999"),
            album("3", "Nobody").with_people_sort(""),
            album("4", "First").with_people_sort("alpha").with_date(""),
        ];
        assert_eq!(
            ordered_keys(SortCriterion::Artist, &albums),
            vec!["*", "4", "2", "1", "3"]
        );
    }

    #[test]
    fn test_date_sort_puts_undated_albums_last() {
        let albums = vec![
            album("1", "A").with_date(""),
            album("2", "B").with_date("2010-01-01"),
            album("3", "C").with_date("1970"),
        ];
        assert_eq!(
            ordered_keys(SortCriterion::Date, &albums),
            vec!["*", "3", "2", "1"]
        );
    }

    #[test]
    fn test_genre_sort_falls_back_through_people_date_and_title() {
        let albums = vec![
            album("1", "A").with_genre("rock").with_people_sort("b"),
            album("2", "B").with_genre("rock").with_people_sort("a"),
            album("3", "C").with_genre("jazz").with_people_sort("z"),
            album("4", "D").with_genre(""),
        ];
        assert_eq!(
            ordered_keys(SortCriterion::Genre, &albums),
            vec!["*", "3", "2", "1", "4"]
        );
    }

    #[test]
    fn test_rating_sort_is_descending_then_date_title_key() {
        let high = album("h", "High").with_rating(0.9);
        let low = album("l", "Low").with_rating(0.1);
        let zero = album("z", "Zero").with_rating(0.0);
        assert_eq!(
            compare(SortCriterion::Rating, GridRow::Album(&high), GridRow::Album(&low)),
            Ordering::Less
        );

        let tie_dated = album("b", "T").with_rating(0.5).with_date("2000");
        let tie_undated = album("a", "T").with_rating(0.5);
        let albums = vec![
            zero.clone(),
            low.clone(),
            tie_undated.clone(),
            tie_dated.clone(),
            high.clone(),
        ];
        assert_eq!(
            ordered_keys(SortCriterion::Rating, &albums),
            vec!["*", "h", "b", "a", "l", "z"]
        );
    }

    #[test]
    fn test_rating_sort_treats_negative_zero_and_nan_as_zero() {
        let nan = album("a", "T").with_rating(f64::NAN);
        let negative_nan = album("b", "T").with_rating(-f64::NAN);
        let negative_zero = album("c", "T").with_rating(-0.0);
        let zero = album("d", "T").with_rating(0.0);
        let rated = album("e", "T").with_rating(0.2);

        assert_eq!(
            ordered_keys(
                SortCriterion::Rating,
                &[zero, negative_nan, rated, negative_zero, nan]
            ),
            vec!["*", "e", "a", "b", "c", "d"]
        );
    }

    #[test]
    fn test_two_untitled_albums_fall_through_to_criterion_keys() {
        let first = album("b", "").with_date("1990");
        let second = album("a", "").with_date("2000");
        assert_eq!(
            compare(SortCriterion::Date, GridRow::Album(&first), GridRow::Album(&second)),
            Ordering::Less
        );
        assert_eq!(
            compare(SortCriterion::Date, GridRow::Album(&second), GridRow::Album(&first)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_criterion_index_round_trip_and_clamping() {
        for criterion in SortCriterion::ALL {
            assert_eq!(SortCriterion::from_index(criterion.index()), Some(criterion));
        }
        assert_eq!(SortCriterion::from_index(5), None);
        assert_eq!(SortCriterion::from_index_clamped(-3), SortCriterion::Title);
        assert_eq!(SortCriterion::from_index_clamped(42), SortCriterion::Rating);
        assert_eq!(SortCriterion::default(), SortCriterion::Artist);
    }
}
