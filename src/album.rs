//! Album, song, and grid-row model shared by the registry, ordering, and filter layers.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rejection reasons for album identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlbumKeyError {
    #[error("album key must not be blank")]
    Empty,
    #[error("album key must not contain a line break: {0:?}")]
    LineBreak(String),
}

/// Stable, unique album identifier.
///
/// Keys are single-line and not blank because persisted selections are newline
/// separated and a blank selection means the "all albums" row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlbumKey(String);

impl AlbumKey {
    pub fn new(value: impl Into<String>) -> Result<Self, AlbumKeyError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AlbumKeyError::Empty);
        }
        if value.contains('\n') || value.contains('\r') {
            return Err(AlbumKeyError::LineBreak(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AlbumKey {
    type Error = AlbumKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlbumKey> for String {
    fn from(key: AlbumKey) -> Self {
        key.0
    }
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded cover artwork ready for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pixels: image::RgbaImage,
}

impl CoverImage {
    pub fn new(pixels: image::RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &image::RgbaImage {
        &self.pixels
    }
}

/// Track reference owned by an album.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Song {
    pub path: PathBuf,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub length_secs: u32,
}

impl Song {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: String::new(),
            artist: String::new(),
            disc_number: 0,
            track_number: 0,
            length_secs: 0,
        }
    }

    /// Intra-album ordering key.
    pub fn sort_key(&self) -> (u32, u32, &Path) {
        (self.disc_number, self.track_number, self.path.as_path())
    }
}

/// A group of songs sharing an album identity.
///
/// Text fields used for ordering may be blank; blank is distinct from a low value.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(from = "AlbumRecord")]
pub struct Album {
    key: AlbumKey,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sort_title: String,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub people_sort: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(skip)]
    pub(crate) cover: Option<Arc<CoverImage>>,
    #[serde(skip)]
    pub(crate) scanned: bool,
    #[serde(skip)]
    pub(crate) cover_generation: u64,
}

/// Serialized form of [`Album`]; missing sort keys are derived on load.
#[derive(serde::Deserialize)]
struct AlbumRecord {
    key: AlbumKey,
    #[serde(default)]
    title: String,
    #[serde(default)]
    sort_title: String,
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    people_sort: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    songs: Vec<Song>,
}

impl From<AlbumRecord> for Album {
    fn from(record: AlbumRecord) -> Self {
        let mut album = Album::new(record.key, record.title)
            .with_people(record.people)
            .with_date(record.date)
            .with_genre(record.genre)
            .with_rating(record.rating)
            .with_songs(record.songs);
        if !record.sort_title.is_empty() {
            album.sort_title = record.sort_title;
        }
        if !record.people_sort.is_empty() {
            album.people_sort = record.people_sort;
        }
        album
    }
}

impl Album {
    pub fn new(key: AlbumKey, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            key,
            sort_title: title.to_lowercase(),
            title,
            people: Vec::new(),
            people_sort: String::new(),
            date: String::new(),
            genre: String::new(),
            rating: 0.0,
            songs: Vec::new(),
            cover: None,
            scanned: false,
            cover_generation: 0,
        }
    }

    pub fn with_sort_title(mut self, sort_title: impl Into<String>) -> Self {
        self.sort_title = sort_title.into();
        self
    }

    pub fn with_people(mut self, people: Vec<String>) -> Self {
        self.people_sort = people.join("\n").to_lowercase();
        self.people = people;
        self
    }

    pub fn with_people_sort(mut self, people_sort: impl Into<String>) -> Self {
        self.people_sort = people_sort.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_songs(mut self, songs: Vec<Song>) -> Self {
        self.songs = songs;
        self
    }

    pub fn key(&self) -> &AlbumKey {
        &self.key
    }

    pub fn cover(&self) -> Option<&Arc<CoverImage>> {
        self.cover.as_ref()
    }

    /// True once a cover load has completed, successfully or not.
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }

    pub fn track_count(&self) -> usize {
        self.songs.len()
    }

    pub fn disc_count(&self) -> usize {
        self.songs
            .iter()
            .map(|song| song.disc_number)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn length_secs(&self) -> u64 {
        self.songs
            .iter()
            .map(|song| u64::from(song.length_secs))
            .sum()
    }

    pub fn contains_song(&self, song: &Song) -> bool {
        self.songs.iter().any(|candidate| candidate.path == song.path)
    }

    /// Songs ordered by their intra-album sort key.
    pub fn sorted_songs(&self) -> Vec<&Song> {
        let mut songs: Vec<&Song> = self.songs.iter().collect();
        songs.sort_by(|left, right| left.sort_key().cmp(&right.sort_key()));
        songs
    }
}

/// Row borrowed from the registry: the "all albums" sentinel or a real album.
#[derive(Debug, Clone, Copy)]
pub enum GridRow<'a> {
    AllAlbums,
    Album(&'a Album),
}

impl<'a> GridRow<'a> {
    pub fn album(self) -> Option<&'a Album> {
        match self {
            Self::AllAlbums => None,
            Self::Album(album) => Some(album),
        }
    }

    pub fn id(self) -> RowId {
        match self {
            Self::AllAlbums => RowId::AllAlbums,
            Self::Album(album) => RowId::Album(album.key.clone()),
        }
    }
}

/// Owned, stable row identity that survives sort and filter changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowId {
    AllAlbums,
    Album(AlbumKey),
}

impl RowId {
    pub fn album_key(&self) -> Option<&AlbumKey> {
        match self {
            Self::AllAlbums => None,
            Self::Album(key) => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_key_rejects_blank_and_multiline_values() {
        assert_eq!(AlbumKey::new(""), Err(AlbumKeyError::Empty));
        assert_eq!(AlbumKey::new(" \t"), Err(AlbumKeyError::Empty));
        assert_eq!(AlbumKey::new(" x ").map(String::from), Ok(" x ".to_string()));
        assert!(matches!(
            AlbumKey::new("a\nb"),
            Err(AlbumKeyError::LineBreak(_))
        ));
        assert_eq!(AlbumKey::new("abc").map(String::from), Ok("abc".to_string()));
    }

    #[test]
    fn test_album_deserializes_from_json_and_rejects_blank_key() {
        let album: Album = serde_json::from_str(
            r#"{"key":"k1","title":"Moon","sort_title":"moon","rating":0.5,
                "songs":[{"path":"/music/a.flac","disc_number":1,"track_number":2,"length_secs":60}]}"#,
        )
        .expect("album json should parse");
        assert_eq!(album.key().as_str(), "k1");
        assert_eq!(album.track_count(), 1);
        assert!(!album.is_scanned());
        assert!(album.cover().is_none());

        let blank = serde_json::from_str::<Album>(r#"{"key":""}"#);
        assert!(blank.is_err());
    }

    #[test]
    fn test_deserialized_album_derives_missing_sort_keys() {
        let album: Album = serde_json::from_str(
            r#"{"key":"a","title":"Zebra","people":["Floyd","Gilmour"]}"#,
        )
        .expect("album json should parse");
        assert_eq!(album.sort_title, "zebra");
        assert_eq!(album.people_sort, "floyd\ngilmour");

        let explicit: Album = serde_json::from_str(
            r#"{"key":"b","title":"The Wall","sort_title":"wall","people":["Floyd"],"people_sort":"pink floyd"}"#,
        )
        .expect("album json should parse");
        assert_eq!(explicit.sort_title, "wall");
        assert_eq!(explicit.people_sort, "pink floyd");
    }

    #[test]
    fn test_sorted_songs_uses_disc_then_track_then_path() {
        let mut first = Song::new("/m/b.flac");
        first.disc_number = 1;
        first.track_number = 2;
        let mut second = Song::new("/m/a.flac");
        second.disc_number = 1;
        second.track_number = 1;
        let mut third = Song::new("/m/c.flac");
        third.disc_number = 2;
        third.track_number = 1;
        let album = Album::new(AlbumKey::new("k").unwrap(), "x")
            .with_songs(vec![third.clone(), first.clone(), second.clone()]);

        let ordered: Vec<&Path> = album
            .sorted_songs()
            .into_iter()
            .map(|song| song.path.as_path())
            .collect();
        assert_eq!(
            ordered,
            vec![second.path.as_path(), first.path.as_path(), third.path.as_path()]
        );
        assert_eq!(album.disc_count(), 2);
    }
}
