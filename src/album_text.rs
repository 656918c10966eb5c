//! Album display text rendered from a user-editable pattern.
//!
//! Patterns use `{field}` placeholders with `;` fallback chains
//! (`{album;"Untitled"}`), optional sections `{?date} ({date}){/?}` that only
//! render when the field is non-empty, and `[b]`-style markup that is passed
//! through to the cell renderer unchanged.

use crate::album::Album;

pub const DEFAULT_ALBUM_PATTERN: &str = "[b]{album;\"Songs not in an album\"}[/b]{?date} ({date}){/?}\n[small]{?discs}{discs} - {/?}{tracks} - {length}[/small]\n{people}";

/// Turns an album into the markup drawn in its text cell.
pub trait AlbumFormatter: Send + Sync {
    fn format_album(&self, album: &Album) -> String;
}

/// Markup for the "all albums" row.
pub fn all_albums_text(album_count: usize) -> String {
    let noun = if album_count == 1 { "album" } else { "albums" };
    format!("[b]All Albums[/b]\n{album_count} {noun}")
}

#[derive(Debug, Clone, PartialEq)]
enum PatternSegment {
    Text(String),
    NewLine,
    Placeholder { raw: String, fallbacks: Vec<String> },
    SectionStart(Vec<String>),
    SectionEnd,
}

/// Parsed pattern; cheap to render many times.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternFormatter {
    source: String,
    segments: Vec<PatternSegment>,
}

impl Default for PatternFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_ALBUM_PATTERN)
    }
}

impl PatternFormatter {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            segments: parse_pattern(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl AlbumFormatter for PatternFormatter {
    fn format_album(&self, album: &Album) -> String {
        render(&self.segments, album)
    }
}

fn split_fallbacks(content: &str) -> Option<Vec<String>> {
    let mut fallbacks = Vec::new();
    for part in content.split(';') {
        let key = part.trim();
        if key.is_empty() {
            return None;
        }
        fallbacks.push(key.to_string());
    }
    Some(fallbacks)
}

fn parse_pattern(source: &str) -> Vec<PatternSegment> {
    let mut segments = Vec::new();
    let mut text_buffer = String::new();
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => {
                    flush_text(&mut segments, &mut text_buffer);
                    segments.push(PatternSegment::NewLine);
                }
                Some(next @ ('{' | '}')) => text_buffer.push(next),
                Some(next) => {
                    // Markup escapes belong to the cell renderer.
                    text_buffer.push('\\');
                    text_buffer.push(next);
                }
                None => text_buffer.push('\\'),
            },
            '\n' => {
                flush_text(&mut segments, &mut text_buffer);
                segments.push(PatternSegment::NewLine);
            }
            '{' => {
                flush_text(&mut segments, &mut text_buffer);
                let Some(content) = read_until(&mut chars, '}') else {
                    text_buffer.push('{');
                    continue;
                };
                let trimmed = content.trim();
                if trimmed == "/?" {
                    segments.push(PatternSegment::SectionEnd);
                    continue;
                }
                let (is_section, body) = match trimmed.strip_prefix('?') {
                    Some(rest) => (true, rest),
                    None => (false, trimmed),
                };
                match split_fallbacks(body) {
                    Some(fallbacks) if is_section => {
                        segments.push(PatternSegment::SectionStart(fallbacks));
                    }
                    Some(fallbacks) => segments.push(PatternSegment::Placeholder {
                        raw: content.clone(),
                        fallbacks,
                    }),
                    None => segments.push(PatternSegment::Text(format!("{{{content}}}"))),
                }
            }
            _ => text_buffer.push(ch),
        }
    }
    flush_text(&mut segments, &mut text_buffer);
    segments
}

fn flush_text(segments: &mut Vec<PatternSegment>, text_buffer: &mut String) {
    if text_buffer.is_empty() {
        return;
    }
    segments.push(PatternSegment::Text(std::mem::take(text_buffer)));
}

fn read_until(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    terminal: char,
) -> Option<String> {
    let mut collected = String::new();
    for ch in chars.by_ref() {
        if ch == terminal {
            return Some(collected);
        }
        collected.push(ch);
    }
    None
}

fn render(segments: &[PatternSegment], album: &Album) -> String {
    let mut output = String::new();
    // One entry per open section; text renders only while all are true.
    let mut sections: Vec<bool> = Vec::new();
    for segment in segments {
        let visible = sections.iter().all(|open| *open);
        match segment {
            PatternSegment::SectionStart(fallbacks) => {
                let present = resolve_placeholder(album, fallbacks)
                    .is_some_and(|value| !value.is_empty());
                sections.push(visible && present);
            }
            PatternSegment::SectionEnd => {
                sections.pop();
            }
            PatternSegment::Text(text) if visible => output.push_str(text),
            PatternSegment::NewLine if visible => output.push('\n'),
            PatternSegment::Placeholder { raw, fallbacks } if visible => {
                match resolve_placeholder(album, fallbacks) {
                    Some(value) => output.push_str(&escape_markup(&value)),
                    None => {
                        output.push('{');
                        output.push_str(raw);
                        output.push('}');
                    }
                }
            }
            _ => {}
        }
    }
    output
}

/// First non-empty value in the chain; `None` when no key is recognized.
fn resolve_placeholder(album: &Album, fallbacks: &[String]) -> Option<String> {
    let mut recognized_any = false;
    for key in fallbacks {
        if let Some(literal) = key
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Some(literal.to_string());
        }
        if let Some(value) = value_for_key(album, key) {
            recognized_any = true;
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    if recognized_any {
        Some(String::new())
    } else {
        None
    }
}

fn value_for_key(album: &Album, key: &str) -> Option<String> {
    let value = match key.to_ascii_lowercase().as_str() {
        "album" | "title" => album.title.clone(),
        "date" => album.date.clone(),
        "year" => album.date.chars().take(4).collect(),
        "genre" => album.genre.clone(),
        "artist" => album.people.first().cloned().unwrap_or_default(),
        "people" => album.people.join(", "),
        "rating" => format_rating(album.rating),
        "tracks" => plural(album.track_count(), "track", "tracks"),
        "discs" => {
            let discs = album.disc_count();
            if discs > 1 {
                plural(discs, "disc", "discs")
            } else {
                String::new()
            }
        }
        "length" => format_length_long(album.length_secs()),
        "key" => album.key().to_string(),
        _ => return None,
    };
    Some(value)
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    format!("{} {}", count, if count == 1 { singular } else { plural })
}

fn format_rating(rating: f64) -> String {
    const STEPS: usize = 4;
    let filled = (rating.clamp(0.0, 1.0) * STEPS as f64).round() as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(STEPS - filled))
}

fn format_length_long(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let unit = |count: u64, singular: &str, plural: &str| {
        format!("{} {}", count, if count == 1 { singular } else { plural })
    };
    match (hours, minutes) {
        (0, 0) => unit(seconds, "second", "seconds"),
        (0, _) => unit(minutes, "minute", "minutes"),
        _ if minutes == 0 => unit(hours, "hour", "hours"),
        _ => format!(
            "{}, {}",
            unit(hours, "hour", "hours"),
            unit(minutes, "minute", "minutes")
        ),
    }
}

fn escape_markup(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::{AlbumKey, Song};

    fn album(title: &str) -> Album {
        let songs = (1..=5)
            .map(|index| {
                let mut song = Song::new(format!("/m/{index}.flac"));
                song.disc_number = if index > 3 { 2 } else { 1 };
                song.length_secs = 1_264;
                song
            })
            .collect();
        Album::new(AlbumKey::new("k").unwrap(), title)
            .with_date("2010-10-31")
            .with_people(vec!["Artist".to_string(), "Performer".to_string()])
            .with_songs(songs)
            .with_rating(0.75)
    }

    #[test]
    fn test_default_pattern_renders_all_sections() {
        let text = PatternFormatter::default().format_album(&album("Example"));
        assert_eq!(
            text,
            "[b]Example[/b] (2010-10-31)\n[small]2 discs - 5 tracks - 1 hour, 45 minutes[/small]\nArtist, Performer"
        );
    }

    #[test]
    fn test_default_pattern_handles_untitled_undated_single_disc_album() {
        let mut untitled = Album::new(AlbumKey::new("k").unwrap(), "");
        untitled.songs.push(Song::new("/m/x.flac"));
        let text = PatternFormatter::default().format_album(&untitled);
        assert_eq!(
            text,
            "[b]Songs not in an album[/b]\n[small]1 track - 0 seconds[/small]\n"
        );
    }

    #[test]
    fn test_unknown_placeholders_stay_literal_and_values_are_escaped() {
        let formatter = PatternFormatter::new("{mood} {album} \\{album\\}");
        assert_eq!(
            formatter.format_album(&album("[Live]")),
            "{mood} \\[Live\\] {album}"
        );
    }

    #[test]
    fn test_fallback_chain_and_rating_field() {
        let formatter = PatternFormatter::new("{genre;year} {rating}");
        assert_eq!(formatter.format_album(&album("x")), "2010 ★★★☆");
    }

    #[test]
    fn test_all_albums_text_pluralizes() {
        assert_eq!(all_albums_text(1), "[b]All Albums[/b]\n1 album");
        assert_eq!(all_albums_text(3), "[b]All Albums[/b]\n3 albums");
    }
}
