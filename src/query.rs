//! Small album query language used as the default [`QueryCompiler`].
//!
//! Terms are separated by whitespace and must all match:
//! bare words and `"quoted phrases"` search the album title and people,
//! `tag=value` searches one field, `#(rating >= 0.5)` compares numbers,
//! and a leading `!` negates a term. Matching is case-insensitive.

use crate::album::Album;
use crate::filter::{predicate, Predicate, QueryCompiler, QueryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Title,
    People,
    Genre,
    Date,
}

impl TextField {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "album" | "title" => Some(Self::Title),
            "artist" | "albumartist" | "people" | "performer" | "composer" => Some(Self::People),
            "genre" => Some(Self::Genre),
            "date" | "year" => Some(Self::Date),
            _ => None,
        }
    }

    fn matches(self, album: &Album, needle: &str) -> bool {
        match self {
            Self::Title => contains_folded(&album.title, needle),
            Self::People => album
                .people
                .iter()
                .any(|person| contains_folded(person, needle)),
            Self::Genre => contains_folded(&album.genre, needle),
            Self::Date => contains_folded(&album.date, needle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericField {
    Rating,
    Tracks,
    Discs,
    Length,
}

impl NumericField {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rating" => Some(Self::Rating),
            "tracks" => Some(Self::Tracks),
            "discs" => Some(Self::Discs),
            "length" => Some(Self::Length),
            _ => None,
        }
    }

    fn value(self, album: &Album) -> f64 {
        match self {
            Self::Rating => album.rating,
            Self::Tracks => album.track_count() as f64,
            Self::Discs => album.disc_count() as f64,
            Self::Length => album.length_secs() as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
}

impl Comparison {
    fn evaluate(self, left: f64, right: f64) -> bool {
        match self {
            Self::Less => left < right,
            Self::LessOrEqual => left <= right,
            Self::Greater => left > right,
            Self::GreaterOrEqual => left >= right,
            Self::Equal => (left - right).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Bare(String),
    Field(TextField, String),
    Numeric(NumericField, Comparison, f64),
    Not(Box<Term>),
}

impl Term {
    fn matches(&self, album: &Album) -> bool {
        match self {
            Self::Bare(needle) => {
                TextField::Title.matches(album, needle) || TextField::People.matches(album, needle)
            }
            Self::Field(field, needle) => field.matches(album, needle),
            Self::Numeric(field, comparison, value) => {
                comparison.evaluate(field.value(album), *value)
            }
            Self::Not(term) => !term.matches(album),
        }
    }
}

fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    haystack.to_lowercase().contains(folded_needle)
}

struct Scanner {
    chars: Vec<char>,
    position: usize,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn read_quoted(&mut self) -> Result<String, QueryError> {
        let start = self.position;
        self.position += 1;
        let mut value = String::new();
        while let Some(ch) = self.peek() {
            self.position += 1;
            if ch == '"' {
                return Ok(value);
            }
            value.push(ch);
        }
        Err(QueryError::UnterminatedQuote { position: start })
    }

    fn read_word(&mut self, stop_at_equals: bool) -> String {
        let mut value = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || (stop_at_equals && ch == '=') {
                break;
            }
            value.push(ch);
            self.position += 1;
        }
        value
    }

    fn read_numeric(&mut self) -> Result<Term, QueryError> {
        let start = self.position;
        self.position += 2;
        let mut expression = String::new();
        loop {
            match self.peek() {
                Some(')') => {
                    self.position += 1;
                    break;
                }
                Some(ch) => {
                    expression.push(ch);
                    self.position += 1;
                }
                None => {
                    return Err(QueryError::InvalidNumeric {
                        expression,
                        position: start,
                    })
                }
            }
        }
        parse_numeric_expression(&expression).ok_or(QueryError::InvalidNumeric {
            expression,
            position: start,
        })
    }

    fn read_term(&mut self) -> Result<Term, QueryError> {
        let start = self.position;
        match self.peek() {
            Some('!') => {
                self.position += 1;
                Ok(Term::Not(Box::new(self.read_term()?)))
            }
            Some('"') => Ok(Term::Bare(self.read_quoted()?.to_lowercase())),
            Some('#') if self.chars.get(self.position + 1) == Some(&'(') => self.read_numeric(),
            _ => {
                let word = self.read_word(true);
                if self.peek() != Some('=') {
                    return Ok(Term::Bare(word.to_lowercase()));
                }
                self.position += 1;
                if word.is_empty() {
                    return Err(QueryError::EmptyTag { position: start });
                }
                let value = if self.peek() == Some('"') {
                    self.read_quoted()?
                } else {
                    self.read_word(false)
                };
                if value.is_empty() {
                    return Err(QueryError::EmptyValue {
                        tag: word,
                        position: start,
                    });
                }
                let field = TextField::from_tag(&word).ok_or_else(|| QueryError::UnknownTag {
                    tag: word.clone(),
                    position: start,
                })?;
                Ok(Term::Field(field, value.to_lowercase()))
            }
        }
    }
}

fn parse_numeric_expression(expression: &str) -> Option<Term> {
    const OPERATORS: [(&str, Comparison); 5] = [
        ("<=", Comparison::LessOrEqual),
        (">=", Comparison::GreaterOrEqual),
        ("<", Comparison::Less),
        (">", Comparison::Greater),
        ("=", Comparison::Equal),
    ];
    let (index, operator, comparison) = OPERATORS.iter().find_map(|(operator, comparison)| {
        expression
            .find(operator)
            .map(|index| (index, *operator, *comparison))
    })?;
    let field = NumericField::from_name(expression[..index].trim())?;
    let value = expression[index + operator.len()..].trim().parse::<f64>().ok()?;
    Some(Term::Numeric(field, comparison, value))
}

fn parse_terms(text: &str) -> Result<Vec<Term>, QueryError> {
    let mut scanner = Scanner::new(text);
    let mut terms = Vec::new();
    loop {
        scanner.skip_whitespace();
        if scanner.peek().is_none() {
            return Ok(terms);
        }
        terms.push(scanner.read_term()?);
    }
}

/// Default query compiler for the cover grid search box.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleQueryCompiler;

impl QueryCompiler for SimpleQueryCompiler {
    fn is_match_all(&self, text: &str) -> bool {
        text.trim().is_empty()
    }

    fn compile(&self, text: &str) -> Result<Predicate, QueryError> {
        let terms = parse_terms(text)?;
        Ok(predicate(move |album: &Album| {
            terms.iter().all(|term| term.matches(album))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::{AlbumKey, Song};

    fn sample_album() -> Album {
        let mut first = Song::new("/m/1.flac");
        first.length_secs = 200;
        let mut second = Song::new("/m/2.flac");
        second.length_secs = 100;
        Album::new(AlbumKey::new("k").unwrap(), "Dark Side of the Moon")
            .with_people(vec!["Pink Floyd".to_string()])
            .with_genre("Rock")
            .with_date("1973-03-01")
            .with_rating(0.75)
            .with_songs(vec![first, second])
    }

    fn matches(text: &str) -> bool {
        let compiled = SimpleQueryCompiler
            .compile(text)
            .expect("query should compile");
        compiled(&sample_album())
    }

    #[test]
    fn test_bare_terms_search_title_and_people() {
        assert!(matches("moon"));
        assert!(matches("floyd"));
        assert!(matches("dark floyd"));
        assert!(!matches("dark beatles"));
        assert!(matches("\"side of the\""));
    }

    #[test]
    fn test_tag_terms_search_single_field() {
        assert!(matches("genre=rock"));
        assert!(!matches("genre=jazz"));
        assert!(matches("artist=\"pink floyd\""));
        assert!(matches("date=1973"));
        assert!(!matches("album=floyd"));
    }

    #[test]
    fn test_negation_and_numeric_comparisons() {
        assert!(matches("!jazz"));
        assert!(!matches("!moon"));
        assert!(matches("#(rating >= 0.5)"));
        assert!(!matches("#(rating < 0.5)"));
        assert!(matches("#(tracks = 2)"));
        assert!(matches("#(length > 250)"));
    }

    #[test]
    fn test_match_all_only_for_blank_text() {
        assert!(SimpleQueryCompiler.is_match_all(""));
        assert!(SimpleQueryCompiler.is_match_all("   "));
        assert!(!SimpleQueryCompiler.is_match_all("a"));
    }

    #[test]
    fn test_parse_errors_are_reported() {
        assert_eq!(
            parse_terms("moon \"dark").err(),
            Some(QueryError::UnterminatedQuote { position: 5 })
        );
        assert_eq!(
            parse_terms("=rock").err(),
            Some(QueryError::EmptyTag { position: 0 })
        );
        assert!(matches!(
            parse_terms("genre= x"),
            Err(QueryError::EmptyValue { .. })
        ));
        assert!(matches!(
            parse_terms("#(rating ~ 2)"),
            Err(QueryError::InvalidNumeric { .. })
        ));
        assert!(matches!(
            parse_terms("#(rating > 2"),
            Err(QueryError::InvalidNumeric { .. })
        ));
        assert!(matches!(
            parse_terms("mood=happy"),
            Err(QueryError::UnknownTag { .. })
        ));
        assert!(!SimpleQueryCompiler.is_parsable("\"open"));
        assert!(SimpleQueryCompiler.is_parsable(""));
    }
}
