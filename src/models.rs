//! Core data models shared by the corpus builder, the reconciler, and the
//! search side.
//!
//! These types represent the verses, verse boundaries, chunks, and verse
//! references that flow through the chunking pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which language's text a pass operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hebrew,
    English,
}

impl Language {
    /// The language that was not the splitting target.
    pub fn other(self) -> Self {
        match self {
            Language::Hebrew => Language::English,
            Language::English => Language::Hebrew,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Hebrew => "hebrew",
            Language::English => "english",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hebrew" | "he" => Ok(Language::Hebrew),
            "english" | "en" => Ok(Language::English),
            other => anyhow::bail!("Unknown language: '{}'. Use hebrew or english.", other),
        }
    }
}

/// `(chapter, verse)` lookup key. Orders by chapter, then verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerseKey {
    pub chapter: u32,
    pub verse: u32,
}

impl VerseKey {
    pub fn new(chapter: u32, verse: u32) -> Self {
        Self { chapter, verse }
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.verse)
    }
}

impl FromStr for VerseKey {
    type Err = anyhow::Error;

    /// Parses `"12:5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ch, v) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid verse key '{}': expected chapter:verse", s))?;
        let chapter: u32 = ch
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid chapter in '{}'", s))?;
        let verse: u32 = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid verse in '{}'", s))?;
        if chapter == 0 || verse == 0 {
            anyhow::bail!("invalid verse key '{}': chapter and verse start at 1", s);
        }
        Ok(Self { chapter, verse })
    }
}

/// One canonical verse. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerseRecord {
    pub chapter: u32,
    pub verse: u32,
    /// Space-delimited Hebrew tokens.
    pub hebrew: String,
    /// English translation.
    pub english: String,
    /// Strong's tags, aligned token-for-token with `hebrew`.
    pub strongs: String,
}

impl VerseRecord {
    pub fn key(&self) -> VerseKey {
        VerseKey::new(self.chapter, self.verse)
    }

    pub fn text(&self, language: Language) -> &str {
        match language {
            Language::Hebrew => &self.hebrew,
            Language::English => &self.english,
        }
    }
}

/// Absolute character span of one whitespace-delimited token, plus its byte
/// range inside the owning verse text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Where one verse sits inside a flattened corpus string.
///
/// Offsets are character offsets; `end - start` equals the character length
/// of `text`. Token spans are computed once when the boundary is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseBoundary {
    pub key: VerseKey,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub tokens: Vec<TokenSpan>,
}

impl VerseBoundary {
    pub fn word_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, index: usize) -> &str {
        let t = &self.tokens[index];
        &self.text[t.byte_start..t.byte_end]
    }

    /// Tokens `[from, to)` rejoined with single spaces.
    pub fn words(&self, from: usize, to: usize) -> String {
        let to = to.min(self.tokens.len());
        let from = from.min(to);
        (from..to)
            .map(|i| self.token(i))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A contiguous span of flattened text produced by a splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the splitter output, starting at 0.
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Which edge of a verse a partial overlap is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Overlap starts at the verse start.
    Start,
    /// Overlap ends at the verse end. The reference still carries the
    /// covered word count `k` (not a count from the verse end); its text is
    /// the last `k` tokens.
    End,
    /// Overlap touches neither edge; text is approximated from the start.
    Interior,
}

/// A verse covered by a chunk, either entirely or by a run of words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerseRef {
    Full(VerseKey),
    Partial {
        key: VerseKey,
        word_start: usize,
        word_count: usize,
        side: Side,
    },
}

impl VerseRef {
    pub fn key(&self) -> VerseKey {
        match self {
            VerseRef::Full(key) => *key,
            VerseRef::Partial { key, .. } => *key,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, VerseRef::Full(_))
    }

    /// Verse label used in titles: `"4"` for a full verse, `"4.7"` for the
    /// partial verse 4 carrying 7 words.
    pub fn verse_label(&self) -> String {
        match self {
            VerseRef::Full(key) => key.verse.to_string(),
            VerseRef::Partial {
                key, word_count, ..
            } => format!("{}.{}", key.verse, word_count),
        }
    }

    /// Compatibility encoding: the covered word count written as the
    /// fractional digits of the verse number.
    ///
    /// The decimal keeps its literal digits, so `3.10` (ten words) stays
    /// distinct from `3.1` (one word).
    pub fn to_verse_number(&self) -> VerseNumber {
        let key = self.key();
        let verse = match self {
            VerseRef::Full(_) => serde_json::Number::from(key.verse),
            VerseRef::Partial { .. } => serde_json::from_str(&self.verse_label())
                .unwrap_or_else(|_| serde_json::Number::from(key.verse)),
        };
        VerseNumber {
            chapter: key.chapter,
            verse,
        }
    }
}

/// A persisted verse reference: `{ "chapter": 1, "verse": 2 }` or
/// `{ "chapter": 1, "verse": 2.7 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseNumber {
    pub chapter: u32,
    pub verse: serde_json::Number,
}

impl VerseNumber {
    pub fn full(key: VerseKey) -> Self {
        Self {
            chapter: key.chapter,
            verse: serde_json::Number::from(key.verse),
        }
    }

    pub fn is_decimal(&self) -> bool {
        self.verse.is_f64()
    }

    /// Integer part of the verse number.
    pub fn base_verse(&self) -> u32 {
        if let Some(v) = self.verse.as_u64() {
            return u32::try_from(v).unwrap_or(0);
        }
        self.verse.as_f64().map(|v| v.trunc() as u32).unwrap_or(0)
    }

    pub fn key(&self) -> VerseKey {
        VerseKey::new(self.chapter, self.base_verse())
    }

    /// A decimal whose fractional part is zero, e.g. `3.0`.
    pub fn is_trailing_zero(&self) -> bool {
        self.verse
            .as_f64()
            .map(|v| self.is_decimal() && v.fract() == 0.0)
            .unwrap_or(false)
    }

    /// Word count carried in the fractional digits, if this is a partial
    /// reference. Read from the literal digits, not a float.
    pub fn partial_word_count(&self) -> Option<usize> {
        if !self.is_decimal() || self.is_trailing_zero() {
            return None;
        }
        let rendered = self.verse.to_string();
        let (_, digits) = rendered.split_once('.')?;
        digits.parse().ok()
    }

    /// Title label: bare integer when the verse is whole, else the decimal.
    pub fn label(&self) -> String {
        match self.partial_word_count() {
            Some(n) => format!("{}.{}", self.base_verse(), n),
            None => self.base_verse().to_string(),
        }
    }

    /// Rewrite `x.0` as the integer `x`. Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        if self.is_trailing_zero() {
            self.verse = serde_json::Number::from(self.base_verse());
            true
        } else {
            false
        }
    }
}

impl fmt::Display for VerseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.verse)
    }
}

/// The final embeddable unit, serialized with the field order downstream
/// consumers expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub title: String,
    /// English text.
    pub text: String,
    pub verses: Vec<VerseNumber>,
    #[serde(default)]
    pub hebrew: String,
    #[serde(default)]
    pub strongs: String,
}
