//! Verse corpus builder.
//!
//! Loads the verse table keyed by `(chapter, verse)` and flattens it, for one
//! target language, into a single space-separated string with the exact
//! character span each verse occupies.
//!
//! # Offsets
//!
//! All offsets are character offsets (Unicode scalar values), so Hebrew text
//! with vowel points and cantillation counts the same way the splitter and
//! the reconciler count it. Verses with empty text in the target language
//! contribute neither a boundary nor a separator.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{Language, TokenSpan, VerseBoundary, VerseKey, VerseRecord};

/// Separator placed between adjacent verses in a flattened corpus.
pub const SEPARATOR: char = ' ';

/// Load-time corpus failures. Nothing downstream can proceed after one.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("missing corpus data at {path}: {reason}")]
    MissingCorpusData { path: PathBuf, reason: String },
}

/// One entry of the on-disk verse table.
///
/// Accepts both the flat lookup form (`chapter`, `verse`, `text`, `hebrew`,
/// `strongs`) and the verse-record form, where the key comes from the first
/// entry of `verses`.
#[derive(Debug, Deserialize)]
struct RawVerse {
    chapter: Option<u32>,
    verse: Option<u32>,
    #[serde(default)]
    verses: Vec<RawVerseRef>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    hebrew: String,
    #[serde(default)]
    strongs: String,
}

#[derive(Debug, Deserialize)]
struct RawVerseRef {
    chapter: u32,
    verse: u32,
}

impl RawVerse {
    fn key(&self) -> Option<VerseKey> {
        match (self.chapter, self.verse) {
            (Some(c), Some(v)) => Some(VerseKey::new(c, v)),
            _ => self
                .verses
                .first()
                .map(|r| VerseKey::new(r.chapter, r.verse)),
        }
    }
}

/// Immutable verse lookup table.
#[derive(Debug, Clone, Default)]
pub struct VerseTable {
    verses: BTreeMap<VerseKey, VerseRecord>,
}

impl VerseTable {
    pub fn from_records(records: impl IntoIterator<Item = VerseRecord>) -> Self {
        let verses = records.into_iter().map(|r| (r.key(), r)).collect();
        Self { verses }
    }

    /// Load the verse table from a JSON file.
    ///
    /// A missing, unreadable, malformed, or empty table is fatal.
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let missing = |reason: String| CorpusError::MissingCorpusData {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| missing(e.to_string()))?;
        let raw: Vec<RawVerse> =
            serde_json::from_str(&content).map_err(|e| missing(format!("malformed JSON: {}", e)))?;

        let mut records = Vec::with_capacity(raw.len());
        for (i, entry) in raw.into_iter().enumerate() {
            let key = entry
                .key()
                .ok_or_else(|| missing(format!("entry {} has no chapter/verse", i)))?;
            records.push(VerseRecord {
                chapter: key.chapter,
                verse: key.verse,
                hebrew: normalize_whitespace(&entry.hebrew),
                english: entry.text.trim().to_string(),
                strongs: normalize_whitespace(&entry.strongs),
            });
        }

        if records.is_empty() {
            return Err(missing("verse table is empty".to_string()));
        }

        for r in &records {
            let heb = r.hebrew.split_whitespace().count();
            let strongs = r.strongs.split_whitespace().count();
            if heb > 0 && strongs > 0 && heb != strongs {
                tracing::warn!(
                    verse = %r.key(),
                    hebrew_tokens = heb,
                    strongs_tokens = strongs,
                    "Strong's tags are not aligned with Hebrew tokens"
                );
            }
        }

        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn get(&self, key: VerseKey) -> Option<&VerseRecord> {
        self.verses.get(&key)
    }

    pub fn contains(&self, key: VerseKey) -> bool {
        self.verses.contains_key(&key)
    }

    /// Text of one verse; an absent key reads as empty.
    pub fn text(&self, key: VerseKey, language: Language) -> &str {
        self.get(key).map(|r| r.text(language)).unwrap_or("")
    }

    pub fn strongs(&self, key: VerseKey) -> &str {
        self.get(key).map(|r| r.strongs.as_str()).unwrap_or("")
    }

    /// Keys in strictly increasing `(chapter, verse)` order.
    pub fn keys(&self) -> Vec<VerseKey> {
        self.verses.keys().copied().collect()
    }

    /// Ordered, space-joined text of the inclusive span `from..=to`.
    pub fn span(&self, from: VerseKey, to: VerseKey, language: Language) -> String {
        if from > to {
            return String::new();
        }
        self.verses
            .range(from..=to)
            .map(|(_, r)| r.text(language))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Concatenate the given keys in the given order, returning the keys
    /// that had no text.
    pub fn text_for(&self, keys: &[VerseKey], language: Language) -> (String, Vec<VerseKey>) {
        let mut parts = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.get(*key).map(|r| r.text(language)) {
                Some(t) if !t.is_empty() => parts.push(t),
                _ => missing.push(*key),
            }
        }
        (parts.join(" "), missing)
    }

    /// Flatten the whole table in key order.
    pub fn flatten(&self, language: Language) -> FlattenedCorpus {
        flatten(&self.keys(), self, language)
    }
}

/// A flattened corpus for one language plus per-verse boundaries.
#[derive(Debug, Clone)]
pub struct FlattenedCorpus {
    pub language: Language,
    pub text: String,
    pub boundaries: Vec<VerseBoundary>,
}

impl FlattenedCorpus {
    /// Length of `text` in characters.
    pub fn char_len(&self) -> usize {
        self.boundaries.last().map(|b| b.end).unwrap_or(0)
    }

    pub fn boundary(&self, key: VerseKey) -> Option<&VerseBoundary> {
        self.boundaries
            .binary_search_by(|b| b.key.cmp(&key))
            .ok()
            .map(|i| &self.boundaries[i])
    }
}

/// Join every key's target-language text with [`SEPARATOR`], recording each
/// verse's `[start, end)` character span.
///
/// Keys whose text is empty (or absent from the table) are skipped and do
/// not consume a separator.
pub fn flatten(keys: &[VerseKey], table: &VerseTable, language: Language) -> FlattenedCorpus {
    let mut text = String::new();
    let mut boundaries = Vec::with_capacity(keys.len());
    let mut cursor = 0usize;

    for key in keys {
        let verse_text = table.text(*key, language);
        if verse_text.is_empty() {
            continue;
        }

        if !boundaries.is_empty() {
            text.push(SEPARATOR);
            cursor += 1;
        }

        let start = cursor;
        let end = start + verse_text.chars().count();
        text.push_str(verse_text);

        boundaries.push(VerseBoundary {
            key: *key,
            start,
            end,
            text: verse_text.to_string(),
            tokens: token_spans(verse_text, start),
        });
        cursor = end;
    }

    FlattenedCorpus {
        language,
        text,
        boundaries,
    }
}

/// Whitespace tokens of `text` with absolute character spans starting at
/// `base`. Tokens are located left to right, so repeated words resolve to
/// successive positions.
pub fn token_spans(text: &str, base: usize) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut current: Option<(usize, usize)> = None; // (char start, byte start)

    for (char_pos, (byte_pos, ch)) in text.char_indices().enumerate() {
        if ch.is_whitespace() {
            if let Some((cs, bs)) = current.take() {
                spans.push(TokenSpan {
                    start: base + cs,
                    end: base + char_pos,
                    byte_start: bs,
                    byte_end: byte_pos,
                });
            }
        } else if current.is_none() {
            current = Some((char_pos, byte_pos));
        }
    }

    if let Some((cs, bs)) = current {
        spans.push(TokenSpan {
            start: base + cs,
            end: base + text.chars().count(),
            byte_start: bs,
            byte_end: text.len(),
        });
    }

    spans
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
