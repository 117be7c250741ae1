//! Chunk-to-verse reconciliation.
//!
//! Maps a located chunk back to the verses it covers. Each overlapped verse
//! is classified as full or partial, and the record is assembled with the
//! split language carrying exactly the covered words while the other
//! language always carries whole verses.
//!
//! # Classification
//!
//! For every verse whose span intersects the chunk:
//!
//! 1. Tokens whose span intersects the overlap are counted (`k`).
//! 2. The verse is full when `k` covers every token, or when the overlap
//!    reaches both verse edges within [`FULL_SPAN_TOLERANCE`] characters.
//! 3. Otherwise an overlap anchored at the verse start takes the first `k`
//!    tokens, one anchored at the end takes the last `k`, and an interior
//!    overlap is approximated by the first `k` tokens.
//!
//! Overlaps that contain no token (a chunk edge sitting in whitespace) are
//! dropped unless the tolerance makes the verse full.

use std::collections::BTreeSet;
use std::fmt;

use crate::corpus::{FlattenedCorpus, VerseTable};
use crate::models::{Chunk, ChunkRecord, Language, Side, VerseBoundary, VerseKey, VerseRef};

/// Characters of drift allowed at each verse edge before an overlap stops
/// counting as the whole verse.
pub const FULL_SPAN_TOLERANCE: usize = 2;

/// One verse overlapped by a chunk, with the split-language text taken from
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct VerseMatch {
    pub reference: VerseRef,
    pub text: String,
    /// Tokens in the whole verse.
    pub total_words: usize,
}

/// A recoverable data-integrity problem found while reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileWarning {
    /// A covered verse has no entry in the lookup table.
    MissingVerse { record_id: String, key: VerseKey },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::MissingVerse { record_id, key } => {
                write!(f, "{}: verse {} not found in lookup table", record_id, key)
            }
        }
    }
}

/// Every verse the chunk overlaps, in corpus order.
pub fn match_verses(chunk: &Chunk, boundaries: &[VerseBoundary]) -> Vec<VerseMatch> {
    // Boundaries are sorted and disjoint; skip everything ending at or
    // before the chunk start.
    let first = boundaries.partition_point(|b| b.end <= chunk.start);

    boundaries[first..]
        .iter()
        .take_while(|b| b.start < chunk.end)
        .filter_map(|b| classify(chunk, b))
        .collect()
}

fn classify(chunk: &Chunk, verse: &VerseBoundary) -> Option<VerseMatch> {
    let overlap_start = chunk.start.max(verse.start);
    let overlap_end = chunk.end.min(verse.end);
    if overlap_start >= overlap_end {
        return None;
    }

    let covered = verse
        .tokens
        .iter()
        .filter(|t| t.start < overlap_end && t.end > overlap_start)
        .count();
    let total = verse.word_count();

    let within_tolerance = overlap_start - verse.start <= FULL_SPAN_TOLERANCE
        && verse.end - overlap_end <= FULL_SPAN_TOLERANCE;

    if covered >= total || within_tolerance {
        return Some(VerseMatch {
            reference: VerseRef::Full(verse.key),
            text: verse.text.clone(),
            total_words: total,
        });
    }

    if covered == 0 {
        return None;
    }

    let (side, word_start) = if overlap_start == verse.start {
        (Side::Start, 0)
    } else if overlap_end == verse.end {
        (Side::End, total - covered)
    } else {
        (Side::Interior, 0)
    };

    Some(VerseMatch {
        reference: VerseRef::Partial {
            key: verse.key,
            word_start,
            word_count: covered,
            side,
        },
        text: verse.words(word_start, word_start + covered),
        total_words: total,
    })
}

/// Turns located chunks into records for one model.
///
/// Chunks must be fed in splitter order. Warnings about verses missing from
/// the lookup table are emitted once per verse key.
pub struct Reconciler<'a> {
    model: String,
    book: String,
    corpus: &'a FlattenedCorpus,
    table: &'a VerseTable,
    warned: BTreeSet<VerseKey>,
    warnings: Vec<ReconcileWarning>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        model: impl Into<String>,
        book: impl Into<String>,
        corpus: &'a FlattenedCorpus,
        table: &'a VerseTable,
    ) -> Self {
        Self {
            model: model.into(),
            book: book.into(),
            corpus,
            table,
            warned: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_id(&self, chunk: &Chunk) -> String {
        format!("agentic_{}_{:03}", self.model, chunk.index + 1)
    }

    /// Build the record for one chunk, or `None` when it covers no
    /// resolvable verse.
    pub fn reconcile(&mut self, chunk: &Chunk) -> Option<ChunkRecord> {
        let record_id = self.record_id(chunk);
        let mut matches = match_verses(chunk, &self.corpus.boundaries);

        matches.retain(|m| {
            let key = m.reference.key();
            if self.table.contains(key) {
                return true;
            }
            if self.warned.insert(key) {
                tracing::warn!(record_id = %record_id, verse = %key, "verse not found in lookup table");
                self.warnings.push(ReconcileWarning::MissingVerse {
                    record_id: record_id.clone(),
                    key,
                });
            }
            false
        });

        if matches.is_empty() {
            tracing::info!(record_id = %record_id, start = chunk.start, end = chunk.end, "chunk covers no verse; skipped");
            return None;
        }

        let language = self.corpus.language;
        let split_text = join_nonempty(matches.iter().map(|m| m.text.as_str()));

        let touched: BTreeSet<VerseKey> = matches.iter().map(|m| m.reference.key()).collect();
        let other_text = join_nonempty(touched.iter().map(|k| self.table.text(*k, language.other())));

        let strongs = match language {
            Language::Hebrew => join_nonempty(matches.iter().map(|m| self.strongs_for(&m.reference))),
            Language::English => join_nonempty(touched.iter().map(|k| self.table.strongs(*k))),
        };

        let (text, hebrew) = match language {
            Language::Hebrew => (other_text, split_text),
            Language::English => (split_text, other_text),
        };

        let labels: Vec<String> = matches
            .iter()
            .map(|m| format!("{}:{}", m.reference.key().chapter, m.reference.verse_label()))
            .collect();

        Some(ChunkRecord {
            id: record_id,
            title: format!("{} {}", self.book, labels.join(", ")),
            text,
            verses: matches.iter().map(|m| m.reference.to_verse_number()).collect(),
            hebrew,
            strongs,
        })
    }

    /// Strong's tags for the Hebrew tokens a reference covers. Falls back to
    /// the whole verse when the tags are shorter than the token range.
    fn strongs_for(&self, reference: &VerseRef) -> &'a str {
        let tags = self.table.strongs(reference.key());
        match reference {
            VerseRef::Full(_) => tags,
            VerseRef::Partial {
                word_start,
                word_count,
                ..
            } => token_range(tags, *word_start, *word_count).unwrap_or(tags),
        }
    }

    pub fn warnings(&self) -> &[ReconcileWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ReconcileWarning> {
        self.warnings
    }
}

/// Slice of `text` spanning whitespace tokens `[start, start + count)`.
fn token_range(text: &str, start: usize, count: usize) -> Option<&str> {
    let spans = crate::corpus::token_spans(text, 0);
    let first = spans.get(start)?;
    let last = spans.get(start + count.checked_sub(1)?)?;
    Some(&text[first.byte_start..last.byte_end])
}

fn join_nonempty<'s>(parts: impl Iterator<Item = &'s str>) -> String {
    parts.filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ")
}
