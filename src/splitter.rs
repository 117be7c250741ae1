//! Text splitters and chunk location.
//!
//! A splitter only returns chunk texts. [`locate_chunks`] then finds each
//! text in the flattened corpus to recover character offsets, which is all
//! the reconciler needs.
//!
//! Two splitters are provided:
//! - [`CharacterSplitter`]: fixed-width character windows with overlap.
//! - [`SentenceSplitter`]: sentence-aware packing with overlap carried as
//!   whole trailing sentences.

use std::collections::VecDeque;

use crate::config::{ModelConfig, SplitterKind};
use crate::models::Chunk;

/// Splits long text into overlapping chunk texts.
pub trait TextSplitter {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Build the splitter configured for a model.
pub fn for_model(model: &ModelConfig) -> Box<dyn TextSplitter> {
    match model.splitter {
        SplitterKind::Character => Box::new(CharacterSplitter::new(
            model.chunk_size,
            model.chunk_overlap,
        )),
        SplitterKind::Sentence => Box::new(SentenceSplitter::new(
            model.chunk_size,
            model.chunk_overlap,
        )),
    }
}

// ============ Character windows ============

/// Windows of `chunk_size` characters, each starting `chunk_size -
/// chunk_overlap` characters after the previous one.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }
}

impl TextSplitter for CharacterSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut pieces = Vec::new();
        let mut start = 0usize;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            pieces.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        pieces
    }
}

// ============ Sentence packing ============

/// Packs whole sentences into chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share trailing sentences whose combined length fits
/// within `chunk_overlap`. A sentence longer than `chunk_size` becomes its
/// own oversized chunk.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }
}

impl TextSplitter for SentenceSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        merge_splits(&sentences, self.chunk_size, self.chunk_overlap)
    }
}

fn is_terminal(ch: char) -> bool {
    // U+05C3 is the Hebrew sof pasuq.
    matches!(ch, '.' | '!' | '?' | '\u{05C3}')
}

fn is_closing(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '\u{201D}' | '\u{2019}' | ')' | ']')
}

/// Sentences end at a terminal mark, optionally followed by closing quotes
/// or brackets, when whitespace (or the end of text) follows.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((pos, ch)) = iter.next() {
        if !is_terminal(ch) {
            continue;
        }
        let mut end = pos + ch.len_utf8();
        while let Some(&(p, c)) = iter.peek() {
            if is_terminal(c) || is_closing(c) {
                end = p + c.len_utf8();
                iter.next();
            } else {
                break;
            }
        }
        let at_break = match iter.peek() {
            None => true,
            Some(&(_, c)) => c.is_whitespace(),
        };
        if at_break {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Greedy merge of splits joined by single spaces, keeping a tail of the
/// previous chunk (bounded by `overlap`) at the head of the next.
fn merge_splits(splits: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let len = split.chars().count();

        if total + len + sep_len(&current) > size && !current.is_empty() {
            docs.push(join(&current));
            while total > overlap || (total > 0 && total + len + sep_len(&current) > size) {
                let Some((_, front_len)) = current.pop_front() else {
                    break;
                };
                total -= front_len + sep_len(&current);
            }
        }

        total += len + sep_len(&current);
        current.push_back((split, len));
    }

    if !current.is_empty() {
        docs.push(join(&current));
    }
    docs
}

/// Separator length owed by the next part appended to `parts`.
fn sep_len(parts: &VecDeque<(&str, usize)>) -> usize {
    if parts.is_empty() {
        0
    } else {
        1
    }
}

fn join(parts: &VecDeque<(&str, usize)>) -> String {
    parts.iter().map(|(s, _)| *s).collect::<Vec<_>>().join(" ")
}

// ============ Locating chunks ============

/// Recover character offsets for each chunk text.
///
/// Each text is searched for at or after the cursor. When the splitter
/// normalized whitespace and the exact text is not present, the cursor is
/// taken as the start. After each chunk the cursor moves to `end -
/// overlap`, never before that chunk's start.
pub fn locate_chunks(full_text: &str, pieces: Vec<String>, overlap: usize) -> Vec<Chunk> {
    let offsets = CharOffsets::new(full_text);
    let mut cursor = 0usize;
    let mut chunks = Vec::with_capacity(pieces.len());

    for (index, piece) in pieces.into_iter().enumerate() {
        let start = offsets.find_from(full_text, &piece, cursor).unwrap_or(cursor);
        let end = start + piece.chars().count();
        cursor = end.saturating_sub(overlap).max(start);
        chunks.push(Chunk {
            index,
            text: piece,
            start,
            end,
        });
    }

    chunks
}

/// Byte offset of every character boundary, for char-indexed searching.
struct CharOffsets {
    bytes: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { bytes }
    }

    fn byte_of(&self, char_pos: usize) -> Option<usize> {
        self.bytes.get(char_pos).copied()
    }

    fn char_of(&self, byte_pos: usize) -> usize {
        self.bytes.partition_point(|&b| b < byte_pos)
    }

    fn find_from(&self, haystack: &str, needle: &str, char_from: usize) -> Option<usize> {
        let byte_from = self.byte_of(char_from)?;
        haystack[byte_from..]
            .find(needle)
            .map(|rel| self.char_of(byte_from + rel))
    }
}
