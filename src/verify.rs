//! Verification pass over persisted records.
//!
//! Re-reads record files and reports data-quality defects for human review:
//! trailing-zero decimals, unknown verses, partial verses whose text is too
//! long or looks whole, verses missing words, and other-language text that
//! does not add up to the touched verses. Nothing is repaired here.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::Config;
use crate::corpus::VerseTable;
use crate::models::{ChunkRecord, Language, VerseKey, VerseNumber};
use crate::records::{self, RecordLevel};

/// Issues printed per level before eliding the rest.
const SHOW_PER_LEVEL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    TrailingZeroDecimal {
        record_id: String,
        verse: VerseNumber,
    },
    UnknownVerse {
        record_id: String,
        key: VerseKey,
    },
    PartialTooLong {
        record_id: String,
        verse: VerseNumber,
        language: Language,
        found: usize,
        expected: usize,
    },
    PartialLooksFull {
        record_id: String,
        verse: VerseNumber,
        language: Language,
        found: usize,
        full: usize,
    },
    MissingWords {
        record_id: String,
        verse: VerseNumber,
        language: Language,
        found: usize,
        full: usize,
    },
    OtherLanguageMismatch {
        record_id: String,
        language: Language,
        found: usize,
        expected: usize,
    },
}

impl Issue {
    pub fn kind(&self) -> &'static str {
        match self {
            Issue::TrailingZeroDecimal { .. } => "trailing_zero_decimal",
            Issue::UnknownVerse { .. } => "unknown_verse",
            Issue::PartialTooLong { .. } => "partial_too_long",
            Issue::PartialLooksFull { .. } => "partial_looks_full",
            Issue::MissingWords { .. } => "missing_words",
            Issue::OtherLanguageMismatch { .. } => "other_language_mismatch",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::TrailingZeroDecimal { record_id, verse } => {
                write!(f, "{}: verse {} should be an integer (has .0)", record_id, verse)
            }
            Issue::UnknownVerse { record_id, key } => {
                write!(f, "{}: verse {} not found in verse table", record_id, key)
            }
            Issue::PartialTooLong {
                record_id,
                verse,
                language,
                found,
                expected,
            } => write!(
                f,
                "{}: verse {} {} has {} words, expected ~{}",
                record_id, verse, language, found, expected
            ),
            Issue::PartialLooksFull {
                record_id,
                verse,
                language,
                found,
                full,
            } => write!(
                f,
                "{}: verse {} {} appears to be the full verse ({} words, verse has {})",
                record_id, verse, language, found, full
            ),
            Issue::MissingWords {
                record_id,
                verse,
                language,
                found,
                full,
            } => write!(
                f,
                "{}: verse {} {} may be missing words ({} vs {})",
                record_id, verse, language, found, full
            ),
            Issue::OtherLanguageMismatch {
                record_id,
                language,
                found,
                expected,
            } => write!(
                f,
                "{}: {} has {} words, touched verses have {}",
                record_id, language, found, expected
            ),
        }
    }
}

fn field(record: &ChunkRecord, language: Language) -> &str {
    match language {
        Language::Hebrew => &record.hebrew,
        Language::English => &record.text,
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Walk a record's text for one language and count the words attributed to
/// each verse.
///
/// At each position the longest run of consecutive words from the verse
/// (starting anywhere in the verse) is consumed, so leading, trailing and
/// whole-verse portions are all recognized. `None` marks a verse with no
/// text at the current position, which is left unverified.
fn verse_word_counts(
    record_text: &str,
    verses: &[VerseNumber],
    table: &VerseTable,
    language: Language,
) -> Vec<Option<usize>> {
    let tokens: Vec<&str> = record_text.split_whitespace().collect();
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(verses.len());

    for v in verses {
        let words: Vec<&str> = table.text(v.key(), language).split_whitespace().collect();
        let best = (0..words.len())
            .map(|s| {
                words[s..]
                    .iter()
                    .zip(&tokens[pos..])
                    .take_while(|(a, b)| a == b)
                    .count()
            })
            .max()
            .unwrap_or(0);

        if best == 0 {
            out.push(None);
        } else {
            pos += best;
            out.push(Some(best));
        }
    }

    out
}

/// Check one record. `split` is the language the record's chunk was cut
/// from; `None` means every verse is expected whole in both languages.
pub fn check_record(
    record: &ChunkRecord,
    table: &VerseTable,
    split: Option<Language>,
    tolerance: usize,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let record_id = &record.id;

    let counted: Vec<(Language, Vec<Option<usize>>)> = [Language::Hebrew, Language::English]
        .into_iter()
        .map(|lang| (lang, verse_word_counts(field(record, lang), &record.verses, table, lang)))
        .collect();

    for (i, v) in record.verses.iter().enumerate() {
        if v.is_trailing_zero() {
            issues.push(Issue::TrailingZeroDecimal {
                record_id: record_id.clone(),
                verse: v.clone(),
            });
            continue;
        }
        let key = v.key();
        if !table.contains(key) {
            issues.push(Issue::UnknownVerse {
                record_id: record_id.clone(),
                key,
            });
            continue;
        }

        for (lang, counts) in &counted {
            let Some(found) = counts[i] else {
                continue;
            };
            let full = word_count(table.text(key, *lang));

            match v.partial_word_count() {
                Some(expected) if split == Some(*lang) => {
                    if found > expected + tolerance {
                        issues.push(Issue::PartialTooLong {
                            record_id: record_id.clone(),
                            verse: v.clone(),
                            language: *lang,
                            found,
                            expected,
                        });
                    } else if found >= full {
                        issues.push(Issue::PartialLooksFull {
                            record_id: record_id.clone(),
                            verse: v.clone(),
                            language: *lang,
                            found,
                            full,
                        });
                    }
                }
                _ => {
                    if found + tolerance < full {
                        issues.push(Issue::MissingWords {
                            record_id: record_id.clone(),
                            verse: v.clone(),
                            language: *lang,
                            found,
                            full,
                        });
                    }
                }
            }
        }
    }

    if let Some(split) = split {
        let other = split.other();
        let touched: BTreeSet<VerseKey> = record
            .verses
            .iter()
            .map(|v| v.key())
            .filter(|k| table.contains(*k))
            .collect();
        let expected: usize = touched
            .iter()
            .map(|k| word_count(table.text(*k, other)))
            .sum();
        let found = word_count(field(record, other));
        if found != expected {
            issues.push(Issue::OtherLanguageMismatch {
                record_id: record_id.clone(),
                language: other,
                found,
                expected,
            });
        }
    }

    issues
}

pub fn run_verify(config: &Config, levels: &[String]) -> Result<()> {
    let table = VerseTable::load(&config.corpus.verses)?;
    let dir = &config.corpus.records_dir;

    let levels: Vec<RecordLevel> = if levels.is_empty() {
        records::available_levels(dir)?
            .into_iter()
            .filter(|l| l.is_agentic())
            .collect()
    } else {
        levels
            .iter()
            .map(|l| l.parse())
            .collect::<Result<Vec<_>>>()?
    };

    if levels.is_empty() {
        println!("verify: no chunk record files in {}", dir.display());
        return Ok(());
    }

    let tolerance = config.verification.word_tolerance;
    let mut total = 0usize;

    for level in &levels {
        let recs = records::load_records(dir, level)?;
        let split = match level {
            RecordLevel::Agentic(model) => match config.models.get(model) {
                Some(m) => Some(m.language),
                None => {
                    tracing::warn!(level = %level, "model is not configured; checking as whole verses");
                    None
                }
            },
            _ => None,
        };

        let issues: Vec<Issue> = recs
            .iter()
            .flat_map(|r| check_record(r, &table, split, tolerance))
            .collect();

        let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
        for issue in &issues {
            *by_kind.entry(issue.kind()).or_default() += 1;
        }

        println!("verify {}", level);
        println!("  records: {}", recs.len());
        println!("  issues: {}", issues.len());
        for (kind, count) in &by_kind {
            println!("    {}: {}", kind, count);
        }
        for issue in issues.iter().take(SHOW_PER_LEVEL) {
            println!("  {}", issue);
        }
        if issues.len() > SHOW_PER_LEVEL {
            println!("  ... and {} more", issues.len() - SHOW_PER_LEVEL);
        }

        total += issues.len();
    }

    println!("total issues: {}", total);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_model_records;
    use crate::config::{ModelConfig, SplitterKind};
    use crate::corpus::tests::verse;
    use crate::progress::NoProgress;

    fn table() -> VerseTable {
        VerseTable::from_records(vec![
            verse(1, 1, "e1 e2 e3 e4 e5 e6", "h1 h2 h3 h4 h5", "s1 s2 s3 s4 s5"),
            verse(1, 2, "f1 f2 f3", "g1 g2 g3 g4", "t1 t2 t3 t4"),
        ])
    }

    fn record(verses: &str, text: &str, hebrew: &str) -> ChunkRecord {
        ChunkRecord {
            id: "agentic_berit_001".to_string(),
            title: String::new(),
            text: text.to_string(),
            verses: serde_json::from_str(verses).unwrap(),
            hebrew: hebrew.to_string(),
            strongs: String::new(),
        }
    }

    fn kinds(issues: &[Issue]) -> Vec<&'static str> {
        issues.iter().map(|i| i.kind()).collect()
    }

    #[test]
    fn well_formed_hebrew_record_is_clean() {
        let r = record(
            r#"[{"chapter":1,"verse":1.2},{"chapter":1,"verse":2}]"#,
            "e1 e2 e3 e4 e5 e6 f1 f2 f3",
            "h4 h5 g1 g2 g3 g4",
        );
        assert!(check_record(&r, &table(), Some(Language::Hebrew), 2).is_empty());
    }

    #[test]
    fn trailing_zero_and_unknown_verse_are_reported() {
        let r = record(
            r#"[{"chapter":1,"verse":2.0},{"chapter":9,"verse":9}]"#,
            "f1 f2 f3",
            "g1 g2 g3 g4",
        );
        let issues = check_record(&r, &table(), Some(Language::Hebrew), 2);
        assert_eq!(kinds(&issues), vec!["trailing_zero_decimal", "unknown_verse"]);
    }

    #[test]
    fn partial_carrying_whole_verse_looks_full() {
        let r = record(
            r#"[{"chapter":1,"verse":1.3}]"#,
            "e1 e2 e3 e4 e5 e6",
            "h1 h2 h3 h4 h5",
        );
        let issues = check_record(&r, &table(), Some(Language::Hebrew), 2);
        assert_eq!(kinds(&issues), vec!["partial_looks_full"]);

        let issues = check_record(&r, &table(), Some(Language::Hebrew), 1);
        assert_eq!(kinds(&issues), vec!["partial_too_long"]);
    }

    #[test]
    fn truncated_other_language_is_reported() {
        let r = record(
            r#"[{"chapter":1,"verse":1.2}]"#,
            "e1 e2 e3",
            "h1 h2",
        );
        let issues = check_record(&r, &table(), Some(Language::Hebrew), 2);
        assert_eq!(kinds(&issues), vec!["missing_words", "other_language_mismatch"]);
        assert!(issues[1].to_string().contains("english has 3 words, touched verses have 6"));
    }

    #[test]
    fn missing_words_in_full_verse() {
        let r = record(r#"[{"chapter":1,"verse":1}]"#, "e1 e2 e3 e4 e5 e6", "h1 h2");
        let issues = check_record(&r, &table(), None, 2);
        assert_eq!(kinds(&issues), vec!["missing_words"]);
        assert!(check_record(&r, &table(), None, 3).is_empty());

        let r = record(r#"[{"chapter":1,"verse":1}]"#, "e1 e2 e3 e4 e5 e6", "h1 h2 h3 h4 h5");
        assert!(check_record(&r, &table(), Some(Language::English), 0).is_empty());
    }

    #[test]
    fn built_records_verify_clean() {
        let table = VerseTable::from_records(vec![
            verse(1, 1, "In the beginning God created the heavens and the earth.", "b1 b2 b3 b4 b5 b6 b7", "s1 s2 s3 s4 s5 s6 s7"),
            verse(1, 2, "Now the earth was formless and void.", "c1 c2 c3 c4", "s8 s9 s10 s11"),
            verse(1, 3, "Then God said, Let there be light.", "d1 d2 d3 d4", "s12 s13 s14 s15"),
        ]);
        let model = ModelConfig {
            language: Language::Hebrew,
            chunk_size: 12,
            chunk_overlap: 3,
            splitter: SplitterKind::Character,
            embedding_model: None,
            dims: None,
        };
        let build = build_model_records("berit", &model, &table, "Genesis", &NoProgress);
        assert!(!build.records.is_empty());
        for r in &build.records {
            let issues = check_record(r, &table, Some(Language::Hebrew), 2);
            assert!(issues.is_empty(), "{}: {:?}", r.id, issues);
        }
    }

    #[test]
    fn ten_word_partial_verifies_clean() {
        let table = VerseTable::from_records(vec![
            verse(1, 1, "aa ab ac ad ae af ag ah ai aj ak al am an ao", "h1 h2 h3 h4 h5", "s1 s2 s3 s4 s5"),
            verse(1, 2, "ba bb bc", "g1 g2", "s6 s7"),
        ]);
        // The first window ends right after "aj", the tenth word.
        let model = ModelConfig {
            language: Language::English,
            chunk_size: 29,
            chunk_overlap: 5,
            splitter: SplitterKind::Character,
            embedding_model: None,
            dims: None,
        };
        let build = build_model_records("tiny", &model, &table, "Genesis", &NoProgress);
        assert_eq!(build.records.len(), 2);

        let first = &build.records[0];
        assert_eq!(first.verses[0].partial_word_count(), Some(10));
        assert_eq!(first.title, "Genesis 1:1.10");
        assert_eq!(
            serde_json::to_string(&first.verses).unwrap(),
            r#"[{"chapter":1,"verse":1.10}]"#
        );

        for r in &build.records {
            let issues = check_record(r, &table, Some(Language::English), 2);
            assert!(issues.is_empty(), "{}: {:?}", r.id, issues);
        }
    }
}
