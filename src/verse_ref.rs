//! Verse references for search queries.
//!
//! Accepted forms, separated by commas or semicolons:
//!
//! - `Genesis 1:1`, `Gen. 1:1`, `1:1`
//! - `Gen 1:1-5` (inclusive range within a chapter)
//! - `Gen 1:1 Gen 1:5` (same range, written as two endpoints)
//! - `Gen 1:1, 3` (a bare verse reuses the previous chapter)
//! - a JSON array `[{"chapter": 1, "verse": 1}, ...]`
//!
//! Results keep input order with duplicates removed.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::models::VerseKey;

const GENESIS_NAMES: &[&str] = &["genesis", "gen", "ge", "gn"];

#[derive(Deserialize)]
struct JsonVerse {
    chapter: u32,
    verse: u32,
}

pub fn parse_refs(input: &str) -> Result<Vec<VerseKey>> {
    let input = input.trim();
    if input.is_empty() {
        bail!("verse reference must not be empty");
    }

    let keys = if input.starts_with('[') {
        parse_json(input)?
    } else {
        parse_text(input)?
    };

    let mut seen = std::collections::HashSet::new();
    let keys: Vec<VerseKey> = keys.into_iter().filter(|k| seen.insert(*k)).collect();
    if keys.is_empty() {
        bail!("verse reference must name at least one verse");
    }
    Ok(keys)
}

/// `[{"chapter": c, "verse": v}, ...]`.
pub fn parse_json(input: &str) -> Result<Vec<VerseKey>> {
    let raw: Vec<JsonVerse> =
        serde_json::from_str(input).context("search_verses must be a JSON array of {chapter, verse}")?;
    raw.into_iter()
        .map(|v| {
            if v.chapter == 0 || v.verse == 0 {
                bail!("invalid chapter or verse value: {}:{}", v.chapter, v.verse);
            }
            Ok(VerseKey::new(v.chapter, v.verse))
        })
        .collect()
}

fn parse_text(input: &str) -> Result<Vec<VerseKey>> {
    let mut keys = Vec::new();
    let mut last_chapter: Option<u32> = None;

    for part in input.split([',', ';']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let points: Vec<&str> = part
            .split_whitespace()
            .filter(|t| !is_book_name(t))
            .collect();

        if let Some(book) = part.split_whitespace().find(|t| looks_like_book(t) && !is_book_name(t)) {
            bail!("unsupported book '{}': only Genesis is indexed", book);
        }

        match points.as_slice() {
            [single] => {
                let expanded = parse_point(single, last_chapter)?;
                last_chapter = expanded.last().map(|k| k.chapter);
                keys.extend(expanded);
            }
            [from, to] => {
                let from: VerseKey = from.parse()?;
                let to: VerseKey = to.parse()?;
                keys.extend(expand_range(from, to)?);
                last_chapter = Some(to.chapter);
            }
            _ => bail!("cannot parse verse reference '{}'", part),
        }
    }

    Ok(keys)
}

/// `c:v`, `c:v-w`, or a bare `v` in the previous chapter.
fn parse_point(token: &str, last_chapter: Option<u32>) -> Result<Vec<VerseKey>> {
    if let Some((chapter, verses)) = token.split_once(':') {
        let chapter: u32 = chapter
            .parse()
            .with_context(|| format!("invalid chapter in '{}'", token))?;
        return match verses.split_once('-') {
            Some((a, b)) => {
                let from = VerseKey::new(chapter, parse_verse(a, token)?);
                let to = VerseKey::new(chapter, parse_verse(b, token)?);
                expand_range(from, to)
            }
            None => Ok(vec![format!("{}:{}", chapter, verses).parse()?]),
        };
    }

    let chapter = last_chapter
        .with_context(|| format!("'{}' needs a chapter, e.g. 1:{}", token, token))?;
    Ok(vec![VerseKey::new(chapter, parse_verse(token, token)?)])
}

fn parse_verse(s: &str, token: &str) -> Result<u32> {
    match s.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => bail!("invalid verse in '{}'", token),
    }
}

fn expand_range(from: VerseKey, to: VerseKey) -> Result<Vec<VerseKey>> {
    if from.chapter != to.chapter {
        bail!(
            "range must be within one chapter: {} != {}",
            from.chapter,
            to.chapter
        );
    }
    let (lo, hi) = if from.verse <= to.verse {
        (from.verse, to.verse)
    } else {
        (to.verse, from.verse)
    };
    Ok((lo..=hi).map(|v| VerseKey::new(from.chapter, v)).collect())
}

fn is_book_name(token: &str) -> bool {
    let normalized = token.trim_end_matches('.').to_ascii_lowercase();
    GENESIS_NAMES.contains(&normalized.as_str())
}

fn looks_like_book(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(c: u32, v: u32) -> VerseKey {
        VerseKey::new(c, v)
    }

    #[test]
    fn single_references() {
        assert_eq!(parse_refs("Genesis 1:1").unwrap(), vec![k(1, 1)]);
        assert_eq!(parse_refs("gen. 12:3").unwrap(), vec![k(12, 3)]);
        assert_eq!(parse_refs("1:3").unwrap(), vec![k(1, 3)]);
    }

    #[test]
    fn ranges_and_lists() {
        assert_eq!(parse_refs("Gen 1:1-3").unwrap(), vec![k(1, 1), k(1, 2), k(1, 3)]);
        assert_eq!(parse_refs("Gen 1:3 Gen 1:1").unwrap(), vec![k(1, 1), k(1, 2), k(1, 3)]);
        assert_eq!(parse_refs("Gen 1:1, 3; 2:4").unwrap(), vec![k(1, 1), k(1, 3), k(2, 4)]);
        assert_eq!(parse_refs("1:2, 1:2").unwrap(), vec![k(1, 2)]);
    }

    #[test]
    fn json_arrays() {
        assert_eq!(
            parse_refs(r#"[{"chapter": 12, "verse": 1}, {"chapter": 12, "verse": 2}]"#).unwrap(),
            vec![k(12, 1), k(12, 2)]
        );
        assert!(parse_refs("[]").is_err());
        assert!(parse_refs(r#"[{"chapter": 0, "verse": 1}]"#).is_err());
        assert!(parse_refs(r#"[{"chapter": "x"}]"#).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_refs("").is_err());
        assert!(parse_refs("Exodus 1:1").is_err());
        assert!(parse_refs("Gen 1:1-2:3").is_err());
        assert!(parse_refs("Gen 1:1 Gen 2:3").is_err());
        assert!(parse_refs("3").is_err());
        assert!(parse_refs("1:0").is_err());
    }
}
