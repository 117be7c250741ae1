//! Persisted record files.
//!
//! Each record level lives in `<records_dir>/<level>_records.json` as a
//! pretty-printed JSON array of [`ChunkRecord`]s.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::ChunkRecord;

/// Granularity of a record file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordLevel {
    Pericope,
    Verse,
    /// Chunks produced for one model, e.g. `agentic_berit`.
    Agentic(String),
}

impl RecordLevel {
    pub fn file_name(&self) -> String {
        format!("{}_records.json", self)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    pub fn is_agentic(&self) -> bool {
        matches!(self, RecordLevel::Agentic(_))
    }
}

impl fmt::Display for RecordLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLevel::Pericope => f.write_str("pericope"),
            RecordLevel::Verse => f.write_str("verse"),
            RecordLevel::Agentic(model) => write!(f, "agentic_{}", model),
        }
    }
}

impl FromStr for RecordLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pericope" => Ok(RecordLevel::Pericope),
            "verse" => Ok(RecordLevel::Verse),
            other => match other.strip_prefix("agentic_") {
                Some(model) if !model.is_empty() => Ok(RecordLevel::Agentic(model.to_string())),
                _ => anyhow::bail!(
                    "Unknown record level: '{}'. Use pericope, verse, or agentic_<model>.",
                    other
                ),
            },
        }
    }
}

pub fn load_records(dir: &Path, level: &RecordLevel) -> Result<Vec<ChunkRecord>> {
    let path = level.path_in(dir);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read records: {}", path.display()))?;
    let records: Vec<ChunkRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records: {}", path.display()))?;
    Ok(records)
}

/// Write a level's records, creating the directory when needed.
pub fn write_records(dir: &Path, level: &RecordLevel, records: &[ChunkRecord]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create records directory: {}", dir.display()))?;
    let path = level.path_in(dir);
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write records: {}", path.display()))?;
    Ok(path)
}

/// Record levels with a file in `dir`, sorted.
pub fn available_levels(dir: &Path) -> Result<Vec<RecordLevel>> {
    let mut levels = Vec::new();
    if !dir.exists() {
        return Ok(levels);
    }
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list records directory: {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(stem) = name.to_str().and_then(|n| n.strip_suffix("_records.json")) else {
            continue;
        };
        if let Ok(level) = stem.parse::<RecordLevel>() {
            levels.push(level);
        }
    }
    levels.sort();
    Ok(levels)
}

/// Rewrite `x.0` verse numbers as integers. Returns how many changed.
pub fn normalize_verse_numbers(records: &mut [ChunkRecord]) -> usize {
    records
        .iter_mut()
        .flat_map(|r| r.verses.iter_mut())
        .map(|v| v.normalize())
        .filter(|changed| *changed)
        .count()
}
