//! Chunking and indexing progress reporting.
//!
//! Reports per-stage progress during `gx chunk` and `gx index` so users see
//! which model is being processed and how far along it is. Progress goes to
//! **stderr** so stdout (the final summary) remains parseable.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// Corpus flattened for a model.
    Flattened {
        model: String,
        verses: u64,
        chars: u64,
    },
    /// Chunks reconciled so far.
    Reconciling { model: String, n: u64, total: u64 },
    /// Records embedded so far.
    Embedding { model: String, n: u64, total: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "chunk berit  reconciling  120 / 1,532 chunks".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Flattened {
                model,
                verses,
                chars,
            } => format!(
                "chunk {}  flattened  {} verses, {} chars\n",
                model,
                format_number(*verses),
                format_number(*chars)
            ),
            BuildProgressEvent::Reconciling { model, n, total } => format!(
                "chunk {}  reconciling  {} / {} chunks\n",
                model,
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Embedding { model, n, total } => format!(
                "index {}  embedding  {} / {} records\n",
                model,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Flattened {
                model,
                verses,
                chars,
            } => serde_json::json!({
                "event": "progress",
                "model": model,
                "phase": "flattened",
                "verses": verses,
                "chars": chars
            }),
            BuildProgressEvent::Reconciling { model, n, total } => serde_json::json!({
                "event": "progress",
                "model": model,
                "phase": "reconciling",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Embedding { model, n, total } => serde_json::json!({
                "event": "progress",
                "model": model,
                "phase": "embedding",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag; `auto` defers to [`Self::default_for_tty`].
    pub fn from_flag(flag: &str) -> anyhow::Result<Self> {
        match flag {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_flag_parsing() {
        assert_eq!(ProgressMode::from_flag("off").unwrap(), ProgressMode::Off);
        assert_eq!(ProgressMode::from_flag("json").unwrap(), ProgressMode::Json);
        assert!(ProgressMode::from_flag("loud").is_err());
    }
}
