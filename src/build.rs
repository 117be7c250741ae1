//! Chunk-record build pipeline.
//!
//! For each selected model: flatten the verse table in the model's language,
//! split, locate chunk offsets, reconcile chunks in order, normalize verse
//! numbers, and write `agentic_<model>_records.json`.

use anyhow::Result;

use crate::config::{Config, ModelConfig};
use crate::corpus::VerseTable;
use crate::models::ChunkRecord;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::reconcile::{ReconcileWarning, Reconciler};
use crate::records::{self, RecordLevel};
use crate::splitter::{self, locate_chunks};

const PROGRESS_EVERY: usize = 100;

/// Output of one model's build.
#[derive(Debug)]
pub struct ModelBuild {
    pub model: String,
    pub records: Vec<ChunkRecord>,
    pub chunks: usize,
    pub skipped: usize,
    /// `x.0` verse numbers rewritten as integers before persisting.
    pub normalized: usize,
    pub warnings: Vec<ReconcileWarning>,
}

pub fn build_model_records(
    name: &str,
    model: &ModelConfig,
    table: &VerseTable,
    book: &str,
    progress: &dyn BuildProgressReporter,
) -> ModelBuild {
    let flat = table.flatten(model.language);
    progress.report(BuildProgressEvent::Flattened {
        model: name.to_string(),
        verses: flat.boundaries.len() as u64,
        chars: flat.char_len() as u64,
    });

    let pieces = splitter::for_model(model).split(&flat.text);
    let chunks = locate_chunks(&flat.text, pieces, model.chunk_overlap);
    let total = chunks.len();

    let mut reconciler = Reconciler::new(name, book, &flat, table);
    let mut records = Vec::with_capacity(total);
    let mut skipped = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        match reconciler.reconcile(chunk) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
        if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == total {
            progress.report(BuildProgressEvent::Reconciling {
                model: name.to_string(),
                n: (i + 1) as u64,
                total: total as u64,
            });
        }
    }

    let normalized = records::normalize_verse_numbers(&mut records);
    if normalized > 0 {
        tracing::warn!(model = name, count = normalized, "normalized trailing-zero verse numbers");
    }

    ModelBuild {
        model: name.to_string(),
        records,
        chunks: total,
        skipped,
        normalized,
        warnings: reconciler.into_warnings(),
    }
}

pub fn run_chunk(
    config: &Config,
    models: &[String],
    dry_run: bool,
    progress: &dyn BuildProgressReporter,
) -> Result<()> {
    let table = VerseTable::load(&config.corpus.verses)?;

    let selected: Vec<String> = if models.is_empty() {
        config.models.keys().cloned().collect()
    } else {
        for name in models {
            config.model(name)?;
        }
        models.to_vec()
    };

    let mut total_records = 0usize;
    let mut total_warnings = 0usize;

    for name in &selected {
        let model = config.model(name)?;
        let build = build_model_records(name, model, &table, &config.corpus.book, progress);

        if dry_run {
            println!("chunk {} (dry-run)", name);
        } else {
            let level = RecordLevel::Agentic(name.clone());
            let path = records::write_records(&config.corpus.records_dir, &level, &build.records)?;
            println!("chunk {}", name);
            println!("  output: {}", path.display());
        }
        println!("  language: {}", model.language);
        println!("  chunks: {}", build.chunks);
        println!("  records written: {}", build.records.len());
        println!("  skipped chunks: {}", build.skipped);
        println!("  normalized decimals: {}", build.normalized);
        println!("  warnings: {}", build.warnings.len());
        for warning in &build.warnings {
            println!("    {}", warning);
        }

        total_records += build.records.len();
        total_warnings += build.warnings.len();
    }

    println!(
        "total: {} records, {} warnings across {} model(s)",
        total_records,
        total_warnings,
        selected.len()
    );
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitterKind;
    use crate::corpus::tests::verse;
    use crate::models::Language;
    use crate::progress::NoProgress;
    use std::collections::BTreeSet;

    fn table() -> VerseTable {
        VerseTable::from_records(vec![
            verse(1, 1, "In the beginning God created the heavens and the earth.", "בְּרֵאשִׁית בָּרָא אֱלֹהִים אֵת הַשָּׁמַיִם וְאֵת הָאָרֶץ׃", "h7225 h1254 h430 h853 h8064 h853 h776"),
            verse(1, 2, "Now the earth was formless and void.", "וְהָאָרֶץ הָיְתָה תֹהוּ וָבֹהוּ", "h776 h1961 h8414 h922"),
            verse(1, 3, "Then God said, Let there be light.", "וַיֹּאמֶר אֱלֹהִים יְהִי אוֹר", "h559 h430 h1961 h216"),
        ])
    }

    fn model(language: Language, splitter: SplitterKind, size: usize, overlap: usize) -> ModelConfig {
        ModelConfig {
            language,
            chunk_size: size,
            chunk_overlap: overlap,
            splitter,
            embedding_model: None,
            dims: None,
        }
    }

    #[test]
    fn every_verse_is_covered_and_ids_follow_chunk_order() {
        let table = table();
        let m = model(Language::Hebrew, SplitterKind::Character, 40, 8);
        let build = build_model_records("berit", &m, &table, "Genesis", &NoProgress);

        assert_eq!(build.records.len() + build.skipped, build.chunks);
        assert!(build.warnings.is_empty());
        assert_eq!(build.records[0].id, "agentic_berit_001");

        let covered: BTreeSet<_> = build
            .records
            .iter()
            .flat_map(|r| r.verses.iter().map(|v| v.key()))
            .collect();
        assert_eq!(covered.len(), 3);
        for r in &build.records {
            assert!(r.title.starts_with("Genesis "));
            assert!(!r.verses.is_empty());
        }
    }

    #[test]
    fn sentence_model_keeps_whole_english_verses() {
        let table = table();
        let m = model(Language::English, SplitterKind::Sentence, 60, 0);
        let build = build_model_records("english_st", &m, &table, "Genesis", &NoProgress);
        // Each verse is one sentence and no two fit in 60 characters.
        assert_eq!(build.records.len(), 3);
        for (i, r) in build.records.iter().enumerate() {
            assert_eq!(r.verses.len(), 1);
            assert!(!r.verses[0].is_decimal());
            assert_eq!(r.title, format!("Genesis 1:{}", i + 1));
        }
    }

    #[test]
    fn run_chunk_writes_level_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let verses = dir.path().join("verses.json");
        std::fs::write(
            &verses,
            r#"[{"chapter":1,"verse":1,"text":"In the beginning","hebrew":"a b c","strongs":"h1 h2 h3"},
                {"chapter":1,"verse":2,"text":"And the earth","hebrew":"d e","strongs":"h4 h5"}]"#,
        )
        .unwrap();
        let config: Config = toml::from_str(&format!(
            "[corpus]\nverses = {:?}\nrecords_dir = {:?}\n[db]\npath = \"unused.sqlite\"\n[models.tiny]\nlanguage = \"hebrew\"\nchunk_size = 6\nchunk_overlap = 2\n",
            verses,
            dir.path().join("records")
        ))
        .unwrap();

        run_chunk(&config, &[], false, &NoProgress).unwrap();
        let records =
            records::load_records(&config.corpus.records_dir, &RecordLevel::Agentic("tiny".into())).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.id.starts_with("agentic_tiny_")));

        assert!(run_chunk(&config, &["missing".to_string()], true, &NoProgress).is_err());
    }
}
