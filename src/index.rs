//! `gx index`: load a record level into SQLite and embed what is stale.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::migrate;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::records::{self, RecordLevel};
use crate::search::validate_combo;
use crate::store::{self, PendingRecord};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub records: usize,
    pub removed: usize,
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
    pub empty: usize,
}

pub async fn run_index(
    config: &Config,
    model: &str,
    level: &str,
    rebuild: bool,
    dry_run: bool,
    progress: &dyn BuildProgressReporter,
) -> Result<()> {
    let level: RecordLevel = level.parse()?;
    let model_config = config.model(model)?;
    validate_combo(model, &level)?;

    let embedder = Embedder::new(&config.embedding_for(model)?)?;
    if !embedder.is_enabled() && !dry_run {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let records = records::load_records(&config.corpus.records_dir, &level)?;
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let mut summary = IndexSummary::default();
    let upsert = store::upsert_records(&pool, &level, &records).await?;
    summary.records = upsert.written;
    summary.removed = upsert.removed;

    if rebuild && !dry_run {
        let cleared = store::clear_vectors(&pool, model, &level).await?;
        tracing::info!(model, %level, cleared, "cleared vectors");
    }

    let pending =
        store::pending_records(&pool, model, &level, model_config.text_field(), rebuild).await?;
    summary.pending = pending.len();

    if dry_run {
        print_summary(model, &level, &summary, true);
        pool.close().await;
        return Ok(());
    }

    let (embeddable, empty): (Vec<PendingRecord>, Vec<PendingRecord>) =
        pending.into_iter().partition(|p| !p.text.trim().is_empty());
    summary.empty = empty.len();
    for p in &empty {
        tracing::warn!(record_id = %p.record_id, field = model_config.text_field(), "empty text, not embedded");
    }

    let total = embeddable.len() as u64;
    for batch in embeddable.chunks(embedder.batch_size()) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedder.embed(&texts).await {
            Ok(vectors) => {
                for (item, vector) in batch.iter().zip(vectors.iter()) {
                    store::upsert_vector(&pool, model, &level, item, vector).await?;
                    summary.embedded += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, size = batch.len(), "embedding batch failed");
                summary.failed += batch.len();
            }
        }

        progress.report(BuildProgressEvent::Embedding {
            model: model.to_string(),
            n: (summary.embedded + summary.failed) as u64,
            total,
        });
    }

    print_summary(model, &level, &summary, false);
    pool.close().await;
    Ok(())
}

fn print_summary(model: &str, level: &RecordLevel, summary: &IndexSummary, dry_run: bool) {
    if dry_run {
        println!("index {} {} (dry-run)", model, level);
    } else {
        println!("index {} {}", model, level);
    }
    println!("  records: {}", summary.records);
    println!("  removed: {}", summary.removed);
    if dry_run {
        println!("  records needing embeddings: {}", summary.pending);
        return;
    }
    println!("  pending: {}", summary.pending);
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);
    if summary.empty > 0 {
        println!("  empty text: {}", summary.empty);
    }
    println!("ok");
}
