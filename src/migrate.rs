use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    println!("init {}", config.db.path.display());
    println!("ok");
    Ok(())
}

/// Create the record and vector tables. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per persisted chunk record, keyed by level.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            level TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            hebrew TEXT NOT NULL DEFAULT '',
            strongs TEXT NOT NULL DEFAULT '',
            verses_json TEXT NOT NULL,
            hash TEXT NOT NULL,
            PRIMARY KEY (level, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `hash` is the SHA-256 of the text that was embedded.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_vectors (
            model TEXT NOT NULL,
            level TEXT NOT NULL,
            record_id TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (model, level, record_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_record_vectors_model_level ON record_vectors(model, level)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
