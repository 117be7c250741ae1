//! Record rows and their embedding vectors in SQLite.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::ChunkRecord;
use crate::records::RecordLevel;

pub fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// A record whose vector for some model is absent or stale.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub record_id: String,
    pub text: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub written: usize,
    pub removed: usize,
}

/// Replace the stored rows of one level with `records`.
///
/// Rows (and vectors) of that level whose id is no longer present are
/// removed.
pub async fn upsert_records(
    pool: &SqlitePool,
    level: &RecordLevel,
    records: &[ChunkRecord],
) -> Result<UpsertSummary> {
    let level_name = level.to_string();
    let mut tx = pool.begin().await?;

    let existing: Vec<String> = sqlx::query_scalar("SELECT id FROM records WHERE level = ?")
        .bind(&level_name)
        .fetch_all(&mut *tx)
        .await?;
    let keep: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

    let mut removed = 0usize;
    for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
        sqlx::query("DELETE FROM record_vectors WHERE level = ? AND record_id = ?")
            .bind(&level_name)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records WHERE level = ? AND id = ?")
            .bind(&level_name)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        removed += 1;
    }

    for record in records {
        let verses_json = serde_json::to_string(&record.verses)?;
        let hash = sha256_hex(&serde_json::to_string(record)?);
        sqlx::query(
            r#"
            INSERT INTO records (level, id, title, text, hebrew, strongs, verses_json, hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(level, id) DO UPDATE SET
                title = excluded.title,
                text = excluded.text,
                hebrew = excluded.hebrew,
                strongs = excluded.strongs,
                verses_json = excluded.verses_json,
                hash = excluded.hash
            "#,
        )
        .bind(&level_name)
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.hebrew)
        .bind(&record.strongs)
        .bind(&verses_json)
        .bind(&hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(UpsertSummary {
        written: records.len(),
        removed,
    })
}

/// Records of `level` whose `field` text has no current vector for `model`.
///
/// `field` is `"text"` or `"hebrew"`. With `all`, every record is returned.
pub async fn pending_records(
    pool: &SqlitePool,
    model: &str,
    level: &RecordLevel,
    field: &str,
    all: bool,
) -> Result<Vec<PendingRecord>> {
    let column = match field {
        "text" => "r.text",
        "hebrew" => "r.hebrew",
        other => anyhow::bail!("Unknown record field: {}", other),
    };

    let sql = format!(
        r#"
        SELECT r.id AS id, {column} AS body, v.hash AS vector_hash
        FROM records r
        LEFT JOIN record_vectors v
            ON v.level = r.level AND v.record_id = r.id AND v.model = ?
        WHERE r.level = ?
        ORDER BY r.id
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(model)
        .bind(level.to_string())
        .fetch_all(pool)
        .await?;

    let mut pending = Vec::new();
    for row in rows {
        let text: String = row.get("body");
        let hash = sha256_hex(&text);
        let vector_hash: Option<String> = row.get("vector_hash");
        if all || vector_hash.as_deref() != Some(hash.as_str()) {
            pending.push(PendingRecord {
                record_id: row.get("id"),
                text,
                hash,
            });
        }
    }
    Ok(pending)
}

pub async fn upsert_vector(
    pool: &SqlitePool,
    model: &str,
    level: &RecordLevel,
    item: &PendingRecord,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO record_vectors (model, level, record_id, dims, hash, embedding, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(model, level, record_id) DO UPDATE SET
            dims = excluded.dims,
            hash = excluded.hash,
            embedding = excluded.embedding,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(model)
    .bind(level.to_string())
    .bind(&item.record_id)
    .bind(vector.len() as i64)
    .bind(&item.hash)
    .bind(vec_to_blob(vector))
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_vectors(pool: &SqlitePool, model: &str, level: &RecordLevel) -> Result<u64> {
    let result = sqlx::query("DELETE FROM record_vectors WHERE model = ? AND level = ?")
        .bind(model)
        .bind(level.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// All `(record_id, vector)` pairs for one model and level.
pub async fn load_vectors(
    pool: &SqlitePool,
    model: &str,
    level: &RecordLevel,
) -> Result<Vec<(String, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT record_id, embedding FROM record_vectors WHERE model = ? AND level = ? ORDER BY record_id",
    )
    .bind(model)
    .bind(level.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            (row.get("record_id"), blob_to_vec(&blob))
        })
        .collect())
}

/// Fetch records by id, returned in the order of `ids`. Unknown ids are
/// skipped.
pub async fn get_records(
    pool: &SqlitePool,
    level: &RecordLevel,
    ids: &[String],
) -> Result<Vec<ChunkRecord>> {
    let level_name = level.to_string();
    let mut by_id = HashMap::with_capacity(ids.len());

    for id in ids {
        let row = sqlx::query(
            "SELECT id, title, text, hebrew, strongs, verses_json FROM records WHERE level = ? AND id = ?",
        )
        .bind(&level_name)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = row {
            let verses_json: String = row.get("verses_json");
            let verses = serde_json::from_str(&verses_json)
                .with_context(|| format!("Corrupt verses_json for record {}", id))?;
            by_id.insert(
                id.clone(),
                ChunkRecord {
                    id: row.get("id"),
                    title: row.get("title"),
                    text: row.get("text"),
                    verses,
                    hebrew: row.get("hebrew"),
                    strongs: row.get("strongs"),
                },
            );
        }
    }

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        pool
    }

    pub(crate) fn record(id: &str, text: &str, hebrew: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            title: format!("Genesis {}", id),
            text: text.to_string(),
            verses: serde_json::from_str(r#"[{"chapter":1,"verse":1}]"#).unwrap(),
            hebrew: hebrew.to_string(),
            strongs: String::new(),
        }
    }

    #[tokio::test]
    async fn pending_tracks_hash_staleness() {
        let pool = memory_pool().await;
        let level = RecordLevel::Verse;
        upsert_records(&pool, &level, &[record("a", "alpha", "א"), record("b", "beta", "ב")])
            .await
            .unwrap();

        let pending = pending_records(&pool, "m", &level, "text", false).await.unwrap();
        assert_eq!(pending.len(), 2);
        upsert_vector(&pool, "m", &level, &pending[0], &[1.0, 0.0]).await.unwrap();

        let pending = pending_records(&pool, "m", &level, "text", false).await.unwrap();
        assert_eq!(pending.iter().map(|p| p.record_id.as_str()).collect::<Vec<_>>(), vec!["b"]);

        // Changing the embedded text makes the stored vector stale.
        upsert_records(&pool, &level, &[record("a", "alpha two", "א"), record("b", "beta", "ב")])
            .await
            .unwrap();
        let pending = pending_records(&pool, "m", &level, "text", false).await.unwrap();
        assert_eq!(pending.len(), 2);

        // Another model or field is independent.
        assert_eq!(pending_records(&pool, "other", &level, "hebrew", false).await.unwrap().len(), 2);
        assert!(pending_records(&pool, "m", &level, "strongs", false).await.is_err());
    }

    #[tokio::test]
    async fn upsert_removes_vanished_records() {
        let pool = memory_pool().await;
        let level = RecordLevel::Agentic("berit".into());
        upsert_records(&pool, &level, &[record("a", "x", "y"), record("b", "x", "y")])
            .await
            .unwrap();
        let pending = pending_records(&pool, "berit", &level, "hebrew", true).await.unwrap();
        for p in &pending {
            upsert_vector(&pool, "berit", &level, p, &[0.5, 0.5]).await.unwrap();
        }

        let summary = upsert_records(&pool, &level, &[record("b", "x", "y")]).await.unwrap();
        assert_eq!(summary, UpsertSummary { written: 1, removed: 1 });
        let vectors = load_vectors(&pool, "berit", &level).await.unwrap();
        assert_eq!(vectors, vec![("b".to_string(), vec![0.5, 0.5])]);
    }

    #[tokio::test]
    async fn get_records_keeps_requested_order() {
        let pool = memory_pool().await;
        let level = RecordLevel::Pericope;
        upsert_records(&pool, &level, &[record("a", "1", ""), record("b", "2", "")])
            .await
            .unwrap();
        let got = get_records(&pool, &level, &["b".into(), "zzz".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(got.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(got[1], record("a", "1", ""));

        assert_eq!(clear_vectors(&pool, "m", &level).await.unwrap(), 0);
    }
}
