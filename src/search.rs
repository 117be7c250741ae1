//! Verse-seeded semantic search.
//!
//! A query names verses rather than free text: the verses' text in the
//! model's language is embedded and compared against the stored vectors of
//! one record level. Results are ranked by cosine similarity, highest first,
//! with ties broken by record id.

use serde::Serialize;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::Config;
use crate::corpus::VerseTable;
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{ChunkRecord, Language, VerseKey, VerseNumber};
use crate::records::RecordLevel;
use crate::store;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("embeddings are disabled; set [embedding] provider in config")]
    EmbeddingsDisabled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub model_name: String,
    pub record_level: String,
    pub top_k: Option<usize>,
    pub search_verses: Vec<VerseKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub text: String,
    pub hebrew: String,
    pub strongs: String,
    pub verses: Vec<VerseNumber>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub english_search_text: String,
    pub results: Vec<SearchHit>,
}

/// Models whose vectors are meaningful for a record level.
pub fn valid_models(level: &RecordLevel) -> Vec<String> {
    let names: &[&str] = match level {
        RecordLevel::Pericope => &["hebrew_st", "english_st"],
        RecordLevel::Verse => &["hebrew_st", "berit", "english_st"],
        RecordLevel::Agentic(m) if m == "berit" => &["berit", "hebrew_st", "english_st"],
        RecordLevel::Agentic(m) if m == "hebrew_st" || m == "english_st" => &["hebrew_st", "english_st"],
        RecordLevel::Agentic(m) => return vec![m.clone()],
    };
    names.iter().map(|s| s.to_string()).collect()
}

pub fn validate_combo(model: &str, level: &RecordLevel) -> Result<(), SearchError> {
    let valid = valid_models(level);
    if valid.iter().any(|m| m == model) {
        Ok(())
    } else {
        Err(SearchError::BadRequest(format!(
            "Invalid combination: model_name '{}' cannot be used with record_level '{}'. Valid models for {}: {}",
            model,
            level,
            level,
            valid.join(", ")
        )))
    }
}

/// `top_k` within `1..=max_top_k`, defaulting to `default_top_k`.
pub fn resolve_top_k(config: &Config, top_k: Option<usize>) -> Result<usize, SearchError> {
    let max = config.retrieval.max_top_k;
    match top_k {
        None => Ok(config.retrieval.default_top_k),
        Some(k) if (1..=max).contains(&k) => Ok(k),
        Some(_) => Err(SearchError::BadRequest(format!(
            "top_k must be between 1 and {}",
            max
        ))),
    }
}

/// Query text for `language` plus the English text shown to the user.
/// Every verse must exist in the table.
pub fn search_texts(
    table: &VerseTable,
    verses: &[VerseKey],
    language: Language,
) -> Result<(String, String), SearchError> {
    if verses.is_empty() {
        return Err(SearchError::BadRequest("search_verses cannot be empty".to_string()));
    }
    if let Some(missing) = verses.iter().find(|k| !table.contains(**k)) {
        return Err(SearchError::BadRequest(format!("Verse {} not found", missing)));
    }

    let (query, _) = table.text_for(verses, language);
    let (english, _) = table.text_for(verses, Language::English);
    if query.trim().is_empty() {
        return Err(SearchError::BadRequest(format!(
            "No {} text for the requested verses",
            language
        )));
    }
    Ok((query, english))
}

/// Top `k` ids by cosine similarity, descending, ties by id ascending.
pub fn rank(query: &[f32], vectors: &[(String, Vec<f32>)], k: usize) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = vectors
        .iter()
        .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// Attach each record's score by id. Records arrive in rank order, minus
/// any id no longer stored.
pub fn into_hits(records: Vec<ChunkRecord>, ranked: &[(String, f32)]) -> Vec<SearchHit> {
    let scores: HashMap<&str, f32> = ranked.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    records
        .into_iter()
        .filter_map(|r| {
            let score = *scores.get(r.id.as_str())?;
            Some(SearchHit {
                id: r.id,
                title: r.title,
                text: r.text,
                hebrew: r.hebrew,
                strongs: r.strongs,
                verses: r.verses,
                score,
            })
        })
        .collect()
}

pub async fn search(
    config: &Config,
    table: &VerseTable,
    pool: &SqlitePool,
    request: &SearchRequest,
) -> Result<SearchResponse, SearchError> {
    let level: RecordLevel = request
        .record_level
        .parse()
        .map_err(|e: anyhow::Error| SearchError::BadRequest(e.to_string()))?;
    let model = config
        .model(&request.model_name)
        .map_err(|e| SearchError::BadRequest(e.to_string()))?;
    validate_combo(&request.model_name, &level)?;
    let top_k = resolve_top_k(config, request.top_k)?;
    let (query_text, english_search_text) =
        search_texts(table, &request.search_verses, model.language)?;

    let embedder = Embedder::new(&config.embedding_for(&request.model_name)?)?;
    if !embedder.is_enabled() {
        return Err(SearchError::EmbeddingsDisabled);
    }

    let vectors = store::load_vectors(pool, &request.model_name, &level).await?;
    if vectors.is_empty() {
        return Err(SearchError::NotFound(format!(
            "No index for model '{}' at level '{}'. Run `gx index --model {} --level {}`.",
            request.model_name, level, request.model_name, level
        )));
    }

    let query = embedder.embed_one(&query_text).await?;
    let ranked = rank(&query, &vectors, top_k);
    let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
    let records = store::get_records(pool, &level, &ids).await?;
    let results = into_hits(records, &ranked);

    Ok(SearchResponse {
        english_search_text,
        results,
    })
}

pub async fn run_search(
    config: &Config,
    model: &str,
    level: &str,
    refs: &str,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let table = VerseTable::load(&config.corpus.verses)?;
    let pool = crate::db::connect_read_only(config).await?;
    let request = SearchRequest {
        model_name: model.to_string(),
        record_level: level.to_string(),
        top_k,
        search_verses: crate::verse_ref::parse_refs(refs)?,
    };

    let response = search(config, &table, &pool, &request).await?;

    println!("query: {}", response.english_search_text);
    if response.results.is_empty() {
        println!("No results.");
    }
    for (i, hit) in response.results.iter().enumerate() {
        println!("{}. [{:.4}] {} ({})", i + 1, hit.score, hit.title, hit.id);
        println!("    {}", hit.text);
        if !hit.hebrew.is_empty() {
            println!("    {}", hit.hebrew);
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::verse;

    fn config() -> Config {
        toml::from_str(
            "[corpus]\nverses = \"v.json\"\nrecords_dir = \"r\"\n[db]\npath = \"gx.sqlite\"\n",
        )
        .unwrap()
    }

    #[test]
    fn combos_follow_level_table() {
        assert!(validate_combo("berit", &RecordLevel::Verse).is_ok());
        assert!(validate_combo("berit", &RecordLevel::Pericope).is_err());
        assert!(validate_combo("berit", &RecordLevel::Agentic("hebrew_st".into())).is_err());
        assert!(validate_combo("english_st", &RecordLevel::Agentic("berit".into())).is_ok());
        assert!(validate_combo("tiny", &RecordLevel::Agentic("tiny".into())).is_ok());
    }

    #[test]
    fn top_k_bounds() {
        let config = config();
        assert_eq!(resolve_top_k(&config, None).unwrap(), 10);
        assert_eq!(resolve_top_k(&config, Some(50)).unwrap(), 50);
        assert!(matches!(resolve_top_k(&config, Some(0)), Err(SearchError::BadRequest(_))));
        assert!(matches!(resolve_top_k(&config, Some(51)), Err(SearchError::BadRequest(_))));
    }

    #[test]
    fn search_texts_use_model_language() {
        let table = VerseTable::from_records(vec![
            verse(1, 1, "In the beginning", "בְּרֵאשִׁית", "h7225"),
            verse(1, 2, "Now the earth", "וְהָאָרֶץ", "h776"),
        ]);
        let keys = [VerseKey::new(1, 2), VerseKey::new(1, 1)];
        let (query, english) = search_texts(&table, &keys, Language::Hebrew).unwrap();
        assert_eq!(query, "וְהָאָרֶץ בְּרֵאשִׁית");
        assert_eq!(english, "Now the earth In the beginning");

        let err = search_texts(&table, &[VerseKey::new(1, 99)], Language::English).unwrap_err();
        assert_eq!(err.to_string(), "Verse 1:99 not found");
        assert!(search_texts(&table, &[], Language::English).is_err());
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let vectors = vec![
            ("c".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![0.0, 1.0]),
            ("a".to_string(), vec![1.0, 0.0]),
            ("d".to_string(), vec![1.0, 1.0]),
        ];
        let ranked = rank(&[1.0, 0.0], &vectors, 3);
        let ids: Vec<_> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert!((ranked[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hits_keep_their_own_scores_when_a_record_is_gone() {
        let ranked = vec![
            ("a".to_string(), 0.9),
            ("b".to_string(), 0.8),
            ("c".to_string(), 0.7),
        ];
        // "b" has a vector but no stored record.
        let records = vec![
            crate::store::tests::record("a", "first", ""),
            crate::store::tests::record("c", "third", ""),
        ];
        let hits = into_hits(records, &ranked);
        let got: Vec<_> = hits.iter().map(|h| (h.id.as_str(), h.score)).collect();
        assert_eq!(got, vec![("a", 0.9), ("c", 0.7)]);
    }

    #[tokio::test]
    async fn disabled_embeddings_and_bad_levels_are_reported() {
        let config = config();
        let table = VerseTable::from_records(vec![verse(1, 1, "In the beginning", "א", "h1")]);
        let pool = crate::store::tests::memory_pool().await;
        let mut request = SearchRequest {
            model_name: "hebrew_st".to_string(),
            record_level: "pericope".to_string(),
            top_k: Some(5),
            search_verses: vec![VerseKey::new(1, 1)],
        };
        let err = search(&config, &table, &pool, &request).await.unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingsDisabled));

        request.record_level = "chapter".to_string();
        let err = search(&config, &table, &pool, &request).await.unwrap_err();
        assert!(matches!(err, SearchError::BadRequest(_)));

        request.record_level = "verse".to_string();
        request.model_name = "nope".to_string();
        let err = search(&config, &table, &pool, &request).await.unwrap_err();
        assert!(matches!(err, SearchError::BadRequest(_)));
    }
}
