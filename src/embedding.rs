//! Text → vector capability.
//!
//! [`Embedder`] wraps one configured backend:
//! - `disabled`: every call fails; indexing and search report it.
//! - `openai`: `POST /v1/embeddings`, needs `OPENAI_API_KEY`.
//! - `ollama`: `POST {url}/api/embed`.
//! - `local`: fastembed, models downloaded once and run offline.
//!
//! Remote backends retry 429/5xx responses and network errors with
//! exponential backoff (1s, 2s, 4s, ... capped at 32s); other 4xx responses
//! fail immediately.
//!
//! Vectors are stored as little-endian `f32` BLOBs ([`vec_to_blob`],
//! [`blob_to_vec`]) and compared with [`cosine_similarity`].

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const LOCAL_DEFAULT_MODEL: &str = "multilingual-e5-small";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    Disabled,
    OpenAi { api_key: String },
    Ollama { url: String },
    Local,
}

/// A resolved embedding backend plus the model and dimensionality it
/// produces.
#[derive(Debug, Clone)]
pub struct Embedder {
    backend: Backend,
    model: String,
    dims: usize,
    config: EmbeddingConfig,
}

impl Embedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (backend, model, dims) = match config.provider.as_str() {
            "disabled" => (Backend::Disabled, "disabled".to_string(), 0),
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
                let (model, dims) = required_model(config, "OpenAI")?;
                (Backend::OpenAi { api_key }, model, dims)
            }
            "ollama" => {
                let url = config
                    .url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
                let (model, dims) = required_model(config, "Ollama")?;
                (Backend::Ollama { url }, model, dims)
            }
            "local" => {
                let model = config
                    .model
                    .clone()
                    .unwrap_or_else(|| LOCAL_DEFAULT_MODEL.to_string());
                let dims = config.dims.unwrap_or_else(|| local_model_dims(&model));
                (Backend::Local, model, dims)
            }
            other => bail!("Unknown embedding provider: {}", other),
        };

        Ok(Self {
            backend,
            model,
            dims,
            config: config.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.backend != Backend::Disabled
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Embed a batch, returning one vector per input in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match &self.backend {
            Backend::Disabled => bail!("Embedding provider is disabled"),
            Backend::OpenAi { api_key } => {
                let body = serde_json::json!({ "model": self.model, "input": texts });
                let json = self
                    .post_with_retry("OpenAI", OPENAI_URL, Some(api_key), &body)
                    .await?;
                parse_openai_response(&json)?
            }
            Backend::Ollama { url } => {
                let body = serde_json::json!({ "model": self.model, "input": texts });
                let endpoint = format!("{}/api/embed", url.trim_end_matches('/'));
                let json = self.post_with_retry("Ollama", &endpoint, None, &body).await?;
                parse_ollama_response(&json)?
            }
            Backend::Local => self.embed_local(texts).await?,
        };

        if vectors.len() != texts.len() {
            bail!(
                "{} returned {} embeddings for {} inputs",
                self.model,
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }

    /// Embed one query string.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn post_with_retry(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(service, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = client.post(url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("{} API error {}: {}", service, status, body_text));
                        continue;
                    }
                    bail!("{} API error {}: {}", service, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("{} connection error ({}): {}", service, url, e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", service)))
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    async fn embed_local(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = fastembed_model(&self.model)?;
        let batch_size = self.batch_size();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    async fn embed_local(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Local embedding provider requires --features local-embeddings-fastembed")
    }
}

fn required_model(config: &EmbeddingConfig, service: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", service))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", service))?;
    Ok((model, dims))
}

fn local_model_dims(model: &str) -> usize {
    match model {
        "bge-base-en-v1.5" | "multilingual-e5-base" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok(M::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(M::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(M::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(M::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(M::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(M::MultilingualE5Small),
        "multilingual-e5-base" => Ok(M::MultilingualE5Base),
        "multilingual-e5-large" => Ok(M::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Hebrew text needs a multilingual model \
             such as multilingual-e5-small, multilingual-e5-base or multilingual-e5-large",
            other
        ),
    }
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("embedding is not an array"))?;
    Ok(items
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// `data[].embedding`, reordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, parse_vector(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(parse_vector)
        .collect()
}

/// Little-endian `f32` bytes, 4 per component.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine of the angle between `a` and `b`; `0.0` for empty, mismatched,
/// or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encoding_is_little_endian() {
        let v = vec![1.0f32, -2.5];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn cosine_basics() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn openai_response_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [1] })).is_err());
    }

    #[tokio::test]
    async fn disabled_embedder_refuses() {
        let embedder = Embedder::new(&EmbeddingConfig::default()).unwrap();
        assert!(!embedder.is_enabled());
        assert_eq!(embedder.model_name(), "disabled");
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn local_defaults_to_multilingual_model() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::new(&config).unwrap();
        assert_eq!(embedder.model_name(), "multilingual-e5-small");
        assert_eq!(embedder.dims(), 384);
    }
}
