use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::info;

/// Turns sentences into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Sentence-transformer model run locally through fastembed.
///
/// The model is downloaded and loaded on first use, on the blocking pool,
/// and then shared by every call made through this instance.
pub struct FastEmbedder {
    model: EmbeddingModel,
    loaded: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl FastEmbedder {
    pub fn new(model_name: &str) -> Self {
        let model = match model_name {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                EmbeddingModel::AllMiniLML6V2
            }
            "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            other => {
                tracing::warn!(model = other, "Unknown embedding model, using all-MiniLM-L6-v2");
                EmbeddingModel::AllMiniLML6V2
            }
        };
        Self { model, loaded: OnceCell::new() }
    }

    async fn handle(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        let model = self.model.clone();
        let handle = self
            .loaded
            .get_or_try_init(|| async move {
                let loaded = tokio::task::spawn_blocking(move || {
                    let options = TextInitOptions::new(model).with_show_download_progress(false);
                    TextEmbedding::try_new(options)
                        .map_err(|e| anyhow!("failed to initialize embedding model: {}", e))
                })
                .await
                .context("embedding model loader panicked")??;
                info!("Embedding model initialized");
                Ok::<_, anyhow::Error>(Arc::new(Mutex::new(loaded)))
            })
            .await?;
        Ok(handle.clone())
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let handle = self.handle().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = handle.lock().map_err(|_| anyhow!("embedding model lock poisoned"))?;
            model.embed(texts, None).map_err(|e| anyhow!("embedding failed: {}", e))
        })
        .await
        .context("embedding task panicked")?
    }
}

/// Offline embedder: hashes lower-cased alphanumeric tokens into signed buckets.
///
/// Buckets come from SHA-256 of the token, so a token lands in the same slot
/// on every build and platform. Identical token multisets embed identically,
/// so it is only good for near-verbatim matching. Used in tests and
/// air-gapped deployments.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Slot index and sign for one token.
    pub fn slot(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 1 { -1.0 } else { 1.0 };
        (index, sign)
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let (index, sign) = self.slot(&token);
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Lower-cased alphanumeric runs, in order.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(2048)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Picks an embedder by model name; `hashing` selects the offline one.
pub fn embedder_for(model_name: &str) -> Arc<dyn Embedder> {
    if model_name.eq_ignore_ascii_case("hashing") {
        Arc::new(HashingEmbedder::default())
    } else {
        Arc::new(FastEmbedder::new(model_name))
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        0.0
    } else {
        dot_product / (magnitude_a * magnitude_b)
    }
}

/// Coarse dedup of utterances by embedding.
///
/// Each vector is rounded to one decimal per component and hashed; the first
/// time a hash shows up it gets the next integer id, repeats get the same id.
/// This groups near-identical sentences; it does not route intents.
#[derive(Debug, Default)]
pub struct EmbeddingBuckets {
    ids: HashMap<u64, u32>,
    next_id: u32,
}

impl EmbeddingBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, vector: &[f32]) -> u32 {
        let key = bucket_key(vector);
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = self.next_id;
        self.ids.insert(key, id);
        self.next_id += 1;
        id
    }

    /// Embeds the sentence, then buckets it.
    pub async fn assign_text(&mut self, embedder: &dyn Embedder, text: &str) -> Result<u32> {
        let vectors = embedder.embed(&[text.to_string()]).await?;
        let vector = vectors.first().ok_or_else(|| anyhow!("embedder returned no vector"))?;
        Ok(self.assign(vector))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn bucket_key(vector: &[f32]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for component in vector {
        // Tenths as integers; -0.0 and 0.0 land together.
        let tenths = (component * 10.0).round() as i32;
        tenths.hash(&mut hasher);
    }
    hasher.finish()
}
