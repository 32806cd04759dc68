use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::Array2;
use ort::{Error as OrtError, session::Session, value::Tensor};
use thiserror::Error;
use tokenizers::{Encoding, Tokenizer};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Onnx,
    Hash,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub model_id: String,
    pub dimension: usize,
}

/// Errors produced by embedder construction and calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input exceeds max length of {max_length} tokens, actual length: {actual_length}")]
    InputTooLong {
        max_length: usize,
        actual_length: usize,
    },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Core interface for all embedder implementations.
///
/// Implementations are referentially transparent within a process lifetime:
/// the same input text yields the same vector for as long as the process
/// (and its loaded model weights) lives.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn info(&self) -> &EmbedderInfo;
}

/// Canonical input normalization applied by every provider before encoding.
/// Lowercasing and trimming here means callers do not have to agree on a
/// convention; "Camera " and "camera" embed identically.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Configuration for the local ONNX embedder.
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub dimension: usize,
    pub max_input_length: usize,
    pub model_id: String,
}

/// Sentence embedder backed by an ONNX model executed through the ONNX
/// Runtime shared library. Output is mean-pooled over the attention mask.
#[derive(Debug)]
pub struct OnnxEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
    max_input_length: usize,
}

static ORT_RUNTIME_PATH: OnceLock<PathBuf> = OnceLock::new();

impl OnnxEmbedder {
    pub fn new(config: OnnxConfig) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 {
            return Err(EmbeddingError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.max_input_length == 0 {
            return Err(EmbeddingError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        let runtime_library_path =
            resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;
        ensure_ort_initialized(&runtime_library_path)?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| map_tokenizer_error("load tokenizer", err))?;

        // BERT-family tokenizers name the pad token [PAD]; T5-family <pad>.
        let pad_id = ["[PAD]", "<pad>"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t))
            .ok_or_else(|| EmbeddingError::InvalidConfiguration {
                message: format!(
                    "tokenizer `{}` declares no pad token",
                    tokenizer_path.display()
                ),
            })? as i64;

        let info = EmbedderInfo {
            provider: ProviderKind::Onnx,
            model_id: config.model_id,
            dimension: config.dimension,
        };

        Ok(Self {
            info,
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            pad_id,
            max_input_length: config.max_input_length,
        })
    }

    fn encode_all(&self, texts: &[String]) -> Result<Vec<Encoding>, EmbeddingError> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(t.as_str(), true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| map_tokenizer_error("tokenize inputs", err))?;

        let longest = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if longest > self.max_input_length {
            return Err(EmbeddingError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: longest,
            });
        }
        Ok(encodings)
    }

    /// Runs the model over a padded batch and mean-pools token states into
    /// one vector per input.
    fn run_pooled(&self, encodings: &[Encoding]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::from_elem((batch, seq_len), self.pad_id);
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask().iter())
                .enumerate()
            {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
        }
        let mask = attention_mask.clone();

        let input_ids =
            Tensor::from_array(input_ids).map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask = Tensor::from_array(attention_mask)
            .map_err(|err| map_ort_error("prepare attention_mask", err))?;

        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_ids, attention_mask])
            .map_err(|err| map_ort_error("execute ONNX session", err))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;
        if shape.len() != 3 {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Err(EmbeddingError::ProviderFailure {
                message: format!("model output must be rank-3 [batch, seq, hidden], got {dims:?}"),
            });
        }
        let (out_batch, out_seq, hidden) =
            (shape[0] as usize, shape[1] as usize, shape[2] as usize);
        if out_batch != batch || out_seq != seq_len {
            return Err(EmbeddingError::ProviderFailure {
                message: format!(
                    "model returned shape [{out_batch}, {out_seq}, _], expected [{batch}, {seq_len}, _]"
                ),
            });
        }

        let mut pooled = Vec::with_capacity(batch);
        for b in 0..batch {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;
            for t in 0..seq_len {
                if mask[(b, t)] == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for h in 0..hidden {
                        sum[h] += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for v in &mut sum {
                    *v /= count;
                }
            }
            if sum.len() != self.info.dimension {
                return Err(EmbeddingError::ProviderFailure {
                    message: format!(
                        "pooled dimension {} does not match configured dimension {}",
                        sum.len(),
                        self.info.dimension
                    ),
                });
            }
            pooled.push(sum);
        }
        Ok(pooled)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let normalized = vec![normalize(text)];
        let encodings = self.encode_all(&normalized)?;
        let mut pooled = self.run_pooled(&encodings)?;
        pooled.pop().ok_or_else(|| EmbeddingError::ProviderFailure {
            message: "missing pooled output".into(),
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let normalized: Vec<String> = texts.iter().map(|t| normalize(t)).collect();
        let encodings = self.encode_all(&normalized)?;
        self.run_pooled(&encodings)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Deterministic seeded embedder. Each component is a hash of
/// `(seed, index, normalized text)` scaled into [-1, 1]. Identical text
/// always lands on an identical vector, which is all the vector index
/// contract requires; used by tests and model-free local runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: EmbedderInfo,
    base_seed: u64,
}

impl HashEmbedder {
    pub fn new(dimension: usize, model_id: impl Into<String>) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        let info = EmbedderInfo {
            provider: ProviderKind::Hash,
            model_id: model_id.into(),
            dimension,
        };
        let mut hasher = DefaultHasher::new();
        info.provider.hash(&mut hasher);
        info.model_id.hash(&mut hasher);
        info.dimension.hash(&mut hasher);
        let base_seed = hasher.finish();
        Ok(Self { info, base_seed })
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let canonical = normalize(text);
        let mut out = Vec::with_capacity(self.info.dimension);
        for index in 0..self.info.dimension {
            let mut hasher = DefaultHasher::new();
            self.base_seed.hash(&mut hasher);
            index.hash(&mut hasher);
            canonical.hash(&mut hasher);
            out.push(scale_hash(hasher.finish()));
        }
        Ok(out)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

fn scale_hash(value: u64) -> f32 {
    let unit = (value as f64) / (u64::MAX as f64);
    (unit * 2.0 - 1.0) as f32
}

fn ensure_ort_initialized(runtime_library_path: &Path) -> Result<(), EmbeddingError> {
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if !paths_equal(existing, runtime_library_path) {
            return Err(EmbeddingError::InvalidConfiguration {
                message: format!(
                    "ONNX Runtime already initialized with library `{}`; cannot reinitialize with `{}`",
                    existing.display(),
                    runtime_library_path.display()
                ),
            });
        }
    } else {
        let _ = ORT_RUNTIME_PATH.set(runtime_library_path.to_path_buf());
    }

    ort::init_from(runtime_library_path.to_string_lossy().to_string())
        .map_err(|err| EmbeddingError::ProviderFailure {
            message: format!("initialize ONNX Runtime environment failed: {err}"),
        })?
        .with_name("search-embedder")
        .commit();
    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbeddingError> {
    fs::metadata(path).map_err(|_| EmbeddingError::InvalidConfiguration {
        message: format!("{description} `{}` does not exist", path.display()),
    })?;
    path.canonicalize()
        .map_err(|err| EmbeddingError::ProviderFailure {
            message: format!(
                "failed to canonicalize {description} `{}`: {err}",
                path.display()
            ),
        })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbeddingError {
    EmbeddingError::ProviderFailure {
        message: format!("{context} failed: {err}"),
    }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> EmbeddingError {
    EmbeddingError::ProviderFailure {
        message: format!("{context} failed: {err}"),
    }
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(a), fs::canonicalize(b)) {
        a == b
    } else {
        a == b
    }
}
