//! Embedding model capability: model resolution, device handling and the
//! little-endian `f32` blob format shared by the record store and the index.

#[cfg(feature = "fastembed")]
mod fastembed_backend;
mod local_hash;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, PipelineResult};

pub use local_hash::LocalHashModel;

pub const DEFAULT_MODEL_ID: &str = "miniLM-L6-v2-local-v1";
pub const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_NORMALIZATION: &str = "l2";
pub const LOCAL_HASH_BACKEND: &str = "local-hash-v1";
pub const FASTEMBED_BACKEND: &str = "fastembed";

pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

/// Which device the caller asks for; resolved against the backend's
/// accelerator before the first encode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda,
}

/// Text in, one fixed-width vector per text out, in input order.
pub trait EmbeddingModel {
    fn dimensions(&self) -> usize;

    /// Accelerated device this backend can run on, if any.
    fn accelerator(&self) -> Option<Device> {
        None
    }

    fn encode(&self, texts: &[&str], device: Device) -> Result<Vec<Vec<f32>>, ModelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub model_name: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

impl SemanticModelConfig {
    pub fn checksum(&self) -> String {
        let checksum_input = format!(
            "{}|{}|{}|{}|{}",
            self.model_id, self.model_name, self.dimensions, self.normalization, self.backend
        );
        let mut hasher = Sha256::new();
        hasher.update(checksum_input.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub fn resolve_model_config(model_id: &str) -> SemanticModelConfig {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    if resolved_id == DEFAULT_MODEL_ID {
        return SemanticModelConfig {
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIM,
            normalization: DEFAULT_NORMALIZATION.to_string(),
            backend: LOCAL_HASH_BACKEND.to_string(),
        };
    }

    if matches!(
        resolved_id,
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2"
    ) {
        return SemanticModelConfig {
            model_id: resolved_id.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIM,
            normalization: DEFAULT_NORMALIZATION.to_string(),
            backend: FASTEMBED_BACKEND.to_string(),
        };
    }

    SemanticModelConfig {
        model_id: resolved_id.to_string(),
        model_name: resolved_id.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: DEFAULT_NORMALIZATION.to_string(),
        backend: LOCAL_HASH_BACKEND.to_string(),
    }
}

/// Loads the backend named by `config`. The returned model's
/// `dimensions()` is authoritative; `config.dimensions` is only a hint.
pub fn load_model(config: &SemanticModelConfig) -> PipelineResult<Box<dyn EmbeddingModel>> {
    match config.backend.as_str() {
        LOCAL_HASH_BACKEND => Ok(Box::new(LocalHashModel::new(config.dimensions))),
        #[cfg(feature = "fastembed")]
        FASTEMBED_BACKEND => Ok(Box::new(fastembed_backend::FastEmbedModel::load(config)?)),
        #[cfg(not(feature = "fastembed"))]
        FASTEMBED_BACKEND => Err(PipelineError::config(format!(
            "model {} needs the `fastembed` feature, which this build does not include",
            config.model_id
        ))),
        other => Err(PipelineError::config(format!(
            "unknown embedding backend: {other}"
        ))),
    }
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let out = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<f32>>();

    Some(out)
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_resolves_to_local_hash_backend() {
        let config = resolve_model_config("  ");
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.backend, LOCAL_HASH_BACKEND);
        assert_eq!(config.dimensions, DEFAULT_EMBEDDING_DIM);
    }

    #[test]
    fn minilm_ids_resolve_to_fastembed_backend() {
        let config = resolve_model_config("all-MiniLM-L6-v2");
        assert_eq!(config.backend, FASTEMBED_BACKEND);
        assert_eq!(config.model_name, DEFAULT_MODEL_NAME);
    }

    #[test]
    fn checksum_changes_with_dimensions() {
        let base = resolve_model_config(DEFAULT_MODEL_ID);
        let mut wider = base.clone();
        wider.dimensions = 768;
        assert_ne!(base.checksum(), wider.checksum());
        assert_eq!(base.checksum(), resolve_model_config(DEFAULT_MODEL_ID).checksum());
    }

    #[test]
    fn blob_decode_rejects_wrong_width() {
        let blob = encode_embedding_blob(&[0.5, -1.0, 2.0]);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_embedding_blob(&blob, 3), Some(vec![0.5, -1.0, 2.0]));
        assert_eq!(decode_embedding_blob(&blob, 4), None);
        assert_eq!(decode_embedding_blob(&blob, 0), None);
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn fastembed_models_need_the_feature() {
        let config = resolve_model_config("all-MiniLM-L6-v2");
        let err = load_model(&config).err().expect("load should fail without the feature");
        assert_eq!(err.kind(), "configuration_error");
    }
}
