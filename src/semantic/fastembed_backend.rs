use std::sync::Mutex;

use fastembed::{EmbeddingModel as FastEmbedKind, InitOptions, TextEmbedding};
use tracing::info;

use super::{Device, EmbeddingModel, ModelError, SemanticModelConfig};
use crate::error::{PipelineError, PipelineResult};

const DIMENSION_PROBE: &str = "dimension probe";

/// Sentence-transformers model executed through fastembed's ONNX runtime.
pub struct FastEmbedModel {
    inner: Mutex<TextEmbedding>,
    dimensions: usize,
}

impl FastEmbedModel {
    pub fn load(config: &SemanticModelConfig) -> PipelineResult<Self> {
        let kind = match config.model_name.as_str() {
            "sentence-transformers/all-MiniLM-L6-v2" => FastEmbedKind::AllMiniLML6V2,
            other => {
                return Err(PipelineError::config(format!(
                    "fastembed backend has no mapping for model {other}"
                )));
            }
        };

        let mut model = TextEmbedding::try_new(InitOptions::new(kind)).map_err(|err| {
            PipelineError::EmbeddingFailure {
                reason: format!("failed to load {}", config.model_name),
                source: Some(err.into()),
            }
        })?;

        let probe = model
            .embed(vec![DIMENSION_PROBE], None)
            .map_err(|err| PipelineError::EmbeddingFailure {
                reason: "dimension probe failed".to_string(),
                source: Some(err.into()),
            })?;
        let dimensions = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::embedding("dimension probe returned no vector"))?;

        info!(
            model_name = %config.model_name,
            dimensions,
            "fastembed model loaded"
        );

        Ok(Self {
            inner: Mutex::new(model),
            dimensions,
        })
    }
}

impl EmbeddingModel for FastEmbedModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[&str], device: Device) -> Result<Vec<Vec<f32>>, ModelError> {
        if device != Device::Cpu {
            return Err(format!("fastembed build is CPU-only, got {}", device.as_str()).into());
        }

        let mut model = self
            .inner
            .lock()
            .map_err(|_| ModelError::from("fastembed model mutex poisoned"))?;
        let vectors = model.embed(texts.to_vec(), Some(texts.len().max(1)))?;
        Ok(vectors)
    }
}
