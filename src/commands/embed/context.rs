use crate::error::{PipelineError, PipelineResult};
use crate::semantic::{Device, DevicePreference, EmbeddingModel, SemanticModelConfig};
use crate::store::StoreLayout;

/// SQLite's historic default for SQLITE_MAX_VARIABLE_NUMBER.
pub const SQLITE_MAX_BOUND_PARAMETERS: usize = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub batch_limit: usize,
    pub encode_batch_size: usize,
    pub publish_chunk_size: usize,
    pub backfill: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_limit: 25_000,
            encode_batch_size: 128,
            publish_chunk_size: 500,
            backfill: true,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_limit == 0 {
            return Err(PipelineError::config("batch limit must be positive"));
        }
        if self.encode_batch_size == 0 {
            return Err(PipelineError::config("encode batch size must be positive"));
        }
        if self.publish_chunk_size == 0 || self.publish_chunk_size > SQLITE_MAX_BOUND_PARAMETERS {
            return Err(PipelineError::config(format!(
                "publish chunk size must be between 1 and {SQLITE_MAX_BOUND_PARAMETERS}, got {}",
                self.publish_chunk_size
            )));
        }
        Ok(())
    }
}

/// Everything the pipeline components share, built once per run.
pub struct PipelineContext {
    pub layout: StoreLayout,
    pub settings: PipelineSettings,
    pub model_config: SemanticModelConfig,
    pub model: Box<dyn EmbeddingModel>,
    pub dimensions: usize,
    pub device: Device,
}

impl PipelineContext {
    pub fn new(
        layout: StoreLayout,
        settings: PipelineSettings,
        model_config: SemanticModelConfig,
        model: Box<dyn EmbeddingModel>,
        requested_device: DevicePreference,
    ) -> PipelineResult<Self> {
        layout.validate()?;
        settings.validate()?;

        let dimensions = model.dimensions();
        if dimensions == 0 {
            return Err(PipelineError::config(format!(
                "model {} reports zero dimensions",
                model_config.model_id
            )));
        }

        let device = resolve_device(requested_device, model.accelerator())?;

        Ok(Self {
            layout,
            settings,
            model_config,
            model,
            dimensions,
            device,
        })
    }
}

pub fn resolve_device(
    requested: DevicePreference,
    accelerator: Option<Device>,
) -> PipelineResult<Device> {
    match (requested, accelerator) {
        (DevicePreference::Cpu, _) | (DevicePreference::Auto, None) => Ok(Device::Cpu),
        (DevicePreference::Auto, Some(device)) => Ok(device),
        (DevicePreference::Cuda, Some(Device::Cuda)) => Ok(Device::Cuda),
        (DevicePreference::Cuda, _) => Err(PipelineError::config(
            "cuda was requested but the embedding backend has no CUDA support",
        )),
    }
}
