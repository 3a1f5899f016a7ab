use serde::Serialize;

use crate::commands::embed::PipelineSummary;

#[derive(Debug, Clone, Serialize)]
pub struct RunSettingsSnapshot {
    pub batch_limit: usize,
    pub encode_batch_size: usize,
    pub publish_chunk_size: usize,
    pub backfill: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub db_path: String,
    pub table: String,
    pub index_table: String,
    pub model_id: String,
    pub model_name: String,
    pub backend: String,
    pub model_checksum: String,
    pub embedding_dim: usize,
    pub device: String,
    pub settings: RunSettingsSnapshot,
    pub summary: Option<PipelineSummary>,
    pub duration_ms: u128,
    pub status: String,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}
