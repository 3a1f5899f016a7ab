use tracing::debug;

use super::context::PipelineContext;
use super::types::PendingRecord;
use crate::error::{PipelineError, PipelineResult};
use crate::semantic::encode_embedding_blob;

/// Embeds `batch` in sub-batches of `encode_batch_size`, returning one
/// `f32` blob per record in input order. Any model failure fails the whole
/// batch; nothing partial is returned.
pub fn generate(batch: &[PendingRecord], context: &PipelineContext) -> PipelineResult<Vec<Vec<u8>>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let sub_batch_size = context.settings.encode_batch_size;
    let sub_batches = batch.len().div_ceil(sub_batch_size);
    let mut blobs = Vec::<Vec<u8>>::with_capacity(batch.len());

    for (sub_batch_index, records) in batch.chunks(sub_batch_size).enumerate() {
        let texts = records
            .iter()
            .map(|record| record.text.as_str())
            .collect::<Vec<&str>>();

        let vectors = context
            .model
            .encode(&texts, context.device)
            .map_err(|source| PipelineError::EmbeddingFailure {
                reason: format!(
                    "model {} failed on sub-batch {} of {}",
                    context.model_config.model_id,
                    sub_batch_index + 1,
                    sub_batches
                ),
                source: Some(source),
            })?;

        if vectors.len() != texts.len() {
            return Err(PipelineError::embedding(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        for vector in vectors {
            if vector.len() != context.dimensions {
                return Err(PipelineError::embedding(format!(
                    "model returned a {}-dimensional vector, expected {}",
                    vector.len(),
                    context.dimensions
                )));
            }
            blobs.push(encode_embedding_blob(&vector));
        }

        debug!(
            sub_batch = sub_batch_index + 1,
            sub_batches,
            texts = texts.len(),
            device = context.device.as_str(),
            "encoded sub-batch"
        );
    }

    Ok(blobs)
}
