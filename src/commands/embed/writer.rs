use rusqlite::{Connection, params};

use super::types::PendingRecord;
use crate::error::{PipelineError, PipelineResult};
use crate::store::StoreLayout;

/// Stores `vectors[i]` as the embedding of `batch[i]`. The whole batch is one
/// transaction: on any error it rolls back and no record in it is embedded.
pub fn write(
    connection: &mut Connection,
    layout: &StoreLayout,
    batch: &[PendingRecord],
    vectors: &[Vec<u8>],
) -> PipelineResult<usize> {
    if batch.len() != vectors.len() {
        return Err(PipelineError::embedding(format!(
            "{} vectors do not align with a batch of {} records",
            vectors.len(),
            batch.len()
        )));
    }
    if batch.is_empty() {
        return Ok(0);
    }

    let write_err = |source| PipelineError::StorageWriteFailure {
        batch_len: batch.len(),
        source,
    };

    let tx = connection.transaction().map_err(write_err)?;
    let mut written = 0usize;
    {
        let sql = format!(
            "UPDATE {table} SET {embedding} = ?1 WHERE {id} = ?2",
            table = layout.table,
            embedding = layout.embedding_column,
            id = layout.id_column,
        );
        let mut statement = tx.prepare(&sql).map_err(write_err)?;

        for (record, blob) in batch.iter().zip(vectors) {
            written += statement
                .execute(params![blob, record.id])
                .map_err(write_err)?;
        }
    }
    tx.commit().map_err(write_err)?;

    Ok(written)
}
