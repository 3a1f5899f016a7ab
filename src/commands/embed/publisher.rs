use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use super::types::{PublishReport, RecordId};
use crate::error::{PipelineError, PipelineResult};
use crate::store::StoreLayout;

/// Copies the stored embeddings of `ids` into the vector index, one upsert
/// statement (and transaction) per chunk of at most `chunk_size` ids.
///
/// The embedding is read from the record table, never taken from the
/// caller, and ids whose embedding is still NULL are skipped. A failing
/// chunk stops the call; chunks committed before it stay published.
pub fn publish(
    connection: &mut Connection,
    layout: &StoreLayout,
    ids: &[RecordId],
    chunk_size: usize,
) -> PipelineResult<PublishReport> {
    let mut report = PublishReport::default();
    if ids.is_empty() {
        return Ok(report);
    }

    let chunk_size = chunk_size.max(1);
    let chunk_count = ids.len().div_ceil(chunk_size);

    for (chunk_index, chunk) in ids.chunks(chunk_size).enumerate() {
        let published = publish_chunk(connection, layout, chunk).map_err(|source| {
            PipelineError::IndexWriteFailure {
                chunk_index,
                chunk_len: chunk.len(),
                published: report.published,
                source,
            }
        })?;

        report.statements += 1;
        report.published += published;

        debug!(
            chunk = chunk_index + 1,
            chunks = chunk_count,
            ids = chunk.len(),
            published,
            "published index chunk"
        );
    }

    Ok(report)
}

fn publish_chunk(
    connection: &mut Connection,
    layout: &StoreLayout,
    chunk: &[RecordId],
) -> rusqlite::Result<usize> {
    let placeholders = vec!["?"; chunk.len()].join(",");
    // WHERE on the SELECT keeps SQLite from parsing ON CONFLICT as a join clause.
    let sql = format!(
        "
        INSERT INTO {index_table}(id, embedding)
        SELECT r.{id}, r.{embedding}
        FROM {table} r
        WHERE r.{id} IN ({placeholders}) AND r.{embedding} IS NOT NULL
        ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding
        ",
        index_table = layout.index_table,
        id = layout.id_column,
        embedding = layout.embedding_column,
        table = layout.table,
    );

    let tx = connection.transaction()?;
    let published = tx.execute(&sql, params_from_iter(chunk.iter()))?;
    tx.commit()?;

    Ok(published)
}
