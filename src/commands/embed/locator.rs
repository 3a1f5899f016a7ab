use rusqlite::Connection;
use rusqlite::types::ValueRef;

use super::types::{PendingRecord, RecordId};
use crate::error::{PipelineError, PipelineResult};
use crate::store::{StoreLayout, count_rows};

/// Records with non-empty TEXT and no embedding. Text stored under any
/// other storage class is never selected.
pub fn pending_predicate(layout: &StoreLayout) -> String {
    format!(
        "typeof({text}) = 'text' AND {text} != '' AND {embedding} IS NULL",
        text = layout.text_column,
        embedding = layout.embedding_column,
    )
}

/// Up to `limit` records that still need an embedding, in id order so the
/// pending partial index can serve the scan. Read-only.
pub fn fetch_pending(
    connection: &Connection,
    layout: &StoreLayout,
    limit: usize,
) -> PipelineResult<Vec<PendingRecord>> {
    let sql = format!(
        "
        SELECT {id}, {text}
        FROM {table}
        WHERE {predicate}
        ORDER BY {id}
        LIMIT ?1
        ",
        id = layout.id_column,
        text = layout.text_column,
        table = layout.table,
        predicate = pending_predicate(layout),
    );

    let fetch_err = |err| PipelineError::storage_unavailable("fetching pending records", err);
    let mut statement = connection.prepare_cached(&sql).map_err(fetch_err)?;
    let records = statement
        .query_map([limit as i64], |row| {
            // Invalid UTF-8 is embedded lossily rather than blocking the batch.
            let text = match row.get_ref(1)? {
                ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                other => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        1,
                        layout.text_column.clone(),
                        other.data_type(),
                    ));
                }
            };
            Ok(PendingRecord {
                id: row.get(0)?,
                text,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<PendingRecord>, _>>())
        .map_err(fetch_err)?;

    Ok(records)
}

/// Ids whose stored embedding is missing from the vector index or differs
/// from the mirrored copy.
pub fn fetch_unpublished(
    connection: &Connection,
    layout: &StoreLayout,
    limit: usize,
) -> PipelineResult<Vec<RecordId>> {
    let sql = format!(
        "
        SELECT r.{id}
        FROM {table} r
        LEFT JOIN {index_table} v ON v.id = r.{id}
        WHERE {predicate}
        ORDER BY r.{id}
        LIMIT ?1
        ",
        id = layout.id_column,
        table = layout.table,
        index_table = layout.index_table,
        predicate = unpublished_predicate(layout),
    );

    let fetch_err = |err| PipelineError::storage_unavailable("fetching unpublished records", err);
    let mut statement = connection.prepare_cached(&sql).map_err(fetch_err)?;
    let ids = statement
        .query_map([limit as i64], |row| row.get::<_, RecordId>(0))
        .and_then(|rows| rows.collect::<Result<Vec<RecordId>, _>>())
        .map_err(fetch_err)?;

    Ok(ids)
}

pub fn count_pending(connection: &Connection, layout: &StoreLayout) -> PipelineResult<usize> {
    let count = count_rows(connection, &layout.table, Some(&pending_predicate(layout)))?;
    count.ok_or_else(|| PipelineError::config(format!("record table {} does not exist", layout.table)))
}

pub fn count_unpublished(connection: &Connection, layout: &StoreLayout) -> PipelineResult<usize> {
    let sql = format!(
        "
        SELECT COUNT(*)
        FROM {table} r
        LEFT JOIN {index_table} v ON v.id = r.{id}
        WHERE {predicate}
        ",
        id = layout.id_column,
        table = layout.table,
        index_table = layout.index_table,
        predicate = unpublished_predicate(layout),
    );

    let count = connection
        .query_row(&sql, [], |row| row.get::<_, i64>(0))
        .map_err(|err| PipelineError::storage_unavailable("counting unpublished records", err))?;
    Ok(count as usize)
}

fn unpublished_predicate(layout: &StoreLayout) -> String {
    format!(
        "r.{embedding} IS NOT NULL AND (v.id IS NULL OR v.embedding IS NOT r.{embedding})",
        embedding = layout.embedding_column,
    )
}
