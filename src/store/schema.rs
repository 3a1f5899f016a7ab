use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use super::{INDEX_META_TABLE, StoreLayout};
use crate::error::{PipelineError, PipelineResult};
use crate::semantic::SemanticModelConfig;
use crate::util::now_utc_string;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMetadata {
    pub index_table: String,
    pub dimensions: usize,
    pub model_id: String,
    pub model_checksum: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Idempotent schema preparation, run once before the pipeline loop.
///
/// Adds the embedding column when absent, creates the partial index the
/// pending-work query relies on, creates the vector index mirror and its
/// metadata, and refuses to continue when the index was declared with a
/// different width than `dimensions`.
pub fn bootstrap(
    connection: &Connection,
    layout: &StoreLayout,
    model: &SemanticModelConfig,
    dimensions: usize,
) -> PipelineResult<IndexMetadata> {
    layout.validate()?;
    if dimensions == 0 {
        return Err(PipelineError::config("embedding dimension must be positive"));
    }

    let columns = table_columns(connection, &layout.table)?;
    if columns.is_empty() {
        return Err(PipelineError::config(format!(
            "record table {} does not exist",
            layout.table
        )));
    }
    for required in [&layout.id_column, &layout.text_column] {
        if !columns.iter().any(|column| column.eq_ignore_ascii_case(required)) {
            return Err(PipelineError::config(format!(
                "record table {} has no column {}",
                layout.table, required
            )));
        }
    }

    if !columns
        .iter()
        .any(|column| column.eq_ignore_ascii_case(&layout.embedding_column))
    {
        let alter_sql = format!(
            "ALTER TABLE {} ADD COLUMN {} BLOB",
            layout.table, layout.embedding_column
        );
        connection
            .execute(&alter_sql, [])
            .map_err(|err| bootstrap_err("adding the embedding column", err))?;
        info!(
            table = %layout.table,
            column = %layout.embedding_column,
            "added embedding column"
        );
    }

    let pending_index_sql = format!(
        "
        CREATE INDEX IF NOT EXISTS {index_name}
        ON {table} ({id})
        WHERE typeof({text}) = 'text' AND {text} != '' AND {embedding} IS NULL
        ",
        index_name = layout.pending_index_name(),
        table = layout.table,
        id = layout.id_column,
        embedding = layout.embedding_column,
        text = layout.text_column,
    );
    connection
        .execute(&pending_index_sql, [])
        .map_err(|err| bootstrap_err("creating the pending-embedding index", err))?;

    let index_sql = format!(
        "
        CREATE TABLE IF NOT EXISTS {index_table} (
          id PRIMARY KEY,
          embedding BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {INDEX_META_TABLE} (
          index_table TEXT PRIMARY KEY,
          dimensions INTEGER NOT NULL,
          model_id TEXT NOT NULL,
          model_checksum TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        ",
        index_table = layout.index_table,
    );
    connection
        .execute_batch(&index_sql)
        .map_err(|err| bootstrap_err("creating the vector index tables", err))?;

    check_index_dimensions(connection, layout, dimensions)?;

    let now = now_utc_string();
    connection
        .execute(
            &format!(
                "
                INSERT INTO {INDEX_META_TABLE}(index_table, dimensions, model_id, model_checksum, created_at, updated_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(index_table) DO UPDATE SET
                  model_id=excluded.model_id,
                  model_checksum=excluded.model_checksum,
                  updated_at=excluded.updated_at
                "
            ),
            params![
                layout.index_table,
                dimensions as i64,
                model.model_id,
                model.checksum(),
                now,
            ],
        )
        .map_err(|err| bootstrap_err("recording vector index metadata", err))?;

    let metadata = load_index_metadata(connection, &layout.index_table)?.ok_or_else(|| {
        PipelineError::config(format!(
            "vector index metadata for {} vanished after bootstrap",
            layout.index_table
        ))
    })?;

    info!(
        table = %layout.table,
        index_table = %metadata.index_table,
        dimensions = metadata.dimensions,
        model_id = %metadata.model_id,
        "schema ready"
    );

    Ok(metadata)
}

fn check_index_dimensions(
    connection: &Connection,
    layout: &StoreLayout,
    dimensions: usize,
) -> PipelineResult<()> {
    if let Some(existing) = load_index_metadata(connection, &layout.index_table)? {
        if existing.dimensions != dimensions {
            return Err(PipelineError::config(format!(
                "vector index {} was built for {} dimensions (model {}), but the loaded model produces {}",
                layout.index_table, existing.dimensions, existing.model_id, dimensions
            )));
        }
        return Ok(());
    }

    // Index created without metadata: infer its width from a stored entry.
    let sample_len = connection
        .query_row(
            &format!(
                "SELECT length(embedding) FROM {} LIMIT 1",
                layout.index_table
            ),
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|err| bootstrap_err("sampling the vector index", err))?;

    match sample_len {
        Some(len) if len != (dimensions * 4) as i64 => Err(PipelineError::config(format!(
            "vector index {} holds {}-byte vectors, but the loaded model produces {} dimensions",
            layout.index_table, len, dimensions
        ))),
        _ => Ok(()),
    }
}

pub fn load_index_metadata(
    connection: &Connection,
    index_table: &str,
) -> PipelineResult<Option<IndexMetadata>> {
    let meta_exists = table_exists(connection, INDEX_META_TABLE)?;
    if !meta_exists {
        return Ok(None);
    }

    connection
        .query_row(
            &format!(
                "
                SELECT index_table, dimensions, model_id, model_checksum, created_at, updated_at
                FROM {INDEX_META_TABLE}
                WHERE index_table = ?1
                "
            ),
            [index_table],
            |row| {
                Ok(IndexMetadata {
                    index_table: row.get(0)?,
                    dimensions: row.get::<_, i64>(1)? as usize,
                    model_id: row.get(2)?,
                    model_checksum: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|err| PipelineError::storage_unavailable("loading vector index metadata", err))
}

/// `SELECT COUNT(*) FROM <table> [WHERE <predicate>]`; `None` when the
/// table does not exist.
pub fn count_rows(
    connection: &Connection,
    table: &str,
    predicate: Option<&str>,
) -> PipelineResult<Option<usize>> {
    if !table_exists(connection, table)? {
        return Ok(None);
    }

    let sql = match predicate {
        Some(predicate) => format!("SELECT COUNT(*) FROM {table} WHERE {predicate}"),
        None => format!("SELECT COUNT(*) FROM {table}"),
    };
    let count = connection
        .query_row(&sql, [], |row| row.get::<_, i64>(0))
        .map_err(|err| PipelineError::storage_unavailable(format!("counting rows in {table}"), err))?;

    Ok(Some(count as usize))
}

pub(super) fn table_exists(connection: &Connection, table: &str) -> PipelineResult<bool> {
    let exists = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |_| Ok(()),
        )
        .optional()
        .map_err(|err| PipelineError::storage_unavailable("inspecting sqlite_master", err))?;

    Ok(exists.is_some())
}

/// Case-insensitive column lookup; `false` when the table does not exist.
pub fn has_column(connection: &Connection, table: &str, column: &str) -> PipelineResult<bool> {
    let columns = table_columns(connection, table)?;
    Ok(columns.iter().any(|name| name.eq_ignore_ascii_case(column)))
}

pub(super) fn table_columns(connection: &Connection, table: &str) -> PipelineResult<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({table})");
    let mut statement = connection
        .prepare(&pragma_sql)
        .map_err(|err| PipelineError::storage_unavailable(format!("inspecting {table}"), err))?;

    let columns = statement
        .query_map([], |row| row.get::<_, String>(1))
        .and_then(|rows| rows.collect::<Result<Vec<String>, _>>())
        .map_err(|err| PipelineError::storage_unavailable(format!("inspecting {table}"), err))?;

    Ok(columns)
}

fn bootstrap_err(context: &str, source: rusqlite::Error) -> PipelineError {
    PipelineError::storage_unavailable(context, source)
}
