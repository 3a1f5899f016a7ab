use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::embed::{count_pending, count_unpublished};
use crate::error::PipelineResult;
use crate::semantic::decode_embedding_blob;
use crate::store::{StoreLayout, count_rows, has_column, load_index_metadata, open_read_only};

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = args.store.layout();
    layout.validate()?;
    let db_path = &args.store.db_path;

    info!(db_path = %db_path.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = open_read_only(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let Some(counts) = record_counts(&connection, &layout)? else {
        warn!(table = %layout.table, "record table missing");
        return Ok(());
    };

    info!(
        table = %layout.table,
        records = counts.records,
        embedded = counts.embedded.unwrap_or_default(),
        pending = counts.pending.unwrap_or_default(),
        "record status"
    );
    if counts.embedded.is_none() {
        warn!(
            column = %layout.embedding_column,
            "embedding column missing; run setup or embed first"
        );
    }

    let Some(index_entries) = count_rows(&connection, &layout.index_table, None)? else {
        warn!(index_table = %layout.index_table, "vector index table missing");
        return Ok(());
    };
    let unpublished = match counts.embedded {
        Some(_) => Some(count_unpublished(&connection, &layout)?),
        None => None,
    };

    let Some(metadata) = load_index_metadata(&connection, &layout.index_table)? else {
        warn!(
            index_table = %layout.index_table,
            entries = index_entries,
            "vector index has no metadata row"
        );
        return Ok(());
    };

    info!(
        index_table = %layout.index_table,
        entries = index_entries,
        unpublished = unpublished.unwrap_or_default(),
        dimensions = metadata.dimensions,
        model_id = %metadata.model_id,
        updated_at = %metadata.updated_at,
        "vector index status"
    );

    if counts.embedded.is_none() {
        return Ok(());
    }
    if let Some(sample) = sample_stored_embedding(&connection, &layout)? {
        if decode_embedding_blob(&sample, metadata.dimensions).is_none() {
            warn!(
                bytes = sample.len(),
                dimensions = metadata.dimensions,
                "stored embeddings do not match the index width"
            );
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordCounts {
    records: usize,
    /// `None` only while the embedding column has not been added yet.
    embedded: Option<usize>,
    pending: Option<usize>,
}

/// `None` when the record table is missing. Any other storage error is
/// returned rather than reported as a zero count.
fn record_counts(connection: &Connection, layout: &StoreLayout) -> PipelineResult<Option<RecordCounts>> {
    let Some(records) = count_rows(connection, &layout.table, None)? else {
        return Ok(None);
    };
    if !has_column(connection, &layout.table, &layout.embedding_column)? {
        return Ok(Some(RecordCounts {
            records,
            embedded: None,
            pending: None,
        }));
    }

    let embedded = count_rows(
        connection,
        &layout.table,
        Some(&format!("{} IS NOT NULL", layout.embedding_column)),
    )?;
    let pending = count_pending(connection, layout)?;

    Ok(Some(RecordCounts {
        records,
        embedded,
        pending: Some(pending),
    }))
}

fn sample_stored_embedding(connection: &Connection, layout: &StoreLayout) -> Result<Option<Vec<u8>>> {
    let sql = format!(
        "SELECT {embedding} FROM {table} WHERE {embedding} IS NOT NULL LIMIT 1",
        embedding = layout.embedding_column,
        table = layout.table,
    );
    let sample = connection
        .query_row(&sql, [], |row| row.get::<_, Vec<u8>>(0))
        .optional()
        .context("failed to sample stored embeddings")?;
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn products(schema: &str) -> Connection {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        connection.execute_batch(schema).expect("fixture schema should apply");
        connection
    }

    #[test]
    fn record_counts_before_setup_leave_embedding_counts_empty() {
        let connection = products(
            "
            CREATE TABLE products (id INTEGER PRIMARY KEY, search_text TEXT);
            INSERT INTO products(id, search_text) VALUES (1, 'kettle'), (2, 'mug');
            ",
        );

        let counts = record_counts(&connection, &StoreLayout::default())
            .expect("counting should succeed")
            .expect("record table exists");
        assert_eq!(
            counts,
            RecordCounts {
                records: 2,
                embedded: None,
                pending: None,
            }
        );
    }

    #[test]
    fn record_counts_report_embedded_and_pending() {
        let connection = products(
            "
            CREATE TABLE products (id INTEGER PRIMARY KEY, search_text TEXT, embedding BLOB);
            INSERT INTO products(id, search_text, embedding) VALUES
              (1, 'kettle', zeroblob(16)),
              (2, 'mug', NULL),
              (3, NULL, NULL);
            ",
        );

        let counts = record_counts(&connection, &StoreLayout::default())
            .expect("counting should succeed")
            .expect("record table exists");
        assert_eq!(counts.records, 3);
        assert_eq!(counts.embedded, Some(1));
        assert_eq!(counts.pending, Some(1));
        assert!(
            record_counts(
                &connection,
                &StoreLayout {
                    table: "absent".to_string(),
                    ..StoreLayout::default()
                }
            )
            .expect("missing table is not an error")
            .is_none()
        );
    }

    #[test]
    fn record_counts_propagate_storage_errors() {
        let connection = products(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, body TEXT, embedding BLOB);",
        );

        let err = record_counts(&connection, &StoreLayout::default())
            .expect_err("a missing text column must not read as zero pending");
        assert_eq!(err.kind(), "storage_unavailable");
    }
}
