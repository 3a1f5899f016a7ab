mod schema;
#[cfg(test)]
mod tests;

use std::path::Path;

use regex::Regex;
use rusqlite::{Connection, OpenFlags};

use crate::error::{PipelineError, PipelineResult};

pub use schema::{bootstrap, count_rows, has_column, load_index_metadata};

pub const INDEX_META_TABLE: &str = "vector_index_meta";

/// Names of the record table, its columns and the mirrored vector index.
/// Every name ends up interpolated into SQL, so `validate` must pass first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub table: String,
    pub id_column: String,
    pub text_column: String,
    pub embedding_column: String,
    pub index_table: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            table: "products".to_string(),
            id_column: "id".to_string(),
            text_column: "search_text".to_string(),
            embedding_column: "embedding".to_string(),
            index_table: "vec_products".to_string(),
        }
    }
}

impl StoreLayout {
    pub fn validate(&self) -> PipelineResult<()> {
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|err| PipelineError::config(format!("invalid identifier pattern: {err}")))?;

        for (role, name) in [
            ("table", &self.table),
            ("id column", &self.id_column),
            ("text column", &self.text_column),
            ("embedding column", &self.embedding_column),
            ("index table", &self.index_table),
        ] {
            if !identifier.is_match(name) {
                return Err(PipelineError::config(format!(
                    "{role} name is not a plain SQL identifier: {name:?}"
                )));
            }
        }

        let columns = [
            ("id column", &self.id_column),
            ("text column", &self.text_column),
            ("embedding column", &self.embedding_column),
        ];
        for (i, (role, name)) in columns.iter().enumerate() {
            for (other_role, other) in &columns[i + 1..] {
                if name.eq_ignore_ascii_case(other) {
                    return Err(PipelineError::config(format!(
                        "{role} and {other_role} must be different columns, both are {name:?}"
                    )));
                }
            }
        }

        if self.table.eq_ignore_ascii_case(&self.index_table) {
            return Err(PipelineError::config(
                "index table must differ from the record table",
            ));
        }
        if self.index_table.eq_ignore_ascii_case(INDEX_META_TABLE) {
            return Err(PipelineError::config(format!(
                "index table name {INDEX_META_TABLE} is reserved"
            )));
        }

        Ok(())
    }

    pub fn pending_index_name(&self) -> String {
        format!("idx_{}_pending_embedding", self.table)
    }
}

pub fn open_connection(db_path: &Path) -> PipelineResult<Connection> {
    let connection = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| {
        PipelineError::storage_unavailable(format!("opening {}", db_path.display()), err)
    })?;

    configure_connection(&connection)?;
    Ok(connection)
}

pub fn open_read_only(db_path: &Path) -> PipelineResult<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| {
        PipelineError::storage_unavailable(format!("opening {} read-only", db_path.display()), err)
    })
}

fn configure_connection(connection: &Connection) -> PipelineResult<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .map_err(|err| PipelineError::storage_unavailable("setting journal_mode=WAL", err))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(|err| PipelineError::storage_unavailable("setting synchronous=NORMAL", err))?;
    Ok(())
}
