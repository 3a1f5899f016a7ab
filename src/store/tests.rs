use rusqlite::Connection;

use super::schema::{table_columns, table_exists};
use super::*;
use crate::semantic::{DEFAULT_MODEL_ID, resolve_model_config};

fn products_db() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory DB should open");
    connection
        .execute_batch(
            "
            CREATE TABLE products (
              id INTEGER PRIMARY KEY,
              name TEXT,
              search_text TEXT
            );
            INSERT INTO products(id, name, search_text) VALUES (1, 'kettle', 'steel kettle');
            ",
        )
        .expect("fixture schema should apply");
    connection
}

#[test]
fn layout_rejects_non_identifier_names() {
    let layout = StoreLayout {
        table: "products; DROP TABLE products".to_string(),
        ..StoreLayout::default()
    };
    let err = layout.validate().expect_err("injection-shaped name must be rejected");
    assert_eq!(err.kind(), "configuration_error");

    let same_table = StoreLayout {
        index_table: "PRODUCTS".to_string(),
        ..StoreLayout::default()
    };
    assert!(same_table.validate().is_err());

    assert!(StoreLayout::default().validate().is_ok());
}

#[test]
fn layout_rejects_one_column_in_two_roles() {
    let embedding_is_text = StoreLayout {
        embedding_column: "search_text".to_string(),
        ..StoreLayout::default()
    };
    let err = embedding_is_text
        .validate()
        .expect_err("embedding column must not overwrite the text column");
    assert_eq!(err.kind(), "configuration_error");
    assert!(err.to_string().contains("text column and embedding column"));

    let embedding_is_id = StoreLayout {
        embedding_column: "ID".to_string(),
        ..StoreLayout::default()
    };
    assert!(embedding_is_id.validate().is_err());

    let text_is_id = StoreLayout {
        text_column: "id".to_string(),
        ..StoreLayout::default()
    };
    assert!(text_is_id.validate().is_err());

    let connection = products_db();
    let err = bootstrap(
        &connection,
        &embedding_is_text,
        &resolve_model_config(DEFAULT_MODEL_ID),
        4,
    )
    .expect_err("bootstrap must refuse an aliased embedding column");
    assert_eq!(err.kind(), "configuration_error");
    assert_eq!(
        table_columns(&connection, "products").expect("columns should load"),
        vec!["id", "name", "search_text"]
    );
}

#[test]
fn bootstrap_adds_column_index_and_mirror_table() {
    let connection = products_db();
    let layout = StoreLayout::default();
    let model = resolve_model_config(DEFAULT_MODEL_ID);

    let metadata = bootstrap(&connection, &layout, &model, 8).expect("bootstrap should succeed");
    assert_eq!(metadata.dimensions, 8);
    assert_eq!(metadata.model_id, DEFAULT_MODEL_ID);

    let columns = table_columns(&connection, "products").unwrap();
    assert!(columns.iter().any(|column| column == "embedding"));
    assert!(table_exists(&connection, "vec_products").unwrap());

    let index_sql: String = connection
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?1",
            [layout.pending_index_name()],
            |row| row.get(0),
        )
        .expect("pending index should exist");
    assert!(index_sql.contains("embedding IS NULL"));
}

#[test]
fn bootstrap_is_idempotent() {
    let connection = products_db();
    let layout = StoreLayout::default();
    let model = resolve_model_config(DEFAULT_MODEL_ID);

    let first = bootstrap(&connection, &layout, &model, 8).unwrap();
    let second = bootstrap(&connection, &layout, &model, 8).unwrap();
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(count_rows(&connection, INDEX_META_TABLE, None).unwrap(), Some(1));
}

#[test]
fn bootstrap_rejects_dimension_change() {
    let connection = products_db();
    let layout = StoreLayout::default();
    let model = resolve_model_config(DEFAULT_MODEL_ID);

    bootstrap(&connection, &layout, &model, 8).unwrap();
    let err = bootstrap(&connection, &layout, &model, 16).expect_err("width change must fail");
    assert_eq!(err.kind(), "configuration_error");
    assert!(err.to_string().contains("8 dimensions"));
}

#[test]
fn bootstrap_infers_width_of_index_without_metadata() {
    let connection = products_db();
    connection
        .execute_batch(
            "
            CREATE TABLE vec_products (id PRIMARY KEY, embedding BLOB NOT NULL);
            INSERT INTO vec_products(id, embedding) VALUES (1, zeroblob(16));
            ",
        )
        .unwrap();
    let layout = StoreLayout::default();
    let model = resolve_model_config(DEFAULT_MODEL_ID);

    assert!(bootstrap(&connection, &layout, &model, 8).is_err());
    assert!(bootstrap(&connection, &layout, &model, 4).is_ok());
}

#[test]
fn bootstrap_requires_record_table_and_text_column() {
    let connection = Connection::open_in_memory().unwrap();
    let model = resolve_model_config(DEFAULT_MODEL_ID);
    let err = bootstrap(&connection, &StoreLayout::default(), &model, 8).unwrap_err();
    assert!(err.to_string().contains("does not exist"));

    let connection = products_db();
    let layout = StoreLayout {
        text_column: "description".to_string(),
        ..StoreLayout::default()
    };
    let err = bootstrap(&connection, &layout, &model, 8).unwrap_err();
    assert!(err.to_string().contains("no column description"));
}

#[test]
fn count_rows_reports_missing_tables_as_none() {
    let connection = products_db();
    assert_eq!(count_rows(&connection, "vec_products", None).unwrap(), None);
    assert_eq!(count_rows(&connection, "products", None).unwrap(), Some(1));
    assert_eq!(
        count_rows(&connection, "products", Some("search_text IS NULL")).unwrap(),
        Some(0)
    );
}

#[test]
fn has_column_matches_case_insensitively_and_tolerates_missing_tables() {
    let connection = products_db();
    assert!(has_column(&connection, "products", "SEARCH_TEXT").expect("lookup should succeed"));
    assert!(!has_column(&connection, "products", "embedding").expect("lookup should succeed"));
    assert!(!has_column(&connection, "absent", "id").expect("lookup should succeed"));
}
