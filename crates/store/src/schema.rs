/// DDL for the embedded document store.
/// All statements are idempotent (IF NOT EXISTS).
pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS indices (
    name    TEXT PRIMARY KEY,
    mapping TEXT
);

CREATE TABLE IF NOT EXISTS documents (
    index_name TEXT NOT NULL,
    doc_id     TEXT NOT NULL,
    body       TEXT NOT NULL,
    PRIMARY KEY (index_name, doc_id)
);
"#;
