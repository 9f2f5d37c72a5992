//! `SQLite` schema definitions for the durable record store.
//!
//! Only the metadata table is created up front; the collections table is
//! created by the versioned migrations.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 1: one row per collection, holding the whole collection as JSON.
pub const CREATE_COLLECTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS collections (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
)
";

/// Statements run on every open, before migrations.
pub const BOOTSTRAP_STATEMENTS: &[&str] = &[CREATE_METADATA_TABLE];

/// Upsert of a whole collection payload.
pub const UPSERT_COLLECTION: &str = r"
INSERT INTO collections (key, value, updated_at, record_count)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value,
    updated_at = excluded.updated_at,
    record_count = excluded.record_count
";

/// Read of a whole collection payload.
pub const SELECT_COLLECTION: &str = "SELECT value FROM collections WHERE key = ?1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_statements_not_empty() {
        assert!(!BOOTSTRAP_STATEMENTS.is_empty());
        for stmt in BOOTSTRAP_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_collections_table_columns() {
        assert!(CREATE_COLLECTIONS_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_COLLECTIONS_TABLE.contains("value TEXT NOT NULL"));
        assert!(CREATE_COLLECTIONS_TABLE.contains("record_count INTEGER NOT NULL"));
        assert!(CREATE_COLLECTIONS_TABLE.contains("updated_at TEXT NOT NULL"));
    }

    #[test]
    fn test_upsert_touches_every_column() {
        for column in ["value", "updated_at", "record_count"] {
            assert!(UPSERT_COLLECTION.contains(&format!("{column} = excluded.{column}")));
        }
    }
}
