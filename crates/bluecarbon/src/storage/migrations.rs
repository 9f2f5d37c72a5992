//! Database migration system for the durable record store.
//!
//! The schema version lives in the `metadata` table. Each migration step runs
//! inside its own transaction together with the version bump.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::{BOOTSTRAP_STATEMENTS, CREATE_COLLECTIONS_TABLE};

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Ordered migration steps; index `n` upgrades from version `n` to `n + 1`.
const STEPS: &[&[&str]] = &[&[CREATE_COLLECTIONS_TABLE]];

/// Bring the database schema up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if the stored version is unreadable, newer than this
/// build understands, or a migration step fails.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    for statement in BOOTSTRAP_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    for from in version..CURRENT_VERSION {
        apply_step(conn, from)?;
    }
    if version < CURRENT_VERSION {
        info!(from = version, to = CURRENT_VERSION, "Migrated database schema");
    }
    Ok(())
}

/// Read the schema version, 0 for a fresh database.
///
/// # Errors
///
/// Returns an error if the metadata row cannot be read or parsed.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn apply_step(conn: &mut Connection, from: i32) -> Result<()> {
    let statements = usize::try_from(from)
        .ok()
        .and_then(|index| STEPS.get(index))
        .ok_or_else(|| Error::DatabaseMigration {
            message: format!("no migration from version {from}"),
        })?;

    let tx = conn.transaction()?;
    for statement in *statements {
        tx.execute(statement, [])?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, (from + 1).to_string()),
    )?;
    tx.commit()?;

    debug!(version = from + 1, "Applied migration step");
    Ok(())
}
