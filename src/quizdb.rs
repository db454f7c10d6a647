mod challenges;
mod progress;
mod schema;
mod users;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub use challenges::*;
pub use progress::*;
pub use users::*;

pub type DBResult<T> = rusqlite::Result<T>;

/// Opens a connection to the quiz database at `path`, creating the file if needed.
pub fn connect(path: &Path) -> DBResult<Connection> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(connection)
}

/// Creates every table and index that doesn't already exist.
pub fn initialize_db(connection: &Connection) -> DBResult<()> {
    log::debug!("[initialize_db] creating users table...");
    connection.execute(schema::USERS_SCHEMA, [])?;
    connection.execute(schema::USERNAME_INDEX, [])?;

    log::debug!("[initialize_db] creating user_progress table...");
    connection.execute(schema::PROGRESS_SCHEMA, [])?;

    log::debug!("[initialize_db] creating challenges table...");
    connection.execute(schema::CHALLENGES_SCHEMA, [])?;
    for index in schema::CHALLENGE_INDEXES {
        connection.execute(index, [])?;
    }

    Ok(())
}

/// Drops users and their progress, then recreates empty tables.
/// Challenges are left untouched.
pub fn reset_users(connection: &Connection) -> DBResult<()> {
    log::info!("[reset_users] Dropping users and user_progress...");
    connection.execute_batch(
        "DROP TABLE IF EXISTS user_progress;
         DROP TABLE IF EXISTS users;
         DROP INDEX IF EXISTS idx_username;",
    )?;

    initialize_db(connection)
}

/// Deletes the database file at `path` (if any) and creates a fresh, empty schema.
pub fn recreate_db(path: &Path) -> Result<Connection> {
    if path.exists() {
        log::info!("[recreate_db] Removing existing database file: {}", path.display());
        std::fs::remove_file(path)
            .with_context(|| format!("Could not remove existing database {}", path.display()))?;
    }

    // Stale journal files from the old database must not be replayed into the new one.
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = Path::new(&sidecar);
        if sidecar.exists() {
            std::fs::remove_file(sidecar)
                .with_context(|| format!("Could not remove {}", sidecar.display()))?;
        }
    }

    let connection = connect(path)
        .with_context(|| format!("Could not create database {}", path.display()))?;
    initialize_db(&connection).context("Could not create database schema")?;
    log::info!("[recreate_db] Created new database: {}", path.display());

    Ok(connection)
}

/// Turns a constraint violation into `Ok(false)`, and passes every other error along.
pub(crate) fn swallow_constraint_violation(err: rusqlite::Error) -> DBResult<bool> {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            log::trace!("[swallow_constraint_violation] Ignoring: {err}");
            Ok(false)
        }
        _ => Err(err),
    }
}
