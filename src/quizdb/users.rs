use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};

use crate::{quizdb::{DBResult, swallow_constraint_violation}, models::{self, SQLITE_TIMESTAMP_FORMAT}};

/////*============== USER QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::User {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let created_at = row
            .get::<_, Option<String>>("created_at")?
            .and_then(|raw| NaiveDateTime::parse_from_str(&raw, SQLITE_TIMESTAMP_FORMAT).ok());

        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            password_hash: row.get("password_hash")?,
            created_at,
        })
    }
}

/// Returns the user with the id `user_id`, if they exist.
pub fn query_user(connection: &Connection, user_id: i64) -> DBResult<Option<models::User>> {
    connection
        .prepare("SELECT * FROM users WHERE id = :id")?
        .query_row(rusqlite::named_params! { ":id": user_id }, |row| models::User::try_from(row))
        .optional()
}

/// Returns the user with the username: `username`, if they exist.
pub fn query_user_by_name(connection: &Connection, username: &str) -> DBResult<Option<models::User>> {
    connection
        .prepare("SELECT * FROM users WHERE username = :username")?
        .query(rusqlite::named_params! { ":username": username })?
        .next()?
        .map(|row| row.try_into())
        .transpose()
}

/// Inserts a new user.
///
/// Returns the new user's id, or `None` if the username is already taken.
pub fn insert_user(connection: &Connection, username: &str, password_hash: &str) -> DBResult<Option<i64>> {
    log::trace!("[insert_user] Inserting user {username} into users...");

    let inserted = connection
        .prepare(
            "INSERT INTO users ( username,  password_hash)
             VALUES            (:username, :password_hash)",
        )?
        .execute(rusqlite::named_params! {
            ":username":      username,
            ":password_hash": password_hash,
        })
        .map_or_else(swallow_constraint_violation, |_| Ok(true))?;

    if !inserted {
        log::info!("[insert_user] Username {username} is already taken.");
        return Ok(None);
    }

    let user_id = connection.last_insert_rowid();
    log::info!("User {username} has been added to the database.");
    Ok(Some(user_id))
}

/// Replaces a user's password hash.
pub fn update_password_hash(connection: &Connection, user_id: i64, password_hash: &str) -> DBResult<bool> {
    let changed = connection
        .prepare("UPDATE users SET password_hash = :password_hash WHERE id = :id")?
        .execute(rusqlite::named_params! { ":password_hash": password_hash, ":id": user_id })
        .inspect_err(|err| log::error!("[update_password_hash] Could not update user {user_id}: {err}"))?;

    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quizdb::test_support::memory_db;

    #[test]
    fn inserts_and_queries_user() {
        let connection = memory_db();
        let id = insert_user(&connection, "alice", "hash-a").unwrap().unwrap();

        let by_id = query_user(&connection, id).unwrap().unwrap();
        let by_name = query_user_by_name(&connection, "alice").unwrap().unwrap();

        assert_eq!(by_id.username, "alice");
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.password_hash, "hash-a");
        assert!(by_name.created_at.is_some());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let connection = memory_db();
        assert!(insert_user(&connection, "alice", "a").unwrap().is_some());
        assert!(insert_user(&connection, "alice", "b").unwrap().is_none());
    }

    #[test]
    fn missing_user_is_none() {
        let connection = memory_db();
        assert!(query_user(&connection, 42).unwrap().is_none());
        assert!(query_user_by_name(&connection, "nobody").unwrap().is_none());
    }

    #[test]
    fn updates_password_hash() {
        let connection = memory_db();
        let id = insert_user(&connection, "alice", "old").unwrap().unwrap();
        assert!(update_password_hash(&connection, id, "new").unwrap());
        assert_eq!(query_user(&connection, id).unwrap().unwrap().password_hash, "new");
        assert!(!update_password_hash(&connection, id + 1, "new").unwrap());
    }
}
