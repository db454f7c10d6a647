use rusqlite::{Connection, OptionalExtension};

use crate::{quizdb::{DBResult, swallow_constraint_violation}, models};

/////*============== PROGRESS QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::Progress {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let user_id: i64 = row.get("user_id")?;
        let raw_seen: String = row.get("seen_challenges")?;

        Ok(Self {
            user_id,
            total_score: row.get("total_score")?,
            completed_count: row.get("completed_count")?,
            seen_challenges: parse_seen_challenges(user_id, &raw_seen),
        })
    }
}

/// Decodes the stored JSON array of seen challenge ids.
/// Anything unreadable is logged and treated as an empty history.
fn parse_seen_challenges(user_id: i64, raw: &str) -> Vec<i64> {
    serde_json::from_str::<Vec<i64>>(raw).unwrap_or_else(|err| {
        log::warn!("[parse_seen_challenges] Could not parse seen_challenges for user {user_id} \
                    (content: '{raw}'): {err}. Resetting.");
        Vec::new()
    })
}

/// Creates the (empty) progress row for a user, doing nothing if it's already there.
/// Returns `true` if it was newly added, false otherwise.
pub fn insert_progress(connection: &Connection, user_id: i64) -> DBResult<bool> {
    log::trace!("[insert_progress] Initializing progress for user {user_id}");

    connection
        .prepare("INSERT INTO user_progress (user_id) VALUES (:user_id)")?
        .execute(rusqlite::named_params! { ":user_id": user_id })
        .map_or_else(swallow_constraint_violation, |_| Ok(true))
}

/// Retrieves a user's progress.
///
/// Returns None if the user has no progress row.
pub fn query_progress(connection: &Connection, user_id: i64) -> DBResult<Option<models::Progress>> {
    connection
        .prepare("SELECT * FROM user_progress WHERE user_id = :user_id")?
        .query_row(rusqlite::named_params! { ":user_id": user_id }, |row| models::Progress::try_from(row))
        .optional()
}

/// Retrieves a user's progress, or an all-zero progress if none is stored.
pub fn query_progress_or_default(connection: &Connection, user_id: i64) -> DBResult<models::Progress> {
    Ok(query_progress(connection, user_id)?.unwrap_or_else(|| {
        log::warn!("[query_progress_or_default] No progress row for user {user_id}, using defaults.");
        models::Progress { user_id, ..Default::default() }
    }))
}

/// Overwrites the stored list of seen challenges.
pub fn update_seen_challenges(connection: &Connection, user_id: i64, seen: &[i64]) -> DBResult<()> {
    let encoded = serde_json::to_string(seen)
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;

    connection
        .prepare("UPDATE user_progress SET seen_challenges = :seen WHERE user_id = :user_id")?
        .execute(rusqlite::named_params! { ":seen": encoded, ":user_id": user_id })
        .inspect_err(|err| log::error!("[update_seen_challenges] Could not update user {user_id}: {err}"))?;

    Ok(())
}

/// Adds `earned` points to a user's score, and bumps their completed count if `correct`.
///
/// Returns their new progress.
pub fn record_attempt(
    connection: &mut Connection,
    user_id: i64,
    earned: i64,
    correct: bool,
) -> DBResult<models::Progress> {
    log::trace!("[record_attempt] Adding {earned} points to user {user_id} (correct: {correct})");

    let tx = connection.transaction()?;
    insert_progress(&tx, user_id)?;
    tx.prepare(
        "UPDATE user_progress
         SET total_score = total_score + :earned,
             completed_count = completed_count + :completed
         WHERE user_id = :user_id",
    )?
    .execute(rusqlite::named_params! {
        ":earned":    earned,
        ":completed": i64::from(correct),
        ":user_id":   user_id,
    })?;

    let progress = tx
        .prepare("SELECT * FROM user_progress WHERE user_id = :user_id")?
        .query_row(rusqlite::named_params! { ":user_id": user_id }, |row| models::Progress::try_from(row))?;
    tx.commit()?;

    log::info!(
        "[record_attempt] User {user_id}'s new score is {} (+{earned})",
        progress.total_score
    );
    Ok(progress)
}

/// Top `limit` users by score, ties broken by completed count.
pub fn query_leaderboard(connection: &Connection, limit: usize) -> DBResult<Vec<models::LeaderboardEntry>> {
    log::trace!("[query_leaderboard] Querying top {limit} users.");

    let mut stmt = connection.prepare(
        "SELECT u.username, p.total_score, p.completed_count
         FROM user_progress p
         JOIN users u ON p.user_id = u.id
         ORDER BY p.total_score DESC, p.completed_count DESC
         LIMIT :limit",
    )?;

    let entries = stmt
        .query_map(rusqlite::named_params! { ":limit": limit as i64 }, |row| {
            Ok(models::LeaderboardEntry {
                username: row.get("username")?,
                total_score: row.get("total_score")?,
                completed_count: row.get("completed_count")?,
            })
        })?
        .collect::<DBResult<Vec<models::LeaderboardEntry>>>()?;

    Ok(entries)
}
