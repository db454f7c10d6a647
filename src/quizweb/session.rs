//! Thin helpers over the cookie session so handlers only deal with user ids.

use actix_session::Session;
use rusqlite::Connection;

use crate::{models, quizdb, quizweb::{ApiError, ApiResult}};

pub(crate) const USER_ID_KEY: &str = "user_id";

/// Stores the authenticated user's id, rotating the session first.
pub fn persist_user(session: &Session, user_id: i64) -> ApiResult<()> {
    session.renew();
    session
        .insert(USER_ID_KEY, user_id)
        .map_err(|err| ApiError::Internal(format!("failed to persist session: {err}")))
}

/// The user id stored in the session, if any.
///
/// A value that can't be read is logged and treated as logged out.
pub fn current_user_id(session: &Session) -> Option<i64> {
    session
        .get::<i64>(USER_ID_KEY)
        .inspect_err(|err| log::warn!("[current_user_id] Unreadable session: {err}"))
        .ok()
        .flatten()
}

/// Requires an authenticated user id, or fails with `401 Unauthorized`.
pub fn require_user_id(session: &Session) -> ApiResult<i64> {
    current_user_id(session).ok_or_else(ApiError::login_required)
}

/// Loads the session's user from the database.
///
/// A session pointing at a user that no longer exists is treated as logged out.
pub fn load_user(connection: &Connection, user_id: i64) -> ApiResult<models::User> {
    quizdb::query_user(connection, user_id)?.ok_or_else(|| {
        log::info!("[load_user] Session refers to unknown user {user_id}.");
        ApiError::login_required()
    })
}
