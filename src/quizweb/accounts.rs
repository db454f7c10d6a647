//! Registration, login and the per-user profile.

use actix_session::Session;
use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};

use crate::models::SQLITE_TIMESTAMP_FORMAT;
use crate::quizweb::{ApiError, ApiResult, AppState, session, with_db};
use crate::{auth, quizdb};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub created_at: Option<String>,
    pub total_score: i64,
    pub completed_count: i64,
    pub seen_count: usize,
}

#[post("/register")]
pub async fn register(state: web::Data<AppState>, body: web::Json<Credentials>) -> ApiResult<HttpResponse> {
    let Credentials { username, password } = body.into_inner();
    let username = username.trim().to_string();

    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required."));
    }
    if !auth::is_valid_username(&username) {
        return Err(ApiError::bad_request(format!(
            "Usernames must be {}-{} characters of letters, digits, '_', '.' or '-'.",
            auth::MIN_USERNAME_LENGTH,
            auth::MAX_USERNAME_LENGTH,
        )));
    }

    let account = with_db(&state, move |connection| {
        let password_hash = auth::hash_password(&password)?;

        let tx = connection.transaction()?;
        let Some(id) = quizdb::insert_user(&tx, &username, &password_hash)? else {
            return Err(ApiError::Conflict(format!("Username '{username}' is already taken.")));
        };
        quizdb::insert_progress(&tx, id)?;
        tx.commit()?;

        Ok(AccountView { id, username })
    })
    .await?;

    log::info!("[register] New user {} (#{})", account.username, account.id);
    Ok(HttpResponse::Created().json(account))
}

#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    session: Session,
    body: web::Json<Credentials>,
) -> ApiResult<HttpResponse> {
    let Credentials { username, password } = body.into_inner();
    let username = username.trim().to_string();

    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required."));
    }

    let account = with_db(&state, move |connection| {
        let user = quizdb::query_user_by_name(connection, &username)?
            .filter(|user| auth::verify_password(&password, &user.password_hash));

        match user {
            Some(user) => Ok(AccountView { id: user.id, username: user.username }),
            None => {
                log::info!("[login] Failed login attempt for '{username}'");
                Err(ApiError::Unauthorized(String::from("Invalid username or password.")))
            }
        }
    })
    .await?;

    session::persist_user(&session, account.id)?;
    log::info!("[login] {} (#{}) logged in.", account.username, account.id);
    Ok(HttpResponse::Ok().json(account))
}

#[post("/logout")]
pub async fn logout(session: Session) -> ApiResult<HttpResponse> {
    let user_id = session::require_user_id(&session)?;
    session.purge();

    log::info!("[logout] User {user_id} logged out.");
    Ok(HttpResponse::NoContent().finish())
}

#[post("/password")]
pub async fn change_password(
    state: web::Data<AppState>,
    session: Session,
    body: web::Json<PasswordChange>,
) -> ApiResult<HttpResponse> {
    let user_id = session::require_user_id(&session)?;
    let PasswordChange { current_password, new_password } = body.into_inner();

    if new_password.is_empty() {
        return Err(ApiError::bad_request("New password must not be empty."));
    }

    with_db(&state, move |connection| {
        let user = session::load_user(connection, user_id)?;
        if !auth::verify_password(&current_password, &user.password_hash) {
            return Err(ApiError::Unauthorized(String::from("Current password is incorrect.")));
        }

        let password_hash = auth::hash_password(&new_password)?;
        if !quizdb::update_password_hash(connection, user_id, &password_hash)? {
            return Err(ApiError::login_required());
        }
        Ok(())
    })
    .await?;

    session.renew();
    log::info!("[change_password] User {user_id} changed their password.");
    Ok(HttpResponse::NoContent().finish())
}

#[get("/profile")]
pub async fn profile(state: web::Data<AppState>, session: Session) -> ApiResult<HttpResponse> {
    let user_id = session::require_user_id(&session)?;

    let view = with_db(&state, move |connection| {
        let user = session::load_user(connection, user_id)?;
        let progress = quizdb::query_progress_or_default(connection, user_id)?;

        Ok(ProfileView {
            username: user.username,
            created_at: user
                .created_at
                .map(|created| created.format(SQLITE_TIMESTAMP_FORMAT).to_string()),
            total_score: progress.total_score,
            completed_count: progress.completed_count,
            seen_count: progress.seen_challenges.len(),
        })
    })
    .await?;

    Ok(HttpResponse::Ok().json(view))
}
