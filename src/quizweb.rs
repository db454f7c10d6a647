//! The quiz HTTP server.
//!
//! ```text
//! POST /register {"username": "...", "password": "..."}
//! POST /login    {"username": "...", "password": "..."}
//! GET  /challenge/{difficulty}
//! POST /submit   {"challenge_id": 1, "selected_cwe": "<base64>", "used_diff": false}
//! ```

pub mod accounts;
mod error;
pub mod quiz;
pub mod session;

use std::path::PathBuf;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Key, SameSite};
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::{ScoringTable, ServerConfig};
use crate::quizdb;

pub use error::{ApiError, ApiResult};

pub const SESSION_COOKIE_NAME: &str = "quiz_session";

/// Shared, read-only state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub database: PathBuf,
    pub scoring: ScoringTable,
    pub reveal_answers: bool,
}

impl From<&ServerConfig> for AppState {
    fn from(config: &ServerConfig) -> Self {
        Self {
            database: config.database.clone(),
            scoring: config.scoring,
            reveal_answers: config.reveal_answers,
        }
    }
}

/// Runs `f` against a fresh database connection on the blocking thread pool.
pub(crate) async fn with_db<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut Connection) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let path = state.database.clone();
    web::block(move || {
        let mut connection = quizdb::connect(&path)?;
        f(&mut connection)
    })
    .await?
}

/// Registers every route. Bad JSON bodies and query strings are reported as `400`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        log::info!("[configure] Rejected JSON payload: {err}");
        ApiError::bad_request(format!("Invalid request data: {err}")).into()
    });

    let query_config = web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::bad_request(format!("Invalid query string: {err}")).into()
    });

    cfg.app_data(json_config)
        .app_data(query_config)
        .service(accounts::register)
        .service(accounts::login)
        .service(accounts::logout)
        .service(accounts::change_password)
        .service(accounts::profile)
        .service(quiz::get_challenge)
        .service(quiz::get_diff)
        .service(quiz::submit_answer)
        .service(quiz::leaderboard)
        .service(quiz::list_cwes);
}

/// Cookie signing key from the configured secret, or a random one.
pub fn session_key(config: &ServerConfig) -> Key {
    match config.secret_key.as_deref() {
        Some(secret) if secret.len() >= 64 => Key::from(secret),
        Some(_) => {
            log::warn!("QUIZ_SECRET_KEY is shorter than 64 bytes; using a temporary session key.");
            Key::generate()
        }
        None => {
            log::warn!("QUIZ_SECRET_KEY not set; using a temporary session key. \
                        Sessions will not survive a restart.");
            Key::generate()
        }
    }
}

pub fn session_middleware(key: Key, cookie_secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(String::from(SESSION_COOKIE_NAME))
        .cookie_path(String::from("/"))
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .build()
}

/// Ensures the schema exists, then serves until shut down.
pub async fn run(config: ServerConfig) -> Result<()> {
    let connection = quizdb::connect(&config.database)
        .with_context(|| format!("Could not open database {}", config.database.display()))?;
    quizdb::initialize_db(&connection).context("Could not initialize database")?;
    log::info!("[run] Challenge corpus holds {} challenges.", quizdb::count_challenges(&connection)?);
    drop(connection);

    let state = web::Data::new(AppState::from(&config));
    let key = session_key(&config);
    let cookie_secure = config.cookie_secure;

    log::info!("[run] Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(session_middleware(key.clone(), cookie_secure))
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(&config.bind)
    .with_context(|| format!("Could not bind to {}", config.bind))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
