use actix_session::Session;
use actix_web::{HttpResponse, get, post, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};

use crate::models::{Challenge, Difficulty};
use crate::quizweb::{ApiError, ApiResult, AppState, session, with_db};
use crate::{quizdb, scoring};

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const MAX_LEADERBOARD_SIZE: usize = 100;

#[derive(Debug, Serialize)]
pub struct ChallengeView {
    pub id: i64,
    pub title: String,
    pub vulnerable_code: String,
    pub difficulty: Difficulty,
    pub correct_cwe: Option<String>,
    pub correct_cwe_name: Option<String>,
    pub cve_id: Option<String>,
}

impl ChallengeView {
    fn new(challenge: Challenge, reveal_answers: bool) -> Self {
        let title = challenge
            .title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| format!("Challenge #{}", challenge.id));
        let (correct_cwe, correct_cwe_name) = if reveal_answers {
            (Some(challenge.cwe_id), challenge.cwe_name)
        } else {
            (None, None)
        };

        Self {
            id: challenge.id,
            title,
            vulnerable_code: challenge.vulnerable_code,
            difficulty: challenge.difficulty,
            correct_cwe,
            correct_cwe_name,
            cve_id: challenge.cve_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Submission {
    pub challenge_id: Option<i64>,
    /// Base64 of the chosen CWE id.
    pub selected_cwe: Option<String>,
    #[serde(default)]
    pub used_diff: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResult {
    pub correct: bool,
    pub score_earned: i64,
    pub total_score: i64,
    pub completed_count: i64,
    pub solution: Option<String>,
    pub correct_cwe: String,
    pub correct_cwe_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// Decodes a base64 answer into a trimmed, non-empty CWE id.
pub fn decode_answer(encoded: &str) -> ApiResult<String> {
    let decoding_failed = || ApiError::bad_request("Invalid answer format. Decoding failed.");

    let bytes = STANDARD.decode(encoded.trim()).map_err(|err| {
        log::info!("[decode_answer] Rejected answer '{encoded}': {err}");
        decoding_failed()
    })?;
    let answer = String::from_utf8(bytes).map_err(|_| decoding_failed())?;

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(ApiError::bad_request("Decoded answer is empty"));
    }
    Ok(answer.to_string())
}

#[get("/challenge/{difficulty}")]
pub async fn get_challenge(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = session::require_user_id(&session)?;
    let raw = path.into_inner();
    let difficulty: Difficulty = raw
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid difficulty '{raw}'")))?;
    let reveal_answers = state.reveal_answers;

    let view = with_db(&state, move |connection| {
        session::load_user(connection, user_id)?;

        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        quizdb::insert_progress(&tx, user_id)?;
        let mut progress = quizdb::query_progress_or_default(&tx, user_id)?;

        let Some(challenge) = quizdb::query_random_unseen_challenge(&tx, difficulty, &progress.seen_challenges)? else {
            log::info!("[get_challenge] User {user_id} has seen every {difficulty} challenge.");
            return Err(ApiError::not_found(format!("No more challenges found for difficulty '{difficulty}'")));
        };

        if progress.mark_seen(challenge.id) {
            if let Err(err) = quizdb::update_seen_challenges(&tx, user_id, &progress.seen_challenges) {
                log::error!("[get_challenge] Could not mark challenge {} as seen: {err}", challenge.id);
            }
        }
        tx.commit()?;

        log::trace!("[get_challenge] Serving challenge {} to user {user_id}", challenge.id);
        Ok(ChallengeView::new(challenge, reveal_answers))
    })
    .await?;

    Ok(HttpResponse::Ok().json(view))
}

#[get("/diff/{challenge_id}")]
pub async fn get_diff(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    session::require_user_id(&session)?;
    let challenge_id = path.into_inner();

    let fixed_code = with_db(&state, move |connection| {
        quizdb::query_fixed_code(connection, challenge_id)?
            .ok_or_else(|| ApiError::not_found("Challenge not found"))
    })
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "fixed_code": fixed_code })))
}

#[post("/submit")]
pub async fn submit_answer(
    state: web::Data<AppState>,
    session: Session,
    body: web::Json<Submission>,
) -> ApiResult<HttpResponse> {
    let user_id = session::require_user_id(&session)?;
    let Submission { challenge_id, selected_cwe, used_diff } = body.into_inner();

    let (Some(challenge_id), Some(selected_cwe)) = (challenge_id, selected_cwe.filter(|s| !s.is_empty())) else {
        return Err(ApiError::bad_request("Missing challenge ID or answer data"));
    };
    let answer = decode_answer(&selected_cwe)?;
    let table = state.scoring;

    let result = with_db(&state, move |connection| {
        let challenge = quizdb::query_challenge(connection, challenge_id)?
            .ok_or_else(|| ApiError::not_found("Challenge not found"))?;

        let correct = answer == challenge.cwe_id;
        let earned = scoring::score_attempt(&table, challenge.difficulty, correct, used_diff);

        let progress = match quizdb::record_attempt(connection, user_id, earned, correct) {
            Ok(progress) => progress,
            Err(err) => {
                log::error!("[submit_answer] Could not record attempt on challenge {challenge_id} \
                             for user {user_id}: {err}");
                quizdb::query_progress_or_default(connection, user_id).unwrap_or_default()
            }
        };

        log::info!("[submit_answer] User {user_id} answered {answer} on challenge {challenge_id} \
                    (correct: {correct}, earned: {earned})");

        let correct_cwe_name = challenge.cwe_name.unwrap_or_else(|| challenge.cwe_id.clone());
        Ok(SubmissionResult {
            correct,
            score_earned: earned,
            total_score: progress.total_score,
            completed_count: progress.completed_count,
            solution: challenge.solution,
            correct_cwe: challenge.cwe_id,
            correct_cwe_name,
        })
    })
    .await?;

    Ok(HttpResponse::Ok().json(result))
}

#[get("/leaderboard")]
pub async fn leaderboard(
    state: web::Data<AppState>,
    query: web::Query<LeaderboardQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE);

    let entries = with_db(&state, move |connection| Ok(quizdb::query_leaderboard(connection, limit)?)).await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[get("/cwes")]
pub async fn list_cwes(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let options = with_db(&state, |connection| Ok(quizdb::query_cwe_options(connection)?)).await?;
    Ok(HttpResponse::Ok().json(options))
}
