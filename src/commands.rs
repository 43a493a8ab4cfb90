use crate::error::BracketError;
use crate::progression::Advancement;
use crate::projection::BracketProjection;
use crate::session::{BracketSession, BracketSnapshot, ResultOutcome};
use crate::types::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Bracket {0} not found")]
    BracketNotFound(u64),

    #[error("{0}")]
    BadRequest(String),

    #[error("Bracket store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Bracket(#[from] BracketError),
}

impl CommandError {
    pub fn status(&self) -> StatusCode {
        match self {
            CommandError::BracketNotFound(_) => StatusCode::NOT_FOUND,
            CommandError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CommandError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CommandError::Bracket(err) => match err {
                BracketError::InvalidTeamCount { .. }
                | BracketError::UnsupportedBracketSize { .. }
                | BracketError::InvalidSeeding(_)
                | BracketError::DuplicateTeam(_) => StatusCode::BAD_REQUEST,
                BracketError::UnknownMatch(_) => StatusCode::NOT_FOUND,
                BracketError::InvalidResult { .. } => StatusCode::CONFLICT,
                BracketError::BrokenBracketLink { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBracketRequest {
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBracket {
    pub bracket_id: u64,
    pub info: BracketInfo,
    pub total_matches: usize,
    pub total_rounds: usize,
    pub bracket: Bracket,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResultRequest {
    pub winner_id: TeamId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancementQuery {
    pub winner: TeamId,
    pub loser: Option<TeamId>,
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Lock the store, find the bracket, then call `f` with it. Any failure is
/// logged with the bracket id before it is returned.
fn with_session<F, R>(store: &SharedBracketStore, bracket_id: u64, f: F) -> Result<R, CommandError>
where
    F: FnOnce(&mut BracketSession) -> Result<R, BracketError>,
{
    let mut guard = store
        .lock()
        .map_err(|e| CommandError::StoreUnavailable(e.to_string()))?;
    let session = guard
        .brackets
        .get_mut(&bracket_id)
        .ok_or(CommandError::BracketNotFound(bracket_id))?;
    f(session).map_err(|err| {
        log_bracket_error(bracket_id, &err);
        CommandError::from(err)
    })
}

fn log_bracket_error(bracket_id: u64, err: &BracketError) {
    if err.is_construction_defect() {
        error!(bracket_id, error = %err, "bracket graph defect");
    } else {
        warn!(bracket_id, error = %err, "bracket request rejected");
    }
}

// ── Commands ────────────────────────────────────────────────────────────

pub fn create_bracket(
    store: &SharedBracketStore,
    config: &AppConfig,
    request: CreateBracketRequest,
) -> Result<CreatedBracket, CommandError> {
    let team_count = request.teams.len();
    if team_count > config.max_teams {
        return Err(CommandError::BadRequest(format!(
            "{team_count} teams is more than the configured limit of {}",
            config.max_teams
        )));
    }
    let session = BracketSession::from_teams(&request.teams).map_err(|err| {
        if err.is_construction_defect() {
            error!(team_count, error = %err, "bracket construction failed");
        } else {
            warn!(team_count, error = %err, "bracket request rejected");
        }
        CommandError::from(err)
    })?;

    let bracket = session.bracket().clone();
    let mut guard = store
        .lock()
        .map_err(|e| CommandError::StoreUnavailable(e.to_string()))?;
    let bracket_id = guard.insert(session);
    info!(
        bracket_id,
        team_count,
        bracket_size = bracket.info.bracket_size,
        byes = bracket.info.bye_count,
        total_matches = bracket.total_matches,
        "bracket created"
    );
    Ok(CreatedBracket {
        bracket_id,
        info: bracket.info,
        total_matches: bracket.total_matches,
        total_rounds: bracket.total_rounds,
        bracket,
    })
}

pub fn bracket_snapshot(store: &SharedBracketStore, bracket_id: u64) -> Result<BracketSnapshot, CommandError> {
    with_session(store, bracket_id, |session| Ok(session.snapshot()))
}

pub fn bracket_projection(store: &SharedBracketStore, bracket_id: u64) -> Result<BracketProjection, CommandError> {
    with_session(store, bracket_id, |session| Ok(session.projection()))
}

pub fn match_advancement(
    store: &SharedBracketStore,
    bracket_id: u64,
    match_id: MatchId,
    query: AdvancementQuery,
) -> Result<Advancement, CommandError> {
    with_session(store, bracket_id, |session| {
        session
            .calculator()
            .advance(match_id, &query.winner, query.loser.as_ref())
    })
}

pub fn start_match(
    store: &SharedBracketStore,
    bracket_id: u64,
    match_id: MatchId,
) -> Result<BracketSnapshot, CommandError> {
    with_session(store, bracket_id, |session| {
        session.start_match(match_id, Utc::now())?;
        Ok(session.snapshot())
    })
}

pub fn record_result(
    store: &SharedBracketStore,
    bracket_id: u64,
    match_id: MatchId,
    request: RecordResultRequest,
) -> Result<ResultOutcome, CommandError> {
    with_session(store, bracket_id, |session| {
        session.record_result(match_id, &request.winner_id, Utc::now())
    })
}

pub fn reopen_match(
    store: &SharedBracketStore,
    bracket_id: u64,
    match_id: MatchId,
) -> Result<BracketSnapshot, CommandError> {
    with_session(store, bracket_id, |session| {
        session.reopen_match(match_id)?;
        Ok(session.snapshot())
    })
}

// ── HTTP handlers ───────────────────────────────────────────────────────

pub async fn create_bracket_handler(
    State(state): State<ServerState>,
    Json(request): Json<CreateBracketRequest>,
) -> Result<(StatusCode, Json<CreatedBracket>), CommandError> {
    let created = create_bracket(&state.store, &state.config, request)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn bracket_snapshot_handler(
    State(state): State<ServerState>,
    Path(bracket_id): Path<u64>,
) -> Result<Json<BracketSnapshot>, CommandError> {
    bracket_snapshot(&state.store, bracket_id).map(Json)
}

pub async fn bracket_projection_handler(
    State(state): State<ServerState>,
    Path(bracket_id): Path<u64>,
) -> Result<Json<BracketProjection>, CommandError> {
    bracket_projection(&state.store, bracket_id).map(Json)
}

pub async fn match_advancement_handler(
    State(state): State<ServerState>,
    Path((bracket_id, match_id)): Path<(u64, MatchId)>,
    Query(query): Query<AdvancementQuery>,
) -> Result<Json<Advancement>, CommandError> {
    match_advancement(&state.store, bracket_id, match_id, query).map(Json)
}

pub async fn start_match_handler(
    State(state): State<ServerState>,
    Path((bracket_id, match_id)): Path<(u64, MatchId)>,
) -> Result<Json<BracketSnapshot>, CommandError> {
    start_match(&state.store, bracket_id, match_id).map(Json)
}

pub async fn record_result_handler(
    State(state): State<ServerState>,
    Path((bracket_id, match_id)): Path<(u64, MatchId)>,
    Json(request): Json<RecordResultRequest>,
) -> Result<Json<ResultOutcome>, CommandError> {
    record_result(&state.store, bracket_id, match_id, request).map(Json)
}

pub async fn reopen_match_handler(
    State(state): State<ServerState>,
    Path((bracket_id, match_id)): Path<(u64, MatchId)>,
) -> Result<Json<BracketSnapshot>, CommandError> {
    reopen_match(&state.store, bracket_id, match_id).map(Json)
}
