//! HTTP endpoint handlers. These are thin wrappers that forward to the stage.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::{info, instrument, warn};

use crate::protocol::*;
use crate::stage::{StageCommand, StageSnapshot};
use crate::state::AppState;

fn snapshot_or_unavailable(snapshot: Option<StageSnapshot>) -> Response {
  match snapshot {
    Some(s) => Json(s).into_response(),
    None => {
      warn!(target: "faceoff_stage", "Stage is not running");
      StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.stage.snapshot())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_leaderboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(LeaderboardOut { players: state.stage.snapshot().players })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_intent(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HostIntent>,
) -> Response {
  match body.into_command() {
    Some(cmd) => snapshot_or_unavailable(state.stage.request(cmd).await),
    None => Json(state.stage.snapshot()).into_response(),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_reload(State(state): State<Arc<AppState>>) -> Response {
  info!(target: "bank", "HTTP bank reload requested");
  snapshot_or_unavailable(state.stage.request(StageCommand::ReloadBank).await)
}
