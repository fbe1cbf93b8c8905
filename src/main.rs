//! Face-Off Stage · hosted trivia backend
//!
//! - Axum HTTP + WebSocket API for the host's presentation layer
//! - Question bank loaded from a manifest of problem-set JSON files
//! - Single-writer stage actor: session state machine, countdown, leaderboard
//! - Static front-end fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   BANK_URL           : manifest URL or path (default ./static/question_bank.json)
//!   QUESTION_TIME      : initial seconds per question (default 45, min 5)
//!   TICK_MILLIS        : countdown unit in ms (default 1000)
//!   STATIC_DIR         : presentation files (default ./static)
//!   STAGE_CONFIG_PATH  : optional TOML with the same keys (env wins)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod order;
mod timer;
mod leaderboard;
mod bank;
mod session;
mod stage;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = config::load_settings();

  // Start the stage actor; the first bank load runs in the background.
  let state = Arc::new(AppState::new(&settings));

  let app = build_router(state.clone(), &settings.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "faceoff_stage", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "faceoff_stage", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "faceoff_stage", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}
