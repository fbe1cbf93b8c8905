//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and presentation independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Cue, OrderKind, Player};
use crate::session::Intent;
use crate::stage::{StageCommand, StageSnapshot};

/// Intents the host can send (WS frame or `POST /api/v1/intent` body).
///
/// Numeric fields arrive as whatever the host's input box produced, so they
/// are kept as raw JSON and narrowed in `into_command`. Values that are not
/// whole numbers turn the intent into a no-op instead of a decode error.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostIntent {
    Ping,
    Start,
    Next,
    Goto {
        #[serde(default)]
        value: Value,
    },
    ToggleReveal,
    TogglePause,
    ResetTimer,
    Home,
    ChangeActiveSet {
        #[serde(default)]
        index: Value,
    },
    ChangeQuestionTime {
        #[serde(default)]
        seconds: Value,
    },
    ChangeRounds {
        #[serde(default)]
        rounds: Value,
    },
    Reorder {
        kind: OrderKind,
    },
    AddPlayer {
        name: String,
    },
    BumpPlayer {
        id: Uuid,
        delta: i64,
    },
    RenamePlayer {
        id: Uuid,
        name: String,
    },
    RemovePlayer {
        id: Uuid,
    },
    ReloadBank,
}

impl HostIntent {
    /// Map to a stage command. `Ping` and intents carrying a non-numeric
    /// value have no stage effect.
    pub fn into_command(self) -> Option<StageCommand> {
        let session = |i: Intent| Some(StageCommand::Session(i));
        match self {
            HostIntent::Ping => None,
            HostIntent::Start => session(Intent::Start),
            HostIntent::Next => session(Intent::Next),
            HostIntent::Goto { value: Value::String(raw) } => session(Intent::GotoRaw(raw)),
            HostIntent::Goto { value } => whole_number("goto", &value).and_then(|n| session(Intent::Goto(n))),
            HostIntent::ToggleReveal => session(Intent::ToggleReveal),
            HostIntent::TogglePause => session(Intent::TogglePause),
            HostIntent::ResetTimer => session(Intent::ResetTimer),
            HostIntent::Home => session(Intent::Home),
            HostIntent::ChangeActiveSet { index } => whole_number("change_active_set", &index)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| session(Intent::ChangeActiveSet(i))),
            HostIntent::ChangeQuestionTime { seconds } => {
                whole_number("change_question_time", &seconds).and_then(|t| session(Intent::ChangeQuestionTime(t)))
            }
            HostIntent::ChangeRounds { rounds } => {
                whole_number("change_rounds", &rounds).and_then(|r| session(Intent::ChangeRounds(r)))
            }
            HostIntent::Reorder { kind } => session(Intent::Reorder(kind)),
            HostIntent::AddPlayer { name } => Some(StageCommand::AddPlayer(name)),
            HostIntent::BumpPlayer { id, delta } => Some(StageCommand::BumpPlayer { id, delta }),
            HostIntent::RenamePlayer { id, name } => Some(StageCommand::RenamePlayer { id, name }),
            HostIntent::RemovePlayer { id } => Some(StageCommand::RemovePlayer(id)),
            HostIntent::ReloadBank => Some(StageCommand::ReloadBank),
        }
    }
}

/// Integer carried by a host field: a JSON integer, an integral float or a
/// numeric string. Anything else is logged and ignored.
fn whole_number(intent: &str, value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if n.is_none() {
        debug!(target: "faceoff_stage", intent, %value, "Ignoring intent with non-numeric value");
    }
    n
}

/// Messages the server pushes over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Snapshot {
        state: Box<StageSnapshot>,
    },
    Cue {
        cue: Cue,
    },
    Error {
        message: String,
    },
}

//
// HTTP response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct LeaderboardOut {
    pub players: Vec<Player>,
}
