//! The stage actor: sole owner of the session controller and the leaderboard.
//!
//! Host intents (HTTP and WebSocket), countdown wake-ups and bank-load
//! completions all arrive on one channel and are applied one at a time.
//! Readers see immutable snapshots through a `watch` channel; audio cues are
//! broadcast fire-and-forget.
//!
//! The countdown is driven by a single `sleep_until` keyed on the timer's
//! pending token. When the token changes (cancel/re-arm) the deadline is
//! replaced, so at most one wake-up is ever outstanding.

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bank::{BankLoader, LoadError};
use crate::domain::{Bank, Cue, Player};
use crate::leaderboard::Leaderboard;
use crate::session::{Intent, SessionController, SessionState};

const COMMAND_BUFFER: usize = 64;
const CUE_BUFFER: usize = 64;

/// Everything the stage accepts.
#[derive(Debug)]
pub enum StageCommand {
  Session(Intent),
  AddPlayer(String),
  BumpPlayer { id: Uuid, delta: i64 },
  RenamePlayer { id: Uuid, name: String },
  RemovePlayer(Uuid),
  ReloadBank,
  /// Completion of a load started by `ReloadBank` (or at startup).
  BankLoaded(Result<Bank, LoadError>),
}

#[derive(Debug)]
struct Envelope {
  cmd: StageCommand,
  reply: Option<oneshot::Sender<StageSnapshot>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BankStatus {
  Loading,
  Ready,
  Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SetSummary {
  pub name: String,
  pub problems: usize,
}

/// The problem on display. `answer` is only filled in once revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProblemView {
  pub id: u32,
  pub question: String,
  pub image_url: Option<String>,
  pub answer: Option<String>,
}

/// Read-only projection handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
  pub session: SessionState,
  pub effective_rounds: usize,
  /// Round number as shown to the audience.
  pub round_label: usize,
  pub current: Option<ProblemView>,
  pub active_set_name: Option<String>,
  pub sets: Vec<SetSummary>,
  pub players: Vec<Player>,
  pub bank_status: BankStatus,
}

#[derive(Clone, Debug)]
pub struct StageConfig {
  /// Manifest location; `None` means nothing is loaded until a bank is installed.
  pub bank_url: Option<Url>,
  pub question_time: u32,
  pub tick_period: Duration,
}

/// Cheap, cloneable handle to the running stage.
#[derive(Clone)]
pub struct StageHandle {
  tx: mpsc::Sender<Envelope>,
  snapshots: watch::Receiver<StageSnapshot>,
  cues: broadcast::Sender<Cue>,
}

impl StageHandle {
  /// Apply a command and wait for the resulting snapshot.
  /// Returns None if the stage has stopped.
  pub async fn request(&self, cmd: StageCommand) -> Option<StageSnapshot> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self.tx.send(Envelope { cmd, reply: Some(reply_tx) }).await.ok()?;
    reply_rx.await.ok()
  }

  /// Latest published snapshot.
  pub fn snapshot(&self) -> StageSnapshot {
    self.snapshots.borrow().clone()
  }

  pub fn subscribe_snapshots(&self) -> watch::Receiver<StageSnapshot> {
    self.snapshots.clone()
  }

  pub fn subscribe_cues(&self) -> broadcast::Receiver<Cue> {
    self.cues.subscribe()
  }
}

struct Stage {
  session: SessionController,
  leaderboard: Leaderboard,
  bank_status: BankStatus,
  loader: BankLoader,
  bank_url: Option<Url>,
  loading: bool,
  tick_period: Duration,
  inbox: mpsc::WeakSender<Envelope>,
  snapshot_tx: watch::Sender<StageSnapshot>,
  cue_tx: broadcast::Sender<Cue>,
}

/// Start the stage task. If a bank location is configured, loading begins immediately.
pub fn spawn(config: StageConfig) -> StageHandle {
  let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
  let (cue_tx, _) = broadcast::channel(CUE_BUFFER);

  let session = SessionController::new(config.question_time);
  let leaderboard = Leaderboard::new();
  let bank_status = match &config.bank_url {
    Some(_) => BankStatus::Loading,
    None => BankStatus::Ready,
  };
  let initial = build_snapshot(&session, &leaderboard, &bank_status);
  let (snapshot_tx, snapshot_rx) = watch::channel(initial);

  let stage = Stage {
    session,
    leaderboard,
    bank_status,
    loader: BankLoader::new(),
    bank_url: config.bank_url,
    loading: false,
    tick_period: config.tick_period,
    inbox: tx.downgrade(),
    snapshot_tx,
    cue_tx: cue_tx.clone(),
  };
  tokio::spawn(stage.run(rx));

  StageHandle { tx, snapshots: snapshot_rx, cues: cue_tx }
}

impl Stage {
  async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
    if self.bank_url.is_some() {
      self.begin_load();
      self.publish();
    }

    // (token, deadline) of the single outstanding countdown wake-up.
    let mut wake: Option<(u64, Instant)> = None;
    loop {
      wake = match (self.session.pending_tick(), wake) {
        (Some(token), Some((armed, at))) if armed == token => Some((armed, at)),
        (Some(token), _) => Some((token, Instant::now() + self.tick_period)),
        (None, _) => None,
      };
      let deadline = wake.map(|(_, at)| at).unwrap_or_else(Instant::now);

      tokio::select! {
        msg = rx.recv() => match msg {
          Some(env) => self.handle(env),
          None => break,
        },
        _ = sleep_until(deadline), if wake.is_some() => {
          if let Some((token, at)) = wake.take() {
            let cue = self.session.tick(token);
            self.emit(cue);
            // Keep cadence relative to the fired deadline.
            wake = self.session.pending_tick().map(|next| (next, at + self.tick_period));
            self.publish();
          }
        }
      }
    }
    info!(target: "stage", "Stage stopped: all handles dropped");
  }

  fn handle(&mut self, env: Envelope) {
    let Envelope { cmd, reply } = env;
    match cmd {
      StageCommand::Session(intent) => {
        debug!(target: "stage", ?intent, "Session intent");
        let cue = self.session.apply(intent);
        self.emit(cue);
      }
      StageCommand::AddPlayer(name) => {
        if let Some(id) = self.leaderboard.add(&name) {
          info!(target: "stage", %id, players = self.leaderboard.len(), "Player added");
        }
      }
      StageCommand::BumpPlayer { id, delta } => {
        self.leaderboard.bump(id, delta);
        if let Some(p) = self.leaderboard.get(id) {
          debug!(target: "stage", %id, delta, score = p.score, "Score adjusted");
        }
      }
      StageCommand::RenamePlayer { id, name } => self.leaderboard.rename(id, &name),
      StageCommand::RemovePlayer(id) => self.leaderboard.remove(id),
      StageCommand::ReloadBank => {
        if self.bank_url.is_none() {
          warn!(target: "bank", "Reload requested but no bank location is configured");
        } else if self.loading {
          debug!(target: "bank", "Reload requested while a load is in flight; ignoring");
        } else {
          self.begin_load();
        }
      }
      StageCommand::BankLoaded(result) => self.finish_load(result),
    }
    self.publish();
    if let Some(reply) = reply {
      let _ = reply.send(self.snapshot_tx.borrow().clone());
    }
  }

  #[instrument(level = "info", skip(self))]
  fn begin_load(&mut self) {
    let Some(url) = self.bank_url.clone() else { return };
    self.loading = true;
    self.bank_status = BankStatus::Loading;
    let loader = self.loader.clone();
    let inbox = self.inbox.clone();
    tokio::spawn(async move {
      let result = loader.load(&url).await;
      if let Some(tx) = inbox.upgrade() {
        let _ = tx.send(Envelope { cmd: StageCommand::BankLoaded(result), reply: None }).await;
      }
    });
  }

  fn finish_load(&mut self, result: Result<Bank, LoadError>) {
    self.loading = false;
    match result {
      Ok(bank) => {
        info!(target: "bank", sets = bank.sets.len(), "Bank installed");
        self.session.install_bank(bank);
        self.bank_status = BankStatus::Ready;
      }
      Err(e) => {
        error!(target: "bank", kind = ?e.kind(), error = %e, "Bank load failed; keeping previous bank");
        self.bank_status = BankStatus::Failed { message: e.to_string() };
      }
    }
  }

  fn emit(&self, cue: Option<Cue>) {
    if let Some(cue) = cue {
      debug!(target: "stage", ?cue, "Cue");
      // No listeners is fine: cues are fire-and-forget.
      let _ = self.cue_tx.send(cue);
    }
  }

  fn publish(&self) {
    let next = build_snapshot(&self.session, &self.leaderboard, &self.bank_status);
    self.snapshot_tx.send_if_modified(|cur| {
      if *cur == next {
        false
      } else {
        *cur = next;
        true
      }
    });
  }
}

fn build_snapshot(session: &SessionController, leaderboard: &Leaderboard, status: &BankStatus) -> StageSnapshot {
  let state = session.state();
  let bank = session.bank();
  let current = session.current_problem().map(|p| ProblemView {
    id: p.id,
    question: p.question.clone(),
    image_url: bank.image_url(p),
    answer: state.revealed.then(|| p.answer.clone()),
  });
  StageSnapshot {
    effective_rounds: session.effective_rounds(),
    round_label: (state.current_index + 1).min(state.total_rounds),
    current,
    active_set_name: session.active_set().map(|s| s.name.clone()),
    sets: bank
      .sets
      .iter()
      .map(|s| SetSummary { name: s.name.clone(), problems: s.problems.len() })
      .collect(),
    players: leaderboard.display_order(),
    bank_status: status.clone(),
    session: state,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Phase, Problem, ProblemSet};

  fn bank(n: u32) -> Bank {
    Bank {
      sets: vec![ProblemSet {
        name: "Trivia".into(),
        problems: (1..=n)
          .map(|id| Problem { id, question: format!("Q{id}"), answer: format!("A{id}"), image: String::new() })
          .collect(),
      }],
      source: None,
    }
  }

  fn stage(question_time: u32) -> StageHandle {
    spawn(StageConfig { bank_url: None, question_time, tick_period: Duration::from_secs(1) })
  }

  #[tokio::test(start_paused = true)]
  async fn malformed_host_values_leave_the_snapshot_unchanged() {
    use crate::protocol::HostIntent;

    let handle = stage(10);
    handle.request(StageCommand::BankLoaded(Ok(bank(4)))).await.unwrap();
    let before = handle.request(StageCommand::Session(Intent::Start)).await.unwrap();
    for json in [
      r#"{"type":"change_rounds","rounds":"abc"}"#,
      r#"{"type":"change_question_time","seconds":"soon"}"#,
      r#"{"type":"goto","value":2.5}"#,
      r#"{"type":"goto","value":null}"#,
      r#"{"type":"change_active_set","index":-1}"#,
    ] {
      let intent: HostIntent = serde_json::from_str(json).unwrap();
      let after = match intent.into_command() {
        Some(cmd) => handle.request(cmd).await.unwrap(),
        None => handle.snapshot(),
      };
      assert_eq!(after, before, "{json}");
    }
  }

  #[tokio::test(start_paused = true)]
  async fn countdown_runs_and_pauses() {
    let handle = stage(10);
    handle.request(StageCommand::BankLoaded(Ok(bank(3)))).await.unwrap();
    let snap = handle.request(StageCommand::Session(Intent::Start)).await.unwrap();
    assert_eq!(snap.session.phase, Phase::Active);
    assert_eq!(snap.session.time_left, 10);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(handle.snapshot().session.time_left, 7);

    handle.request(StageCommand::Session(Intent::TogglePause)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.snapshot().session.time_left, 7);

    handle.request(StageCommand::Session(Intent::TogglePause)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(handle.snapshot().session.time_left, 6);
  }

  #[tokio::test(start_paused = true)]
  async fn cues_follow_the_countdown() {
    let handle = stage(5);
    let mut cues = handle.subscribe_cues();
    handle.request(StageCommand::BankLoaded(Ok(bank(1)))).await.unwrap();
    handle.request(StageCommand::Session(Intent::Start)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(8)).await;

    let mut seen = Vec::new();
    while let Ok(cue) = cues.try_recv() {
      seen.push(cue);
    }
    assert_eq!(seen, vec![Cue::Start, Cue::Tick, Cue::Tick, Cue::Tick, Cue::Tick, Cue::End]);
    assert_eq!(handle.snapshot().session.time_left, 0);
  }

  #[tokio::test]
  async fn answer_is_hidden_until_revealed() {
    let handle = stage(30);
    handle.request(StageCommand::BankLoaded(Ok(bank(2)))).await.unwrap();
    let snap = handle.request(StageCommand::Session(Intent::Start)).await.unwrap();
    let current = snap.current.expect("question on display");
    assert_eq!(current.answer, None);
    assert_eq!(snap.round_label, 1);

    let snap = handle.request(StageCommand::Session(Intent::ToggleReveal)).await.unwrap();
    let current = snap.current.expect("question on display");
    assert_eq!(current.answer, Some(format!("A{}", current.id)));
  }

  #[tokio::test]
  async fn leaderboard_commands() {
    let handle = stage(30);
    let snap = handle.request(StageCommand::AddPlayer("Ada".into())).await.unwrap();
    let ada = snap.players[0].id;
    handle.request(StageCommand::AddPlayer("Grace".into())).await.unwrap();
    let snap = handle.request(StageCommand::BumpPlayer { id: ada, delta: -1 }).await.unwrap();
    let names: Vec<_> = snap.players.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Grace", "Ada"]);

    handle.request(StageCommand::RenamePlayer { id: ada, name: "Ada L.".into() }).await.unwrap();
    let snap = handle.request(StageCommand::RemovePlayer(ada)).await.unwrap();
    assert_eq!(snap.players.len(), 1);
    assert_eq!(snap.players[0].name, "Grace");
  }

  #[tokio::test]
  async fn failed_load_keeps_previous_bank() {
    let handle = stage(30);
    handle.request(StageCommand::BankLoaded(Ok(bank(4)))).await.unwrap();
    let err = LoadError::SetFile { which: "s2.json".into(), reason: "HTTP 404".into() };
    let snap = handle.request(StageCommand::BankLoaded(Err(err))).await.unwrap();
    assert_eq!(snap.sets.len(), 1);
    assert_eq!(snap.sets[0].problems, 4);
    match snap.bank_status {
      BankStatus::Failed { message } => assert!(message.contains("s2.json")),
      other => panic!("unexpected status: {other:?}"),
    }
  }
}
