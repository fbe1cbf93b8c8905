//! Session state machine: active set, play order, position, pause/reveal flags
//! and the countdown that goes with them.
//!
//! Every host intent is one named transition. Transitions that touch the phase,
//! the pause flag, the question time or the remaining time finish by cancelling
//! the pending countdown step and re-arming it if the timer should be running.
//! Out-of-range input is ignored without surfacing an error.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::{Bank, Cue, OrderKind, Phase, Problem, ProblemSet};
use crate::order;
use crate::timer::Timer;

pub const MIN_QUESTION_TIME: u32 = 5;
pub const DEFAULT_QUESTION_TIME: u32 = 45;

/// Read-only projection of the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionState {
  pub active_set_index: usize,
  pub order: Vec<usize>,
  pub current_index: usize,
  pub total_rounds: usize,
  pub question_time_seconds: u32,
  pub phase: Phase,
  pub paused: bool,
  pub revealed: bool,
  pub time_left: u32,
}

/// Session-level host intents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
  Start,
  Next,
  /// 1-based question number.
  Goto(i64),
  /// Raw text typed by the host; parsed before use.
  GotoRaw(String),
  ToggleReveal,
  TogglePause,
  ResetTimer,
  Home,
  ChangeActiveSet(usize),
  ChangeQuestionTime(i64),
  ChangeRounds(i64),
  Reorder(OrderKind),
}

#[derive(Debug)]
pub struct SessionController {
  bank: Arc<Bank>,
  active_set_index: usize,
  order: Vec<usize>,
  current_index: usize,
  total_rounds: usize,
  question_time: u32,
  phase: Phase,
  paused: bool,
  revealed: bool,
  timer: Timer,
}

impl SessionController {
  pub fn new(question_time: u32) -> Self {
    let question_time = question_time.max(MIN_QUESTION_TIME);
    Self {
      bank: Arc::new(Bank::empty()),
      active_set_index: 0,
      order: Vec::new(),
      current_index: 0,
      total_rounds: 1,
      question_time,
      phase: Phase::Idle,
      paused: false,
      revealed: false,
      timer: Timer::new(question_time),
    }
  }

  pub fn state(&self) -> SessionState {
    SessionState {
      active_set_index: self.active_set_index,
      order: self.order.clone(),
      current_index: self.current_index,
      total_rounds: self.total_rounds,
      question_time_seconds: self.question_time,
      phase: self.phase,
      paused: self.paused,
      revealed: self.revealed,
      time_left: self.timer.time_left(),
    }
  }

  pub fn bank(&self) -> &Arc<Bank> {
    &self.bank
  }

  pub fn active_set(&self) -> Option<&ProblemSet> {
    self.bank.set(self.active_set_index)
  }

  /// Rounds actually playable: `min(totalRounds, order.len())`.
  pub fn effective_rounds(&self) -> usize {
    self.total_rounds.min(self.order.len())
  }

  /// Problem on display, only while a question is active.
  pub fn current_problem(&self) -> Option<&Problem> {
    if self.phase != Phase::Active {
      return None;
    }
    let slot = *self.order.get(self.current_index)?;
    self.active_set()?.problems.get(slot)
  }

  /// Token of the pending countdown step, if any.
  pub fn pending_tick(&self) -> Option<u64> {
    self.timer.pending()
  }

  /// Replace the bank wholesale and select its first set.
  pub fn install_bank(&mut self, bank: Bank) {
    self.bank = Arc::new(bank);
    self.select_set(0);
  }

  pub fn apply(&mut self, intent: Intent) -> Option<Cue> {
    match intent {
      Intent::Start => self.start(),
      Intent::Next => self.next(),
      Intent::Goto(n) => self.goto(n),
      Intent::GotoRaw(raw) => self.goto_raw(&raw),
      Intent::ToggleReveal => {
        self.toggle_reveal();
        None
      }
      Intent::TogglePause => {
        self.toggle_pause();
        None
      }
      Intent::ResetTimer => {
        self.reset_timer();
        None
      }
      Intent::Home => {
        self.home();
        None
      }
      Intent::ChangeActiveSet(i) => {
        self.change_active_set(i);
        None
      }
      Intent::ChangeQuestionTime(t) => {
        self.change_question_time(t);
        None
      }
      Intent::ChangeRounds(r) => {
        self.change_rounds(r);
        None
      }
      Intent::Reorder(kind) => {
        self.reorder(kind);
        None
      }
    }
  }

  pub fn start(&mut self) -> Option<Cue> {
    if self.active_set().map_or(true, |s| s.problems.is_empty()) || self.order.is_empty() {
      debug!(target: "stage", "Ignoring start: active set is empty");
      return None;
    }
    self.show(0);
    Some(Cue::Start)
  }

  pub fn next(&mut self) -> Option<Cue> {
    if self.current_index + 1 >= self.effective_rounds() {
      debug!(target: "stage", index = self.current_index, "Last round reached; session ends");
      self.phase = Phase::Idle;
      self.revealed = false;
      self.paused = false;
      self.timer.cancel();
      return None;
    }
    self.current_index += 1;
    self.revealed = false;
    self.paused = false;
    self.timer.reset(self.question_time);
    self.rearm();
    Some(Cue::Start)
  }

  pub fn goto(&mut self, n: i64) -> Option<Cue> {
    let rounds = self.effective_rounds() as i64;
    if n < 1 || n > rounds {
      debug!(target: "stage", n, rounds, "Ignoring goto out of range");
      return None;
    }
    self.show((n - 1) as usize);
    Some(Cue::Start)
  }

  pub fn goto_raw(&mut self, raw: &str) -> Option<Cue> {
    match raw.trim().parse::<i64>() {
      Ok(n) => self.goto(n),
      Err(_) => {
        debug!(target: "stage", %raw, "Ignoring non-numeric goto");
        None
      }
    }
  }

  /// Flip answer visibility. Not observable while idle, so ignored there.
  pub fn toggle_reveal(&mut self) {
    if self.phase == Phase::Active {
      self.revealed = !self.revealed;
    }
  }

  pub fn toggle_pause(&mut self) {
    self.paused = !self.paused;
    self.rearm();
  }

  pub fn reset_timer(&mut self) {
    self.timer.reset(self.question_time);
    self.rearm();
  }

  pub fn home(&mut self) {
    self.phase = Phase::Idle;
    self.revealed = false;
    self.paused = false;
    self.rearm();
  }

  pub fn change_active_set(&mut self, index: usize) {
    if index >= self.bank.sets.len() {
      debug!(target: "stage", index, sets = self.bank.sets.len(), "Ignoring unknown set index");
      return;
    }
    self.select_set(index);
  }

  pub fn change_question_time(&mut self, seconds: i64) {
    let seconds = seconds.clamp(MIN_QUESTION_TIME as i64, u32::MAX as i64) as u32;
    self.question_time = seconds;
    self.timer.reset(seconds);
    self.rearm();
  }

  pub fn change_rounds(&mut self, rounds: i64) {
    self.total_rounds = rounds.max(1).try_into().unwrap_or(usize::MAX);
  }

  /// Rebuild the play order. Refused while a question is on display, since it
  /// would swap the problem under the current position.
  pub fn reorder(&mut self, kind: OrderKind) {
    if self.phase == Phase::Active {
      debug!(target: "stage", ?kind, "Ignoring reorder while a question is active");
      return;
    }
    let n = self.set_len();
    self.order = match kind {
      OrderKind::Shuffle => order::shuffle(n),
      OrderKind::InOrder => order::identity(n),
    };
  }

  /// Deliver a countdown wake-up. Stale tokens are ignored.
  pub fn tick(&mut self, token: u64) -> Option<Cue> {
    let eligible = self.timer_eligible();
    self.timer.fire(token, eligible)
  }

  fn select_set(&mut self, index: usize) {
    self.active_set_index = index;
    let n = self.set_len();
    self.total_rounds = n.max(1);
    self.order = order::shuffle(n);
    self.current_index = 0;
    self.phase = Phase::Idle;
    self.revealed = false;
    self.paused = false;
    self.timer.reset(self.question_time);
    self.rearm();
  }

  fn show(&mut self, index: usize) {
    self.current_index = index;
    self.phase = Phase::Active;
    self.revealed = false;
    self.paused = false;
    self.timer.arm(self.question_time);
  }

  fn set_len(&self) -> usize {
    self.active_set().map_or(0, |s| s.problems.len())
  }

  fn timer_eligible(&self) -> bool {
    self.phase == Phase::Active && !self.paused
  }

  fn rearm(&mut self) {
    let eligible = self.timer_eligible();
    self.timer.rearm(eligible);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn set(name: &str, n: u32) -> ProblemSet {
    ProblemSet {
      name: name.into(),
      problems: (1..=n)
        .map(|id| Problem { id, question: format!("Q{id}"), answer: format!("A{id}"), image: String::new() })
        .collect(),
    }
  }

  fn controller_with(sizes: &[u32]) -> SessionController {
    let mut c = SessionController::new(DEFAULT_QUESTION_TIME);
    let sets = sizes.iter().enumerate().map(|(i, n)| set(&format!("S{i}"), *n)).collect();
    c.install_bank(Bank { sets, source: None });
    c
  }

  fn run_ticks(c: &mut SessionController, count: usize) -> Vec<Cue> {
    let mut cues = Vec::new();
    for _ in 0..count {
      if let Some(token) = c.pending_tick() {
        cues.extend(c.tick(token));
      }
    }
    cues
  }

  #[test]
  fn install_selects_first_set_with_full_pass() {
    let c = controller_with(&[4, 2]);
    let s = c.state();
    assert_eq!(s.active_set_index, 0);
    assert_eq!(s.total_rounds, 4);
    assert_eq!(s.order.len(), 4);
    assert_eq!(s.phase, Phase::Idle);
    assert_eq!(s.time_left, DEFAULT_QUESTION_TIME);
    assert_eq!(c.pending_tick(), None);
  }

  #[test]
  fn start_shows_first_question() {
    let mut c = controller_with(&[3]);
    assert_eq!(c.start(), Some(Cue::Start));
    let s = c.state();
    assert_eq!(s.phase, Phase::Active);
    assert_eq!(s.current_index, 0);
    assert_eq!(s.time_left, s.question_time_seconds);
    assert!(c.pending_tick().is_some());
    assert!(c.current_problem().is_some());
  }

  #[test]
  fn start_on_empty_bank_is_ignored() {
    let mut c = SessionController::new(DEFAULT_QUESTION_TIME);
    assert_eq!(c.start(), None);
    assert_eq!(c.state().phase, Phase::Idle);

    let mut c = controller_with(&[0]);
    assert_eq!(c.state().total_rounds, 1);
    assert_eq!(c.start(), None);
  }

  #[test]
  fn next_walks_rounds_then_ends() {
    let mut c = controller_with(&[5]);
    c.change_rounds(3);
    c.start();
    for _ in 0..2 {
      assert_eq!(c.next(), Some(Cue::Start));
      assert_eq!(c.state().phase, Phase::Active);
    }
    assert_eq!(c.state().current_index, 2);
    assert_eq!(c.next(), None);
    let s = c.state();
    assert_eq!(s.phase, Phase::Idle);
    assert_eq!(s.current_index, 2);
    assert!(!s.paused && !s.revealed);
    assert_eq!(c.pending_tick(), None);
  }

  #[test]
  fn rounds_are_capped_by_set_size() {
    let mut c = controller_with(&[2]);
    c.change_rounds(10);
    assert_eq!(c.effective_rounds(), 2);
    c.start();
    c.next();
    assert_eq!(c.next(), None);
    assert_eq!(c.state().phase, Phase::Idle);
  }

  #[test]
  fn next_clears_flags_and_resets_time() {
    let mut c = controller_with(&[3]);
    c.start();
    run_ticks(&mut c, 4);
    c.toggle_reveal();
    c.toggle_pause();
    c.next();
    let s = c.state();
    assert!(!s.revealed && !s.paused);
    assert_eq!(s.time_left, DEFAULT_QUESTION_TIME);
    assert!(c.pending_tick().is_some());
  }

  #[test]
  fn goto_out_of_range_changes_nothing() {
    let mut c = controller_with(&[3]);
    c.start();
    c.next();
    run_ticks(&mut c, 2);
    let before = c.state();
    for n in [0, -1, 4, 100] {
      assert_eq!(c.goto(n), None);
      assert_eq!(c.state(), before);
    }
    assert_eq!(c.goto_raw("two"), None);
    assert_eq!(c.goto_raw(""), None);
    assert_eq!(c.state(), before);
  }

  #[test]
  fn goto_activates_from_idle() {
    let mut c = controller_with(&[4]);
    assert_eq!(c.goto_raw(" 3 "), Some(Cue::Start));
    let s = c.state();
    assert_eq!(s.phase, Phase::Active);
    assert_eq!(s.current_index, 2);
    assert_eq!(s.time_left, DEFAULT_QUESTION_TIME);
  }

  #[test]
  fn countdown_reaches_zero_and_stays() {
    let mut c = controller_with(&[1]);
    c.start();
    let cues = run_ticks(&mut c, 45);
    assert_eq!(c.state().time_left, 0);
    assert_eq!(cues.last(), Some(&Cue::End));
    assert_eq!(c.pending_tick(), None);
    run_ticks(&mut c, 10);
    assert_eq!(c.state().time_left, 0);
  }

  #[test]
  fn pause_freezes_and_resume_continues() {
    let mut c = controller_with(&[1]);
    c.start();
    run_ticks(&mut c, 10);
    let stale = c.pending_tick().unwrap();
    c.toggle_pause();
    assert_eq!(c.pending_tick(), None);
    assert_eq!(c.tick(stale), None);
    run_ticks(&mut c, 5);
    assert_eq!(c.state().time_left, 35);

    c.toggle_pause();
    run_ticks(&mut c, 3);
    assert_eq!(c.state().time_left, 32);
  }

  #[test]
  fn reset_timer_restarts_a_finished_countdown() {
    let mut c = controller_with(&[1]);
    c.change_question_time(6);
    c.start();
    run_ticks(&mut c, 6);
    assert_eq!(c.pending_tick(), None);
    c.reset_timer();
    assert_eq!(c.state().time_left, 6);
    assert!(c.pending_tick().is_some());
  }

  #[test]
  fn question_time_is_clamped_and_applied_immediately() {
    let mut c = controller_with(&[2]);
    c.change_question_time(2);
    assert_eq!(c.state().question_time_seconds, MIN_QUESTION_TIME);
    assert_eq!(c.state().time_left, MIN_QUESTION_TIME);

    c.start();
    run_ticks(&mut c, 2);
    let before = c.pending_tick();
    c.change_question_time(30);
    assert_eq!(c.state().time_left, 30);
    assert_ne!(c.pending_tick(), before);
    assert!(c.pending_tick().is_some());
  }

  #[test]
  fn rounds_are_clamped_to_one() {
    let mut c = controller_with(&[3]);
    c.change_rounds(0);
    assert_eq!(c.state().total_rounds, 1);
    c.change_rounds(-4);
    assert_eq!(c.state().total_rounds, 1);
  }

  #[test]
  fn reveal_toggles_only_while_active() {
    let mut c = controller_with(&[2]);
    c.toggle_reveal();
    assert!(!c.state().revealed);
    c.start();
    c.toggle_reveal();
    assert!(c.state().revealed);
    c.toggle_reveal();
    assert!(!c.state().revealed);
  }

  #[test]
  fn home_returns_to_idle_and_keeps_index() {
    let mut c = controller_with(&[3]);
    c.start();
    c.next();
    c.toggle_reveal();
    c.toggle_pause();
    c.home();
    let s = c.state();
    assert_eq!(s.phase, Phase::Idle);
    assert_eq!(s.current_index, 1);
    assert!(!s.revealed && !s.paused);
    assert_eq!(c.pending_tick(), None);
    assert_eq!(c.current_problem(), None);
  }

  #[test]
  fn next_while_idle_advances_without_a_countdown() {
    let mut c = controller_with(&[3]);
    c.start();
    run_ticks(&mut c, 4);
    c.home();
    assert_eq!(c.state().time_left, DEFAULT_QUESTION_TIME - 4);

    assert_eq!(c.next(), Some(Cue::Start));
    let s = c.state();
    assert_eq!(s.current_index, 1);
    assert_eq!(s.phase, Phase::Idle);
    assert_eq!(s.time_left, DEFAULT_QUESTION_TIME);
    assert!(!s.revealed && !s.paused);
    assert_eq!(c.pending_tick(), None);
  }

  #[test]
  fn changing_set_resets_session() {
    let mut c = controller_with(&[3, 5]);
    c.start();
    c.next();
    run_ticks(&mut c, 3);
    c.toggle_reveal();
    c.toggle_pause();
    assert_eq!(c.state().time_left, DEFAULT_QUESTION_TIME - 3);
    assert!(c.state().revealed && c.state().paused);

    c.change_active_set(1);
    let s = c.state();
    assert_eq!(s.active_set_index, 1);
    assert_eq!(s.total_rounds, 5);
    assert_eq!(s.order.len(), 5);
    assert_eq!(s.current_index, 0);
    assert_eq!(s.phase, Phase::Idle);
    assert_eq!(s.time_left, DEFAULT_QUESTION_TIME);
    assert!(!s.revealed);
    assert!(!s.paused);
    assert_eq!(c.pending_tick(), None);

    c.change_active_set(9);
    assert_eq!(c.state().active_set_index, 1);
  }

  #[test]
  fn reorder_in_order_while_idle() {
    let mut c = controller_with(&[6]);
    c.reorder(OrderKind::InOrder);
    assert_eq!(c.state().order, vec![0, 1, 2, 3, 4, 5]);
    c.start();
    assert_eq!(c.current_problem().map(|p| p.id), Some(1));
    c.next();
    assert_eq!(c.current_problem().map(|p| p.id), Some(2));
  }

  #[test]
  fn reorder_is_refused_while_active() {
    let mut c = controller_with(&[6]);
    c.reorder(OrderKind::InOrder);
    c.start();
    c.reorder(OrderKind::Shuffle);
    assert_eq!(c.state().order, vec![0, 1, 2, 3, 4, 5]);
  }

  #[test]
  fn apply_dispatches_intents() {
    let mut c = controller_with(&[3]);
    assert_eq!(c.apply(Intent::Start), Some(Cue::Start));
    assert_eq!(c.apply(Intent::TogglePause), None);
    assert!(c.state().paused);
    assert_eq!(c.apply(Intent::Goto(2)), Some(Cue::Start));
    assert!(!c.state().paused);
    c.apply(Intent::Home);
    assert_eq!(c.state().phase, Phase::Idle);
  }
}
