//! Cancellable countdown.
//!
//! The timer does not own a clock. It tracks the remaining time and whether one
//! decrement is pending, identified by an epoch token. Whoever drives it (the
//! stage actor) sleeps once per token and calls [`Timer::fire`] with it; any
//! cancel or re-arm bumps the epoch, so a stale wake-up is simply ignored.
//! There is therefore never more than one live decrement.

use crate::domain::Cue;

/// Remaining values at or below this emit a `tick` cue.
const TICK_CUE_FROM: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timer {
  time_left: u32,
  epoch: u64,
  armed: bool,
}

impl Timer {
  pub fn new(seconds: u32) -> Self {
    Self { time_left: seconds, epoch: 0, armed: false }
  }

  pub fn time_left(&self) -> u32 {
    self.time_left
  }

  /// Token of the single pending decrement, if one is scheduled.
  pub fn pending(&self) -> Option<u64> {
    self.armed.then_some(self.epoch)
  }

  /// Set the remaining time and schedule exactly one decrement.
  pub fn arm(&mut self, seconds: u32) {
    self.time_left = seconds;
    self.rearm(true);
  }

  /// Put the remaining time back to `seconds` without touching scheduling.
  pub fn reset(&mut self, seconds: u32) {
    self.time_left = seconds;
  }

  /// Cancel whatever is pending and, if still eligible, schedule one new decrement.
  pub fn rearm(&mut self, eligible: bool) {
    self.epoch = self.epoch.wrapping_add(1);
    self.armed = eligible && self.time_left > 0;
  }

  pub fn cancel(&mut self) {
    self.rearm(false);
  }

  /// Deliver a scheduled wake-up. Ignored unless `token` is the live one.
  pub fn fire(&mut self, token: u64, eligible: bool) -> Option<Cue> {
    if self.pending() != Some(token) {
      return None;
    }
    self.tick(eligible)
  }

  /// One countdown step. Consumes the pending decrement and re-arms while time remains.
  pub fn tick(&mut self, eligible: bool) -> Option<Cue> {
    self.epoch = self.epoch.wrapping_add(1);
    self.armed = false;
    if !eligible || self.time_left == 0 {
      return None;
    }
    self.time_left -= 1;
    if self.time_left == 0 {
      return Some(Cue::End);
    }
    self.armed = true;
    (self.time_left <= TICK_CUE_FROM).then_some(Cue::Tick)
  }
}
