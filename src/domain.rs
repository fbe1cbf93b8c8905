//! Domain models shared by the loader, the session and the leaderboard.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single question/answer unit as kept after loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
  /// 1-based position inside the kept sequence of its set.
  pub id: u32,
  pub question: String,
  pub answer: String,
  /// Relative path as written in the set file; empty when absent.
  #[serde(default)] pub image: String,
}

/// Named, ordered collection of problems (file order preserved).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSet {
  pub name: String,
  pub problems: Vec<Problem>,
}

/// Immutable result of one successful load. A reload replaces it wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bank {
  pub sets: Vec<ProblemSet>,
  /// Manifest location; image paths resolve against this, not the set file.
  pub source: Option<Url>,
}

impl Bank {
  pub fn empty() -> Self {
    Self { sets: Vec::new(), source: None }
  }

  pub fn set(&self, index: usize) -> Option<&ProblemSet> {
    self.sets.get(index)
  }

  /// Display URL for a problem's image, or None when it has none.
  pub fn image_url(&self, problem: &Problem) -> Option<String> {
    if problem.image.is_empty() {
      return None;
    }
    match &self.source {
      Some(base) => Some(
        base.join(&problem.image)
          .map(|u| u.to_string())
          .unwrap_or_else(|_| problem.image.clone()),
      ),
      None => Some(problem.image.clone()),
    }
  }
}

/// Coarse lifecycle of the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  /// Nothing timed on display (lobby or between sessions).
  Idle,
  /// A question is on display.
  Active,
}

/// Fire-and-forget notification for the audio layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
  Tick,
  Start,
  End,
}

/// How to rebuild the play order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
  Shuffle,
  InOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
  pub id: Uuid,
  pub name: String,
  pub score: i64,
}
