//! Host-managed roster of players and scores. Independent of the quiz lifecycle.

use tracing::debug;
use uuid::Uuid;

use crate::domain::Player;

/// Players kept in insertion order; display order is computed on demand.
#[derive(Clone, Debug, Default)]
pub struct Leaderboard {
  players: Vec<Player>,
}

impl Leaderboard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a player with score 0. Blank names are ignored.
  pub fn add(&mut self, name: &str) -> Option<Uuid> {
    let name = name.trim();
    if name.is_empty() {
      debug!(target: "stage", "Ignoring add_player with blank name");
      return None;
    }
    let id = Uuid::new_v4();
    self.players.push(Player { id, name: name.to_string(), score: 0 });
    Some(id)
  }

  pub fn bump(&mut self, id: Uuid, delta: i64) {
    if let Some(p) = self.get_mut(id) {
      p.score = p.score.saturating_add(delta);
    }
  }

  /// Replace the display name verbatim.
  pub fn rename(&mut self, id: Uuid, name: &str) {
    if let Some(p) = self.get_mut(id) {
      p.name = name.to_string();
    }
  }

  pub fn remove(&mut self, id: Uuid) {
    self.players.retain(|p| p.id != id);
  }

  pub fn get(&self, id: Uuid) -> Option<&Player> {
    self.players.iter().find(|p| p.id == id)
  }

  pub fn len(&self) -> usize {
    self.players.len()
  }

  /// Score descending; equal scores keep creation order (`sort_by` is stable).
  pub fn display_order(&self) -> Vec<Player> {
    let mut out = self.players.clone();
    out.sort_by(|a, b| b.score.cmp(&a.score));
    out
  }

  fn get_mut(&mut self, id: Uuid) -> Option<&mut Player> {
    self.players.iter_mut().find(|p| p.id == id)
  }
}
