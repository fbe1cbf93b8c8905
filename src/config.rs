//! Loading service settings from an optional TOML file plus environment overrides.
//!
//! File (path in STAGE_CONFIG_PATH), all keys optional:
//!   port = 3000
//!   bank_url = "./static/question_bank.json"
//!   question_time = 45
//!   tick_millis = 1000
//!   static_dir = "./static"
//! Environment variables PORT, BANK_URL, QUESTION_TIME, TICK_MILLIS and
//! STATIC_DIR override the file.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, error, warn};

use crate::session::{DEFAULT_QUESTION_TIME, MIN_QUESTION_TIME};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
  pub port: u16,
  /// Manifest URL or filesystem path.
  pub bank_url: String,
  pub question_time: u32,
  pub tick_millis: u64,
  pub static_dir: String,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 3000,
      bank_url: "./static/question_bank.json".into(),
      question_time: DEFAULT_QUESTION_TIME,
      tick_millis: 1000,
      static_dir: "./static".into(),
    }
  }
}

impl Settings {
  pub fn tick_period(&self) -> Duration {
    Duration::from_millis(self.tick_millis)
  }

  /// Keep values inside the ranges the session accepts.
  fn sanitized(mut self) -> Self {
    self.question_time = self.question_time.max(MIN_QUESTION_TIME);
    self.tick_millis = self.tick_millis.max(1);
    self
  }
}

/// File settings (if STAGE_CONFIG_PATH is set and readable) overridden by env.
pub fn load_settings() -> Settings {
  let base = load_settings_file().unwrap_or_default();
  apply_env(base, |key| std::env::var(key).ok()).sanitized()
}

fn load_settings_file() -> Option<Settings> {
  let path = std::env::var("STAGE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<Settings>(&s) {
      Ok(cfg) => {
        info!(target: "faceoff_stage", %path, "Loaded settings (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "faceoff_stage", %path, error = %e, "Failed to parse TOML settings");
        None
      }
    },
    Err(e) => {
      error!(target: "faceoff_stage", %path, error = %e, "Failed to read TOML settings file");
      None
    }
  }
}

fn apply_env(mut settings: Settings, var: impl Fn(&str) -> Option<String>) -> Settings {
  fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
      Ok(v) => Some(v),
      Err(_) => {
        warn!(target: "faceoff_stage", %key, value = %raw, "Ignoring unparsable env override");
        None
      }
    }
  }

  if let Some(port) = parsed("PORT", var("PORT")) {
    settings.port = port;
  }
  if let Some(url) = var("BANK_URL") {
    settings.bank_url = url;
  }
  if let Some(t) = parsed("QUESTION_TIME", var("QUESTION_TIME")) {
    settings.question_time = t;
  }
  if let Some(ms) = parsed("TICK_MILLIS", var("TICK_MILLIS")) {
    settings.tick_millis = ms;
  }
  if let Some(dir) = var("STATIC_DIR") {
    settings.static_dir = dir;
  }
  settings
}
