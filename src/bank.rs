//! Question bank loading: manifest + referenced set files into a validated [`Bank`].
//!
//! Schema of the manifest:
//!   { "sets": [ "set1.json", "set2.json" ] }
//! Each referenced file:
//!   { "name": "Set Name", "problems": [ { "q": "...", "answer": "...", "image": "file.png" } ] }
//!
//! Loading is all-or-nothing. Set files are fetched concurrently and the first
//! failure aborts the whole load; a partial bank is never returned.

use futures::future::try_join_all;
use reqwest::header::CACHE_CONTROL;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Bank, Problem, ProblemSet};
use crate::util::trunc_for_log;

const UNTITLED_SET: &str = "Untitled Set";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadErrorKind {
  Manifest,
  SetFile,
}

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("could not load manifest {url}: {reason}")]
  Manifest { url: String, reason: String },
  #[error("could not load set file {which}: {reason}")]
  SetFile { which: String, reason: String },
}

impl LoadError {
  pub fn kind(&self) -> LoadErrorKind {
    match self {
      LoadError::Manifest { .. } => LoadErrorKind::Manifest,
      LoadError::SetFile { .. } => LoadErrorKind::SetFile,
    }
  }
}

#[derive(Clone)]
pub struct BankLoader {
  client: reqwest::Client,
}

impl BankLoader {
  pub fn new() -> Self {
    // No request timeout: a slow host keeps the bank loading until it answers.
    let client = reqwest::Client::builder()
      .user_agent("faceoff-stage/0.1")
      .build()
      .unwrap_or_else(|e| {
        warn!(target: "bank", error = %e, "HTTP client builder failed; using defaults");
        reqwest::Client::new()
      });
    Self { client }
  }

  /// Fetch the manifest, then every set it lists, and normalize them.
  #[instrument(level = "info", skip(self), fields(url = %manifest_url))]
  pub async fn load(&self, manifest_url: &Url) -> Result<Bank, LoadError> {
    let manifest = self.fetch_json(manifest_url).await.map_err(|reason| LoadError::Manifest {
      url: manifest_url.to_string(),
      reason,
    })?;

    let files: Vec<String> = match manifest.get("sets").and_then(Value::as_array) {
      Some(entries) => entries
        .iter()
        .filter_map(|e| match e.as_str() {
          Some(s) => Some(s.to_string()),
          None => {
            warn!(target: "bank", entry = %e, "Skipping non-string manifest entry");
            None
          }
        })
        .collect(),
      None => {
        warn!(target: "bank", "Manifest has no `sets` array; bank will be empty");
        Vec::new()
      }
    };

    let sets = try_join_all(files.iter().map(|file| self.load_set(manifest_url, file))).await?;

    let problems: usize = sets.iter().map(|s| s.problems.len()).sum();
    info!(target: "bank", sets = sets.len(), problems, "Question bank loaded");
    Ok(Bank { sets, source: Some(manifest_url.clone()) })
  }

  #[instrument(level = "debug", skip(self, manifest_url))]
  async fn load_set(&self, manifest_url: &Url, file: &str) -> Result<ProblemSet, LoadError> {
    let fail = |reason: String| LoadError::SetFile { which: file.to_string(), reason };
    let url = manifest_url.join(file).map_err(|e| fail(e.to_string()))?;
    let raw = self.fetch_json(&url).await.map_err(fail)?;
    let set = normalize_set(&raw);
    debug!(target: "bank", %file, name = %set.name, kept = set.problems.len(), "Set file parsed");
    Ok(set)
  }

  async fn fetch_json(&self, url: &Url) -> Result<Value, String> {
    let bytes = match url.scheme() {
      "file" => {
        let path = url
          .to_file_path()
          .map_err(|_| format!("not a local path: {url}"))?;
        tokio::fs::read(&path).await.map_err(|e| e.to_string())?
      }
      "http" | "https" => {
        let res = self
          .client
          .get(url.clone())
          .header(CACHE_CONTROL, "no-cache")
          .send()
          .await
          .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
          return Err(format!("HTTP {}", res.status()));
        }
        res.bytes().await.map_err(|e| e.to_string())?.to_vec()
      }
      other => return Err(format!("unsupported scheme `{other}`")),
    };
    serde_json::from_slice(&bytes).map_err(|e| {
      let body = String::from_utf8_lossy(&bytes);
      debug!(target: "bank", %url, body = %trunc_for_log(&body, 200), "Unparsable JSON");
      e.to_string()
    })
  }
}

impl Default for BankLoader {
  fn default() -> Self { Self::new() }
}

/// Normalize one set file. Problems with a blank question or an empty answer are dropped
/// and the survivors are numbered 1.. in file order.
pub fn normalize_set(raw: &Value) -> ProblemSet {
  let name = raw
    .get("name")
    .and_then(truthy_text)
    .unwrap_or_else(|| UNTITLED_SET.to_string());

  let problems = raw
    .get("problems")
    .and_then(Value::as_array)
    .map(|items| items.iter().filter_map(normalize_problem).collect::<Vec<_>>())
    .unwrap_or_default()
    .into_iter()
    .zip(1u32..)
    .map(|((question, answer, image), id)| Problem { id, question, answer, image })
    .collect();

  ProblemSet { name, problems }
}

fn normalize_problem(raw: &Value) -> Option<(String, String, String)> {
  let question = first_present(raw, &["q", "question"])
    .and_then(scalar_text)
    .unwrap_or_default()
    .trim()
    .to_string();
  let answer = first_present(raw, &["answer", "ans"]).and_then(scalar_text)?;
  if question.is_empty() || answer.is_empty() {
    return None;
  }
  let image = first_present(raw, &["image", "img"])
    .and_then(scalar_text)
    .unwrap_or_default()
    .trim()
    .to_string();
  Some((question, answer, image))
}

/// First key whose value is present and not null.
fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  keys.iter().filter_map(|k| raw.get(*k)).find(|v| !v.is_null())
}

fn scalar_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.clone()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(number_text(n)),
    _ => None,
  }
}

fn number_text(n: &serde_json::Number) -> String {
  if n.is_f64() {
    n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string())
  } else {
    n.to_string()
  }
}

/// Text of a value that counts as "set": non-empty strings, non-zero numbers, `true`.
fn truthy_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) if n.as_f64().map_or(true, |f| f != 0.0) => Some(number_text(n)),
    Value::Bool(true) => Some("true".into()),
    _ => None,
  }
}
