//! Small utility helpers used across modules.

use reqwest::Url;

/// Turn a configured location into a URL.
/// Accepts absolute URLs (`http(s)://`, `file://`) or a filesystem path,
/// which is resolved against the current working directory.
pub fn resolve_location(location: &str) -> Result<Url, String> {
  if let Ok(url) = Url::parse(location) {
    // A bare Windows drive letter parses as a one-letter scheme; treat it as a path.
    if url.scheme().len() > 1 {
      return Ok(url);
    }
  }
  let path = std::path::Path::new(location);
  let absolute = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir().map_err(|e| e.to_string())?.join(path)
  };
  Url::from_file_path(&absolute).map_err(|_| format!("cannot express {} as a URL", absolute.display()))
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
