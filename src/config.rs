use crate::types::*;
use std::{env, fs, path::PathBuf};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  repo_root().join("config.json")
}

pub fn logs_dir(config: &AppConfig) -> PathBuf {
  resolve_repo_path(&config.logs_dir)
}

/// A set, non-blank environment variable.
pub fn env_default(key: &str) -> Option<String> {
  let value = env::var(key).ok()?;
  let value = value.trim();
  (!value.is_empty()).then(|| value.to_string())
}

pub fn apply_env_overrides(mut config: AppConfig) -> AppConfig {
  if let Some(value) = env_default("BRACKET_BIND_ADDR") {
    config.bind_addr = value;
  }
  if let Some(value) = env_default("BRACKET_LOGS_DIR") {
    config.logs_dir = value;
  }
  if let Some(value) = env_default("BRACKET_LOG_FILTER") {
    config.log_filter = value;
  }
  if let Some(value) = env_default("BRACKET_MAX_TEAMS") {
    match value.parse::<usize>() {
      Ok(max_teams) => config.max_teams = max_teams,
      Err(_) => tracing::warn!("BRACKET_MAX_TEAMS={value} is not a number, keeping {}", config.max_teams),
    }
  }
  config
}

pub fn parse_config(data: &str) -> Result<AppConfig, String> {
  serde_json::from_str::<AppConfig>(data).map_err(|e| format!("parse config: {e}"))
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  let path = config_path();
  let config = if path.is_file() {
    let data = fs::read_to_string(&path)
      .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    parse_config(&data).map_err(|e| format!("{e} ({})", path.display()))?
  } else {
    AppConfig::default()
  };
  Ok(apply_env_overrides(config))
}

/// Load `KEY=value` pairs from `.env` next to the manifest. Variables that
/// are already set win over the file.
pub fn load_env_file() {
  let Ok(contents) = fs::read_to_string(repo_root().join(".env")) else {
    return;
  };
  contents
    .lines()
    .filter_map(parse_env_line)
    .filter(|(key, _)| env::var_os(key).is_none())
    .for_each(|(key, value)| env::set_var(key, value));
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let line = line.trim();
  if line.starts_with('#') {
    return None;
  }
  let line = line.trim_start_matches("export ");
  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  Some((key.to_string(), unquote(value.trim()).to_string()))
}

/// Strip one layer of matching quotes; unquoted values lose a trailing comment.
fn unquote(value: &str) -> &str {
  for quote in ['"', '\''] {
    if let Some(inner) = value
      .strip_prefix(quote)
      .and_then(|rest| rest.strip_suffix(quote))
    {
      return inner;
    }
  }
  match value.split_once('#') {
    Some((before, _)) => before.trim_end(),
    None => value,
  }
}

pub fn config_warnings(config: &AppConfig) -> Vec<String> {
  let mut warnings = Vec::new();
  if config.max_teams < MIN_TEAM_COUNT {
    warnings.push(format!(
      "maxTeams is {} so no bracket can be created",
      config.max_teams
    ));
  }
  if config.max_teams > MAX_BRACKET_SIZE {
    warnings.push(format!(
      "maxTeams {} is above the largest supported bracket ({MAX_BRACKET_SIZE})",
      config.max_teams
    ));
  }
  if config.bind_addr.trim().is_empty() {
    warnings.push(format!("bindAddr is empty, falling back to {DEFAULT_BIND_ADDR}"));
  }
  warnings
}

pub fn log_config_warnings(config: &AppConfig) {
  for warning in config_warnings(config) {
    tracing::warn!(%warning, "config");
  }
}
