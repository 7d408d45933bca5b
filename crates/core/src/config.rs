//! Hierarchical configuration: built-in defaults → user config file →
//! project config file → environment variables → CLI overrides, each layer
//! deep-merging over the last (spec.md §6).
//!
//! The teacher's `Config::load_for_project` merges project-over-user; this
//! spec mandates the opposite precedence (user is a personal default,
//! project-local settings should win), so that ordering is corrected here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::DistanceMetric;

const ENV_PREFIX: &str = "SOURCELENS_";
const ENV_NEST_DELIM: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbConfig {
  pub path: PathBuf,
}

impl Default for DbConfig {
  fn default() -> Self {
    Self {
      path: default_data_dir().join("sourcelens.lance"),
    }
  }
}

pub fn default_data_dir() -> PathBuf {
  dirs::data_local_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("sourcelens")
}

/// Defaults seeded from the teacher's `GLOBAL_PATTERNS` constant in
/// `crates/index/src/gitignore.rs`, plus the database file path itself
/// (spec.md §6: "the directory containing the database is automatically
/// excluded from watching").
fn default_exclude() -> Vec<String> {
  vec![
    "**/.git/**".to_string(),
    "**/.hg/**".to_string(),
    "**/node_modules/**".to_string(),
    "**/vendor/**".to_string(),
    "**/.venv/**".to_string(),
    "**/target/**".to_string(),
    "**/dist/**".to_string(),
    "**/build/**".to_string(),
    "**/.cache/**".to_string(),
    "**/__pycache__/**".to_string(),
    "**/*.lance/**".to_string(),
  ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
  #[serde(default)]
  pub include: Vec<String>,
  #[serde(default = "default_exclude")]
  pub exclude: Vec<String>,
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
  500
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      include: Vec::new(),
      exclude: default_exclude(),
      debounce_ms: default_debounce_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
  #[serde(default = "default_batch_min")]
  pub min: usize,
  #[serde(default = "default_batch_initial")]
  pub initial: usize,
  #[serde(default = "default_batch_max")]
  pub max: usize,
}

fn default_batch_min() -> usize {
  8
}
fn default_batch_initial() -> usize {
  16
}
fn default_batch_max() -> usize {
  100
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      min: default_batch_min(),
      initial: default_batch_initial(),
      max: default_batch_max(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
  #[serde(default)]
  pub base_url: Option<String>,
  #[serde(default)]
  pub api_key: Option<String>,
  pub model: String,
  pub dim: usize,
  #[serde(default = "default_distance")]
  pub distance: DistanceMetric,
  #[serde(default)]
  pub batch: BatchConfig,
  #[serde(default = "default_timeout_s")]
  pub timeout_s: u64,
}

fn default_distance() -> DistanceMetric {
  DistanceMetric::Cosine
}
fn default_timeout_s() -> u64 {
  30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
  #[serde(default = "default_provider_name")]
  pub default_provider: String,
  #[serde(default = "default_model_name")]
  pub default_model: String,
  #[serde(default = "default_providers")]
  pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider_name() -> String {
  "ollama".to_string()
}
fn default_model_name() -> String {
  "qwen3-embedding".to_string()
}
fn default_providers() -> HashMap<String, ProviderConfig> {
  let mut map = HashMap::new();
  map.insert(
    "ollama".to_string(),
    ProviderConfig {
      base_url: Some("http://localhost:11434".to_string()),
      api_key: None,
      model: default_model_name(),
      dim: 4096,
      distance: DistanceMetric::Cosine,
      batch: BatchConfig::default(),
      timeout_s: default_timeout_s(),
    },
  );
  map
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      default_provider: default_provider_name(),
      default_model: default_model_name(),
      providers: default_providers(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
  #[serde(default = "default_max_response_bytes")]
  pub max_response_bytes: usize,
}

fn default_max_response_bytes() -> usize {
  60_000
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      max_response_bytes: default_max_response_bytes(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
  /// `None` activates every language the parser registry knows.
  #[serde(default)]
  pub languages: Option<Vec<String>>,
  #[serde(default = "default_max_file_size")]
  pub max_file_size: u64,
  #[serde(default = "default_max_chunk_chars")]
  pub max_chunk_chars: usize,
  #[serde(default = "default_parallel_files")]
  pub parallel_files: usize,
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity: usize,
}

fn default_max_file_size() -> u64 {
  10 * 1024 * 1024
}
fn default_max_chunk_chars() -> usize {
  8_000
}
fn default_parallel_files() -> usize {
  num_cpus_hint()
}
fn default_queue_capacity() -> usize {
  10_000
}

fn num_cpus_hint() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      languages: None,
      max_file_size: default_max_file_size(),
      max_chunk_chars: default_max_chunk_chars(),
      parallel_files: default_parallel_files(),
      queue_capacity: default_queue_capacity(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
  #[serde(default = "default_log_level")]
  pub log_level: String,
  #[serde(default = "default_log_rotation")]
  pub log_rotation: String,
  #[serde(default = "default_log_retention_days")]
  pub log_retention_days: u64,
  #[serde(default = "default_idle_timeout_secs")]
  pub idle_timeout_secs: u64,
  #[serde(default = "default_http_port")]
  pub http_port: Option<u16>,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}
fn default_log_retention_days() -> u64 {
  7
}
fn default_idle_timeout_secs() -> u64 {
  3600
}
fn default_http_port() -> Option<u16> {
  None
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      log_rotation: default_log_rotation(),
      log_retention_days: default_log_retention_days(),
      idle_timeout_secs: default_idle_timeout_secs(),
      http_port: default_http_port(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
  #[serde(default)]
  pub db: DbConfig,
  #[serde(default)]
  pub watch: WatchConfig,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub index: IndexConfig,
  #[serde(default)]
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load the full hierarchy for a project root: defaults → user config →
  /// project config → environment → (caller-supplied) CLI overrides.
  ///
  /// `cli_overrides` is a JSON object whose keys mirror the config's field
  /// names (e.g. `{"watch": {"debounce_ms": 250}}`); the CLI layer builds
  /// this from parsed flags before calling in.
  pub fn load(project_root: &Path, cli_overrides: Option<Value>) -> Result<Self, CoreError> {
    let mut merged = serde_json::to_value(Config::default()).expect("Config::default serializes");

    if let Some(user_path) = Self::user_config_path()
      && user_path.exists()
    {
      merge_json(&mut merged, Self::read_toml_as_json(&user_path)?);
    }

    let project_path = project_root.join(".sourcelens.toml");
    if project_path.exists() {
      merge_json(&mut merged, Self::read_toml_as_json(&project_path)?);
    }

    merge_json(&mut merged, Self::env_overrides());

    if let Some(cli) = cli_overrides {
      merge_json(&mut merged, cli);
    }

    serde_json::from_value(merged).map_err(|e| CoreError::ConfigInvalid(e.to_string()))
  }

  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SOURCELENS_CONFIG_DIR") {
      return Some(PathBuf::from(dir).join("config.toml"));
    }
    dirs::config_dir().map(|d| d.join("sourcelens").join("config.toml"))
  }

  fn read_toml_as_json(path: &Path) -> Result<Value, CoreError> {
    let text = std::fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&text)?;
    serde_json::to_value(value).map_err(|e| CoreError::ConfigInvalid(e.to_string()))
  }

  /// Build a JSON overlay from `SOURCELENS_`-prefixed environment
  /// variables, splitting the remainder of the key on `__` to address
  /// nested fields (e.g. `SOURCELENS_WATCH__DEBOUNCE_MS=250`).
  fn env_overrides() -> Value {
    let mut root = serde_json::Map::new();
    for (key, raw) in std::env::vars() {
      let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
        continue;
      };
      if rest.is_empty() || rest == "CONFIG_DIR" {
        continue;
      }
      let path: Vec<String> = rest.to_ascii_lowercase().split(ENV_NEST_DELIM).map(str::to_string).collect();
      set_nested(&mut root, &path, env_value(&raw));
    }
    Value::Object(root)
  }
}

fn env_value(raw: &str) -> Value {
  if let Ok(b) = raw.parse::<bool>() {
    return Value::Bool(b);
  }
  if let Ok(n) = raw.parse::<i64>() {
    return Value::Number(n.into());
  }
  if let Ok(f) = raw.parse::<f64>()
    && let Some(n) = serde_json::Number::from_f64(f)
  {
    return Value::Number(n);
  }
  Value::String(raw.to_string())
}

fn set_nested(root: &mut serde_json::Map<String, Value>, path: &[String], value: Value) {
  match path {
    [] => {}
    [last] => {
      root.insert(last.clone(), value);
    }
    [head, rest @ ..] => {
      let entry = root
        .entry(head.clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
      if let Value::Object(map) = entry {
        set_nested(map, rest, value);
      }
    }
  }
}

/// Deep-merge `overlay` into `base`; scalars and arrays in `overlay` replace
/// `base`, objects merge key-by-key.
fn merge_json(base: &mut Value, overlay: Value) {
  match (base, overlay) {
    (Value::Object(base_map), Value::Object(overlay_map)) => {
      for (key, value) in overlay_map {
        match base_map.get_mut(&key) {
          Some(existing) => merge_json(existing, value),
          None => {
            base_map.insert(key, value);
          }
        }
      }
    }
    (base_slot, overlay_value) => *base_slot = overlay_value,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_round_trip_through_json() {
    let config = Config::default();
    let value = serde_json::to_value(&config).unwrap();
    let back: Config = serde_json::from_value(value).unwrap();
    assert_eq!(config, back);
  }

  #[test]
  fn watch_defaults_match_spec() {
    let config = Config::default();
    assert_eq!(config.watch.debounce_ms, 500);
    assert!(config.watch.exclude.iter().any(|p| p.contains("node_modules")));
  }

  #[test]
  fn batch_config_defaults_match_spec_range() {
    let batch = BatchConfig::default();
    assert_eq!(batch.min, 8);
    assert_eq!(batch.max, 100);
  }

  #[test]
  fn merge_json_overlays_nested_objects() {
    let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
    let overlay = serde_json::json!({"a": {"y": 20}});
    merge_json(&mut base, overlay);
    assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 20}, "b": 3}));
  }

  #[test]
  fn set_nested_builds_intermediate_objects() {
    let mut root = serde_json::Map::new();
    set_nested(&mut root, &["watch".to_string(), "debounce_ms".to_string()], Value::from(250));
    assert_eq!(root["watch"]["debounce_ms"], Value::from(250));
  }

  #[test]
  fn env_value_parses_types() {
    assert_eq!(env_value("true"), Value::Bool(true));
    assert_eq!(env_value("250"), Value::from(250));
    assert_eq!(env_value("ollama"), Value::String("ollama".to_string()));
  }

  #[test]
  fn project_layer_overrides_user_layer() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".sourcelens.toml"), "[watch]\ndebounce_ms = 999\n").unwrap();
    // SOURCELENS_CONFIG_DIR intentionally left unset: no user layer exists,
    // so this only proves the project file is read and merged over defaults.
    let config = Config::load(dir.path(), None).unwrap();
    assert_eq!(config.watch.debounce_ms, 999);
  }

  #[test]
  fn cli_overrides_win_over_everything() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".sourcelens.toml"), "[search]\nmax_response_bytes = 1000\n").unwrap();
    let cli = serde_json::json!({"search": {"max_response_bytes": 55}});
    let config = Config::load(dir.path(), Some(cli)).unwrap();
    assert_eq!(config.search.max_response_bytes, 55);
  }
}
