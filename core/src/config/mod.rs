//! TOML-based configuration for wren
//!
//! # Example Configuration
//!
//! ```toml
//! [interview]
//! max_turns = 12
//! quit_commands = ["quit", "exit", "q"]
//!
//! [coverage]
//! early_readiness_turns = 8
//! coverage_threshold = 0.75
//!
//! [[coverage.dimensions]]
//! name = "taste_anchors"
//! keywords = ["book", "author", "story", "novel"]
//!
//! [checkpoint]
//! namespace = "wren:checkpoint"
//! ttl_secs = 86400
//! backend = "file"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::coverage::Dimension;
use crate::error::{Result, WrenError};

/// Config file name searched in the current directory and the user config dir
pub const CONFIG_FILE_NAME: &str = "wren.toml";

/// Root configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct WrenConfig {
    #[serde(default)]
    pub interview: InterviewConfig,

    #[serde(default)]
    pub coverage: CoverageConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Turn ceiling and input handling
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InterviewConfig {
    /// Number of user turns after which the interview is forced complete
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Inputs that end the interview early (matched case-insensitively)
    #[serde(default = "default_quit_commands")]
    pub quit_commands: Vec<String>,

    /// Longer user inputs are truncated to this many characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            quit_commands: default_quit_commands(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_max_turns() -> u32 {
    12
}

fn default_quit_commands() -> Vec<String> {
    vec!["quit".to_string(), "exit".to_string(), "q".to_string()]
}

fn default_max_input_chars() -> usize {
    2000
}

/// Advisory readiness thresholds and the dimensions they are computed over
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CoverageConfig {
    /// Minimum user turns before readiness can be recommended
    #[serde(default = "default_early_readiness_turns")]
    pub early_readiness_turns: u32,

    /// Minimum covered fraction of dimensions (0.0 - 1.0)
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,

    #[serde(default = "Dimension::defaults")]
    pub dimensions: Vec<Dimension>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            early_readiness_turns: default_early_readiness_turns(),
            coverage_threshold: default_coverage_threshold(),
            dimensions: Dimension::defaults(),
        }
    }
}

fn default_early_readiness_turns() -> u32 {
    8
}

fn default_coverage_threshold() -> f64 {
    0.75
}

/// Storage engine behind the checkpoint store
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    #[default]
    File,
}

/// Checkpoint store settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CheckpointConfig {
    /// Key prefix for every checkpoint
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Sub-namespace inside a session (empty by default)
    #[serde(default)]
    pub checkpoint_namespace: String,

    /// Expiry in seconds, renewed on every write
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub backend: BackendKind,

    /// Directory for the file backend; defaults to `<data dir>/wren/checkpoints`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            checkpoint_namespace: String::new(),
            ttl_secs: default_ttl_secs(),
            backend: BackendKind::default(),
            dir: None,
        }
    }
}

impl CheckpointConfig {
    /// Resolve the file backend directory
    ///
    /// Priority: configured `dir`, then `$XDG_DATA_HOME/wren/checkpoints`,
    /// then `$HOME/.local/share/wren/checkpoints`.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }

        if let Some(mut data_dir) = dirs::data_dir() {
            data_dir.push("wren/checkpoints");
            return data_dir;
        }

        if let Some(home) = home::home_dir() {
            return home.join(".local/share/wren/checkpoints");
        }

        PathBuf::from("./checkpoints")
    }
}

fn default_namespace() -> String {
    "wren:checkpoint".to_string()
}

fn default_ttl_secs() -> u64 {
    86_400
}

/// Log output settings consumed by the binary
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// One of `pretty`, `compact` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl WrenConfig {
    /// Load configuration from file
    ///
    /// Searches for `wren.toml` in the current directory, then in the user
    /// config directory (`~/.config/wren/wren.toml`). If neither exists,
    /// returns `WrenConfig::default()`.
    pub fn load() -> Result<Self> {
        let current_dir_path = Path::new(CONFIG_FILE_NAME);
        if current_dir_path.exists() {
            return Self::load_from(current_dir_path);
        }

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                return Self::load_from(&user_config_path);
            }
        }

        Ok(WrenConfig::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: WrenConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration as pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;

        Ok(())
    }

    /// Default user config path (`~/.config/wren/wren.toml`)
    pub fn user_config_path() -> Option<PathBuf> {
        if let Some(dir) = dirs::config_dir() {
            return Some(dir.join("wren").join(CONFIG_FILE_NAME));
        }

        home::home_dir().map(|home| home.join(".config").join("wren").join(CONFIG_FILE_NAME))
    }

    /// Apply environment variable overrides
    ///
    /// - `WREN_MAX_TURNS` → `interview.max_turns`
    /// - `WREN_CHECKPOINT_TTL` → `checkpoint.ttl_secs`
    /// - `WREN_CHECKPOINT_DIR` → `checkpoint.dir`
    /// - `WREN_CHECKPOINT_NAMESPACE` → `checkpoint.namespace`
    /// - `WREN_LOG_LEVEL` → `logging.level`
    ///
    /// Invalid values are logged as warnings but don't cause errors.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("WREN_MAX_TURNS") {
            match value.parse::<u32>() {
                Ok(max_turns) => self.interview.max_turns = max_turns,
                Err(_) => warn!("Invalid WREN_MAX_TURNS value: {}", value),
            }
        }

        if let Ok(value) = env::var("WREN_CHECKPOINT_TTL") {
            match value.parse::<u64>() {
                Ok(ttl) => self.checkpoint.ttl_secs = ttl,
                Err(_) => warn!("Invalid WREN_CHECKPOINT_TTL value: {}", value),
            }
        }

        if let Ok(dir) = env::var("WREN_CHECKPOINT_DIR") {
            if !dir.is_empty() {
                self.checkpoint.dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(namespace) = env::var("WREN_CHECKPOINT_NAMESPACE") {
            if !namespace.is_empty() {
                self.checkpoint.namespace = namespace;
            }
        }

        if let Ok(level) = env::var("WREN_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Reject values the state machine and store cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.interview.max_turns == 0 {
            return Err(invalid("interview.max_turns must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.coverage.coverage_threshold) {
            return Err(invalid("coverage.coverage_threshold must be between 0.0 and 1.0"));
        }
        if self.checkpoint.ttl_secs == 0 {
            return Err(invalid("checkpoint.ttl_secs must be at least 1"));
        }
        if self.checkpoint.namespace.trim().is_empty() {
            return Err(invalid("checkpoint.namespace must not be empty"));
        }
        if self.checkpoint.checkpoint_namespace.contains(':') {
            return Err(invalid("checkpoint.checkpoint_namespace must not contain ':'"));
        }
        if self.coverage.dimensions.iter().any(|d| d.keywords.is_empty()) {
            return Err(invalid("every coverage dimension needs at least one keyword"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> WrenError {
    WrenError::InvalidConfig {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use std::sync::Mutex;

    // Env overrides mutate process-wide state; serialize those tests.
    lazy_static! {
        static ref ENV_LOCK: Mutex<()> = Mutex::new(());
    }

    #[test]
    fn test_default_config() {
        let config = WrenConfig::default();
        assert_eq!(config.interview.max_turns, 12);
        assert_eq!(config.coverage.early_readiness_turns, 8);
        assert_eq!(config.coverage.coverage_threshold, 0.75);
        assert_eq!(config.coverage.dimensions.len(), 4);
        assert_eq!(config.checkpoint.ttl_secs, 86_400);
        assert_eq!(config.checkpoint.namespace, "wren:checkpoint");
        assert_eq!(config.checkpoint.backend, BackendKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
[interview]
max_turns = 6

[coverage]
coverage_threshold = 0.5

[[coverage.dimensions]]
name = "pets"
keywords = ["cat", "dog"]

[checkpoint]
backend = "memory"
ttl_secs = 60
"#;

        let config: WrenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.interview.max_turns, 6);
        assert_eq!(config.interview.quit_commands, vec!["quit", "exit", "q"]);
        assert_eq!(config.coverage.coverage_threshold, 0.5);
        assert_eq!(config.coverage.early_readiness_turns, 8);
        assert_eq!(config.coverage.dimensions.len(), 1);
        assert_eq!(config.coverage.dimensions[0].name, "pets");
        assert_eq!(config.checkpoint.backend, BackendKind::Memory);
        assert_eq!(config.checkpoint.ttl_secs, 60);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("wren.toml");

        let mut config = WrenConfig::default();
        config.interview.max_turns = 9;
        config.checkpoint.dir = Some(PathBuf::from("/tmp/wren-checkpoints"));
        config.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("max_turns = 9"));

        let loaded = WrenConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WrenConfig::default();
        config.interview.max_turns = 0;
        assert!(matches!(config.validate(), Err(WrenError::InvalidConfig { .. })));

        let mut config = WrenConfig::default();
        config.coverage.coverage_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = WrenConfig::default();
        config.checkpoint.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = WrenConfig::default();
        config.checkpoint.checkpoint_namespace = "a:b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_dir_prefers_explicit() {
        let config = CheckpointConfig {
            dir: Some(PathBuf::from("/var/lib/wren")),
            ..Default::default()
        };
        assert_eq!(config.resolve_dir(), PathBuf::from("/var/lib/wren"));
    }

    #[test]
    fn test_environment_variable_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("WREN_MAX_TURNS", "5");
        env::set_var("WREN_CHECKPOINT_TTL", "120");
        env::set_var("WREN_CHECKPOINT_DIR", "/tmp/wren-env");
        env::set_var("WREN_LOG_LEVEL", "debug");

        let mut config = WrenConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.interview.max_turns, 5);
        assert_eq!(config.checkpoint.ttl_secs, 120);
        assert_eq!(config.checkpoint.dir, Some(PathBuf::from("/tmp/wren-env")));
        assert_eq!(config.logging.level, "debug");

        env::remove_var("WREN_MAX_TURNS");
        env::remove_var("WREN_CHECKPOINT_TTL");
        env::remove_var("WREN_CHECKPOINT_DIR");
        env::remove_var("WREN_LOG_LEVEL");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("WREN_MAX_TURNS", "twelve");

        let mut config = WrenConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.interview.max_turns, 12);

        env::remove_var("WREN_MAX_TURNS");
    }
}
