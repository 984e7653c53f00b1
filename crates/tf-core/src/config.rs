use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.taskforge/config.toml`.
///
/// **Security**: this struct never stores repository tokens. Credentials are
/// read from environment variables at the call site and only ever injected
/// into a clone/fetch URL in memory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub container: ContainerConfig,
}

impl Config {
    /// Load config from `~/.taskforge/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.cache.validate()?;
        self.executor.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskforge")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "human" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be \"human\" or \"json\", got {other:?}"
            ))),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: String,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_validate_timeout")]
    pub validate_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            max_age_hours: default_max_age_hours(),
            clone_timeout_secs: default_clone_timeout(),
            validate_timeout_secs: default_validate_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            dir_mode: default_dir_mode(),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !PathBuf::from(&self.root).is_absolute() {
            return Err(ConfigError::Validation(format!(
                "cache.root must be an absolute path, got {:?}",
                self.root
            )));
        }
        if self.clone_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "cache git timeouts must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}

fn default_cache_root() -> String {
    "/workspace/repos".into()
}
fn default_max_age_hours() -> u64 {
    24
}
fn default_clone_timeout() -> u64 {
    30
}
fn default_validate_timeout() -> u64 {
    10
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_dir_mode() -> u32 {
    0o755
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_tool_binary")]
    pub tool_binary: String,
    #[serde(default = "default_tool_install")]
    pub tool_install_command: String,
    #[serde(default = "default_message_file_flag")]
    pub message_file_flag: String,
    #[serde(default = "default_model_flag")]
    pub model_flag: String,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default = "default_setup_timeout")]
    pub container_setup_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tool_binary: default_tool_binary(),
            tool_install_command: default_tool_install(),
            message_file_flag: default_message_file_flag(),
            model_flag: default_model_flag(),
            workspace_dir: default_workspace_dir(),
            container_setup_timeout_secs: default_setup_timeout(),
            max_attempts: default_max_attempts(),
            package_manager: default_package_manager(),
        }
    }
}

impl ExecutorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=2).contains(&self.max_attempts) {
            return Err(ConfigError::Validation(format!(
                "executor.max_attempts must be 1 or 2, got {}",
                self.max_attempts
            )));
        }
        if self.tool_binary.trim().is_empty() || self.package_manager.trim().is_empty() {
            return Err(ConfigError::Validation(
                "executor.tool_binary and executor.package_manager must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_tool_binary() -> String {
    "aider".into()
}
fn default_tool_install() -> String {
    "pip install --quiet aider-chat".into()
}
fn default_message_file_flag() -> String {
    "--message-file".into()
}
fn default_model_flag() -> String {
    "--model".into()
}
fn default_workspace_dir() -> String {
    "/workspace".into()
}
fn default_setup_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    2
}
fn default_package_manager() -> String {
    "npm".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: default_image(),
            name_prefix: default_name_prefix(),
            expiry_days: default_expiry_days(),
        }
    }
}

fn default_runtime() -> String {
    "docker".into()
}
fn default_image() -> String {
    "node:20-bookworm".into()
}
fn default_name_prefix() -> String {
    "tf".into()
}
fn default_expiry_days() -> u64 {
    7
}
