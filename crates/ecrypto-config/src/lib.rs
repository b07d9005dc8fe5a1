use ecrypto_gateway::{GatewayConfig, DEFAULT_PROGRESS_BUFFER};
use ecrypto_supervisor::{
    default_server_args, EngineSupervisorConfig, DEFAULT_ENGINE_BINARY, DEFAULT_ENGINE_HOST,
    DEFAULT_ENGINE_PORT, DEFAULT_READINESS_TIMEOUT, DEFAULT_READY_MARKER,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_ECRYPTO_CONFIG: &str = "ECRYPTO_CONFIG";
pub const ENV_ECRYPTO_ENGINE_BIN: &str = "ECRYPTO_ENGINE_BIN";
pub const ENV_ECRYPTO_ENGINE_PORT: &str = "ECRYPTO_ENGINE_PORT";

const DEFAULT_LOG_DIRECTIVE: &str = "info";
const DEFAULT_LOG_FILE_NAME: &str = "ecrypto-shell.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EcryptoConfig {
    #[serde(default)]
    pub engine: EngineConfigToml,
    #[serde(default)]
    pub gateway: GatewayConfigToml,
    #[serde(default)]
    pub progress: ProgressConfigToml,
    #[serde(default)]
    pub logging: LoggingConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfigToml {
    /// Empty means "look next to the shell executable, then on PATH".
    #[serde(default)]
    pub binary: String,
    #[serde(default = "default_engine_host")]
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    #[serde(default = "default_server_args")]
    pub server_args: Vec<String>,
    #[serde(default = "default_ready_markers")]
    pub ready_markers: Vec<String>,
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
}

impl Default for EngineConfigToml {
    fn default() -> Self {
        Self {
            binary: String::new(),
            host: default_engine_host(),
            port: default_engine_port(),
            server_args: default_server_args(),
            ready_markers: default_ready_markers(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
        }
    }
}

/// Zero disables the corresponding timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GatewayConfigToml {
    #[serde(default)]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressConfigToml {
    #[serde(default = "default_progress_buffer")]
    pub buffer: usize,
}

impl Default for ProgressConfigToml {
    fn default() -> Self {
        Self {
            buffer: default_progress_buffer(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    #[default]
    File,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfigToml {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` still wins when set.
    #[serde(default = "default_log_directive")]
    pub directive: String,
    #[serde(default)]
    pub target: LogTarget,
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfigToml {
    fn default() -> Self {
        Self {
            directive: default_log_directive(),
            target: LogTarget::default(),
            file: default_log_file(),
        }
    }
}

impl EcryptoConfig {
    pub fn supervisor_config(&self) -> EngineSupervisorConfig {
        EngineSupervisorConfig {
            binary: resolve_engine_binary(self.engine.binary.as_str()),
            host: self.engine.host.clone(),
            port: self.engine.port,
            server_args: self.engine.server_args.clone(),
            ready_markers: self.engine.ready_markers.clone(),
            readiness_timeout: Duration::from_millis(self.engine.readiness_timeout_ms),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            request_timeout: seconds(self.gateway.request_timeout_secs),
            connect_timeout: seconds(self.gateway.connect_timeout_secs),
        }
    }
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Loads the file named by `ECRYPTO_CONFIG` (or the default path) and applies
/// the engine environment overrides on top.
pub fn load_from_env() -> Result<EcryptoConfig, ConfigError> {
    let path = config_path_from_env()?;
    let mut config = load_from_path(path)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<EcryptoConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("ecrypto").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match read_env(ENV_ECRYPTO_CONFIG)? {
        Some(raw) => Ok(raw.into()),
        None => default_config_path(),
    }
}

pub fn apply_env_overrides(config: &mut EcryptoConfig) -> Result<(), ConfigError> {
    if let Some(binary) = read_env(ENV_ECRYPTO_ENGINE_BIN)? {
        config.engine.binary = binary;
    }
    if let Some(raw) = read_env(ENV_ECRYPTO_ENGINE_PORT)? {
        config.engine.port = parse_port(raw.as_str()).map_err(|reason| {
            ConfigError::configuration(format!("{ENV_ECRYPTO_ENGINE_PORT} {reason}"))
        })?;
    }
    Ok(())
}

/// Parses a TCP port, rejecting zero.
pub fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!(
            "must be a port between 1 and 65535, got '{}'",
            raw.trim()
        )),
        Ok(port) => Ok(port),
    }
}

fn read_env(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            let trimmed = raw.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_owned()))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(_) => Err(ConfigError::configuration(format!(
            "{name} contained invalid UTF-8"
        ))),
    }
}

/// Resolves the engine executable: an explicit path wins, then an `ecrypto`
/// binary shipped next to the running executable, then a bare `ecrypto`
/// looked up on `PATH`.
pub fn resolve_engine_binary(configured: &str) -> PathBuf {
    let configured = configured.trim();
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }

    let bundled_name = format!("{DEFAULT_ENGINE_BINARY}{}", std::env::consts::EXE_SUFFIX);
    if let Some(bundled) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(bundled_name.as_str())))
        .filter(|candidate| candidate.is_file())
    {
        return bundled;
    }

    PathBuf::from(bundled_name)
}

fn resolve_data_local_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("LOCALAPPDATA") {
            let path = path.trim();
            if !path.is_empty() {
                return absolutize_path(PathBuf::from(path));
            }
        }
        if let Some(home) = resolve_home_dir() {
            return home.join("AppData").join("Local");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = resolve_home_dir() {
            return home.join("Library").join("Application Support");
        }
    }

    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    {
        if let Ok(path) = std::env::var("XDG_DATA_HOME") {
            let path = path.trim();
            if !path.is_empty() {
                return absolutize_path(PathBuf::from(path));
            }
        }
        if let Some(home) = resolve_home_dir() {
            return home.join(".local").join("share");
        }
    }

    std::env::temp_dir()
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn absolutize_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }

    if let Ok(current) = std::env::current_dir() {
        return current.join(path);
    }

    std::env::temp_dir().join(path)
}

fn default_engine_host() -> String {
    DEFAULT_ENGINE_HOST.to_owned()
}

fn default_engine_port() -> u16 {
    DEFAULT_ENGINE_PORT
}

fn default_ready_markers() -> Vec<String> {
    vec![DEFAULT_READY_MARKER.to_owned()]
}

fn default_readiness_timeout_ms() -> u64 {
    DEFAULT_READINESS_TIMEOUT.as_millis() as u64
}

fn default_progress_buffer() -> usize {
    DEFAULT_PROGRESS_BUFFER
}

fn default_log_directive() -> String {
    DEFAULT_LOG_DIRECTIVE.to_owned()
}

fn default_log_file() -> String {
    resolve_data_local_dir()
        .join("ecrypto")
        .join(DEFAULT_LOG_FILE_NAME)
        .to_string_lossy()
        .to_string()
}

fn persist_config(path: &Path, config: &EcryptoConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize ECRYPTO_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write ECRYPTO_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<EcryptoConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for ECRYPTO_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = EcryptoConfig::default();
            persist_config(path, &default_config)?;
            tracing::info!(path = %path.display(), "created default ecrypto config");
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read ECRYPTO_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: EcryptoConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse ECRYPTO_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    if normalize_config(&mut config)? {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut EcryptoConfig) -> Result<bool, ConfigError> {
    let mut changed = false;

    if config.engine.port == 0 {
        return Err(ConfigError::configuration(
            "engine.port must be a port between 1 and 65535",
        ));
    }
    changed |= normalize_trimmed_string(&mut config.engine.binary);
    changed |= normalize_non_empty_string(&mut config.engine.host, default_engine_host());
    changed |= normalize_string_vec(&mut config.engine.server_args);
    if config.engine.server_args.is_empty() {
        config.engine.server_args = default_server_args();
        changed = true;
    }
    changed |= normalize_string_vec(&mut config.engine.ready_markers);
    if config.engine.ready_markers.is_empty() {
        config.engine.ready_markers = default_ready_markers();
        changed = true;
    }
    if config.engine.readiness_timeout_ms == 0 {
        config.engine.readiness_timeout_ms = default_readiness_timeout_ms();
        changed = true;
    }

    if config.progress.buffer == 0 {
        config.progress.buffer = default_progress_buffer();
        changed = true;
    }

    changed |= normalize_non_empty_string(&mut config.logging.directive, default_log_directive());
    changed |= normalize_non_empty_string(&mut config.logging.file, default_log_file());

    Ok(changed)
}

fn normalize_trimmed_string(value: &mut String) -> bool {
    let trimmed = value.trim();
    if trimmed != value {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    if value.trim().is_empty() {
        if *value != default {
            *value = default;
            return true;
        }
        return false;
    }
    normalize_trimmed_string(value)
}

fn normalize_string_vec(values: &mut Vec<String>) -> bool {
    let normalized = values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    if *values != normalized {
        *values = normalized;
        return true;
    }
    false
}
