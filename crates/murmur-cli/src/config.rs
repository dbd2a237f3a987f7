//! Host configuration loading from file and environment variables.

use std::time::Duration;

use murmur_audio::CaptureConfig;
use murmur_session::{
    SessionConfig, DEFAULT_ENDPOINT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MODEL,
    DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE,
};
use murmur_types::{CAPTURE_SAMPLE_RATE_HZ, DEFAULT_FRAME_SIZE};
use serde::Deserialize;
use thiserror::Error;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Remote session settings.
    #[serde(default)]
    pub session: SessionSection,

    /// Audio device settings.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the live session with the remote model.
#[derive(Clone, Deserialize)]
pub struct SessionSection {
    /// API key appended to the endpoint URL.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Prebuilt voice the model speaks with.
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Websocket endpoint of the live service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Seconds to wait for the socket and the setup reply.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl std::fmt::Debug for SessionSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSection")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("system_instruction", &self.system_instruction)
            .field("endpoint", &self.endpoint)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .finish()
    }
}

/// Audio device configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Input device name. The system default is used when unset.
    #[serde(default)]
    pub input_device: Option<String>,

    /// Output device name. The system default is used when unset.
    #[serde(default)]
    pub output_device: Option<String>,

    /// Samples per microphone frame sent to the model.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "murmur_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_secs()
}

fn default_frame_size() -> usize {
    DEFAULT_FRAME_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            voice: default_voice(),
            system_instruction: default_system_instruction(),
            endpoint: default_endpoint(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            frame_size: default_frame_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SessionSection {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Config {
    /// The session request built from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.session.model.clone(),
            voice: self.session.voice.clone(),
            system_instruction: self.session.system_instruction.clone(),
            capture: CaptureConfig {
                sample_rate: CAPTURE_SAMPLE_RATE_HZ,
                frame_size: self.audio.frame_size,
            },
            ..SessionConfig::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `MURMUR_API_KEY` overrides `session.api_key`
/// - `MURMUR_MODEL` overrides `session.model`
/// - `MURMUR_VOICE` overrides `session.voice`
/// - `MURMUR_ENDPOINT` overrides `session.endpoint`
/// - `MURMUR_FRAME_SIZE` overrides `audio.frame_size`
/// - `MURMUR_LOG_LEVEL` overrides `logging.level`
/// - `MURMUR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting frame size is zero.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.audio.frame_size == 0 {
        return Err(ConfigError::Invalid("audio.frame_size must be positive".into()));
    }
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(key) = var("MURMUR_API_KEY") {
        config.session.api_key = key;
    }
    if let Some(model) = var("MURMUR_MODEL") {
        config.session.model = model;
    }
    if let Some(voice) = var("MURMUR_VOICE") {
        config.session.voice = voice;
    }
    if let Some(endpoint) = var("MURMUR_ENDPOINT") {
        config.session.endpoint = endpoint;
    }
    if let Some(size) = var("MURMUR_FRAME_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.audio.frame_size = parsed;
        }
    }
    if let Some(level) = var("MURMUR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("MURMUR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();

        assert_eq!(config.session.model, DEFAULT_MODEL);
        assert_eq!(config.session.voice, "Kore");
        assert_eq!(config.session.handshake_timeout(), Duration::from_secs(15));
        assert_eq!(config.audio.frame_size, 2048);
        assert!(config.audio.input_device.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            [session]
            voice = "Puck"
            handshake_timeout_secs = 5

            [audio]
            input_device = "USB Microphone"
            frame_size = 1024

            [logging]
            json = true
            "#,
        );
        let config = load_config(file.path().to_str()).unwrap();

        assert_eq!(config.session.voice, "Puck");
        assert_eq!(config.session.model, DEFAULT_MODEL);
        assert_eq!(config.session.handshake_timeout_secs, 5);
        assert_eq!(config.audio.input_device.as_deref(), Some("USB Microphone"));
        assert_eq!(config.audio.frame_size, 1024);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[session\nvoice = ");
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_frame_size_is_rejected() {
        let file = write_config("[audio]\nframe_size = 0\n");
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("MURMUR_API_KEY", "secret-key"),
            ("MURMUR_MODEL", "gemini-live-test"),
            ("MURMUR_VOICE", "Charon"),
            ("MURMUR_ENDPOINT", "ws://127.0.0.1:9000"),
            ("MURMUR_FRAME_SIZE", "512"),
            ("MURMUR_LOG_LEVEL", "debug"),
            ("MURMUR_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.session.api_key, "secret-key");
        assert_eq!(config.session.model, "gemini-live-test");
        assert_eq!(config.session.voice, "Charon");
        assert_eq!(config.session.endpoint, "ws://127.0.0.1:9000");
        assert_eq!(config.audio.frame_size, 512);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn unparsable_frame_size_override_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| {
            (key == "MURMUR_FRAME_SIZE").then(|| "lots".to_string())
        });
        assert_eq!(config.audio.frame_size, 2048);
    }

    #[test]
    fn api_key_is_redacted_from_debug() {
        let mut config = Config::default();
        config.session.api_key = "super-secret".into();
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn session_config_carries_overrides() {
        let mut config = Config::default();
        config.session.voice = "Puck".into();
        config.audio.frame_size = 1024;

        let session = config.session_config();
        assert_eq!(session.voice, "Puck");
        assert_eq!(session.capture.frame_size, 1024);
        assert_eq!(session.capture.sample_rate, 16_000);
        assert_eq!(session.tools.len(), 6);
    }
}
