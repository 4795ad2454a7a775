//! Process configuration, read once from the environment at startup.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CAPTION_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_CAPTION_MODEL: &str = "meta-llama/llama-3.2-11b-vision-instruct";
pub const DEFAULT_SPEECH_API_BASE: &str = "https://translate.google.com";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// The captioning provider's API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceCredential(String);

impl ServiceCredential {
    /// Returns `None` for blank keys so that an empty variable behaves like an
    /// unset one.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key.trim().to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceCredential([redacted])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected \"pretty\" or \"json\", got {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptionSettings {
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub enabled: bool,
    pub language: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credential: Option<ServiceCredential>,
    pub caption: CaptionSettings,
    pub speech: SpeechSettings,
    /// Width of the on-screen preview; 0 turns the preview off.
    pub display_resize_width: u32,
    pub max_upload_bytes: usize,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            credential: lookup("OPENROUTER_API_KEY").and_then(|key| ServiceCredential::new(key)),
            caption: CaptionSettings {
                api_base: get("CAPTION_API_BASE")
                    .unwrap_or_else(|| DEFAULT_CAPTION_API_BASE.to_string()),
                model: get("CAPTION_MODEL").unwrap_or_else(|| DEFAULT_CAPTION_MODEL.to_string()),
                timeout: Duration::from_secs(parse_or(&lookup, "CAPTION_TIMEOUT_SECS", 60)?),
            },
            speech: SpeechSettings {
                enabled: parse_bool_or(&lookup, "ENABLE_SPEECH", true)?,
                language: get("SPEECH_LANGUAGE").unwrap_or_else(|| "en".to_string()),
                api_base: get("SPEECH_API_BASE")
                    .unwrap_or_else(|| DEFAULT_SPEECH_API_BASE.to_string()),
                timeout: Duration::from_secs(parse_or(&lookup, "SPEECH_TIMEOUT_SECS", 30)?),
            },
            display_resize_width: parse_or(&lookup, "DISPLAY_RESIZE_WIDTH", 600)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

fn parse_bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}
