//! Process settings, read from the environment once at startup.

use debate_shared::TtsProvider;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_ESPEAK_COMMAND: &str = "espeak-ng";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct Settings {
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub default_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: String,
    pub tts_provider: TtsProvider,
    pub espeak_command: String,
    pub cors_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub upstream_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Missing credentials are
    /// not an error here; consumers check for them when they need them.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let tts_provider = match non_empty("TTS_PROVIDER") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}; using {}", e, TtsProvider::Local);
                TtsProvider::Local
            }),
            None => TtsProvider::Local,
        };

        let port = match non_empty("PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid PORT '{}'; using 8000", raw);
                8000
            }),
            None => 8000,
        };

        let upstream_timeout = match non_empty("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!("Invalid UPSTREAM_TIMEOUT_SECS '{}'; using default", raw);
                    DEFAULT_UPSTREAM_TIMEOUT
                }
            },
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        Self {
            deepseek_api_key: non_empty("DEEPSEEK_API_KEY"),
            deepseek_base_url: non_empty("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DEEPSEEK_BASE_URL.to_string()),
            default_model: non_empty("DEEPSEEK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            elevenlabs_api_key: non_empty("ELEVENLABS_API_KEY"),
            elevenlabs_base_url: non_empty("ELEVENLABS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            tts_provider,
            espeak_command: non_empty("ESPEAK_COMMAND")
                .unwrap_or_else(|| DEFAULT_ESPEAK_COMMAND.to_string()),
            cors_origins: parse_cors_origins(lookup("CORS_ORIGINS").as_deref()),
            host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            debug: non_empty("DEBUG").map(|v| parse_flag(&v)).unwrap_or(false),
            upstream_timeout,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a JSON array of origins; anything unparseable yields the single default.
fn parse_cors_origins(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return vec![DEFAULT_CORS_ORIGIN.to_string()];
    };
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(origins) => origins,
        Err(e) => {
            warn!("Could not parse CORS_ORIGINS as a JSON array ({}); using default", e);
            vec![DEFAULT_CORS_ORIGIN.to_string()]
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
