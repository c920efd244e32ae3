use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Body of both `/api/debate/stream` and `/api/debate/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl DebateRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Model to call, falling back to the server's configured default.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(default)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("messages must not be empty".to_string());
        }
        let temperature = self.temperature();
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                temperature
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
}

/// One frame of the debate event stream.
///
/// Wire shapes: `{"content":..,"done":false}`, `{"done":true}` and
/// `{"error":..,"done":true}`. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StreamEventWire", try_from = "StreamEventWire")]
pub enum StreamEvent {
    Content(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content(_))
    }
}

#[derive(Serialize, Deserialize)]
struct StreamEventWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    done: bool,
}

impl From<StreamEvent> for StreamEventWire {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Content(content) => Self {
                content: Some(content),
                error: None,
                done: false,
            },
            StreamEvent::Done => Self {
                content: None,
                error: None,
                done: true,
            },
            StreamEvent::Error(error) => Self {
                content: None,
                error: Some(error),
                done: true,
            },
        }
    }
}

impl TryFrom<StreamEventWire> for StreamEvent {
    type Error = String;

    fn try_from(wire: StreamEventWire) -> Result<Self, String> {
        match (wire.done, wire.content, wire.error) {
            (false, Some(content), None) => Ok(StreamEvent::Content(content)),
            (true, None, Some(error)) => Ok(StreamEvent::Error(error)),
            (true, None, None) => Ok(StreamEvent::Done),
            _ => Err("malformed stream event".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtsProvider {
    /// Local synthesis engine. Keeps the wire name clients already send.
    #[serde(rename = "pyttsx3")]
    Local,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl TtsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsProvider::Local => "pyttsx3",
            TtsProvider::ElevenLabs => "elevenlabs",
        }
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtsProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pyttsx3" => Ok(TtsProvider::Local),
            "elevenlabs" => Ok(TtsProvider::ElevenLabs),
            other => Err(format!("unknown TTS provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<TtsProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of every failed non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
