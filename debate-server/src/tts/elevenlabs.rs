use debate_shared::Voice;
use reqwest::header::ACCEPT;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::Settings;
use crate::error::ServiceError;

pub const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";
const MODEL_ID: &str = "eleven_monolingual_v1";

const CATALOG: [(&str, &str); 5] = [
    ("pNInz6obpgDQGcFmaJgB", "Adam"),
    ("IKne3meq5aSn9XLyUdCD", "Charlie"),
    ("EXAVITQu4vr4xnSDxMaL", "Bella"),
    ("MF3mGyEYCl7XYWbV9V6O", "Elli"),
    ("TxGEqnHWrfWFTfGW9XjX", "Josh"),
];

#[derive(Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

pub struct ElevenLabs {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ElevenLabs {
    pub fn new(settings: &Settings) -> Result<Self, ServiceError> {
        Self::with_timeout(
            settings.elevenlabs_api_key.clone(),
            settings.elevenlabs_base_url.clone(),
            settings.upstream_timeout,
        )
    }

    fn with_timeout(
        api_key: Option<String>,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fixed catalog; never touches the network.
    pub fn voices() -> Vec<Voice> {
        CATALOG
            .iter()
            .map(|(id, name)| Voice::new(*id, *name))
            .collect()
    }

    /// Synthesize MP3 audio. A missing key fails before any request is made.
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ServiceError::Configuration("ElevenLabs API key not configured".to_string())
        })?;
        let voice_id = voice_id.filter(|v| !v.is_empty()).unwrap_or(DEFAULT_VOICE_ID);
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);

        info!("Requesting ElevenLabs speech ({} chars, voice {})", text.len(), voice_id);
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "audio/mpeg")
            .header("xi-api-key", api_key)
            .json(&SpeechBody {
                text,
                model_id: MODEL_ID,
                voice_settings: VoiceSettings {
                    stability: 0.5,
                    similarity_boost: 0.5,
                },
            })
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}
