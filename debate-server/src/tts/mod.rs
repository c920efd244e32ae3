//! Speech synthesis, dispatched to the local engine or ElevenLabs.

mod elevenlabs;
mod espeak;
mod wav;

pub use elevenlabs::{ElevenLabs, DEFAULT_VOICE_ID};
pub use espeak::{Espeak, SpeechEngine};
pub use wav::{silent_wav, SILENCE_SAMPLE_RATE, SILENCE_SECONDS};

use debate_shared::{TtsProvider, Voice};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mpeg,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mpeg => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mpeg => "mp3",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Audio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    /// Set when local synthesis failed and silence was returned instead.
    pub degraded: bool,
}

pub struct TtsDispatcher {
    default_provider: TtsProvider,
    local: Arc<dyn SpeechEngine>,
    remote: ElevenLabs,
}

impl TtsDispatcher {
    pub fn new(settings: &Settings, local: Arc<dyn SpeechEngine>) -> Result<Self, ServiceError> {
        Ok(Self {
            default_provider: settings.tts_provider,
            local,
            remote: ElevenLabs::new(settings)?,
        })
    }

    pub fn resolve(&self, provider: Option<TtsProvider>) -> TtsProvider {
        provider.unwrap_or(self.default_provider)
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
        provider: Option<TtsProvider>,
    ) -> Result<Audio, ServiceError> {
        match self.resolve(provider) {
            TtsProvider::ElevenLabs => Ok(Audio {
                bytes: self.remote.synthesize(text, voice_id).await?,
                format: AudioFormat::Mpeg,
                degraded: false,
            }),
            TtsProvider::Local => self.synthesize_local(text).await,
        }
    }

    async fn synthesize_local(&self, text: &str) -> Result<Audio, ServiceError> {
        let engine = self.local.clone();
        let owned = text.to_string();
        let rendered = tokio::task::spawn_blocking(move || render_to_temp(engine.as_ref(), &owned))
            .await
            .map_err(|e| ServiceError::Synthesis(e.to_string()))
            .and_then(|result| result);

        match rendered {
            Ok(bytes) => {
                info!("Local synthesis produced {} bytes", bytes.len());
                Ok(Audio {
                    bytes,
                    format: AudioFormat::Wav,
                    degraded: false,
                })
            }
            Err(e) => {
                warn!("Local synthesis failed, returning silence: {}", e);
                Ok(Audio {
                    bytes: silent_wav()?,
                    format: AudioFormat::Wav,
                    degraded: true,
                })
            }
        }
    }

    pub async fn list_voices(&self, provider: Option<TtsProvider>) -> Vec<Voice> {
        match self.resolve(provider) {
            TtsProvider::ElevenLabs => ElevenLabs::voices(),
            TtsProvider::Local => {
                let engine = self.local.clone();
                let listed = tokio::task::spawn_blocking(move || engine.voices())
                    .await
                    .map_err(|e| ServiceError::Synthesis(e.to_string()))
                    .and_then(|result| result);
                listed.unwrap_or_else(|e| {
                    warn!("Could not list local voices: {}", e);
                    vec![Voice::new("default", "Default Voice")]
                })
            }
        }
    }
}

/// Run the engine into a temp file and read it back. The file is removed when
/// `file` drops, on success and on every error path.
fn render_to_temp(engine: &dyn SpeechEngine, text: &str) -> Result<Vec<u8>, ServiceError> {
    let file = tempfile::Builder::new()
        .prefix("debate-tts-")
        .suffix(".wav")
        .tempfile()?;
    engine.synthesize_to_file(text, file.path())?;
    let bytes = std::fs::read(file.path())?;
    if bytes.is_empty() {
        return Err(ServiceError::Synthesis("engine wrote an empty file".to_string()));
    }
    Ok(bytes)
}
