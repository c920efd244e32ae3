//! Debate relay backend: streams chat completions as server-sent events and
//! turns text into speech.

pub mod config;
pub mod error;
pub mod llm;
pub mod relay;
pub mod routes;
pub mod tts;

use std::sync::Arc;

use crate::config::Settings;
use crate::llm::ChatCompletion;
use crate::relay::Relay;
use crate::tts::TtsDispatcher;

pub use crate::error::ServiceError;
pub use crate::routes::router;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub relay: Relay,
    pub tts: Arc<TtsDispatcher>,
}

impl AppState {
    pub fn new(settings: Settings, upstream: Arc<dyn ChatCompletion>, tts: TtsDispatcher) -> Self {
        let relay = Relay::new(upstream, settings.upstream_timeout);
        Self {
            settings: Arc::new(settings),
            relay,
            tts: Arc::new(tts),
        }
    }
}
