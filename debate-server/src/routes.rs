use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use debate_shared::{
    DebateRequest, ErrorResponse, GenerateResponse, HealthResponse, TtsProvider, TtsRequest,
    VoicesResponse,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, ServiceError};
use crate::relay::Relay;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/debate/stream", post(debate_stream))
        .route("/api/debate/generate", post(debate_generate))
        .route("/api/tts/generate", post(tts_generate))
        .route("/api/tts/voices", get(tts_voices))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request());

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// A failed non-streaming call, rendered as `{"detail": "<context> error: ..."}`.
pub struct ApiError {
    context: &'static str,
    source: ServiceError,
}

impl ApiError {
    fn new(context: &'static str) -> impl FnOnce(ServiceError) -> Self {
        move |source| Self { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.source.kind() {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = format!("{} error: {}", self.context, self.source);
        if status.is_server_error() {
            error!("{}", detail);
        } else {
            warn!("{}", detail);
        }
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Always answers with an event stream; invalid requests become its single
/// error event.
async fn debate_stream(
    State(state): State<AppState>,
    Json(request): Json<DebateRequest>,
) -> impl IntoResponse {
    let rx = match request.validate() {
        Ok(()) => {
            let model = request.model_or(&state.settings.default_model).to_string();
            let temperature = request.temperature();
            state.relay.start(request.messages, model, temperature)
        }
        Err(e) => Relay::reject(ServiceError::InvalidRequest(e)),
    };

    let events = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(event));

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Sse::new(events),
    )
}

async fn debate_generate(
    State(state): State<AppState>,
    Json(request): Json<DebateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let wrap = ApiError::new("Generation");
    if let Err(e) = request.validate() {
        return Err(wrap(ServiceError::InvalidRequest(e)));
    }

    let model = request.model_or(&state.settings.default_model).to_string();
    let temperature = request.temperature();
    info!("Generating with {} from {} messages", model, request.messages.len());

    match state
        .relay
        .upstream()
        .generate(request.messages, &model, temperature)
        .await
    {
        Ok(content) => Ok(Json(GenerateResponse { content })),
        Err(e) => Err(wrap(e)),
    }
}

async fn tts_generate(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    let audio = state
        .tts
        .synthesize(&request.text, request.voice_id.as_deref(), request.provider)
        .await
        .map_err(ApiError::new("TTS"))?;

    let disposition = format!("attachment; filename=audio.{}", audio.format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, audio.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        audio.bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct VoicesQuery {
    provider: Option<TtsProvider>,
}

async fn tts_voices(
    State(state): State<AppState>,
    Query(query): Query<VoicesQuery>,
) -> Json<VoicesResponse> {
    Json(VoicesResponse {
        voices: state.tts.list_voices(query.provider).await,
    })
}
