use debate_server::{
    config::Settings,
    llm::LlmService,
    router,
    tts::{Espeak, TtsDispatcher},
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let settings = Settings::from_env();

    let level = if settings.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting debate backend on {}", settings.bind_addr());
    info!("CORS origins: {:?}", settings.cors_origins);
    info!("TTS provider: {}", settings.tts_provider);
    if settings.debug {
        warn!("Debug mode enabled: prompts and responses will be logged");
    }

    let upstream = Arc::new(LlmService::new(&settings));
    let engine = Arc::new(Espeak::new(settings.espeak_command.clone()));
    let tts = TtsDispatcher::new(&settings, engine)?;

    let addr = settings.bind_addr();
    let app = router(AppState::new(settings, upstream, tts));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down debate backend");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
