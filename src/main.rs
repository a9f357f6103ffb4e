use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod error;
mod paths;
mod tts;

use api::routes::{create_router, AppState};
use tts::{MultiSpeakerEngine, TtsService};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "5002".to_string())
        .parse()
        .expect("PORT must be a number");
    let models_dir: PathBuf = std::env::var("MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| paths::default_models_dir());

    std::fs::create_dir_all(&models_dir).expect("Failed to create models directory");

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Speech Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Models directory: {}", models_dir.display());

    // The multi-speaker model loads once, before the listener binds.
    // A configured model that fails to load is fatal.
    let multi_speaker = match std::env::var("MULTI_SPEAKER_MODEL") {
        Ok(path) => {
            tracing::info!("Loading multi-speaker model: {}", path);
            match MultiSpeakerEngine::load(Path::new(&path)) {
                Ok(engine) => {
                    tracing::info!("Loaded {} speakers", engine.speakers().len());
                    Some(Arc::new(engine))
                }
                Err(e) => {
                    tracing::error!("Failed to load multi-speaker model: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(_) => None,
    };

    // Create TTS service
    let tts = TtsService::new(models_dir, multi_speaker);

    // Create app state
    let state = Arc::new(AppState { tts });

    // Create router
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
