//! Lexy - conversational assistant core
//!
//! Owns one chat session: streams replies from the remote chat model,
//! keeps a rolling memory of past topics, synthesizes speech for replies
//! and exposes it all to a presentation layer over a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audio;
mod config;
mod conversation;
mod core;
mod providers;
mod routes;
mod settings;
mod voice;

use audio::AudioPlayer;
use config::{Config, PersonaTemplate};
use crate::core::Session;
use settings::SettingsStore;
use voice::VoiceCapture;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub voice: Arc<VoiceCapture>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Settings are read once; every later change is written back
    let store = Arc::new(SettingsStore::new(&config.data_dir.join("lexy.db")).await?);
    let settings = store.load().await;
    tracing::info!(
        theme = ?settings.theme,
        memory_nodes = settings.memory_nodes.len(),
        "⚙️ settings loaded"
    );

    let persona = match config.client.persona.file {
        Some(ref path) => PersonaTemplate::load_from_file(path).await?,
        None => PersonaTemplate::builtin(),
    };

    let gemini = Arc::new(providers::gemini_from_config(&config)?);

    #[cfg(feature = "playback")]
    let player = Arc::new(AudioPlayer::device());
    #[cfg(not(feature = "playback"))]
    let player = Arc::new(AudioPlayer::silent());

    let session = Session::new(gemini.clone(), settings)
        .with_speech(gemini)
        .with_player(player)
        .with_persona(persona)
        .with_store(store.clone());

    // No speech recognition is available to a headless host
    let voice = VoiceCapture::new(None);
    if !voice.is_available() {
        tracing::info!("voice capture unavailable on this host");
    }

    let state = AppState {
        session: Arc::new(session),
        voice: Arc::new(voice),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🔥 Lexy online at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("Lexy offline");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
}
