//! Airwave engine - main entry point
//!
//! Wires the providers, pipeline, and transition engine together and serves
//! the HTTP/SSE surface the player shim talks to.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airwave_common::config::TomlConfig;
use airwave_common::events::EventBus;
use airwave_engine::api;
use airwave_engine::engine::TransitionEngine;
use airwave_engine::pipeline::GenerationPipeline;
use airwave_engine::playback::{AnnouncementPlayer, RodioSink};
use airwave_engine::providers::{
    BusMediaController, ChannelObserver, InMemorySettings, LocalServerGenerator,
    LocalServerSynthesizer, RemoteGenerator, RemoteSynthesizer, Settings, SpeechSynthesizer,
};
use airwave_engine::state::SharedState;

/// Command-line arguments for the Airwave engine
#[derive(Parser, Debug)]
#[command(name = "airwave-engine")]
#[command(about = "DJ transition announcement engine")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "AIRWAVE_PORT")]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "AIRWAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        TomlConfig::load_or_default(args.config.as_deref()).context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("airwave_engine={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.unwrap_or(config.port);
    info!("Starting Airwave engine on port {}", port);

    let event_bus = EventBus::new(256);
    let state = SharedState::new(event_bus.clone());

    // Every available provider is registered; the settings snapshot taken
    // at transition start picks among them, so the endpoints can switch
    // providers for new transitions without a restart. Local is the default
    // for any unknown selection.
    let local_generator = Arc::new(
        LocalServerGenerator::from_config(&config.providers)
            .context("building local text provider")?,
    );
    let local_synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(
        LocalServerSynthesizer::from_config(&config.providers)
            .context("building local speech provider")?,
    );

    let mut pipeline = GenerationPipeline::new(
        local_generator,
        Arc::clone(&local_synthesizer),
        config.engine.cache_ttl(),
    );

    let wants_remote = config.providers.text_provider == "remote"
        || config.providers.speech_provider == "remote";
    if wants_remote || config.providers.remote_api_key.is_some() {
        pipeline = pipeline
            .with_text_provider(Arc::new(
                RemoteGenerator::from_config(&config.providers)
                    .context("building remote text provider")?,
            ))
            .with_speech_provider(Arc::new(
                RemoteSynthesizer::from_config(&config.providers)
                    .context("building remote speech provider")?,
            ));
    }
    let pipeline = Arc::new(pipeline);

    // With a remote synthesizer selected, the local server doubles as a
    // fallback voice when the remote one fails.
    let fallback_synth: Option<Arc<dyn SpeechSynthesizer>> =
        if config.providers.speech_provider == "remote" {
            Some(local_synthesizer)
        } else {
            None
        };
    let _sweeper = pipeline.spawn_sweeper(Duration::from_secs(60));

    let media = Arc::new(BusMediaController::new(event_bus.clone()));
    let player = Arc::new(AnnouncementPlayer::new(Arc::new(RodioSink::new())));
    let settings = InMemorySettings::new(Settings {
        enabled: true,
        text_provider: config.providers.text_provider.clone(),
        speech_provider: config.providers.speech_provider.clone(),
    });

    let (observer_tx, observer) = ChannelObserver::new(64);
    let (engine, handle) = TransitionEngine::new(
        config.engine.clone(),
        Arc::clone(&state),
        Arc::clone(&pipeline),
        media,
        player,
        settings.clone(),
        fallback_synth,
        Box::new(observer),
    );
    let _engine_task = engine.spawn();
    info!("Transition engine started");

    let app_state = api::AppState {
        engine: handle.clone(),
        observer_tx,
        settings,
        pipeline,
    };
    let app = api::router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    handle.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
