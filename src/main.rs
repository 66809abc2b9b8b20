use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use voice_warden::{
    create_router, AppState, Config, JsonThresholdStore, NatsActuator, NatsClient, NatsGateway,
    SessionRegistry, StreamRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "voice-warden", about = "Loudness moderation for group voice channels")]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/voice-warden")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Frame codec: {:?}", cfg.audio.codec);
    // Fail at startup rather than on every stream
    cfg.audio.codec.decoder()?;

    let thresholds = Arc::new(JsonThresholdStore::open(&cfg.thresholds.path).await?);

    let nats = Arc::new(NatsClient::connect(&cfg.nats.url).await?);
    let gateway = Arc::new(NatsGateway::new(Arc::clone(&nats)));
    let actuator = Arc::new(NatsActuator::new(Arc::clone(&nats)));

    let streams = StreamRegistry::spawn(cfg.audio.codec, thresholds.clone(), actuator.clone());
    let sessions = SessionRegistry::spawn(gateway, streams, actuator);

    let app = create_router(AppState::new(sessions.clone(), thresholds));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, leaving voice channels");
    match sessions.stop_all().await {
        Ok(stopped) => info!("Stopped {} monitoring sessions", stopped),
        Err(e) => error!("Failed to stop monitoring sessions: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
