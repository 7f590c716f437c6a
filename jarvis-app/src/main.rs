//! Jarvis console host.
//!
//! Wires the default device and session adapters into an
//! [`AssistantEngine`], prints presentation events as JSON lines and reads
//! operator commands from stdin.

mod console;
mod settings;
mod speech;

use std::sync::Arc;

use anyhow::Context;
use jarvis_core::{
    event_queue, AssistantEngine, Collaborators, CpalMicrophone, CpalPlayback, EngineConfig,
    NoCaptions, WebSocketTransport,
};
use settings::{default_settings_path, load_settings};
use speech::CommandSpeech;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,jarvis_core=info")),
        )
        .init();

    info!("Jarvis starting");

    let path = default_settings_path();
    let mut settings = load_settings(&path)?;
    settings.apply_env();
    if settings.api_key.is_none() {
        warn!("no API key configured (set GEMINI_API_KEY); wake will fail");
    }

    let (events, queue) = event_queue();

    let output_device = settings.preferred_output_device.clone();
    let sink_events = events.clone();
    let sink = tokio::task::spawn_blocking(move || CpalPlayback::open(output_device, sink_events))
        .await
        .context("output device thread")?
        .context("opening output device")?;
    info!(device_rate = sink.device_rate(), "output ready");

    let collaborators = Collaborators {
        input: Arc::new(CpalMicrophone::new(settings.preferred_input_device.clone())),
        transport: Arc::new(WebSocketTransport::new(settings.live_config())),
        sink: Box::new(sink),
        speech: Box::new(CommandSpeech::new(
            settings.speech_command.clone(),
            settings.speech_args.clone(),
            events.clone(),
        )),
        captions: Box::new(NoCaptions),
    };

    let engine = AssistantEngine::spawn(EngineConfig::default(), collaborators, events, queue);
    let printer = tokio::spawn(console::print_events(engine.subscribe()));

    console::run(&engine).await?;

    engine.terminate().await;
    printer.abort();
    info!("Jarvis stopped");
    Ok(())
}
