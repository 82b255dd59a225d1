//! Voice Client Application
//!
//! Streams the microphone to a speech service and plays its replies.
//! Type `start`, `stop`, `interrupt` or `quit` on stdin.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_duplex_client::{
    audio::{list_devices, CpalCapture, CpalPlayback},
    config::AppConfig,
    network::WsTransport,
    session::{Command, Notice, SessionController},
};

/// Duplex voice client with barge-in playback
#[derive(Parser)]
#[command(name = "voice-client", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "VOICE_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Speech service WebSocket URL, overriding the configuration
    #[arg(short, long, env = "VOICE_CLIENT_ENDPOINT")]
    endpoint: Option<String>,

    /// Print audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
        config.validate().context("invalid --endpoint")?;
    }

    let audio = &config.audio;
    let capture = CpalCapture::new(audio.capture_device.clone());
    let playback = CpalPlayback::new(audio.playback_device.clone(), audio.output_sample_rate, audio.playback_gain);
    let transport = WsTransport::new(config.endpoint.clone());
    tracing::info!(endpoint = transport.endpoint(), "Starting voice client");

    let (controller, inbox) = SessionController::new(capture, playback, transport, audio);
    let commands = inbox.commands();

    tokio::spawn(print_notices(controller.subscribe()));

    // Blocking stdin reads stay off the runtime so shutdown never waits on them
    let stdin_commands = commands.clone();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                let command = match line.trim() {
                    "start" | "s" => Command::Start,
                    "stop" | "x" => Command::Stop,
                    "interrupt" | "i" => Command::Interrupt,
                    "quit" | "q" => Command::Shutdown,
                    "" => continue,
                    other => {
                        println!("unknown command {other:?} (start, stop, interrupt, quit)");
                        continue;
                    }
                };
                let shutdown = command == Command::Shutdown;
                if stdin_commands.send(command).is_err() || shutdown {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            let _ = commands.send(Command::Shutdown);
        }
    });

    println!("Commands: start, stop, interrupt, quit");
    controller.run(inbox).await;

    tracing::info!("Voice client stopped");
    Ok(())
}

async fn print_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(Notice::State(state)) => println!("[{state}]"),
            Ok(Notice::Text(event)) => {
                println!("{} {}", event.received_at.format("%H:%M:%S"), event.text)
            }
            Ok(Notice::Error(cause)) => println!("error: {cause}"),
            Ok(Notice::Interrupted { discarded }) => {
                println!("playback interrupted ({discarded} queued chunks dropped)")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notice subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}
