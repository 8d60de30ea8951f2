mod audio;
mod catalog;
mod clock;
mod config;
mod engine;
mod error;
mod input;
mod messages;
mod render;
mod services;
mod waveform;

use audio::AudioFormat;
use catalog::DirectoryCatalog;
use config::Config;
use engine::{AudioEngine, NativeEngine};
use input::Input;
use messages::UserAction;
use services::{SessionCoordinator, SessionSettings};

use anyhow::Result;
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout belongs to the rendered view
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxmemo=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting voxmemo");

    let config = Config::load()?;
    config.validate()?;

    // cpal and rodio streams are !Send, so every session task lives on a LocalSet
    let local = tokio::task::LocalSet::new();

    local.run_until(async move { run_app(config).await }).await
}

async fn run_app(config: Config) -> Result<()> {
    let format = AudioFormat::new(config.sample_rate, config.channels);
    let engine: Rc<dyn AudioEngine> = Rc::new(NativeEngine::new(format));
    let catalog = DirectoryCatalog::new(
        config.recordings_dir.clone(),
        config.audio_extensions.clone(),
    );
    tracing::info!("Recordings directory: {}", catalog.dir().display());

    let (coordinator, events) =
        SessionCoordinator::new(engine, Box::new(catalog), SessionSettings::from(&config));
    let (session, session_task) = coordinator.spawn(events);

    if let Err(e) = session.dispatch(UserAction::Refresh).await {
        tracing::warn!("Initial catalog load failed: {}", e);
    }

    let presenter = render::presenter_for(config.presentation);
    tokio::task::spawn_local(render::render_views(session.subscribe(), presenter));

    let (input_tx, mut input_rx) = mpsc::channel(10);
    // Detached: a thread parked on a stdin read does not hold up process exit
    input::spawn_stdin_reader(input_tx);

    tracing::info!("Ready! Type 'help' for commands");

    loop {
        tokio::select! {
            received = input_rx.recv() => match received {
                Some(Input::Action(UserAction::Shutdown)) | None => break,
                Some(Input::Action(action)) => {
                    // Rejected transitions are already logged by the controllers
                    match session.dispatch(action).await {
                        Err(e) if !e.is_invalid_transition() => tracing::warn!("{}", e),
                        _ => {}
                    }
                }
                Some(Input::Help) => eprintln!("{}", input::HELP),
                Some(Input::Invalid(message)) => tracing::warn!("{}", message),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    if let Err(e) = session.dispatch(UserAction::Shutdown).await {
        tracing::error!("Error stopping the active session: {}", e);
    }
    session_task.await?;

    tracing::info!("voxmemo shutdown complete");
    Ok(())
}
