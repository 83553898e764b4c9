//! Story Player: an interactive terminal front-end for the narration coordinator.
//!
//! ## Wiring
//! 1. **Coordinator**: one `PlaybackCoordinator` owns the session store.
//! 2. **Primitive**: a simulated media element runs on its own thread and is driven
//!    through a command channel.
//! 3. **Events**: primitive events are fed to the coordinator's event adapter on the
//!    main loop, interleaved with commands read from stdin.

mod cli;
mod commands;
mod sim;

use std::io::BufRead;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{Receiver, never, select, unbounded};
use story_audio::{
    ChannelPrimitive, CoordinatorConfig, PlaybackCoordinator, PlaybackStatus, media_event_channel,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,story_audio=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(volume) = args.volume {
        config.initial_volume = volume;
    }

    let (cmd_tx, cmd_rx) = unbounded();
    let (events_tx, events_rx) = media_event_channel();
    let _sim = sim::spawn_simulated_primitive(cmd_rx, events_tx, args.sim_config());

    let coordinator = PlaybackCoordinator::new(Arc::new(ChannelPrimitive::new(cmd_tx)), &config);
    let adapter = coordinator.event_adapter();
    let _transitions = coordinator.subscribe({
        let initial = coordinator.snapshot();
        let last = Mutex::new((initial.status, initial.active_story_id));
        move |session| {
            let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
            if session.status != last.0 || session.active_story_id != last.1 {
                tracing::info!(
                    status = ?session.status,
                    story = session.active_story_id.as_deref().unwrap_or("-"),
                    error = session.last_error.as_deref().unwrap_or(""),
                    "playback"
                );
                *last = (session.status, session.active_story_id.clone());
            }
        }
    });

    let for_signal = coordinator.clone();
    let _ = ctrlc::set_handler(move || {
        if let Err(err) = for_signal.stop() {
            tracing::warn!(error = %err, "stop on interrupt failed");
        }
        std::process::exit(130);
    });

    tracing::info!(volume = config.initial_volume, "story player ready; type `help`");
    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;
    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => match commands::parse(&line) {
                    Ok(Some(cmd)) => {
                        if !commands::execute(&coordinator, cmd) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => println!("{msg}"),
                },
                Err(_) => {
                    // stdin closed: let the current story finish, then exit.
                    lines = never();
                    stdin_open = false;
                }
            },
            recv(events_rx) -> event => match event {
                Ok(event) => {
                    adapter.handle(event);
                }
                Err(_) => break,
            },
        }
        if !stdin_open && is_settled(&coordinator) {
            break;
        }
    }

    coordinator.stop()?;
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Nothing is loading or playing.
fn is_settled(coordinator: &PlaybackCoordinator) -> bool {
    !matches!(
        coordinator.snapshot().status,
        PlaybackStatus::Loading | PlaybackStatus::Playing
    )
}
