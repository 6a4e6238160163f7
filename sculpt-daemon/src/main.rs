//! Sculpture Control Daemon
//!
//! Loads a sculpture configuration, connects every channel, runs the control
//! loop and takes operator commands on stdin.

mod console;
mod sim;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use sculpt_engine::{
    spawn_control_loop, ControlError, DataChannelManager, EngineEvent, SculptureConfig,
};
use sculpt_link::ConnectionState;
use sculpt_sim::builtin_registry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::{execute, parse_command};
use sim::{virtualize, Simulation};

/// sculptd: drive a sculpture's actuators from a configuration file
#[derive(Parser, Debug)]
#[command(name = "sculptd")]
#[command(version)]
#[command(about = "Pattern playback and safe-mode control for sculpture actuators")]
struct Args {
    /// Sculpture configuration (JSON)
    config: PathBuf,

    /// Replace serial channels with simulated boards
    #[arg(long)]
    dry_run: bool,

    /// Start with safe mode engaged
    #[arg(long)]
    safe: bool,

    /// Pattern to start on launch, as MODULE:PATTERN (repeatable)
    #[arg(long = "start", value_name = "MODULE:PATTERN")]
    start: Vec<String>,
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::FrameSent {
            channel, data, items, ..
        } => trace!("{} <- {} item(s), {} bytes", channel, items, data.len()),
        EngineEvent::TransmitFailed {
            module, channel, ..
        } => debug!("{}: frame refused by {}", module, channel),
        EngineEvent::ItemDropped {
            module,
            address,
            state,
            error,
            ..
        } => warn!("{}: dropped {} = {}: {}", module, address, state, error),
        EngineEvent::ChannelStateChanged {
            channel,
            to: ConnectionState::Failed,
            error,
            ..
        } => warn!(
            "Channel {} failed: {}",
            channel,
            error.as_deref().unwrap_or("unknown error")
        ),
        EngineEvent::ChannelStateChanged { .. } => {}
        EngineEvent::SafeModeChanged { active } => {
            info!("Safe mode {}", if *active { "ENGAGED" } else { "released" })
        }
        EngineEvent::PatternLoaded { module, id, name } => {
            info!("{}: started {} #{}", module, name, id)
        }
        EngineEvent::PatternCleared { module, id } => info!("{}: cleared #{}", module, id),
        EngineEvent::InputChanged { input, value } => debug!("Input {} = {}", input, value),
        EngineEvent::Error { .. } => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sculptd=info,sculpt_engine=info,sculpt_link=info,sculpt_protocol=info,sculpt_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting sculptd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SculptureConfig::from_path(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))?;
    if args.dry_run {
        let replaced = virtualize(&mut config);
        info!("Dry run: {} serial channel(s) simulated", replaced);
    }

    let mut manager = DataChannelManager::load(&config, builtin_registry())
        .context("invalid sculpture configuration")?;
    let mut sim = Simulation::attach(&manager, &config);

    if args.safe {
        manager.toggle_safe_mode();
    }
    for start in &args.start {
        let (module, pattern) = start
            .split_once(':')
            .ok_or_else(|| anyhow!("--start expects MODULE:PATTERN, got '{}'", start))?;
        manager.add_pattern(module, pattern)?;
    }

    let (engine, mut events, task) = spawn_control_loop(manager, 1024);
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut drain = interval(Duration::from_millis(200));
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    println!("sculptd ready, type 'help' for commands");

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(Some(command)) => match execute(command, &engine, &sim).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(ControlError::EngineStopped) => {
                                warn!("Control loop is gone");
                                break;
                            }
                            Err(e) => println!("error: {}", e),
                        },
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    },
                    Ok(None) => {
                        info!("Console closed, running until interrupted");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Console read failed: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = drain.tick(), if !sim.is_empty() => {
                sim.drain();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    engine.shutdown().await;
    task.await.context("control loop panicked")?;
    logger.await.context("event logger panicked")?;
    sim.drain();
    info!("sculptd stopped");
    Ok(())
}
