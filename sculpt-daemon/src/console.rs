//! Operator console
//!
//! One command per stdin line. Parsing is separate from execution so the
//! grammar can be tested without an engine.

use sculpt_engine::{ControlError, EngineHandle, EngineStatus, PatternId, RawSignal};
use sculpt_link::list_ports;
use thiserror::Error;

use crate::sim::Simulation;

pub const HELP: &str = "\
commands:
  status                              channels, modules, inputs
  safe                                toggle safe mode
  patterns                            pattern types each module accepts
  add <module> <pattern>              start a pattern
  clear <module> <id>                 stop a pattern
  row <module> <id> <row>             toggle one grid row of a pattern
  input <input> <on|off|pulse|N>      drive an input by name or id
  bind <module> <id> <param> <input>  point a pattern parameter at an input
  reconnect <channel>                 drop and reopen a channel
  ports                               serial ports on this machine
  boards                              simulated board state
  quit";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    BadNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Safe,
    Patterns,
    Add { module: String, pattern: String },
    Clear { module: String, id: PatternId },
    Row { module: String, id: PatternId, row: u16 },
    Input { input: String, signal: RawSignal },
    Bind { module: String, id: PatternId, param: String, input: String },
    Reconnect { channel: String },
    Ports,
    Boards,
    Help,
    Quit,
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, ConsoleError> {
    word.parse()
        .map_err(|_| ConsoleError::BadNumber(word.to_string()))
}

fn signal(word: &str) -> Result<RawSignal, ConsoleError> {
    match word {
        "on" | "true" => Ok(RawSignal::Switch(true)),
        "off" | "false" => Ok(RawSignal::Switch(false)),
        "pulse" | "press" => Ok(RawSignal::Press),
        other => number(other).map(RawSignal::Number),
    }
}

/// Parse one line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>, ConsoleError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (name, args) {
        ("status", []) => Command::Status,
        ("safe", []) => Command::Safe,
        ("patterns", []) => Command::Patterns,
        ("ports", []) => Command::Ports,
        ("boards", []) => Command::Boards,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,

        ("add", [module, pattern]) => Command::Add {
            module: module.to_string(),
            pattern: pattern.to_string(),
        },
        ("add", _) => return Err(ConsoleError::Usage("add <module> <pattern>")),

        ("clear", [module, id]) => Command::Clear {
            module: module.to_string(),
            id: PatternId(number(id)?),
        },
        ("clear", _) => return Err(ConsoleError::Usage("clear <module> <id>")),

        ("row", [module, id, row]) => Command::Row {
            module: module.to_string(),
            id: PatternId(number(id)?),
            row: number(row)?,
        },
        ("row", _) => return Err(ConsoleError::Usage("row <module> <id> <row>")),

        ("input", [input, value]) => Command::Input {
            input: input.to_string(),
            signal: signal(value)?,
        },
        ("input", _) => return Err(ConsoleError::Usage("input <input> <on|off|pulse|N>")),

        ("bind", [module, id, param, input]) => Command::Bind {
            module: module.to_string(),
            id: PatternId(number(id)?),
            param: param.to_string(),
            input: input.to_string(),
        },
        ("bind", _) => return Err(ConsoleError::Usage("bind <module> <id> <param> <input>")),

        ("reconnect", [channel]) => Command::Reconnect {
            channel: channel.to_string(),
        },
        ("reconnect", _) => return Err(ConsoleError::Usage("reconnect <channel>")),

        (other, _) => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

/// Human-readable lines for `status`
pub fn format_status(status: &EngineStatus) -> Vec<String> {
    let mut lines = vec![format!(
        "sculpture '{}', safe mode {}",
        status.name,
        if status.safe_mode { "ON" } else { "off" }
    )];

    for channel in &status.channels {
        let mut line = format!(
            "channel {} [{}]: {} ({} frames, {} bytes, {} failed)",
            channel.id,
            channel.settings.describe(),
            channel.state.name(),
            channel.frames_sent,
            channel.bytes_sent,
            channel.failed_writes
        );
        if let Some(error) = &channel.last_error {
            line.push_str(&format!(" last error: {}", error));
        }
        lines.push(line);
    }

    for module in &status.modules {
        lines.push(format!(
            "module {} ({}): {}/{} active",
            module.id,
            module.class,
            module.active_items(),
            module.output.len()
        ));
        for pattern in &module.patterns {
            let off: Vec<String> = pattern
                .rows
                .iter()
                .enumerate()
                .filter(|(_, enabled)| !**enabled)
                .map(|(row, _)| row.to_string())
                .collect();
            let mut line = format!("  #{} {}", pattern.id, pattern.name);
            if !off.is_empty() {
                line.push_str(&format!(" (rows off: {})", off.join(",")));
            }
            lines.push(line);
        }
    }

    for input in &status.inputs {
        lines.push(format!(
            "input {} '{}' ({}): {}{}, {} user(s)",
            input.id,
            input.name,
            input.kind,
            input.value,
            if input.persistent { ", persistent" } else { "" },
            input.users
        ));
    }
    lines
}

/// Run one command; returns `false` when the console should exit
pub async fn execute(
    command: Command,
    engine: &EngineHandle,
    sim: &Simulation,
) -> Result<bool, ControlError> {
    match command {
        Command::Status => {
            let status = engine.status().await?;
            for line in format_status(&status) {
                println!("{}", line);
            }
        }
        Command::Safe => {
            let active = engine.toggle_safe_mode().await?;
            println!("safe mode {}", if active { "ON" } else { "off" });
        }
        Command::Patterns => {
            for module in engine.status().await?.modules {
                println!("{}: {}", module.id, module.available.join(", "));
            }
        }
        Command::Add { module, pattern } => {
            let id = engine.add_pattern(&module, &pattern).await?;
            println!("{} #{} started on {}", pattern, id, module);
        }
        Command::Clear { module, id } => {
            engine.clear_pattern(&module, id).await?;
            println!("#{} cleared from {}", id, module);
        }
        Command::Row { module, id, row } => {
            let enabled = engine.toggle_pattern_row(&module, id, row).await?;
            println!("#{} row {} {}", id, row, if enabled { "on" } else { "off" });
        }
        Command::Input { input, signal } => {
            let value = engine.set_input(&input, signal).await?;
            println!("{} = {}", input, value);
        }
        Command::Bind { module, id, param, input } => {
            let bound = engine.bind_input(&module, id, &param, &input).await?;
            println!("#{} {} -> input {}", id, param, bound);
        }
        Command::Reconnect { channel } => {
            engine.reconnect(&channel).await?;
            println!("{} reconnected", channel);
        }
        Command::Ports => match list_ports() {
            Ok(ports) if ports.is_empty() => println!("no serial ports found"),
            Ok(ports) => {
                for port in ports {
                    match port.product {
                        Some(product) => println!("{} ({})", port.name, product),
                        None => println!("{}", port.name),
                    }
                }
            }
            Err(e) => println!("cannot list ports: {}", e),
        },
        Command::Boards => {
            let lines = sim.summary();
            if lines.is_empty() {
                println!("no simulated boards");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}
