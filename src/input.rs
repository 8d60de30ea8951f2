use crate::messages::UserAction;
use anyhow::{Context, Result};
use std::io::BufRead;
use tokio::sync::mpsc;

pub const HELP: &str = "\
commands:
  record            start a new recording (ends playback)
  pause | resume    pause or resume the active session
  stop              stop the active session
  play <n>          play recording number <n> from the list
  toggle            pause/resume playback, or replay the selection
  close             close the playback panel
  list              reload the recordings list
  quit              stop everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Action(UserAction),
    Help,
    Invalid(String),
}

/// Parse one line of user input. Recording numbers are 1-based as listed.
pub fn parse_command(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_ascii_lowercase();
    let argument = words.next();

    let action = match command.as_str() {
        "record" | "r" => UserAction::Record,
        "pause" => UserAction::Pause,
        "resume" => UserAction::Resume,
        "stop" | "s" => UserAction::Stop,
        "toggle" | "t" => UserAction::TogglePlayback,
        "close" | "c" => UserAction::CloseModal,
        "list" | "refresh" | "l" => UserAction::Refresh,
        "quit" | "exit" | "q" => UserAction::Shutdown,
        "help" | "?" => return Some(Input::Help),
        "play" | "p" => match argument.map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => UserAction::Play(n - 1),
            _ => return Some(Input::Invalid("usage: play <n> (n starts at 1)".to_string())),
        },
        other => return Some(Input::Invalid(format!("unknown command: {}", other))),
    };

    Some(Input::Action(action))
}

/// Read commands from stdin on a dedicated thread
///
/// A blocked stdin read cannot be cancelled, so it stays off the runtime:
/// the process exits on `quit` without waiting for another line.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Input>) {
    std::thread::spawn(move || {
        if let Err(e) = forward_lines(std::io::stdin().lock(), &tx) {
            tracing::error!("Input monitor failed: {:#}", e);
        }
    });
}

/// Forward parsed commands until the reader ends or the receiver goes away.
/// Must not be called from within the async runtime.
fn forward_lines(reader: impl BufRead, tx: &mpsc::Sender<Input>) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read stdin")?;
        let Some(input) = parse_command(&line) else {
            continue;
        };
        tracing::debug!("Input: {:?}", input);
        if tx.blocking_send(input).is_err() {
            break;
        }
    }

    tracing::debug!("Input monitor exited");
    Ok(())
}
