//! Operator commands read line by line from stdin.

use jarvis_core::{AssistantEngine, Feedback, PresentationEvent};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};

const HELP: &str =
    "commands: wake | listen | sleep | say <text> | up <n> | down <n> | status | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wake,
    Listen,
    Sleep,
    Say(String),
    Feedback(usize, Feedback),
    Status,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match word.to_ascii_lowercase().as_str() {
        "wake" => Command::Wake,
        "listen" => Command::Listen,
        "sleep" | "stop" => Command::Sleep,
        "say" if !rest.is_empty() => Command::Say(rest.to_string()),
        "up" => Command::Feedback(rest.parse().ok()?, Feedback::Up),
        "down" => Command::Feedback(rest.parse().ok()?, Feedback::Down),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Read commands until `quit` or end of input.
pub async fn run(engine: &AssistantEngine) -> anyhow::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse(&line) else {
            println!("unrecognised command; {HELP}");
            continue;
        };
        let result = match command {
            Command::Wake => engine.wake(),
            Command::Listen => engine.listen(),
            Command::Sleep => engine.shutdown(),
            Command::Say(text) => engine.send_text(text),
            Command::Feedback(index, feedback) => engine.set_feedback(index, feedback),
            Command::Status => {
                println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
                Ok(())
            }
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => break,
        };
        if let Err(e) = result {
            warn!("command failed: {e}");
            break;
        }
    }
    Ok(())
}

/// Print every presentation event as one JSON line.
pub async fn print_events(mut rx: broadcast::Receiver<PresentationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("unprintable event: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                info!(skipped, "presentation output lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
