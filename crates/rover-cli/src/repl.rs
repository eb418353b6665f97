//! REPL – the rover operator console.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /host [addr]     – show or change the device address
//!   /connect         – connect to the device
//!   /ping            – run the transport health check
//!   /fwd <n>         – set thrust (negative drives backward)
//!   /turn <n>        – set steering (negative turns left)
//!   /reset           – zero both axes and stop the device
//!   /disconnect      – close the connection
//!   /status          – print the current bridge status
//!   /quit | /exit    – disconnect and exit
//!
//! Ctrl-C at the prompt resets the controls before exiting.

use colored::Colorize;
use rover_bridge::MotionBridge;
use rover_types::{Axis, AxisValue, BridgeStatus, ConnectionState, RoverError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::runtime::Runtime;
use tracing::warn;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Host(Option<String>),
    Connect,
    Ping,
    Axis(Axis, f64),
    Reset,
    Disconnect,
    Status,
    Quit,
}

/// Parse one line of input.  `Err` carries a message for the operator.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "/help" => Ok(ReplCommand::Help),
        "/host" if arg.is_empty() => Ok(ReplCommand::Host(None)),
        "/host" => Ok(ReplCommand::Host(Some(arg.to_string()))),
        "/connect" => Ok(ReplCommand::Connect),
        "/ping" => Ok(ReplCommand::Ping),
        "/fwd" => parse_value(arg).map(|v| ReplCommand::Axis(Axis::Longitudinal, v)),
        "/turn" => parse_value(arg).map(|v| ReplCommand::Axis(Axis::Lateral, v)),
        "/reset" => Ok(ReplCommand::Reset),
        "/disconnect" => Ok(ReplCommand::Disconnect),
        "/status" => Ok(ReplCommand::Status),
        "/quit" | "/exit" => Ok(ReplCommand::Quit),
        other => Err(format!("Unknown command: '{other}'")),
    }
}

fn parse_value(arg: &str) -> Result<f64, String> {
    if arg.is_empty() {
        return Err(format!(
            "expected a value between {} and {}",
            AxisValue::MIN,
            AxisValue::MAX
        ));
    }
    arg.parse::<f64>()
        .map_err(|_| format!("'{arg}' is not a number"))
}

/// Entry point for the interactive REPL.  Returns when the operator quits.
pub fn run(runtime: &Runtime, bridge: &MotionBridge) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };
    let prompt = format!("{} ", "rover>".bold().cyan());

    loop {
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "⚠  Ctrl-C – resetting controls …".yellow().bold());
                let message = runtime.block_on(bridge.reset());
                println!("  {} {}", "✓".green(), message);
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(line) {
            warn!(error = %e, "history unavailable");
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}. Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };

        match command {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Host(None) => println!("  Host: {}", bridge.host().bold()),
            ReplCommand::Host(Some(addr)) => {
                bridge.set_host(addr);
                println!("  Host set to {}", bridge.host().bold());
            }
            ReplCommand::Connect => match runtime.block_on(bridge.connect()) {
                Ok(state) => println!("  {} {}", "●".green(), format_state(&state)),
                Err(e) => report(&e),
            },
            ReplCommand::Ping => report_outcome(runtime.block_on(bridge.test_connection())),
            ReplCommand::Axis(axis, value) => {
                report_outcome(runtime.block_on(bridge.set_axis(axis, value)))
            }
            ReplCommand::Reset => println!("  {}", runtime.block_on(bridge.reset()).green()),
            ReplCommand::Disconnect => {
                runtime.block_on(bridge.disconnect());
                println!("  {}", "Disconnected".yellow());
            }
            ReplCommand::Status => print_status(&bridge.status()),
            ReplCommand::Quit => {
                runtime.block_on(bridge.disconnect());
                println!("{}", "Goodbye.".green());
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Rover Commands".bold().underline());
    println!("  {}     – show or change the device address", "/host [addr]".bold().cyan());
    println!("  {}         – connect to the device", "/connect".bold().cyan());
    println!("  {}            – health check", "/ping".bold().cyan());
    println!("  {}         – thrust, -250..250 (step 50)", "/fwd <n>".bold().cyan());
    println!("  {}        – steering, -250..250 (step 50)", "/turn <n>".bold().cyan());
    println!("  {}           – zero both axes and stop", "/reset".bold().cyan());
    println!("  {}      – close the connection", "/disconnect".bold().cyan());
    println!("  {}          – show bridge status", "/status".bold().cyan());
    println!("  {}    – exit the console", "/quit  /exit".bold().cyan());
    println!();
}

fn report_outcome(outcome: Result<String, RoverError>) {
    match outcome {
        Ok(message) => println!("  {}", message.green()),
        Err(e) => report(&e),
    }
}

fn report(error: &RoverError) {
    println!("  {}: {}", "Error".red().bold(), error);
}

pub(crate) fn format_state(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Connected => state.to_string().green().to_string(),
        ConnectionState::Connecting => state.to_string().yellow().to_string(),
        ConnectionState::Disconnected => state.to_string().dimmed().to_string(),
        ConnectionState::Error(_) => state.to_string().red().to_string(),
    }
}

fn print_status(status: &BridgeStatus) {
    println!("{}", "Bridge Status".bold().underline());
    println!("  Connection : {}", format_state(&status.connection));
    println!("  Transport  : {}", status.transport.to_string().yellow());
    println!("  Host       : {}", status.host.bold());
    println!("  Thrust     : {}", status.forward_backward);
    println!("  Steering   : {}", status.left_right);
    println!("  Last       : {}", status.status_message.dimmed());
}
