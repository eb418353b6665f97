//! `rover` – operator console for a networked rover.
//!
//! 1. Reads `~/.rover/config.toml` and `ROVER_*` overrides.
//! 2. Builds a [`MotionBridge`] for the configured transport.
//! 3. Drops the operator into an interactive REPL with slash-commands.
//! 4. Intercepts Ctrl-C to stop and center the rover before exiting.

mod config;
mod repl;

use std::sync::Arc;

use colored::Colorize;
use rover_bridge::MotionBridge;
use rover_bridge::telemetry::init_tracing;
use rover_transport::TopicReceiver;
use rover_types::{ConnectionState, EventPayload};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

fn main() {
    let _tracing = init_tracing("rover");

    print_banner();

    let cfg = match config::resolve() {
        Ok(cfg) => {
            let path = config::config_path();
            if path.exists() {
                println!("  Config loaded from {}", path.display().to_string().bold());
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = rover_bridge::BridgeConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let bridge = match runtime.block_on(async { MotionBridge::from_config(&cfg) }) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            eprintln!("{}: {}", "Failed to build motion bridge".red(), e);
            std::process::exit(1);
        }
    };
    info!(transport = %cfg.transport, host = %cfg.host, "console ready");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Outside the prompt (e.g. while a request is in flight) the signal
    // arrives here instead of as a readline interrupt.
    let handle = runtime.handle().clone();
    let ctrlc_bridge = Arc::clone(&bridge);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        let message = handle.block_on(ctrlc_bridge.reset());
        println!("  {} {}", "✓".green(), message);
        println!("{}", "  ✓ Exiting rover.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the rover will not be stopped on Ctrl-C");
    }

    runtime.spawn(watch_connection(bridge.subscribe()));

    println!("  Transport: {}   Host: {}", cfg.transport.to_string().yellow(), cfg.host.bold());
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&runtime, &bridge);
}

/// Print connection changes the operator did not ask for, such as the device
/// hanging up.
async fn watch_connection(mut status: TopicReceiver) {
    let mut last = ConnectionState::Disconnected;
    loop {
        match status.recv().await {
            Ok(event) => {
                if let EventPayload::Status(snapshot) = event.payload {
                    if snapshot.connection != last {
                        if matches!(snapshot.connection, ConnectionState::Disconnected | ConnectionState::Error(_))
                            && last == ConnectionState::Connected
                        {
                            println!(
                                "\n  {} {}",
                                "●".red(),
                                repl::format_state(&snapshot.connection)
                            );
                        }
                        last = snapshot.connection;
                    }
                }
            }
            Err(RecvError::Lagged(n)) => warn!(lagged_by = n, "status watcher lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ____                        "#.bold().cyan());
    println!("{}", r#"  / __ \____ _   _____  _____  "#.bold().cyan());
    println!("{}", r#" / /_/ / __ \ | / / _ \/ ___/  "#.bold().cyan());
    println!("{}", r#"/ _, _/ /_/ / |/ /  __/ /      "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/       "#.bold().cyan());
    println!();
    println!("  {} {}",
        "rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Two-axis remote control console");
    println!();
}
