//! `armview` – interactive viewer shell for a remote robot-arm solver.
//!
//! 1. Loads `~/.armview/config.toml`, writing the defaults on first run.
//! 2. Connects to the configured kinematic service over WebSocket, or falls
//!    back to the built-in fixture service.
//! 3. Starts an [`ArmSession`] (arm state bootstrap + live updates) and drops
//!    the user into a REPL.
//! 4. Ctrl-C stops the REPL and tears the session down.

mod config;
mod fixture;
mod repl;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use armview_middleware::{Transport, WsTransport};
use armview_runtime::ArmSession;
use colored::Colorize;
use tracing::{info, warn};

fn main() {
    let _telemetry = armview_runtime::init_tracing("armview");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing session …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let cfg = load_or_create_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let transport: Arc<dyn Transport> = if cfg.uses_fixture() {
        println!("  Using the {} kinematic service.", "built-in fixture".bold());
        Arc::new(fixture::fixture_transport(&cfg.state_topic))
    } else {
        print!("  Connecting to {} … ", cfg.remote_url.dimmed());
        std::io::stdout().flush().ok();
        match runtime.block_on(WsTransport::connect(&cfg.remote_url)) {
            Ok(ws) => {
                println!("{}", "connected".green());
                Arc::new(ws)
            }
            Err(e) => {
                println!("{}", "failed".red());
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
    };

    let session = {
        let _rt = runtime.enter();
        match ArmSession::start(transport, cfg.store_config()) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("{}: {}", "Failed to start session".red(), e);
                std::process::exit(1);
            }
        }
    };
    info!(settle_ms = cfg.settle_delay_ms, topic = %cfg.state_topic, "session running");

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&runtime, &session, shutdown);

    runtime.block_on(session.shutdown());
}

/// Read the config, writing the defaults when none exists yet.
fn load_or_create_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __ _ _ __ _ __ _____   _(_) _____      __"#.bold().cyan());
    println!("{}", r#"  / _` | '__| '_ ` _ \ \ / / |/ _ \ \ /\ / /"#.bold().cyan());
    println!("{}", r#" | (_| | |  | | | | | \ V /| |  __/\ V  V / "#.bold().cyan());
    println!("{}", r#"  \__,_|_|  |_| |_| |_|\_/ |_|\___| \_/\_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "armview".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robot arm state viewer");
    println!();
}
