//! `motorlink` – UDP motor bridge.
//!
//! `motorlink run` loads `~/.motorlink/config.toml`, connects the drive base,
//! and serves commands until **Ctrl-C**, after which the motors are braked
//! and released.  `motorlink send` is a one-shot peer for testing a running
//! bridge from the same or another machine.

mod config;
mod send;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, warn};

use motorlink_middleware::{BridgeEngine, EventBus, shutdown_channel};
use motorlink_types::MotorlinkError;

#[derive(Parser)]
#[command(name = "motorlink", version, about = "UDP command bridge for a two-motor drive base")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve commands until Ctrl-C.
    Run {
        /// Config file (default `~/.motorlink/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen port, overriding the config file and environment.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send one command and print the sensor reply.
    Send {
        /// Action code (0-4) or name (stop, forward, left, right, backward).
        action: String,
        #[arg(long, default_value = "127.0.0.1:5000")]
        target: SocketAddr,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, port } => run(config, port),
        Command::Send { action, target } => send(&action, target),
    }
}

fn run(config_path: Option<PathBuf>, port: Option<u16>) -> ExitCode {
    let first_run = config_path.is_none() && !config::config_path().exists();
    let path = config_path.unwrap_or_else(config::config_path);
    if first_run {
        match config::save_to(&config::Config::default(), &path) {
            Ok(()) => println!("  Wrote default config to {}", path.display().to_string().bold()),
            Err(e) => eprintln!("{}: {e}", "Could not write default config".yellow()),
        }
    }
    let mut cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = port {
        cfg.udp_port = port;
    }

    // Tracing first: the OTLP exporter must exist before the runtime.
    let telemetry = telemetry::init_tracing("motorlink", cfg.log_dir.as_deref());
    print_banner();
    info!(config = %path.display(), ?cfg, "configuration loaded");
    if let Some(file) = telemetry.log_file() {
        println!("  Session log: {}", file.display().to_string().bold());
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&cfg)) {
        Ok(()) => {
            println!("{}", "  ✓ Motors stopped and released.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "bridge terminated");
            eprintln!("{}: {e}", "Bridge error".red());
            ExitCode::FAILURE
        }
    }
}

async fn serve(cfg: &config::Config) -> Result<(), MotorlinkError> {
    let (base, _probe) = cfg.sim_device().build()?;

    let engine = BridgeEngine::bind(cfg.bridge(), base, EventBus::default()).await?;
    println!(
        "  Listening on {}  (timeout {} ms)\n",
        engine.local_addr().to_string().bold(),
        cfg.timeout_ms
    );

    let (trigger, signal) = shutdown_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motors …".yellow().bold());
        trigger.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the bridge by killing the process");
    }

    engine.run(signal).await
}

fn send(action: &str, target: SocketAddr) -> ExitCode {
    let _telemetry = telemetry::init_tracing("motorlink", None);

    let action = match send::parse_action(action) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{}: {e}", "Invalid action".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Runtime error".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(send::send_command(target, action, send::REPLY_WAIT)) {
        Ok(Some(snapshot)) => {
            println!("{} {} → {}", "✓".green().bold(), action, target);
            println!("  angular position  {:>8.2}", snapshot.angular_position);
            println!("  angular rate      {:>8.2}", snapshot.angular_rate);
            println!("  front contact     {:>8}", format!("{:?}", snapshot.front_contact));
            println!("  side contact      {:>8}", format!("{:?}", snapshot.side_contact));
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!(
                "{} no reply from {} within {} ms",
                "✗".yellow().bold(),
                target,
                send::REPLY_WAIT.as_millis()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}: {e}", "Send failed".red());
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___     __           ___      __  "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  / /____  ____/ (_)__  / /__"#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ __/ _ \/ __/ / / _ \/  '_/"#.bold().cyan());
    println!("{}", r#"/_/  /_/\___/\__/\___/_/ /_/_/_//_/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "motorlink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  UDP motor bridge");
    println!();
}
