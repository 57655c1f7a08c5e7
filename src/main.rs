//! pipetunnel entry point.
//!
//! Loads configuration, applies command-line overrides, starts the
//! tunnel, and waits for a shutdown request: Ctrl-C or the literal line
//! "exit" on standard input.
//!
//! ## Usage
//!
//! - `pipetunnel` or `pipetunnel serve` - run the tunnel (default)
//! - `pipetunnel -private:<name> -published:<name> -sid:<principal>`
//! - `pipetunnel version` / `pipetunnel help`

use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use pipetunnel::shutdown::DrainResult;
use pipetunnel::telemetry::{init_logging, LogConfig};
use pipetunnel::{config, Tunnel, TunnelConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    for arg in &args {
        if arg == "-h" || arg.eq_ignore_ascii_case("--help") || arg == "help" {
            print_usage();
            return ExitCode::SUCCESS;
        }
        if arg == "version" || arg == "--version" || arg == "-V" {
            println!("pipetunnel {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
    }

    serve(&args).await
}

async fn serve(args: &[String]) -> ExitCode {
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("logging init failed: {}", e);
        return ExitCode::FAILURE;
    }

    let mut cfg = config::load();
    if let Err(unknown) = apply_overrides(&mut cfg, args) {
        eprintln!("Unknown argument: {}", unknown);
        print_usage();
        return ExitCode::FAILURE;
    }

    tracing::info!("pipetunnel: {}", cfg.summary());

    let mut tunnel = match Tunnel::new(cfg) {
        Ok(tunnel) => tunnel,
        Err(e) => {
            // Conflicting endpoint names: surface and refuse to listen.
            tracing::error!(error = %e, "refusing to start");
            return ExitCode::FAILURE;
        }
    };

    tunnel.start();

    let exit_requested = CancellationToken::new();
    tokio::spawn(stdin_monitor(exit_requested.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down"),
        _ = exit_requested.cancelled() => tracing::info!("exit requested, shutting down"),
    }

    match tunnel.stop(true).await {
        DrainResult::Complete => tracing::info!("shutdown complete"),
        DrainResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown timeout, sessions still live");
        }
    }

    ExitCode::SUCCESS
}

/// Apply `-option:value` command-line overrides on top of the loaded
/// configuration.
fn apply_overrides(config: &mut TunnelConfig, args: &[String]) -> Result<(), String> {
    for arg in args {
        if arg == "serve" {
            continue;
        }
        if let Some(name) = arg.strip_prefix("-private:") {
            config.private_endpoint_name = name.to_string();
        } else if let Some(name) = arg.strip_prefix("-published:") {
            config.public_endpoint_name = name.to_string();
        } else if let Some(principal) = arg.strip_prefix("-sid:") {
            config.security_principal = Some(principal.to_string());
        } else {
            return Err(arg.clone());
        }
    }
    Ok(())
}

/// Request shutdown when "exit" arrives on standard input. EOF leaves
/// the tunnel running (service-style stdin).
async fn stdin_monitor(exit_requested: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("exit") {
            exit_requested.cancel();
            return;
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "pipetunnel v{} - republish a private local IPC endpoint under a public name

USAGE:
    pipetunnel [COMMAND] [-option:value]...

COMMANDS:
    serve        Run the tunnel (default when no command given)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h | --help                  Show this help message
    -private:[name]              Private endpoint name    default: geth.private.ipc
    -published:[name]            Published endpoint name  default: geth.ipc
    -sid:[principal]             Published endpoint security principal
                                 default: unset ( AuthenticatedUsers )

INTERACTIVE:
    Type \"exit\" (case-insensitive) on standard input, or press Ctrl-C,
    to shut the tunnel down gracefully.

ENVIRONMENT:
    PIPETUNNEL_CONFIG            Config file path (default: pipetunnel.toml)
    PIPETUNNEL_PRIVATE           Private endpoint name
    PIPETUNNEL_PUBLISHED         Published endpoint name
    PIPETUNNEL_SID               Security principal
    PIPETUNNEL_SOCKET_DIR        Unix socket directory (default: /tmp)
    PIPETUNNEL_LOG_FORMAT        \"json\" for structured logs
    RUST_LOG                     Log level (debug, info, warn, error)

EXIT CODES:
    0  Clean shutdown
    1  Startup failure (e.g. private and published names identical)
",
        version
    );
}
