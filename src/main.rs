//! Entry point for **hyprmate**.
//!
//! Without a command the binary runs the daemon: it loads the
//! configuration, starts the orchestrator and spawns the two
//! [`Source`](hyprmate::traits::Source)s feeding it (the Hyprland event
//! stream and the control socket) on a single-threaded tokio runtime.
//!
//! With a command (`hyprmate toggle term`) it acts as a client of the
//! running daemon, exactly like `hyprmatectl`.

use clap::Parser;
use hyprmate::command::ExitCode;
use hyprmate::config::{self, Config};
use hyprmate::hyprland::events::EventStream;
use hyprmate::hyprland::ipc::HyprlandIpc;
use hyprmate::ipc::listener::ControlListener;
use hyprmate::ipc::{client, paths};
use hyprmate::manager::Manager;
use hyprmate::traits::{Compositor, Inbound, Source};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "hyprmate", version, about = "Companion daemon for Hyprland")]
struct Cli {
    /// Configuration file [default: $XDG_CONFIG_HOME/hypr/hyprmate.toml]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug messages
    #[arg(long)]
    debug: bool,

    /// Send this command to the running daemon instead of starting one
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start the tokio runtime: {}", e);
            std::process::exit(ExitCode::EnvironmentError.code());
        }
    };

    let code = if cli.command.is_empty() {
        runtime.block_on(run_daemon(cli.config))
    } else {
        runtime.block_on(client::run(&cli.command))
    };
    std::process::exit(code.code());
}

fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    if !path.exists() {
        warn!("no config file at {}, starting without plugins", path.display());
        return Ok(Config::default());
    }
    let config = Config::load(path)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Daemon mode.  Returns once `exit` was requested or on SIGINT.
async fn run_daemon(config_path: Option<PathBuf>) -> ExitCode {
    let path = config_path.unwrap_or_else(config::default_path);
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::UsageError;
        }
    };

    let socket = match paths::control_socket_path() {
        Ok(socket) => socket,
        Err(e) => {
            error!("{}", e);
            return ExitCode::EnvironmentError;
        }
    };
    let (compositor, events) = match (HyprlandIpc::from_env(), EventStream::from_env()) {
        (Ok(ipc), Ok(events)) => (Arc::new(ipc) as Arc<dyn Compositor>, events),
        (Err(e), _) | (_, Err(e)) => {
            error!("{}", e);
            return ExitCode::EnvironmentError;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<Inbound>();

    let listener = {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut source = ControlListener::new(&socket);
            if let Err(e) = source.run(tx.clone()).await {
                error!("control socket error: {}", e);
                let _ = tx.send(Inbound::Shutdown);
            }
        })
    };
    {
        let tx = tx.clone();
        let mut source = events;
        tokio::spawn(async move {
            if let Err(e) = source.run(tx).await {
                error!("event stream error: {}", e);
            }
        });
    }
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                let _ = tx.send(Inbound::Shutdown);
            }
        });
    }
    drop(tx);

    let mut manager = Manager::new(compositor, config, Some(path));
    let errors = manager.initialize().await;
    if !errors.is_empty() {
        warn!("{} configuration problem(s) found", errors.len());
    }
    manager.run(rx).await;

    // Let the listener notice the closed inbox and remove its socket.
    let _ = tokio::time::timeout(Duration::from_secs(1), listener).await;
    ExitCode::Success
}
