// Sysguard - Resilient systemd unit controller
// Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sysguard::config::Config;
use sysguard::systemd::{ConnectionState, Msg, ServiceScope, UnitCheck, UnitFileChange};
use sysguard::{Notifiers, Systemd};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "sysguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Talk to the per-user manager instead of the system one
    #[arg(long, global = true)]
    user: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reload the daemon, start a unit and wait until it is active
    Start { unit: String },
    /// Stop a unit
    Stop { unit: String },
    /// Restart a unit and wait until it is active
    Restart { unit: String },
    /// Start a unit, then enable it
    StartEnable { unit: String },
    /// Enable unit files
    Enable {
        #[arg(required = true)]
        units: Vec<String>,
    },
    /// Stop units and disable their unit files
    StopDisable {
        #[arg(required = true)]
        units: Vec<String>,
    },
    /// Stop, disable and mask units
    DisableMask {
        #[arg(required = true)]
        units: Vec<String>,
    },
    /// Mask unit files
    Mask {
        #[arg(required = true)]
        units: Vec<String>,
    },
    /// Reload the systemd manager configuration
    Reload,
    /// Print the coarse active status of a unit
    Status { unit: String },
    /// Print one string property of a unit
    Property { unit: String, name: String },
    /// Print the unit file path of a unit
    FragmentPath { unit: String },
    /// Print the loaded unit with exactly this name
    Find { unit: String },
    /// Log connection state changes until interrupted
    Watch,
    /// Print the effective configuration as YAML
    Config {
        /// Print built-in defaults instead of the loaded file
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.clone())?;
    if cli.user {
        config.scope = ServiceScope::User;
    }

    if let Command::Config { default } = &cli.command {
        let shown = if *default { Config::default() } else { config };
        print!("{}", serde_yaml::to_string(&shown)?);
        return Ok(());
    }

    init_logging(cli.debug, config.log_file.as_deref())?;
    tracing::debug!("Using {:?}", config);

    let notifiers = spawn_notification_logger();
    let systemd = Systemd::connect_dbus(&config, notifiers).await?;

    let result = run(&systemd, cli.command).await;
    systemd.close().await?;
    result
}

async fn run(systemd: &Systemd, command: Command) -> Result<()> {
    match command {
        Command::Start { unit } => systemd.unit_start(&unit).await?,
        Command::Stop { unit } => systemd.unit_stop(&unit).await?,
        Command::Restart { unit } => systemd.unit_restart(&unit).await?,
        Command::StartEnable { unit } => systemd.unit_start_with_enable(&unit).await?,
        Command::Enable { units } => {
            let changes = systemd.enable_service(&as_refs(&units)).await?;
            print_changes(&changes);
        }
        Command::StopDisable { units } => systemd.unit_stop_disable(&as_refs(&units)).await?,
        Command::DisableMask { units } => systemd.unit_disable_and_mask(&as_refs(&units)).await?,
        Command::Mask { units } => {
            let changes = systemd.unit_mask(&as_refs(&units)).await?;
            print_changes(&changes);
        }
        Command::Reload => systemd.daemon_reload().await?,
        Command::Status { unit } => println!("{}", systemd.unit_is_active_status(&unit).await),
        Command::Property { unit, name } => {
            println!("{}", systemd.unit_some_property(&unit, &name).await?)
        }
        Command::FragmentPath { unit } => println!("{}", systemd.unit_fragment_path(&unit).await?),
        Command::Find { unit } => {
            let status = systemd.unit_list_filter_by_name(&unit).await?;
            println!(
                "{} {} {} {} {}",
                status.name, status.load_state, status.active_state, status.sub_state, status.description
            );
        }
        Command::Watch => {
            tracing::info!("Watching systemd connection, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        Command::Config { .. } => unreachable!("handled before connecting"),
    }
    Ok(())
}

fn as_refs(units: &[String]) -> Vec<&str> {
    units.iter().map(String::as_str).collect()
}

fn print_changes(changes: &[UnitFileChange]) {
    for change in changes {
        println!("{} {} -> {}", change.change_type, change.file_name, change.destination);
    }
}

/// Log every notification the controller emits
fn spawn_notification_logger() -> Notifiers {
    let (state_tx, mut state_rx) = mpsc::channel::<ConnectionState>(100);
    let (msg_tx, mut msg_rx) = mpsc::channel::<Msg>(100);
    let (check_tx, mut check_rx) = mpsc::channel::<UnitCheck>(100);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(state) = state_rx.recv() => {
                    if state.connected {
                        tracing::info!("Connected to systemd (attempt {})", state.total_attempts);
                    } else {
                        tracing::warn!(
                            "Systemd unreachable (attempt {}): {}",
                            state.total_attempts,
                            state.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
                Some(msg) = msg_rx.recv() => {
                    tracing::info!("{}: job {}", msg.unit_name, msg.msg_str);
                }
                Some(check) = check_rx.recv() => {
                    tracing::debug!("{}: check #{}", check.unit_name, check.check_count);
                }
                else => break,
            }
        }
    });

    Notifiers::default()
        .with_connection_state(state_tx)
        .with_messages(msg_tx)
        .with_unit_checks(check_tx)
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let subscriber = builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false) // Disable ANSI colors in log file
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
