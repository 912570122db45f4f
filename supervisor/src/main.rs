//! Main entry point for the supervisor binary
//!
//! Roles are read from a JSON settings file. `start` redirects the child's
//! output straight into the log files so the process outlives this command;
//! a later `stop` finds it again through the layered liveness check.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use shared::{component_info, logging, ComponentId, RoleName, RpcClient};
use supervisor::{
    core::spawn_status_timer,
    services::{HttpDetailFetcher, RpcPingProbe},
    JsonFileSettings, MemorySettings, OutputCapture, ProcessSupervisor, Role, ServerConfig, SettingsStore,
    StatusMonitor, SupervisorOutcome,
};

/// Fields accepted by `config set`
const CONFIG_FIELDS: &[&str] = &["script", "interpreter", "host", "port", "debug", "mode", "args"];

/// Supervisor for the host bridge's helper servers
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Start, stop and monitor the helper servers of the host bridge")]
pub struct Args {
    /// Settings file holding per-role configuration
    #[arg(long, default_value = "supervisor.json")]
    pub settings: PathBuf,

    /// Directory for per-role stdout/stderr logs
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a role's server
    Start { role: String },
    /// Stop a role's server, escalating to a kill if needed
    Stop { role: String },
    /// Stop, wait, then start a role's server
    Restart { role: String },
    /// Print the liveness of one role, or all roles, as JSON
    Status { role: Option<String> },
    /// Poll status and print every change until Ctrl+C
    Watch {
        /// Check period in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// Read or write role configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print a role's effective configuration as JSON
    Get { role: String },
    /// Set one configuration field of a role
    Set { role: String, field: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    ComponentId::init_supervisor();
    logging::init_tracing(Some(&args.log_level));

    let mut store = JsonFileSettings::open(&args.settings)
        .with_context(|| format!("opening settings {}", args.settings.display()))?;

    if let Command::Config { action } = &args.command {
        return run_config(&mut store, action);
    }

    let roles = load_roles(&store)?;
    let supervisor = Arc::new(
        ProcessSupervisor::new(roles, &args.log_dir).with_output_capture(OutputCapture::Files),
    );

    match args.command {
        Command::Start { role } => Ok(report(supervisor.start(&RoleName::from(role)).await?)),
        Command::Stop { role } => Ok(report(supervisor.stop(&RoleName::from(role)).await?)),
        Command::Restart { role } => Ok(report(supervisor.restart(&RoleName::from(role)).await?)),
        Command::Status { role } => {
            let names = match role {
                Some(role) => vec![RoleName::from(role)],
                None => supervisor.roles(),
            };
            let mut statuses = Vec::with_capacity(names.len());
            for name in &names {
                statuses.push(supervisor.status(name).await?);
            }
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { interval_ms } => {
            watch(supervisor, Duration::from_millis(interval_ms)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Well-known roles plus any other role named in the settings
fn load_roles(store: &dyn SettingsStore) -> anyhow::Result<Vec<Role>> {
    let mut names = vec![
        RoleName::from(RoleName::LEGACY_SOCKET),
        RoleName::from(RoleName::RPC),
        RoleName::from(RoleName::PROTOCOL_SERVER),
    ];
    for key in store.keys_with_prefix("roles.") {
        if let Some((name, _)) = key["roles.".len()..].rsplit_once('.') {
            let name = RoleName::from(name);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    names
        .into_iter()
        .map(|name| -> anyhow::Result<Role> {
            let config = ServerConfig::from_settings(store, &name)?;
            Ok(Role::new(name, config))
        })
        .collect()
}

fn report(outcome: SupervisorOutcome) -> ExitCode {
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => logging::log_error(ComponentId::current(), "Serializing outcome", &e),
    }
    if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_config(store: &mut JsonFileSettings, action: &ConfigAction) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Get { role } => {
            let role = RoleName::from(role.as_str());
            let config = ServerConfig::from_settings(store, &role)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set { role, field, value } => {
            if !CONFIG_FIELDS.contains(&field.as_str()) {
                anyhow::bail!("unknown field {field}, expected one of {}", CONFIG_FIELDS.join(", "));
            }
            let role = RoleName::from(role.as_str());
            let key = format!("roles.{role}.{field}");

            // Reject malformed values before they reach the file
            let mut scratch = MemorySettings::new();
            scratch.set_string(&key, value)?;
            ServerConfig::from_settings(&scratch, &role)?;

            store.set_string(&key, value)?;
            component_info!(ComponentId::current(), "💾 {} = {} ({})", key, value, store.path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn watch(supervisor: Arc<ProcessSupervisor>, period: Duration) -> anyhow::Result<()> {
    let rpc = RoleName::from(RoleName::RPC);
    let (host, port) = supervisor
        .role(&rpc)
        .map(|role| (role.config.host.clone(), role.config.port))
        .context("rpc role is not configured")?;

    let monitor = Arc::new(
        StatusMonitor::new(supervisor.clone(), Arc::new(RpcPingProbe::new(RpcClient::new(&host, port))))
            .with_detail(Arc::new(HttpDetailFetcher::for_gateway(&host, port))),
    );

    logging::log_startup(ComponentId::current(), &format!("status watch every {period:?}"));
    let (timer, mut changes) = spawn_status_timer(monitor, period);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
            }
            _ = tokio::signal::ctrl_c() => {
                logging::log_shutdown(ComponentId::current(), "Received Ctrl+C signal");
                break;
            }
        }
    }

    timer.abort();
    Ok(())
}
