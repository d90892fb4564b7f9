//! FLEETWATCH - Agent Fleet Dashboard
//!
//! A line-oriented operator shell over the realtime dashboard client.
//!
//! ## Usage
//!
//! ```bash
//! # Connect to the default backend (http://localhost:3000)
//! fleetwatch
//!
//! # Point at another backend, with verbose logging
//! fleetwatch --url https://fleet.example.com -v
//!
//! # Custom config and log directory
//! fleetwatch --config ./fleetwatch.yaml --log-dir /tmp/fleetwatch-logs
//! ```
//!
//! Lines starting with `:` control the dashboard (`:help` lists them); any
//! other line is submitted to the backend as a command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetwatch_client::{
    ClientConfig, ClientEvent, ClientHandle, DashboardClient, HttpApi, LifecycleAction,
    WsConnector,
};
use fleetwatch_core::{AgentStatus, FleetError, LogGuard, NotificationLevel, View, init_logging};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

/// FLEETWATCH Agent Fleet Dashboard
///
/// Mirrors the live state of an agent fleet and submits operator commands.
#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.fleetwatch/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and FLEETWATCH_URL)
    #[arg(long)]
    url: Option<String>,

    /// Realtime channel URL (defaults to the base URL with a ws scheme and /ws)
    #[arg(long)]
    ws_url: Option<String>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.fleetwatch/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    View(View),
    Search(String),
    Hide,
    Show,
    Agent(LifecycleAction, String),
    Refresh,
    Reconnect,
    Status,
    Help,
    Quit,
    Execute(String),
}

const HELP: &str = "\
:view <overview|agents|tasks|knowledge|activity>  switch view
:search <text>                                     search (empty clears)
:hide / :show                                      pause / resume refresh
:start|:stop|:restart <agent-id>                   agent lifecycle
:refresh                                           reload everything now
:reconnect                                         reconnect the realtime channel
:status                                            print a state summary
:quit                                              exit
anything else                                      run as a backend command";

fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let Some(rest) = line.trim_start().strip_prefix(':') else {
        return Ok(ShellCommand::Execute(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest.trim(), ""),
    };

    let agent = |action| {
        if arg.is_empty() {
            Err(format!(":{name} needs an agent id"))
        } else {
            Ok(ShellCommand::Agent(action, arg.to_string()))
        }
    };

    match name {
        "view" => arg
            .parse::<View>()
            .map(ShellCommand::View)
            .map_err(|e| e.to_string()),
        "search" => Ok(ShellCommand::Search(arg.to_string())),
        "hide" => Ok(ShellCommand::Hide),
        "show" => Ok(ShellCommand::Show),
        "start" => agent(LifecycleAction::Start),
        "stop" => agent(LifecycleAction::Stop),
        "restart" => agent(LifecycleAction::Restart),
        "refresh" => Ok(ShellCommand::Refresh),
        "reconnect" => Ok(ShellCommand::Reconnect),
        "status" => Ok(ShellCommand::Status),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "q" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("Unknown shell command ':{other}' (try :help)")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    info!("Starting FLEETWATCH dashboard");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => {
            info!("FLEETWATCH dashboard exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("FLEETWATCH dashboard error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<FleetError>().and_then(FleetError::guidance) {
                eprintln!("{}", hint);
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> fleetwatch_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config = config.with_base_url(url.clone());
    }
    if let Some(ws_url) = &cli.ws_url {
        config = config.with_ws_url(ws_url.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    info!(base_url = %config.base_url, ws_url = %config.realtime_url(), "configuration loaded");

    let api = Arc::new(HttpApi::from_config(&config).context("creating HTTP client")?);
    let mut client = DashboardClient::new(config, api, Arc::new(WsConnector));
    let handle = client.handle();
    let events = client
        .take_events()
        .context("client event stream already taken")?;

    let printer = tokio::spawn(print_events(events));
    let reader = tokio::spawn(read_operator_input(handle));

    println!("FLEETWATCH ready. Type :help for shell commands.");
    let result = client.run().await;

    reader.abort();
    printer.abort();
    result.context("dashboard client failed")
}

async fn read_operator_input(handle: ClientHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let sent = match parse_line(&line) {
            Ok(ShellCommand::View(view)) => handle.set_view(view),
            Ok(ShellCommand::Search(text)) => handle.query_changed(text),
            Ok(ShellCommand::Hide) => handle.set_visible(false),
            Ok(ShellCommand::Show) => handle.set_visible(true),
            Ok(ShellCommand::Agent(action, id)) => handle.agent_action(id, action),
            Ok(ShellCommand::Refresh) => handle.refresh(),
            Ok(ShellCommand::Reconnect) => handle.reconnect(),
            Ok(ShellCommand::Status) => {
                print_status(&handle).await;
                Ok(())
            }
            Ok(ShellCommand::Help) => {
                println!("{HELP}");
                Ok(())
            }
            Ok(ShellCommand::Quit) => break,
            Ok(ShellCommand::Execute(command)) => handle.execute(command),
            Err(message) => {
                println!("{message}");
                Ok(())
            }
        };

        if sent.is_err() {
            return;
        }
    }

    let _ = handle.shutdown();
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Notification(notification) => {
                let tag = match notification.level {
                    NotificationLevel::Success => "ok",
                    NotificationLevel::Error => "error",
                    NotificationLevel::Warning => "warn",
                    NotificationLevel::Info => "info",
                };
                println!("[{tag}] {}", notification.message);
            }
            ClientEvent::Connection(state) => println!("{} connection {}", state.indicator(), state),
            ClientEvent::ViewLoaded(view) => println!("-- {} loaded", view.title()),
            ClientEvent::Export(data) => match data {
                Some(data) => match serde_json::to_string_pretty(&data) {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("[error] export not printable: {e}"),
                },
                None => println!("[info] export returned no data"),
            },
        }
    }
}

async fn print_status(handle: &ClientHandle) {
    let state = handle.store().snapshot().await;

    println!(
        "{} {} | view: {}",
        state.connection_state().indicator(),
        state.connection_state(),
        state.active_view()
    );

    if let Some(metrics) = state.metrics() {
        println!(
            "cpu {:.1}% | mem {:.1}% | disk {:.1}% | up {} | agents {} | tasks {} | knowledge {}",
            metrics.cpu,
            metrics.memory,
            metrics.disk,
            metrics.uptime_display(),
            metrics.active_agents,
            metrics.total_tasks,
            metrics.knowledge_items
        );
    }

    let counts = state.status_counts();
    if !counts.is_empty() {
        println!("agents: {}", status_summary(&counts));
    }
    for agent in state.agents() {
        println!(
            "  {} {:<20} cpu {:>5.1}% mem {:>7.1}MB tasks {}",
            agent.status.indicator(),
            agent.id,
            agent.metrics.cpu_or_zero(),
            agent.metrics.memory_or_zero(),
            agent.metrics.tasks_or_zero()
        );
    }

    if let Some(results) = state.search_results() {
        println!("search '{}': {} hit(s)", results.query, results.hits.len());
    }

    let recent: Vec<_> = state.activity().take(5).collect();
    for entry in recent {
        println!(
            "  {} [{}] {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.kind,
            entry.title
        );
    }

    match state.last_update() {
        Some(at) => println!("last update {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")),
        None => println!("no data yet"),
    }
}

/// `2 running, 1 error` in a fixed status order.
fn status_summary(counts: &HashMap<AgentStatus, usize>) -> String {
    [
        AgentStatus::Running,
        AgentStatus::Stopped,
        AgentStatus::Error,
        AgentStatus::Unknown,
    ]
    .into_iter()
    .filter_map(|status| counts.get(&status).map(|n| format!("{n} {status}")))
    .collect::<Vec<_>>()
    .join(", ")
}
