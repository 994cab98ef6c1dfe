//! File-protocol TDD driver.
//!
//! Every command works on the `.tdd/` directory of the current working
//! directory. A run advances one step per `signal`, or continuously under
//! `watch`, which reacts to the agent writing `.tdd/channel/response.md`.

use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use tdd_driver::core::types::{PhaseSet, RunMode, RunStatus};
use tdd_driver::events::DriverEvent;
use tdd_driver::exit_codes;
use tdd_driver::io::channel::ProtocolChannel;
use tdd_driver::io::init::{DriverPaths, InitOptions, init_workspace};
use tdd_driver::logging;
use tdd_driver::machine::Driver;
use tdd_driver::select::select_from_root;

#[derive(Parser)]
#[command(
    name = "tdd-driver",
    version,
    about = "Drive a feature backlog through a TDD loop with an external agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.tdd/` with default config and an empty workspace.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Start a backlog run over every eligible node.
    Run,
    /// Start a run for one node. Without phase flags all phases run.
    Node {
        id: String,
        /// Write the behaviour specification.
        #[arg(long)]
        bdd: bool,
        /// Scaffold and generate tests plus implementation.
        #[arg(long)]
        test: bool,
        /// Execute tests and run the fix loop.
        #[arg(long)]
        fix: bool,
    },
    /// Process a pending response, or continue an interrupted run.
    Signal,
    /// Keep processing responses until the run ends.
    Watch {
        /// Poll interval for the channel directory, in milliseconds.
        #[arg(long, default_value_t = 200)]
        poll_ms: u64,
    },
    /// Pause the active run and discard its persisted state.
    Stop,
    /// Print the persisted run state.
    Status,
    /// Print the id of the node a backlog run would work on next.
    Select,
}

/// Single-node mode; no phase flags means every phase.
fn node_mode(id: String, bdd: bool, test: bool, fix: bool) -> RunMode {
    let phases = if bdd || test || fix {
        PhaseSet { bdd, test, fix }
    } else {
        PhaseSet::ALL
    };
    RunMode::Single {
        node_id: id,
        phases,
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve working directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Run => cmd_start(&root, RunMode::Backlog),
        Command::Node { id, bdd, test, fix } => cmd_start(&root, node_mode(id, bdd, test, fix)),
        Command::Signal => cmd_signal(&root),
        Command::Watch { poll_ms } => cmd_watch(&root, Duration::from_millis(poll_ms)),
        Command::Stop => cmd_stop(&root),
        Command::Status => cmd_status(&root),
        Command::Select => cmd_select(&root),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.driver_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_start(root: &Path, mode: RunMode) -> Result<i32> {
    let mut driver = open_driver(root)?;
    Ok(exit_for(driver.start(mode)))
}

fn cmd_signal(root: &Path) -> Result<i32> {
    let mut driver = open_driver(root)?;
    Ok(exit_for(driver.resume()))
}

fn cmd_watch(root: &Path, poll: Duration) -> Result<i32> {
    let paths = DriverPaths::new(root);
    let status = open_driver(root)?.resume();
    if status != RunStatus::Running {
        return Ok(exit_for(status));
    }

    let (tx, rx) = mpsc::channel::<NotifyEvent>();
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default().with_poll_interval(poll),
    )?;
    fs::create_dir_all(&paths.channel_dir)
        .with_context(|| format!("create directory {}", paths.channel_dir.display()))?;
    watcher.watch(&paths.channel_dir, RecursiveMode::NonRecursive)?;
    info!(path = %paths.channel_dir.display(), "watching channel directory");

    let response_name = paths.response_path.file_name();
    for event in rx {
        if matches!(event.kind, EventKind::Remove(_))
            || !event.paths.iter().any(|path| path.file_name() == response_name)
        {
            continue;
        }
        debug!(kind = ?event.kind, "response changed");
        // Reopen each time so a `stop` from another process is honoured.
        let status = open_driver(root)?.resume();
        if status != RunStatus::Running {
            return Ok(exit_for(status));
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_stop(root: &Path) -> Result<i32> {
    let mut driver = open_driver(root)?;
    if !driver.state().is_running() {
        println!("no active run");
        return Ok(exit_codes::OK);
    }
    driver.stop();
    println!("stopped");
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path) -> Result<i32> {
    let channel = ProtocolChannel::new(&DriverPaths::new(root));
    match channel.load_state() {
        Some(state) => {
            let rendered = serde_json::to_string_pretty(&state).context("serialize state")?;
            println!("{rendered}");
        }
        None => println!("no active run"),
    }
    Ok(exit_codes::OK)
}

fn cmd_select(root: &Path) -> Result<i32> {
    match select_from_root(root)? {
        Some(id) => {
            println!("{id}");
            Ok(exit_codes::OK)
        }
        None => {
            println!("COMPLETE");
            Ok(exit_codes::COMPLETE)
        }
    }
}

fn open_driver(root: &Path) -> Result<Driver> {
    let mut driver = Driver::from_root(root)?;
    driver.subscribe(Box::new(print_event));
    Ok(driver)
}

fn print_event(event: &DriverEvent) {
    match event {
        DriverEvent::TaskWritten { node_id, phase } => match node_id {
            Some(id) => println!("task written: {} ({id})", phase.as_str()),
            None => println!("task written: {}", phase.as_str()),
        },
        DriverEvent::TestResults { node_id, results } => {
            let passed = results.iter().filter(|result| result.passed).count();
            println!("tests {node_id}: {passed}/{} passed", results.len());
        }
        DriverEvent::NodeCompleted {
            node_id,
            outcome,
            reason,
        } => match reason {
            Some(reason) => println!("node {node_id}: {outcome:?} ({reason})"),
            None => println!("node {node_id}: {outcome:?}"),
        },
        DriverEvent::BlueprintComplete { node_count } => {
            println!("blueprint complete: {node_count} nodes");
        }
        DriverEvent::RunCompleted { summary } => println!("COMPLETE: {summary}"),
        DriverEvent::RunError { message } => eprintln!("ERROR: {message}"),
        DriverEvent::StatusChanged { .. } => {}
    }
}

fn exit_for(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => exit_codes::COMPLETE,
        RunStatus::Error => exit_codes::ERROR,
        RunStatus::Idle | RunStatus::Running | RunStatus::Paused => exit_codes::OK,
    }
}
