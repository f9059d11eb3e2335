//! Command-line operator console for a remote autonomous agent.
//!
//! `status` prints one snapshot, `watch` follows a running agent, `run` assigns
//! a task and follows it to a finished state (answering questions from stdin),
//! and `kill` / `clear-logs` call the matching lifecycle endpoints directly.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use overseer::core::state::Alert;
use overseer::core::types::{AgentSnapshot, AgentStatus};
use overseer::core::view::View;
use overseer::driver::Synchronizer;
use overseer::error::{ActionError, ClientError, Unavailable};
use overseer::exit_codes;
use overseer::io::client::{ControlSurface, HttpControlSurface};
use overseer::io::config::{SynchronizerConfig, load_config};
use overseer::logging;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, sleep_until};

/// Polls an agent may stay ready without naming the task before `run` trusts it.
const SETTLE_POLLS: u32 = 3;

#[derive(Parser)]
#[command(
    name = "overseer",
    version,
    about = "Operator console for a remote autonomous agent"
)]
struct Cli {
    /// Agent base URL; overrides the config file.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "overseer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the agent's current snapshot as JSON.
    Status,
    /// Follow a running agent, printing status changes, new log lines and questions.
    Watch,
    /// Assign a task and follow it until the agent finishes.
    Run {
        /// Natural-language task for the agent.
        task: String,
    },
    /// Stop the agent and discard its current task.
    Kill,
    /// Clear the agent's log buffer.
    ClearLogs,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(logging::DEFAULT_FILTER);

    let mut config = load_config(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate().context("validate --base-url")?;
    }
    let surface = HttpControlSurface::new(config.base_url.clone(), config.request_timeout())
        .context("build http client")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Status => cmd_status(&surface).await,
            Command::Watch => cmd_watch(surface, config).await,
            Command::Run { task } => cmd_run(surface, config, task).await,
            Command::Kill => lifecycle_exit(surface.request_kill().await, "kill agent"),
            Command::ClearLogs => lifecycle_exit(surface.clear_logs().await, "clear logs"),
        }
    })
}

async fn cmd_status(surface: &HttpControlSurface) -> Result<i32> {
    let snapshot = surface.status().await.context("fetch status")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?
    );
    if snapshot.status == AgentStatus::QuotaExceeded {
        return Ok(exit_codes::QUOTA_EXCEEDED);
    }
    Ok(exit_codes::OK)
}

async fn cmd_watch(surface: HttpControlSurface, config: SynchronizerConfig) -> Result<i32> {
    let handle = Synchronizer::attach(surface, config);
    let mut views = handle.subscribe();
    let mut printer = Printer::default();

    loop {
        let view = views.borrow_and_update().clone();
        printer.print(&view);
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("synchronizer stopped");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                return Ok(exit_codes::OK);
            }
        }
    }
}

async fn cmd_run(
    surface: HttpControlSurface,
    config: SynchronizerConfig,
    task: String,
) -> Result<i32> {
    let settle = config.poll_interval() * SETTLE_POLLS;
    let mut progress = RunProgress::new(&task);
    let handle = Synchronizer::spawn(surface, config);
    if let Err(err) = handle.assign_task(task).await {
        eprintln!("{err}");
        return Ok(action_exit_code(&err));
    }

    let mut views = handle.subscribe();
    let mut printer = Printer::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut settle_deadline: Option<Instant> = None;

    loop {
        let view = views.borrow_and_update().clone();
        printer.print(&view);

        if let Some(snapshot) = &view.snapshot {
            if snapshot.status == AgentStatus::QuotaExceeded {
                return Ok(exit_codes::QUOTA_EXCEEDED);
            }
            if progress.finished(snapshot) {
                return Ok(exit_codes::OK);
            }
            settle_deadline = if snapshot.status.is_ready() {
                settle_deadline.or_else(|| Some(Instant::now() + settle))
            } else {
                None
            };
        }

        let asking = view.interjection.is_some();
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("synchronizer stopped");
                }
            }
            line = stdin.next_line(), if asking => {
                let Some(answer) = line.context("read answer from stdin")? else {
                    bail!("stdin closed while the agent is waiting for an answer");
                };
                if let Err(err) = handle.answer(answer).await {
                    eprintln!("{err}");
                }
            }
            _ = sleep_until(settle_deadline.unwrap_or_else(Instant::now)), if settle_deadline.is_some() => {
                eprintln!("the agent stayed ready without reporting the task; assuming it finished");
                return Ok(exit_codes::OK);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                eprintln!("interrupted; the agent keeps running");
                return Ok(exit_codes::INVALID);
            }
        }
    }
}

/// Decides when the task assigned by `run` is over.
struct RunProgress {
    task: String,
    /// The agent was seen working since the task was accepted.
    started: bool,
}

impl RunProgress {
    fn new(task: &str) -> Self {
        Self {
            task: task.trim().to_string(),
            started: false,
        }
    }

    /// A ready status counts once the agent was seen working, or when it already
    /// names the submitted task because it finished between two polls.
    fn finished(&mut self, snapshot: &AgentSnapshot) -> bool {
        if !snapshot.status.is_ready() {
            self.started = true;
            return false;
        }
        self.started
            || snapshot.current_task.as_deref().map(str::trim) == Some(self.task.as_str())
    }
}

fn lifecycle_exit(result: Result<(), ClientError>, action: &str) -> Result<i32> {
    match result {
        Ok(()) => Ok(exit_codes::OK),
        Err(ClientError::Rejected(message)) => {
            eprintln!("{action}: {message}");
            Ok(exit_codes::REJECTED)
        }
        Err(err) => Err(err).context(action.to_string()),
    }
}

fn action_exit_code(err: &ActionError) -> i32 {
    match err {
        ActionError::Rejected(_) => exit_codes::REJECTED,
        ActionError::Unavailable(Unavailable::QuotaExceeded) => exit_codes::QUOTA_EXCEEDED,
        _ => exit_codes::INVALID,
    }
}

/// Prints what changed between consecutive views.
#[derive(Default)]
struct Printer {
    status: Option<AgentStatus>,
    step: Option<usize>,
    logs: Vec<String>,
    stuck: bool,
    question: Option<String>,
    alert: Option<Alert>,
}

impl Printer {
    fn print(&mut self, view: &View) {
        let status = view.snapshot.as_ref().map(|snapshot| snapshot.status.clone());
        if status != self.status {
            if let Some(status) = &status {
                let task = view
                    .snapshot
                    .as_ref()
                    .and_then(|snapshot| snapshot.current_task.as_deref())
                    .unwrap_or("-");
                println!("[status] {status} (task: {task})");
            }
            self.status = status;
        }

        if let Some(snapshot) = &view.snapshot
            && let Some(step) = snapshot.current_step()
            && self.step != Some(snapshot.plan_step)
        {
            println!(
                "[step {}/{}] {}",
                snapshot.plan_step + 1,
                snapshot.current_plan.len(),
                step.description
            );
            self.step = Some(snapshot.plan_step);
        }

        for line in new_log_lines(&self.logs, &view.logs) {
            println!("{line}");
        }
        self.logs.clone_from(&view.logs);

        if view.flags.planning_stuck && !self.stuck {
            eprintln!("[warn] the agent has been planning for a while and may be stuck");
        }
        self.stuck = view.flags.planning_stuck;

        let question = view
            .interjection
            .as_ref()
            .map(|pending| pending.question.clone());
        if question != self.question {
            if let Some(question) = &question {
                eprintln!("[question] {question}");
            }
            self.question = question;
        }

        if view.alert != self.alert {
            if let Some(alert) = &view.alert {
                eprintln!("[alert] {}", alert.message);
            }
            self.alert.clone_from(&view.alert);
        }
    }
}

/// Lines of `current` not already printed from `previous`.
///
/// The remote only returns a bounded tail, so the longest suffix of `previous`
/// that is a prefix of `current` is treated as already seen.
fn new_log_lines<'a>(previous: &[String], current: &'a [String]) -> &'a [String] {
    let max = previous.len().min(current.len());
    let overlap = (0..=max)
        .rev()
        .find(|&len| previous[previous.len() - len..] == current[..len])
        .unwrap_or(0);
    &current[overlap..]
}
