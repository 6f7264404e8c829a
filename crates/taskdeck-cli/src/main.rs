//! `taskdeck` - browser-agent task dashboard in the terminal.

mod render;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use taskdeck_core::app::{
    ActionOutcome, ConsoleState, DetailScope, LineKind, Phase, SkipReason, TranscriptLine,
};
use taskdeck_core::domain::{ListQuery, LogLevel, LogQuery, SearchFilter, SubmitRequest, TaskId};
use taskdeck_core::ports::{AssumeYes, Confirm, TaskApi};
use taskdeck_core::config::seconds;
use taskdeck_core::{ClientConfig, Dashboard, DashboardBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskdeck", version, about = "Browser-agent task dashboard")]
struct Cli {
    /// Backend base URL (overrides TASKDECK_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Push endpoint (overrides TASKDECK_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, env = "TASKDECK_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks, newest first
    List {
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Search tasks by status, type and age
    Search(SearchArgs),
    /// Show one task with its logs
    Show { id: String },
    /// Show a task's logs
    Logs {
        id: String,
        /// Only entries at this level
        #[arg(long, value_parser = parse_level)]
        level: Option<LogLevel>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Task counts by status
    Stats,
    /// Submit a new agent task
    Submit(SubmitArgs),
    /// Cancel a pending or running task
    Cancel { id: String },
    /// Re-run a failed task as a new task
    Retry { id: String },
    /// Delete a finished task and its logs
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Follow a task until it finishes
    Watch { id: String },
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    task_type: Option<String>,
    /// Only tasks created within this many days
    #[arg(long)]
    days: Option<u32>,
}

#[derive(Args)]
struct SubmitArgs {
    /// What the agent should do
    instructions: String,
    /// Starting URL; may be repeated
    #[arg(long = "url")]
    urls: Vec<String>,
    /// Agent option as key=value; the value is read as JSON when it parses
    #[arg(long = "config", value_parser = parse_config_pair)]
    config: Vec<(String, serde_json::Value)>,
    /// Follow the task after submitting
    #[arg(long)]
    watch: bool,
}

fn parse_config_pair(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_level(raw: &str) -> Result<LogLevel, String> {
    match LogLevel::from(raw.to_string()) {
        LogLevel::Unknown => Err(format!(
            "unknown level '{raw}', expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
        )),
        level => Ok(level),
    }
}

/// Asks on stderr and reads the answer from stdin.
struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = tokio::io::stderr();
        if stderr
            .write_all(format!("{prompt} [y/N] ").as_bytes())
            .await
            .is_err()
        {
            return false;
        }
        let _ = stderr.flush().await;

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    tracing::debug!(base_url = %config.base_url, ws_url = %config.ws_url, "configuration loaded");

    let follows = matches!(
        cli.command,
        Command::Watch { .. } | Command::Submit(SubmitArgs { watch: true, .. })
    );
    let mut builder = DashboardBuilder::from_config(&config)?;
    if !follows {
        builder = builder.without_push();
    }
    builder = match cli.command {
        Command::Delete { yes: true, .. } => builder.confirm(AssumeYes),
        _ => builder.confirm(StdinConfirm),
    };
    let dashboard = builder.build()?;

    let result = run(&cli, &dashboard).await;
    dashboard.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base) = &cli.base_url {
        config.set_base_url("--base-url", base)?;
    }
    if let Some(ws) = &cli.ws_url {
        config.set_ws_url("--ws-url", ws)?;
    }
    if let Some(raw) = &cli.timeout {
        config.request_timeout = Some(seconds("--timeout", raw)?);
    }
    Ok(config)
}

async fn run(cli: &Cli, dashboard: &Dashboard) -> anyhow::Result<()> {
    let api = &dashboard.api;
    match &cli.command {
        Command::List { limit, offset } => {
            let tasks = api.list_tasks(ListQuery::new(*limit, *offset)).await?;
            emit(cli.json, tasks.as_slice(), render::tasks)?;
        }
        Command::Search(args) => {
            let filter = SearchFilter {
                status: args.status.clone(),
                task_type: args.task_type.clone(),
                days: args.days,
            };
            let tasks = api.search_tasks(&filter).await?;
            emit(cli.json, tasks.as_slice(), render::tasks)?;
        }
        Command::Show { id } => {
            let task = api.get_task_details(&TaskId::new(id.as_str())).await?;
            emit(cli.json, &task, render::task)?;
        }
        Command::Logs { id, level, limit } => {
            let query = LogQuery {
                level: *level,
                limit: *limit,
            };
            let logs = api.get_task_logs(&TaskId::new(id.as_str()), query).await?;
            emit(cli.json, logs.as_slice(), render::logs)?;
        }
        Command::Stats => {
            let stats = api.get_task_stats().await?;
            emit(cli.json, &stats, render::stats)?;
        }
        Command::Submit(args) => {
            let mut request = SubmitRequest::new(args.instructions.as_str());
            for url in &args.urls {
                request = request.with_url(url.as_str());
            }
            for (key, value) in &args.config {
                request = request.with_config(key.as_str(), value.clone());
            }
            let outcome = dashboard.actions.submit(&request, &[]).await?;
            report(cli.json, &outcome)?;
            if args.watch
                && let Some(id) = outcome.navigate_to()
            {
                watch(dashboard, id.clone()).await?;
            }
        }
        Command::Cancel { id } => {
            let task = api.get_task_details(&TaskId::new(id.as_str())).await?;
            let outcome = dashboard.actions.cancel(&task, &[]).await?;
            report(cli.json, &outcome)?;
        }
        Command::Retry { id } => {
            let task = api.get_task_details(&TaskId::new(id.as_str())).await?;
            let outcome = dashboard.actions.retry(&task, &[]).await?;
            report(cli.json, &outcome)?;
        }
        Command::Delete { id, .. } => {
            let task = api.get_task_details(&TaskId::new(id.as_str())).await?;
            let outcome = dashboard.actions.delete(&task, &[]).await?;
            report(cli.json, &outcome)?;
        }
        Command::Watch { id } => watch(dashboard, TaskId::new(id.as_str())).await?,
    }
    Ok(())
}

fn emit<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn report(json: bool, outcome: &ActionOutcome) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(outcome))?);
        return Ok(());
    }
    match outcome {
        ActionOutcome::Submitted { id, message } => println!("submitted {id}: {message}"),
        ActionOutcome::Cancelled { status, message } => {
            println!("cancel: {status}{}", suffix(message.as_deref()));
        }
        ActionOutcome::Retried { new_id, message } => {
            println!("retried as {new_id}{}", suffix(message.as_deref()));
        }
        ActionOutcome::Deleted { id } => println!("deleted {id}"),
        ActionOutcome::Skipped(SkipReason::NotAllowed { action, status }) => {
            eprintln!("{action} is not available for a {status} task");
        }
        ActionOutcome::Skipped(SkipReason::Declined) => eprintln!("nothing deleted"),
    }
    Ok(())
}

fn suffix(message: Option<&str>) -> String {
    message.map(|m| format!(" ({m})")).unwrap_or_default()
}

fn outcome_json(outcome: &ActionOutcome) -> serde_json::Value {
    use serde_json::json;
    match outcome {
        ActionOutcome::Submitted { id, message } => {
            json!({"outcome": "submitted", "id": id, "message": message})
        }
        ActionOutcome::Cancelled { status, message } => {
            json!({"outcome": "cancelled", "status": status, "message": message})
        }
        ActionOutcome::Retried { new_id, message } => {
            json!({"outcome": "retried", "new_task_id": new_id, "message": message})
        }
        ActionOutcome::Deleted { id } => json!({"outcome": "deleted", "id": id}),
        ActionOutcome::Skipped(SkipReason::NotAllowed { action, status }) => {
            json!({"outcome": "skipped", "reason": "not_allowed", "action": action.to_string(), "status": status})
        }
        ActionOutcome::Skipped(SkipReason::Declined) => {
            json!({"outcome": "skipped", "reason": "declined"})
        }
    }
}

/// Follows `id` through the detail view and the push console until the task
/// reaches a terminal status or the user interrupts.
async fn watch(dashboard: &Dashboard, id: TaskId) -> anyhow::Result<()> {
    let detail = dashboard.sync.mount(DetailScope::new(id.clone()));
    let mut view = detail.subscribe();
    // the first load may already have landed
    view.mark_changed();

    let mut console = dashboard.console.as_ref().map(|console| {
        console.track(id.clone());
        console.subscribe()
    });
    let mut printed = 0u64;
    let mut last_status = None;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            changed = view.changed() => {
                changed.context("detail view closed")?;
                let state = view.borrow_and_update().clone();
                if state.phase == Phase::LoadErrored {
                    let err = state.error.map(|e| e.user_message()).unwrap_or_default();
                    bail!("{err}\nRun `taskdeck watch {id}` again to retry.");
                }
                if let Some(err) = state.error.as_ref().filter(|_| state.is_stale()) {
                    eprintln!("refresh failed, showing last snapshot: {}", err.user_message());
                }
                let Some(task) = state.data else { continue };
                if last_status != Some(task.status) {
                    println!("{} {}", task.status.tone().glyph(), task.status);
                    last_status = Some(task.status);
                }
                if task.is_terminal() && !state.polling {
                    if let Some(error) = &task.error_details {
                        println!("error: {error}");
                    }
                    if let Some(result) = &task.result_data {
                        println!("{}", serde_json::to_string_pretty(result)?);
                    }
                    return Ok(());
                }
            }
            Some(state) = next_console(&mut console) => {
                printed = print_transcript(&state, &id, printed);
            }
            _ = &mut interrupt => {
                eprintln!("stopped watching {id}");
                return Ok(());
            }
        }
    }
}

async fn next_console(
    rx: &mut Option<tokio::sync::watch::Receiver<ConsoleState>>,
) -> Option<ConsoleState> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

/// Prints transcript lines for `id` appended after the first `seen`;
/// returns the count to pass next time.
fn print_transcript(state: &ConsoleState, id: &TaskId, seen: u64) -> u64 {
    let (fresh, seen) = state.lines_since(seen);
    for line in transcript_for(fresh, id) {
        println!("  {line}");
    }
    seen
}

fn transcript_for<'a>(
    lines: &'a [TranscriptLine],
    id: &'a TaskId,
) -> impl Iterator<Item = String> + 'a {
    lines
        .iter()
        .filter(move |line| line.task_id.as_ref().is_none_or(|task| task == id))
        .map(transcript_text)
}

fn transcript_text(line: &TranscriptLine) -> String {
    match line.kind {
        LineKind::Thought => format!("… {}", line.text),
        LineKind::Status => format!("» {}", line.text),
        LineKind::System => format!("# {}", line.text),
    }
}
