use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::action_executor::{ActionError, ActionExecutor, PendingScript};
use crate::clipboard::daemon::install_signal_handlers;
use crate::clipboard::protocol::PingResponse;
use crate::clipboard::{
    BackendError, ClientError, ClipboardClient, CommandBackend, Daemon, DaemonError,
};
use crate::config::{self, Config, ConfigError};
use crate::dispatcher::{Dispatcher, ProviderFailure, Resolution};
use crate::logging;
use crate::model::Candidate;
use crate::providers::{build_registry, ProviderDeps};
use crate::session::QuerySession;
use crate::usage::UsageLog;

const POLL_SLICE: Duration = Duration::from_millis(25);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("clipboard daemon error: {0}")]
    Daemon(#[from] DaemonError),
    #[error("clipboard backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("{0}")]
    Action(#[from] ActionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Selection(String),
}

impl RuntimeError {
    /// 2 for bad input the user can fix, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Selection(_) => 2,
            _ => 1,
        }
    }
}

/// Loads the config, writing a default `config.toml` when none exists yet.
pub fn load_config(path: Option<&Path>) -> Result<Config, RuntimeError> {
    let config = config::load(path)?;
    if !config.config_path.exists() {
        config::save(&config)?;
        println!(
            "[wlaunch] wrote default config to {}",
            config.config_path.display()
        );
    }
    Ok(config)
}

fn init_logging(config: &Config, component: &str) {
    if let Err(error) = logging::init(config, component) {
        eprintln!("[wlaunch] logging disabled: {error}");
    }
}

/// Everything one launcher process needs: providers, dispatcher and executor.
pub struct Launcher {
    dispatcher: Arc<Dispatcher>,
    executor: ActionExecutor,
}

impl Launcher {
    pub fn from_config(config: &Config) -> Result<Self, RuntimeError> {
        let deps = ProviderDeps::from_config(config);
        let registry = Arc::new(build_registry(config, &deps)?);
        let failed = registry.rescan();
        if failed > 0 {
            warn!(failed, "some providers failed to warm up");
        }

        let usage = Arc::new(UsageLog::open(&config.usage_path()));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config,
            Arc::clone(&usage),
        ));
        let mut executor = ActionExecutor::new(registry, usage, Arc::clone(&deps.recent));
        match CommandBackend::detect() {
            Ok(backend) => executor = executor.with_clipboard(Arc::new(backend)),
            Err(error) => warn!(%error, "no clipboard tool found; copy actions will fail"),
        }
        info!(providers = dispatcher.registry().len(), "launcher ready");
        Ok(Self::new(dispatcher, executor))
    }

    pub fn new(dispatcher: Arc<Dispatcher>, executor: ActionExecutor) -> Self {
        Self {
            dispatcher,
            executor,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn query(&self, raw: &str) -> Resolution {
        self.dispatcher.resolve(raw)
    }

    /// Resolves `raw` and executes candidate `pick`, waiting for scripts.
    pub fn run(&self, raw: &str, pick: usize) -> Result<Candidate, RuntimeError> {
        let resolution = self.query(raw);
        for failure in &resolution.failures {
            eprintln!("[wlaunch] {}", describe_failure(failure));
        }
        let candidate = select(&resolution.candidates, Some(pick))?.clone();
        if let Some(pending) = self.executor.execute(&candidate)? {
            pending.wait()?;
        }
        Ok(candidate)
    }

    /// Line-oriented session: every line is a new query unless it starts
    /// with `:`. `:N` runs candidate N, `:n`/`:p` move the selection, a bare
    /// `:` runs the selection, `:q` quits. A successful action ends the session.
    pub fn interactive<R, W>(&self, input: R, out: &mut W) -> Result<(), RuntimeError>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let (tx, rx) = mpsc::channel::<String>();
        thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        let mut session = QuerySession::new(Arc::clone(&self.dispatcher));
        let mut selected: Option<usize> = None;
        writeln!(out, "type a query; :N to run a result, :q to quit")?;

        loop {
            let line = match rx.recv_timeout(POLL_SLICE) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    if !session.is_settled() && session.poll(POLL_SLICE) {
                        render(out, session.candidates(), session.failures(), selected)?;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match parse_command(&line) {
                InputCommand::Quit => break,
                InputCommand::Query(text) => {
                    session.submit(text);
                    selected = (!session.candidates().is_empty()).then_some(0);
                    render(out, session.candidates(), session.failures(), selected)?;
                }
                InputCommand::Move(direction) => {
                    selected =
                        next_selection_index(selected, session.candidates().len(), direction);
                    render(out, session.candidates(), session.failures(), selected)?;
                }
                InputCommand::Run(index) => {
                    let index = index.or(selected);
                    match select(session.candidates(), index) {
                        Ok(candidate) => {
                            let candidate = candidate.clone();
                            if self.launch_detached(&candidate, out)? {
                                break;
                            }
                        }
                        Err(error) => writeln!(out, "! {error}")?,
                    }
                }
            }
        }
        debug!(
            stale = session.stale_discarded(),
            "interactive session finished"
        );
        Ok(())
    }

    /// True when the action was dispatched and the session should close.
    fn launch_detached<W: Write>(&self, candidate: &Candidate, out: &mut W) -> Result<bool, RuntimeError> {
        match self.executor.execute(candidate) {
            Ok(Some(pending)) => {
                writeln!(out, "started {}", pending.path().display())?;
                watch_script(pending);
                Ok(true)
            }
            Ok(None) => {
                writeln!(out, "ok: {}", candidate.title)?;
                Ok(true)
            }
            Err(error) => {
                writeln!(out, "! {error}")?;
                notify_failure(&candidate.title, &error.to_string());
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand<'a> {
    Query(&'a str),
    Run(Option<usize>),
    Move(i32),
    Quit,
}

fn parse_command(line: &str) -> InputCommand<'_> {
    let Some(command) = line.strip_prefix(':') else {
        return InputCommand::Query(line);
    };
    match command.trim() {
        "" => InputCommand::Run(None),
        "q" | "quit" => InputCommand::Quit,
        "n" => InputCommand::Move(1),
        "p" => InputCommand::Move(-1),
        other => match other.parse::<usize>() {
            Ok(index) => InputCommand::Run(Some(index)),
            Err(_) => InputCommand::Query(line),
        },
    }
}

fn watch_script(pending: PendingScript) {
    let spawned = thread::Builder::new()
        .name("script-wait".to_string())
        .spawn(move || {
            let title = pending.path().display().to_string();
            if let Err(error) = pending.wait() {
                error!(%error, "script failed");
                notify_failure(&title, &error.to_string());
            }
        });
    if let Err(error) = spawned {
        warn!(%error, "cannot watch script");
    }
}

/// Best-effort desktop notification; silently skipped without `notify-send`.
pub fn notify_failure(title: &str, message: &str) {
    let result = Command::new("notify-send")
        .args(["--app-name=wlaunch", "--urgency=normal", title, message])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match result {
        Ok(mut child) => {
            thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Err(error) => debug!(%error, "notify-send unavailable"),
    }
}

pub fn next_selection_index(current: Option<usize>, len: usize, direction: i32) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let current = current.unwrap_or(0).min(len - 1);
    if direction > 0 {
        Some((current + 1).min(len - 1))
    } else if direction < 0 {
        Some(current.saturating_sub(1))
    } else {
        Some(current)
    }
}

/// The candidate at `index`, rejecting informational rows.
pub fn select(candidates: &[Candidate], index: Option<usize>) -> Result<&Candidate, RuntimeError> {
    let index = index.ok_or_else(|| RuntimeError::Selection("no result selected".to_string()))?;
    let candidate = candidates.get(index).ok_or_else(|| {
        RuntimeError::Selection(format!(
            "selected index out of range: {index} (len={})",
            candidates.len()
        ))
    })?;
    if !candidate.is_actionable() {
        return Err(RuntimeError::Selection(format!(
            "'{}' has no action",
            candidate.title
        )));
    }
    Ok(candidate)
}

pub fn describe_failure(failure: &ProviderFailure) -> String {
    format!("{} failed: {}", failure.provider, failure.error)
}

pub fn format_row(index: usize, candidate: &Candidate, selected: bool) -> String {
    let marker = if selected { '>' } else { ' ' };
    let mut row = format!("{marker}{index:>3}  {}", candidate.title);
    if candidate.pending {
        row.push_str("  (searching)");
    } else if !candidate.subtitle.is_empty() {
        row.push_str("  · ");
        row.push_str(&candidate.subtitle);
    }
    row
}

fn render<W: Write>(
    out: &mut W,
    candidates: &[Candidate],
    failures: &[ProviderFailure],
    selected: Option<usize>,
) -> std::io::Result<()> {
    for (index, candidate) in candidates.iter().enumerate() {
        writeln!(out, "{}", format_row(index, candidate, selected == Some(index)))?;
    }
    for failure in failures {
        writeln!(out, "  ! {}", describe_failure(failure))?;
    }
    writeln!(out)
}

#[derive(Debug, Serialize)]
struct QueryReport<'a> {
    query: &'a str,
    candidates: &'a [Candidate],
    failures: Vec<FailureReport>,
}

#[derive(Debug, Serialize)]
struct FailureReport {
    provider: String,
    error: String,
}

/// One-shot query output, either human-readable rows or JSON.
pub fn render_resolution(raw: &str, resolution: &Resolution, json: bool) -> String {
    if json {
        let report = QueryReport {
            query: raw,
            candidates: &resolution.candidates,
            failures: resolution
                .failures
                .iter()
                .map(|f| FailureReport {
                    provider: f.provider.key(),
                    error: f.error.to_string(),
                })
                .collect(),
        };
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!("{{\"error\":\"cannot encode results: {error}\"}}")
        });
    }
    let mut buffer = Vec::new();
    if render(&mut buffer, &resolution.candidates, &resolution.failures, None).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherCommand {
    Interactive,
    Query { text: String, json: bool },
    Run { text: String, pick: usize },
}

pub fn run_launcher(config_path: Option<&Path>, command: LauncherCommand) -> Result<(), RuntimeError> {
    let config = load_config(config_path)?;
    init_logging(&config, "launcher");
    let launcher = Launcher::from_config(&config)?;

    match command {
        LauncherCommand::Interactive => {
            let stdin = std::io::BufReader::new(std::io::stdin());
            let mut stdout = std::io::stdout().lock();
            launcher.interactive(stdin, &mut stdout)
        }
        LauncherCommand::Query { text, json } => {
            let resolution = launcher.query(&text);
            print!("{}", render_resolution(&text, &resolution, json));
            Ok(())
        }
        LauncherCommand::Run { text, pick } => match launcher.run(&text, pick) {
            Ok(candidate) => {
                println!("[wlaunch] ran: {}", candidate.title);
                Ok(())
            }
            Err(error) => {
                if matches!(error, RuntimeError::Action(_)) {
                    notify_failure("wlaunch", &error.to_string());
                }
                Err(error)
            }
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCommand {
    Run,
    Ping,
    Stop,
}

pub fn run_daemon(config_path: Option<&Path>, command: DaemonCommand) -> Result<(), RuntimeError> {
    let config = config::load(config_path)?;
    match command {
        DaemonCommand::Run => {
            init_logging(&config, "daemon");
            let backend = CommandBackend::detect()?;
            install_signal_handlers()?;
            let daemon = Daemon::from_config(&config, Arc::new(backend))?;
            daemon.run()?;
            Ok(())
        }
        DaemonCommand::Ping => {
            let ping = daemon_client(&config, STOP_TIMEOUT).ping()?;
            println!("{}", describe_ping(&ping));
            Ok(())
        }
        DaemonCommand::Stop => {
            daemon_client(&config, STOP_TIMEOUT).shutdown()?;
            println!("[wlaunch-daemon] stop requested");
            Ok(())
        }
    }
}

fn daemon_client(config: &Config, timeout: Duration) -> ClipboardClient {
    ClipboardClient::new(config.socket_path(), timeout)
}

pub fn describe_ping(ping: &PingResponse) -> String {
    format!(
        "[wlaunch-daemon] {}: {}/{} entries, last sequence id {}",
        ping.state, ping.entries, ping.capacity, ping.last_sequence_id
    )
}
