use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Config, Event, PollWatcher, RecursiveMode, Watcher};
use serde_json::json;
use smartopen_config::SmartOpenConfig;
use smartopen_core::{Candidate, current_unix_timestamp_millis, normalize_path};
use smartopen_rank::{CandidateEvent, CandidateSnapshot, SmartOpenService};
use smartopen_store::UsageStore;

use crate::cli::ServeArgs;
use crate::enumerate::{
    CandidateFilter, candidate_id_for, enumerate_candidates, is_ignored_path,
    relative_workspace_path,
};
use crate::usage::record_json;

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum ServeMessage {
    Line(String),
    InputClosed,
    Watch(notify::Result<Event>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeCommand {
    Query(String),
    Open(String),
    Active(Option<String>),
    Quit,
}

/// Plain lines are queries; lines starting with `:` are commands.
pub fn parse_serve_line(line: &str) -> Result<ServeCommand, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(command) = line.strip_prefix(':') else {
        return Ok(ServeCommand::Query(line.to_owned()));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command.trim(), ""));

    match name {
        "open" if rest.is_empty() => Err("':open' needs a path".to_owned()),
        "open" => Ok(ServeCommand::Open(rest.to_owned())),
        "active" => Ok(ServeCommand::Active(
            (!rest.is_empty()).then(|| rest.to_owned()),
        )),
        "quit" => Ok(ServeCommand::Quit),
        other => Err(format!(
            "unknown command ':{other}', expected one of: open, active, quit"
        )),
    }
}

#[derive(Debug, Default)]
pub struct DebounceQueue {
    pending: HashMap<PathBuf, Instant>,
}

impl DebounceQueue {
    pub fn mark(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    pub fn drain_due(&mut self, now: Instant, debounce: Duration) -> Vec<PathBuf> {
        let mut due = Vec::new();

        self.pending.retain(|path, last_seen| {
            if now.duration_since(*last_seen) >= debounce {
                due.push(path.clone());
                false
            } else {
                true
            }
        });

        due.sort();
        due
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Everything the serve loop owns: the candidate snapshot, the focused file
/// and filesystem changes waiting out the debounce window.
pub struct ServeState {
    workspace: PathBuf,
    filter: CandidateFilter,
    snapshot: CandidateSnapshot,
    active: Option<String>,
    queue: DebounceQueue,
    debounce: Duration,
}

impl ServeState {
    pub fn new(workspace: &Path, config: &SmartOpenConfig, active: Option<&str>) -> Result<Self> {
        let candidates = enumerate_candidates(workspace, &config.candidates)
            .context("failed to enumerate workspace files")?;

        Ok(Self {
            workspace: workspace.to_path_buf(),
            filter: CandidateFilter::new(workspace, &config.candidates)?,
            snapshot: CandidateSnapshot::from_candidates(candidates),
            active: active.map(|path| candidate_id_for(workspace, path)),
            queue: DebounceQueue::default(),
            debounce: Duration::from_millis(config.watch.debounce_ms),
        })
    }

    pub fn snapshot(&self) -> &CandidateSnapshot {
        &self.snapshot
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Returns `false` once the loop should stop.
    pub fn handle_message<S: UsageStore>(
        &mut self,
        message: ServeMessage,
        service: &SmartOpenService<S>,
        out: &mut dyn Write,
    ) -> Result<bool> {
        match message {
            ServeMessage::Line(line) => {
                self.handle_line(&line, service, current_unix_timestamp_millis(), out)
            }
            ServeMessage::InputClosed => Ok(false),
            ServeMessage::Watch(event) => {
                if let Err(err) = self.enqueue_event(event, Instant::now()) {
                    tracing::warn!(error = ?err, "watch event error");
                }
                Ok(true)
            }
        }
    }

    pub fn handle_line<S: UsageStore>(
        &mut self,
        line: &str,
        service: &SmartOpenService<S>,
        now_ms: i64,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let command = match parse_serve_line(line) {
            Ok(command) => command,
            Err(message) => {
                write_json_line(out, &json!({ "error": message }))?;
                return Ok(true);
            }
        };

        match command {
            ServeCommand::Query(query) => {
                match service.rank(
                    &query,
                    self.snapshot.candidates(),
                    self.active.as_deref(),
                    now_ms,
                ) {
                    Ok(results) => {
                        write_json_line(out, &json!({ "query": query, "results": results }))?
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "ranking failed");
                        write_json_line(out, &json!({ "error": err.to_string() }))?;
                    }
                }
            }
            ServeCommand::Open(path) => {
                let id = candidate_id_for(&self.workspace, &path);
                match service.record_selection(&id, now_ms) {
                    Ok(record) => {
                        write_json_line(out, &json!({ "opened": record_json(&id, &record) }))?
                    }
                    Err(err) => {
                        tracing::error!(id = %id, error = %err, "recording selection failed");
                        write_json_line(out, &json!({ "error": err.to_string() }))?;
                    }
                }
            }
            ServeCommand::Active(path) => {
                self.active = path.map(|path| candidate_id_for(&self.workspace, &path));
                write_json_line(out, &json!({ "active": self.active }))?;
            }
            ServeCommand::Quit => return Ok(false),
        }

        Ok(true)
    }

    pub fn enqueue_event(&mut self, event: notify::Result<Event>, now: Instant) -> Result<()> {
        let event = event.context("notify error")?;

        for path in event.paths {
            if is_ignored_path(&relative_workspace_path(&self.workspace, &path)) {
                continue;
            }
            if path.is_dir() {
                continue;
            }
            self.queue.mark(path, now);
        }

        Ok(())
    }

    /// Applies every change older than the debounce window; returns how many
    /// altered the snapshot.
    pub fn flush_due(&mut self, now: Instant) -> usize {
        if self.queue.is_empty() {
            return 0;
        }

        let changed = self
            .queue
            .drain_due(now, self.debounce)
            .into_iter()
            .filter(|path| self.apply_path(path))
            .count();
        if changed > 0 {
            tracing::debug!(
                changed,
                candidates = self.snapshot.len(),
                "applied workspace changes"
            );
        }
        changed
    }

    fn apply_path(&mut self, path: &Path) -> bool {
        let relative = relative_workspace_path(&self.workspace, path);
        let id = normalize_path(&relative.to_string_lossy());

        let event = if path.is_file() {
            if !self.filter.admits(&relative, false) {
                return false;
            }
            CandidateEvent::Added(Candidate::from_relative(&id))
        } else if path.exists() {
            return false;
        } else {
            CandidateEvent::Removed(id)
        };

        self.snapshot.apply(event)
    }
}

pub fn run_serve<S: UsageStore>(
    workspace: &Path,
    config: &SmartOpenConfig,
    service: &SmartOpenService<S>,
    args: &ServeArgs,
) -> Result<()> {
    let mut state = ServeState::new(workspace, config, args.active.as_deref())?;
    let (tx, rx) = mpsc::channel::<ServeMessage>();

    let _watcher = if args.no_watch {
        None
    } else {
        Some(start_watcher(workspace, tx.clone())?)
    };
    spawn_stdin_reader(tx);

    tracing::info!(
        candidates = state.snapshot().len(),
        watching = !args.no_watch,
        "serving queries on stdin"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_event_loop(&rx, &mut state, service, &mut out)
}

pub fn run_event_loop<S: UsageStore>(
    rx: &mpsc::Receiver<ServeMessage>,
    state: &mut ServeState,
    service: &SmartOpenService<S>,
    out: &mut dyn Write,
) -> Result<()> {
    loop {
        let message = match rx.recv_timeout(LOOP_POLL_INTERVAL) {
            Ok(message) => Some(message),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        };

        state.flush_due(Instant::now());

        if let Some(message) = message
            && !state.handle_message(message, service, out)?
        {
            return Ok(());
        }
    }
}

fn start_watcher(workspace: &Path, tx: mpsc::Sender<ServeMessage>) -> Result<PollWatcher> {
    let mut watcher = PollWatcher::new(
        move |result| {
            let _ = tx.send(ServeMessage::Watch(result));
        },
        Config::default().with_poll_interval(WATCH_POLL_INTERVAL),
    )
    .context("failed to initialize file watcher")?;

    watcher
        .watch(workspace, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch workspace {}", workspace.display()))?;
    Ok(watcher)
}

fn spawn_stdin_reader(tx: mpsc::Sender<ServeMessage>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(ServeMessage::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read stdin");
                    break;
                }
            }
        }
        let _ = tx.send(ServeMessage::InputClosed);
    });
}

fn write_json_line(out: &mut dyn Write, value: &serde_json::Value) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
