//! Background execution of repository operations.
//!
//! Every operation runs as one task on the blocking pool, under the
//! repository's mutex, and reports progress and one terminal event through
//! the orchestrator's event channel. The caller gets a [`TaskHandle`] back
//! immediately and is never blocked by file I/O.
//!
//! Sends never wait on the receiver. Progress stops short of the last
//! `TERMINAL_RESERVE` slots so terminal events still fit behind a slow
//! consumer; a receiver that is never drained only loses events, and the
//! handle's outcome stays authoritative.

use gitlite_core::{
    Commit, CommitDiff, Config, Error, ErrorKind, Progress, Repository, RepositoryInfo,
    StageAllReport, StageOutcome, StatusReport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 100;
/// Channel slots progress events leave free for terminal events.
const TERMINAL_RESERVE: usize = 8;

pub type SharedRepository = Arc<Mutex<Repository>>;
pub type TaskEvents = mpsc::Receiver<TaskEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Add,
    AddAll,
    Commit,
    Status,
    Log,
    Show,
    Diff,
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Init => "init",
            Operation::Add => "add",
            Operation::AddAll => "add-all",
            Operation::Commit => "commit",
            Operation::Status => "status",
            Operation::Log => "log",
            Operation::Show => "show",
            Operation::Diff => "diff",
        }
    }
}

/// Result payload of a finished task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskOutput {
    Initialized(RepositoryInfo),
    Staged(Vec<StageOutcome>),
    StagedAll(StageAllReport),
    Committed(Commit),
    Status(StatusReport),
    Log(Vec<Commit>),
    Commit(Commit),
    Diff(CommitDiff),
    Patch(String),
}

impl TaskOutput {
    fn was_cancelled(&self) -> bool {
        matches!(self, TaskOutput::StagedAll(report) if report.cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { output: TaskOutput },
    Failed { message: String, kind: ErrorKind },
    Cancelled { output: TaskOutput },
}

impl TaskOutcome {
    fn from_result(result: gitlite_core::Result<TaskOutput>) -> Self {
        match result {
            Ok(output) if output.was_cancelled() => TaskOutcome::Cancelled { output },
            Ok(output) => TaskOutcome::Succeeded { output },
            Err(e) => TaskOutcome::Failed {
                message: e.to_string(),
                kind: e.kind(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEventKind {
    Progress { message: String, percent: u8 },
    Succeeded { output: TaskOutput },
    Failed { message: String, kind: ErrorKind },
    Cancelled { output: TaskOutput },
}

impl From<TaskOutcome> for TaskEventKind {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Succeeded { output } => TaskEventKind::Succeeded { output },
            TaskOutcome::Failed { message, kind } => TaskEventKind::Failed { message, kind },
            TaskOutcome::Cancelled { output } => TaskEventKind::Cancelled { output },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub operation: Operation,
    pub kind: TaskEventKind,
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, TaskEventKind::Progress { .. })
    }
}

pub struct TaskHandle {
    id: Uuid,
    operation: Operation,
    token: CancellationToken,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Requests cooperative cancellation. Only add-all observes it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn outcome(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed {
                message: format!("{} task aborted: {}", self.operation.as_str(), e),
                kind: ErrorKind::Io,
            },
        }
    }
}

/// Forwards core progress into the event channel and answers cancellation checks.
struct TaskProgress {
    task_id: Uuid,
    operation: Operation,
    events: mpsc::Sender<TaskEvent>,
    token: CancellationToken,
    high_water: AtomicU8,
}

impl TaskProgress {
    fn emit(&self, kind: TaskEventKind) {
        let event = TaskEvent {
            task_id: self.task_id,
            operation: self.operation,
            kind,
        };

        let terminal = event.is_terminal();
        if !terminal && self.events.capacity() <= TERMINAL_RESERVE {
            debug!("Event channel backed up, dropping progress of task {}", self.task_id);
            return;
        }

        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) if terminal => warn!(
                "Event channel full, terminal event of task {} dropped",
                self.task_id
            ),
            Err(e) => debug!("Dropped event of task {}: {}", self.task_id, e),
        }
    }
}

impl Progress for TaskProgress {
    fn report(&self, message: &str, percent: u8) {
        let percent = self.high_water.fetch_max(percent, Ordering::Relaxed).max(percent);
        self.emit(TaskEventKind::Progress {
            message: message.to_string(),
            percent,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    repo: SharedRepository,
    events: mpsc::Sender<TaskEvent>,
}

impl Orchestrator {
    pub fn new(repo: SharedRepository) -> (Self, TaskEvents) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { repo, events }, rx)
    }

    /// Creates (or reinitializes) a repository off the caller's thread and
    /// returns an orchestrator bound to it. The init events are the first
    /// entries of the returned channel.
    pub async fn init(path: PathBuf, config: Config) -> gitlite_core::Result<(Self, TaskEvents)> {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let progress = TaskProgress {
            task_id: Uuid::new_v4(),
            operation: Operation::Init,
            events: events.clone(),
            token: CancellationToken::new(),
            high_water: AtomicU8::new(0),
        };

        let created = tokio::task::spawn_blocking(move || {
            progress.report("Initializing repository", 0);
            let result = Repository::init(&path, config);
            let outcome = match &result {
                Ok(repo) => TaskOutcome::Succeeded {
                    output: TaskOutput::Initialized(repo.info().clone()),
                },
                Err(e) => TaskOutcome::Failed {
                    message: e.to_string(),
                    kind: e.kind(),
                },
            };
            if outcome.is_success() {
                progress.report("Initialized", 100);
            }
            progress.emit(outcome.into());
            result
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))??;

        let repo = Arc::new(Mutex::new(created));
        Ok((Self { repo, events }, rx))
    }

    pub fn repository(&self) -> SharedRepository {
        Arc::clone(&self.repo)
    }

    pub fn add(&self, paths: Vec<PathBuf>) -> TaskHandle {
        self.spawn(Operation::Add, move |repo, progress| {
            let total = paths.len();
            let mut outcomes = Vec::with_capacity(total);
            for (i, path) in paths.iter().enumerate() {
                let outcome = repo.add(path)?;
                progress.report(
                    &format!("Staged {}", outcome.entry.path),
                    gitlite_core::progress::percent(i + 1, total),
                );
                outcomes.push(outcome);
            }
            Ok(TaskOutput::Staged(outcomes))
        })
    }

    pub fn add_all(&self, root: Option<PathBuf>, exclude: Option<Vec<String>>) -> TaskHandle {
        self.spawn(Operation::AddAll, move |repo, progress| {
            let root = root.unwrap_or_else(|| repo.root().to_path_buf());
            repo.add_all(&root, exclude.as_deref(), progress)
                .map(TaskOutput::StagedAll)
        })
    }

    pub fn commit(&self, message: String, summary: Option<String>) -> TaskHandle {
        self.spawn(Operation::Commit, move |repo, progress| {
            progress.report("Writing snapshot", 10);
            repo.commit(&message, summary).map(TaskOutput::Committed)
        })
    }

    pub fn status(&self) -> TaskHandle {
        self.spawn(Operation::Status, |repo, _| Ok(TaskOutput::Status(repo.status())))
    }

    pub fn log(&self) -> TaskHandle {
        self.spawn(Operation::Log, |repo, _| Ok(TaskOutput::Log(repo.log())))
    }

    pub fn show(&self, id: String) -> TaskHandle {
        self.spawn(Operation::Show, move |repo, _| {
            repo.find_commit(&id).cloned().map(TaskOutput::Commit)
        })
    }

    pub fn diff(&self, from: String, to: String, detailed: bool) -> TaskHandle {
        self.spawn(Operation::Diff, move |repo, progress| {
            progress.report(&format!("Comparing {}..{}", from, to), 0);
            repo.diff(&from, &to, detailed).map(TaskOutput::Diff)
        })
    }

    /// Unified patches between two commits, rendered with the configured context.
    pub fn unified_diff(&self, from: String, to: String) -> TaskHandle {
        self.spawn(Operation::Diff, move |repo, _| {
            repo.unified_diff(&from, &to).map(TaskOutput::Patch)
        })
    }

    fn spawn<F>(&self, operation: Operation, work: F) -> TaskHandle
    where
        F: FnOnce(&mut Repository, &TaskProgress) -> gitlite_core::Result<TaskOutput>
            + Send
            + 'static,
    {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let progress = TaskProgress {
            task_id: id,
            operation,
            events: self.events.clone(),
            token: token.clone(),
            high_water: AtomicU8::new(0),
        };
        let repo = Arc::clone(&self.repo);

        debug!("Dispatching {} task {}", operation.as_str(), id);
        let join = tokio::task::spawn_blocking(move || {
            let result = match repo.lock() {
                Ok(mut guard) => work(&mut guard, &progress),
                Err(_) => Err(Error::LockPoisoned),
            };

            let outcome = TaskOutcome::from_result(result);
            match &outcome {
                TaskOutcome::Succeeded { .. } => {
                    progress.report("Done", 100);
                    info!("{} task {} succeeded", operation.as_str(), id);
                }
                TaskOutcome::Cancelled { .. } => {
                    info!("{} task {} cancelled", operation.as_str(), id)
                }
                TaskOutcome::Failed { message, .. } => {
                    warn!("{} task {} failed: {}", operation.as_str(), id, message)
                }
            }
            progress.emit(outcome.clone().into());
            outcome
        });

        TaskHandle {
            id,
            operation,
            token,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Orchestrator, TaskEvents) {
        let dir = TempDir::new().unwrap();
        let (orch, events) = Orchestrator::init(dir.path().join("repo"), Config::default())
            .await
            .unwrap();
        (dir, orch, events)
    }

    fn root(orch: &Orchestrator) -> PathBuf {
        orch.repository().lock().unwrap().root().to_path_buf()
    }

    fn drain(events: &mut TaskEvents) -> Vec<TaskEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn test_init_emits_terminal_event() {
        let (_dir, _orch, mut events) = setup().await;

        let seen = drain(&mut events);
        let terminal: Vec<_> = seen.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].operation, Operation::Init);
        assert!(matches!(terminal[0].kind, TaskEventKind::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_add_and_commit() {
        let (_dir, orch, mut events) = setup().await;
        fs::write(root(&orch).join("notes.txt"), "hello").unwrap();

        let added = orch.add(vec![PathBuf::from("notes.txt")]).outcome().await;
        assert!(added.is_success());

        let handle = orch.commit("first".to_string(), None);
        let task_id = handle.id();
        match handle.outcome().await {
            TaskOutcome::Succeeded {
                output: TaskOutput::Committed(commit),
            } => assert_eq!(commit.files(), &["notes.txt".to_string()]),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let commit_events: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect();
        assert_eq!(commit_events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(commit_events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_failure_carries_kind() {
        let (_dir, orch, _events) = setup().await;

        match orch.commit("x".to_string(), None).outcome().await {
            TaskOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::EmptyCommit),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match orch.diff("nope1".into(), "nope2".into(), false).outcome().await {
            TaskOutcome::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::NotFound);
                assert!(message.contains("nope1"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_add_all_reports_partial_counts() {
        let (_dir, orch, _events) = setup().await;
        let root = root(&orch);
        for i in 0..5 {
            fs::write(root.join(format!("f{i}.txt")), "x").unwrap();
        }

        // Hold the lock so the cancel lands before the walk starts.
        let repo = orch.repository();
        let guard = repo.lock().unwrap();
        let handle = orch.add_all(None, None);
        handle.cancel();
        drop(guard);

        match handle.outcome().await {
            TaskOutcome::Cancelled {
                output: TaskOutput::StagedAll(report),
            } => {
                assert!(report.cancelled);
                assert_eq!(report.processed, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undrained_receiver_never_stalls_tasks() {
        let (_dir, orch, mut events) = setup().await;
        let root = root(&orch);
        let paths: Vec<PathBuf> = (0..150)
            .map(|i| {
                let name = format!("f{i:03}.txt");
                fs::write(root.join(&name), "x").unwrap();
                PathBuf::from(name)
            })
            .collect();

        let handle = orch.add(paths);
        let task_id = handle.id();
        let outcome = tokio::time::timeout(Duration::from_secs(10), handle.outcome())
            .await
            .expect("add task stalled on a full event channel");
        assert!(outcome.is_success());

        // A second task still completes with the channel backed up.
        let status = tokio::time::timeout(Duration::from_secs(10), orch.status().outcome())
            .await
            .expect("status task stalled on a full event channel");
        assert!(status.is_success());

        let seen = drain(&mut events);
        assert!(seen.len() <= EVENT_BUFFER);
        let terminal: Vec<_> = seen
            .iter()
            .filter(|e| e.task_id == task_id && e.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(terminal[0].kind, TaskEventKind::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let (_dir, orch, mut events) = setup().await;
        let root = root(&orch);
        for i in 0..4 {
            fs::write(root.join(format!("f{i}.txt")), "x").unwrap();
        }
        drain(&mut events);

        let outcome = orch.add_all(None, None).outcome().await;
        assert!(outcome.is_success());

        let percents: Vec<u8> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e.kind {
                TaskEventKind::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }
}
