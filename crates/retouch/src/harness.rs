//! Runs session work off the caller's task.
//!
//! Each session is owned by a single actor task that drains an ordered
//! command queue, so applies, undos, redos and queries on one session never
//! interleave. The pixel work itself runs on tokio's blocking pool, gated by
//! a semaphore so at most `workers` operations execute at once across all
//! sessions.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Semaphore, mpsc, oneshot},
    task::JoinError,
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    error::{ProcessingErrorKind, Result, RetouchError},
    history::{HistoryView, MAX_HISTORY, Session, SessionState, panic_message},
    resolver::resolve,
    traits::ImageOperation,
    types::{Image, ParameterBag, SessionId, SharedImage},
};

/// Harness tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HarnessConfig {
    /// Operations allowed to run at the same time across all sessions.
    pub workers: usize,
    /// Commands a session may have queued before `submit` waits.
    pub queue_depth: usize,
    /// Undo entries kept per session.
    pub max_history: usize,
    /// Completions buffered for the stream returned by
    /// [`Harness::completions`]. Further completions are dropped until the
    /// receiver catches up.
    pub completion_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(2),
            queue_depth: 32,
            max_history: MAX_HISTORY,
            completion_capacity: 256,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("workers", self.workers),
            ("queue_depth", self.queue_depth),
            ("max_history", self.max_history),
            ("completion_capacity", self.completion_capacity),
        ] {
            if value == 0 {
                return Err(RetouchError::validation(
                    "harness",
                    Some(name),
                    format!("'{name}' must be at least 1"),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of one apply, as seen on the completion stream.
#[derive(Debug, Clone)]
pub struct Completion {
    pub session: SessionId,
    pub ticket: u64,
    pub operation: String,
    pub outcome: Result<SharedImage>,
}

/// A consistent view of a session between two commands.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub current: SharedImage,
    pub can_undo: bool,
    pub can_redo: bool,
    pub state: SessionState,
    pub history: HistoryView,
}

type CompletionSink = Arc<OnceLock<mpsc::Sender<Completion>>>;

enum Command {
    Apply {
        ticket: u64,
        operation: Box<dyn ImageOperation>,
        reply: oneshot::Sender<Result<SharedImage>>,
    },
    Undo(oneshot::Sender<Option<SharedImage>>),
    Redo(oneshot::Sender<Option<SharedImage>>),
    Status(oneshot::Sender<SessionStatus>),
    Close(oneshot::Sender<()>),
}

pub struct Harness {
    config: HarnessConfig,
    workers: Arc<Semaphore>,
    next_session: AtomicU64,
    tickets: Arc<AtomicU64>,
    completions: CompletionSink,
}

impl Harness {
    /// Create a harness. Sessions are spawned onto the current tokio runtime.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            max_history = config.max_history,
            "harness ready"
        );
        Ok(Self {
            workers: Arc::new(Semaphore::new(config.workers)),
            config,
            next_session: AtomicU64::new(1),
            tickets: Arc::new(AtomicU64::new(1)),
            completions: Arc::new(OnceLock::new()),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Start a session on `image` and return a handle to it.
    pub fn open_session(&self, image: Image) -> SessionHandle {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (commands, inbox) = mpsc::channel(self.config.queue_depth);

        let actor = SessionActor {
            id,
            session: Session::with_max_history(image, self.config.max_history),
            workers: Arc::clone(&self.workers),
            completions: Arc::clone(&self.completions),
        };
        tokio::spawn(actor.run(inbox).instrument(info_span!("session", %id)));

        SessionHandle {
            id,
            commands,
            tickets: Arc::clone(&self.tickets),
        }
    }

    /// Take the stream of apply outcomes for every session, in commit order
    /// per session. Only one receiver exists per harness.
    ///
    /// The stream holds at most `completion_capacity` undelivered events; a
    /// receiver that is not drained loses the newest ones, never the tickets'
    /// own results.
    pub fn completions(&self) -> Result<mpsc::Receiver<Completion>> {
        let (tx, rx) = mpsc::channel(self.config.completion_capacity);
        self.completions
            .set(tx)
            .map_err(|_| RetouchError::IllegalState("completion stream already taken".to_string()))?;
        Ok(rx)
    }
}

/// Pending result of a submitted apply.
#[derive(Debug)]
pub struct Ticket {
    id: u64,
    operation: String,
    reply: oneshot::Receiver<Result<SharedImage>>,
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the operation this ticket waits on.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Wait for the session to commit or roll back the operation.
    pub async fn wait(self) -> Result<SharedImage> {
        self.reply.await.map_err(|_| {
            RetouchError::IllegalState(format!(
                "session stopped before '{}' completed",
                self.operation
            ))
        })?
    }
}

/// Cheap, cloneable access to one session's actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<Command>,
    tickets: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Resolve `tag` and `params`, then queue the operation.
    ///
    /// Resolution failures are returned straight away and never reach the
    /// session.
    pub async fn submit(&self, tag: &str, params: &ParameterBag) -> Result<Ticket> {
        let operation = resolve(tag, params)?;
        self.submit_operation(operation).await
    }

    /// Queue an already-built operation.
    pub async fn submit_operation<O>(&self, operation: O) -> Result<Ticket>
    where
        O: ImageOperation + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let name = operation.name();
        let (reply, rx) = oneshot::channel();

        debug!(session = %self.id, ticket, operation = %name, "queueing apply");
        self.send(Command::Apply {
            ticket,
            operation: Box::new(operation),
            reply,
        })
        .await?;

        Ok(Ticket { id: ticket, operation: name, reply: rx })
    }

    /// Submit and wait in one step.
    pub async fn apply(&self, tag: &str, params: &ParameterBag) -> Result<SharedImage> {
        self.submit(tag, params).await?.wait().await
    }

    pub async fn undo(&self) -> Result<Option<SharedImage>> {
        self.request(Command::Undo).await
    }

    pub async fn redo(&self) -> Result<Option<SharedImage>> {
        self.request(Command::Redo).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(Command::Status).await
    }

    pub async fn can_undo(&self) -> Result<bool> {
        Ok(self.status().await?.can_undo)
    }

    pub async fn can_redo(&self) -> Result<bool> {
        Ok(self.status().await?.can_redo)
    }

    pub async fn current_image(&self) -> Result<SharedImage> {
        Ok(self.status().await?.current)
    }

    pub async fn history(&self) -> Result<HistoryView> {
        Ok(self.status().await?.history)
    }

    /// Stop the session once everything queued ahead of this call has run.
    pub async fn close(&self) -> Result<()> {
        self.request(Command::Close).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| self.closed())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> RetouchError {
        RetouchError::IllegalState(format!("{} is closed", self.id))
    }
}

struct SessionActor {
    id: SessionId,
    session: Session,
    workers: Arc<Semaphore>,
    completions: CompletionSink,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        debug!("session started");
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Apply { ticket, operation, reply } => {
                    let name = operation.name();
                    let outcome = self.apply(operation).await;
                    self.notify(ticket, name, &outcome);
                    let _ = reply.send(outcome);
                }
                Command::Undo(reply) => {
                    let _ = reply.send(self.session.undo());
                }
                Command::Redo(reply) => {
                    let _ = reply.send(self.session.redo());
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                Command::Close(reply) => {
                    debug!("close requested, draining queue");
                    inbox.close();
                    let _ = reply.send(());
                }
            }
        }
        debug!("session stopped");
    }

    async fn apply(&mut self, operation: Box<dyn ImageOperation>) -> Result<SharedImage> {
        let pending = self.session.begin(operation.name())?;
        let label = pending.label().to_string();
        let input = self.session.current();

        let outcome = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => tokio::task::spawn_blocking(move || {
                let _permit = permit;
                operation.apply(&input)
            })
            .await
            .unwrap_or_else(|err| {
                Err(RetouchError::processing(
                    label,
                    ProcessingErrorKind::Panicked,
                    join_failure(err),
                ))
            }),
            Err(_) => Err(RetouchError::IllegalState("worker pool is closed".to_string())),
        };

        self.session.finish(pending, outcome)
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            current: self.session.current(),
            can_undo: self.session.can_undo(),
            can_redo: self.session.can_redo(),
            state: self.session.state(),
            history: self.session.history(),
        }
    }

    fn notify(&self, ticket: u64, operation: String, outcome: &Result<SharedImage>) {
        let Some(sink) = self.completions.get() else {
            return;
        };
        let completion = Completion {
            session: self.id,
            ticket,
            operation,
            outcome: outcome.clone(),
        };
        if let Err(mpsc::error::TrySendError::Full(dropped)) = sink.try_send(completion) {
            warn!(ticket = dropped.ticket, "completion stream full, event dropped");
        }
    }
}

fn join_failure(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => panic_message(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bag;
    use image::Rgba;
    use serde_json::json;
    use std::{
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    /// Adds one to the red channel of the top-left pixel, slowly.
    struct Increment {
        delay: Duration,
    }

    impl ImageOperation for Increment {
        fn apply(&self, image: &Image) -> Result<Image> {
            std::thread::sleep(self.delay);
            let mut out = image.clone();
            let red = out.get_pixel(0, 0)[0];
            out.put_pixel(0, 0, Rgba([red + 1, 0, 0, 255]));
            Ok(out)
        }

        fn name(&self) -> String {
            "Increment".to_string()
        }
    }

    struct Explode;

    impl ImageOperation for Explode {
        fn apply(&self, _image: &Image) -> Result<Image> {
            panic!("kernel blew up");
        }

        fn name(&self) -> String {
            "Explode".to_string()
        }
    }

    /// Records the highest number of concurrent applies it has seen.
    struct Gauge {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ImageOperation for Gauge {
        fn apply(&self, image: &Image) -> Result<Image> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(image.clone())
        }

        fn name(&self) -> String {
            "Gauge".to_string()
        }
    }

    fn create_test_image() -> Image {
        Image::from_pixel(16, 16, Rgba([0, 0, 0, 255]))
    }

    fn config(workers: usize) -> HarnessConfig {
        HarnessConfig { workers, ..HarnessConfig::default() }
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let harness = Harness::new(config(2)).expect("Should build harness");
        let session = harness.open_session(create_test_image());

        let ticket = session
            .submit("rotate", &bag(json!({ "angle": "90" })))
            .await
            .expect("Should queue");
        assert_eq!(ticket.operation(), "Rotate 90°");

        let image = ticket.wait().await.expect("Should apply");
        assert_eq!(image.dimensions(), (16, 16));
        assert!(session.can_undo().await.expect("Should query"));
        assert!(!session.can_redo().await.expect("Should query"));
    }

    #[tokio::test]
    async fn test_validation_is_immediate() {
        let harness = Harness::new(config(1)).expect("Should build harness");
        let session = harness.open_session(create_test_image());

        let err = session.submit("brightness", &bag(json!({}))).await.unwrap_err();
        assert_eq!(err.parameter(), Some("brightness"));

        let err = session.submit("style_transfer", &bag(json!({}))).await.unwrap_err();
        assert!(matches!(err, RetouchError::UnsupportedOperation { .. }));

        assert!(!session.can_undo().await.expect("Should query"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_session_applies_are_serialized() {
        let harness = Harness::new(config(4)).expect("Should build harness");
        let session = harness.open_session(create_test_image());
        let delay = Duration::from_millis(40);

        let (first, second) = tokio::join!(
            session.submit_operation(Increment { delay }),
            session.submit_operation(Increment { delay }),
        );
        let (first, second) = tokio::join!(
            first.expect("Should queue").wait(),
            second.expect("Should queue").wait(),
        );

        let mut markers = vec![
            first.expect("Should apply").get_pixel(0, 0)[0],
            second.expect("Should apply").get_pixel(0, 0)[0],
        ];
        markers.sort();
        assert_eq!(markers, vec![1, 2], "second apply must see the first's result");

        let status = session.status().await.expect("Should query");
        assert_eq!(status.current.get_pixel(0, 0)[0], 2);
        assert_eq!(status.history.undo.len(), 2);
        assert_eq!(status.state, SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_is_bounded() {
        let harness = Harness::new(config(1)).expect("Should build harness");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tickets = Vec::new();
        for _ in 0..3 {
            let session = harness.open_session(create_test_image());
            let ticket = session
                .submit_operation(Gauge { active: Arc::clone(&active), peak: Arc::clone(&peak) })
                .await
                .expect("Should queue");
            tickets.push((session, ticket));
        }
        for (_session, ticket) in tickets {
            ticket.wait().await.expect("Should apply");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_operation_rolls_back() {
        let harness = Harness::new(config(1)).expect("Should build harness");
        let session = harness.open_session(create_test_image());
        let before = session.current_image().await.expect("Should query");

        let err = session
            .submit_operation(Explode)
            .await
            .expect("Should queue")
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            RetouchError::Processing { kind: ProcessingErrorKind::Panicked, message, .. }
                if message == "kernel blew up"
        ));

        assert_eq!(*session.current_image().await.expect("Should query"), *before);
        assert!(!session.can_undo().await.expect("Should query"));

        session
            .apply("brightness", &bag(json!({ "brightness": 3 })))
            .await
            .expect("Session should keep working");
    }

    #[tokio::test]
    async fn test_completion_stream() {
        let harness = Harness::new(config(2)).expect("Should build harness");
        let mut completions = harness.completions().expect("Should take stream");
        assert!(harness.completions().is_err(), "stream can only be taken once");

        let session = harness.open_session(create_test_image());
        let ok = session
            .submit("rotate", &bag(json!({ "angle": 180 })))
            .await
            .expect("Should queue");
        let failing = session
            .submit("crop", &bag(json!({ "x": 10, "y": 10, "width": 10, "height": 10 })))
            .await
            .expect("Should queue");
        let (ok_id, failing_id) = (ok.id(), failing.id());
        drop(ok);
        drop(failing);

        let first = completions.recv().await.expect("Should complete");
        assert_eq!(first.session, session.id());
        assert_eq!(first.ticket, ok_id);
        assert_eq!(first.operation, "Rotate 180°");
        assert!(first.outcome.is_ok());

        let second = completions.recv().await.expect("Should complete");
        assert_eq!(second.ticket, failing_id);
        assert!(matches!(second.outcome, Err(RetouchError::Processing { .. })));
    }

    #[tokio::test]
    async fn test_completion_stream_is_bounded() {
        let harness = Harness::new(HarnessConfig { completion_capacity: 1, ..config(1) })
            .expect("Should build harness");
        let mut completions = harness.completions().expect("Should take stream");
        let session = harness.open_session(create_test_image());

        let first = session
            .submit("rotate", &bag(json!({ "angle": "90" })))
            .await
            .expect("Should queue");
        let first_id = first.id();
        first.wait().await.expect("Should apply");
        session
            .apply("rotate", &bag(json!({ "angle": "90" })))
            .await
            .expect("Result still reaches the ticket");

        let kept = completions.recv().await.expect("Should complete");
        assert_eq!(kept.ticket, first_id);
        assert!(completions.try_recv().is_err(), "overflowing event is dropped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queries_wait_for_in_flight_apply() {
        let harness = Harness::new(config(2)).expect("Should build harness");
        let session = harness.open_session(create_test_image());

        let ticket = session
            .submit_operation(Increment { delay: Duration::from_millis(100) })
            .await
            .expect("Should queue");

        let status = session.status().await.expect("Should query");
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.current.get_pixel(0, 0)[0], 1, "status sees the committed apply");
        assert_eq!(status.history.undo, vec!["Increment"]);

        let undone = session.undo().await.expect("Should undo").expect("Has history");
        assert_eq!(*undone, create_test_image());

        let applied = ticket.wait().await.expect("Should apply");
        assert_eq!(applied.get_pixel(0, 0)[0], 1);
        assert!(session.can_redo().await.expect("Should query"));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_commands() {
        let harness = Harness::new(config(1)).expect("Should build harness");
        let session = harness.open_session(create_test_image());
        session.close().await.expect("Should close");

        let err = session.undo().await.unwrap_err();
        assert!(matches!(err, RetouchError::IllegalState(_)));
    }

    #[test]
    fn test_config_validation() {
        assert!(HarnessConfig::default().validate().is_ok());

        let err = HarnessConfig { workers: 0, ..HarnessConfig::default() }
            .validate()
            .unwrap_err();
        assert_eq!(err.parameter(), Some("workers"));

        let config: HarnessConfig =
            serde_json::from_value(json!({ "workers": 3 })).expect("Should fill defaults");
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_history, MAX_HISTORY);
    }
}
