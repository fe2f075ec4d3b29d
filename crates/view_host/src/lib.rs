use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{Changeset, ColumnarTable, Lifecycle, Row},
    error::ViewError,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error};

pub mod host;
pub mod registry;
pub mod router;

pub use host::ViewHost;
pub use registry::InstanceRegistry;
pub use router::CommandRouter;

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Callback fired on engine-internal events; receives the event or signal
/// name and its payload.
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// The rendering engine binding: given a specification and an option set,
/// asynchronously produces a live view. Both inputs are opaque to this crate
/// and passed through unexamined.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn build_view(&self, spec: Value, options: Value) -> Result<Arc<dyn ViewHandle>>;
}

pub struct MissingRenderEngine;

#[async_trait]
impl RenderEngine for MissingRenderEngine {
    async fn build_view(&self, _spec: Value, _options: Value) -> Result<Arc<dyn ViewHandle>> {
        Err(anyhow!("rendering engine is unavailable"))
    }
}

/// Capability surface of a resolved view. Consumed, never implemented, by
/// this crate; the rendering engine supplies the implementation.
pub trait ViewHandle: Send + Sync {
    fn insert(&self, dataset: &str, rows: &[Row]) -> Result<(), ViewError>;
    fn change(&self, dataset: &str, changeset: &Changeset) -> Result<(), ViewError>;
    /// Triggers a re-render after a mutation.
    fn run(&self);
    fn add_event_listener(&self, name: &str, handler: EventHandler);
    fn add_signal_listener(&self, name: &str, handler: EventHandler);
    /// Escape hatch for forward-compatible command names: applies `args`
    /// positionally to the named method. An unknown name is a
    /// [`ViewError::MethodNotFound`] failure and must leave the view
    /// unmodified.
    fn invoke(&self, method: &str, args: &[Value]) -> Result<(), ViewError>;
}

impl std::fmt::Debug for dyn ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ViewHandle")
    }
}

/// What happens to a construction attempt, and the commands queued against
/// it, when a newer `create` replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupersededPolicy {
    /// Source-compatible: the old queue keeps draining and its commands
    /// still fire against the stale view if construction resolves.
    #[default]
    RunToCompletion,
    /// The in-flight construction and everything queued against it are
    /// abandoned; stale observers see [`ViewError::Abandoned`].
    Abort,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on view construction. A build that exceeds it fails the
    /// future with a construction error instead of leaving queued commands
    /// pending forever. `None` disables the bound.
    pub build_timeout: Option<Duration>,
    pub superseded: SupersededPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            build_timeout: Some(DEFAULT_BUILD_TIMEOUT),
            superseded: SupersededPolicy::default(),
        }
    }
}

/// Diagnostics surfaced per instance, alongside the tracing output.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    BuildFailed { reason: String },
    CommandFailed { command: &'static str, reason: String },
}

/// Lifecycle state of the current construction attempt. The epoch increases
/// by one per `create`, so observers can tell attempts apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceState {
    pub epoch: u64,
    pub lifecycle: Lifecycle,
}

/// Closed set of operations dispatched against a resolved view.
///
/// `Invoke` is the documented escape hatch for arbitrary method names; all
/// other commands map onto a single named capability.
pub enum ViewCommand {
    Invoke { method: String, args: Vec<Value> },
    ChangeData { dataset: String, rows: Vec<Row> },
    LoadData { dataset: String, rows: Vec<Row> },
    AddEventListener { name: String, handler: EventHandler },
    AddSignalListener { name: String, handler: EventHandler },
}

impl ViewCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ViewCommand::Invoke { .. } => "invoke",
            ViewCommand::ChangeData { .. } => "change_data",
            ViewCommand::LoadData { .. } => "load_data",
            ViewCommand::AddEventListener { .. } => "add_event_listener",
            ViewCommand::AddSignalListener { .. } => "add_signal_listener",
        }
    }
}

enum Attachment {
    Command(ViewCommand),
    Observe(oneshot::Sender<Result<Arc<dyn ViewHandle>, ViewError>>),
}

/// Handle on one construction attempt's pending-or-resolved view.
///
/// Cloning does not duplicate the future; every clone observes the same
/// single resolution.
#[derive(Debug, Clone)]
pub struct ViewFuture {
    attach_tx: mpsc::UnboundedSender<Attachment>,
}

impl ViewFuture {
    /// Waits for the view. This attaches a continuation to the same FIFO
    /// queue as commands, so it completes only after the construction
    /// attempt settled and every continuation attached earlier has run.
    pub async fn resolved(&self) -> Result<Arc<dyn ViewHandle>, ViewError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.attach_tx
            .send(Attachment::Observe(reply_tx))
            .map_err(|_| ViewError::Abandoned)?;
        reply_rx.await.map_err(|_| ViewError::Abandoned)?
    }
}

struct ControllerInner {
    epoch: u64,
    attach_tx: Option<mpsc::UnboundedSender<Attachment>>,
    driver: Option<JoinHandle<()>>,
    closed: bool,
}

/// Owns one instance's view future and provides an order-preserving command
/// surface over it, ready or not.
///
/// Every operation attaches to an unbounded per-attempt queue and returns
/// immediately; a driver task awaits the engine, then applies attachments
/// strictly in attachment order. FIFO-by-attachment is therefore structural,
/// and it covers commands, listener registrations, and readiness observers
/// alike.
pub struct ViewController {
    engine: Arc<dyn RenderEngine>,
    config: ControllerConfig,
    state_tx: watch::Sender<InstanceState>,
    events: broadcast::Sender<ControllerEvent>,
    inner: Mutex<ControllerInner>,
}

impl ViewController {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self::new_with_config(engine, ControllerConfig::default())
    }

    pub fn new_with_config(engine: Arc<dyn RenderEngine>, config: ControllerConfig) -> Self {
        let (state_tx, _) = watch::channel(InstanceState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine,
            config,
            state_tx,
            events,
            inner: Mutex::new(ControllerInner {
                epoch: 0,
                attach_tx: None,
                driver: None,
                closed: false,
            }),
        }
    }

    /// Starts construction of the view, replacing any prior future.
    ///
    /// This is a full reset, not an update: a fresh epoch and a fresh queue.
    /// What happens to the superseded attempt is decided by
    /// [`ControllerConfig::superseded`].
    pub async fn create(&self, spec: Value, options: Value) -> Result<(), ViewError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(ViewError::InstanceClosed);
        }
        if let Some(previous) = inner.driver.take() {
            if self.config.superseded == SupersededPolicy::Abort {
                previous.abort();
            }
        }
        inner.epoch += 1;
        let epoch = inner.epoch;
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();
        inner.attach_tx = Some(attach_tx);
        self.state_tx.send_replace(InstanceState {
            epoch,
            lifecycle: Lifecycle::Pending,
        });
        inner.driver = Some(tokio::spawn(drive(
            epoch,
            Arc::clone(&self.engine),
            spec,
            options,
            self.config.build_timeout,
            self.state_tx.clone(),
            self.events.clone(),
            attach_rx,
        )));
        Ok(())
    }

    /// Returns the current future, for collaborators that need to observe
    /// readiness without issuing a command.
    pub async fn view_future(&self) -> Result<ViewFuture, ViewError> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(ViewError::InstanceClosed);
        }
        match inner.attach_tx.as_ref() {
            Some(attach_tx) => Ok(ViewFuture {
                attach_tx: attach_tx.clone(),
            }),
            None => Err(ViewError::NotCreated),
        }
    }

    /// Queues a method invocation against the view's capability surface and
    /// re-renders once it applied. `Ok` means queued, not executed; failures
    /// against the resolved view are reported through the diagnostic channel.
    pub async fn invoke(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<(), ViewError> {
        self.attach(Attachment::Command(ViewCommand::Invoke {
            method: method.into(),
            args,
        }))
        .await
    }

    /// Hard reset: removes every existing row of `dataset`, inserts `rows`
    /// as the full new dataset, then re-renders. Input is row-oriented.
    pub async fn change_data(&self, dataset: &str, rows: Vec<Row>) -> Result<(), ViewError> {
        self.attach(Attachment::Command(ViewCommand::ChangeData {
            dataset: dataset.to_string(),
            rows,
        }))
        .await
    }

    /// Incremental load: appends `columns` to `dataset` without removing
    /// anything, then re-renders. Input is column-oriented, unlike
    /// [`ViewController::change_data`]; the conversion to rows happens here,
    /// so shape errors fail fast at the call site.
    pub async fn load_data(&self, dataset: &str, columns: ColumnarTable) -> Result<(), ViewError> {
        let rows = columns.into_rows()?;
        self.attach(Attachment::Command(ViewCommand::LoadData {
            dataset: dataset.to_string(),
            rows,
        }))
        .await
    }

    pub async fn add_event_listener(
        &self,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> Result<(), ViewError> {
        self.attach(Attachment::Command(ViewCommand::AddEventListener {
            name: name.into(),
            handler,
        }))
        .await
    }

    pub async fn add_signal_listener(
        &self,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> Result<(), ViewError> {
        self.attach(Attachment::Command(ViewCommand::AddSignalListener {
            name: name.into(),
            handler,
        }))
        .await
    }

    /// Tears the instance down: aborts the driver, drops queued work, and
    /// makes every further attachment fail fast with
    /// [`ViewError::InstanceClosed`].
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.attach_tx = None;
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state_tx.borrow().lifecycle
    }

    /// Readiness observation without issuing a command, for host-side
    /// polling.
    pub fn watch_state(&self) -> watch::Receiver<InstanceState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    async fn attach(&self, attachment: Attachment) -> Result<(), ViewError> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(ViewError::InstanceClosed);
        }
        let Some(attach_tx) = inner.attach_tx.as_ref() else {
            return Err(ViewError::NotCreated);
        };
        attach_tx
            .send(attachment)
            .map_err(|_| ViewError::Abandoned)
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    epoch: u64,
    engine: Arc<dyn RenderEngine>,
    spec: Value,
    options: Value,
    build_timeout: Option<Duration>,
    state_tx: watch::Sender<InstanceState>,
    events: broadcast::Sender<ControllerEvent>,
    mut attach_rx: mpsc::UnboundedReceiver<Attachment>,
) {
    let built = match build_timeout {
        Some(limit) => match tokio::time::timeout(limit, engine.build_view(spec, options)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("view construction timed out after {limit:?}")),
        },
        None => engine.build_view(spec, options).await,
    };

    match built {
        Ok(view) => {
            publish_lifecycle(&state_tx, epoch, Lifecycle::Ready);
            while let Some(attachment) = attach_rx.recv().await {
                match attachment {
                    Attachment::Command(command) => apply_command(view.as_ref(), command, &events),
                    Attachment::Observe(reply) => {
                        let _ = reply.send(Ok(Arc::clone(&view)));
                    }
                }
            }
        }
        Err(err) => {
            publish_lifecycle(&state_tx, epoch, Lifecycle::Failed);
            // One top-level diagnostic per construction attempt. Each queued
            // continuation still observes the rejection individually below.
            error!(epoch, error = %err, "view construction failed");
            let _ = events.send(ControllerEvent::BuildFailed {
                reason: err.to_string(),
            });
            let reason = err.to_string();
            while let Some(attachment) = attach_rx.recv().await {
                match attachment {
                    Attachment::Command(command) => {
                        debug!(
                            epoch,
                            command = command.name(),
                            "dropping command queued against failed view"
                        );
                    }
                    Attachment::Observe(reply) => {
                        let _ = reply.send(Err(ViewError::construction(reason.clone())));
                    }
                }
            }
        }
    }
}

fn publish_lifecycle(state_tx: &watch::Sender<InstanceState>, epoch: u64, lifecycle: Lifecycle) {
    // A superseded driver must not clobber the state of a newer attempt.
    state_tx.send_if_modified(|state| {
        if state.epoch != epoch || state.lifecycle == lifecycle {
            return false;
        }
        state.lifecycle = lifecycle;
        true
    });
}

fn apply_command(
    view: &dyn ViewHandle,
    command: ViewCommand,
    events: &broadcast::Sender<ControllerEvent>,
) {
    let name = command.name();
    let mutated = match command {
        ViewCommand::Invoke { method, args } => view.invoke(&method, &args).map(|()| true),
        ViewCommand::ChangeData { dataset, rows } => view
            .change(&dataset, &Changeset::hard_reset(rows))
            .map(|()| true),
        ViewCommand::LoadData { dataset, rows } => view.insert(&dataset, &rows).map(|()| true),
        ViewCommand::AddEventListener { name, handler } => {
            view.add_event_listener(&name, handler);
            Ok(false)
        }
        ViewCommand::AddSignalListener { name, handler } => {
            view.add_signal_listener(&name, handler);
            Ok(false)
        }
    };
    match mutated {
        Ok(true) => view.run(),
        Ok(false) => {}
        Err(err) => {
            error!(command = name, error = %err, "command failed against resolved view");
            let _ = events.send(ControllerEvent::CommandFailed {
                command: name,
                reason: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
