//! Supervision of the terminal-host worker process.
//!
//! The supervisor owns at most one worker for its whole lifetime and is the
//! only component that mutates worker lifecycle state. `start` spawns the
//! worker, establishes the primary connection, and registers the broker
//! listener; `connect` hands out further endpoints into the same worker; the
//! exit of the worker is surfaced exactly once per lifetime. There is no
//! automatic restart — a consumer observing the exit builds a new supervisor
//! if it wants one.

use std::sync::Arc;

use parking_lot::Mutex;
use termhost_protocol::ChannelId;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::broker::{self, RequestBus};
use crate::client::Client;
use crate::config::{Configuration, LoggingFlags, ReconnectConstants};
use crate::debug::{self as debug_args, DebugRequest};
use crate::error::{Error, Result};
use crate::mux::{Endpoint, MuxHandle};
use crate::worker::{WorkerCommand, WorkerExit, WorkerProcess};

/// Lifecycle of the one worker a supervisor may own.
enum State {
    NotStarted,
    /// `start` is in progress; a concurrent `start` must not race it.
    Starting,
    Running(Running),
    Exited,
}

struct Running {
    mux: MuxHandle,
    /// Consumed by `dispose` to ask the monitor task to kill the worker.
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Supervisor for the terminal-host worker process.
pub struct PtyHostSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    command: WorkerCommand,
    reconnect: ReconnectConstants,
    logging: LoggingFlags,
    debug: Option<DebugRequest>,
    bus: Arc<RequestBus>,
    state: Mutex<State>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    broker_task: Mutex<Option<JoinHandle<()>>>,
}

impl PtyHostSupervisor {
    /// Creates a supervisor. Nothing is spawned until [`start`].
    ///
    /// The request bus is passed in rather than discovered globally so the
    /// host decides which requesters can reach this worker.
    ///
    /// [`start`]: PtyHostSupervisor::start
    pub fn new(
        command: WorkerCommand,
        reconnect: ReconnectConstants,
        logging: LoggingFlags,
        debug: Option<DebugRequest>,
        bus: Arc<RequestBus>,
    ) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                command,
                reconnect,
                logging,
                debug,
                bus,
                state: Mutex::new(State::NotStarted),
                exit_tx,
                broker_task: Mutex::new(None),
            }),
        }
    }

    /// Spawns the worker and establishes the primary connection.
    ///
    /// Must be called from within a tokio runtime. At most one successful
    /// `start` per supervisor lifetime; a failed spawn aborts the call
    /// entirely and leaves the supervisor startable again.
    pub fn start(&self, last_session_id: u64) -> Result<ConnectionHandle> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                State::NotStarted => *state = State::Starting,
                _ => return Err(Error::AlreadyStarted),
            }
        }

        match self.inner.start_worker(last_session_id) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                *self.inner.state.lock() = State::NotStarted;
                Err(e)
            }
        }
    }

    /// Opens a new endpoint into the running worker.
    pub fn connect(&self) -> Result<Endpoint> {
        self.inner.connect()
    }

    /// Kills the worker if it is still running, waits for its exit event,
    /// and stops the broker listener.
    pub async fn dispose(&self) {
        self.inner.dispose().await;
    }

    /// Observer for the worker's exit. Holds `None` until the worker
    /// terminated; set exactly once per worker lifetime.
    pub fn exits(&self) -> watch::Receiver<Option<WorkerExit>> {
        self.inner.exit_tx.subscribe()
    }

    /// Number of currently open endpoints into the worker.
    pub fn active_endpoints(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Running(running) => running.mux.active_endpoints(),
            _ => 0,
        }
    }
}

impl Inner {
    fn start_worker(self: &Arc<Self>, last_session_id: u64) -> Result<ConnectionHandle> {
        let configuration = Configuration::build(last_session_id, self.reconnect, self.logging);
        let launch_args = debug_args::launch_args(self.debug.as_ref());

        let mut worker = WorkerProcess::spawn(&self.command, &configuration, &launch_args)?;
        let stdin = worker
            .child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("worker stdin not piped".to_string()))?;
        let stdout = worker
            .child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("worker stdout not piped".to_string()))?;

        let mux = MuxHandle::spawn(stdin, stdout);
        let primary = mux.open()?;
        let primary_channel = primary.id();
        let client = Client::new(primary);

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.state.lock() = State::Running(Running {
            mux,
            kill_tx: Some(kill_tx),
        });

        self.register_broker();
        self.spawn_monitor(worker, kill_rx);

        info!(
            target = "termhost",
            last_session_id, primary_channel, "terminal-host worker started"
        );

        Ok(ConnectionHandle {
            client,
            primary_channel,
            inner: Arc::clone(self),
        })
    }

    fn connect(&self) -> Result<Endpoint> {
        match &*self.state.lock() {
            State::Running(running) => running.mux.open(),
            _ => Err(Error::NoActiveWorker),
        }
    }

    /// Starts serving bus requests. Idempotent: the bus hands out its
    /// receiver only once, so a second registration is a no-op.
    fn register_broker(self: &Arc<Self>) {
        let Some(mut requests) = self.bus.take_receiver() else {
            return;
        };
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                // Requests are independent; serve each on its own task so
                // none can delay another.
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    broker::serve_request(request, || inner.connect());
                });
            }
        });
        *self.broker_task.lock() = Some(task);
    }

    fn spawn_monitor(self: &Arc<Self>, worker: WorkerProcess, mut kill_rx: oneshot::Receiver<()>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut child = worker.child;
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                // Fires on an explicit dispose.
                _ = &mut kill_rx => None,
            };
            let status = match status {
                Some(status) => Some(status),
                None => {
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            };

            let exit = status.map(WorkerExit::from).unwrap_or(WorkerExit {
                code: None,
                success: false,
            });

            *inner.state.lock() = State::Exited;
            inner.exit_tx.send_replace(Some(exit));
            debug!(
                target = "termhost",
                code = ?exit.code,
                success = exit.success,
                "terminal-host worker exited"
            );
        });
    }

    async fn dispose(&self) {
        let kill_tx = match &mut *self.state.lock() {
            State::Running(running) => running.kill_tx.take(),
            _ => None,
        };

        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
            let mut exits = self.exit_tx.subscribe();
            let _ = exits.wait_for(Option::is_some).await;
        }

        if let Some(task) = self.broker_task.lock().take() {
            task.abort();
        }
    }
}

/// Handle returned by [`PtyHostSupervisor::start`].
///
/// Bundles the structured client wrapping the primary endpoint with the
/// operations callers need against the running worker.
pub struct ConnectionHandle {
    client: Client,
    primary_channel: ChannelId,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("primary_channel", &self.primary_channel)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// The structured client over the primary endpoint.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Raw channel id of the primary endpoint.
    pub fn primary_channel(&self) -> ChannelId {
        self.primary_channel
    }

    /// Opens a further endpoint into the same worker.
    pub fn connect(&self) -> Result<Endpoint> {
        self.inner.connect()
    }

    /// Observer for the worker's exit event.
    pub fn exits(&self) -> watch::Receiver<Option<WorkerExit>> {
        self.inner.exit_tx.subscribe()
    }

    /// Waits for the worker to terminate.
    pub async fn wait_for_exit(&self) -> WorkerExit {
        let mut exits = self.exits();
        match exits.wait_for(Option::is_some).await {
            Ok(value) => (*value).unwrap_or(WorkerExit {
                code: None,
                success: false,
            }),
            // Sender gone without a value: treat as an unclean death.
            Err(_) => WorkerExit {
                code: None,
                success: false,
            },
        }
    }

    /// Closes the structured client and shuts the worker down.
    pub async fn dispose(self) {
        self.client.dispose();
        self.inner.dispose().await;
    }
}
