//! Lifecycle handle for the long-poll transport.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    reqwest::Client,
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use vkbridge_config::PollingConfig;

use crate::{
    acquire::{PollScope, SessionAcquirer},
    error::{Context, Error, Result},
    poll_loop::{self, PollContext},
    session::{PollMode, Session},
    sink::{CursorHandler, Handlers, UpdateHandler},
    update::Update,
};

/// Where the transport is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No network activity.
    Stopped,
    /// `start()` is acquiring the first session.
    Starting,
    /// Issuing polls.
    Polling,
    /// A poll failed; waiting out the backoff or escalating.
    Recovering,
    /// Building a new session. Lasting long here means the API is refusing
    /// sessions.
    Reacquiring,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Polling => "polling",
            Self::Recovering => "recovering",
            Self::Reacquiring => "reacquiring",
        };
        f.write_str(s)
    }
}

/// State and cursor published by the loop for observers.
pub(crate) struct Status {
    state: watch::Sender<TransportState>,
    cursor: AtomicU64,
}

impl Status {
    fn new(cursor: u64) -> Self {
        Self {
            state: watch::Sender::new(TransportState::Stopped),
            cursor: AtomicU64::new(cursor),
        }
    }

    pub(crate) fn set_state(&self, state: TransportState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    pub(crate) fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub(crate) fn set_cursor(&self, cursor: u64) {
        self.cursor.store(cursor, Ordering::Release);
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }
}

/// Tuning for a [`LongPollTransport`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub scope: PollScope,
    pub mode: PollMode,
    /// Consecutive transient failures tolerated before reacquiring.
    pub retry_limit: u32,
    /// Wait before retrying a transient failure.
    pub retry_backoff: Duration,
    /// Wait between failed reacquisition attempts.
    pub reacquire_wait: Duration,
    /// Upper bound for one poll request, body included.
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            scope: PollScope::from_group_id(config.group_id),
            mode: PollMode::DEFAULT,
            retry_limit: config.retry_limit,
            retry_backoff: config.retry_backoff(),
            reacquire_wait: config.wait(),
            request_timeout: config.request_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
            pool_max_idle_per_host: config.pool_max_idle_per_host,
        }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

/// Long-poll update transport.
///
/// Register a subscriber, call [`start`](Self::start), and updates flow to
/// the subscriber until [`stop`](Self::stop). Recoverable failures never
/// reach the caller; watch [`watch_state`](Self::watch_state) to notice a
/// transport stuck reacquiring.
pub struct LongPollTransport {
    acquirer: Arc<dyn SessionAcquirer>,
    client: Client,
    options: PollOptions,
    handlers: Arc<Handlers>,
    status: Arc<Status>,
    /// Parked here while stopped; owned by the loop task while running.
    session: Option<Session>,
    task: Option<JoinHandle<Session>>,
    cancel: CancellationToken,
}

impl LongPollTransport {
    /// Build a transport with its own pooled HTTP client.
    pub fn new(acquirer: impl SessionAcquirer + 'static, options: PollOptions) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .context("failed to build long-poll HTTP client")?;
        Ok(Self::with_client(acquirer, options, client))
    }

    /// Build a transport on a caller-provided client.
    #[must_use]
    pub fn with_client(
        acquirer: impl SessionAcquirer + 'static,
        options: PollOptions,
        client: Client,
    ) -> Self {
        let cancel = CancellationToken::new();
        cancel.cancel();
        Self {
            acquirer: Arc::new(acquirer),
            client,
            session: Some(Session::new(options.mode, 0)),
            options,
            handlers: Arc::new(Handlers::default()),
            status: Arc::new(Status::new(0)),
            task: None,
            cancel,
        }
    }

    /// Resume from a cursor persisted by an earlier run. It takes precedence
    /// over the cursor handed out at acquisition. Zero means none.
    #[must_use]
    pub fn with_cursor(mut self, cursor: u64) -> Self {
        self.session = Some(Session::new(self.options.mode, cursor));
        self.status.set_cursor(cursor);
        self
    }

    /// Register the update subscriber, replacing any previous one.
    pub fn subscribe(&self, handler: impl UpdateHandler + 'static) {
        self.handlers.set_updates(Arc::new(handler));
    }

    /// Register the cursor subscriber, replacing any previous one.
    pub fn subscribe_to_cursor_updates(&self, handler: impl CursorHandler + 'static) {
        self.handlers.set_cursor(Arc::new(handler));
    }

    /// Subscribe a bounded channel and return its receiving end.
    ///
    /// A full channel holds up the poll loop.
    pub fn update_stream(&self, capacity: usize) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribe(tx);
        rx
    }

    /// Acquire a session and spawn the poll loop.
    ///
    /// Fails without touching the network if already started, if no
    /// update subscriber is registered, or if the loop from an earlier
    /// [`stop`](Self::stop) is still stuck in its last cycle. An acquisition
    /// failure leaves the transport stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }
        if self.handlers.updates().is_none() {
            return Err(Error::NoSubscriber);
        }

        let mut session = self.reclaim_session().await?;
        self.status.set_state(TransportState::Starting);

        let server = match self.acquirer.acquire(self.options.scope).await {
            Ok(server) => server,
            Err(e) => {
                warn!(error = %e, scope = ?self.options.scope, "long-poll session acquisition failed");
                self.session = Some(session);
                self.status.set_state(TransportState::Stopped);
                return Err(e.into());
            },
        };
        session.bind(server);
        self.status.set_cursor(session.cursor());

        self.cancel = CancellationToken::new();
        let ctx = PollContext {
            client: self.client.clone(),
            acquirer: Arc::clone(&self.acquirer),
            scope: self.options.scope,
            retry_limit: self.options.retry_limit,
            retry_backoff: self.options.retry_backoff,
            reacquire_wait: self.options.reacquire_wait,
            request_timeout: self.options.request_timeout,
            handlers: Arc::clone(&self.handlers),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
        };
        self.status.set_state(TransportState::Polling);
        self.task = Some(tokio::spawn(poll_loop::run(session, ctx)));
        Ok(())
    }

    /// Stop polling. Never blocks and is safe to call in any state.
    ///
    /// A request already in flight completes in the background; a later
    /// [`start`](Self::start) waits for it.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(cursor = self.cursor(), "stopping long polling");
            self.cancel.cancel();
        }
        self.status.set_state(TransportState::Stopped);
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.status.state()
    }

    /// Receiver that sees every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.status.state.subscribe()
    }

    /// Last validated cursor.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.status.cursor()
    }

    /// Take the session back from the previous loop, or from the parking
    /// slot.
    ///
    /// A stopped loop gets one request timeout to finish its last cycle. A
    /// subscriber that blocks longer keeps the task alive, and the caller
    /// gets [`Error::Stopping`].
    async fn reclaim_session(&mut self) -> Result<Session> {
        let grace = self.options.request_timeout;
        if let Some(task) = self.task.as_mut() {
            let Ok(joined) = tokio::time::timeout(grace, task).await else {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "previous poll loop has not finished its last cycle"
                );
                return Err(Error::Stopping);
            };
            self.task = None;
            match joined {
                Ok(session) => return Ok(session),
                Err(e) => warn!(error = %e, "poll loop task failed, rebuilding session"),
            }
        }
        Ok(self
            .session
            .take()
            .unwrap_or_else(|| Session::new(self.options.mode, self.status.cursor())))
    }
}

impl fmt::Debug for LongPollTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongPollTransport")
            .field("options", &self.options)
            .field("state", &self.state())
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

impl Drop for LongPollTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
