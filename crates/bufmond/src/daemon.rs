//! bufmond event loop
//!
//! A single task multiplexes store change notifications, the control
//! socket and the shutdown signal. The termination flag is checked once
//! per iteration, so a commit in flight always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::error::{BufmondError, Result};
use crate::reconcile::{PassOutcome, Reconciler};
use crate::store::Store;
use crate::unixctl::{ControlCommand, UnixctlServer};

/// Termination flag shared with signal handlers and the control socket
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`ShutdownSignal::trigger`] has been called
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Why the daemon stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// Catalog committed or already present
    Completed,
    /// `exit` command or signal
    Shutdown,
}

/// Pause after a failed accept on the control socket
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Consecutive accept failures before the control socket is dropped
pub const MAX_ACCEPT_FAILURES: u32 = 20;

/// Tracks consecutive control socket accept failures
#[derive(Debug, Default)]
pub struct AcceptFailures {
    consecutive: u32,
}

impl AcceptFailures {
    /// Records a failure; returns the delay before accepting again, or
    /// `None` once the socket should be given up
    pub fn record(&mut self) -> Option<Duration> {
        self.consecutive += 1;
        (self.consecutive < MAX_ACCEPT_FAILURES).then_some(ACCEPT_RETRY_DELAY)
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}

enum Wake {
    Store,
    Timer,
    Control(UnixStream),
    AcceptFailed(BufmondError),
    Shutdown,
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

async fn accept_on(control: Option<&UnixctlServer>) -> Result<UnixStream> {
    match control {
        Some(server) => server.accept().await,
        None => std::future::pending().await,
    }
}

/// One-shot reconciliation daemon
pub struct Daemon<S: Store> {
    store: S,
    reconciler: Reconciler,
    control: Option<UnixctlServer>,
    accept_failures: AcceptFailures,
    shutdown: Arc<ShutdownSignal>,
}

impl<S: Store> Daemon<S> {
    pub fn new(store: S, readiness_retry: Duration) -> Self {
        Self {
            store,
            reconciler: Reconciler::new(readiness_retry),
            control: None,
            accept_failures: AcceptFailures::default(),
            shutdown: Arc::new(ShutdownSignal::new()),
        }
    }

    /// Serves the control socket from the event loop
    pub fn with_control(mut self, server: UnixctlServer) -> Self {
        self.control = Some(server);
        self
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Runs until the catalog is in place, a fatal error, or shutdown
    pub async fn run(&mut self) -> Result<DaemonExit> {
        info!("bufmond started with {} store", self.store.name());

        loop {
            if self.shutdown.is_set() {
                info!("Shutdown requested, exiting");
                return Ok(DaemonExit::Shutdown);
            }

            if let Err(e) = self.store.run().await {
                warn!("Store refresh failed: {}", e);
            }

            let retry_after = match self.reconciler.on_change(&mut self.store).await {
                PassOutcome::Done => {
                    info!("Reconciliation complete, exiting");
                    return Ok(DaemonExit::Completed);
                }
                PassOutcome::Fatal(e) => return Err(e),
                PassOutcome::Waiting { retry_after } => retry_after,
                PassOutcome::Unchanged => None,
            };

            self.wait_for_event(retry_after).await;
        }
    }

    async fn wait_for_event(&mut self, retry_after: Option<Duration>) {
        let wake = {
            let store = &mut self.store;
            let control = self.control.as_ref();
            let shutdown = &self.shutdown;

            tokio::select! {
                _ = store.wait() => Wake::Store,
                _ = sleep_for(retry_after) => Wake::Timer,
                accepted = accept_on(control) => match accepted {
                    Ok(stream) => Wake::Control(stream),
                    Err(e) => Wake::AcceptFailed(e),
                },
                _ = shutdown.wait() => Wake::Shutdown,
            }
        };

        match wake {
            Wake::Control(stream) => {
                self.accept_failures.reset();
                self.serve_control(stream).await;
            }
            Wake::AcceptFailed(e) => self.on_accept_failure(e).await,
            Wake::Store | Wake::Timer | Wake::Shutdown => {}
        }
    }

    async fn on_accept_failure(&mut self, e: BufmondError) {
        match self.accept_failures.record() {
            Some(delay) => {
                warn!("{}", e);
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(
                    "{} after {} consecutive failures, closing control socket",
                    e,
                    self.accept_failures.count()
                );
                self.control = None;
            }
        }
    }

    async fn serve_control(&self, stream: UnixStream) {
        let Some(server) = self.control.as_ref() else {
            return;
        };
        match server.handle(stream).await {
            Ok(Some(ControlCommand::Exit)) => {
                info!("Received exit command");
                self.shutdown.trigger();
            }
            Ok(None) => {}
            Err(e) => warn!("Control request failed: {}", e),
        }
    }
}
