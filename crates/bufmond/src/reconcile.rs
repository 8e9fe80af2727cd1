//! Reconciliation state machine
//!
//! ```text
//! WaitingSystem ──► WaitingCatalog ──► CheckingEmpty ──► Loading ──► Done
//!      ▲  │(retry)        │                  │             │
//!      │  ▼               ▼                  └──► Done     │
//!      └─────────── FailedFatal      (load failure) ◄──────┘
//! ```
//!
//! One pass runs per store change sequence number. A pass always starts
//! from `WaitingSystem`; transient failures end the pass and leave the
//! next change to re-drive it. `Done` and `FailedFatal` are terminal.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::BufmondError;
use crate::gate::{self, CatalogLocation};
use crate::loader::{self, LoadOutcome};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    WaitingSystem,
    WaitingCatalog,
    CheckingEmpty,
    Loading,
    Done,
    FailedFatal,
}

impl ReconcilePhase {
    /// No further change notifications are processed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcilePhase::Done | ReconcilePhase::FailedFatal)
    }
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcilePhase::WaitingSystem => "WAITING_SYSTEM",
            ReconcilePhase::WaitingCatalog => "WAITING_CATALOG",
            ReconcilePhase::CheckingEmpty => "CHECKING_EMPTY",
            ReconcilePhase::Loading => "LOADING",
            ReconcilePhase::Done => "DONE",
            ReconcilePhase::FailedFatal => "FAILED_FATAL",
        };
        f.write_str(name)
    }
}

/// Process-local view of the last pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationState {
    pub system_ready: bool,
    pub catalog_loaded: bool,
    pub store_already_populated: bool,
    /// Store sequence number the last pass ran against
    pub change_sequence: Option<u64>,
}

/// Result of one call to [`Reconciler::on_change`]
#[derive(Debug)]
pub enum PassOutcome {
    /// Sequence number did not move; nothing evaluated
    Unchanged,
    /// Not finished; re-check after the delay, or on the next change if none
    Waiting { retry_after: Option<Duration> },
    Done,
    Fatal(BufmondError),
}

/// Drives the gate, guard and loader against a store
#[derive(Debug)]
pub struct Reconciler {
    phase: ReconcilePhase,
    state: ReconciliationState,
    readiness_retry: Duration,
}

impl Reconciler {
    pub fn new(readiness_retry: Duration) -> Self {
        Self {
            phase: ReconcilePhase::WaitingSystem,
            state: ReconciliationState::default(),
            readiness_retry,
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    // Readiness is polled on a timer, not only on change
    fn awaiting_readiness(&self) -> bool {
        self.phase == ReconcilePhase::WaitingSystem && !self.state.system_ready
    }

    fn set_phase(&mut self, phase: ReconcilePhase) {
        if self.phase != phase {
            debug!("Reconcile phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn fail(&mut self, err: BufmondError) -> PassOutcome {
        error!("{}", err);
        self.set_phase(ReconcilePhase::FailedFatal);
        PassOutcome::Fatal(err)
    }

    /// Runs one reconciliation pass if the store changed since the last one
    pub async fn on_change<S: Store + ?Sized>(&mut self, store: &mut S) -> PassOutcome {
        if self.phase.is_terminal() {
            return PassOutcome::Unchanged;
        }

        let seqno = store.change_seqno();
        if self.state.change_sequence == Some(seqno) && !self.awaiting_readiness() {
            return PassOutcome::Unchanged;
        }
        self.state.change_sequence = Some(seqno);

        self.pass(store).await
    }

    async fn pass<S: Store + ?Sized>(&mut self, store: &mut S) -> PassOutcome {
        self.set_phase(ReconcilePhase::WaitingSystem);

        self.state.system_ready = gate::is_system_ready(store.snapshot());
        if !self.state.system_ready {
            debug!("System not configured yet");
            return PassOutcome::Waiting {
                retry_after: Some(self.readiness_retry),
            };
        }

        self.set_phase(ReconcilePhase::WaitingCatalog);
        let path = match gate::locate_catalog(store.snapshot()) {
            CatalogLocation::Found(path) => path,
            CatalogLocation::NoDirectory => {
                return self.fail(BufmondError::catalog_missing(
                    "no hardware description directory recorded",
                ))
            }
            CatalogLocation::Missing(path) => {
                return self.fail(BufmondError::catalog_missing(format!(
                    "{} does not exist",
                    path.display()
                )))
            }
        };

        let doc = match loader::read_catalog(&path) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                info!("Catalog {} is empty, waiting for next change", path.display());
                return PassOutcome::Waiting { retry_after: None };
            }
            Err(e) => {
                warn!("{}, waiting for next change", e);
                return PassOutcome::Waiting { retry_after: None };
            }
        };

        self.set_phase(ReconcilePhase::CheckingEmpty);
        self.state.store_already_populated = gate::is_target_already_populated(store.snapshot());
        if self.state.store_already_populated {
            info!("Counter table already populated, nothing to load");
            self.set_phase(ReconcilePhase::Done);
            return PassOutcome::Done;
        }

        self.set_phase(ReconcilePhase::Loading);
        match loader::load(store, &doc).await {
            Ok(LoadOutcome::Committed(report)) => {
                info!(
                    "Catalog {} loaded: {} counters",
                    path.display(),
                    report.rows_inserted
                );
                self.state.catalog_loaded = true;
                self.set_phase(ReconcilePhase::Done);
                PassOutcome::Done
            }
            Ok(LoadOutcome::AlreadyPopulated) => {
                self.state.store_already_populated = true;
                self.set_phase(ReconcilePhase::Done);
                PassOutcome::Done
            }
            Err(e) if e.is_fatal() => self.fail(e),
            Err(e) => {
                warn!("Load failed, retrying on next change: {}", e);
                self.set_phase(ReconcilePhase::WaitingSystem);
                PassOutcome::Waiting { retry_after: None }
            }
        }
    }
}
