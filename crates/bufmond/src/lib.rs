//! Buffer Monitoring Daemon - counter catalog reconciliation
//!
//! bufmond populates the shared store with the buffer monitoring counter
//! catalog produced by `bufmon-gen`, exactly once per store lifetime.
//!
//! Key features:
//! - Wait for the system's first-boot configuration (`System:cur_cfg`)
//! - Locate the catalog in the hardware description directory
//! - Skip loading when the `bufmon` table is already populated
//! - Commit all counter rows and global config in one transaction
//! - Exit once the catalog is committed, on `exit` from the control
//!   socket, or on a fatal configuration error
//!
//! # Architecture
//!
//! ```text
//!  Store change ──► Daemon loop ──► Reconciler ──► gate ──► loader ──► Store::commit
//!  Control socket ──┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod loader;
pub mod reconcile;
pub mod store;
pub mod tables;
pub mod unixctl;

pub use config::BufmondConfig;
pub use daemon::{Daemon, DaemonExit, ShutdownSignal};
pub use error::{BufmondError, Result};
pub use loader::{load, read_catalog, CatalogDocument, LoadOutcome, LoadReport};
pub use reconcile::{PassOutcome, ReconcilePhase, ReconciliationState, Reconciler};
pub use store::{
    memory::MemoryStore, redis_backend::RedisStore, ColumnType, Datum, Row, Schema, Snapshot,
    Store, Transaction, TxnStatus,
};
pub use tables::bufmon_schema;
pub use unixctl::{ControlCommand, UnixctlServer};
