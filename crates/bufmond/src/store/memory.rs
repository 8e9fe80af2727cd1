//! In-memory store backend
//!
//! Cloned handles share one set of tables. Every mutation bumps the
//! shared sequence number and wakes tasks blocked in [`Store::wait`].
//! Tests use the mutators to stage readiness signals and the status
//! injection to simulate commit conflicts.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{Datum, Row, Schema, Snapshot, Store, Transaction, TxnOp, TxnStatus};
use crate::error::Result;
use crate::tables::bufmon_schema;

#[derive(Debug, Default)]
struct MemoryState {
    tables: Snapshot,
    seqno: u64,
    next_commit: Option<TxnStatus>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    changed: Notify,
}

impl Shared {
    fn mutate<F: FnOnce(&mut Snapshot)>(&self, f: F) {
        {
            let mut state = self.state.lock();
            f(&mut state.tables);
            state.seqno += 1;
        }
        self.changed.notify_waiters();
    }
}

/// Shared in-memory store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    schema: Schema,
    snapshot: Snapshot,
    seqno: u64,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            schema,
            snapshot: Snapshot::new(),
            seqno: 0,
        }
    }

    /// Store with the buffer monitoring tables registered
    pub fn with_bufmon_schema() -> Self {
        Self::new(bufmon_schema())
    }

    /// Inserts or replaces a row
    pub fn set_row(&self, table: &str, key: &str, row: Row) {
        self.shared.mutate(|t| t.insert_row(table, key, row));
    }

    /// Sets one column, creating the row if needed
    pub fn set_column(&self, table: &str, key: &str, column: &str, datum: Datum) {
        self.shared.mutate(|t| t.set_column(table, key, column, datum));
    }

    /// Makes the next commit end with `status` without applying anything
    pub fn inject_commit_status(&self, status: TxnStatus) {
        self.shared.state.lock().next_commit = Some(status);
    }

    /// Row count in the shared tables, independent of the local snapshot
    pub fn shared_row_count(&self, table: &str) -> usize {
        self.shared.state.lock().tables.row_count(table)
    }

    /// Copy of one shared row
    pub fn shared_row(&self, table: &str, key: &str) -> Option<Row> {
        self.shared.state.lock().tables.get(table, key).cloned()
    }

    fn validate(&self, tables: &Snapshot, txn: &Transaction) -> bool {
        txn.ops().iter().all(|op| match op {
            TxnOp::Insert { table, key, row } => {
                !tables.contains_row(table, key)
                    && row
                        .iter()
                        .all(|(column, datum)| self.schema.check(table, column, datum).is_ok())
            }
            TxnOp::Update {
                table,
                key,
                column,
                value,
            } => {
                tables.contains_row(table, key)
                    && self.schema.check(table, column, value).is_ok()
            }
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn run(&mut self) -> Result<()> {
        let state = self.shared.state.lock();
        if state.seqno != self.seqno {
            self.snapshot = state.tables.clone();
            self.seqno = state.seqno;
        }
        Ok(())
    }

    fn change_seqno(&self) -> u64 {
        self.seqno
    }

    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    async fn wait(&mut self) {
        let notified = self.shared.changed.notified();
        if self.shared.state.lock().seqno != self.seqno {
            return;
        }
        notified.await;
    }

    async fn commit(&mut self, txn: Transaction) -> TxnStatus {
        let status = {
            let mut state = self.shared.state.lock();
            if let Some(status) = state.next_commit.take() {
                debug!("Injected commit status: {}", status);
                return status;
            }
            if txn.is_empty() {
                return TxnStatus::Unchanged;
            }
            if !self.validate(&state.tables, &txn) {
                return TxnStatus::Error;
            }

            for op in txn.ops() {
                match op {
                    TxnOp::Insert { table, key, row } => {
                        state.tables.insert_row(table, key, row.clone())
                    }
                    TxnOp::Update {
                        table,
                        key,
                        column,
                        value,
                    } => state.tables.set_column(table, key, column, value.clone()),
                }
            }
            state.seqno += 1;
            TxnStatus::Success
        };
        self.shared.changed.notify_waiters();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{system_fields, BUFMON_TABLE, SYSTEM_TABLE};
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_refreshes_snapshot() {
        let mut store = MemoryStore::with_bufmon_schema();
        let seqno = store.change_seqno();

        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(0));
        assert_eq!(store.snapshot().row_count(SYSTEM_TABLE), 0);

        store.run().await.unwrap();
        assert_eq!(store.snapshot().row_count(SYSTEM_TABLE), 1);
        assert!(store.change_seqno() > seqno);
    }

    #[tokio::test]
    async fn test_run_without_change_keeps_seqno() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        store.run().await.unwrap();
        let seqno = store.change_seqno();

        store.run().await.unwrap();
        assert_eq!(store.change_seqno(), seqno);
    }

    #[tokio::test]
    async fn test_commit_applies_inserts() {
        let mut store = MemoryStore::with_bufmon_schema();
        let mut row = Row::new();
        row.insert("name".to_string(), Datum::String("device/data/NONE/NONE".into()));
        row.insert("hw_unit_id".to_string(), Datum::Integer(0));

        let mut txn = Transaction::new();
        txn.insert(BUFMON_TABLE, "device/data/NONE/NONE", row);

        assert_eq!(store.commit(txn).await, TxnStatus::Success);
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 1);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let mut store = MemoryStore::with_bufmon_schema();

        let mut txn = Transaction::new();
        txn.insert(BUFMON_TABLE, "a", Row::new());
        // no System row to update
        txn.update(
            SYSTEM_TABLE,
            "sys",
            system_fields::BUFMON_INFO,
            Datum::Map(BTreeMap::new()),
        );

        assert_eq!(store.commit(txn).await, TxnStatus::Error);
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 0);
    }

    #[tokio::test]
    async fn test_injected_status() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.inject_commit_status(TxnStatus::TryAgain);

        let mut txn = Transaction::new();
        txn.insert(BUFMON_TABLE, "a", Row::new());
        assert_eq!(store.commit(txn.clone()).await, TxnStatus::TryAgain);
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 0);

        assert_eq!(store.commit(txn).await, TxnStatus::Success);
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 1);
    }

    #[tokio::test]
    async fn test_empty_commit_unchanged() {
        let mut store = MemoryStore::with_bufmon_schema();
        assert_eq!(store.commit(Transaction::new()).await, TxnStatus::Unchanged);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_change() {
        let mut store = MemoryStore::with_bufmon_schema();
        let writer = store.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        });

        tokio::time::timeout(Duration::from_secs(5), store.wait())
            .await
            .unwrap();
        handle.await.unwrap();

        store.run().await.unwrap();
        assert_eq!(store.snapshot().row_count(SYSTEM_TABLE), 1);
    }

    #[tokio::test]
    async fn test_wait_returns_if_already_changed() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));

        tokio::time::timeout(Duration::from_secs(1), store.wait())
            .await
            .unwrap();
    }
}
