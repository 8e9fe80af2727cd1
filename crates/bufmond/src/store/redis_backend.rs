//! Redis store backend
//!
//! Rows are hashes keyed `<table>|<row-key>`. Integer and string columns
//! are stored as plain hash fields, map columns as JSON-encoded fields.
//! Rows without columns carry the `NULL` placeholder field so the hash
//! exists.
//!
//! Redis has no change feed the daemon can rely on here, so [`Store::wait`]
//! sleeps for the poll interval and [`Store::run`] compares the refreshed
//! snapshot with the previous one.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::{
    ColumnType, Datum, Replication, Row, Schema, Snapshot, Store, Transaction, TxnOp, TxnStatus,
};
use crate::error::{BufmondError, Result};

/// Field written to rows that have no columns
pub const NULL_FIELD: &str = "NULL";

/// Store backed by a Redis database
pub struct RedisStore {
    endpoint: String,
    client: redis::Client,
    connection: ConnectionManager,
    schema: Schema,
    snapshot: Snapshot,
    seqno: u64,
    poll_interval: Duration,
}

impl RedisStore {
    /// Connects to `endpoint` (e.g. `redis+unix:///var/run/redis/redis.sock?db=4`).
    pub async fn connect(endpoint: &str, schema: Schema, poll_interval: Duration) -> Result<Self> {
        let client = redis::Client::open(endpoint)
            .map_err(|e| BufmondError::store_io("open", format!("{}: {}", endpoint, e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| BufmondError::store_io("connect", e.to_string()))?;

        info!("Connected to store at {}", endpoint);

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            connection,
            schema,
            snapshot: Snapshot::new(),
            seqno: 0,
            poll_interval,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Watches every key `txn` touches and checks that no inserted row
    /// exists yet.
    ///
    /// Fails with `Aborted` when an insert targets an existing row and with
    /// `Error` when the store cannot be reached.
    pub async fn watch(
        &self,
        txn: Transaction,
    ) -> std::result::Result<WatchedTransaction, TxnStatus> {
        // WATCH state is per connection; the manager's connection is shared
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                warn!("Failed to open transaction connection: {}", e);
                TxnStatus::Error
            })?;

        let mut watched: Vec<String> = txn
            .ops()
            .iter()
            .map(|op| redis_key(op.table(), op.key()))
            .collect();
        watched.sort();
        watched.dedup();

        let _: () = redis::cmd("WATCH")
            .arg(&watched)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!("WATCH failed: {}", e);
                TxnStatus::Error
            })?;

        // An insert must not land on a row another writer created first
        for op in txn.ops() {
            if let TxnOp::Insert { table, key, .. } = op {
                let exists: bool = conn.exists(redis_key(table, key)).await.map_err(|e| {
                    warn!("EXISTS failed: {}", e);
                    TxnStatus::Error
                })?;
                if exists {
                    debug!("Row {}|{} already exists", table, key);
                    let _: redis::RedisResult<()> =
                        redis::cmd("UNWATCH").query_async(&mut conn).await;
                    return Err(TxnStatus::Aborted);
                }
            }
        }

        Ok(WatchedTransaction { conn, txn })
    }

    async fn read_table(
        &mut self,
        snapshot: &mut Snapshot,
        table: &'static str,
        replication: Replication,
    ) -> Result<()> {
        let pattern = format!("{}|*", table);
        let keys: Vec<String> = self
            .connection
            .keys(&pattern)
            .await
            .map_err(|e| BufmondError::store_io("keys", e.to_string()))?;

        for key in keys {
            let Some((_, row_key)) = key.split_once('|') else {
                continue;
            };

            let row = match replication {
                Replication::KeysOnly => Row::new(),
                Replication::Full => {
                    let fields: HashMap<String, String> = self
                        .connection
                        .hgetall(&key)
                        .await
                        .map_err(|e| BufmondError::store_io("hgetall", e.to_string()))?;
                    decode_row(&self.schema, table, fields)
                }
            };
            snapshot.insert_row(table, row_key, row);
        }
        Ok(())
    }
}

/// Encodes a column value as a hash field value
pub fn encode_datum(datum: &Datum) -> String {
    match datum {
        Datum::Integer(v) => v.to_string(),
        Datum::String(v) => v.clone(),
        // string maps always serialize
        Datum::Map(m) => serde_json::to_string(m).unwrap_or_default(),
    }
}

/// Decodes a hash field value according to its column type
pub fn decode_datum(column_type: ColumnType, value: &str) -> Option<Datum> {
    match column_type {
        ColumnType::Integer => value.trim().parse().ok().map(Datum::Integer),
        ColumnType::String => Some(Datum::String(value.to_string())),
        ColumnType::Map => serde_json::from_str::<BTreeMap<String, String>>(value)
            .ok()
            .map(Datum::Map),
    }
}

/// Decodes the registered columns of one hash, skipping the rest
pub fn decode_row(schema: &Schema, table: &str, fields: HashMap<String, String>) -> Row {
    let mut row = Row::new();
    for (column, value) in fields {
        let Some(column_type) = schema.column_type(table, &column) else {
            continue;
        };
        match decode_datum(column_type, &value) {
            Some(datum) => {
                row.insert(column, datum);
            }
            None => warn!(
                table = %table,
                column = %column,
                "Ignoring {} value that is not a valid {}",
                value,
                column_type
            ),
        }
    }
    row
}

/// Hash fields written for an inserted row
pub fn encode_row(row: &Row) -> Vec<(String, String)> {
    if row.is_empty() {
        return vec![(NULL_FIELD.to_string(), NULL_FIELD.to_string())];
    }
    row.iter()
        .map(|(column, datum)| (column.clone(), encode_datum(datum)))
        .collect()
}

fn redis_key(table: &str, key: &str) -> String {
    format!("{}|{}", table, key)
}

#[async_trait]
impl Store for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn run(&mut self) -> Result<()> {
        let tables: Vec<_> = self
            .schema
            .table_names()
            .filter_map(|t| self.schema.table(t).map(|s| (t, s.replication)))
            .collect();

        let mut snapshot = Snapshot::new();
        for (table, replication) in tables {
            self.read_table(&mut snapshot, table, replication).await?;
        }

        if snapshot != self.snapshot {
            self.seqno += 1;
            self.snapshot = snapshot;
            debug!("Store snapshot changed, seqno {}", self.seqno);
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
        tokio::time::sleep(self.poll_interval).await;
    }

    async fn commit(&mut self, txn: Transaction) -> TxnStatus {
        if txn.is_empty() {
            return TxnStatus::Unchanged;
        }
        match self.watch(txn).await {
            Ok(watched) => watched.exec().await,
            Err(status) => status,
        }
    }
}

/// A transaction whose keys are watched on its own connection.
///
/// Any write to a watched key before [`WatchedTransaction::exec`] makes
/// the transaction end with [`TxnStatus::TryAgain`].
pub struct WatchedTransaction {
    conn: MultiplexedConnection,
    txn: Transaction,
}

impl WatchedTransaction {
    /// Runs the transaction as one `MULTI`/`EXEC` block
    pub async fn exec(mut self) -> TxnStatus {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in self.txn.ops() {
            match op {
                TxnOp::Insert { table, key, row } => {
                    let fields = encode_row(row);
                    pipe.hset_multiple(redis_key(table, key), fields.as_slice())
                        .ignore();
                }
                TxnOp::Update {
                    table,
                    key,
                    column,
                    value,
                } => {
                    pipe.hset(redis_key(table, key), column, encode_datum(value))
                        .ignore();
                }
            }
        }

        let result: redis::RedisResult<Option<redis::Value>> =
            pipe.query_async(&mut self.conn).await;
        match result {
            Ok(Some(_)) => TxnStatus::Success,
            // EXEC returned nil: a watched key changed
            Ok(None) => TxnStatus::TryAgain,
            Err(e) => {
                warn!("EXEC failed: {}", e);
                TxnStatus::Error
            }
        }
    }
}
