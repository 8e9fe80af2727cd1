//! Shared store abstraction
//!
//! The store is a transactional row database with a registered schema.
//! Each backend replicates the registered tables into a local
//! [`Snapshot`] on [`Store::run`] and bumps its change sequence number
//! whenever the replicated contents move. All writes go through a single
//! [`Transaction`] committed with [`Store::commit`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::{BufmondError, Result};

pub mod memory;
pub mod redis_backend;

/// Column value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    String,
    /// String to string map
    Map,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::String => "string",
            ColumnType::Map => "map",
        };
        f.write_str(name)
    }
}

/// A typed column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Integer(i64),
    String(String),
    Map(BTreeMap<String, String>),
}

impl Datum {
    /// Type of this value
    pub fn column_type(&self) -> ColumnType {
        match self {
            Datum::Integer(_) => ColumnType::Integer,
            Datum::String(_) => ColumnType::String,
            Datum::Map(_) => ColumnType::Map,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Datum::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Datum::Map(v) => Some(v),
            _ => None,
        }
    }
}

/// Column name to value
pub type Row = BTreeMap<String, Datum>;

/// How much of a table a backend replicates into its snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replication {
    /// Keys and column values
    Full,
    /// Keys only; rows appear empty
    KeysOnly,
}

/// Registered table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: BTreeMap<&'static str, ColumnType>,
    pub replication: Replication,
}

/// Registered tables and their typed columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<&'static str, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table and the columns this component reads or writes
    pub fn register_columns(
        mut self,
        table: &'static str,
        replication: Replication,
        columns: &[(&'static str, ColumnType)],
    ) -> Self {
        self.tables.insert(
            table,
            TableSchema {
                columns: columns.iter().copied().collect(),
                replication,
            },
        );
        self
    }

    pub fn table(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.keys().copied()
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        self.tables
            .get(table)
            .and_then(|t| t.columns.get(column))
            .copied()
    }

    /// Validates one attribute against the schema
    pub fn check(&self, table: &str, column: &str, datum: &Datum) -> Result<()> {
        match self.column_type(table, column) {
            None => Err(BufmondError::UnknownRowAttribute {
                table: table.to_string(),
                column: column.to_string(),
            }),
            Some(expected) if expected != datum.column_type() => {
                Err(BufmondError::AttributeType {
                    table: table.to_string(),
                    column: column.to_string(),
                    expected,
                })
            }
            Some(_) => Ok(()),
        }
    }
}

/// Replicated table contents: table -> row key -> row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row(&mut self, table: &str, key: &str, row: Row) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row);
    }

    /// Sets one column, creating the row if needed
    pub fn set_column(&mut self, table: &str, key: &str, column: &str, datum: Datum) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(column.to_string(), datum);
    }

    pub fn remove_row(&mut self, table: &str, key: &str) -> Option<Row> {
        self.tables.get_mut(table).and_then(|t| t.remove(key))
    }

    pub fn get(&self, table: &str, key: &str) -> Option<&Row> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    pub fn rows<'a>(&'a self, table: &str) -> impl Iterator<Item = (&'a str, &'a Row)> + 'a {
        self.tables
            .get(table)
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, r)| (k.as_str(), r)))
    }

    /// First row in key order, for singleton tables
    pub fn first_row(&self, table: &str) -> Option<(&str, &Row)> {
        self.rows(table).next()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.len())
    }

    pub fn contains_row(&self, table: &str, key: &str) -> bool {
        self.get(table, key).is_some()
    }
}

/// A single write within a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Insert {
        table: String,
        key: String,
        row: Row,
    },
    Update {
        table: String,
        key: String,
        column: String,
        value: Datum,
    },
}

impl TxnOp {
    pub fn table(&self) -> &str {
        match self {
            TxnOp::Insert { table, .. } | TxnOp::Update { table, .. } => table,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TxnOp::Insert { key, .. } | TxnOp::Update { key, .. } => key,
        }
    }
}

/// Ordered set of writes committed atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<TxnOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new row
    pub fn insert(&mut self, table: impl Into<String>, key: impl Into<String>, row: Row) {
        self.ops.push(TxnOp::Insert {
            table: table.into(),
            key: key.into(),
            row,
        });
    }

    /// Sets one column of an existing row
    pub fn update(
        &mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        column: impl Into<String>,
        value: Datum,
    ) {
        self.ops.push(TxnOp::Update {
            table: table.into(),
            key: key.into(),
            column: column.into(),
            value,
        });
    }

    pub fn ops(&self) -> &[TxnOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of inserts into a table
    pub fn insert_count(&self, table: &str) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, TxnOp::Insert { .. }) && op.table() == table)
            .count()
    }
}

/// Terminal status of a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Nothing to commit
    Unchanged,
    Incomplete,
    Aborted,
    Success,
    /// Lost a commit race; the caller may retry later
    TryAgain,
    NotLocked,
    Error,
}

impl TxnStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TxnStatus::Success)
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxnStatus::Unchanged => "unchanged",
            TxnStatus::Incomplete => "incomplete",
            TxnStatus::Aborted => "aborted",
            TxnStatus::Success => "success",
            TxnStatus::TryAgain => "try again",
            TxnStatus::NotLocked => "not locked",
            TxnStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Transactional row store with change notifications
#[async_trait]
pub trait Store: Send {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Registered tables
    fn schema(&self) -> &Schema;

    /// Refreshes the local snapshot from the backend.
    ///
    /// Bumps the change sequence number if the replicated contents moved.
    async fn run(&mut self) -> Result<()>;

    /// Current change sequence number
    fn change_seqno(&self) -> u64;

    /// Replicated rows as of the last [`Store::run`]
    fn snapshot(&self) -> &Snapshot;

    /// Blocks until the backend may have changed
    async fn wait(&mut self);

    /// Applies every operation of `txn` atomically
    async fn commit(&mut self, txn: Transaction) -> TxnStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new().register_columns(
            "bufmon",
            Replication::KeysOnly,
            &[("name", ColumnType::String), ("hw_unit_id", ColumnType::Integer)],
        )
    }

    #[test]
    fn test_schema_check() {
        let schema = schema();
        assert!(schema
            .check("bufmon", "name", &Datum::String("x".to_string()))
            .is_ok());

        match schema.check("bufmon", "colour", &Datum::Integer(1)) {
            Err(BufmondError::UnknownRowAttribute { column, .. }) => assert_eq!(column, "colour"),
            other => panic!("Expected UnknownRowAttribute, got {:?}", other),
        }

        match schema.check("bufmon", "hw_unit_id", &Datum::String("0".to_string())) {
            Err(BufmondError::AttributeType { expected, .. }) => {
                assert_eq!(expected, ColumnType::Integer)
            }
            other => panic!("Expected AttributeType, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_unknown_table() {
        assert!(schema()
            .check("System", "cur_cfg", &Datum::Integer(1))
            .is_err());
    }

    #[test]
    fn test_snapshot_rows() {
        let mut snapshot = Snapshot::new();
        snapshot.set_column("System", "b", "cur_cfg", Datum::Integer(2));
        snapshot.set_column("System", "a", "cur_cfg", Datum::Integer(1));

        assert_eq!(snapshot.row_count("System"), 2);
        assert_eq!(snapshot.row_count("bufmon"), 0);

        let (key, row) = snapshot.first_row("System").unwrap();
        assert_eq!(key, "a");
        assert_eq!(row.get("cur_cfg").and_then(Datum::as_integer), Some(1));

        assert!(snapshot.remove_row("System", "a").is_some());
        assert!(!snapshot.contains_row("System", "a"));
    }

    #[test]
    fn test_transaction_ops() {
        let mut txn = Transaction::new();
        assert!(txn.is_empty());

        txn.insert("bufmon", "c1", Row::new());
        txn.insert("bufmon", "c2", Row::new());
        txn.update("System", "s", "bufmon_info", Datum::Map(BTreeMap::new()));

        assert_eq!(txn.len(), 3);
        assert_eq!(txn.insert_count("bufmon"), 2);
        assert_eq!(txn.insert_count("System"), 0);
        assert_eq!(txn.ops()[2].table(), "System");
        assert_eq!(txn.ops()[2].key(), "s");
    }

    #[test]
    fn test_txn_status() {
        assert!(TxnStatus::Success.is_success());
        assert!(!TxnStatus::TryAgain.is_success());
        assert_eq!(TxnStatus::NotLocked.to_string(), "not locked");
    }

    #[test]
    fn test_datum_accessors() {
        assert_eq!(Datum::Integer(4).as_integer(), Some(4));
        assert_eq!(Datum::Integer(4).as_str(), None);
        assert_eq!(Datum::String("x".into()).as_str(), Some("x"));
        assert_eq!(Datum::Map(BTreeMap::new()).column_type(), ColumnType::Map);
    }
}
