//! Transactional catalog loader
//!
//! Turns the catalog document into a single store transaction:
//! - one counter row per `counters` entry, attributes checked against
//!   the schema and dropped individually when rejected
//! - the remaining top-level fields as `System:bufmon_info`
//! - fixed runtime defaults as `System:bufmon_config`

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sonic_bufmon_catalog::{counter_fields, COUNTERS_FIELD};

use crate::error::{BufmondError, Result};
use crate::gate::is_target_already_populated;
use crate::store::{ColumnType, Datum, Row, Schema, Snapshot, Store, Transaction, TxnStatus};
use crate::tables::{
    bufmon_config_defaults, bufmon_fields, system_fields, BUFMON_TABLE, SYSTEM_TABLE,
};

/// Parsed catalog document
pub type CatalogDocument = Mapping;

/// What a committed load wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_inserted: usize,
    /// Attributes rejected by the schema
    pub dropped_attributes: usize,
    pub global_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed(LoadReport),
    /// The counter table already had rows; nothing was written
    AlreadyPopulated,
}

/// Reads and parses the catalog.
///
/// Returns `Ok(None)` for an empty document. A file that cannot be read
/// or parsed may still be mid-write and yields
/// [`BufmondError::CatalogParseIncomplete`].
pub fn read_catalog(path: &Path) -> Result<Option<CatalogDocument>> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|e| BufmondError::parse_incomplete(&display, e.to_string()))?;

    let blank = content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if blank {
        return Ok(None);
    }

    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| BufmondError::parse_incomplete(&display, e.to_string()))?;

    match value {
        Value::Null => Ok(None),
        Value::Mapping(doc) if doc.is_empty() => Ok(None),
        Value::Mapping(doc) => Ok(Some(doc)),
        _ => Err(BufmondError::parse_incomplete(
            display,
            "top level is not a mapping",
        )),
    }
}

/// Renders a top-level value the way it is stored in the global config.
///
/// Booleans are capitalized and null is `None`, matching the records
/// consumers of `bufmon_info` already parse.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Converts a catalog attribute to a column value of the given type
pub fn datum_from_yaml(column_type: ColumnType, value: &Value) -> Option<Datum> {
    match column_type {
        ColumnType::Integer => match value {
            Value::Number(n) => n.as_i64().map(Datum::Integer),
            Value::String(s) => s.trim().parse().ok().map(Datum::Integer),
            _ => None,
        },
        ColumnType::String => scalar(value).map(Datum::String),
        ColumnType::Map => {
            let mapping = value.as_mapping()?;
            let mut map = BTreeMap::new();
            for (k, v) in mapping {
                map.insert(scalar(k)?, scalar(v)?);
            }
            Some(Datum::Map(map))
        }
    }
}

fn build_row(schema: &Schema, entry: &Mapping, dropped: &mut usize) -> Row {
    let mut row = Row::new();
    for (key, value) in entry {
        let Some(column) = key.as_str() else {
            warn!("Ignoring counter attribute with non-string key {:?}", key);
            *dropped += 1;
            continue;
        };

        let checked = match schema.column_type(BUFMON_TABLE, column) {
            Some(_) if bufmon_fields::RUNTIME_COLUMNS.contains(&column) => {
                Err(BufmondError::RuntimeAttribute {
                    table: BUFMON_TABLE.to_string(),
                    column: column.to_string(),
                })
            }
            None => Err(BufmondError::UnknownRowAttribute {
                table: BUFMON_TABLE.to_string(),
                column: column.to_string(),
            }),
            Some(column_type) => datum_from_yaml(column_type, value).ok_or_else(|| {
                BufmondError::AttributeType {
                    table: BUFMON_TABLE.to_string(),
                    column: column.to_string(),
                    expected: column_type,
                }
            }),
        };

        match checked {
            Ok(datum) => {
                row.insert(column.to_string(), datum);
            }
            Err(e) => {
                warn!(table = %BUFMON_TABLE, column = %column, "Dropping attribute: {}", e);
                *dropped += 1;
            }
        }
    }
    row
}

fn row_key(row: &Row, used: &mut HashSet<String>) -> String {
    let name = row
        .get(counter_fields::NAME)
        .and_then(Datum::as_str)
        .filter(|name| !name.is_empty() && !used.contains(*name));

    let key = match name {
        Some(name) => name.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    used.insert(key.clone());
    key
}

/// Builds the single load transaction without committing it
pub fn build_transaction(
    schema: &Schema,
    snapshot: &Snapshot,
    doc: &CatalogDocument,
) -> Result<(Transaction, LoadReport)> {
    let system_key = snapshot
        .first_row(SYSTEM_TABLE)
        .map(|(key, _)| key.to_string())
        .ok_or_else(|| BufmondError::MissingSystemRow {
            table: SYSTEM_TABLE.to_string(),
        })?;

    let mut txn = Transaction::new();
    let mut report = LoadReport::default();
    let mut used = HashSet::new();

    for (field, value) in doc {
        let name = scalar_to_string(field);
        if name != COUNTERS_FIELD {
            report.global_config.insert(name, scalar_to_string(value));
            continue;
        }

        let Some(entries) = value.as_sequence() else {
            warn!("Catalog field '{}' is not a sequence, no counters loaded", COUNTERS_FIELD);
            continue;
        };

        for entry in entries {
            let Some(entry) = entry.as_mapping() else {
                warn!("Skipping counter entry that is not a mapping");
                continue;
            };
            let row = build_row(schema, entry, &mut report.dropped_attributes);
            let key = row_key(&row, &mut used);
            txn.insert(BUFMON_TABLE, key, row);
            report.rows_inserted += 1;
        }
    }

    txn.update(
        SYSTEM_TABLE,
        system_key.as_str(),
        system_fields::BUFMON_INFO,
        Datum::Map(report.global_config.clone()),
    );
    txn.update(
        SYSTEM_TABLE,
        system_key.as_str(),
        system_fields::BUFMON_CONFIG,
        Datum::Map(bufmon_config_defaults()),
    );

    Ok((txn, report))
}

/// Loads the catalog into the store in one transaction.
///
/// Skips when the counter table is already populated. Only a `Success`
/// commit counts; any other status is returned as an error and left for
/// the next reconciliation pass.
pub async fn load<S: Store + ?Sized>(store: &mut S, doc: &CatalogDocument) -> Result<LoadOutcome> {
    if is_target_already_populated(store.snapshot()) {
        info!("Table {} already populated, skipping load", BUFMON_TABLE);
        return Ok(LoadOutcome::AlreadyPopulated);
    }

    let (txn, report) = build_transaction(store.schema(), store.snapshot(), doc)?;
    debug!(
        "Committing {} counter rows ({} operations)",
        report.rows_inserted,
        txn.len()
    );

    let status = store.commit(txn).await;
    if status.is_success() {
        debug!("Transaction status: {}", status);
        info!(
            "Loaded {} counters into {} ({} attributes dropped)",
            report.rows_inserted, BUFMON_TABLE, report.dropped_attributes
        );
        return Ok(LoadOutcome::Committed(report));
    }

    warn!("Transaction status: {}", status);
    match status {
        TxnStatus::Error => Err(BufmondError::store_io(
            "commit",
            format!("{} backend reported an error", store.name()),
        )),
        status => Err(BufmondError::StoreTransactionConflict { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::TxnOp;
    use crate::tables::bufmon_schema;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const CATALOG: &str = r#"
cap_mode_current: true
cap_mode_peak: true
cap_snapshot_on_threshold_trigger: false
cap_threshold_trigger_collection: true
counters:
- name: device/data/NONE/NONE
  hw_unit_id: 0
  counter_vendor_specific_info:
    counter_name: data
    realm: device
- name: ingress-service-pool/um-share-buffer-count/1/NONE
  hw_unit_id: 0
  colour: blue
  counter_vendor_specific_info:
    counter_name: um-share-buffer-count
    realm: ingress-service-pool
    service-pool: '1'
"#;

    fn doc(text: &str) -> CatalogDocument {
        serde_yaml::from_str(text).unwrap()
    }

    fn system_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        snapshot
    }

    #[test]
    fn test_read_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bufmond.yaml");

        std::fs::write(&path, "").unwrap();
        assert!(read_catalog(&path).unwrap().is_none());

        std::fs::write(&path, "# header only\n").unwrap();
        assert!(read_catalog(&path).unwrap().is_none());

        std::fs::write(&path, CATALOG).unwrap();
        let doc = read_catalog(&path).unwrap().unwrap();
        assert!(doc.contains_key("counters"));
    }

    #[test]
    fn test_read_truncated_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bufmond.yaml");
        std::fs::write(&path, "counters:\n- name: \"device/da").unwrap();

        let err = read_catalog(&path).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, BufmondError::CatalogParseIncomplete { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_catalog(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, BufmondError::CatalogParseIncomplete { .. }));
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&Value::Bool(true)), "True");
        assert_eq!(scalar_to_string(&Value::Bool(false)), "False");
        assert_eq!(scalar_to_string(&Value::Null), "None");
        let parsed: Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(scalar_to_string(&parsed), "True");
        assert_eq!(scalar_to_string(&Value::Number(60.into())), "60");
        assert_eq!(scalar_to_string(&Value::String("peak".into())), "peak");
    }

    #[test]
    fn test_datum_from_yaml() {
        assert_eq!(
            datum_from_yaml(ColumnType::Integer, &Value::Number(3.into())),
            Some(Datum::Integer(3))
        );
        assert_eq!(
            datum_from_yaml(ColumnType::Integer, &Value::String("x".into())),
            None
        );
        assert_eq!(
            datum_from_yaml(ColumnType::String, &Value::Number(3.into())),
            Some(Datum::String("3".into()))
        );

        let map: Value = serde_yaml::from_str("{port: '1', queue: 2}").unwrap();
        let datum = datum_from_yaml(ColumnType::Map, &map).unwrap();
        assert_eq!(
            datum.as_map().and_then(|m| m.get("queue")).map(String::as_str),
            Some("2")
        );

        let nested: Value = serde_yaml::from_str("{port: [1, 2]}").unwrap();
        assert_eq!(datum_from_yaml(ColumnType::Map, &nested), None);
    }

    #[test]
    fn test_build_transaction() {
        let schema = bufmon_schema();
        let (txn, report) = build_transaction(&schema, &system_snapshot(), &doc(CATALOG)).unwrap();

        assert_eq!(report.rows_inserted, 2);
        assert_eq!(report.dropped_attributes, 1);
        assert_eq!(txn.insert_count(BUFMON_TABLE), 2);
        // two inserts plus bufmon_info and bufmon_config
        assert_eq!(txn.len(), 4);

        let expected: BTreeMap<String, String> = [
            ("cap_mode_current", "True"),
            ("cap_mode_peak", "True"),
            ("cap_snapshot_on_threshold_trigger", "False"),
            ("cap_threshold_trigger_collection", "True"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(report.global_config, expected);
    }

    #[test]
    fn test_runtime_attributes_dropped() {
        let text = r#"
counters:
- name: device/data/NONE/NONE
  hw_unit_id: 0
  enabled: 'true'
  trigger_threshold: 80
  counter_value: 12
  status: ok
"#;
        let (txn, report) =
            build_transaction(&bufmon_schema(), &system_snapshot(), &doc(text)).unwrap();
        assert_eq!(report.rows_inserted, 1);
        assert_eq!(report.dropped_attributes, 4);

        let TxnOp::Insert { row, .. } = &txn.ops()[0] else {
            panic!("Expected the counter insert first");
        };
        let columns: Vec<_> = row.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["hw_unit_id", "name"]);
    }

    #[test]
    fn test_build_transaction_without_system_row() {
        let err = build_transaction(&bufmon_schema(), &Snapshot::new(), &doc(CATALOG)).unwrap_err();
        assert!(matches!(err, BufmondError::MissingSystemRow { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_keys() {
        let text = r#"
counters:
- name: a/b/NONE/NONE
  hw_unit_id: 0
- name: a/b/NONE/NONE
  hw_unit_id: 0
- hw_unit_id: 0
"#;
        let (txn, _) = build_transaction(&bufmon_schema(), &system_snapshot(), &doc(text)).unwrap();
        let keys: Vec<_> = txn.ops()[..3].iter().map(|op| op.key().to_string()).collect();

        assert_eq!(keys[0], "a/b/NONE/NONE");
        assert_ne!(keys[1], keys[0]);
        assert!(Uuid::parse_str(&keys[1]).is_ok());
        assert!(Uuid::parse_str(&keys[2]).is_ok());
    }

    #[tokio::test]
    async fn test_load_commits() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        store.run().await.unwrap();

        let outcome = load(&mut store, &doc(CATALOG)).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Committed(ref r) if r.rows_inserted == 2));
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 2);

        let system = store.shared_row(SYSTEM_TABLE, "sys").unwrap();
        let config = system
            .get(system_fields::BUFMON_CONFIG)
            .and_then(Datum::as_map)
            .unwrap();
        assert_eq!(config, &bufmon_config_defaults());

        let device = store
            .shared_row(BUFMON_TABLE, "device/data/NONE/NONE")
            .unwrap();
        assert_eq!(device.get("hw_unit_id"), Some(&Datum::Integer(0)));
    }

    #[tokio::test]
    async fn test_load_conflict() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        store.run().await.unwrap();
        store.inject_commit_status(TxnStatus::TryAgain);

        let err = load(&mut store, &doc(CATALOG)).await.unwrap_err();
        assert!(matches!(
            err,
            BufmondError::StoreTransactionConflict {
                status: TxnStatus::TryAgain
            }
        ));
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 0);
    }

    #[tokio::test]
    async fn test_load_error_status() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        store.run().await.unwrap();
        store.inject_commit_status(TxnStatus::Error);

        let err = load(&mut store, &doc(CATALOG)).await.unwrap_err();
        assert!(matches!(err, BufmondError::StoreIo { .. }));
    }

    #[tokio::test]
    async fn test_load_skips_populated_table() {
        let mut store = MemoryStore::with_bufmon_schema();
        store.set_column(SYSTEM_TABLE, "sys", system_fields::CUR_CFG, Datum::Integer(1));
        store.set_row(BUFMON_TABLE, "old", Row::new());
        store.run().await.unwrap();

        let outcome = load(&mut store, &doc(CATALOG)).await.unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyPopulated);
        assert_eq!(store.shared_row_count(BUFMON_TABLE), 1);
    }
}
