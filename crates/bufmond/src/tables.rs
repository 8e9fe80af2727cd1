//! Shared store table names, column names and fixed defaults

use std::collections::BTreeMap;

use crate::store::{ColumnType, Replication, Schema};

/// Administrative record: configuration generation and bufmon settings
pub const SYSTEM_TABLE: &str = "System";

/// Subsystem record: hardware description directory
pub const SUBSYSTEM_TABLE: &str = "Subsystem";

/// Counter table populated from the catalog
pub const BUFMON_TABLE: &str = "bufmon";

/// System table fields
pub mod system_fields {
    /// Configuration generation; positive once first-boot config is done
    pub const CUR_CFG: &str = "cur_cfg";
    /// Runtime settings written with fixed defaults
    pub const BUFMON_CONFIG: &str = "bufmon_config";
    /// Global config derived from the catalog's top-level fields
    pub const BUFMON_INFO: &str = "bufmon_info";
}

/// Subsystem table fields
pub mod subsystem_fields {
    pub const HW_DESC_DIR: &str = "hw_desc_dir";
}

/// bufmon table fields
pub mod bufmon_fields {
    pub const HW_UNIT_ID: &str = "hw_unit_id";
    pub const NAME: &str = "name";
    pub const COUNTER_VENDOR_SPECIFIC_INFO: &str = "counter_vendor_specific_info";
    // Runtime columns owned by the collector
    pub const ENABLED: &str = "enabled";
    pub const TRIGGER_THRESHOLD: &str = "trigger_threshold";
    pub const COUNTER_VALUE: &str = "counter_value";
    pub const STATUS: &str = "status";

    /// Columns the catalog loader never writes
    pub const RUNTIME_COLUMNS: &[&str] = &[ENABLED, TRIGGER_THRESHOLD, COUNTER_VALUE, STATUS];
}

/// Default runtime settings for `System:bufmon_config`
pub const BUFMON_CONFIG_DEFAULTS: &[(&str, &str)] = &[
    ("enabled", "false"),
    ("counters_mode", "peak"),
    ("periodic_collection_enabled", "false"),
    ("collection_period", "5"),
    ("threshold_trigger_collection_enabled", "true"),
    ("threshold_trigger_rate_limit", "60"),
    ("snapshot_on_threshold_trigger", "true"),
];

/// Default runtime settings as a column value
pub fn bufmon_config_defaults() -> BTreeMap<String, String> {
    BUFMON_CONFIG_DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Tables and columns bufmond reads or writes.
///
/// Only the key set of the counter table is replicated; the guard needs
/// nothing more.
pub fn bufmon_schema() -> Schema {
    Schema::new()
        .register_columns(
            SYSTEM_TABLE,
            Replication::Full,
            &[
                (system_fields::CUR_CFG, ColumnType::Integer),
                (system_fields::BUFMON_CONFIG, ColumnType::Map),
                (system_fields::BUFMON_INFO, ColumnType::Map),
            ],
        )
        .register_columns(
            SUBSYSTEM_TABLE,
            Replication::Full,
            &[(subsystem_fields::HW_DESC_DIR, ColumnType::String)],
        )
        .register_columns(
            BUFMON_TABLE,
            Replication::KeysOnly,
            &[
                (bufmon_fields::HW_UNIT_ID, ColumnType::Integer),
                (bufmon_fields::NAME, ColumnType::String),
                (bufmon_fields::COUNTER_VENDOR_SPECIFIC_INFO, ColumnType::Map),
                (bufmon_fields::ENABLED, ColumnType::String),
                (bufmon_fields::TRIGGER_THRESHOLD, ColumnType::Integer),
                (bufmon_fields::COUNTER_VALUE, ColumnType::Integer),
                (bufmon_fields::STATUS, ColumnType::String),
            ],
        )
}
