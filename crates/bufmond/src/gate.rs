//! Readiness gate and idempotency guard
//!
//! Pure checks over a store snapshot. None of them fail: a negative
//! answer tells the reconciler to wait, stop, or skip.

use std::path::{Path, PathBuf};

use sonic_bufmon_catalog::CATALOG_FILE_NAME;

use crate::store::{Datum, Snapshot};
use crate::tables::{subsystem_fields, system_fields, BUFMON_TABLE, SUBSYSTEM_TABLE, SYSTEM_TABLE};

/// Where the catalog should be, as recorded by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    /// The catalog file exists
    Found(PathBuf),
    /// No hardware description directory is recorded
    NoDirectory,
    /// The directory is recorded but the file is absent
    Missing(PathBuf),
}

/// True once the configuration generation is positive
pub fn is_system_ready(snapshot: &Snapshot) -> bool {
    snapshot
        .first_row(SYSTEM_TABLE)
        .and_then(|(_, row)| row.get(system_fields::CUR_CFG))
        .and_then(Datum::as_integer)
        .is_some_and(|cur_cfg| cur_cfg > 0)
}

/// Hardware description directory of the first subsystem that records one
pub fn hw_desc_dir(snapshot: &Snapshot) -> Option<&str> {
    snapshot
        .rows(SUBSYSTEM_TABLE)
        .filter_map(|(_, row)| row.get(subsystem_fields::HW_DESC_DIR))
        .filter_map(Datum::as_str)
        .find(|dir| !dir.is_empty())
}

/// Resolves the catalog path and checks that the file exists
pub fn locate_catalog(snapshot: &Snapshot) -> CatalogLocation {
    match hw_desc_dir(snapshot) {
        None => CatalogLocation::NoDirectory,
        Some(dir) => {
            let path = Path::new(dir).join(CATALOG_FILE_NAME);
            if path.is_file() {
                CatalogLocation::Found(path)
            } else {
                CatalogLocation::Missing(path)
            }
        }
    }
}

pub fn is_catalog_available(snapshot: &Snapshot) -> bool {
    matches!(locate_catalog(snapshot), CatalogLocation::Found(_))
}

/// True iff the counter table already holds any row.
///
/// Any row counts as a completed earlier load, whatever catalog it came from.
pub fn is_target_already_populated(snapshot: &Snapshot) -> bool {
    snapshot.row_count(BUFMON_TABLE) > 0
}
