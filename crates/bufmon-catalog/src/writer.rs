//! Catalog file output
//!
//! The catalog is rendered completely in memory, written to a temporary
//! file in the destination directory, synced, and renamed into place. A
//! reader polling for the catalog sees either no file or the whole file.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::Result;
use crate::profile::AsicProfile;
use crate::types::CounterCatalog;

/// Mode of the published catalog, readable by the daemon's user
pub const CATALOG_FILE_MODE: u32 = 0o644;

/// Render the comment header naming the profile used
pub fn render_header(profile: &AsicProfile) -> String {
    format!(
        "#\n\
         # Buffer monitoring counters description file.\n\
         # Auto generated by bufmon-gen for the {} ASIC family with {} ports.\n\
         # Regenerate instead of editing by hand.\n\
         #\n",
        profile.family, profile.ports
    )
}

/// Render the full catalog document (header followed by YAML body)
pub fn render_catalog(catalog: &CounterCatalog, profile: &AsicProfile) -> Result<String> {
    let body = serde_yaml::to_string(catalog)?;
    Ok(format!("{}{}", render_header(profile), body))
}

/// Atomically write the catalog to `path`
pub fn write_catalog(path: &Path, catalog: &CounterCatalog, profile: &AsicProfile) -> Result<()> {
    let document = render_catalog(catalog, profile)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(document.as_bytes())?;
    tmp.flush()?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(CATALOG_FILE_MODE))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    info!(
        "Wrote {} counters to {}",
        catalog.counters.len(),
        path.display()
    );
    Ok(())
}
