//! Buffer monitoring counter catalog generator.
//!
//! Enumerates every buffer-occupancy counter an ASIC family exposes and
//! writes the result as the `bufmond.yaml` catalog consumed by `bufmond`.
//!
//! - [`profile`]: per-family dimension counts ([`AsicProfile`])
//! - [`realm`]: the ordered realm enumeration table ([`REALMS`])
//! - [`generator`]: [`generate()`] ties the two together
//! - [`writer`]: header rendering and atomic catalog writes
//!
//! # Example
//!
//! ```
//! use sonic_bufmon_catalog::generate;
//!
//! let catalog = generate("trident", 4).unwrap();
//! assert_eq!(catalog.counters[0].name, "device/data/NONE/NONE");
//! ```

pub mod error;
pub mod generator;
pub mod profile;
pub mod realm;
pub mod types;
pub mod writer;

pub use error::{CatalogError, Result};
pub use generator::{generate, generate_for_profile};
pub use profile::{AsicProfile, Dimension};
pub use realm::{Indexing, RealmRule, REALMS};
pub use types::{
    counter_fields, vendor_info_keys, Capabilities, CounterCatalog, CounterDefinition,
    CATALOG_FILE_NAME, COUNTERS_FIELD,
};
pub use writer::{render_catalog, write_catalog, CATALOG_FILE_MODE};
