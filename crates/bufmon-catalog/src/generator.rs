//! Catalog generation

use tracing::{debug, info};

use crate::error::Result;
use crate::profile::AsicProfile;
use crate::realm::REALMS;
use crate::types::CounterCatalog;

/// Generate the counter catalog for an ASIC family and port count
///
/// Fails with [`CatalogError::UnsupportedProfile`](crate::CatalogError) when
/// the family is unknown.
pub fn generate(family: &str, port_count: u32) -> Result<CounterCatalog> {
    let profile = AsicProfile::resolve(family, port_count)?;
    Ok(generate_for_profile(&profile))
}

/// Generate the counter catalog for a resolved profile
///
/// Realm outputs are concatenated in [`REALMS`] order.
pub fn generate_for_profile(profile: &AsicProfile) -> CounterCatalog {
    let mut counters = Vec::new();

    for realm in REALMS {
        let entries = realm.enumerate(profile);
        debug!(realm = realm.name, count = entries.len(), "Enumerated realm");
        counters.extend(entries);
    }

    info!(
        "Generated {} counters for {} with {} ports",
        counters.len(),
        profile.family,
        profile.ports
    );

    CounterCatalog {
        capabilities: profile.capabilities,
        counters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::collections::HashSet;

    #[test]
    fn test_generate_total_count() {
        let catalog = generate("trident", 4).unwrap();
        // 1 + 64 + 16 + 4 + 32 + 8 + 2960 + 128 + 1040 + 48 + 11
        assert_eq!(catalog.counters.len(), 4312);
    }

    #[test]
    fn test_generate_unique_ids() {
        let catalog = generate("trident", 8).unwrap();
        let ids: HashSet<_> = catalog.ids().collect();
        assert_eq!(ids.len(), catalog.counters.len());
    }

    #[test]
    fn test_generate_unsupported_profile() {
        assert!(matches!(
            generate("jericho", 4),
            Err(CatalogError::UnsupportedProfile(_))
        ));
    }

    #[test]
    fn test_realm_blocks_are_contiguous() {
        let catalog = generate("trident", 2).unwrap();
        let mut seen: Vec<&str> = Vec::new();
        for counter in &catalog.counters {
            let realm = counter.realm().unwrap();
            if seen.last() != Some(&realm) {
                assert!(!seen.contains(&realm), "realm {} emitted twice", realm);
                seen.push(realm);
            }
        }
        let expected: Vec<_> = REALMS.iter().map(|r| r.name).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_hw_unit_is_zero() {
        let catalog = generate("trident", 1).unwrap();
        assert!(catalog.counters.iter().all(|c| c.hw_unit_id == 0));
    }
}
