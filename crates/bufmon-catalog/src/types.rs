//! Catalog document types and field names

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the catalog inside the hardware description directory
pub const CATALOG_FILE_NAME: &str = "bufmond.yaml";

/// Top-level field holding the counter list
pub const COUNTERS_FIELD: &str = "counters";

/// Segment used in place of an unused dimension index
pub const NONE_SEGMENT: &str = "NONE";

/// Counter entry fields
pub mod counter_fields {
    pub const NAME: &str = "name";
    pub const HW_UNIT_ID: &str = "hw_unit_id";
    pub const VENDOR_INFO: &str = "counter_vendor_specific_info";
}

/// Keys of the `counter_vendor_specific_info` map
pub mod vendor_info_keys {
    pub const COUNTER_NAME: &str = "counter_name";
    pub const REALM: &str = "realm";
    pub const PORT: &str = "port";
    pub const QUEUE: &str = "queue";
    pub const PRIORITY_GROUP: &str = "priority-group";
    pub const SERVICE_POOL: &str = "service-pool";
}

/// One declared hardware counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDefinition {
    /// Hierarchical id: `realm/metric/dim1/dim2`
    pub name: String,
    /// ASIC unit the counter belongs to
    pub hw_unit_id: u32,
    /// Realm-dependent identifying attributes
    pub counter_vendor_specific_info: BTreeMap<String, String>,
}

impl CounterDefinition {
    /// Realm recorded in the vendor info
    pub fn realm(&self) -> Option<&str> {
        self.vendor_info(vendor_info_keys::REALM)
    }

    /// Metric name recorded in the vendor info
    pub fn counter_name(&self) -> Option<&str> {
        self.vendor_info(vendor_info_keys::COUNTER_NAME)
    }

    /// Looks up a vendor info attribute
    pub fn vendor_info(&self, key: &str) -> Option<&str> {
        self.counter_vendor_specific_info
            .get(key)
            .map(String::as_str)
    }

    /// Splits the id into its four segments
    pub fn id_segments(&self) -> Vec<&str> {
        self.name.split('/').collect()
    }
}

/// Capability flags advertised alongside the counter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub cap_mode_current: bool,
    pub cap_mode_peak: bool,
    pub cap_snapshot_on_threshold_trigger: bool,
    pub cap_threshold_trigger_collection: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            cap_mode_current: true,
            cap_mode_peak: true,
            cap_snapshot_on_threshold_trigger: true,
            cap_threshold_trigger_collection: true,
        }
    }
}

/// The generated catalog document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterCatalog {
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub counters: Vec<CounterDefinition>,
}

impl CounterCatalog {
    /// Counter ids in emission order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.counters.iter().map(|c| c.name.as_str())
    }

    /// Counters belonging to one realm
    pub fn realm_counters<'a>(
        &'a self,
        realm: &'a str,
    ) -> impl Iterator<Item = &'a CounterDefinition> + 'a {
        self.counters
            .iter()
            .filter(move |c| c.realm() == Some(realm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CounterDefinition {
        let mut info = BTreeMap::new();
        info.insert("counter_name".to_string(), "um-share-buffer-count".to_string());
        info.insert("realm".to_string(), "ingress-port-priority-group".to_string());
        info.insert("port".to_string(), "3".to_string());
        info.insert("priority-group".to_string(), "7".to_string());
        CounterDefinition {
            name: "ingress-port-priority-group/um-share-buffer-count/3/7".to_string(),
            hw_unit_id: 0,
            counter_vendor_specific_info: info,
        }
    }

    #[test]
    fn test_counter_accessors() {
        let counter = sample();
        assert_eq!(counter.realm(), Some("ingress-port-priority-group"));
        assert_eq!(counter.counter_name(), Some("um-share-buffer-count"));
        assert_eq!(counter.vendor_info("queue"), None);
        assert_eq!(
            counter.id_segments(),
            vec!["ingress-port-priority-group", "um-share-buffer-count", "3", "7"]
        );
    }

    #[test]
    fn test_capabilities_default_all_enabled() {
        let caps = Capabilities::default();
        assert!(caps.cap_mode_current);
        assert!(caps.cap_mode_peak);
        assert!(caps.cap_snapshot_on_threshold_trigger);
        assert!(caps.cap_threshold_trigger_collection);
    }

    #[test]
    fn test_catalog_yaml_layout() {
        let catalog = CounterCatalog {
            capabilities: Capabilities::default(),
            counters: vec![sample()],
        };
        let yaml = serde_yaml::to_string(&catalog).unwrap();

        assert!(yaml.starts_with("cap_mode_current: true\n"));
        assert!(yaml.contains("counters:\n- name: ingress-port-priority-group/"));
        // index attributes stay strings
        assert!(yaml.contains("port: '3'"));
    }
}
