//! Realm enumeration rules
//!
//! Each realm owns one or two metrics indexed by zero, one or two
//! dimensions. [`REALMS`] is visited in declaration order; within a realm
//! indices run 1..=count, outer dimension first, and every metric is
//! emitted for each index combination.

use std::collections::BTreeMap;

use crate::profile::{AsicProfile, Dimension};
use crate::types::{vendor_info_keys, CounterDefinition, NONE_SEGMENT};

/// Hardware unit of the single-unit profiles
const DEFAULT_HW_UNIT: u32 = 0;

/// Dimensions a realm is indexed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// Single device-wide counter
    Scalar,
    One(Dimension),
    /// Outer, inner
    Two(Dimension, Dimension),
}

/// Declarative enumeration rule for one realm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmRule {
    pub name: &'static str,
    pub metrics: &'static [&'static str],
    pub indexing: Indexing,
}

/// Realms in emission order
pub const REALMS: &[RealmRule] = &[
    RealmRule {
        name: "device",
        metrics: &["data"],
        indexing: Indexing::Scalar,
    },
    RealmRule {
        name: "ingress-port-priority-group",
        metrics: &["um-share-buffer-count", "um-headroom-buffer-count"],
        indexing: Indexing::Two(Dimension::Port, Dimension::PriorityGroup),
    },
    RealmRule {
        name: "ingress-port-service-pool",
        metrics: &["um-share-buffer-count"],
        indexing: Indexing::Two(Dimension::Port, Dimension::ServicePool),
    },
    RealmRule {
        name: "ingress-service-pool",
        metrics: &["um-share-buffer-count"],
        indexing: Indexing::One(Dimension::ServicePool),
    },
    RealmRule {
        name: "egress-port-service-pool",
        metrics: &["uc-share-buffer-count", "um-share-buffer-count"],
        indexing: Indexing::Two(Dimension::Port, Dimension::ServicePool),
    },
    RealmRule {
        name: "egress-service-pool",
        metrics: &["um-share-buffer-count", "mc-share-buffer-count"],
        indexing: Indexing::One(Dimension::ServicePool),
    },
    RealmRule {
        name: "egress-uc-queue",
        metrics: &["uc-buffer-count"],
        indexing: Indexing::One(Dimension::UnicastQueue),
    },
    RealmRule {
        name: "egress-uc-queue-group",
        metrics: &["uc-buffer-count"],
        indexing: Indexing::One(Dimension::UnicastQueueGroup),
    },
    RealmRule {
        name: "egress-mc-queue",
        metrics: &["mc-buffer-count"],
        indexing: Indexing::One(Dimension::MulticastQueue),
    },
    RealmRule {
        name: "egress-cpu-queue",
        metrics: &["cpu-buffer-count"],
        indexing: Indexing::One(Dimension::CpuQueue),
    },
    RealmRule {
        name: "egress-rqe-queue",
        metrics: &["rqe-buffer-count"],
        indexing: Indexing::One(Dimension::RqeQueue),
    },
];

/// Looks up a realm rule by name
pub fn find_realm(name: &str) -> Option<&'static RealmRule> {
    REALMS.iter().find(|r| r.name == name)
}

impl RealmRule {
    /// Index combinations in iteration order
    fn combinations(&self, profile: &AsicProfile) -> Vec<Vec<(Dimension, u32)>> {
        match self.indexing {
            Indexing::Scalar => vec![Vec::new()],
            Indexing::One(dim) => (1..=profile.count(dim))
                .map(|i| vec![(dim, i)])
                .collect(),
            Indexing::Two(outer, inner) => {
                let inner_count = profile.count(inner);
                (1..=profile.count(outer))
                    .flat_map(|i| (1..=inner_count).map(move |j| vec![(outer, i), (inner, j)]))
                    .collect()
            }
        }
    }

    /// Number of entries this realm contributes for a profile
    pub fn entry_count(&self, profile: &AsicProfile) -> usize {
        let combinations = match self.indexing {
            Indexing::Scalar => 1,
            Indexing::One(dim) => profile.count(dim) as usize,
            Indexing::Two(outer, inner) => {
                profile.count(outer) as usize * profile.count(inner) as usize
            }
        };
        combinations * self.metrics.len()
    }

    /// Enumerates every counter of this realm
    pub fn enumerate(&self, profile: &AsicProfile) -> Vec<CounterDefinition> {
        let mut entries = Vec::with_capacity(self.entry_count(profile));

        for indices in self.combinations(profile) {
            for metric in self.metrics {
                entries.push(self.counter(metric, &indices));
            }
        }

        entries
    }

    fn counter(&self, metric: &str, indices: &[(Dimension, u32)]) -> CounterDefinition {
        let mut info = BTreeMap::new();
        info.insert(vendor_info_keys::COUNTER_NAME.to_string(), metric.to_string());
        info.insert(vendor_info_keys::REALM.to_string(), self.name.to_string());

        let mut segments = [NONE_SEGMENT.to_string(), NONE_SEGMENT.to_string()];
        for (slot, (dim, index)) in indices.iter().enumerate() {
            segments[slot] = index.to_string();
            info.insert(dim.attribute().to_string(), index.to_string());
        }

        CounterDefinition {
            name: format!("{}/{}/{}/{}", self.name, metric, segments[0], segments[1]),
            hw_unit_id: DEFAULT_HW_UNIT,
            counter_vendor_specific_info: info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trident(ports: u32) -> AsicProfile {
        AsicProfile::resolve("trident", ports).unwrap()
    }

    #[test]
    fn test_realm_order() {
        let names: Vec<_> = REALMS.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), 11);
        assert_eq!(names[0], "device");
        assert_eq!(names[1], "ingress-port-priority-group");
        assert_eq!(names[10], "egress-rqe-queue");
    }

    #[test]
    fn test_device_realm() {
        let entries = find_realm("device").unwrap().enumerate(&trident(4));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "device/data/NONE/NONE");
        assert_eq!(entries[0].counter_name(), Some("data"));
        assert_eq!(entries[0].realm(), Some("device"));
        assert_eq!(entries[0].counter_vendor_specific_info.len(), 2);
    }

    #[test]
    fn test_two_metric_pair_order() {
        let entries = find_realm("ingress-port-priority-group")
            .unwrap()
            .enumerate(&trident(2));

        assert_eq!(entries[0].name, "ingress-port-priority-group/um-share-buffer-count/1/1");
        assert_eq!(entries[1].name, "ingress-port-priority-group/um-headroom-buffer-count/1/1");
        assert_eq!(entries[2].name, "ingress-port-priority-group/um-share-buffer-count/1/2");
        assert_eq!(
            entries.last().unwrap().name,
            "ingress-port-priority-group/um-headroom-buffer-count/2/8"
        );
    }

    #[test]
    fn test_single_dimension_uses_none() {
        let entries = find_realm("ingress-service-pool")
            .unwrap()
            .enumerate(&trident(1));

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].name, "ingress-service-pool/um-share-buffer-count/1/NONE");
        assert_eq!(entries[0].vendor_info("service-pool"), Some("1"));
        assert_eq!(entries[0].vendor_info("port"), None);
    }

    #[test]
    fn test_queue_attribute() {
        let entries = find_realm("egress-rqe-queue").unwrap().enumerate(&trident(1));
        assert_eq!(entries.len(), 11);
        assert_eq!(entries[10].name, "egress-rqe-queue/rqe-buffer-count/11/NONE");
        assert_eq!(entries[10].vendor_info("queue"), Some("11"));
    }

    #[test]
    fn test_entry_count_matches_enumeration() {
        let profile = trident(3);
        for realm in REALMS {
            assert_eq!(
                realm.entry_count(&profile),
                realm.enumerate(&profile).len(),
                "realm {}",
                realm.name
            );
        }
    }
}
