//! ASIC profile resolution
//!
//! A profile fixes the count of every hardware dimension for one ASIC
//! family. The port count is the only value supplied by the caller.

use crate::error::{CatalogError, Result};
use crate::types::{vendor_info_keys, Capabilities};

/// An indexable hardware resource axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Port,
    PriorityGroup,
    ServicePool,
    UnicastQueue,
    UnicastQueueGroup,
    MulticastQueue,
    CpuQueue,
    RqeQueue,
}

impl Dimension {
    /// Vendor info key the index is recorded under
    pub fn attribute(&self) -> &'static str {
        match self {
            Dimension::Port => vendor_info_keys::PORT,
            Dimension::PriorityGroup => vendor_info_keys::PRIORITY_GROUP,
            Dimension::ServicePool => vendor_info_keys::SERVICE_POOL,
            Dimension::UnicastQueue
            | Dimension::UnicastQueueGroup
            | Dimension::MulticastQueue
            | Dimension::CpuQueue
            | Dimension::RqeQueue => vendor_info_keys::QUEUE,
        }
    }
}

/// Fixed dimension counts of a hardware family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FamilyConstants {
    family: &'static str,
    priority_groups: u32,
    service_pools: u32,
    common_service_pools: u32,
    unicast_queues: u32,
    unicast_queue_groups: u32,
    multicast_queues: u32,
    cpu_queues: u32,
    rqe_queues: u32,
    rqe_pools: u32,
    capabilities: Capabilities,
}

const TRIDENT: FamilyConstants = FamilyConstants {
    family: "trident",
    priority_groups: 8,
    service_pools: 4,
    common_service_pools: 1,
    unicast_queues: 2960,
    unicast_queue_groups: 128,
    multicast_queues: 1040,
    cpu_queues: 48,
    rqe_queues: 11,
    rqe_pools: 4,
    capabilities: Capabilities {
        cap_mode_current: true,
        cap_mode_peak: true,
        cap_snapshot_on_threshold_trigger: true,
        cap_threshold_trigger_collection: true,
    },
};

/// Registered hardware families
const FAMILIES: &[FamilyConstants] = &[TRIDENT];

/// Resolved hardware profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsicProfile {
    pub family: &'static str,
    pub ports: u32,
    pub priority_groups: u32,
    pub service_pools: u32,
    pub common_service_pools: u32,
    pub unicast_queues: u32,
    pub unicast_queue_groups: u32,
    pub multicast_queues: u32,
    pub cpu_queues: u32,
    pub rqe_queues: u32,
    pub rqe_pools: u32,
    pub capabilities: Capabilities,
}

impl AsicProfile {
    /// Resolve a family name and port count into a profile
    ///
    /// Family names are matched case-insensitively.
    pub fn resolve(family: &str, ports: u32) -> Result<Self> {
        let constants = FAMILIES
            .iter()
            .find(|f| f.family.eq_ignore_ascii_case(family))
            .ok_or_else(|| CatalogError::UnsupportedProfile(family.to_string()))?;

        if ports == 0 {
            return Err(CatalogError::InvalidPortCount(ports));
        }

        Ok(Self {
            family: constants.family,
            ports,
            priority_groups: constants.priority_groups,
            service_pools: constants.service_pools,
            common_service_pools: constants.common_service_pools,
            unicast_queues: constants.unicast_queues,
            unicast_queue_groups: constants.unicast_queue_groups,
            multicast_queues: constants.multicast_queues,
            cpu_queues: constants.cpu_queues,
            rqe_queues: constants.rqe_queues,
            rqe_pools: constants.rqe_pools,
            capabilities: constants.capabilities,
        })
    }

    /// Number of indices along a dimension
    pub fn count(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::Port => self.ports,
            Dimension::PriorityGroup => self.priority_groups,
            Dimension::ServicePool => self.service_pools,
            Dimension::UnicastQueue => self.unicast_queues,
            Dimension::UnicastQueueGroup => self.unicast_queue_groups,
            Dimension::MulticastQueue => self.multicast_queues,
            Dimension::CpuQueue => self.cpu_queues,
            Dimension::RqeQueue => self.rqe_queues,
        }
    }

    /// Names of all registered families
    pub fn supported_families() -> impl Iterator<Item = &'static str> {
        FAMILIES.iter().map(|f| f.family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_trident() {
        let profile = AsicProfile::resolve("trident", 104).unwrap();
        assert_eq!(profile.family, "trident");
        assert_eq!(profile.ports, 104);
        assert_eq!(profile.count(Dimension::PriorityGroup), 8);
        assert_eq!(profile.count(Dimension::ServicePool), 4);
        assert_eq!(profile.count(Dimension::UnicastQueue), 2960);
        assert_eq!(profile.count(Dimension::UnicastQueueGroup), 128);
        assert_eq!(profile.count(Dimension::MulticastQueue), 1040);
        assert_eq!(profile.count(Dimension::CpuQueue), 48);
        assert_eq!(profile.count(Dimension::RqeQueue), 11);
        assert_eq!(profile.rqe_pools, 4);
        assert_eq!(profile.common_service_pools, 1);
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let profile = AsicProfile::resolve("Trident", 32).unwrap();
        assert_eq!(profile.family, "trident");
    }

    #[test]
    fn test_resolve_unsupported() {
        match AsicProfile::resolve("tomahawk", 32) {
            Err(CatalogError::UnsupportedProfile(name)) => assert_eq!(name, "tomahawk"),
            other => panic!("Expected UnsupportedProfile, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_zero_ports() {
        assert!(matches!(
            AsicProfile::resolve("trident", 0),
            Err(CatalogError::InvalidPortCount(0))
        ));
    }

    #[test]
    fn test_dimension_attribute() {
        assert_eq!(Dimension::Port.attribute(), "port");
        assert_eq!(Dimension::PriorityGroup.attribute(), "priority-group");
        assert_eq!(Dimension::ServicePool.attribute(), "service-pool");
        assert_eq!(Dimension::CpuQueue.attribute(), "queue");
        assert_eq!(Dimension::RqeQueue.attribute(), "queue");
    }

    #[test]
    fn test_supported_families() {
        let families: Vec<_> = AsicProfile::supported_families().collect();
        assert_eq!(families, vec!["trident"]);
    }
}
