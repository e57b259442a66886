//! Port value object and the shared allocator that keeps leased ports unique.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LaunchError, ProjectError};

pub const MIN_PORT: u16 = 3000;
pub const MAX_PORT: u16 = 9000;

/// A port in `[MIN_PORT, MAX_PORT]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    pub fn new(port: u16) -> Result<Self, ProjectError> {
        if (MIN_PORT..=MAX_PORT).contains(&port) {
            Ok(Self(port))
        } else {
            Err(ProjectError::PortOutOfRange {
                port,
                min: MIN_PORT,
                max: MAX_PORT,
            })
        }
    }

    /// Uniformly random port. Not collision-checked; see `PortAllocator`.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(MIN_PORT..=MAX_PORT))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = ProjectError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out ports from the fixed range and remembers which are leased.
///
/// Shared as `Arc<PortAllocator>` by every project built from one factory.
#[derive(Debug, Default)]
pub struct PortAllocator {
    in_use: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn guard(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.in_use.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lease a free port, trying random picks first and then a linear scan.
    pub fn allocate(self: &Arc<Self>) -> Result<PortLease, LaunchError> {
        let mut in_use = self.guard();

        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let candidate = rng.gen_range(MIN_PORT..=MAX_PORT);
            if in_use.insert(candidate) {
                debug!(port = candidate, "Leased random port");
                return Ok(self.lease(candidate));
            }
        }

        let candidate = (MIN_PORT..=MAX_PORT)
            .find(|p| !in_use.contains(p))
            .ok_or(LaunchError::PortsExhausted {
                min: MIN_PORT,
                max: MAX_PORT,
            })?;
        in_use.insert(candidate);
        debug!(port = candidate, "Leased port by scan");
        Ok(self.lease(candidate))
    }

    /// Lease a specific port, failing if another lease holds it.
    pub fn reserve(self: &Arc<Self>, port: Port) -> Result<PortLease, LaunchError> {
        let mut in_use = self.guard();
        if !in_use.insert(port.value()) {
            return Err(LaunchError::PortInUse { port: port.value() });
        }
        Ok(self.lease(port.value()))
    }

    pub fn is_leased(&self, port: Port) -> bool {
        self.guard().contains(&port.value())
    }

    pub fn leased_count(&self) -> usize {
        self.guard().len()
    }

    fn release(&self, port: u16) {
        if self.guard().remove(&port) {
            debug!(port, "Released port");
        }
    }

    fn lease(self: &Arc<Self>, port: u16) -> PortLease {
        PortLease {
            port: Port(port),
            allocator: Arc::clone(self),
        }
    }
}

/// A leased port; released back to its allocator on drop.
#[derive(Debug)]
pub struct PortLease {
    port: Port,
    allocator: Arc<PortAllocator>,
}

impl PortLease {
    pub fn port(&self) -> Port {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.allocator.release(self.port.value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_bounds() {
        assert!(Port::new(3000).is_ok());
        assert!(Port::new(9000).is_ok());
        assert!(matches!(
            Port::new(2999),
            Err(ProjectError::PortOutOfRange { port: 2999, .. })
        ));
        assert!(Port::new(9001).is_err());
    }

    #[test]
    fn test_random_port_in_range() {
        for _ in 0..200 {
            let port = Port::random().value();
            assert!((MIN_PORT..=MAX_PORT).contains(&port));
        }
    }

    #[test]
    fn test_port_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Port>("4000").is_ok());
        assert!(serde_json::from_str::<Port>("80").is_err());
    }

    #[test]
    fn test_allocations_are_distinct() {
        let allocator = PortAllocator::new();
        let leases: Vec<PortLease> = (0..100).map(|_| allocator.allocate().unwrap()).collect();
        let unique: HashSet<u16> = leases.iter().map(|l| l.port().value()).collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(allocator.leased_count(), 100);
    }

    #[test]
    fn test_reserve_conflict_and_release_on_drop() {
        let allocator = PortAllocator::new();
        let port = Port::new(4321).unwrap();

        let lease = allocator.reserve(port).unwrap();
        assert!(allocator.is_leased(port));
        assert!(matches!(
            allocator.reserve(port),
            Err(LaunchError::PortInUse { port: 4321 })
        ));

        drop(lease);
        assert!(!allocator.is_leased(port));
        assert!(allocator.reserve(port).is_ok());
    }
}
