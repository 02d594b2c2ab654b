//! Process-wide pool of known endpoints.
//!
//! Every endpoint found by enumeration is recorded per transport kind,
//! either free or claimed by exactly one device. The registry is created
//! once by the host and shared (`Arc`) by every transport binding; each
//! transport kind has its own lock, held only for the duration of one
//! registry operation.

use super::port::{EndpointId, EndpointInfo, TransportKind};
use crate::Result;
use crate::error::HardwareError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// One endpoint and its claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState {
    pub info: EndpointInfo,
    /// Device holding the claim.
    pub owner: Option<Uuid>,
}

type Pool = BTreeMap<EndpointId, EndpointState>;

/// Shared claim pools, one per [`TransportKind`].
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    serial: Mutex<Pool>,
    usb: Mutex<Pool>,
    libusb: Mutex<Pool>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry ready to be shared by bindings.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn pool(&self, kind: TransportKind) -> MutexGuard<'_, Pool> {
        let pool = match kind {
            TransportKind::Serial => &self.serial,
            TransportKind::Usb => &self.usb,
            TransportKind::LibUsb => &self.libusb,
        };
        pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the known endpoints with a fresh enumeration.
    ///
    /// Vanished endpoints are dropped along with their claims; new ones
    /// are added free; claims on endpoints still present are kept.
    pub fn sync(&self, kind: TransportKind, endpoints: Vec<EndpointInfo>) {
        let mut pool = self.pool(kind);
        let before = pool.len();

        let mut updated = Pool::new();
        for info in endpoints {
            let owner = pool.get(&info.id).and_then(|state| state.owner);
            updated.insert(info.id.clone(), EndpointState { info, owner });
        }
        *pool = updated;

        debug!("{kind} endpoints synchronized: {before} -> {}", pool.len());
    }

    /// Claim an endpoint for `owner`.
    ///
    /// An endpoint unknown to the registry (configured by name, never
    /// enumerated) is recorded on the fly.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::PortBusy`] if another device holds the claim.
    pub fn claim(&self, kind: TransportKind, id: &EndpointId, owner: Uuid) -> Result<()> {
        let mut pool = self.pool(kind);
        let state = pool.entry(id.clone()).or_insert_with(|| EndpointState {
            info: EndpointInfo::new(id.clone()),
            owner: None,
        });

        match state.owner {
            Some(current) if current != owner => Err(HardwareError::port_busy(id.as_str())),
            Some(_) => Ok(()),
            None => {
                state.owner = Some(owner);
                info!("{kind} endpoint {id} claimed");
                Ok(())
            }
        }
    }

    /// Claim the first free endpoint accepted by `filter`.
    pub fn claim_first_free(
        &self,
        kind: TransportKind,
        owner: Uuid,
        filter: impl Fn(&EndpointInfo) -> bool,
    ) -> Option<EndpointInfo> {
        let mut pool = self.pool(kind);
        let state = pool
            .values_mut()
            .find(|state| state.owner.is_none() && filter(&state.info))?;

        state.owner = Some(owner);
        info!("{kind} endpoint {} claimed", state.info.id);
        Some(state.info.clone())
    }

    /// Return a claim to the pool. Only the owner can release it.
    pub fn release(&self, kind: TransportKind, id: &EndpointId, owner: Uuid) -> bool {
        let mut pool = self.pool(kind);
        match pool.get_mut(id) {
            Some(state) if state.owner == Some(owner) => {
                state.owner = None;
                info!("{kind} endpoint {id} released");
                true
            }
            _ => false,
        }
    }

    /// Release every claim of `owner`. Returns the number released.
    pub fn release_all(&self, owner: Uuid) -> usize {
        let mut released = 0;
        for kind in TransportKind::ALL {
            let mut pool = self.pool(kind);
            for state in pool.values_mut().filter(|state| state.owner == Some(owner)) {
                state.owner = None;
                released += 1;
            }
        }
        released
    }

    /// Unknown endpoints count as free.
    #[must_use]
    pub fn is_free(&self, kind: TransportKind, id: &EndpointId) -> bool {
        self.pool(kind)
            .get(id)
            .is_none_or(|state| state.owner.is_none())
    }

    #[must_use]
    pub fn owner_of(&self, kind: TransportKind, id: &EndpointId) -> Option<Uuid> {
        self.pool(kind).get(id).and_then(|state| state.owner)
    }

    /// Free endpoints accepted by `filter`, in registry order.
    #[must_use]
    pub fn free_endpoints(
        &self,
        kind: TransportKind,
        filter: impl Fn(&EndpointInfo) -> bool,
    ) -> Vec<EndpointInfo> {
        self.pool(kind)
            .values()
            .filter(|state| state.owner.is_none() && filter(&state.info))
            .map(|state| state.info.clone())
            .collect()
    }

    /// Copy of one pool.
    #[must_use]
    pub fn snapshot(&self, kind: TransportKind) -> Vec<EndpointState> {
        self.pool(kind).values().cloned().collect()
    }
}

/// A binding's view of the registry: its kind, its owner id and the
/// endpoint it currently holds.
#[derive(Debug, Clone)]
pub struct EndpointClaim {
    registry: Arc<EndpointRegistry>,
    kind: TransportKind,
    owner: Uuid,
    claimed: Option<EndpointId>,
}

impl EndpointClaim {
    pub fn new(registry: Arc<EndpointRegistry>, kind: TransportKind, owner: Uuid) -> Self {
        Self {
            registry,
            kind,
            owner,
            claimed: None,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    #[must_use]
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    #[must_use]
    pub fn claimed(&self) -> Option<&EndpointId> {
        self.claimed.as_ref()
    }

    /// Claim `id`, giving up any other endpoint held.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::PortBusy`] if another device holds `id`.
    pub fn claim(&mut self, id: &EndpointId) -> Result<()> {
        if self.claimed.as_ref() == Some(id) {
            return Ok(());
        }
        self.registry.claim(self.kind, id, self.owner)?;
        self.release();
        self.claimed = Some(id.clone());
        Ok(())
    }

    /// Claim the first free endpoint accepted by `filter`.
    pub fn claim_first_free(&mut self, filter: impl Fn(&EndpointInfo) -> bool) -> Option<EndpointInfo> {
        let info = self.registry.claim_first_free(self.kind, self.owner, filter)?;
        self.release();
        self.claimed = Some(info.id.clone());
        Some(info)
    }

    pub fn release(&mut self) {
        if let Some(id) = self.claimed.take() {
            self.registry.release(self.kind, &id, self.owner);
        }
    }

    /// Refresh the pool from an enumeration.
    pub fn sync(&self, endpoints: Vec<EndpointInfo>) {
        self.registry.sync(self.kind, endpoints);
    }

    /// Free endpoints accepted by `filter`.
    #[must_use]
    pub fn free_endpoints(&self, filter: impl Fn(&EndpointInfo) -> bool) -> Vec<EndpointInfo> {
        self.registry.free_endpoints(self.kind, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(names: &[&str]) -> Vec<EndpointInfo> {
        names.iter().map(|name| EndpointInfo::new(*name)).collect()
    }

    #[test]
    fn test_claim_and_release() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();
        let id = EndpointId::from("COM1");

        registry.sync(TransportKind::Serial, endpoints(&["COM1", "COM2"]));
        registry.claim(TransportKind::Serial, &id, owner).unwrap();

        assert!(!registry.is_free(TransportKind::Serial, &id));
        assert_eq!(registry.owner_of(TransportKind::Serial, &id), Some(owner));
        assert!(registry.release(TransportKind::Serial, &id, owner));
        assert!(registry.is_free(TransportKind::Serial, &id));
    }

    #[test]
    fn test_claim_by_other_owner_is_busy() {
        let registry = EndpointRegistry::new();
        let id = EndpointId::from("COM1");

        registry.claim(TransportKind::Serial, &id, Uuid::new_v4()).unwrap();
        let result = registry.claim(TransportKind::Serial, &id, Uuid::new_v4());

        assert!(matches!(result, Err(HardwareError::PortBusy { .. })));
    }

    #[test]
    fn test_claim_is_reentrant_for_owner() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();
        let id = EndpointId::from("COM1");

        registry.claim(TransportKind::Serial, &id, owner).unwrap();
        assert!(registry.claim(TransportKind::Serial, &id, owner).is_ok());
    }

    #[test]
    fn test_release_by_non_owner_is_ignored() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();
        let id = EndpointId::from("1:4");

        registry.claim(TransportKind::LibUsb, &id, owner).unwrap();
        assert!(!registry.release(TransportKind::LibUsb, &id, Uuid::new_v4()));
        assert!(!registry.is_free(TransportKind::LibUsb, &id));
    }

    #[test]
    fn test_pools_are_separate_per_kind() {
        let registry = EndpointRegistry::new();
        let id = EndpointId::from("device-1");

        registry.claim(TransportKind::Usb, &id, Uuid::new_v4()).unwrap();
        assert!(registry.is_free(TransportKind::LibUsb, &id));
        assert!(registry.is_free(TransportKind::Serial, &id));
    }

    #[test]
    fn test_sync_keeps_claims_and_drops_vanished() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();

        registry.sync(TransportKind::Serial, endpoints(&["COM1", "COM2", "COM3"]));
        registry.claim(TransportKind::Serial, &"COM1".into(), owner).unwrap();
        registry.claim(TransportKind::Serial, &"COM3".into(), owner).unwrap();

        registry.sync(TransportKind::Serial, endpoints(&["COM1", "COM2", "COM4"]));

        let snapshot = registry.snapshot(TransportKind::Serial);
        let ids: Vec<&str> = snapshot.iter().map(|state| state.info.id.as_str()).collect();
        assert_eq!(ids, vec!["COM1", "COM2", "COM4"]);
        assert_eq!(registry.owner_of(TransportKind::Serial, &"COM1".into()), Some(owner));
        assert!(registry.is_free(TransportKind::Serial, &"COM4".into()));
    }

    #[test]
    fn test_claim_first_free_with_filter() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();
        registry.sync(
            TransportKind::Usb,
            vec![
                EndpointInfo::new("a").with_usb_ids(0x1111, 0x0001),
                EndpointInfo::new("b").with_usb_ids(0x04b8, 0x0202),
                EndpointInfo::new("c").with_usb_ids(0x04b8, 0x0202),
            ],
        );

        let claimed = registry
            .claim_first_free(TransportKind::Usb, owner, |info| info.vendor_id == Some(0x04b8))
            .unwrap();
        assert_eq!(claimed.id.as_str(), "b");

        let next = registry
            .claim_first_free(TransportKind::Usb, Uuid::new_v4(), |info| {
                info.vendor_id == Some(0x04b8)
            })
            .unwrap();
        assert_eq!(next.id.as_str(), "c");

        assert!(
            registry
                .claim_first_free(TransportKind::Usb, owner, |info| info.vendor_id == Some(0x04b8))
                .is_none()
        );
    }

    #[test]
    fn test_release_all() {
        let registry = EndpointRegistry::new();
        let owner = Uuid::new_v4();

        registry.claim(TransportKind::Serial, &"COM1".into(), owner).unwrap();
        registry.claim(TransportKind::Usb, &"pdo-1".into(), owner).unwrap();
        registry.claim(TransportKind::Usb, &"pdo-2".into(), Uuid::new_v4()).unwrap();

        assert_eq!(registry.release_all(owner), 2);
        assert!(!registry.is_free(TransportKind::Usb, &"pdo-2".into()));
    }

    #[test]
    fn test_endpoint_claim_switches_endpoint() {
        let registry = EndpointRegistry::shared();
        let mut claim = EndpointClaim::new(registry.clone(), TransportKind::Serial, Uuid::new_v4());

        claim.claim(&"COM1".into()).unwrap();
        claim.claim(&"COM2".into()).unwrap();

        assert_eq!(claim.claimed().map(EndpointId::as_str), Some("COM2"));
        assert!(registry.is_free(TransportKind::Serial, &"COM1".into()));
        assert!(!registry.is_free(TransportKind::Serial, &"COM2".into()));

        claim.release();
        assert!(claim.claimed().is_none());
        assert!(registry.is_free(TransportKind::Serial, &"COM2".into()));
    }

    #[test]
    fn test_endpoint_claim_keeps_current_on_busy() {
        let registry = EndpointRegistry::shared();
        let mut first = EndpointClaim::new(registry.clone(), TransportKind::Serial, Uuid::new_v4());
        let mut second = EndpointClaim::new(registry.clone(), TransportKind::Serial, Uuid::new_v4());

        first.claim(&"COM1".into()).unwrap();
        second.claim(&"COM2".into()).unwrap();

        assert!(second.claim(&"COM1".into()).is_err());
        assert_eq!(second.claimed().map(EndpointId::as_str), Some("COM2"));
    }
}
