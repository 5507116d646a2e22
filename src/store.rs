//! Generated downlinks keyed by device, in insertion order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::delivery::Downlink;
use crate::device::DeviceIdentifier;
use crate::error::StoreError;

/// What to do when a device already has a downlink awaiting delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    #[default]
    Replace,
    Reject,
}

#[derive(Debug, Default)]
struct Inner {
    active: IndexMap<DeviceIdentifier, Downlink>,

    archive: Vec<Downlink>,

    in_flight: HashSet<DeviceIdentifier>,
}

#[derive(Debug, Default)]
pub struct DownlinkStore {
    policy: DuplicatePolicy,

    inner: Mutex<Inner>,
}

impl DownlinkStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Stores `downlink`, keeping the position of any entry it replaces.
    pub fn insert(&self, downlink: Downlink) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let deveui = downlink.deveui;

        if inner.in_flight.contains(&deveui) {
            return Err(StoreError::InFlight(deveui));
        }

        if let Some(existing) = inner.active.get(&deveui) {
            if !existing.is_terminal() && self.policy == DuplicatePolicy::Reject {
                return Err(StoreError::Duplicate(deveui));
            }
            if !existing.is_terminal() {
                warn!(%deveui, "replacing pending downlink");
            }
        }

        if let Some(previous) = inner.active.insert(deveui, downlink) {
            debug!(%deveui, state = %previous.state(), "archived previous downlink");
            inner.archive.push(previous);
        }

        Ok(())
    }

    /// Takes the in-flight slot for `deveui` until the guard is dropped.
    pub fn claim(self: &Arc<Self>, deveui: DeviceIdentifier) -> Result<InFlightGuard, StoreError> {
        let mut inner = self.lock();
        if !inner.active.contains_key(&deveui) {
            return Err(StoreError::Unknown(deveui));
        }
        if !inner.in_flight.insert(deveui) {
            return Err(StoreError::InFlight(deveui));
        }

        Ok(InFlightGuard {
            store: Arc::clone(self),
            deveui,
        })
    }

    pub fn is_in_flight(&self, deveui: &DeviceIdentifier) -> bool {
        self.lock().in_flight.contains(deveui)
    }

    pub fn get(&self, deveui: &DeviceIdentifier) -> Option<Downlink> {
        self.lock().active.get(deveui).cloned()
    }

    pub fn device_ids(&self) -> Vec<DeviceIdentifier> {
        self.lock().active.keys().copied().collect()
    }

    pub fn downlinks(&self) -> Vec<Downlink> {
        self.lock().active.values().cloned().collect()
    }

    pub fn archived(&self) -> Vec<Downlink> {
        self.lock().archive.clone()
    }

    pub fn to_hex_map(&self) -> IndexMap<DeviceIdentifier, Vec<String>> {
        self.lock()
            .active
            .iter()
            .map(|(deveui, downlink)| (*deveui, downlink.payload.to_hex()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }
}

/// Exclusive access to one device's downlink during delivery.
#[derive(Debug)]
pub struct InFlightGuard {
    store: Arc<DownlinkStore>,

    deveui: DeviceIdentifier,
}

impl InFlightGuard {
    pub fn deveui(&self) -> DeviceIdentifier {
        self.deveui
    }

    pub fn downlink(&self) -> Result<Downlink, StoreError> {
        self.store
            .get(&self.deveui)
            .ok_or(StoreError::Unknown(self.deveui))
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Downlink) -> R) -> Result<R, StoreError> {
        let mut inner = self.store.lock();
        let downlink = inner
            .active
            .get_mut(&self.deveui)
            .ok_or(StoreError::Unknown(self.deveui))?;

        Ok(f(downlink))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.store.lock().in_flight.remove(&self.deveui);
    }
}
