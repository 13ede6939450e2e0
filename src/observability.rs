//! Observer hooks for storage and metrics collaborators
//!
//! External consumers (memory subsystems, dashboards) can watch fabric
//! traffic without sitting on the wire path. Hooks are invoked synchronously
//! after the user-visible completion, so a slow observer can never delay a
//! response that has already been delivered.

use crate::channel::ChannelState;
use crate::domain_types::SpecialistId;
use std::sync::{Arc, RwLock};

/// Event hooks a client may attach to the fabric.
///
/// Default implementations are no-ops so observers implement only what they
/// watch. Implementations must not panic; a misbehaving observer is the
/// observer's bug, not a request error.
pub trait FabricObserver: Send + Sync {
    /// A send completed (successfully or not) from the caller's perspective
    fn on_send_completed(&self, _id: &SpecialistId, _latency_ms: u64, _ok: bool) {}

    /// A specialist channel moved between states
    fn on_channel_state_changed(&self, _id: &SpecialistId, _old: ChannelState, _new: ChannelState) {
    }
}

/// The fabric's registered observers, shared with every channel worker
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn FabricObserver>>>,
}

impl ObserverSet {
    pub(crate) fn add(&self, observer: Arc<dyn FabricObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    pub(crate) fn send_completed(&self, id: &SpecialistId, latency_ms: u64, ok: bool) {
        if let Ok(observers) = self.observers.read() {
            for observer in &*observers {
                observer.on_send_completed(id, latency_ms, ok);
            }
        }
    }

    pub(crate) fn state_changed(&self, id: &SpecialistId, old: ChannelState, new: ChannelState) {
        if let Ok(observers) = self.observers.read() {
            for observer in &*observers {
                observer.on_channel_state_changed(id, old, new);
            }
        }
    }
}
