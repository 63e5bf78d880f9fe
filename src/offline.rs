use crate::analog::clamp_percent;
use crate::config::MockSnapshot;
use crate::join::lock;
use crate::transport::StateCallback;
use crate::types::{JoinId, JoinKind, JoinValue, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::Mutex;

type JoinKey = (JoinKind, JoinId);

/// In-memory source of truth used when no transport is resolved
///
/// Every primitive bound to the same (kind, id) on a panel shares this store,
/// so concurrent views stay consistent without hardware attached. Nothing is
/// persisted.
#[derive(Default)]
pub struct OfflineStore {
    state: Mutex<OfflineState>,
}

#[derive(Default)]
struct OfflineState {
    values: HashMap<JoinKey, JoinValue>,
    subscribers: HashMap<JoinKey, Vec<(SubscriptionHandle, StateCallback)>>,
}

impl OfflineStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded from a mock snapshot
    pub fn from_snapshot(snapshot: &MockSnapshot) -> Self {
        let store = Self::new();
        {
            let mut state = lock(&store.state);
            for (id, value) in &snapshot.digital {
                state
                    .values
                    .insert((JoinKind::Digital, *id), JoinValue::Digital(*value));
            }
            for (id, value) in &snapshot.analog {
                state.values.insert(
                    (JoinKind::Analog, *id),
                    JoinValue::Analog(u16::from(clamp_percent(*value))),
                );
            }
            for (id, value) in &snapshot.serial {
                state
                    .values
                    .insert((JoinKind::Serial, *id), JoinValue::Serial(value.clone()));
            }
            tracing::debug!("Seeded offline store with {} joins", state.values.len());
        }
        store
    }

    /// Last value written for a join, if any
    pub fn get(&self, kind: JoinKind, id: JoinId) -> Option<JoinValue> {
        lock(&self.state).values.get(&(kind, id)).cloned()
    }

    /// Register a callback for writes to one join
    pub fn subscribe(&self, kind: JoinKind, id: JoinId, callback: StateCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        lock(&self.state)
            .subscribers
            .entry((kind, id))
            .or_default()
            .push((handle, callback));
        handle
    }

    /// Remove a registration; unknown handles are ignored
    pub fn unsubscribe(&self, kind: JoinKind, id: JoinId, handle: SubscriptionHandle) {
        let mut state = lock(&self.state);
        if let Some(subscribers) = state.subscribers.get_mut(&(kind, id)) {
            subscribers.retain(|(h, _)| *h != handle);
            if subscribers.is_empty() {
                state.subscribers.remove(&(kind, id));
            }
        }
    }

    /// Store a value and notify every subscriber of that join
    ///
    /// Subscribers always receive the value current at the time they are
    /// called, so a write made from inside a callback is never overtaken by
    /// the write that triggered it.
    pub fn write(&self, kind: JoinKind, id: JoinId, value: JoinValue) {
        let callbacks: Vec<StateCallback> = {
            let mut state = lock(&self.state);
            state.values.insert((kind, id), value.clone());
            state
                .subscribers
                .get(&(kind, id))
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            // A callback may have written again; later subscribers get the latest value
            let latest = self.get(kind, id).unwrap_or_else(|| value.clone());
            callback(latest);
        }
    }

    /// Number of callbacks registered for a join
    pub fn subscriber_count(&self, kind: JoinKind, id: JoinId) -> usize {
        lock(&self.state)
            .subscribers
            .get(&(kind, id))
            .map_or(0, Vec::len)
    }
}
