//! Shared machinery behind the digital, analog and serial join primitives
//!
//! A [`Join`] owns one local value cell bound to a (kind, id) pair. Creating
//! it subscribes to the active link; dropping it releases the subscription.
//! Writes are applied locally first and then published, fire-and-forget.

use crate::error::Result;
use crate::offline::OfflineStore;
use crate::transport::{StateCallback, Transport};
use crate::types::{JoinId, JoinKind, JoinState, JoinValue, SubscriptionHandle};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for u8 {}
    impl Sealed for String {}
}

/// Local value type of a join primitive
///
/// Implemented for `bool` (digital), `u8` percent (analog) and `String`
/// (serial).
pub trait Signal: sealed::Sealed + Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Signal kind carried on the bus
    const KIND: JoinKind;

    /// Convert a bus value into the local representation
    fn from_value(value: &JoinValue) -> Self;

    /// Convert the local representation into a bus value
    fn to_value(&self) -> JoinValue;
}

/// Where a join reads and writes its value
#[derive(Clone)]
pub(crate) enum Link {
    Live(Arc<dyn Transport>),
    Offline(Arc<OfflineStore>),
}

impl Link {
    fn subscribe(&self, kind: JoinKind, id: JoinId, callback: StateCallback) -> Result<SubscriptionHandle> {
        match self {
            Link::Live(transport) => transport.subscribe_state(kind, id, callback),
            Link::Offline(store) => Ok(store.subscribe(kind, id, callback)),
        }
    }

    fn unsubscribe(&self, kind: JoinKind, id: JoinId, handle: SubscriptionHandle) {
        match self {
            Link::Live(transport) => transport.unsubscribe_state(kind, id, handle),
            Link::Offline(store) => store.unsubscribe(kind, id, handle),
        }
    }

    fn publish(&self, kind: JoinKind, id: JoinId, value: JoinValue) -> Result<()> {
        match self {
            Link::Live(transport) => {
                tracing::debug!(%kind, %id, "Publishing {}", value);
                transport.publish_event(kind, id, value)
            }
            Link::Offline(store) => {
                tracing::debug!(%kind, %id, "Storing {} offline", value);
                store.write(kind, id, value);
                Ok(())
            }
        }
    }

    fn seed(&self, kind: JoinKind, id: JoinId) -> Option<JoinValue> {
        match self {
            Link::Live(_) => None,
            Link::Offline(store) => store.get(kind, id),
        }
    }

    fn is_live(&self) -> bool {
        matches!(self, Link::Live(_))
    }
}

/// Identifies a change listener registered with [`Join::on_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Cell<T: Signal> {
    state: Mutex<JoinState<T>>,
    tx: watch::Sender<T>,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_listener: AtomicU64,
}

impl<T: Signal> Cell<T> {
    /// Apply a value reported by the link; dropped once unsubscribed
    fn deliver(&self, value: T) -> bool {
        let mut state = lock(&self.state);
        if !state.subscribed || state.value == value {
            return false;
        }
        state.value = value.clone();
        self.tx.send_replace(value);
        true
    }

    /// Apply a local write, returning the new value and whether it changed
    fn update(&self, f: impl FnOnce(&T) -> T) -> (T, bool) {
        let mut state = lock(&self.state);
        let next = f(&state.value);
        let changed = next != state.value;
        if changed {
            state.value = next.clone();
            self.tx.send_replace(next.clone());
        }
        (next, changed)
    }

    fn is_open(&self) -> bool {
        lock(&self.state).subscribed
    }

    fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(value);
        }
    }
}

/// A UI value synchronized with one join on the control bus
///
/// Use the [`DigitalJoin`](crate::DigitalJoin), [`AnalogJoin`](crate::AnalogJoin)
/// and [`SerialJoin`](crate::SerialJoin) aliases; each adds its kind's setters.
pub struct Join<T: Signal> {
    id: JoinId,
    link: Link,
    cell: Arc<Cell<T>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl<T: Signal> Join<T> {
    /// Bind and subscribe
    ///
    /// Offline, the value is seeded from the shared store before falling back
    /// to `default`.
    pub(crate) fn mount(link: Link, id: JoinId, default: T) -> Self {
        let value = link
            .seed(T::KIND, id)
            .map(|v| T::from_value(&v))
            .unwrap_or(default);
        let (tx, _) = watch::channel(value.clone());
        let join = Self {
            id,
            link,
            cell: Arc::new(Cell {
                state: Mutex::new(JoinState {
                    id,
                    kind: T::KIND,
                    value,
                    subscribed: false,
                }),
                tx,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
            subscription: Mutex::new(None),
        };
        join.subscribe();
        join
    }

    /// Join identifier
    pub fn id(&self) -> JoinId {
        self.id
    }

    /// Current local value
    pub fn value(&self) -> T {
        lock(&self.cell.state).value.clone()
    }

    /// Snapshot of the join state
    pub fn state(&self) -> JoinState<T> {
        lock(&self.cell.state).clone()
    }

    /// Whether a subscription is currently held
    pub fn is_subscribed(&self) -> bool {
        lock(&self.cell.state).subscribed
    }

    /// Whether this join talks to a live transport rather than the offline store
    pub fn is_live(&self) -> bool {
        self.link.is_live()
    }

    /// Register for value updates
    ///
    /// Called on creation; call again to resubscribe after
    /// [`Join::unsubscribe`]. Holds at most one subscription. Returns whether
    /// a subscription is held afterwards; a failing transport is logged and
    /// leaves the join unsubscribed at its current value.
    pub fn subscribe(&self) -> bool {
        let mut slot = lock(&self.subscription);
        if slot.is_some() {
            return true;
        }

        // Open the gate before registering so a replayed value is not dropped
        lock(&self.cell.state).subscribed = true;

        let id = self.id;
        let cell = Arc::downgrade(&self.cell);
        let callback: StateCallback = Arc::new(move |value: JoinValue| {
            let Some(cell) = cell.upgrade() else {
                return;
            };
            let value = T::from_value(&value);
            tracing::debug!(kind = %T::KIND, %id, "Received {:?}", value);
            // Re-check the gate: unsubscribe may have run since delivery
            if cell.deliver(value.clone()) && cell.is_open() {
                cell.notify(&value);
            }
        });

        match self.link.subscribe(T::KIND, id, callback) {
            Ok(handle) => {
                tracing::debug!(kind = %T::KIND, %id, "Subscribed");
                *slot = Some(handle);
                true
            }
            Err(e) => {
                lock(&self.cell.state).subscribed = false;
                tracing::error!(kind = %T::KIND, %id, "Subscription failed: {}", e);
                false
            }
        }
    }

    /// Release the subscription
    ///
    /// Safe to call any number of times. Once it returns, bus updates no
    /// longer change this join and no new listener call starts for them. A
    /// listener call that was already running on another thread may still
    /// finish.
    pub fn unsubscribe(&self) {
        let Some(handle) = lock(&self.subscription).take() else {
            return;
        };
        lock(&self.cell.state).subscribed = false;
        self.link.unsubscribe(T::KIND, self.id, handle);
        tracing::debug!(kind = %T::KIND, id = %self.id, "Unsubscribed");
    }

    /// Watch the local value, e.g. to re-render a view
    pub fn watch(&self) -> watch::Receiver<T> {
        self.cell.tx.subscribe()
    }

    /// Run `listener` after every change of the local value
    ///
    /// Listeners run synchronously, after the change has been published, on
    /// the thread that caused it.
    pub fn on_change(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.cell.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.cell.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.cell.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Optimistic write: apply locally, publish, then notify listeners
    ///
    /// A failed publish is logged and the local value is kept until a bus
    /// update corrects it.
    pub(crate) fn write_with(&self, f: impl FnOnce(&T) -> T) -> T {
        let (value, changed) = self.cell.update(f);

        if let Err(e) = self.link.publish(T::KIND, self.id, value.to_value()) {
            tracing::error!(
                kind = %T::KIND,
                id = %self.id,
                "Publish failed, keeping local value {:?}: {}",
                value,
                e
            );
        }

        if changed {
            self.cell.notify(&value);
        }
        value
    }

    pub(crate) fn write(&self, value: T) -> T {
        self.write_with(|_| value)
    }
}

impl<T: Signal> Drop for Join<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T: Signal> fmt::Debug for Join<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join")
            .field("state", &self.state())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DigitalJoin;

    fn offline() -> Link {
        Link::Offline(Arc::new(OfflineStore::new()))
    }

    fn id(raw: u32) -> JoinId {
        JoinId::new(raw).unwrap()
    }

    #[test]
    fn mount_subscribes_and_drop_releases() {
        let store = Arc::new(OfflineStore::new());
        let join = DigitalJoin::mount(Link::Offline(store.clone()), id(3), false);
        assert!(join.is_subscribed());
        assert_eq!(store.subscriber_count(JoinKind::Digital, id(3)), 1);

        drop(join);
        assert_eq!(store.subscriber_count(JoinKind::Digital, id(3)), 0);
    }

    #[test]
    fn subscribe_holds_a_single_registration() {
        let store = Arc::new(OfflineStore::new());
        let join = DigitalJoin::mount(Link::Offline(store.clone()), id(3), false);
        assert!(join.subscribe());
        assert!(join.subscribe());
        assert_eq!(store.subscriber_count(JoinKind::Digital, id(3)), 1);

        join.unsubscribe();
        join.unsubscribe();
        assert!(!join.is_subscribed());
        assert_eq!(store.subscriber_count(JoinKind::Digital, id(3)), 0);

        assert!(join.subscribe());
        assert_eq!(store.subscriber_count(JoinKind::Digital, id(3)), 1);
    }

    #[test]
    fn listeners_fire_on_change_only() {
        let join = DigitalJoin::mount(offline(), id(9), false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = join.on_change(move |v| sink.lock().unwrap().push(*v));

        join.set_digital(true);
        join.set_digital(true);
        join.set_digital(false);
        assert!(join.remove_listener(listener));
        assert!(!join.remove_listener(listener));
        join.set_digital(true);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn unsubscribed_join_stays_quiet() {
        let store = Arc::new(OfflineStore::new());
        let join = DigitalJoin::mount(Link::Offline(store.clone()), id(5), false);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        join.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.write(JoinKind::Digital, id(5), JoinValue::Digital(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        join.unsubscribe();
        store.write(JoinKind::Digital, id(5), JoinValue::Digital(false));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(join.value());
    }

    #[test]
    fn watch_observes_local_writes() {
        let join = DigitalJoin::mount(offline(), id(9), false);
        let mut rx = join.watch();
        assert!(!*rx.borrow_and_update());
        join.toggle();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }
}
