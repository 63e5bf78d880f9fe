#![allow(dead_code)]

use crestron_panel::{
    JoinId, JoinKind, JoinValue, PanelError, Result, StateCallback, SubscriptionHandle, Transport,
    TransportEvent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

pub fn id(raw: u32) -> JoinId {
    JoinId::new(raw).unwrap()
}

/// Transport that records publishes and lets tests play the bus
pub struct FakeTransport {
    state: Mutex<FakeState>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    events_tx: broadcast::Sender<TransportEvent>,
}

#[derive(Default)]
struct FakeState {
    subscribers: HashMap<(JoinKind, JoinId), Vec<(SubscriptionHandle, StateCallback)>>,
    published: Vec<(JoinKind, JoinId, JoinValue)>,
    unsubscribes: usize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            events_tx,
        })
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Report a value from the bus to every subscriber of the join
    pub fn push(&self, kind: JoinKind, id: JoinId, value: JoinValue) {
        let callbacks: Vec<StateCallback> = self
            .state
            .lock()
            .unwrap()
            .subscribers
            .get(&(kind, id))
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(value.clone());
        }
    }

    pub fn push_digital(&self, id: JoinId, value: bool) {
        self.push(JoinKind::Digital, id, JoinValue::Digital(value));
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn published(&self) -> Vec<(JoinKind, JoinId, JoinValue)> {
        self.state.lock().unwrap().published.clone()
    }

    /// Values published to one join, in order
    pub fn published_to(&self, kind: JoinKind, id: JoinId) -> Vec<JoinValue> {
        self.published()
            .into_iter()
            .filter(|(k, i, _)| *k == kind && *i == id)
            .map(|(_, _, value)| value)
            .collect()
    }

    pub fn clear_published(&self) {
        self.state.lock().unwrap().published.clear();
    }

    pub fn subscriber_count(&self, kind: JoinKind, id: JoinId) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .get(&(kind, id))
            .map_or(0, Vec::len)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unwrap().unsubscribes
    }
}

impl Transport for FakeTransport {
    fn subscribe_state(
        &self,
        kind: JoinKind,
        id: JoinId,
        callback: StateCallback,
    ) -> Result<SubscriptionHandle> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(PanelError::Subscription {
                kind,
                id,
                detail: "bus rejected subscription".into(),
            });
        }
        let handle = SubscriptionHandle::new();
        self.state
            .lock()
            .unwrap()
            .subscribers
            .entry((kind, id))
            .or_default()
            .push((handle, callback));
        Ok(handle)
    }

    fn unsubscribe_state(&self, kind: JoinKind, id: JoinId, handle: SubscriptionHandle) {
        let mut state = self.state.lock().unwrap();
        state.unsubscribes += 1;
        if let Some(subs) = state.subscribers.get_mut(&(kind, id)) {
            subs.retain(|(h, _)| *h != handle);
        }
    }

    fn publish_event(&self, kind: JoinKind, id: JoinId, value: JoinValue) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PanelError::Publish {
                kind,
                id,
                detail: "bus unreachable".into(),
            });
        }
        self.state.lock().unwrap().published.push((kind, id, value));
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }
}

/// Counts events at one level
struct LevelCounter {
    level: tracing::Level,
    count: Arc<AtomicUsize>,
}

impl<S: tracing::Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == self.level {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` and count the logs at `level` it produced on this thread
pub fn count_logs<R>(level: tracing::Level, f: impl FnOnce() -> R) -> (R, usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(LevelCounter {
        level,
        count: count.clone(),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, count.load(Ordering::SeqCst))
}

/// Run `f` and count the error logs it produced on this thread
pub fn count_errors<R>(f: impl FnOnce() -> R) -> (R, usize) {
    count_logs(tracing::Level::ERROR, f)
}
