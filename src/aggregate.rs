//! Combined controls whose value is the AND of several digital joins
//!
//! An "All Mics" button is the typical case: it reads as on only when every
//! microphone is on, and pressing it drives every microphone to the new value.

use crate::digital::DigitalJoin;
use crate::join::lock;
use crate::types::JoinId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};

/// Aggregate digital control kept equal to the AND of its constituents
///
/// Two rules keep the invariant:
///
/// - when a constituent or the aggregate itself changes, the aggregate is
///   re-derived and published, but only if its value actually differs;
/// - [`AggregateControl::toggle`] sets the aggregate and then writes only the
///   constituents that are not already at the new value.
///
/// While a toggle is writing, re-derivation is held back; the toggle finishes
/// with one settling pass that sees its own writes as consistent.
pub struct AggregateControl {
    inner: Arc<AggregateInner>,
}

struct AggregateInner {
    aggregate: DigitalJoin,
    constituents: Vec<DigitalJoin>,
    /// Held by whoever is writing on behalf of the rule
    settling: Mutex<()>,
    /// A constituent changed since the last settling pass
    pending: AtomicBool,
}

impl AggregateInner {
    /// Re-derive the aggregate, coalescing notifications that arrive while
    /// another pass or a toggle holds the settling lock
    fn reconcile(&self) {
        self.pending.store(true, Ordering::SeqCst);
        while self.pending.load(Ordering::SeqCst) {
            let _guard = match self.settling.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                // The holder re-checks `pending` after letting go
                Err(TryLockError::WouldBlock) => return,
            };
            if self.pending.swap(false, Ordering::SeqCst) {
                self.settle_once();
            }
            // Guard drops here, before `pending` is checked again
        }
    }

    fn settle_once(&self) {
        let combined = self.constituents.iter().all(|c| c.value());
        if self.aggregate.value() != combined {
            tracing::debug!(
                id = %self.aggregate.id(),
                "Aggregate follows constituents: {}",
                combined
            );
            self.aggregate.set_digital(combined);
        }
    }
}

impl AggregateControl {
    /// Build the rule and run one settling pass
    pub(crate) fn new(aggregate: DigitalJoin, constituents: Vec<DigitalJoin>) -> Self {
        let inner = Arc::new(AggregateInner {
            aggregate,
            constituents,
            settling: Mutex::new(()),
            pending: AtomicBool::new(false),
        });

        // The aggregate's own join is watched too, so an outside write to it
        // is pulled back to the AND of the constituents
        for join in inner.constituents.iter().chain([&inner.aggregate]) {
            let rule: Weak<AggregateInner> = Arc::downgrade(&inner);
            join.on_change(move |_| {
                if let Some(rule) = rule.upgrade() {
                    rule.reconcile();
                }
            });
        }

        inner.reconcile();
        Self { inner }
    }

    /// The combined control's own join
    pub fn aggregate(&self) -> &DigitalJoin {
        &self.inner.aggregate
    }

    /// Join id of the combined control
    pub fn id(&self) -> JoinId {
        self.inner.aggregate.id()
    }

    /// Current value of the combined control
    pub fn value(&self) -> bool {
        self.inner.aggregate.value()
    }

    /// Constituent joins, in construction order
    pub fn constituents(&self) -> &[DigitalJoin] {
        &self.inner.constituents
    }

    /// Constituent by join id
    pub fn constituent(&self, id: JoinId) -> Option<&DigitalJoin> {
        self.inner.constituents.iter().find(|c| c.id() == id)
    }

    /// Number of constituents currently on
    pub fn active_count(&self) -> usize {
        self.inner.constituents.iter().filter(|c| c.value()).count()
    }

    /// Toggle the combined control and drive every constituent to match
    ///
    /// Publishes the aggregate once and each constituent that differs from
    /// the target once. Returns the new aggregate value.
    ///
    /// # Example
    ///
    /// ```
    /// use crestron_panel::{JoinId, Panel};
    ///
    /// let id = |n| JoinId::new(n).unwrap();
    /// let panel = Panel::offline();
    /// let mics = panel.aggregate(id(20), [id(21), id(22), id(23)]).unwrap();
    ///
    /// mics.constituents()[0].set_digital(true);
    /// assert!(!mics.value());
    ///
    /// assert!(mics.toggle());
    /// assert_eq!(mics.active_count(), 3);
    /// ```
    pub fn toggle(&self) -> bool {
        let inner = &self.inner;
        let target = {
            let _guard = lock(&inner.settling);
            let target = !inner.aggregate.value();
            tracing::debug!(id = %inner.aggregate.id(), "Aggregate toggled to {}", target);
            inner.aggregate.set_digital(target);
            for constituent in &inner.constituents {
                if constituent.value() != target {
                    constituent.set_digital(target);
                }
            }
            target
        };

        // Bus updates may have landed while the lock was held
        if inner.pending.load(Ordering::SeqCst) {
            inner.reconcile();
        }
        target
    }
}

impl Drop for AggregateControl {
    fn drop(&mut self) {
        tracing::debug!(id = %self.inner.aggregate.id(), "Aggregate rule released");
    }
}
