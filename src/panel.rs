use crate::aggregate::AggregateControl;
use crate::analog::{clamp_percent, AnalogJoin};
use crate::config::{JoinMap, MockSnapshot, PanelConfig};
use crate::digital::DigitalJoin;
use crate::error::{PanelError, Result};
use crate::join::{Join, Link};
use crate::monitor::ConnectionMonitor;
use crate::offline::OfflineStore;
use crate::serial::SerialJoin;
use crate::transport::{Transport, TransportResolver};
use crate::types::{JoinId, JoinKind};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Entry point for views: hands out join primitives bound to the active
/// transport
///
/// A `Panel` owns the resolved transport, the offline store used when there
/// is none, the connection monitor and the symbolic join map. Every primitive
/// it creates asks the resolver for the transport at creation time.
pub struct Panel {
    resolver: TransportResolver,
    offline: Arc<OfflineStore>,
    monitor: ConnectionMonitor,
    joins: JoinMap,
}

impl Panel {
    /// Build a panel from configuration, connecting to the bridge if one is
    /// configured
    ///
    /// A bridge that cannot be reached is not an error: the panel comes up
    /// offline and the monitor reports `Unavailable`. Only an unreadable mock
    /// snapshot fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use crestron_panel::{Panel, PanelConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = PanelConfig::from_path("panel.json")?;
    ///     let panel = Panel::connect(config).await?;
    ///
    ///     let mic = panel.digital_named("BOARDROOM_MIC")?;
    ///     mic.toggle();
    ///     println!("Status: {}", panel.connection().status());
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: PanelConfig) -> Result<Self> {
        let snapshot = config.load_snapshot()?;
        let monitor = ConnectionMonitor::new();
        let resolver = TransportResolver::detect(&config, &monitor).await;

        Ok(Self {
            resolver,
            offline: Arc::new(OfflineStore::from_snapshot(&snapshot)),
            monitor,
            joins: config.joins,
        })
    }

    /// Panel without a transport and with empty offline state
    pub fn offline() -> Self {
        Self::offline_with(&MockSnapshot::default())
    }

    /// Panel without a transport, seeded from a mock snapshot
    pub fn offline_with(snapshot: &MockSnapshot) -> Self {
        let monitor = ConnectionMonitor::new();
        monitor.mark_unavailable("offline mode");
        Self {
            resolver: TransportResolver::none(),
            offline: Arc::new(OfflineStore::from_snapshot(snapshot)),
            monitor,
            joins: JoinMap::default(),
        }
    }

    /// Panel bound to an existing transport
    ///
    /// Inside a tokio runtime the monitor follows the transport's events;
    /// otherwise it stays `Initializing` until [`ConnectionMonitor::apply`]
    /// is called.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let monitor = ConnectionMonitor::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            monitor.attach(transport.events());
        } else {
            tracing::warn!(
                "No tokio runtime, connection status will not follow transport events"
            );
        }
        Self {
            resolver: TransportResolver::with_transport(transport),
            offline: Arc::new(OfflineStore::new()),
            monitor,
            joins: JoinMap::default(),
        }
    }

    /// Replace the symbolic join map
    pub fn with_join_map(mut self, joins: JoinMap) -> Self {
        self.joins = joins;
        self
    }

    /// Transport resolver used by this panel
    pub fn transport(&self) -> &TransportResolver {
        &self.resolver
    }

    /// Whether joins talk to a live transport
    pub fn is_live(&self) -> bool {
        self.resolver.is_live()
    }

    /// Connection status monitor
    pub fn connection(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    /// Symbolic join names
    pub fn joins(&self) -> &JoinMap {
        &self.joins
    }

    /// Offline store backing joins when no transport is resolved
    pub fn offline_store(&self) -> &Arc<OfflineStore> {
        &self.offline
    }

    fn link(&self) -> Link {
        match self.resolver.resolve() {
            Some(transport) => Link::Live(transport),
            None => Link::Offline(self.offline.clone()),
        }
    }

    /// Mount a digital join (initially off)
    pub fn digital(&self, id: JoinId) -> DigitalJoin {
        Join::mount(self.link(), id, false)
    }

    /// Mount an analog join; `default` is clamped to 0-100
    pub fn analog(&self, id: JoinId, default: f64) -> AnalogJoin {
        Join::mount(self.link(), id, clamp_percent(default))
    }

    /// Mount a serial join
    pub fn serial(&self, id: JoinId, default: impl Into<String>) -> SerialJoin {
        Join::mount(self.link(), id, default.into())
    }

    /// Mount a digital join by name
    pub fn digital_named(&self, name: &str) -> Result<DigitalJoin> {
        Ok(self.digital(self.joins.lookup(JoinKind::Digital, name)?))
    }

    /// Mount an analog join by name
    pub fn analog_named(&self, name: &str, default: f64) -> Result<AnalogJoin> {
        Ok(self.analog(self.joins.lookup(JoinKind::Analog, name)?, default))
    }

    /// Mount a serial join by name
    pub fn serial_named(&self, name: &str, default: impl Into<String>) -> Result<SerialJoin> {
        Ok(self.serial(self.joins.lookup(JoinKind::Serial, name)?, default))
    }

    /// Mount an aggregate control over digital constituents
    ///
    /// Constituents must be non-empty, distinct, and must not include the
    /// aggregate's own join.
    pub fn aggregate(
        &self,
        aggregate: JoinId,
        constituents: impl IntoIterator<Item = JoinId>,
    ) -> Result<AggregateControl> {
        let ids: Vec<JoinId> = constituents.into_iter().collect();
        if ids.is_empty() {
            return Err(PanelError::InvalidAggregate(format!(
                "aggregate {} has no constituents",
                aggregate
            )));
        }
        if ids.contains(&aggregate) {
            return Err(PanelError::InvalidAggregate(format!(
                "aggregate {} lists itself as a constituent",
                aggregate
            )));
        }
        let distinct: BTreeSet<JoinId> = ids.iter().copied().collect();
        if distinct.len() != ids.len() {
            return Err(PanelError::InvalidAggregate(format!(
                "aggregate {} lists a constituent twice",
                aggregate
            )));
        }

        let constituents = ids.into_iter().map(|id| self.digital(id)).collect();
        Ok(AggregateControl::new(self.digital(aggregate), constituents))
    }

    /// Mount an aggregate control by names
    pub fn aggregate_named(&self, aggregate: &str, constituents: &[&str]) -> Result<AggregateControl> {
        let aggregate = self.joins.lookup(JoinKind::Digital, aggregate)?;
        let ids = constituents
            .iter()
            .map(|name| self.joins.lookup(JoinKind::Digital, name))
            .collect::<Result<Vec<_>>>()?;
        self.aggregate(aggregate, ids)
    }
}
