//! Sensor registry and telemetry engine
//!
//! Owns the point registry and the two acquisition strategies. Newly
//! discovered points go through the onboarding queue (multi-property read,
//! mode classification, first record upstream); resolved points are then
//! either polled via the poll queue or covered by a renewable
//! change-of-value subscription.
//!
//! The registry is wholesale-replaced from the catalog on every refresh.
//! Completions and notifications that miss their key afterwards are
//! expected races and discarded silently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::TelemetryConfig;
use crate::core::cloud::{CloudCatalog, TelemetrySink};
use crate::core::queue::WorkQueue;
use crate::core::transport::{
    CovNotification, PropertyBundle, PropertyId, ProtocolBridge, Request, Response,
};
use crate::core::types::{
    AcquisitionMode, ObjectId, PointKey, PointValue, SensorPoint, TelemetryRecord,
};

/// Properties fetched for every newly discovered point.
const ONBOARDING_PROPERTIES: [PropertyId; 4] = [
    PropertyId::ObjectName,
    PropertyId::Description,
    PropertyId::PresentValue,
    PropertyId::Units,
];

/// Cheaply clonable handle to the engine; request completions run on
/// spawned tasks holding their own handle to the shared state.
#[derive(Clone)]
pub struct SensorManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: TelemetryConfig,
    bridge: Arc<dyn ProtocolBridge>,
    catalog: Arc<dyn CloudCatalog>,
    sink: Arc<dyn TelemetrySink>,
    points: RwLock<HashMap<PointKey, SensorPoint>>,
    onboarding: WorkQueue<PointKey>,
    polls: WorkQueue<PointKey>,
}

impl SensorManager {
    pub fn new(
        config: TelemetryConfig,
        bridge: Arc<dyn ProtocolBridge>,
        catalog: Arc<dyn CloudCatalog>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                bridge,
                catalog,
                sink,
                points: RwLock::new(HashMap::new()),
                onboarding: WorkQueue::new(),
                polls: WorkQueue::new(),
            }),
        }
    }

    /// Subset of `objects` not yet present in the registry.
    pub async fn unknown_objects(&self, address: &str, objects: &[ObjectId]) -> Vec<ObjectId> {
        let points = self.inner.points.read().await;
        objects
            .iter()
            .filter(|object| !points.contains_key(&(address.to_string(), **object)))
            .copied()
            .collect()
    }

    /// Intake for freshly discovered points: one placeholder registry entry
    /// per point plus an onboarding queue entry. Keys already present are
    /// left untouched, so intake can race with itself and with the catalog
    /// refresh without ever producing duplicate entries.
    pub async fn add_points(&self, address: &str, objects: &[ObjectId]) {
        let mut queued = Vec::new();
        {
            let mut points = self.inner.points.write().await;
            for object in objects {
                let key = (address.to_string(), *object);
                if points.contains_key(&key) {
                    continue;
                }
                points.insert(key.clone(), SensorPoint::placeholder(address, *object));
                queued.push(key);
            }
        }
        if queued.is_empty() {
            return;
        }
        info!("queueing {} new points from {}", queued.len(), address);
        self.inner.onboarding.push_all(queued).await;
    }

    /// One onboarding drain tick. Pops a bounded batch, issues the detail
    /// read for each entry on its own task and returns the backlog left in
    /// the queue for the adaptive scheduler.
    pub async fn drain_onboarding(&self) -> usize {
        let (batch, backlog) = self
            .inner
            .onboarding
            .pop_batch(self.inner.config.onboarding.batch_size)
            .await;
        for (address, object) in batch {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.onboard_point(address, object).await;
            });
        }
        backlog
    }

    /// Reconcile the registry against the catalog: keep enabled non-adapter
    /// rows and wholesale-replace the map. Entries absent from the pull are
    /// implicitly retired even if still physically present.
    pub async fn refresh_catalog(&self) {
        let rows = match self.inner.catalog.fetch_points().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("point catalog fetch failed: {}", e);
                return;
            },
        };

        let mut replacement = HashMap::new();
        for row in rows {
            if !row.is_active_sensor() {
                continue;
            }
            let point = SensorPoint {
                address: row.address.clone(),
                object: row.object,
                name: Some(row.name),
                description: Some(row.description),
                units: row.units,
                value: None,
                observed_at: None,
                mode: AcquisitionMode::from_catalog(&row.mode),
            };
            replacement.insert(point.key(), point);
        }

        let count = replacement.len();
        *self.inner.points.write().await = replacement;
        debug!("point registry replaced from catalog: {} points", count);
    }

    /// Enqueue a present-value read for every poll-mode point.
    pub async fn schedule_polls(&self) {
        let due: Vec<PointKey> = {
            let points = self.inner.points.read().await;
            points
                .values()
                .filter(|p| p.mode == AcquisitionMode::Poll)
                .map(SensorPoint::key)
                .collect()
        };
        if due.is_empty() {
            return;
        }
        debug!("scheduling {} poll reads", due.len());
        self.inner.polls.push_all(due).await;
    }

    /// One poll drain tick; same shape as the onboarding drain.
    pub async fn drain_polls(&self) -> usize {
        let (batch, backlog) = self
            .inner
            .polls
            .pop_batch(self.inner.config.polling.batch_size)
            .await;
        for (address, object) in batch {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.poll_point(address, object).await;
            });
        }
        backlog
    }

    /// Unconditionally re-subscribe every push-mode point, refreshing the
    /// lease before expiry. Idempotent on the protocol side.
    pub async fn renew_subscriptions(&self) {
        let due: Vec<PointKey> = {
            let points = self.inner.points.read().await;
            points
                .values()
                .filter(|p| p.mode == AcquisitionMode::Subscribe)
                .map(SensorPoint::key)
                .collect()
        };
        if !due.is_empty() {
            debug!("renewing {} subscriptions", due.len());
        }
        for (address, object) in due {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.subscribe(&address, object).await;
            });
        }
    }

    /// Exposed surface for the transport layer: an unsolicited
    /// change-of-value notification. Never fails; unknown keys and
    /// notifications without a present value are discarded.
    pub async fn handle_cov_notification(&self, notification: CovNotification) {
        let Some(value) = notification.present_value().cloned() else {
            debug!(
                "notification from {} {} carried no present value, ignoring",
                notification.source, notification.object
            );
            return;
        };
        self.inner
            .record_observation(&notification.source, notification.object, value)
            .await;
    }

    /// Registry lookup by key (copy-out under the read lock).
    pub async fn point(&self, address: &str, object: ObjectId) -> Option<SensorPoint> {
        self.inner
            .points
            .read()
            .await
            .get(&(address.to_string(), object))
            .cloned()
    }

    pub async fn point_count(&self) -> usize {
        self.inner.points.read().await.len()
    }

    pub async fn onboarding_backlog(&self) -> usize {
        self.inner.onboarding.len().await
    }

    pub async fn poll_backlog(&self) -> usize {
        self.inner.polls.len().await
    }
}

impl Inner {
    async fn onboard_point(self: Arc<Self>, address: String, object: ObjectId) {
        let request = Request::ReadProperties {
            target: address.clone(),
            object,
            properties: ONBOARDING_PROPERTIES.to_vec(),
        };
        match self.bridge.submit(request).await {
            Ok(Response::PropertyBundle(bundle)) => {
                self.complete_onboarding(address, object, bundle).await;
            },
            Ok(other) => {
                warn!(
                    "unexpected response to detail read for {} {}: {:?}",
                    address, object, other
                );
            },
            Err(e) => {
                // No retry queue: the point stays a placeholder until a
                // later point-list sweep re-discovers it.
                warn!("detail read failed for {} {}: {}", address, object, e);
            },
        }
    }

    /// Classify the point, replace its placeholder with the resolved record,
    /// forward the record upstream and start the subscription when the name
    /// marks it as a push point.
    async fn complete_onboarding(&self, address: String, object: ObjectId, bundle: PropertyBundle) {
        let mode = AcquisitionMode::classify(&bundle.name, &self.config.subscribe_marker);
        let point = SensorPoint {
            address: address.clone(),
            object,
            name: Some(bundle.name.clone()),
            description: Some(bundle.description.clone()),
            units: bundle.units.clone(),
            value: Some(bundle.present_value.clone()),
            observed_at: Some(Utc::now()),
            mode,
        };

        // Written unconditionally: if a concurrent catalog refresh removed
        // the placeholder, the next refresh retires this entry again.
        self.points.write().await.insert(point.key(), point);

        let record = TelemetryRecord::new(bundle.name.clone(), bundle.present_value)
            .with_meta("description", json!(bundle.description))
            .with_meta("units", json!(bundle.units))
            .with_meta("object_type", json!(object.kind))
            .with_meta("object_instance", json!(object.instance))
            .with_meta("update_method", json!(mode.as_str()))
            .with_meta("controller_address", json!(address))
            .with_meta("new", json!(true));
        self.publish(record).await;

        match mode {
            AcquisitionMode::Poll => {
                // Picked up automatically by the next poll scheduling cycle.
                debug!("point {} {} classified for polling", address, object);
            },
            AcquisitionMode::Subscribe => {
                self.subscribe(&address, object).await;
            },
            AcquisitionMode::Unresolved => {
                // Terminal state: never polled nor subscribed, needs an
                // operator to fix the naming.
                warn!(
                    "point {} {} ('{}') has no recognizable acquisition mode, leaving dormant",
                    address, object, bundle.name
                );
            },
        }
    }

    async fn poll_point(self: Arc<Self>, address: String, object: ObjectId) {
        let request = Request::ReadProperty {
            target: address.clone(),
            object,
            property: PropertyId::PresentValue,
        };
        match self.bridge.submit(request).await {
            Ok(Response::PresentValue(value)) => {
                self.record_observation(&address, object, value).await;
            },
            Ok(other) => {
                warn!(
                    "unexpected response to present-value read for {} {}: {:?}",
                    address, object, other
                );
            },
            Err(e) => {
                warn!("present-value read failed for {} {}: {}", address, object, e);
            },
        }
    }

    async fn subscribe(&self, address: &str, object: ObjectId) {
        let request = Request::SubscribeCov {
            target: address.to_string(),
            object,
            process_id: self.config.process_id,
            lifetime_secs: self.config.cov_lifetime_secs,
            confirmed: false,
        };
        match self.bridge.submit(request).await {
            Ok(Response::Ack) => {
                debug!("subscription accepted for {} {}", address, object);
            },
            Ok(other) => {
                warn!(
                    "unexpected response to subscribe for {} {}: {:?}",
                    address, object, other
                );
            },
            Err(e) => {
                warn!("subscribe failed for {} {}: {}", address, object, e);
            },
        }
    }

    /// Publish an observed value and refresh the point's in-memory state.
    ///
    /// A key miss is the accepted race with the catalog refresh: no record
    /// is emitted and nothing is logged above debug.
    async fn record_observation(&self, address: &str, object: ObjectId, value: PointValue) {
        let name = {
            let mut points = self.points.write().await;
            match points.get_mut(&(address.to_string(), object)) {
                Some(point) => {
                    point.value = Some(value.clone());
                    point.observed_at = Some(Utc::now());
                    match &point.name {
                        Some(name) => name.clone(),
                        None => {
                            // Placeholder raced ahead of onboarding; without
                            // a name there is nothing to publish yet.
                            debug!("value for unnamed point {} {}, dropping", address, object);
                            return;
                        },
                    }
                },
                None => {
                    debug!("value for unregistered point {} {}, dropping", address, object);
                    return;
                },
            }
        };
        self.publish(TelemetryRecord::new(name, value)).await;
    }

    async fn publish(&self, record: TelemetryRecord) {
        if let Err(e) = self.sink.publish(record).await {
            error!("telemetry publish failed: {}", e);
        }
    }
}
