//! Controller registry and discovery manager
//!
//! Tracks the controllers the catalog says exist, drives identity
//! resolution for the unregistered ones and feeds newly enumerated points
//! into the telemetry engine. The in-memory map is a mirror of the catalog,
//! wholesale-replaced on every reconcile; identity writes go to the catalog
//! first and only land in memory after a confirmed single-row update.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::core::cloud::{CloudCatalog, ControllerUpdate};
use crate::core::sensors::SensorManager;
use crate::core::transport::{
    IdentityAnnouncement, PropertyId, ProtocolBridge, Request, Response,
};
use crate::core::types::{Controller, ObjectId, ObjectKind};

/// Cheaply clonable handle; discovery requests and stalled-onboarding
/// retries run on spawned tasks holding their own handle.
#[derive(Clone)]
pub struct DeviceManager {
    inner: Arc<Inner>,
}

struct Inner {
    bridge: Arc<dyn ProtocolBridge>,
    catalog: Arc<dyn CloudCatalog>,
    sensors: SensorManager,
    controllers: RwLock<HashMap<String, Controller>>,
}

impl DeviceManager {
    pub fn new(
        bridge: Arc<dyn ProtocolBridge>,
        catalog: Arc<dyn CloudCatalog>,
        sensors: SensorManager,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                catalog,
                sensors,
                controllers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Reconcile against the catalog: issue a discovery request for every
    /// controller still missing a display name and wholesale-replace the
    /// in-memory map with the pulled set.
    pub async fn refresh_controllers(&self) {
        let records = match self.inner.catalog.fetch_controllers().await {
            Ok(records) => records,
            Err(e) => {
                error!("controller catalog fetch failed: {}", e);
                return;
            },
        };

        let mut replacement = HashMap::with_capacity(records.len());
        for record in records {
            let controller = Controller {
                address: record.address,
                name: record.name,
                device_instance: record.device_instance,
                sensors_registered: record.sensors_registered,
            };
            if !controller.is_registered() {
                info!("found unregistered controller {}", controller.address);
                self.inner.spawn_discovery(controller.address.clone());
            }
            replacement.insert(controller.address.clone(), controller);
        }

        let count = replacement.len();
        *self.inner.controllers.write().await = replacement;
        debug!("controller map replaced from catalog: {} controllers", count);
    }

    /// Exposed surface for the transport layer: an unsolicited identity
    /// announcement. Never fails on unexpected input.
    ///
    /// Targeted discovery still attracts answers from foreign devices, so
    /// the source must be one currently tracked; anything else is dropped.
    /// On a tracked source: resolve the display name, persist it with a
    /// conditional update, and only after a confirmed single-row update
    /// mirror it in memory and move on to point enumeration.
    pub async fn handle_identity_announcement(&self, announcement: IdentityAnnouncement) {
        let source = announcement.source;
        if !self.inner.controllers.read().await.contains_key(&source) {
            debug!("identity announcement from untracked {}, ignoring", source);
            return;
        }

        let request = Request::ReadProperty {
            target: source.clone(),
            object: announcement.device_id,
            property: PropertyId::ObjectName,
        };
        let name = match self.inner.bridge.submit(request).await {
            Ok(Response::ObjectName(name)) => name,
            Ok(other) => {
                warn!("unexpected response to name read for {}: {:?}", source, other);
                return;
            },
            Err(e) => {
                warn!("name read for {} failed: {}", source, e);
                return;
            },
        };

        let update = ControllerUpdate::identity(name.clone(), announcement.device_id.instance);
        match self.inner.catalog.update_controller(&source, update).await {
            Ok(1) => {},
            Ok(rows) => {
                // Local state stays stale on purpose; the next reconcile
                // pulls whatever the catalog really holds.
                warn!(
                    "identity update for {} affected {} rows instead of 1, keeping local state",
                    source, rows
                );
                return;
            },
            Err(e) => {
                error!("identity update for {} failed: {}", source, e);
                return;
            },
        }

        {
            let mut controllers = self.inner.controllers.write().await;
            if let Some(controller) = controllers.get_mut(&source) {
                controller.name = Some(name.clone());
                controller.device_instance = Some(announcement.device_id.instance);
                controller.sensors_registered = false;
            }
        }
        info!("controller {} resolved as '{}'", source, name);

        self.inner
            .request_point_list(&source, announcement.device_id)
            .await;
    }

    /// Read a controller's object list and hand the interesting part to the
    /// telemetry engine.
    pub async fn request_point_list(&self, address: &str, device_id: ObjectId) {
        self.inner.request_point_list(address, device_id).await;
    }

    /// Retry path for onboarding that stalled partway: re-enumerate every
    /// named controller whose registration flag never converged. The very
    /// first tick after startup is skipped by the runtime for warm-up.
    pub async fn sweep_stalled_onboarding(&self) {
        let stalled: Vec<(String, u32)> = {
            let controllers = self.inner.controllers.read().await;
            controllers
                .values()
                .filter(|c| c.is_registered() && !c.sensors_registered)
                .filter_map(|c| c.device_instance.map(|id| (c.address.clone(), id)))
                .collect()
        };
        if stalled.is_empty() {
            return;
        }
        info!("re-enumerating {} stalled controllers", stalled.len());
        for (address, instance) in stalled {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let device_id = ObjectId::new(ObjectKind::Device, instance);
                inner.request_point_list(&address, device_id).await;
            });
        }
    }

    /// Registry lookup by address (copy-out under the read lock).
    pub async fn controller(&self, address: &str) -> Option<Controller> {
        self.inner.controllers.read().await.get(address).cloned()
    }

    pub async fn controller_count(&self) -> usize {
        self.inner.controllers.read().await.len()
    }
}

impl Inner {
    /// Fire a who-is at one address. The identity announcement, if the
    /// controller answers at all, arrives later through
    /// [`handle_identity_announcement`](DeviceManager::handle_identity_announcement).
    fn spawn_discovery(&self, address: String) {
        let bridge = Arc::clone(&self.bridge);
        tokio::spawn(async move {
            let request = Request::WhoIs {
                target: address.clone(),
            };
            match bridge.submit(request).await {
                Ok(Response::Ack) => debug!("discovery request sent to {}", address),
                Ok(other) => warn!("unexpected response to discovery for {}: {:?}", address, other),
                Err(e) => warn!("discovery request to {} failed: {}", address, e),
            }
        });
    }

    async fn request_point_list(&self, address: &str, device_id: ObjectId) {
        let request = Request::ReadProperty {
            target: address.to_string(),
            object: device_id,
            property: PropertyId::ObjectList,
        };
        match self.bridge.submit(request).await {
            Ok(Response::ObjectList(objects)) => {
                self.handle_point_list(address, objects).await;
            },
            Ok(other) => {
                warn!("unexpected response to object-list read for {}: {:?}", address, other);
            },
            Err(e) => {
                warn!("object-list read for {} failed: {}", address, e);
            },
        }
    }

    /// Filter the enumerated objects down to telemetry sources and intake
    /// the ones the sensor registry doesn't know yet. An empty subset means
    /// onboarding has converged for this controller, persisted by the
    /// conditional flag update.
    async fn handle_point_list(&self, address: &str, objects: Vec<ObjectId>) {
        let candidates: Vec<ObjectId> = objects
            .into_iter()
            .filter(|object| object.kind.is_telemetry())
            .collect();
        let unknown = self.sensors.unknown_objects(address, &candidates).await;

        if !unknown.is_empty() {
            info!("controller {} enumerated {} new points", address, unknown.len());
            self.sensors.add_points(address, &unknown).await;
            return;
        }

        match self
            .catalog
            .update_controller(address, ControllerUpdate::sensors_registered())
            .await
        {
            Ok(1) => {
                if let Some(controller) = self.controllers.write().await.get_mut(address) {
                    controller.sensors_registered = true;
                }
                debug!("controller {} marked fully registered", address);
            },
            Ok(rows) => {
                // Flag left unset so the straggler sweep retries.
                warn!(
                    "registration flag update for {} affected {} rows instead of 1",
                    address, rows
                );
            },
            Err(e) => {
                warn!("registration flag update for {} failed: {}", address, e);
            },
        }
    }
}
