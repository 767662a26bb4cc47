//! Gateway runtime
//!
//! Wires the managers to their collaborators and drives the periodic work:
//! discovery reconcile, straggler sweep, catalog refresh, poll scheduling,
//! subscription renewal and the two adaptive drain loops. Every task is a
//! `select!` loop over a shared cancellation token; `shutdown` cancels and
//! joins them with a bounded wait.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::core::cloud::{CloudCatalog, TelemetrySink};
use crate::core::devices::DeviceManager;
use crate::core::queue::DrainPolicy;
use crate::core::sensors::SensorManager;
use crate::core::transport::{CovNotification, IdentityAnnouncement, ProtocolBridge};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Gateway {
    config: GatewayConfig,
    devices: DeviceManager,
    sensors: SensorManager,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Build the managers around the externally supplied collaborators.
    /// Nothing runs until [`start`](Self::start).
    pub fn new(
        config: GatewayConfig,
        bridge: Arc<dyn ProtocolBridge>,
        catalog: Arc<dyn CloudCatalog>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let sensors = SensorManager::new(
            config.telemetry.clone(),
            Arc::clone(&bridge),
            Arc::clone(&catalog),
            sink,
        );
        let devices = DeviceManager::new(bridge, catalog, sensors.clone());
        Self {
            config,
            devices,
            sensors,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// The discovery manager, for the transport layer's identity handler
    /// and for embedders that need registry access.
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// The telemetry engine, for the transport layer's notification handler.
    pub fn sensors(&self) -> &SensorManager {
        &self.sensors
    }

    /// Exposed surface: unsolicited identity announcement from the field.
    pub async fn handle_identity_announcement(&self, announcement: IdentityAnnouncement) {
        self.devices.handle_identity_announcement(announcement).await;
    }

    /// Exposed surface: unsolicited change-of-value notification.
    pub async fn handle_cov_notification(&self, notification: CovNotification) {
        self.sensors.handle_cov_notification(notification).await;
    }

    /// Spawn all periodic tasks. Idempotent: calling twice is a logged no-op.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!("gateway already started");
            return;
        }
        info!("starting gateway tasks");

        let devices = self.devices.clone();
        self.handles.push(spawn_periodic(
            "controller-refresh",
            self.config.controller_refresh_interval(),
            self.token.clone(),
            move || {
                let devices = devices.clone();
                async move { devices.refresh_controllers().await }
            },
        ));

        // Straggler sweep skips its first tick to let the initial discovery
        // round warm up.
        let devices = self.devices.clone();
        let sweep_interval = self.config.straggler_sweep_interval();
        let token = self.token.clone();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => devices.sweep_stalled_onboarding().await,
                }
            }
            debug!("straggler-sweep task stopped");
        }));

        let sensors = self.sensors.clone();
        self.handles.push(spawn_periodic(
            "catalog-refresh",
            self.config.catalog_refresh_interval(),
            self.token.clone(),
            move || {
                let sensors = sensors.clone();
                async move { sensors.refresh_catalog().await }
            },
        ));

        let sensors = self.sensors.clone();
        self.handles.push(spawn_periodic(
            "poll-schedule",
            self.config.poll_schedule_interval(),
            self.token.clone(),
            move || {
                let sensors = sensors.clone();
                async move { sensors.schedule_polls().await }
            },
        ));

        let sensors = self.sensors.clone();
        self.handles.push(spawn_periodic(
            "subscription-renewal",
            self.config.resubscribe_interval(),
            self.token.clone(),
            move || {
                let sensors = sensors.clone();
                async move { sensors.renew_subscriptions().await }
            },
        ));

        let sensors = self.sensors.clone();
        self.handles.push(spawn_drain(
            "onboarding-drain",
            self.config.telemetry.onboarding.policy(),
            self.token.clone(),
            move || {
                let sensors = sensors.clone();
                async move { sensors.drain_onboarding().await }
            },
        ));

        let sensors = self.sensors.clone();
        self.handles.push(spawn_drain(
            "poll-drain",
            self.config.telemetry.polling.policy(),
            self.token.clone(),
            move || {
                let sensors = sensors.clone();
                async move { sensors.drain_polls().await }
            },
        ));
    }

    /// Cancel all tasks and wait for them, bounded by a shutdown timeout.
    pub async fn shutdown(mut self) {
        info!("shutting down gateway");
        self.token.cancel();
        let handles = std::mem::take(&mut self.handles);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("gateway task ended with error: {}", e);
                    }
                }
                info!("gateway stopped");
            },
            Err(_) => warn!("gateway shutdown timed out, tasks aborted"),
        }
    }
}

/// Fixed-interval task. The first tick fires immediately, so reconcile
/// loops do an initial pass at startup.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick_fn: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => tick_fn().await,
            }
        }
        debug!("{} task stopped", name);
    })
}

/// Adaptive drain task: the tick function reports the remaining backlog and
/// the policy turns it into the next sleep, short under load and long when
/// idle.
fn spawn_drain<F, Fut>(
    name: &'static str,
    policy: DrainPolicy,
    token: CancellationToken,
    mut drain_fn: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = usize> + Send,
{
    tokio::spawn(async move {
        // Queues start empty, so the first tick waits the idle interval.
        let mut delay = policy.next_delay(0);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    let backlog = drain_fn().await;
                    delay = policy.next_delay(backlog);
                }
            }
        }
        debug!("{} task stopped", name);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_drain_loop_starts_on_the_idle_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let policy = DrainPolicy::new(Duration::from_millis(400), Duration::from_secs(10), 1);
        let token = CancellationToken::new();

        let counter = Arc::clone(&ticks);
        let handle = spawn_drain("idle-start-drain", policy, token.clone(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            }
        });

        // Queues start empty: nothing fires on the busy cadence.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        // The first tick lands after the idle interval.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
