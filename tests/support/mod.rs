//! Test support: scripted mock collaborators
//!
//! The bridge answers from a closure supplied by the test, every mock keeps
//! a call journal, and the catalog's update row count is configurable so
//! conflict paths can be exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use bacsrv::{
    CatalogPoint, CloudCatalog, ControllerRecord, ControllerUpdate, GatewayError, ObjectId,
    ObjectKind, ProtocolBridge, Request, Response, Result, TelemetryRecord, TelemetrySink,
};

type BridgeHandler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

pub struct MockBridge {
    handler: BridgeHandler,
    requests: Mutex<Vec<Request>>,
}

impl MockBridge {
    pub fn new(handler: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Bridge that acknowledges everything; for tests that only care about
    /// the journal.
    pub fn acking() -> Self {
        Self::new(|_| Ok(Response::Ack))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, Request::SubscribeCov { .. }))
            .count()
    }
}

#[async_trait]
impl ProtocolBridge for MockBridge {
    async fn submit(&self, request: Request) -> Result<Response> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(&request)
    }
}

#[derive(Default)]
pub struct MockCatalog {
    pub controllers: Mutex<Vec<ControllerRecord>>,
    pub points: Mutex<Vec<CatalogPoint>>,
    /// Row count reported by `update_controller`; 1 unless a test forces a
    /// conflict
    pub update_rows: Mutex<u64>,
    pub updates: Mutex<Vec<(String, ControllerUpdate)>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            update_rows: Mutex::new(1),
            ..Self::default()
        }
    }

    pub fn with_controllers(controllers: Vec<ControllerRecord>) -> Self {
        let catalog = Self::new();
        *catalog.controllers.lock().unwrap() = controllers;
        catalog
    }

    pub fn set_update_rows(&self, rows: u64) {
        *self.update_rows.lock().unwrap() = rows;
    }

    pub fn updates(&self) -> Vec<(String, ControllerUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudCatalog for MockCatalog {
    async fn fetch_controllers(&self) -> Result<Vec<ControllerRecord>> {
        Ok(self.controllers.lock().unwrap().clone())
    }

    async fn fetch_points(&self) -> Result<Vec<CatalogPoint>> {
        Ok(self.points.lock().unwrap().clone())
    }

    async fn update_controller(&self, address: &str, changes: ControllerUpdate) -> Result<u64> {
        self.updates
            .lock()
            .unwrap()
            .push((address.to_string(), changes));
        Ok(*self.update_rows.lock().unwrap())
    }
}

#[derive(Default)]
pub struct MockSink {
    pub records: Mutex<Vec<TelemetryRecord>>,
    pub fail: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for MockSink {
    async fn publish(&self, record: TelemetryRecord) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::publish("sink unavailable"));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub fn unnamed_controller(address: &str) -> ControllerRecord {
    ControllerRecord {
        address: address.to_string(),
        name: None,
        device_instance: None,
        sensors_registered: false,
    }
}

pub fn catalog_point(address: &str, object: ObjectId, name: &str, mode: &str) -> CatalogPoint {
    CatalogPoint {
        address: address.to_string(),
        object,
        name: name.to_string(),
        description: String::new(),
        units: None,
        mode: mode.to_string(),
        enabled: true,
        device_type: "sensor".to_string(),
    }
}

pub fn analog_input(instance: u32) -> ObjectId {
    ObjectId::new(ObjectKind::AnalogInput, instance)
}

/// Poll a condition until it holds or a second passes. Request completions
/// run on detached tasks, so tests wait for their observable effects.
pub async fn wait_until<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}
