//! Protocol request bridge contract
//!
//! The field transport (request encoding, response matching, retransmission,
//! timeouts) lives outside this crate. The core only describes the requests
//! it wants issued and reacts to the decoded outcome. A submitted request
//! may never complete; nothing in the core waits on one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{ObjectId, PointValue};
use crate::error::Result;

/// Property identifiers the core reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyId {
    ObjectName,
    Description,
    PresentValue,
    Units,
    ObjectList,
}

/// An outbound request description.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Identity discovery addressed to one controller. The announcement
    /// arrives out of band via the identity handler, not as this request's
    /// response.
    WhoIs { target: String },
    /// Single-property read
    ReadProperty {
        target: String,
        object: ObjectId,
        property: PropertyId,
    },
    /// Multi-property read, one round trip
    ReadProperties {
        target: String,
        object: ObjectId,
        properties: Vec<PropertyId>,
    },
    /// Change-of-value subscription with a bounded lease
    SubscribeCov {
        target: String,
        object: ObjectId,
        process_id: u32,
        lifetime_secs: u64,
        confirmed: bool,
    },
}

impl Request {
    /// Address the request is directed at. For bridge implementors routing
    /// the request and for log context; the core itself carries the address
    /// alongside.
    pub fn target(&self) -> &str {
        match self {
            Request::WhoIs { target }
            | Request::ReadProperty { target, .. }
            | Request::ReadProperties { target, .. }
            | Request::SubscribeCov { target, .. } => target,
        }
    }
}

/// Resolved values from a multi-property read.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBundle {
    pub name: String,
    pub description: String,
    pub present_value: PointValue,
    pub units: Option<String>,
}

/// A decoded response.
///
/// The variant must match the request that produced it; a mismatch is
/// logged and dropped by the caller as an unexpected response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Simple acknowledgement (who-is sent, subscription accepted)
    Ack,
    ObjectName(String),
    ObjectList(Vec<ObjectId>),
    PresentValue(PointValue),
    PropertyBundle(PropertyBundle),
}

/// An unsolicited identity announcement (I-Am) decoded by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityAnnouncement {
    /// Responding controller address
    pub source: String,
    /// The controller's device object identifier
    pub device_id: ObjectId,
}

/// An unsolicited change-of-value notification decoded by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CovNotification {
    pub source: String,
    /// The monitored object
    pub object: ObjectId,
    /// Reported property values; the core only consumes `PresentValue`
    pub values: Vec<(PropertyId, PointValue)>,
}

impl CovNotification {
    /// The reported present value, if the notification carried one.
    pub fn present_value(&self) -> Option<&PointValue> {
        self.values
            .iter()
            .find(|(prop, _)| *prop == PropertyId::PresentValue)
            .map(|(_, value)| value)
    }
}

/// The transport exchange consumed by the core.
///
/// `submit` resolves once with the decoded response or a transport error.
/// Completion order across distinct requests is unspecified. Callers that
/// must not be held up run the submit-and-complete chain on a spawned task.
#[async_trait]
pub trait ProtocolBridge: Send + Sync {
    async fn submit(&self, request: Request) -> Result<Response>;
}
