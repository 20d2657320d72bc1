//! Zigbee transport collaborator
//!
//! The radio stack (node discovery, ZCL framing, APS delivery) lives behind
//! this trait. Incoming attribute reports are not pulled through it; the
//! stack pushes them into the owning session as [`RawAttributeReport`]s.
//!
//! [`RawAttributeReport`]: crate::reporting::RawAttributeReport

use crate::cluster::{AttributeValue, Cluster, ClusterCommand};
use crate::error::TransportError;
use crate::reporting::AttributeReportSpec;
use async_trait::async_trait;

/// Parameters of a Configure Reporting request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionRequest {
    pub cluster: Cluster,
    pub attribute: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub reportable_change: f64,
}

impl From<&AttributeReportSpec> for SubscriptionRequest {
    fn from(spec: &AttributeReportSpec) -> Self {
        Self {
            cluster: spec.key.cluster,
            attribute: spec.key.attribute,
            min_interval: spec.min_interval,
            max_interval: spec.max_interval,
            reportable_change: spec.reportable_change,
        }
    }
}

/// Operations consumed from the Zigbee stack for one device
#[async_trait]
pub trait ZclTransport: Send + Sync {
    /// Configure attribute reporting on the device
    async fn subscribe_attribute_report(
        &self,
        request: SubscriptionRequest,
    ) -> Result<(), TransportError>;

    /// Read attributes from one cluster
    async fn read_attributes(
        &self,
        cluster: Cluster,
        attributes: &[u16],
    ) -> Result<Vec<(u16, AttributeValue)>, TransportError>;

    /// Bind a device cluster to an endpoint on the coordinator
    async fn bind_cluster(&self, cluster: Cluster, target_endpoint: u8)
        -> Result<(), TransportError>;

    /// Send a cluster-specific command
    async fn send_command(&self, command: ClusterCommand) -> Result<(), TransportError>;
}
