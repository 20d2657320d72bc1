//! Error types for the reporting layer

use crate::capability::{Capability, ValueKind};
use crate::cluster::{AttributeKey, Cluster};
use thiserror::Error;

/// Errors returned by the Zigbee transport collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response from the device in time
    #[error("Request timeout")]
    Timeout,

    /// Radio stack is not available
    #[error("Transport not connected")]
    NotConnected,

    /// Device answered with a non-success ZCL status
    #[error("Device returned error status: {0:#04x}")]
    Rejected(u8),

    /// Lower-level failure reported by the stack
    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Errors returned by the capability host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Capability has not been added to the device
    #[error("Capability not present: {0}")]
    UnknownCapability(Capability),

    /// Host refused the operation
    #[error("Host rejected value: {0}")]
    Rejected(String),
}

/// Precondition violations in a report spec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// Minimum reporting interval above the maximum
    #[error("Min interval {min}s exceeds max interval {max}s")]
    IntervalOrder { min: u16, max: u16 },

    /// Negative, infinite or NaN reportable change
    #[error("Reportable change must be a non-negative number, got {0}")]
    ReportableChange(String),

    /// Poll interval of zero
    #[error("Poll interval must be at least one second")]
    ZeroPollInterval,

    /// Decoder output does not match the capability value kind
    #[error("Decoder yields {decoder} but {capability} expects {expected}")]
    TypeMismatch {
        capability: Capability,
        expected: ValueKind,
        decoder: ValueKind,
    },

    /// Nothing to decode into
    #[error("Spec has no capability bindings")]
    NoBindings,

    /// Same capability bound twice on one attribute
    #[error("Capability {0} is bound twice")]
    DuplicateBinding(Capability),
}

/// Subscription setup failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Spec failed validation; no request was sent
    #[error("Invalid report spec for {key}: {source}")]
    Invalid {
        key: AttributeKey,
        #[source]
        source: SpecError,
    },

    /// Another spec already owns the attribute
    #[error("A different spec is already registered for {0}")]
    Conflict(AttributeKey),

    /// Configure Reporting request failed
    #[error("Subscription for {key} failed: {source}")]
    Transport {
        key: AttributeKey,
        #[source]
        source: TransportError,
    },

    /// Session was torn down before the request completed
    #[error("Subscription for {0} abandoned by teardown")]
    Abandoned(AttributeKey),
}

/// Capability commit failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    /// Value kind does not match the capability
    #[error("{capability} expects {expected}, got {actual}")]
    TypeMismatch {
        capability: Capability,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Capability could not be added to the device
    #[error("Failed to add capability {capability}: {source}")]
    Ensure {
        capability: Capability,
        #[source]
        source: HostError,
    },

    /// Host rejected the value
    #[error("Failed to set {capability}: {source}")]
    Host {
        capability: Capability,
        #[source]
        source: HostError,
    },

    /// Session was torn down before the write
    #[error("Session torn down, {0} update discarded")]
    TornDown(Capability),
}

/// One-shot attribute read failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to read {}: {source}", describe_attributes(.cluster, .attributes))]
pub struct ReadError {
    pub cluster: Cluster,
    pub attributes: Vec<u16>,
    #[source]
    pub source: TransportError,
}

impl ReadError {
    /// Attributes the failed request asked for
    pub fn keys(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        self.attributes
            .iter()
            .map(|attribute| AttributeKey::new(self.cluster, *attribute))
    }
}

fn describe_attributes(cluster: &Cluster, attributes: &[u16]) -> String {
    attributes
        .iter()
        .map(|attribute| AttributeKey::new(*cluster, *attribute).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Host command failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Capability is reported by the device, not set by the host
    #[error("Capability {0} is read-only")]
    ReadOnly(Capability),

    /// Device does not expose the capability
    #[error("Capability {0} is not part of this device profile")]
    NotSupported(Capability),

    /// Value kind does not match the capability
    #[error("{capability} expects {expected}")]
    InvalidValue {
        capability: Capability,
        expected: ValueKind,
    },

    /// Command could not be delivered
    #[error("Command transport failed: {0}")]
    Transport(#[from] TransportError),

    /// Session has been torn down
    #[error("Session is not accepting commands")]
    SessionClosed,
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Malformed IEEE address string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid IEEE address: {0}")]
pub struct ParseIeeeError(pub String);

/// Session hub failures
#[derive(Error, Debug)]
pub enum HubError {
    /// Model has no built-in profile
    #[error("No device profile for model {0}")]
    UnknownModel(String),

    /// No session is running for the address
    #[error("No session for device {0}")]
    UnknownDevice(String),

    /// A session is already running for the address
    #[error("Session already running for device {0}")]
    AlreadyRunning(String),

    /// Session task stopped accepting messages
    #[error("Session for device {0} has stopped")]
    SessionClosed(String),

    /// Session rejected the command
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Session task panicked or was aborted
    #[error("Session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
