//! Commits decoded values to host capability state

use crate::capability::{Capability, CapabilityValue};
use crate::error::CommitError;
use crate::host::CapabilityHost;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Writes capability values for one session
///
/// Capability existence is checked once per capability; later commits skip
/// the host round trip. Nothing is written once the session token is
/// cancelled.
#[derive(Debug)]
pub struct CapabilityBridge {
    ensured: HashSet<Capability>,
    cancel: CancellationToken,
}

impl CapabilityBridge {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            ensured: HashSet::new(),
            cancel,
        }
    }

    /// Make sure the host carries `capability`
    pub async fn ensure(
        &mut self,
        host: &dyn CapabilityHost,
        capability: Capability,
    ) -> Result<(), CommitError> {
        if self.ensured.contains(&capability) {
            return Ok(());
        }
        if !host.has_capability(capability) {
            tracing::debug!(capability = %capability, "Adding missing capability");
            host.add_capability(capability)
                .await
                .map_err(|source| CommitError::Ensure { capability, source })?;
        }
        self.ensured.insert(capability);
        Ok(())
    }

    #[must_use]
    pub fn is_ensured(&self, capability: Capability) -> bool {
        self.ensured.contains(&capability)
    }

    /// Commit `value` as the new state of `capability`
    pub async fn apply(
        &mut self,
        host: &dyn CapabilityHost,
        capability: Capability,
        value: CapabilityValue,
    ) -> Result<(), CommitError> {
        if self.cancel.is_cancelled() {
            return Err(CommitError::TornDown(capability));
        }
        let expected = capability.value_kind();
        if value.kind() != expected {
            return Err(CommitError::TypeMismatch {
                capability,
                expected,
                actual: value.kind(),
            });
        }

        self.ensure(host, capability).await?;

        // ensure() may have suspended across a teardown
        if self.cancel.is_cancelled() {
            return Err(CommitError::TornDown(capability));
        }

        host.set_capability_value(capability, value)
            .await
            .map_err(|source| CommitError::Host { capability, source })
    }

    /// Commit values decoded from one raw snapshot, in order
    ///
    /// A failure on one capability does not stop the others.
    pub async fn apply_all(
        &mut self,
        host: &dyn CapabilityHost,
        values: &[(Capability, CapabilityValue)],
    ) -> Vec<(Capability, Result<(), CommitError>)> {
        let mut results = Vec::with_capacity(values.len());
        for (capability, value) in values {
            let result = self.apply(host, *capability, *value).await;
            results.push((*capability, result));
        }
        results
    }
}
