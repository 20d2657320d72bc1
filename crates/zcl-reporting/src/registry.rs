//! Per-device table of attribute report subscriptions

use crate::cluster::AttributeKey;
use crate::error::{RegistrationError, TransportError};
use crate::reporting::AttributeReportSpec;
use crate::transport::{SubscriptionRequest, ZclTransport};
use futures::future::join_all;
use std::collections::BTreeMap;

/// Subscription state of one spec
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Pending,
    Active,
    Failed(RegistrationError),
}

impl RegistrationOutcome {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, RegistrationOutcome::Active)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, RegistrationOutcome::Failed(_))
    }
}

/// A registered spec with its subscription bookkeeping
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub spec: AttributeReportSpec,
    pub outcome: RegistrationOutcome,
    /// Subscription requests issued for this spec
    pub attempts: u32,
}

enum Admission {
    Done(RegistrationOutcome),
    Submit(SubscriptionRequest),
}

/// Registered specs keyed by (cluster, attribute)
#[derive(Debug, Default)]
pub struct AttributeReportRegistry {
    entries: BTreeMap<AttributeKey, ReportingConfig>,
}

impl AttributeReportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a spec needs a subscription request
    fn admit(&mut self, spec: AttributeReportSpec) -> Admission {
        let key = spec.key;
        if let Err(source) = spec.validate() {
            return Admission::Done(RegistrationOutcome::Failed(RegistrationError::Invalid {
                key,
                source,
            }));
        }

        match self.entries.get_mut(&key) {
            Some(entry) if entry.spec != spec => Admission::Done(RegistrationOutcome::Failed(
                RegistrationError::Conflict(key),
            )),
            Some(entry) => match entry.outcome {
                RegistrationOutcome::Active | RegistrationOutcome::Pending => {
                    Admission::Done(entry.outcome.clone())
                }
                RegistrationOutcome::Failed(_) => {
                    entry.outcome = RegistrationOutcome::Pending;
                    entry.attempts += 1;
                    Admission::Submit(SubscriptionRequest::from(&entry.spec))
                }
            },
            None => {
                let request = SubscriptionRequest::from(&spec);
                self.entries.insert(
                    key,
                    ReportingConfig {
                        spec,
                        outcome: RegistrationOutcome::Pending,
                        attempts: 1,
                    },
                );
                Admission::Submit(request)
            }
        }
    }

    /// Record the transport result for a submitted spec
    fn complete(
        &mut self,
        key: AttributeKey,
        result: Result<(), TransportError>,
    ) -> RegistrationOutcome {
        let outcome = match result {
            Ok(()) => RegistrationOutcome::Active,
            Err(source) => RegistrationOutcome::Failed(RegistrationError::Transport { key, source }),
        };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.outcome = outcome.clone();
        }
        outcome
    }

    /// Register one spec
    pub async fn register(
        &mut self,
        transport: &dyn ZclTransport,
        spec: AttributeReportSpec,
    ) -> RegistrationOutcome {
        let key = spec.key;
        match self.admit(spec) {
            Admission::Done(outcome) => outcome,
            Admission::Submit(request) => {
                let result = transport.subscribe_attribute_report(request).await;
                self.complete(key, result)
            }
        }
    }

    /// Register several specs; each succeeds or fails on its own
    ///
    /// Subscription requests are issued concurrently. Outcomes are returned in
    /// input order.
    pub async fn register_all(
        &mut self,
        transport: &dyn ZclTransport,
        specs: impl IntoIterator<Item = AttributeReportSpec>,
    ) -> Vec<(AttributeKey, RegistrationOutcome)> {
        let admissions: Vec<(AttributeKey, Admission)> = specs
            .into_iter()
            .map(|spec| (spec.key, self.admit(spec)))
            .collect();

        let submitted: Vec<(AttributeKey, SubscriptionRequest)> = admissions
            .iter()
            .filter_map(|(key, admission)| match admission {
                Admission::Submit(request) => Some((*key, *request)),
                Admission::Done(_) => None,
            })
            .collect();

        let results = join_all(
            submitted
                .iter()
                .map(|(_, request)| transport.subscribe_attribute_report(*request)),
        )
        .await;

        for ((key, _), result) in submitted.iter().zip(results) {
            self.complete(*key, result);
        }

        admissions
            .into_iter()
            .map(|(key, admission)| {
                let outcome = match admission {
                    Admission::Submit(_) | Admission::Done(RegistrationOutcome::Pending) => self
                        .outcome(&key)
                        .cloned()
                        .unwrap_or(RegistrationOutcome::Pending),
                    Admission::Done(outcome) => outcome,
                };
                (key, outcome)
            })
            .collect()
    }

    /// Re-issue subscriptions for every failed entry
    pub async fn retry_failed(
        &mut self,
        transport: &dyn ZclTransport,
    ) -> Vec<(AttributeKey, RegistrationOutcome)> {
        let failed: Vec<AttributeReportSpec> = self
            .entries
            .values()
            .filter(|entry| entry.outcome.is_failed())
            .map(|entry| entry.spec.clone())
            .collect();
        if failed.is_empty() {
            return Vec::new();
        }
        self.register_all(transport, failed).await
    }

    /// Mark every pending subscription as abandoned
    pub fn abandon_pending(&mut self) -> usize {
        let mut abandoned = 0;
        for (key, entry) in &mut self.entries {
            if entry.outcome == RegistrationOutcome::Pending {
                entry.outcome =
                    RegistrationOutcome::Failed(RegistrationError::Abandoned(*key));
                abandoned += 1;
            }
        }
        abandoned
    }

    /// Spec that receives unsolicited reports for `key`
    #[must_use]
    pub fn route(&self, key: &AttributeKey) -> Option<&AttributeReportSpec> {
        self.entries
            .get(key)
            .filter(|entry| entry.outcome.is_active())
            .map(|entry| &entry.spec)
    }

    #[must_use]
    pub fn get(&self, key: &AttributeKey) -> Option<&ReportingConfig> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn outcome(&self, key: &AttributeKey) -> Option<&RegistrationOutcome> {
        self.entries.get(key).map(|entry| &entry.outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportingConfig> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.outcome.is_active())
            .count()
    }
}
