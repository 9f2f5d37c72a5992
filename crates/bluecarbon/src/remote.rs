//! The remote authority that acknowledges synchronized records.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{CollectionKind, Record};

/// One record as sent to the remote authority.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEnvelope {
    /// Collection the record belongs to.
    pub collection: CollectionKind,
    /// Local identifier.
    pub id: u64,
    /// Content digest; repeats of the same digest are the same intent.
    pub digest: String,
    /// The record as JSON.
    pub payload: serde_json::Value,
}

impl PushEnvelope {
    /// Wrap a record for pushing.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn for_record<T: Record>(record: &T) -> Result<Self> {
        Ok(Self {
            collection: T::KIND,
            id: record.id(),
            digest: record.content_digest()?,
            payload: serde_json::to_value(record)?,
        })
    }
}

/// An authority that accepts records and acknowledges them.
///
/// An `Ok` return is the acknowledgement. Implementations must tolerate the
/// same envelope arriving more than once.
#[async_trait::async_trait]
pub trait RemoteAuthority: Send + Sync + std::fmt::Debug {
    /// Push one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record was not accepted.
    async fn push(&self, envelope: &PushEnvelope) -> Result<()>;
}

/// How [`SimulatedRemote`] answers pushes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemoteBehavior {
    /// Acknowledge after the configured latency.
    #[default]
    Accept,
    /// Refuse with the given reason.
    Reject(String),
    /// Never answer.
    Hang,
}

/// In-process stand-in for the remote authority.
#[derive(Debug)]
pub struct SimulatedRemote {
    latency: Duration,
    behavior: Mutex<RemoteBehavior>,
    received: Mutex<Vec<PushEnvelope>>,
    accepted: Mutex<HashSet<String>>,
}

impl SimulatedRemote {
    /// Create a remote that accepts every push after `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            behavior: Mutex::new(RemoteBehavior::Accept),
            received: Mutex::new(Vec::new()),
            accepted: Mutex::new(HashSet::new()),
        }
    }

    /// Change how subsequent pushes are answered.
    pub fn set_behavior(&self, behavior: RemoteBehavior) {
        *self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Every envelope received, in arrival order, including repeats.
    #[must_use]
    pub fn received(&self) -> Vec<PushEnvelope> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of distinct records acknowledged.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for SimulatedRemote {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait::async_trait]
impl RemoteAuthority for SimulatedRemote {
    async fn push(&self, envelope: &PushEnvelope) -> Result<()> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());

        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match behavior {
            RemoteBehavior::Accept => {
                tokio::time::sleep(self.latency).await;
                let fresh = self
                    .accepted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(envelope.digest.clone());
                debug!(
                    collection = %envelope.collection,
                    id = envelope.id,
                    duplicate = !fresh,
                    "Remote acknowledged push"
                );
                Ok(())
            }
            RemoteBehavior::Reject(reason) => Err(Error::push_failure(
                envelope.collection.key(),
                envelope.id,
                reason,
            )),
            RemoteBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreditLedgerEntry, CreditOperation};
    use chrono::Utc;

    fn envelope(id: u64) -> PushEnvelope {
        let entry = CreditLedgerEntry {
            id,
            project_id: 1,
            quantity: 5.0,
            unit_price: 12.0,
            operation: CreditOperation::Issue,
            timestamp: Utc::now(),
            synced: false,
        };
        PushEnvelope::for_record(&entry).unwrap()
    }

    #[test]
    fn test_envelope_carries_collection_and_id() {
        let env = envelope(4);
        assert_eq!(env.collection, CollectionKind::Credits);
        assert_eq!(env.id, 4);
        assert_eq!(env.payload["id"], 4);
        assert_eq!(env.digest.len(), 64);
    }

    #[tokio::test]
    async fn test_accepts_and_dedupes_by_digest() {
        let remote = SimulatedRemote::new(Duration::ZERO);
        let env = envelope(1);

        remote.push(&env).await.unwrap();
        remote.push(&env).await.unwrap();

        assert_eq!(remote.received().len(), 2);
        assert_eq!(remote.accepted_count(), 1);
    }

    #[tokio::test]
    async fn test_reject() {
        let remote = SimulatedRemote::new(Duration::ZERO);
        remote.set_behavior(RemoteBehavior::Reject("quota exceeded".to_string()));

        let err = remote.push(&envelope(2)).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(remote.accepted_count(), 0);
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let remote = SimulatedRemote::new(Duration::ZERO);
        remote.set_behavior(RemoteBehavior::Hang);

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), remote.push(&envelope(3))).await;
        assert!(outcome.is_err());
    }
}
