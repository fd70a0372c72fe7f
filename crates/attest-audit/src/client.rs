//! The audit client: signs, chains and emits events.

use std::sync::Arc;

use attest_canonical::{CanonicalOptions, encode};
use chrono::{SecondsFormat, Utc};
use tokio::sync::Mutex;

use crate::error::AuditResult;
use crate::event::{AuditEvent, EventDraft};
use crate::signature::{SigningKey, compute_hmac};
use crate::sink::AuditSink;

/// Signs audit events, links them into a tamper-evident chain and writes
/// them through a sink.
///
/// Chain state (the last emitted signature) lives in memory for the
/// lifetime of the client. To continue a chain across restarts, seed the
/// builder with [`last_hmac_from_file`](crate::chain::last_hmac_from_file).
///
/// Calls to [`log`](Self::log) on one client are serialized internally so
/// the chain stays strictly ordered even under concurrent callers.
pub struct AuditClient {
    signing_key: SigningKey,
    key_id: Option<String>,
    chain: bool,
    last_hmac: Mutex<Option<String>>,
    sink: Arc<dyn AuditSink>,
}

impl AuditClient {
    /// Start building a client with the given signing key and sink.
    #[must_use]
    pub fn builder(signing_key: impl Into<SigningKey>, sink: Arc<dyn AuditSink>) -> AuditClientBuilder {
        AuditClientBuilder {
            signing_key: signing_key.into(),
            sink,
            key_id: None,
            chain: true,
            seed_prev_hmac: None,
        }
    }

    /// Sign the draft, link it to the previous event, write it through the
    /// sink and return the frozen event.
    ///
    /// The timestamp defaults to the current UTC time when the draft does
    /// not supply one. An absent user is normalized to the system-actor
    /// marker; every other unsupplied optional is omitted from the signed
    /// form.
    ///
    /// # Errors
    ///
    /// Propagates canonical-encoding failures, serialization failures and
    /// sink rejections. The caller decides whether a failed write is fatal.
    pub async fn log(&self, draft: EventDraft) -> AuditResult<AuditEvent> {
        // Hold the chain lock across read-sign-write-advance so concurrent
        // callers cannot interleave and fork the chain.
        let mut last_hmac = self.last_hmac.lock().await;

        let timestamp = draft
            .timestamp
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        let mut event = AuditEvent {
            timestamp,
            user: draft.user,
            action: draft.action,
            entity: draft.entity,
            details: draft.details,
            request_id: draft.request_id,
            outcome: draft.outcome,
            error: draft.error,
            key_id: self.key_id.clone(),
            prev_hmac: if self.chain { last_hmac.clone() } else { None },
            hmac: String::new(),
        };

        let canonical = encode(&event.signing_envelope(), &CanonicalOptions::default())?;
        event.hmac = compute_hmac(&self.signing_key, &canonical);

        if self.chain {
            *last_hmac = Some(event.hmac.clone());
        }

        let line = serde_json::to_string(&event)?;
        self.sink.write(&line).await?;

        tracing::debug!(action = %event.action, "audit event emitted");
        Ok(event)
    }
}

impl std::fmt::Debug for AuditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditClient")
            .field("key_id", &self.key_id)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuditClient`].
pub struct AuditClientBuilder {
    signing_key: SigningKey,
    sink: Arc<dyn AuditSink>,
    key_id: Option<String>,
    chain: bool,
    seed_prev_hmac: Option<String>,
}

impl AuditClientBuilder {
    /// Tag emitted events with a signing-key identifier.
    #[must_use]
    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Enable or disable chain linking (enabled by default).
    #[must_use]
    pub fn chain(mut self, chain: bool) -> Self {
        self.chain = chain;
        self
    }

    /// Seed the chain with a previously persisted signature, continuing a
    /// lineage across process restarts.
    #[must_use]
    pub fn seed_prev_hmac(mut self, seed: impl Into<String>) -> Self {
        self.seed_prev_hmac = Some(seed.into());
        self
    }

    /// Finish the build.
    #[must_use]
    pub fn build(self) -> AuditClient {
        AuditClient {
            signing_key: self.signing_key,
            key_id: self.key_id,
            chain: self.chain,
            last_hmac: Mutex::new(self.seed_prev_hmac),
            sink: self.sink,
        }
    }
}

impl std::fmt::Debug for AuditClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditClientBuilder")
            .field("key_id", &self.key_id)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditUser, Outcome};
    use crate::sink::{MemorySink, SinkResult};
    use attest_canonical::CanonicalValue;

    fn details(n: i64) -> CanonicalValue {
        CanonicalValue::Mapping(vec![("n".to_string(), CanonicalValue::from(n))])
    }

    #[tokio::test]
    async fn chains_events_in_emission_order() {
        let sink = Arc::new(MemorySink::default());
        let client = AuditClient::builder("test-secret", sink.clone()).build();

        let first = client
            .log(EventDraft::new("A1").with_entity("E").with_details(details(1)))
            .await
            .unwrap();
        let second = client
            .log(EventDraft::new("A2").with_entity("E").with_details(details(2)))
            .await
            .unwrap();

        assert!(first.prev_hmac.is_none());
        assert_eq!(second.prev_hmac.as_deref(), Some(first.hmac.as_str()));
        assert_eq!(sink.lines().len(), 2);
    }

    #[tokio::test]
    async fn unchained_client_never_links() {
        let sink = Arc::new(MemorySink::default());
        let client = AuditClient::builder("test-secret", sink).chain(false).build();

        let first = client.log(EventDraft::new("A1")).await.unwrap();
        let second = client.log(EventDraft::new("A2")).await.unwrap();

        assert!(first.prev_hmac.is_none());
        assert!(second.prev_hmac.is_none());
    }

    #[tokio::test]
    async fn seeded_client_continues_the_lineage() {
        let sink = Arc::new(MemorySink::default());
        let client = AuditClient::builder("test-secret", sink)
            .seed_prev_hmac("aabbcc")
            .build();

        let event = client.log(EventDraft::new("A1")).await.unwrap();
        assert_eq!(event.prev_hmac.as_deref(), Some("aabbcc"));
    }

    #[tokio::test]
    async fn signature_covers_every_field_but_itself() {
        let sink = Arc::new(MemorySink::default());
        let client = AuditClient::builder("test-secret", sink)
            .key_id("k1")
            .build();

        let event = client
            .log(
                EventDraft::new("createProject")
                    .with_user(AuditUser::new("u-1"))
                    .with_outcome(Outcome::Success)
                    .with_details(details(7)),
            )
            .await
            .unwrap();

        let canonical = encode(&event.signing_envelope(), &CanonicalOptions::default()).unwrap();
        let recomputed = compute_hmac(&SigningKey::from("test-secret"), &canonical);
        assert_eq!(recomputed, event.hmac);

        // Any signed field change shows up in the recomputation.
        let mut tampered = event.clone();
        tampered.details = Some(details(8));
        let canonical = encode(&tampered.signing_envelope(), &CanonicalOptions::default()).unwrap();
        let recomputed = compute_hmac(&SigningKey::from("test-secret"), &canonical);
        assert_ne!(recomputed, event.hmac);
    }

    #[tokio::test]
    async fn sink_failures_propagate_to_the_caller() {
        struct FailingSink;

        #[async_trait::async_trait]
        impl AuditSink for FailingSink {
            async fn write(&self, _line: &str) -> SinkResult<()> {
                Err(std::io::Error::from(std::io::ErrorKind::StorageFull).into())
            }
            async fn drain(&self) -> SinkResult<()> {
                Ok(())
            }
            async fn close(&self) -> SinkResult<()> {
                Ok(())
            }
        }

        let client = AuditClient::builder("test-secret", Arc::new(FailingSink)).build();
        assert!(client.log(EventDraft::new("A1")).await.is_err());
    }
}
