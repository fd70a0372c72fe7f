//! Audit event types.
//!
//! An [`AuditEvent`] is the persisted, immutable record of one business
//! action. Every field except `hmac` is covered by the signature; `prevHmac`
//! links the event to its predecessor so deletion or reordering of history
//! is detectable.

use attest_canonical::CanonicalValue;
use serde::{Deserialize, Serialize};

/// Outcome of an audited business operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The operation completed.
    Success,
    /// The operation failed.
    Error,
}

/// The identity that performed an audited action.
///
/// `None` in an event's `user` field is the system-actor marker, which is
/// physically present (serialized as `null`) so that "no user" stays
/// distinguishable from "field not yet known".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditUser {
    /// Stable user identifier.
    pub id: String,
    /// Display name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AuditUser {
    /// A user with just an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// A user with an identifier and display name.
    #[must_use]
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// Structured description of a business error captured in an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type name.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Stack trace or backtrace text, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    /// Build from a name and message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Capture an error value, using its short type name as the error name.
    #[must_use]
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::new(short, err.to_string())
    }
}

/// A signed, chain-linked audit event as persisted (one JSON line each).
///
/// Fields are frozen once signing completes. Optional fields are physically
/// omitted from the serialized form when not supplied, except `user`, which
/// is always present (`null` = system actor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Acting user, or `None` for the system actor.
    pub user: Option<AuditUser>,
    /// Business operation name.
    pub action: String,
    /// Business entity the action concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Open, arbitrarily nested business payload. Always signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CanonicalValue>,
    /// Correlation/trace identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Success or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Captured business error, for `outcome: error` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Identifier of the signing key version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Signature of the preceding event in this lineage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hmac: Option<String>,
    /// Signature over every other field, hex-encoded HMAC-SHA256.
    pub hmac: String,
}

impl AuditEvent {
    /// The canonical envelope covered by this event's signature: every
    /// field except `hmac`, with absent optionals pruned and `user`
    /// normalized to `null` for the system actor.
    #[must_use]
    pub fn signing_envelope(&self) -> CanonicalValue {
        let mut entries: Vec<(String, CanonicalValue)> = Vec::new();

        entries.push(("timestamp".to_string(), CanonicalValue::from(self.timestamp.clone())));

        let user = self.user.as_ref().map_or(CanonicalValue::Null, |u| {
            let mut fields = vec![("id".to_string(), CanonicalValue::from(u.id.clone()))];
            if let Some(name) = &u.name {
                fields.push(("name".to_string(), CanonicalValue::from(name.clone())));
            }
            CanonicalValue::Mapping(fields)
        });
        entries.push(("user".to_string(), user));

        entries.push(("action".to_string(), CanonicalValue::from(self.action.clone())));

        if let Some(entity) = &self.entity {
            entries.push(("entity".to_string(), CanonicalValue::from(entity.clone())));
        }
        if let Some(details) = &self.details {
            entries.push(("details".to_string(), details.clone()));
        }
        if let Some(request_id) = &self.request_id {
            entries.push(("requestId".to_string(), CanonicalValue::from(request_id.clone())));
        }
        if let Some(outcome) = self.outcome {
            let text = match outcome {
                Outcome::Success => "success",
                Outcome::Error => "error",
            };
            entries.push(("outcome".to_string(), CanonicalValue::from(text)));
        }
        if let Some(error) = &self.error {
            let mut fields = vec![
                ("name".to_string(), CanonicalValue::from(error.name.clone())),
                ("message".to_string(), CanonicalValue::from(error.message.clone())),
            ];
            if let Some(stack) = &error.stack {
                fields.push(("stack".to_string(), CanonicalValue::from(stack.clone())));
            }
            entries.push(("error".to_string(), CanonicalValue::Mapping(fields)));
        }
        if let Some(key_id) = &self.key_id {
            entries.push(("keyId".to_string(), CanonicalValue::from(key_id.clone())));
        }
        if let Some(prev_hmac) = &self.prev_hmac {
            entries.push(("prevHmac".to_string(), CanonicalValue::from(prev_hmac.clone())));
        }

        CanonicalValue::Mapping(entries)
    }
}

/// The caller-supplied part of an event, before signing.
///
/// The client computes `timestamp` (when absent), `keyId`, `prevHmac` and
/// `hmac`.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    /// Caller-supplied timestamp override.
    pub timestamp: Option<String>,
    /// Acting user; `None` means the system actor.
    pub user: Option<AuditUser>,
    /// Business operation name.
    pub action: String,
    /// Business entity the action concerns.
    pub entity: Option<String>,
    /// Open business payload.
    pub details: Option<CanonicalValue>,
    /// Correlation/trace identifier.
    pub request_id: Option<String>,
    /// Success or error.
    pub outcome: Option<Outcome>,
    /// Captured business error.
    pub error: Option<ErrorInfo>,
}

impl EventDraft {
    /// Start a draft for the given action.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Override the timestamp instead of defaulting to signing time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Attribute the action to a user.
    #[must_use]
    pub fn with_user(mut self, user: AuditUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Name the business entity.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attach the business payload.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<CanonicalValue>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach a correlation identifier.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Record the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Record a captured business error.
    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_serializes_as_explicit_null() {
        let event = AuditEvent {
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            user: None,
            action: "boot".to_string(),
            entity: None,
            details: None,
            request_id: None,
            outcome: None,
            error: None,
            key_id: None,
            prev_hmac: None,
            hmac: "00".to_string(),
        };

        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains(r#""user":null"#));
        // Unsupplied optionals are physically omitted.
        assert!(!line.contains("entity"));
        assert!(!line.contains("prevHmac"));
    }

    #[test]
    fn envelope_excludes_hmac_and_prunes_optionals() {
        let event = AuditEvent {
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            user: Some(AuditUser::named("u-1", "Ada")),
            action: "createProject".to_string(),
            entity: Some("Project".to_string()),
            details: None,
            request_id: None,
            outcome: Some(Outcome::Success),
            error: None,
            key_id: Some("k1".to_string()),
            prev_hmac: None,
            hmac: "deadbeef".to_string(),
        };

        let encoded = attest_canonical::encode(
            &event.signing_envelope(),
            &attest_canonical::CanonicalOptions::default(),
        )
        .unwrap();

        assert!(!encoded.contains("deadbeef"));
        assert!(!encoded.contains("requestId"));
        assert!(encoded.contains(r#""outcome":"success""#));
        assert!(encoded.contains(r#""name":"Ada""#));
    }

    #[test]
    fn error_info_from_error_uses_short_type_name() {
        let err = std::io::Error::other("disk on fire");
        let info = ErrorInfo::from_error(&err);
        assert_eq!(info.name, "Error");
        assert!(info.message.contains("disk on fire"));
    }
}
