//! Offline verification of persisted audit logs.
//!
//! Each line is parsed independently, its signature recomputed over the
//! canonical envelope, and its chain link compared against the preceding
//! event. Nothing here throws on tampering; findings are counted and the
//! caller maps them to an outcome.

use std::path::Path;

use attest_canonical::{CanonicalOptions, encode};

use crate::error::AuditResult;
use crate::event::AuditEvent;
use crate::signature::{SigningKey, compute_hmac, hmac_equal};

/// Aggregate verification findings over one log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Lines that parsed as events.
    pub events: usize,
    /// Events whose recomputed signature matched the stored one.
    pub hmac_ok: usize,
    /// Events whose signature did not match (or could not be parsed).
    pub hmac_bad: usize,
    /// Events whose `prevHmac` did not match the preceding signature.
    pub chain_breaks: usize,
}

impl VerifyReport {
    /// Collapse the counts into a terminal outcome. Signature failures
    /// take precedence over chain breaks.
    #[must_use]
    pub fn outcome(&self) -> VerifyOutcome {
        if self.hmac_bad > 0 {
            VerifyOutcome::SignatureMismatch
        } else if self.chain_breaks > 0 {
            VerifyOutcome::ChainBroken
        } else {
            VerifyOutcome::Valid
        }
    }
}

/// Terminal verification states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Every signature and chain link checked out.
    Valid,
    /// At least one signature mismatch was found.
    SignatureMismatch,
    /// Signatures were fine but at least one chain link was broken.
    ChainBroken,
}

/// Verify a sequence of persisted event lines.
///
/// Empty lines are skipped. A line that does not parse as an event counts
/// as a signature failure, since its signature cannot be checked. A
/// `prevHmac` with no predecessor counts as a chain break; an absent
/// `prevHmac` starts a fresh lineage.
///
/// # Errors
///
/// Returns an error only on canonical-encoding failure, which cannot occur
/// for values parsed from JSON; tampering is reported through the counts.
pub fn verify_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    key: &SigningKey,
) -> AuditResult<VerifyReport> {
    let mut report = VerifyReport::default();
    let mut prev_hmac: Option<String> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        report.events = report.events.saturating_add(1);

        let Ok(event) = serde_json::from_str::<AuditEvent>(line) else {
            report.hmac_bad = report.hmac_bad.saturating_add(1);
            prev_hmac = None;
            continue;
        };

        let canonical = encode(&event.signing_envelope(), &CanonicalOptions::default())?;
        let expected = compute_hmac(key, &canonical);
        if hmac_equal(&expected, &event.hmac) {
            report.hmac_ok = report.hmac_ok.saturating_add(1);
        } else {
            report.hmac_bad = report.hmac_bad.saturating_add(1);
        }

        if let Some(link) = &event.prev_hmac
            && prev_hmac.as_deref() != Some(link.as_str())
        {
            report.chain_breaks = report.chain_breaks.saturating_add(1);
        }
        prev_hmac = Some(event.hmac);
    }

    Ok(report)
}

/// Verify a persisted log file. A missing file verifies as empty.
///
/// # Errors
///
/// See [`verify_lines`].
pub async fn verify_file(path: impl AsRef<Path>, key: &SigningKey) -> AuditResult<VerifyReport> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await.unwrap_or_default();
    verify_lines(raw.lines(), key)
}
