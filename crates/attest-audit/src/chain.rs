//! Chain-seed helper.

use std::path::Path;

/// Read the signature of the last event persisted in a log file.
///
/// Used to seed [`AuditClientBuilder::seed_prev_hmac`](crate::AuditClientBuilder::seed_prev_hmac)
/// so a restarted process continues the existing lineage instead of
/// starting a fresh one. Returns `None` for a missing, empty or
/// unparseable file; seeding is best-effort by design.
pub async fn last_hmac_from_file(path: impl AsRef<Path>) -> Option<String> {
    let raw = match tokio::fs::read_to_string(path.as_ref()).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(path = %path.as_ref().display(), "no chain seed: {err}");
            return None;
        },
    };

    let last = raw.lines().filter(|line| !line.trim().is_empty()).next_back()?;
    let event: serde_json::Value = serde_json::from_str(last).ok()?;
    event.get("hmac")?.as_str().map(str::to_string)
}
