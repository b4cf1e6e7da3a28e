//! Failure-reason extraction shared by wait-capable actions.

/// One entry from a remote system's event or audit trail.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub status: String,
    pub reason: Option<String>,
}

/// Only the most recent failure reasons are relevant for troubleshooting;
/// older ones tend to be knock-on effects.
const MAX_REASONS: usize = 3;

const FAILURE_SUFFIX: &str = "FAILED";

/// Build a diagnostic string from a resource's event trail.
///
/// Events are expected in reverse chronological order. Reasons from events
/// whose status ends with `FAILED` are concatenated most-recent-first, at
/// most three of them. Returns an empty string when nothing failed.
pub fn failure_reason(events: impl IntoIterator<Item = ResourceEvent>) -> String {
    events
        .into_iter()
        .filter(|event| event.status.ends_with(FAILURE_SUFFIX))
        .filter_map(|event| event.reason)
        .take(MAX_REASONS)
        .collect()
}
