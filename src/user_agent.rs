//! Shared User-Agent string for every outbound HTTP client.

/// Default User-Agent for scheduler, storage API and node requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("carfile-backup/{version}")
}
