//! Constants for the download module (timeouts).

/// Default connect timeout for source nodes (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-transfer timeout for one archive (30 minutes).
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 30 * 60;
