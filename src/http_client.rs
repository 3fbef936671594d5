//! Shared HTTP client construction for control-plane traffic.
//!
//! The storage API and the schedulers get the same timeouts and User-Agent.
//! Source node transfers use their own client (see [`crate::download`]).

use std::time::Duration;

use reqwest::Client;

use crate::user_agent;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Builds a client for storage API and scheduler calls.
///
/// # Errors
///
/// Returns the builder error if the TLS backend cannot be initialised.
pub(crate) fn build_api_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(user_agent::default_user_agent())
        .build()
}
