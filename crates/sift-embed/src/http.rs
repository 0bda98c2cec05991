//! Shared HTTP client construction for remote embedding backends.

use std::time::Duration;

/// Create the HTTP client used by remote embedders.
///
/// Config: 10s connect timeout, 30s request timeout, rustls TLS,
/// `sift/{version}` user-agent, redirect limit 5.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("default HTTP client construction must not fail")
}
