//! Rate limiting for external API calls
//!
//! Provides a rate-limited HTTP client so lookups never overwhelm the
//! metadata provider, no matter how many new files a sweep finds.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response};
use tracing::debug;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    /// Create a new rate-limited client whose requests give up after `timeout`
    pub fn new(name: &str, config: RateLimitConfig, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        })
    }

    /// Create a client for TMDB API
    pub fn for_tmdb(timeout: Duration) -> Result<Self> {
        // TMDB allows ~40 requests per 10 seconds, so ~4/sec with burst of 10
        Self::new(
            "tmdb",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 10,
            },
            timeout,
        )
    }

    /// Wait for rate limit and make a GET request with query parameters
    pub async fn get_with_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request with query");

        self.client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_within_burst_are_immediate() {
        let client = RateLimitedClient::new(
            "test",
            RateLimitConfig {
                requests_per_second: 1,
                burst_size: 3,
            },
            Duration::from_secs(1),
        )
        .unwrap();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            client.wait_for_permit().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
