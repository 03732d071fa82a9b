use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use pubagent_core::traits::{GenerationRequest, GenerationResponse, Generator};
use pubagent_core::{Error, Result};

/// Retries transient failures of the wrapped generator with exponential backoff.
///
/// With an attempt timeout set, each call to the inner generator is bounded on
/// its own and a timed-out attempt counts as a transient failure.
pub struct RetryingGenerator<G> {
    inner: G,
    max_retries: u32,
    base_delay: Duration,
    attempt_timeout: Option<Duration>,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, max_retries: u32) -> Self {
        Self { inner, max_retries, base_delay: Duration::from_millis(500), attempt_timeout: None }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = Some(limit);
        self
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.generate(request))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.inner.generate(request).await,
        }
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(request).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying generation"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
