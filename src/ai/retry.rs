//! Retry wrapper around any [`ChatProvider`].
//!
//! Transient failures (HTTP 429, 5xx) are retried with exponential backoff
//! up to a configured maximum.  Non-transient errors surface immediately.
//! Backoff sleeps are cancel-safe: dropping the future (run-context
//! deadline) abandons the retry loop.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::provider::{ChatProvider, ProviderResult};
use super::types::{CompletionRequest, CompletionResponse};

pub struct RetryingProvider {
    inner: Arc<dyn ChatProvider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ChatProvider>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl ChatProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient provider error, backing off: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
