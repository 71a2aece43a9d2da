//! Text-generation boundary.
//!
//! The engine never talks to a vendor API directly; it calls a
//! `GenerationService`. Production wiring composes concrete providers into a
//! `FallbackGenerator` with an explicit ordering; tests use the scripted
//! generator from [`crate::testing`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from generation calls.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("provider '{provider}' timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("all {attempted} configured providers failed")]
    AllProvidersFailed {
        attempted: usize,
        /// The failure from the last provider tried, when any were.
        #[source]
        last: Option<Box<GenerationError>>,
    },
}

/// Knobs passed through to whichever provider handles the call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    /// Bound on one provider round-trip; on expiry the next provider is tried.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::narrative()
    }
}

impl GenerationConfig {
    /// Config for narrative turns.
    pub fn narrative() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }

    /// Config for summary compaction (shorter output).
    pub fn summary() -> Self {
        Self {
            max_tokens: 1000,
            ..Self::narrative()
        }
    }
}

/// Abstract text-generation capability: submit a prompt, get back text.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;

    /// Identifier used in logs and fallback diagnostics.
    fn provider_id(&self) -> &str;
}

/// Tries an explicit, ordered list of providers one at a time.
///
/// There is no parallel racing: the second provider is consulted only after
/// the first fails or times out. Provider ordering is owned by whoever
/// constructs this value, never ambient configuration.
pub struct FallbackGenerator {
    providers: Vec<Arc<dyn GenerationService>>,
}

impl FallbackGenerator {
    pub fn new(providers: Vec<Arc<dyn GenerationService>>) -> Self {
        Self { providers }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl GenerationService for FallbackGenerator {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let mut last = None;
        for provider in &self.providers {
            let attempt = tokio::time::timeout(config.timeout, provider.generate(prompt, config));
            match attempt.await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    tracing::warn!(
                        provider = provider.provider_id(),
                        error = %e,
                        "provider failed, trying next"
                    );
                    last = Some(e);
                }
                Err(_) => {
                    let e = GenerationError::Timeout {
                        provider: provider.provider_id().to_string(),
                        timeout: config.timeout,
                    };
                    tracing::warn!(
                        provider = provider.provider_id(),
                        timeout_ms = config.timeout.as_millis() as u64,
                        "provider timed out, trying next"
                    );
                    last = Some(e);
                }
            }
        }
        Err(GenerationError::AllProvidersFailed {
            attempted: self.providers.len(),
            last: last.map(Box::new),
        })
    }

    fn provider_id(&self) -> &str {
        "fallback"
    }
}
