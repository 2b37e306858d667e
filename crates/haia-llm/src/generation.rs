//! Text-generation provider boundary.
//!
//! This module defines the [`TextGenerator`] trait used by memory
//! extraction, relationship inference, and cluster-label summarization.
//! The memory core only ever needs "prompt in, text out" with a model
//! identifier; chat transports and streaming live outside this boundary.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result, is_retryable};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures). Non-retryable
/// errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation Request
// ─────────────────────────────────────────────────────────────────────────────

/// A single text-generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier (provider-specific).
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    /// Create a request with default sampling parameters.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TextGenerator Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for text-generation providers.
///
/// Implementations connect to an actual LLM service (OpenAI-compatible
/// APIs, local inference servers) or return scripted output for tests.
/// All failures surface as a single [`LlmError`] condition; callers in
/// the memory core decide whether that degrades gracefully.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    /// Get the name of this generator.
    fn name(&self) -> &str;
}

/// A generator that can be shared across threads.
pub type SharedGenerator = Arc<dyn TextGenerator>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Generator
// ─────────────────────────────────────────────────────────────────────────────

/// A mock generator for testing purposes.
///
/// Returns pre-configured responses in order, useful for deterministic
/// testing of extraction parsing and degradation paths without a
/// provider.
#[derive(Debug)]
pub struct MockGenerator {
    responses: std::sync::Mutex<Vec<Result<String>>>,
    request_log: std::sync::Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Create a mock generator with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            request_log: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock generator with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// Create a mock generator that always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            responses: std::sync::Mutex::new(vec![Err(LlmError::Backend(message))]),
            request_log: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all requests that were made to this generator.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.request_log.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Backend(
                "MockGenerator: no more responses available".to_string(),
            ));
        }
        responses.remove(0)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_ordered_responses() {
        let generator = MockGenerator::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);

        let r1 = generator
            .generate(GenerationRequest::new("m", "one"))
            .await
            .unwrap();
        let r2 = generator
            .generate(GenerationRequest::new("m", "two"))
            .await
            .unwrap();

        assert_eq!(r1, "first");
        assert_eq!(r2, "second");
        assert_eq!(generator.request_count(), 2);
        assert_eq!(generator.requests()[1].prompt, "two");
    }

    #[tokio::test]
    async fn test_mock_generator_exhausted() {
        let generator = MockGenerator::new(vec![]);
        let result = generator.generate(GenerationRequest::new("m", "hi")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_generator_failing() {
        let generator = MockGenerator::failing("provider down");
        let result = generator.generate(GenerationRequest::new("m", "hi")).await;
        assert!(matches!(result, Err(LlmError::Backend(_))));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_failure() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_retry(3, Duration::from_millis(1), "test", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    Err(LlmError::Network("flaky".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_non_retryable() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_retry(3, Duration::from_millis(1), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(LlmError::Config("bad".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_attempts() {
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || async {
            Err(LlmError::Network("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(LlmError::Network(_))));
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("small-model", "summarize this")
            .with_system("You label clusters.")
            .with_max_tokens(64)
            .with_temperature(0.2);

        assert_eq!(request.model, "small-model");
        assert_eq!(request.max_tokens, 64);
        assert!((request.temperature - 0.2).abs() < 0.001);
        assert!(request.system.is_some());
    }
}
