//! Ordered model fallback.
//!
//! A [`ModelChain`] tries each configured model in priority order and hands
//! back the first stream a backend accepts. Failures that are specific to one
//! model (rate limit, 5xx, network) advance the chain; anything else stops it.

use serde::Serialize;

use crate::backend::{LlmBackend, ResponseStream};
use crate::error::{LlmError, Result};
use crate::types::CompletionRequest;

/// One model's failure inside a chain attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFailure {
    pub model: String,
    pub error: String,
}

impl ModelFailure {
    pub fn new(model: impl Into<String>, error: &LlmError) -> Self {
        Self {
            model: model.into(),
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.model, self.error)
    }
}

/// An ordered list of model identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    models: Vec<String>,
}

impl ModelChain {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Open a stream with the first model that accepts the request.
    ///
    /// Returns the model that succeeded alongside its stream. The request's
    /// own `model` field is ignored.
    pub async fn stream(
        &self,
        backend: &dyn LlmBackend,
        request: &CompletionRequest,
    ) -> Result<(String, ResponseStream)> {
        if self.models.is_empty() {
            return Err(LlmError::Config("Model list is empty".to_string()));
        }

        let mut failures = Vec::new();
        for (attempt, model) in self.models.iter().enumerate() {
            match backend.complete_stream(request.for_model(model)).await {
                Ok(stream) => {
                    if attempt > 0 {
                        tracing::info!(
                            backend = backend.name(),
                            model = %model,
                            attempt = attempt + 1,
                            "Fallback model accepted request"
                        );
                    }
                    return Ok((model.clone(), stream));
                }
                Err(e) if e.is_fallback_eligible() => {
                    tracing::warn!(
                        backend = backend.name(),
                        model = %model,
                        error = %e,
                        retry_after_ms = e.retry_after().map(|d| d.as_millis() as u64),
                        "Model failed, trying next"
                    );
                    failures.push(ModelFailure::new(model, &e));
                }
                Err(e) => {
                    tracing::error!(
                        backend = backend.name(),
                        model = %model,
                        error = %e,
                        "Model failed with non-recoverable error"
                    );
                    return Err(e);
                }
            }
        }

        Err(LlmError::AllModelsFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockOutcome, collect_text};
    use crate::types::Message;

    fn chain() -> ModelChain {
        ModelChain::new(["primary", "secondary", "tertiary"])
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("ignored", vec![Message::user("summarize")], 120)
    }

    #[tokio::test]
    async fn test_first_model_success_stops_chain() {
        let backend = MockBackend::with_text("Moody indie evening.");

        let (model, stream) = chain().stream(&backend, &request()).await.unwrap();
        assert_eq!(model, "primary");
        assert_eq!(collect_text(stream).await.unwrap(), "Moody indie evening.");
        assert_eq!(backend.models_called(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_falls_back_in_priority_order() {
        let backend = MockBackend::with_text("ok")
            .with_outcome("primary", MockOutcome::RateLimit)
            .with_outcome("secondary", MockOutcome::ServerError(502));

        let (model, _) = chain().stream(&backend, &request()).await.unwrap();
        assert_eq!(model, "tertiary");
        assert_eq!(
            backend.models_called(),
            vec!["primary", "secondary", "tertiary"]
        );
    }

    #[tokio::test]
    async fn test_network_error_advances() {
        let backend = MockBackend::with_text("ok").with_outcome("primary", MockOutcome::Network);

        let (model, _) = chain().stream(&backend, &request()).await.unwrap();
        assert_eq!(model, "secondary");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_error_stops_immediately() {
        let backend = MockBackend::with_text("ok").with_outcome("primary", MockOutcome::Auth);

        let err = chain().stream(&backend, &request()).await.err().unwrap();
        assert!(matches!(err, LlmError::Auth(_)));
        assert_eq!(backend.models_called(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_all_models_failed() {
        let backend = MockBackend::with_text("ok")
            .with_outcome("primary", MockOutcome::RateLimit)
            .with_outcome("secondary", MockOutcome::RateLimit)
            .with_outcome("tertiary", MockOutcome::ServerError(500));

        let err = chain().stream(&backend, &request()).await.err().unwrap();
        match err {
            LlmError::AllModelsFailed(failures) => {
                let models: Vec<_> = failures.iter().map(|f| f.model.as_str()).collect();
                assert_eq!(models, vec!["primary", "secondary", "tertiary"]);
                assert!(failures[2].error.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_config_error() {
        let backend = MockBackend::with_text("ok");
        let err = ModelChain::new(Vec::<String>::new())
            .stream(&backend, &request())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::Config(_)));
        assert_eq!(backend.request_count(), 0);
    }

    #[test]
    fn test_model_failure_serializes() {
        let failure = ModelFailure::new("m", &LlmError::rate_limit("slow"));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["error"], "Rate limit exceeded: slow");
    }
}
