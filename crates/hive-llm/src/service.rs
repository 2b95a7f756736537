use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_types::{HiveError, Result};

use crate::{FinishReason, LlmClient, Request};

/// Text-in, text-out contract the pipeline core depends on.
///
/// Implementations may fail with a transport error, time out, or return text
/// that is not the requested shape. Callers treat all three the same way.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<String>;
}

#[async_trait]
impl<T: GenerativeService + ?Sized> GenerativeService for Arc<T> {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        (**self).complete(prompt, max_output_tokens, timeout).await
    }
}

#[async_trait]
impl GenerativeService for LlmClient {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        let request = Request::prompt(self.model(), self.system_prompt(), prompt)
            .with_max_tokens(max_output_tokens);

        let response = tokio::time::timeout(timeout, LlmClient::complete(self, &request))
            .await
            .map_err(|_| HiveError::RequestTimeout {
                provider: self.provider_name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        if response.finish_reason == FinishReason::MaxTokens {
            tracing::warn!(
                model = %response.model,
                max_output_tokens,
                output_tokens = response.usage.output_tokens,
                "response hit the output token limit and is likely truncated"
            );
        }

        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderAdapter, Response, Usage};

    struct SlowProvider {
        delay: Duration,
        finish_reason: FinishReason,
    }

    #[async_trait]
    impl ProviderAdapter for SlowProvider {
        async fn complete(&self, request: &Request) -> Result<Response> {
            tokio::time::sleep(self.delay).await;
            Ok(Response {
                id: "r".into(),
                text: format!("max_tokens={:?}", request.max_tokens),
                usage: Usage::default(),
                model: request.model.clone(),
                finish_reason: self.finish_reason,
            })
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn default_model(&self) -> &str {
            "slow-model"
        }
    }

    #[tokio::test]
    async fn passes_output_budget_through() {
        let client = LlmClient::new(SlowProvider {
            delay: Duration::ZERO,
            finish_reason: FinishReason::EndTurn,
        });
        let text = GenerativeService::complete(&client, "p", 1234, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "max_tokens=Some(1234)");
    }

    #[tokio::test]
    async fn timeout_maps_to_request_timeout() {
        let client = LlmClient::new(SlowProvider {
            delay: Duration::from_millis(200),
            finish_reason: FinishReason::EndTurn,
        });
        let err = GenerativeService::complete(&client, "p", 10, Duration::from_millis(10))
            .await
            .unwrap_err();
        match err {
            HiveError::RequestTimeout {
                provider,
                timeout_ms,
            } => {
                assert_eq!(provider, "slow");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected RequestTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_response_is_still_returned() {
        let client = LlmClient::new(SlowProvider {
            delay: Duration::ZERO,
            finish_reason: FinishReason::MaxTokens,
        });
        let text = GenerativeService::complete(&client, "p", 5, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(text.starts_with("max_tokens="));
    }

    #[tokio::test]
    async fn arc_delegates() {
        let service: Arc<dyn GenerativeService> = Arc::new(LlmClient::new(SlowProvider {
            delay: Duration::ZERO,
            finish_reason: FinishReason::EndTurn,
        }));
        let text = service.complete("p", 7, Duration::from_secs(1)).await.unwrap();
        assert_eq!(text, "max_tokens=Some(7)");
    }
}
