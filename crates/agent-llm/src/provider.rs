//! LLM provider trait definition

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::{CompletionRequest, CompletionResponse, Result};

/// Trait for LLM providers
///
/// Implementations translate the neutral request into a vendor's wire format
/// and back. No vendor is bundled with this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Generate a completion, sending text to `chunks` as it is produced
    ///
    /// The default sends the whole text once the completion is done.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        chunks: UnboundedSender<String>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(request).await?;
        let text = response.message.text();
        if !text.is_empty() {
            // Receiver gone means nobody is listening any more
            let _ = chunks.send(text);
        }
        Ok(response)
    }

    /// Provider name (e.g. "anthropic", "openai")
    fn name(&self) -> &str;
}
