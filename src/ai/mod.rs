//! AI provider boundary
//!
//! The session hands a screenshot plus optional user text to an [`AiClient`]
//! and gets back reply text or an [`AiError`]. Clients never retry; a failed
//! request becomes an error record and the user decides whether to try again.

pub mod anthropic;
pub mod prompt;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::capture::Screenshot;
use crate::error::AiError;
use crate::session::RequestId;

pub use anthropic::AnthropicClient;

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub request_id: RequestId,
    pub screenshot: Arc<Screenshot>,
    pub prompt: Option<String>,
}

#[async_trait]
pub trait AiClient: Send + Sync {
    /// Ask about `request.screenshot`.
    ///
    /// Implementations must return [`AiError::Cancelled`] promptly once
    /// `cancel` fires, and must check it before issuing anything.
    async fn ask(&self, request: AskRequest, cancel: CancellationToken) -> Result<String, AiError>;
}
