//! Generation backend contract.
//!
//! The pipeline talks to language models only through [`GenerationBackend`].
//! Backends do not retry; a failed call surfaces as a [`GenerationError`]
//! and the caller decides what to do about it.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::GenerationParams;
use crate::error::GenerationError;

/// Answer fragments in production order. Consumer-paced: a backend should
/// not read ahead of what has been polled.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Produce the complete answer for `prompt` in one call.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;

    /// Start an incremental answer for `prompt`.
    ///
    /// Errors that happen before the first fragment (bad credential,
    /// connection refused) are returned here; later ones arrive in the
    /// stream.
    async fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError>;

    /// Single round-trip probe. `Ok(false)` means the backend answered but
    /// rejected the request.
    async fn test_connection(&self, params: &GenerationParams) -> Result<bool, GenerationError>;
}
