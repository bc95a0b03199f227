//! The seam between the batch pipeline and an image generation backend.
//!
//! Adapters translate a [`ParameterCombination`] into a provider request and
//! return the URL of the produced image. Request shapes, uploads and polling
//! of the backend are the adapter's business.

use std::time::Duration;

use async_trait::async_trait;
use xyplot_core::axis::ParameterCombination;
use xyplot_core::error::CoreError;

/// Errors raised by a [`ProviderAdapter`].
///
/// The `Display` text is stored verbatim as the generation's
/// `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Pre-flight check failed: {0}")]
    Preflight(String),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Provider returned no image")]
    EmptyResult,
}

impl From<CoreError> for ProviderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ProviderError::Preflight(msg),
            other => ProviderError::Preflight(other.to_string()),
        }
    }
}

/// An image generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Cheap local validation of a job, run before it is marked running.
    ///
    /// Use the helpers in [`xyplot_core::generation`] (`require_images`,
    /// `require_prompt`) and convert with `?`.
    fn preflight(&self, _job: &ParameterCombination) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Produce one image and return its URL.
    async fn generate(&self, job: &ParameterCombination) -> Result<String, ProviderError>;
}
