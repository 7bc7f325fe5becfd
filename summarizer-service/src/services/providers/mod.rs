//! Summarization provider abstractions and implementations.
//!
//! A provider turns a stored report plus an instruction prompt into text in
//! two steps: make the file available to the model, then generate. The
//! concrete backend is picked once at startup by [`build_provider`].

pub mod gemini;
pub mod mock;

use crate::config::{ProviderKind, SummarizerConfig};
use crate::services::storage::StoredFile;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a report the model can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadedFileRef {
    /// File hosted by the provider, e.g. a Gemini Files API URI.
    Remote { uri: String, mime_type: String },
    /// Base64 payload sent along with the generation request.
    Inline { data: String, mime_type: String },
}

/// Trait for document summarization providers (e.g., Gemini).
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Short label for logs and metrics.
    fn name(&self) -> &'static str;

    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Make the stored file available to the model.
    async fn upload(&self, file: &StoredFile) -> Result<UploadedFileRef, ProviderError>;

    /// Generate text for the uploaded file and prompt.
    async fn generate(&self, file: &UploadedFileRef, prompt: &str)
        -> Result<String, ProviderError>;

    /// Upload then generate. The result is trimmed.
    async fn summarize(&self, file: &StoredFile, prompt: &str) -> Result<String, ProviderError> {
        let uploaded = self.upload(file).await?;
        let text = self.generate(&uploaded, prompt).await?;
        Ok(text.trim().to_string())
    }

    /// Whether the provider is able to serve requests.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Construct the provider selected by configuration.
pub fn build_provider(config: &SummarizerConfig) -> Result<Arc<dyn SummaryProvider>, ProviderError> {
    let provider: Arc<dyn SummaryProvider> = match config.provider.kind {
        ProviderKind::Gemini => Arc::new(gemini::GeminiFileProvider::new(
            gemini::GeminiConfig::from_summarizer(config),
        )?),
        ProviderKind::GeminiInline => Arc::new(gemini::GeminiInlineProvider::new(
            gemini::GeminiConfig::from_summarizer(config),
        )?),
        ProviderKind::Mock => Arc::new(mock::MockProvider::echo()),
    };

    Ok(provider)
}
