//! Mock provider implementation for testing and credential-free local runs.

use super::{ProviderError, SummaryProvider, UploadedFileRef};
use crate::services::storage::StoredFile;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

type ErrorFactory = Box<dyn Fn() -> ProviderError + Send + Sync>;

enum Outcome {
    /// Return this text from every generation.
    Text(String),
    /// Return a summary naming the uploaded file.
    Echo,
    /// Fail generation with a fresh error each time.
    Fail(ErrorFactory),
}

/// What the mock saw when a file was uploaded to it.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
    /// Whether the file was on disk while the provider held it.
    pub existed: bool,
}

/// Mock summary provider.
pub struct MockProvider {
    outcome: Outcome,
    ready: bool,
    uploads: Mutex<Vec<RecordedUpload>>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            ready: true,
            uploads: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always generate `text`, verbatim.
    pub fn returning(text: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Text(text.into()))
    }

    /// Generate a canned summary that names the uploaded file.
    pub fn echo() -> Self {
        Self::with_outcome(Outcome::Echo)
    }

    /// Fail every generation with the error built by `make_error`.
    pub fn failing<F>(make_error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        Self::with_outcome(Outcome::Fail(Box::new(make_error)))
    }

    /// Report the provider as not ready on health checks.
    pub fn unavailable(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SummaryProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn upload(&self, file: &StoredFile) -> Result<UploadedFileRef, ProviderError> {
        let record = RecordedUpload {
            path: file.path().to_path_buf(),
            original_name: file.original_name().to_string(),
            size: file.size(),
            existed: tokio::fs::try_exists(file.path()).await.unwrap_or(false),
        };

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(record);
        }

        Ok(UploadedFileRef::Remote {
            uri: format!("mock://files/{}", file.original_name()),
            mime_type: file.mime_type().to_string(),
        })
    }

    async fn generate(
        &self,
        file: &UploadedFileRef,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.outcome {
            Outcome::Text(text) => Ok(text.clone()),
            Outcome::Echo => {
                let source = match file {
                    UploadedFileRef::Remote { uri, .. } => uri.as_str(),
                    UploadedFileRef::Inline { .. } => "inline data",
                };
                Ok(format!("Mock summary for {}", source))
            }
            Outcome::Fail(make_error) => Err(make_error()),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.ready {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "mock provider is unavailable".to_string(),
            ))
        }
    }
}
