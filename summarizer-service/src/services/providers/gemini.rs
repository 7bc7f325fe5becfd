//! Gemini AI provider implementations.
//!
//! Two adapters share one REST client:
//! - [`GeminiFileProvider`] pushes the report through the Files API
//!   (resumable protocol) and references it by URI.
//! - [`GeminiInlineProvider`] embeds the report as base64 `inlineData`.

use super::{ProviderError, SummaryProvider, UploadedFileRef};
use crate::config::SummarizerConfig;
use crate::services::storage::StoredFile;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini REST API version segment.
const API_VERSION: &str = "v1beta";

/// Response header carrying the resumable upload session URL.
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Text part placed between the file and the prompt.
const PART_SEPARATOR: &str = "\n\n";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub request_timeout: Option<Duration>,
}

impl GeminiConfig {
    pub fn from_summarizer(config: &SummarizerConfig) -> Self {
        Self {
            api_key: config.google.api_key.clone(),
            api_base_url: config.google.api_base_url.clone(),
            model: config.model().to_string(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// REST plumbing shared by both adapters.
struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("GOOGLE_API_KEY is not set".to_string()))
    }

    fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    /// Build the API URL for the configured model and method.
    fn model_url(&self, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.base_url(),
            API_VERSION,
            self.config.model,
            method
        )
    }

    fn files_upload_url(&self) -> String {
        format!("{}/upload/{}/files", self.base_url(), API_VERSION)
    }

    /// Upload a file with the resumable protocol: open a session, then send
    /// the whole body with `upload, finalize`.
    async fn upload_file(&self, file: &StoredFile) -> Result<UploadedFileRef, ProviderError> {
        let api_key = self.api_key()?;
        let data = file.read().await?;

        tracing::debug!(
            filename = %file.original_name(),
            size = data.len(),
            "Starting Gemini file upload"
        );

        let start = self
            .client
            .post(self.files_upload_url())
            .query(&[("key", api_key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", file.mime_type())
            .json(&StartUploadRequest {
                file: FileMetadata {
                    display_name: file.original_name(),
                },
            })
            .send()
            .await
            .map_err(network_error)?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse(
                    "Gemini upload session URL missing from response".to_string(),
                )
            })?;

        let finalize = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .map_err(network_error)?;
        let finalize = check_status(finalize).await?;

        let uploaded: UploadFileResponse = finalize.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse upload response: {}", e))
        })?;

        tracing::debug!(file = ?uploaded.file.name, uri = %uploaded.file.uri, "Gemini file uploaded");

        Ok(UploadedFileRef::Remote {
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| file.mime_type().to_string()),
        })
    }

    async fn generate_content(
        &self,
        file: &UploadedFileRef,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::from(file),
                    Part::text(PART_SEPARATOR),
                    Part::text(prompt),
                ],
            }],
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.model_url("generateContent"))
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let api_response: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        api_response.into_text()
    }
}

/// Gemini provider that uploads reports through the Files API.
pub struct GeminiFileProvider {
    client: GeminiClient,
}

impl GeminiFileProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
        })
    }
}

#[async_trait]
impl SummaryProvider for GeminiFileProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.client.config.model
    }

    async fn upload(&self, file: &StoredFile) -> Result<UploadedFileRef, ProviderError> {
        self.client.upload_file(file).await
    }

    async fn generate(
        &self,
        file: &UploadedFileRef,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        self.client.generate_content(file, prompt).await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.api_key().map(|_| ())
    }
}

/// Gemini provider that sends reports inline with the generation request.
pub struct GeminiInlineProvider {
    client: GeminiClient,
}

impl GeminiInlineProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
        })
    }
}

#[async_trait]
impl SummaryProvider for GeminiInlineProvider {
    fn name(&self) -> &'static str {
        "gemini-inline"
    }

    fn model(&self) -> &str {
        &self.client.config.model
    }

    async fn upload(&self, file: &StoredFile) -> Result<UploadedFileRef, ProviderError> {
        // Fail on a missing key before reading the file.
        self.client.api_key()?;
        let data = file.read().await?;

        Ok(UploadedFileRef::Inline {
            data: STANDARD.encode(data),
            mime_type: file.mime_type().to_string(),
        })
    }

    async fn generate(
        &self,
        file: &UploadedFileRef,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        self.client.generate_content(file, prompt).await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.api_key().map(|_| ())
    }
}

fn network_error(err: reqwest::Error) -> ProviderError {
    ProviderError::NetworkError(err.to_string())
}

/// Map non-2xx responses to provider errors.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError(format!(
        "Gemini API error {}: {}",
        status,
        api_error_message(&body)
    )))
}

/// Pull `error.message` out of a Google error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StartUploadRequest<'a> {
    file: FileMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    #[serde(default)]
    name: Option<String>,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    fn text(text: &str) -> Self {
        Part::Text {
            text: text.to_string(),
        }
    }
}

impl From<&UploadedFileRef> for Part {
    fn from(file: &UploadedFileRef) -> Self {
        match file {
            UploadedFileRef::Remote { uri, mime_type } => Part::FileData {
                file_data: FileData {
                    mime_type: mime_type.clone(),
                    file_uri: uri.clone(),
                },
            },
            UploadedFileRef::Inline { data, mime_type } => Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String, ProviderError> {
        if self
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .is_some()
        {
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::InvalidResponse("Gemini returned no candidates".to_string())
        })?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ProviderError::ContentFiltered);
        }

        let texts: Vec<String> = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if texts.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Gemini returned no text".to_string(),
            ));
        }

        Ok(texts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    fn config(api_key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key: api_key.map(str::to_string),
            api_base_url: "http://localhost:1/".to_string(),
            model: "gemini-2.0-flash".to_string(),
            request_timeout: None,
        }
    }

    #[test]
    fn text_parts_of_first_candidate_are_joined() {
        let response = parse(json!({
            "candidates": [
                {
                    "content": { "role": "model", "parts": [{ "text": "Patient was " }, { "text": "treated." }] },
                    "finishReason": "STOP"
                },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }));

        assert_eq!(response.into_text().unwrap(), "Patient was treated.");
    }

    #[test]
    fn safety_stops_are_content_filtered() {
        let response = parse(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }));
        assert!(matches!(response.into_text(), Err(ProviderError::ContentFiltered)));

        let blocked = parse(json!({
            "promptFeedback": { "blockReason": "OTHER" }
        }));
        assert!(matches!(blocked.into_text(), Err(ProviderError::ContentFiltered)));
    }

    #[test]
    fn empty_responses_are_invalid() {
        assert!(matches!(
            parse(json!({})).into_text(),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse(json!({ "candidates": [{ "content": { "parts": [] } }] })).into_text(),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_parts_use_gemini_field_names() {
        let remote = UploadedFileRef::Remote {
            uri: "https://files/abc".to_string(),
            mime_type: "application/pdf".to_string(),
        };
        let inline = UploadedFileRef::Inline {
            data: "JVBERi0=".to_string(),
            mime_type: "application/pdf".to_string(),
        };

        assert_eq!(
            serde_json::to_value(Part::from(&remote)).unwrap(),
            json!({ "fileData": { "mimeType": "application/pdf", "fileUri": "https://files/abc" } })
        );
        assert_eq!(
            serde_json::to_value(Part::from(&inline)).unwrap(),
            json!({ "inlineData": { "mimeType": "application/pdf", "data": "JVBERi0=" } })
        );
        assert_eq!(
            serde_json::to_value(Part::text("hi")).unwrap(),
            json!({ "text": "hi" })
        );
    }

    #[test]
    fn api_error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid");
        assert_eq!(api_error_message("upstream exploded"), "upstream exploded");
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let client = GeminiClient::new(config(Some("k"))).unwrap();
        assert_eq!(
            client.model_url("generateContent"),
            "http://localhost:1/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(client.files_upload_url(), "http://localhost:1/upload/v1beta/files");
    }

    #[tokio::test]
    async fn missing_api_key_fails_at_call_time() {
        let provider = GeminiFileProvider::new(config(None)).unwrap();
        let err = provider.health_check().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider not configured: GOOGLE_API_KEY is not set"
        );

        let dir = tempfile::tempdir().unwrap();
        let store = crate::services::storage::UploadStore::new(dir.path());
        let stored = store.store("report.pdf", b"%PDF-1.4").await.unwrap();

        let inline = GeminiInlineProvider::new(config(Some(""))).unwrap();
        assert!(matches!(
            inline.summarize(&stored, "prompt").await,
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
