//! `POST /summarize`: upload a PDF discharge report, get a layperson summary.
//!
//! The request moves through one linear flow: read the multipart field,
//! validate it, store it in the upload directory, hand it to the provider,
//! then remove the stored file whatever the provider returned.

use crate::services::metrics::{record_provider_latency, record_summary, SummaryOutcome};
use crate::startup::AppState;
use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use std::time::{Duration, Instant};

/// Instruction sent with every report.
pub const SUMMARY_PROMPT: &str = "You are a clinical documentation assistant. \
     Summarize this patient discharge report for a layperson in 150–250 words. \
     Include: (1) primary diagnosis, (2) key treatments/procedures, \
     (3) current condition, (4) medications at discharge, (5) follow-up plan & red flags.";

/// Multipart field carrying the report.
pub const FILE_FIELD: &str = "file";

const PDF_EXTENSION: &str = ".pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

const NO_FILE_MESSAGE: &str = "No file uploaded";
const ONLY_PDF_MESSAGE: &str = "Only PDF files allowed";
const TOO_LARGE_MESSAGE: &str = "File too large";

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

struct Upload {
    file_name: String,
    data: Bytes,
}

pub async fn summarize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SummaryResponse>, AppError> {
    let upload = match accept_upload(multipart, state.config.upload.require_pdf_magic).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::info!(error = %e, "Upload rejected");
            record_summary(SummaryOutcome::Rejected);
            return Err(e);
        }
    };

    let stored = state
        .uploads
        .store(&upload.file_name, &upload.data)
        .await
        .map_err(|e| {
            tracing::error!(
                filename = %upload.file_name,
                dir = %state.uploads.dir().display(),
                error = %e,
                "Failed to store upload"
            );
            record_summary(SummaryOutcome::StorageError);
            AppError::Upstream(e.to_string())
        })?;
    drop(upload);

    tracing::info!(
        filename = %stored.original_name(),
        size = stored.size(),
        provider = state.provider.name(),
        model = state.provider.model(),
        "Summarizing discharge report"
    );

    let started = Instant::now();
    let result = state.provider.summarize(&stored, SUMMARY_PROMPT).await;
    let elapsed = started.elapsed();
    record_provider_latency(state.provider.name(), elapsed);

    // Cleanup problems are logged, never returned in place of the summary.
    let stored_path = stored.path().to_path_buf();
    if let Err(e) = stored.remove() {
        tracing::warn!(path = %stored_path.display(), error = %e, "Failed to remove stored upload");
    }

    match result {
        Ok(summary) => {
            tracing::info!(
                elapsed_ms = millis(elapsed),
                summary_len = summary.len(),
                "Summary generated"
            );
            record_summary(SummaryOutcome::Success);
            Ok(Json(SummaryResponse { summary }))
        }
        Err(e) => {
            tracing::error!(
                elapsed_ms = millis(elapsed),
                provider = state.provider.name(),
                error = %e,
                "Provider call failed"
            );
            record_summary(SummaryOutcome::ProviderError);
            Err(AppError::Upstream(e.to_string()))
        }
    }
}

/// Read the `file` field and check it is acceptable as a PDF.
async fn accept_upload(
    multipart: Result<Multipart, MultipartRejection>,
    require_pdf_magic: bool,
) -> Result<Upload, AppError> {
    let upload = read_upload(multipart).await?;

    if !is_pdf_filename(&upload.file_name)
        || (require_pdf_magic && !upload.data.starts_with(PDF_MAGIC))
    {
        return Err(AppError::BadRequest(anyhow!(ONLY_PDF_MESSAGE)));
    }

    Ok(upload)
}

async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, AppError> {
    // A body that is not multipart carries no file.
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Request body is not multipart");
        AppError::BadRequest(anyhow!(NO_FILE_MESSAGE))
    })?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a filename is a plain form value, not an upload.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload { file_name, data });
    }

    Err(AppError::BadRequest(anyhow!(NO_FILE_MESSAGE)))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(anyhow!(TOO_LARGE_MESSAGE))
    } else {
        AppError::BadRequest(anyhow!("Failed to read multipart body: {}", err.body_text()))
    }
}

/// Whole milliseconds for log fields, saturating instead of truncating.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Case-sensitive `.pdf` suffix check.
pub fn is_pdf_filename(name: &str) -> bool {
    name.ends_with(PDF_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lowercase_pdf_suffix_is_accepted() {
        assert!(is_pdf_filename("discharge_123.pdf"));
        assert!(is_pdf_filename("archive.tar.pdf"));
        assert!(!is_pdf_filename("report.docx"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("scan.PDF"));
        assert!(!is_pdf_filename("report.pdf.exe"));
        assert!(!is_pdf_filename(""));
    }

    #[test]
    fn millis_saturates_on_huge_durations() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn prompt_asks_for_every_section() {
        assert!(SUMMARY_PROMPT.starts_with("You are a clinical documentation assistant. Summarize"));
        assert!(SUMMARY_PROMPT.contains("150–250 words"));
        for section in [
            "(1) primary diagnosis",
            "(2) key treatments/procedures",
            "(3) current condition",
            "(4) medications at discharge",
            "(5) follow-up plan & red flags",
        ] {
            assert!(SUMMARY_PROMPT.contains(section), "missing {section}");
        }
        assert!(!SUMMARY_PROMPT.contains("  "));
    }
}
