use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default upload body limit (20MB).
const DEFAULT_UPLOAD_MAX_BYTES: usize = 20 * 1024 * 1024;

const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub provider: ProviderConfig,
    pub google: GoogleConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model override; each provider kind has its own default.
    pub model: Option<String>,
    /// Client-side timeout for provider calls. `None` keeps the HTTP client default.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// Missing keys are reported when the provider is called, not at startup.
    pub api_key: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_bytes: usize,
    /// Reject uploads that do not start with the `%PDF-` signature.
    pub require_pdf_magic: bool,
}

/// Which summarization backend to wire in at startup.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Gemini Files API upload followed by `generateContent`.
    Gemini,
    /// Gemini `generateContent` with the PDF sent as inline base64 data.
    GeminiInline,
    /// Canned responses, no network.
    Mock,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::GeminiInline => "gemini-1.5-flash",
            ProviderKind::Mock => "mock",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "gemini-inline" | "gemini_inline" => Ok(ProviderKind::GeminiInline),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(format!("Invalid summarizer provider: {}", s)),
        }
    }
}

impl SummarizerConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;
        Self::from_lookup(common_config, |key| env::var(key).ok())
    }

    /// Build the service config from a key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_prod = lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string()) == "prod";
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);

        let kind: ProviderKind = get("SUMMARIZER_PROVIDER", Some("gemini"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Ok(SummarizerConfig {
            common,
            provider: ProviderConfig {
                kind,
                model: lookup("GENAI_SUMMARY_MODEL").filter(|m| !m.is_empty()),
                request_timeout_secs: lookup("GOOGLE_REQUEST_TIMEOUT_SECS")
                    .map(|v| parse_value("GOOGLE_REQUEST_TIMEOUT_SECS", &v))
                    .transpose()?,
            },
            google: GoogleConfig {
                api_key: lookup("GOOGLE_API_KEY").filter(|k| !k.is_empty()),
                api_base_url: get("GOOGLE_API_BASE_URL", Some(DEFAULT_GOOGLE_API_BASE_URL))?,
            },
            upload: UploadConfig {
                dir: get("UPLOAD_DIR", Some("uploads"))?,
                max_bytes: parse_value(
                    "UPLOAD_MAX_BYTES",
                    &get("UPLOAD_MAX_BYTES", Some(&DEFAULT_UPLOAD_MAX_BYTES.to_string()))?,
                )?,
                require_pdf_magic: parse_value(
                    "UPLOAD_REQUIRE_PDF_MAGIC",
                    &get("UPLOAD_REQUIRE_PDF_MAGIC", Some("false"))?,
                )?,
            },
        })
    }

    /// Model id the configured provider will call.
    pub fn model(&self) -> &str {
        self.provider
            .model
            .as_deref()
            .unwrap_or_else(|| self.provider.kind.default_model())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.provider.request_timeout_secs.map(Duration::from_secs)
    }
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
