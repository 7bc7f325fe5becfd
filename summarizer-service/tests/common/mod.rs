#![allow(dead_code)]

use reqwest::multipart;
use service_core::config::Config as CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;
use summarizer_service::config::SummarizerConfig;
use summarizer_service::services::providers::mock::MockProvider;
use summarizer_service::services::SummaryProvider;
use summarizer_service::startup::Application;
use uuid::Uuid;

/// Smallest byte string that passes the `%PDF-` signature check.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(provider: Arc<MockProvider>) -> Self {
        Self::spawn_with(provider, |_| {}).await
    }

    /// Spawn with a config tweak applied before the app is built.
    pub async fn spawn_with<F>(provider: Arc<MockProvider>, configure: F) -> Self
    where
        F: FnOnce(&mut SummarizerConfig),
    {
        let mut config = test_config();
        configure(&mut config);

        let app = Application::build_with_provider(config, provider as Arc<dyn SummaryProvider>)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let upload_dir = app.upload_dir().to_path_buf();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            upload_dir,
            client,
        }
    }

    pub async fn post_form(&self, form: multipart::Form) -> reqwest::Response {
        self.client
            .post(format!("{}/summarize", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Upload `data` as the `file` field under `file_name`.
    pub async fn upload(&self, file_name: &str, data: &[u8]) -> reqwest::Response {
        let part = multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .unwrap();
        self.post_form(multipart::Form::new().part("file", part)).await
    }

    /// Files left behind in the upload directory.
    pub async fn stored_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.upload_dir).await else {
            return files;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            files.push(entry.path());
        }
        files
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.upload_dir).await;
    }
}

pub fn test_config() -> SummarizerConfig {
    let mut config = SummarizerConfig::from_lookup(CoreConfig::default(), |key| match key {
        "SUMMARIZER_PROVIDER" => Some("mock".to_string()),
        _ => None,
    })
    .expect("Failed to build test configuration");
    config.common.port = 0; // Random port
    config.upload.dir = format!("target/test-uploads-{}", Uuid::new_v4());
    config
}
