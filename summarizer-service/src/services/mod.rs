pub mod metrics;
pub mod providers;
pub mod storage;

pub use providers::{build_provider, ProviderError, SummaryProvider, UploadedFileRef};
pub use storage::{StoredFile, UploadStore};
