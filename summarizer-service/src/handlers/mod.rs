//! HTTP handlers for the summarizer service.

pub mod health;
pub mod summarize;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use summarize::summarize;
