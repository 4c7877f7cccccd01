pub mod config;
pub mod error;
pub mod exec;
pub mod gcloud;
pub mod kube;
pub mod notify;
pub mod pipeline;
pub mod preflight;
pub mod progress;
pub mod readiness;
pub mod status;
pub mod terraform;
pub mod traffic;

pub use error::{ObservError, Result};
