pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod locator;
pub mod pipeline;
pub mod poll;
pub mod provider;
pub mod types;

pub use config::{PipelineConfig, ProviderKind};
pub use error::{ErrorCategory, FetchError};
pub use pipeline::{Pipeline, Provider};
pub use types::{DepthSurface, JobHandle, JobStatus, ResultReference};
