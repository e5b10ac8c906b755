use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Opaque identifier of a job running on the provider. Either a prediction id
/// (direct mode) or an event id (upload-then-submit mode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
    Unknown(String),
}

impl From<&str> for JobStatus {
    fn from(status: &str) -> Self {
        match status {
            "starting" | "processing" => Self::Pending,
            "succeeded" => Self::Succeeded,
            "failed" | "canceled" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Downloadable location of a finished job's depth artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReference(Url);

impl ResultReference {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for ResultReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Decoded depth buffer: one sample in `[0, 1]` per pixel, row-major from the
/// top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthSurface {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl DepthSurface {
    /// Returns `None` unless `values` holds exactly `width * height` samples.
    pub fn new(values: Vec<f32>, width: u32, height: u32) -> Option<Self> {
        if values.len() as u64 != u64::from(width) * u64::from(height) {
            return None;
        }
        Some(Self {
            values,
            width,
            height,
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
