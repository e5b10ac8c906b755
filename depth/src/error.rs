use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("image payload is empty")]
    EmptyInput,

    #[error("submission request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The submission response (or the request we tried to build) could not be
    /// encoded or decoded.
    #[error("submission payload could not be encoded or decoded: {0}")]
    Encoding(String),

    #[error("direct mode requires a bearer token but none was configured")]
    AuthMissing,

    #[error("provider rejected the submission: {0}")]
    ProviderRejected(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Transport(String),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("provider reported job failure: {0}")]
    Provider(String),

    #[error("no terminal state observed within {0:?}")]
    TimedOut(std::time::Duration),

    #[error("wait was cancelled by the caller")]
    Cancelled,
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PollError::Decode(e.to_string())
        } else {
            PollError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("output has {len} slots, slot {slot} is out of range")]
    TooShort { len: usize, slot: usize },

    #[error("output slot {slot} is not an object")]
    WrongShape { slot: usize },

    #[error("output slot has no string field {field:?}")]
    MissingField { field: String },

    #[error("{0:?} does not resolve to a valid url")]
    BadReference(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("artifact is not in a supported image format: {0}")]
    UnsupportedFormat(String),

    #[error("artifact image data is truncated or corrupt: {0}")]
    Truncated(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("artifact download failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("artifact download returned status {0}")]
    Status(u16),
}

/// Failure of one [`crate::pipeline::Pipeline::fetch`] call, tagged by the stage
/// that produced it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("submit: {0}")]
    Submit(#[from] SubmissionError),

    #[error("poll: {0}")]
    Poll(#[from] PollError),

    #[error("download: {0}")]
    Download(#[from] DownloadError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("fetch was cancelled by the caller")]
    Cancelled,
}

/// The small set of failure kinds the HTTP boundary distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidInput,
    UpstreamUnavailable,
    UpstreamRejected,
    Timeout,
    MalformedUpstreamResponse,
}

impl FetchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::Submit(e) => match e {
                SubmissionError::EmptyInput => ErrorCategory::InvalidInput,
                SubmissionError::Network(_) | SubmissionError::AuthMissing => {
                    ErrorCategory::UpstreamUnavailable
                }
                SubmissionError::Encoding(_) => ErrorCategory::MalformedUpstreamResponse,
                SubmissionError::ProviderRejected(_) => ErrorCategory::UpstreamRejected,
            },
            FetchError::Poll(e) => match e {
                PollError::Transport(_) | PollError::Cancelled => {
                    ErrorCategory::UpstreamUnavailable
                }
                PollError::Decode(_) => ErrorCategory::MalformedUpstreamResponse,
                PollError::Provider(_) => ErrorCategory::UpstreamRejected,
                PollError::TimedOut(_) => ErrorCategory::Timeout,
            },
            FetchError::Download(_) | FetchError::Cancelled => ErrorCategory::UpstreamUnavailable,
            FetchError::Decode(_) => ErrorCategory::MalformedUpstreamResponse,
        }
    }
}
