pub mod direct;

pub mod stream;

pub mod types;

use crate::error::{PollError, SubmissionError};
use reqwest::Response;
use url::Url;

/// Append path segments to `base`, keeping any path the base already has
/// (`https://api.example/v1` + `predictions` -> `https://api.example/v1/predictions`).
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

async fn error_body(resp: Response) -> String {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response text".to_string());
    format!("{}: {}", status, body.trim())
}

pub(crate) async fn accept_submission(resp: Response) -> Result<Response, SubmissionError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    Err(SubmissionError::ProviderRejected(error_body(resp).await))
}

/// 5xx is treated as the provider being unreachable, any other failure status
/// as the provider refusing the job.
pub(crate) async fn accept_poll(resp: Response) -> Result<Response, PollError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = error_body(resp).await;
    if status.is_server_error() {
        Err(PollError::Transport(message))
    } else {
        Err(PollError::Provider(message))
    }
}
