//! Two-phase Gradio-style API. The image is uploaded as a file, the stored path
//! is submitted to the `on_submit` endpoint, and the resulting event id is
//! polled for an event-stream body.

use super::{
    accept_submission, endpoint,
    types::{PollerT, SubmitterT},
};
use crate::{
    error::{PollError, SubmissionError},
    event::{self, EventBody},
    locator::ResultLocator,
    poll::{poll_until, Tick},
    types::{JobHandle, ResultReference},
};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://depth-anything-depth-anything-v2.hf.space";

const API_NAME: &str = "on_submit";
const UPLOAD_FIELD: &str = "files";
const UPLOAD_FILE_NAME: &str = "image.jpg";
const FILE_DATA_TYPE: &str = "gradio.FileData";

#[derive(Debug, Serialize)]
struct FileMeta {
    #[serde(rename = "_type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct FileData {
    path: String,
    meta: FileMeta,
}

#[derive(Debug, Serialize)]
struct CallRequest {
    data: Vec<FileData>,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

#[derive(Clone)]
pub struct UploadSubmitter {
    client: Client,
    base: Url,
}

impl UploadSubmitter {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Upload the raw bytes and return the server-side path they were stored at.
    async fn upload(&self, image: &[u8]) -> Result<String, SubmissionError> {
        let mime = image::guess_format(image)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        let part = Part::bytes(image.to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(mime)
            .map_err(|e| SubmissionError::Encoding(format!("upload part: {}", e)))?;
        let form = Form::new().part(UPLOAD_FIELD, part);
        let resp = self
            .client
            .post(endpoint(&self.base, &["upload"]))
            .multipart(form)
            .send()
            .await?;
        let body = accept_submission(resp).await?.text().await?;
        let paths: Vec<String> = serde_json::from_str(&body)
            .map_err(|e| SubmissionError::Encoding(format!("upload response: {}", e)))?;
        let path = paths.into_iter().next().ok_or_else(|| {
            SubmissionError::ProviderRejected("upload response listed no stored path".to_string())
        })?;
        info!(%path, "uploaded image");
        Ok(path)
    }

    async fn call(&self, path: String) -> Result<JobHandle, SubmissionError> {
        let request = CallRequest {
            data: vec![FileData {
                path,
                meta: FileMeta {
                    kind: FILE_DATA_TYPE,
                },
            }],
        };
        let resp = self
            .client
            .post(endpoint(&self.base, &["call", API_NAME]))
            .json(&request)
            .send()
            .await?;
        let body = accept_submission(resp).await?.text().await?;
        let CallResponse { event_id } = serde_json::from_str(&body)
            .map_err(|e| SubmissionError::Encoding(format!("event id response: {}", e)))?;
        info!(%event_id, "got event id");
        Ok(JobHandle::new(event_id))
    }
}

impl SubmitterT for UploadSubmitter {
    #[instrument(skip_all, level = "info", fields(len = image.len()))]
    async fn submit(&self, image: &[u8]) -> Result<JobHandle, SubmissionError> {
        if image.is_empty() {
            return Err(SubmissionError::EmptyInput);
        }
        let path = self.upload(image).await?;
        self.call(path).await
    }
}

/// Polls `GET <base>/call/on_submit/<event_id>` and reads the event body.
#[derive(Clone)]
pub struct EventStreamPoller {
    client: Client,
    base: Url,
    locator: ResultLocator,
    interval: Duration,
}

impl EventStreamPoller {
    pub fn new(client: Client, base: Url, locator: ResultLocator, interval: Duration) -> Self {
        Self {
            client,
            base,
            locator,
            interval,
        }
    }

    /// The status code is not consulted: only the body decides the job state,
    /// so a 404 for an event that is not registered yet keeps polling.
    async fn check(&self, handle: &JobHandle) -> Result<Tick, PollError> {
        let url = endpoint(&self.base, &["call", API_NAME, handle.as_str()]);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            debug!(%status, "event poll returned a non-success status");
        }
        Ok(self.interpret(&body))
    }

    fn interpret(&self, body: &str) -> Tick {
        match EventBody::classify(body) {
            EventBody::Error => Tick::Failed("provider returned an error event".to_string()),
            EventBody::Pending => {
                let events: Vec<String> = event::parse_blocks(body)
                    .into_iter()
                    .map(|b| b.event)
                    .collect();
                debug!(?events, "job not complete");
                Tick::Pending
            }
            EventBody::Complete(payload) => {
                let slots = match serde_json::from_str::<Vec<Value>>(&payload) {
                    Ok(slots) => slots,
                    Err(e) => return Tick::Malformed(format!("complete event payload: {}", e)),
                };
                match self.locator.locate(&slots) {
                    Ok(reference) => {
                        info!(%reference, "got depth map url");
                        Tick::Succeeded(reference)
                    }
                    Err(e) => Tick::Malformed(e.to_string()),
                }
            }
        }
    }
}

impl PollerT for EventStreamPoller {
    #[instrument(skip_all, level = "info", fields(event_id = %handle))]
    async fn wait(
        &self,
        handle: &JobHandle,
        deadline: Duration,
    ) -> Result<ResultReference, PollError> {
        poll_until(self.interval, deadline, || self.check(handle)).await
    }
}
