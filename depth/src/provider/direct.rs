//! Single-call job API: the image goes inline as a base64 data uri and the job
//! is then polled by prediction id until it reports a terminal status.

use super::{
    accept_poll, accept_submission, endpoint,
    types::{PollerT, SubmitterT},
};
use crate::{
    error::{PollError, SubmissionError},
    poll::{poll_until, Tick},
    types::{JobHandle, JobStatus, ResultReference},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Depth Anything v2 model version.
pub const DEFAULT_MODEL_VERSION: &str =
    "b239ea33cff32bb7abb5db39ffe9a09c14cbc2894331d1ef66fe096eed88ebd4";

pub const DEFAULT_RESULT_FIELD: &str = "grey_depth";

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    image: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// The artifact url, read from `output.<field>`. A bare string output is
    /// accepted as the url itself.
    fn output_url(&self, field: &str) -> Option<Url> {
        let raw = match self.output.as_ref()? {
            Value::String(s) => s.as_str(),
            Value::Object(fields) => fields.get(field)?.as_str()?,
            _ => return None,
        };
        Url::parse(raw).ok()
    }
}

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

fn data_uri(image: &[u8]) -> String {
    format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(image))
}

#[derive(Clone)]
pub struct DirectSubmitter {
    client: Client,
    base: Url,
    token: Option<String>,
    version: String,
}

impl DirectSubmitter {
    pub fn new(
        client: Client,
        base: Url,
        token: Option<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base,
            token,
            version: version.into(),
        }
    }
}

impl SubmitterT for DirectSubmitter {
    #[instrument(skip_all, level = "info", fields(len = image.len()))]
    async fn submit(&self, image: &[u8]) -> Result<JobHandle, SubmissionError> {
        if image.is_empty() {
            return Err(SubmissionError::EmptyInput);
        }
        let token = self.token.as_deref().ok_or(SubmissionError::AuthMissing)?;
        let request = PredictionRequest {
            version: &self.version,
            input: PredictionInput {
                image: data_uri(image),
            },
        };
        let resp = self
            .client
            .post(endpoint(&self.base, &["predictions"]))
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&request)
            .send()
            .await?;
        let body = accept_submission(resp).await?.text().await?;
        let prediction: Prediction = serde_json::from_str(&body)
            .map_err(|e| SubmissionError::Encoding(format!("prediction response: {}", e)))?;
        if let Some(message) = prediction.error_message() {
            return Err(SubmissionError::ProviderRejected(message));
        }
        info!(id = %prediction.id, status = %prediction.status, "created prediction");
        Ok(JobHandle::new(prediction.id))
    }
}

/// Polls `GET <base>/predictions/<id>` on a fixed interval.
#[derive(Clone)]
pub struct StatusPoller {
    client: Client,
    base: Url,
    token: Option<String>,
    result_field: String,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        client: Client,
        base: Url,
        token: Option<String>,
        result_field: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            base,
            token,
            result_field: result_field.into(),
            interval,
        }
    }

    async fn check(&self, handle: &JobHandle) -> Result<Tick, PollError> {
        let mut request = self
            .client
            .get(endpoint(&self.base, &["predictions", handle.as_str()]));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let body = accept_poll(request.send().await?).await?.text().await?;
        let prediction: Prediction = serde_json::from_str(&body)
            .map_err(|e| PollError::Decode(format!("prediction status: {}", e)))?;

        if let Some(message) = prediction.error_message() {
            return Ok(Tick::Failed(message));
        }
        match JobStatus::from(prediction.status.as_str()) {
            JobStatus::Succeeded => {
                let url = prediction.output_url(&self.result_field).ok_or_else(|| {
                    PollError::Decode(format!(
                        "prediction {} succeeded without a url in output.{}",
                        prediction.id, self.result_field
                    ))
                })?;
                info!(id = %prediction.id, "prediction succeeded");
                Ok(Tick::Succeeded(ResultReference::new(url)))
            }
            JobStatus::Failed => Ok(Tick::Failed(format!(
                "prediction {} ended with status {}",
                prediction.id, prediction.status
            ))),
            JobStatus::Pending | JobStatus::Unknown(_) => {
                debug!(id = %prediction.id, status = %prediction.status, "prediction in progress");
                Ok(Tick::Pending)
            }
        }
    }
}

impl PollerT for StatusPoller {
    #[instrument(skip_all, level = "info", fields(id = %handle))]
    async fn wait(
        &self,
        handle: &JobHandle,
        deadline: Duration,
    ) -> Result<ResultReference, PollError> {
        poll_until(self.interval, deadline, || self.check(handle)).await
    }
}
