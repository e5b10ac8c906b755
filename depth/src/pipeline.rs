use crate::{
    config::{ConfigError, PipelineConfig, ProviderKind},
    decoder,
    error::{DownloadError, FetchError},
    locator::{ResultLocator, DEFAULT_PATH_FIELD},
    provider::{
        direct::{DirectSubmitter, StatusPoller},
        stream::{EventStreamPoller, UploadSubmitter},
        types::{PollerT, SubmitterT},
    },
    types::{DepthSurface, ResultReference},
};
use reqwest::Client;
use std::{future::Future, time::Duration};
use tracing::{info, instrument};

/// Submit, wait, download, decode. Stages run strictly in order and nothing is
/// retried.
#[derive(Clone)]
pub struct Pipeline<S, P> {
    client: Client,
    submitter: S,
    poller: P,
    deadline: Duration,
}

impl<S, P> Pipeline<S, P>
where
    S: SubmitterT,
    P: PollerT,
{
    pub fn new(client: Client, submitter: S, poller: P, deadline: Duration) -> Self {
        Self {
            client,
            submitter,
            poller,
            deadline,
        }
    }

    #[instrument(skip_all, level = "info", fields(len = image.len()))]
    pub async fn fetch(&self, image: &[u8]) -> Result<DepthSurface, FetchError> {
        let handle = self.submitter.submit(image).await?;
        let reference = self.poller.wait(&handle, self.deadline).await?;
        let bytes = download(&self.client, &reference).await?;
        let surface = decoder::decode(&bytes)?;
        info!(
            width = surface.width(),
            height = surface.height(),
            "depth map ready"
        );
        Ok(surface)
    }

    /// Run [`Pipeline::fetch`] until `cancel` resolves. The remote job is left
    /// running.
    pub async fn fetch_or_cancel<C>(
        &self,
        image: &[u8],
        cancel: C,
    ) -> Result<DepthSurface, FetchError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.fetch(image) => result,
            _ = cancel => Err(FetchError::Cancelled),
        }
    }
}

#[instrument(skip_all, level = "info", fields(url = %reference))]
pub async fn download(
    client: &Client,
    reference: &ResultReference,
) -> Result<Vec<u8>, DownloadError> {
    let resp = client.get(reference.url().clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DownloadError::Status(status.as_u16()));
    }
    let bytes = resp.bytes().await?;
    info!(size = bytes.len(), "downloaded depth artifact");
    Ok(bytes.to_vec())
}

/// The configured provider variant. Callers go through [`Provider::fetch`]
/// without knowing which wire format is in use.
#[derive(Clone)]
pub enum Provider {
    Direct(Pipeline<DirectSubmitter, StatusPoller>),
    Stream(Pipeline<UploadSubmitter, EventStreamPoller>),
}

impl Provider {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let client = config.http_client()?;
        let base = config.provider_url()?;
        let interval = config.poll_interval();
        let deadline = config.poll_timeout();
        Ok(match config.provider {
            ProviderKind::Direct => Provider::Direct(Pipeline::new(
                client.clone(),
                DirectSubmitter::new(
                    client.clone(),
                    base.clone(),
                    config.api_token.clone(),
                    config.model_version.clone(),
                ),
                StatusPoller::new(
                    client,
                    base,
                    config.api_token.clone(),
                    config.result_field.clone(),
                    interval,
                ),
                deadline,
            )),
            ProviderKind::Stream => {
                let locator =
                    ResultLocator::new(base.clone(), config.result_slot, DEFAULT_PATH_FIELD);
                Provider::Stream(Pipeline::new(
                    client.clone(),
                    UploadSubmitter::new(client.clone(), base.clone()),
                    EventStreamPoller::new(client, base, locator, interval),
                    deadline,
                ))
            }
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Direct(_) => ProviderKind::Direct,
            Provider::Stream(_) => ProviderKind::Stream,
        }
    }

    pub async fn fetch(&self, image: &[u8]) -> Result<DepthSurface, FetchError> {
        match self {
            Provider::Direct(p) => p.fetch(image).await,
            Provider::Stream(p) => p.fetch(image).await,
        }
    }
}
