use crate::{
    error::{PollError, SubmissionError},
    types::{JobHandle, ResultReference},
};
use std::{future::Future, time::Duration};

#[allow(async_fn_in_trait)]
pub trait SubmitterT {
    async fn submit(&self, image: &[u8]) -> Result<JobHandle, SubmissionError>;
}

#[allow(async_fn_in_trait)]
pub trait PollerT {
    async fn wait(
        &self,
        handle: &JobHandle,
        deadline: Duration,
    ) -> Result<ResultReference, PollError>;

    /// Like [`PollerT::wait`], but gives up with [`PollError::Cancelled`] as
    /// soon as `cancel` resolves.
    async fn wait_or_cancel<C>(
        &self,
        handle: &JobHandle,
        deadline: Duration,
        cancel: C,
    ) -> Result<ResultReference, PollError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.wait(handle, deadline) => result,
            _ = cancel => Err(PollError::Cancelled),
        }
    }
}
