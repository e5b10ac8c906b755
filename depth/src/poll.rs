use crate::{error::PollError, types::ResultReference};
use std::{future::Future, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Outcome of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Pending,
    Succeeded(ResultReference),
    Failed(String),
    /// The provider claimed completion but the payload was unusable. Streaming
    /// responses can be caught half-written, so this is retried like `Pending`.
    Malformed(String),
}

/// Run `check` every `interval` until it reports a terminal state or
/// `deadline` elapses. The first check fires immediately.
///
/// A check error aborts the loop. When the deadline hits while the latest
/// check was [`Tick::Malformed`], the malformation is reported as
/// [`PollError::Decode`] instead of [`PollError::TimedOut`].
pub async fn poll_until<F, Fut>(
    interval: Duration,
    deadline: Duration,
    mut check: F,
) -> Result<ResultReference, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Tick, PollError>>,
{
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_malformed: Option<String> = None;
    let mut attempts = 0u32;

    let outcome: Result<Result<ResultReference, PollError>, time::error::Elapsed> =
        time::timeout(deadline, async {
            loop {
                ticker.tick().await;
                attempts += 1;
                match check().await? {
                    Tick::Succeeded(reference) => return Ok(reference),
                    Tick::Failed(message) => return Err(PollError::Provider(message)),
                    Tick::Pending => {
                        debug!(attempts, "job still pending");
                        last_malformed = None;
                    }
                    Tick::Malformed(reason) => {
                        warn!(attempts, %reason, "completed response was not usable yet");
                        last_malformed = Some(reason);
                    }
                }
            }
        })
        .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(attempts, ?deadline, "polling deadline elapsed");
            Err(match last_malformed {
                Some(reason) => PollError::Decode(reason),
                None => PollError::TimedOut(deadline),
            })
        }
    }
}
