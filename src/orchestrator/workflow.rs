//! Submit, poll, fetch.

use crate::api::GatewayApi;
use crate::core::poll::QUEUED_PERCENT;
use crate::core::{
    phase_message, GenerationRequest, GenerationResult, GenerationStatus, MagicError, Progress,
    ProgressSink, RequestHandle, RetryPolicy,
};

use super::platform::Clock;

const SUBMIT_PERCENT: u8 = 10;

/// Run one generation to completion.
pub async fn run_generation(
    gateway: &dyn GatewayApi,
    clock: &dyn Clock,
    policy: &RetryPolicy,
    request: &GenerationRequest,
    progress: &mut dyn ProgressSink,
) -> Result<GenerationResult, MagicError> {
    progress.report(Progress::new(SUBMIT_PERCENT, "Sending request to AI..."));
    let handle = gateway.submit(request).await?;
    tracing::info!(request_id = %handle, "Generation queued");

    progress.report(Progress::new(QUEUED_PERCENT, "Request queued. AI is processing..."));
    let result = poll_until_done(gateway, clock, policy, &handle, progress).await?;

    if result.images.is_empty() {
        return Err(MagicError::EmptyResult);
    }

    progress.report(Progress::new(100, "Generation complete!"));
    Ok(result)
}

/// Poll `handle` until it reaches a terminal state or the budget runs out.
///
/// Status failures are retried straight away; only the one on the final
/// attempt is returned. A failed result fetch ends the loop.
async fn poll_until_done(
    gateway: &dyn GatewayApi,
    clock: &dyn Clock,
    policy: &RetryPolicy,
    handle: &RequestHandle,
    progress: &mut dyn ProgressSink,
) -> Result<GenerationResult, MagicError> {
    for attempt in 0..policy.max_attempts {
        let resp = match gateway.status(handle).await {
            Ok(resp) => resp,
            Err(e) if policy.is_last(attempt) => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, "Status check failed, retrying: {}", e);
                continue;
            }
        };

        progress.report(Progress::new(
            policy.progress_for(attempt),
            phase_message(attempt),
        ));

        match resp.status() {
            GenerationStatus::Completed => {
                tracing::debug!(attempt, "Generation completed, fetching result");
                return gateway.result(handle).await;
            }
            GenerationStatus::Failed => return Err(MagicError::UpstreamGeneration),
            other => {
                tracing::debug!(
                    attempt,
                    status = %other,
                    queue_position = ?resp.queue_position,
                    "Still waiting"
                );
                if !policy.is_last(attempt) {
                    clock.sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    Err(MagicError::Timeout)
}
