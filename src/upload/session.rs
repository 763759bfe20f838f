use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::cancel::CancelSignal;
use super::file::UploadFile;
use super::progress::{SmoothingPlan, UploadEvents};
use super::transport::UploadTransport;
use crate::auth::{CredentialRefresher, CredentialStore};
use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::UploadReceipt;

/// Runs single-file uploads: at most one refresh-and-retry on 401, then a
/// cosmetic ramp to 100% once the server has accepted the file.
///
/// Unlike the generic request client, this path does refresh on 401.
pub struct UploadSession {
    transport: Arc<dyn UploadTransport>,
    credentials: Arc<CredentialStore>,
    refresher: Arc<CredentialRefresher>,
    config: UploadConfig,
}

impl UploadSession {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Arc<CredentialStore>,
        refresher: Arc<CredentialRefresher>,
        config: UploadConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresher,
            config,
        }
    }

    /// Uploads `file`, reporting through `events` and ending the stream with
    /// exactly one terminal event. Failures are reported as soon as they are
    /// known; only a confirmed success is followed by the smoothing ramp.
    pub async fn start(
        &self,
        file: UploadFile,
        events: UploadEvents,
        cancel: CancelSignal,
    ) -> ApiResult<UploadReceipt> {
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            result = self.transfer(&file, &events) => result,
        };
        // Release the buffer before the purely cosmetic phase.
        let name = file.name.clone();
        drop(file);

        match outcome {
            Ok(receipt) => {
                info!(
                    event_name = "upload.confirmed",
                    event_domain = "upload",
                    file = name.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "upload accepted by server"
                );
                events.confirmed(receipt.clone());
                self.smooth(started.elapsed(), &events, &cancel).await;
                events.completed();
                Ok(receipt)
            }
            Err(err) => {
                error!(
                    event_name = "upload.failed",
                    event_domain = "upload",
                    file = name.as_str(),
                    error = %err,
                    "upload failed"
                );
                events.failed(err.clone());
                Err(err)
            }
        }
    }

    async fn transfer(&self, file: &UploadFile, events: &UploadEvents) -> ApiResult<UploadReceipt> {
        let credential = self.credentials.get();
        match self.transport.send(file, credential.as_ref(), events).await {
            Err(ApiError::Unauthorized) => {
                warn!(
                    event_name = "upload.unauthorized",
                    event_domain = "upload",
                    file = file.name.as_str(),
                    "upload returned 401; refreshing credential and retrying once"
                );
                let fresh = self.refresher.refresh().await?;
                let retried = self.transport.send(file, Some(&fresh), events).await;
                if matches!(retried, Err(ApiError::Unauthorized)) {
                    // Drop the rejected credential, but not one a sibling stored since.
                    self.credentials.clear_if(&fresh);
                }
                retried
            }
            other => other,
        }
    }

    async fn smooth(&self, transfer_elapsed: std::time::Duration, events: &UploadEvents, cancel: &CancelSignal) {
        let plan = SmoothingPlan::new(events.last_real(), transfer_elapsed, &self.config);
        let ramp_started = Instant::now();
        let mut frames = tokio::time::interval(self.config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = frames.tick() => {}
            }
            let percent = plan.percent_at(ramp_started.elapsed());
            if percent >= 100 {
                return;
            }
            events.smoothing(percent);
        }
    }
}
