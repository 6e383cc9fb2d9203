//! src/services/ingest.rs
//!
//! Image ingestion: size check, best-effort compression, then an upload loop
//! with bounded retries and capped exponential backoff.
//!
//! One call walks `idle -> compressing -> uploading(1..=n) -> succeeded|failed`,
//! passing through `backoff_wait(k)` between attempts on retryable failures.
//! Each attempt runs on its own [`ObjectSession`](crate::services::object_store::ObjectSession),
//! dropped before the next attempt starts.

use crate::{
    models::upload::{ImageFile, UploadResult},
    services::{
        compression::{self, Capabilities, CompressOptions},
        naming,
        object_store::{ObjectStore, StoreError},
        retry::{self, RetryPolicy},
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Largest file accepted for upload, before compression.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File too large: {size_mb}MB. Maximum size is 10MB.")]
    FileTooLarge { size_bytes: usize, size_mb: usize },
    #[error("Upload failed: {message}")]
    UploadFailed { message: String, attempts: u32 },
    #[error("Upload failed after all retry attempts")]
    RetriesExhausted,
}

/// Where a single upload call currently is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum UploadPhase {
    Idle,
    Compressing,
    Uploading { attempt: u32 },
    BackoffWait { attempt: u32, delay_ms: u64 },
    Succeeded,
    Failed,
}

/// Per-call inputs decided by the caller.
#[derive(Clone, Debug)]
pub struct UploadContext {
    /// Correlates the log lines of one upload.
    pub upload_id: String,
    /// When the caller received the request.
    pub requested_at: DateTime<Utc>,
    pub retry: RetryPolicy,
    pub capabilities: Capabilities,
    /// Optional observer of phase transitions.
    pub progress: Option<watch::Sender<UploadPhase>>,
}

impl UploadContext {
    pub fn new(requested_at: DateTime<Utc>) -> Self {
        Self {
            upload_id: naming::random_token(6),
            requested_at,
            retry: RetryPolicy::default(),
            capabilities: Capabilities::default(),
            progress: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_attempts = max_retries;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_progress(mut self, progress: watch::Sender<UploadPhase>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, phase: UploadPhase) {
        if let Some(progress) = &self.progress {
            progress.send_replace(phase);
        }
    }
}

/// Compress-then-upload pipeline over an [`ObjectStore`].
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn ObjectStore>,
    compress: CompressOptions,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, compress: CompressOptions) -> Self {
        Self { store, compress }
    }

    /// Upload `file` and return its stable `{path, url}` reference.
    pub async fn upload(
        &self,
        file: ImageFile,
        ctx: &UploadContext,
    ) -> Result<UploadResult, IngestError> {
        let span = info_span!("upload", upload_id = %ctx.upload_id);
        self.run_upload(file, ctx).instrument(span).await
    }

    async fn run_upload(
        &self,
        file: ImageFile,
        ctx: &UploadContext,
    ) -> Result<UploadResult, IngestError> {
        info!("Starting upload process for: {}", file.name);

        if file.size() > MAX_UPLOAD_BYTES {
            let err = IngestError::FileTooLarge {
                size_bytes: file.size(),
                size_mb: (file.size() + 512 * 1024) / (1024 * 1024),
            };
            error!("{}", err);
            ctx.report(UploadPhase::Failed);
            return Err(err);
        }

        debug!(
            name = %file.name,
            size_kb = file.size() / 1024,
            content_type = %file.content_type,
            "file details"
        );

        let name = naming::object_name(&file, Utc::now());
        debug!("Generated filename: {}", name);

        ctx.report(UploadPhase::Compressing);
        let compressed = compression::compress(&file, &self.compress, ctx.capabilities).await;
        let to_upload = match compressed {
            Ok(compressed) => {
                debug!("Uploading compressed file {}", compressed.name);
                compressed
            }
            Err(err) => {
                warn!("Image compression failed, using original: {}", err);
                file
            }
        };

        let policy = ctx.retry;
        let mut may_have_written = false;
        for attempt in 1..=policy.max_attempts {
            ctx.report(UploadPhase::Uploading { attempt });
            info!("Upload attempt {}/{}", attempt, policy.max_attempts);

            let started = tokio::time::Instant::now();
            let outcome = self.put_once(&name, &to_upload).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let err = match outcome {
                Ok(()) => {
                    let url = self.store.public_url(&name);
                    let total_ms = (Utc::now() - ctx.requested_at).num_milliseconds();
                    info!(duration_ms, total_ms, "Upload complete! URL: {}", url);
                    ctx.report(UploadPhase::Succeeded);
                    return Ok(UploadResult { path: name, url });
                }
                Err(err) => err,
            };

            let message = err.to_string();
            may_have_written |= err.may_have_written();
            let retryable = !err.is_terminal() && retry::is_retryable_message(&message);
            warn!(
                duration_ms,
                retryable, "Upload attempt {} failed: {}", attempt, message
            );

            if !retryable || policy.is_last_attempt(attempt) {
                if may_have_written {
                    self.discard(&name).await;
                }
                let readable = retry::readable_message(&message);
                error!("Final error: Upload failed: {}", readable);
                ctx.report(UploadPhase::Failed);
                return Err(IngestError::UploadFailed {
                    message: readable,
                    attempts: attempt,
                });
            }

            let delay = policy.backoff_delay(attempt);
            ctx.report(UploadPhase::BackoffWait {
                attempt,
                delay_ms: duration_as_millis(delay),
            });
            info!("Retrying in {}ms...", duration_as_millis(delay));
            tokio::time::sleep(delay).await;
        }

        error!("Upload failed after all retry attempts");
        ctx.report(UploadPhase::Failed);
        Err(IngestError::RetriesExhausted)
    }

    /// One attempt on a fresh session. The session drops on every path out.
    async fn put_once(&self, name: &str, file: &ImageFile) -> Result<(), StoreError> {
        let mut session = self.store.session().await?;
        session
            .put(name, file.bytes.clone(), &file.content_type)
            .await?;
        Ok(())
    }

    /// Best-effort removal of anything left under `name` after a failed upload.
    async fn discard(&self, name: &str) {
        let result = match self.store.session().await {
            Ok(mut session) => session.delete(name).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => debug!("Removed partial object {}", name),
            Err(StoreError::NotFound(_)) => {}
            Err(err) => warn!("Could not remove partial object {}: {}", name, err),
        }
    }

    /// Remove a previously uploaded image.
    pub async fn delete_image(&self, path: &str) -> Result<(), StoreError> {
        let mut session = self.store.session().await?;
        session.delete(path).await
    }
}

fn duration_as_millis(delay: Duration) -> u64 {
    delay.as_millis().min(u64::MAX as u128) as u64
}
