//! Report submission.
//!
//! Each call to [`SubmissionPipeline::submit`] spawns one attempt that walks
//! `Idle → Validating → UploadingMedia → Persisting → Succeeded`, or stops
//! in `Failed` / `Cancelled`. The steps of an attempt run strictly one after
//! another; separate attempts run concurrently.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tatsahay_shared::constants::STORE_WRITE_RETRIES;
use tatsahay_shared::{validate_report, ImageInput, Report, ReportCandidate, UnsavedReport, UserId};
use tatsahay_store::StoreError;

use crate::auth::Session;
use crate::error::{FailureReason, MediaError};
use crate::invalidation::InvalidationBus;
use crate::media::MediaStore;
use crate::store::IncidentStore;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionState {
    Idle,
    Validating,
    UploadingMedia,
    Persisting,
    Succeeded(Report),
    Failed(FailureReason),
    Cancelled,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded(_) | Self::Failed(_) | Self::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::UploadingMedia => "uploadingMedia",
            Self::Persisting => "persisting",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_timeout: Duration,
    pub store_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct GateFlags {
    cancelled: bool,
    committed: bool,
}

/// Decides the race between a cancel request and the start of persisting.
/// Exactly one of them wins.
#[derive(Default)]
struct CancelGate {
    flags: Mutex<GateFlags>,
    notify: Notify,
}

impl CancelGate {
    fn flags(&self) -> std::sync::MutexGuard<'_, GateFlags> {
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel(&self) -> bool {
        {
            let mut flags = self.flags();
            if flags.committed {
                return false;
            }
            flags.cancelled = true;
        }
        self.notify.notify_one();
        true
    }

    fn is_cancelled(&self) -> bool {
        self.flags().cancelled
    }

    /// Claim the right to persist. Fails if a cancel got there first.
    fn commit(&self) -> bool {
        let mut flags = self.flags();
        if flags.cancelled {
            return false;
        }
        flags.committed = true;
        true
    }

    async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

/// Caller's view of one submission attempt.
#[derive(Clone)]
pub struct SubmissionHandle {
    id: Uuid,
    author: UserId,
    state: watch::Receiver<SubmissionState>,
    gate: Arc<CancelGate>,
}

impl SubmissionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn author(&self) -> &UserId {
        &self.author
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    /// A receiver that observes every subsequent state transition.
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.clone()
    }

    /// Wait for the attempt to reach a terminal state.
    pub async fn wait(&self) -> SubmissionState {
        let mut rx = self.state.clone();
        // An error means the attempt task is gone; its last state is final.
        let _ = rx.wait_for(SubmissionState::is_terminal).await;
        let state = rx.borrow().clone();
        state
    }

    /// Abandon the attempt. Only possible before persisting has begun;
    /// returns whether the cancel took effect.
    pub fn cancel(&self) -> bool {
        if self.state.borrow().is_terminal() {
            return false;
        }
        let accepted = self.gate.cancel();
        debug!(submission = %self.id, accepted, "cancel requested");
        accepted
    }
}

/// Entry point for new reports.
#[derive(Clone)]
pub struct SubmissionPipeline {
    store: Arc<dyn IncidentStore>,
    media: Arc<dyn MediaStore>,
    bus: InvalidationBus,
    config: PipelineConfig,
}

impl SubmissionPipeline {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        media: Arc<dyn MediaStore>,
        bus: InvalidationBus,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            media,
            bus,
            config,
        }
    }

    /// Start a submission on behalf of `session` and return immediately.
    pub fn submit(&self, session: &Session, candidate: ReportCandidate) -> SubmissionHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(SubmissionState::Idle);
        let gate = Arc::new(CancelGate::default());

        let attempt = Attempt {
            id,
            author: session.user_id().clone(),
            store: Arc::clone(&self.store),
            media: Arc::clone(&self.media),
            bus: self.bus.clone(),
            config: self.config.clone(),
            state: tx,
            gate: Arc::clone(&gate),
        };

        info!(submission = %id, author = %attempt.author, "submission started");
        tokio::spawn(attempt.run(candidate));

        SubmissionHandle {
            id,
            author: session.user_id().clone(),
            state: rx,
            gate,
        }
    }
}

struct Attempt {
    id: Uuid,
    author: UserId,
    store: Arc<dyn IncidentStore>,
    media: Arc<dyn MediaStore>,
    bus: InvalidationBus,
    config: PipelineConfig,
    state: watch::Sender<SubmissionState>,
    gate: Arc<CancelGate>,
}

impl Attempt {
    fn transition(&self, next: SubmissionState) {
        debug!(submission = %self.id, state = next.name(), "submission state");
        self.state.send_replace(next);
    }

    fn fail(&self, reason: FailureReason) {
        warn!(
            submission = %self.id,
            code = reason.code(),
            error = %reason,
            "submission failed"
        );
        self.transition(SubmissionState::Failed(reason));
    }

    async fn abandon(&self, uploaded: Option<&str>) {
        if let Some(media_ref) = uploaded {
            if let Err(e) = self.media.discard(media_ref).await {
                warn!(submission = %self.id, media = media_ref, error = %e, "failed to discard media");
            }
        }
        info!(submission = %self.id, "submission cancelled");
        self.transition(SubmissionState::Cancelled);
    }

    async fn run(self, candidate: ReportCandidate) {
        self.transition(SubmissionState::Validating);
        let valid = match validate_report(&candidate) {
            Ok(valid) => valid,
            Err(e) => return self.fail(e.into()),
        };

        if self.gate.is_cancelled() {
            return self.abandon(None).await;
        }

        self.transition(SubmissionState::UploadingMedia);
        let (image_ref, uploaded) = match &valid.image {
            ImageInput::Stored(media_ref) => {
                let media_ref = media_ref.trim().to_string();
                let checked =
                    timeout(self.config.upload_timeout, self.media.exists(&media_ref)).await;
                match checked {
                    Ok(Ok(true)) => (media_ref, false),
                    Ok(Ok(false)) => return self.fail(MediaError::NotFound(media_ref).into()),
                    Ok(Err(e)) => return self.fail(e.into()),
                    Err(_) => return self.fail(MediaError::Timeout.into()),
                }
            }
            ImageInput::Upload { data, content_type } => {
                let mut upload = self.spawn_upload(data.clone(), content_type.clone());
                tokio::select! {
                    _ = self.gate.cancelled() => {
                        self.discard_when_done(upload);
                        return self.abandon(None).await;
                    }
                    joined = &mut upload => match upload_outcome(joined) {
                        Ok(media_ref) => (media_ref, true),
                        Err(e) => return self.fail(e.into()),
                    },
                }
            }
        };

        if !self.gate.commit() {
            let uploaded = uploaded.then_some(image_ref.as_str());
            return self.abandon(uploaded).await;
        }

        self.transition(SubmissionState::Persisting);
        let unsaved = valid.to_unsaved(&self.author, image_ref, self.id);
        match self.persist(unsaved).await {
            Ok(report) => {
                self.bus.report_changed(&report);
                info!(submission = %self.id, report = %report.id, "submission succeeded");
                self.transition(SubmissionState::Succeeded(report));
            }
            Err(reason) => self.fail(reason),
        }
    }

    /// Run the upload as its own task so that a cancel never drops it
    /// halfway through a write.
    fn spawn_upload(
        &self,
        data: Bytes,
        content_type: String,
    ) -> JoinHandle<Result<String, MediaError>> {
        let media = Arc::clone(&self.media);
        let limit = self.config.upload_timeout;
        tokio::spawn(async move {
            timeout(limit, media.store(data, &content_type))
                .await
                .unwrap_or(Err(MediaError::Timeout))
        })
    }

    /// Let an abandoned upload finish, then remove what it wrote.
    fn discard_when_done(&self, upload: JoinHandle<Result<String, MediaError>>) {
        let media = Arc::clone(&self.media);
        let id = self.id;
        tokio::spawn(async move {
            let Ok(media_ref) = upload_outcome(upload.await) else {
                return;
            };
            if let Err(e) = media.discard(&media_ref).await {
                warn!(submission = %id, media = %media_ref, error = %e, "failed to discard media");
                return;
            }
            debug!(submission = %id, media = %media_ref, "discarded abandoned upload");
        });
    }

    /// Write the report, retrying once if the store was unavailable. The
    /// submission id doubles as the idempotency key, so a retry after a
    /// write that did commit returns the existing record.
    async fn persist(&self, unsaved: UnsavedReport) -> Result<Report, FailureReason> {
        let mut retries = 0;
        let mut in_flight = Vec::new();
        let reason = loop {
            let mut write = self.spawn_write(unsaved.clone());
            let outcome = timeout(self.config.store_timeout, &mut write).await;
            let err = match outcome {
                Ok(Ok(Ok(report))) => return Ok(report),
                Ok(Ok(Err(e))) => e,
                Ok(Err(e)) => break FailureReason::Store(format!("Write task failed: {e}")),
                Err(_) => {
                    in_flight.push(write);
                    StoreError::Unavailable("write timed out".to_string())
                }
            };

            if !err.is_unavailable() {
                break FailureReason::Store(err.to_string());
            }
            if retries >= STORE_WRITE_RETRIES {
                break FailureReason::StoreUnavailable(err.to_string());
            }
            retries += 1;
            warn!(submission = %self.id, error = %err, "store unavailable, retrying write");
        };

        self.reconcile(in_flight, reason).await
    }

    fn spawn_write(&self, unsaved: UnsavedReport) -> JoinHandle<Result<Report, StoreError>> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move { store.create(unsaved).await })
    }

    /// A write that timed out keeps running and may still commit. Wait for
    /// those, then look the record up before reporting `reason`.
    async fn reconcile(
        &self,
        in_flight: Vec<JoinHandle<Result<Report, StoreError>>>,
        reason: FailureReason,
    ) -> Result<Report, FailureReason> {
        for write in in_flight {
            if let Ok(Ok(report)) = write.await {
                info!(submission = %self.id, report = %report.id, "timed out write committed");
                return Ok(report);
            }
        }

        match self.store.get_by_submission_key(self.id).await {
            Ok(Some(report)) => {
                info!(submission = %self.id, report = %report.id, "write committed despite error");
                Ok(report)
            }
            Ok(None) => Err(reason),
            Err(e) => {
                warn!(submission = %self.id, error = %e, "could not confirm failed write");
                Err(reason)
            }
        }
    }
}

fn upload_outcome(
    joined: Result<Result<String, MediaError>, JoinError>,
) -> Result<String, MediaError> {
    joined.unwrap_or_else(|e| Err(MediaError::Storage(format!("Upload task failed: {e}"))))
}
