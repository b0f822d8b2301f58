//! Fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use tatsahay_shared::{
    DisasterType, ImageInput, Report, ReportCandidate, ReportId, Severity, UnsavedReport, User,
    UserId, VerificationState,
};
use tatsahay_store::{Database, ReportFilter, ReportSort, StoreError};

use crate::auth::Session;
use crate::error::MediaError;
use crate::media::MediaStore;
use crate::store::{IncidentStore, SqliteIncidentStore};

pub fn user(id: &str) -> User {
    User {
        id: UserId::new(id),
        full_name: "Hardik Gupta".into(),
        email: format!("{id}@example.org"),
        city: Some("Jaipur".into()),
        state: Some("Rajasthan".into()),
    }
}

pub fn session(id: &str) -> Session {
    Session::new(user(id))
}

/// A photo every [`MemoryMedia`] already holds, as if uploaded earlier.
pub const EXISTING_MEDIA: &str = "media/existing";

pub fn candidate(kind: &str, location: &str, description: &str) -> ReportCandidate {
    ReportCandidate {
        disaster_type: Some(kind.into()),
        location: Some(location.into()),
        description: Some(description.into()),
        image: Some(ImageInput::Stored(EXISTING_MEDIA.into())),
        ..ReportCandidate::default()
    }
}

pub fn upload_candidate(data: Bytes, content_type: &str) -> ReportCandidate {
    ReportCandidate {
        image: Some(ImageInput::Upload {
            data,
            content_type: content_type.into(),
        }),
        ..candidate("Flood", "Mumbai", "Street flooded")
    }
}

pub fn sample_report(author: &str, location: &str) -> Report {
    Report {
        id: ReportId::new(),
        author_id: UserId::new(author),
        disaster_type: DisasterType::Flood,
        location: location.into(),
        description: "Water logging".into(),
        severity: Severity::Medium,
        coordinates: None,
        image_ref: Some("media/sample".into()),
        created_at: Utc::now(),
        verification_state: VerificationState::Unverified,
        submission_key: Uuid::new_v4(),
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("disk I/O error".into())
}

/// In-memory SQLite store with switchable failures and call counters.
pub struct FlakyStore {
    inner: SqliteIncidentStore,
    pub create_calls: AtomicUsize,
    /// Fail this many upcoming creates before touching the database.
    pub fail_next_creates: AtomicUsize,
    /// Commit this many upcoming creates, then report them as failed.
    pub commit_then_fail: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub read_calls: AtomicUsize,
    /// Every create sleeps this long before writing.
    pub create_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteIncidentStore::new(Database::open_in_memory().unwrap()),
            create_calls: AtomicUsize::new(0),
            fail_next_creates: AtomicUsize::new(0),
            commit_then_fail: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            read_calls: AtomicUsize::new(0),
            create_delay_ms: AtomicU64::new(0),
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read_guard(&self) -> Result<(), StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for FlakyStore {
    async fn create(&self, report: UnsavedReport) -> Result<Report, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.fail_next_creates) {
            return Err(unavailable());
        }
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let created = self.inner.create(report).await?;
        if Self::take(&self.commit_then_fail) {
            return Err(unavailable());
        }
        Ok(created)
    }

    async fn list_all(
        &self,
        filter: ReportFilter,
        sort: ReportSort,
    ) -> Result<Vec<Report>, StoreError> {
        self.read_guard()?;
        self.inner.list_all(filter, sort).await
    }

    async fn list_by_author(&self, author: &UserId) -> Result<Vec<Report>, StoreError> {
        self.read_guard()?;
        self.inner.list_by_author(author).await
    }

    async fn get_by_id(&self, id: ReportId) -> Result<Report, StoreError> {
        self.read_guard()?;
        self.inner.get_by_id(id).await
    }

    async fn get_by_submission_key(&self, key: Uuid) -> Result<Option<Report>, StoreError> {
        self.read_guard()?;
        self.inner.get_by_submission_key(key).await
    }

    async fn set_verification(
        &self,
        id: ReportId,
        state: VerificationState,
    ) -> Result<Report, StoreError> {
        self.inner.set_verification(id, state).await
    }

    /// Not counted as a read: tests use it to inspect what was written.
    async fn count(&self) -> Result<u64, StoreError> {
        self.inner.count().await
    }
}

/// Lets a test observe a finished upload before the attempt sees it.
#[derive(Default)]
struct UploadLatch {
    written: Notify,
    release: Notify,
}

/// Media store kept in a map. `failing` rejects every upload; `held`
/// never finishes an upload; `latched` writes the upload, then waits for
/// [`MemoryMedia::release_upload`] before returning its reference.
pub struct MemoryMedia {
    objects: Mutex<HashMap<String, Bytes>>,
    uploads: AtomicUsize,
    fail: bool,
    hold: bool,
    latch: Option<UploadLatch>,
}

impl MemoryMedia {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            uploads: AtomicUsize::new(0),
            fail: false,
            hold: false,
            latch: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn held() -> Self {
        Self {
            hold: true,
            ..Self::new()
        }
    }

    pub fn latched() -> Self {
        Self {
            latch: Some(UploadLatch::default()),
            ..Self::new()
        }
    }

    /// Resolves once a latched upload has been written.
    pub async fn upload_written(&self) {
        if let Some(latch) = &self.latch {
            latch.written.notified().await;
        }
    }

    pub fn release_upload(&self) {
        if let Some(latch) = &self.latch {
            latch.release.notify_one();
        }
    }

    pub fn contains(&self, media_ref: &str) -> bool {
        self.objects.lock().unwrap().contains_key(media_ref)
    }

    /// Uploads currently held, not counting [`EXISTING_MEDIA`].
    pub fn stored_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Uploads ever written, including discarded ones.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaStore for MemoryMedia {
    async fn store(&self, data: Bytes, _content_type: &str) -> Result<String, MediaError> {
        if self.hold {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(MediaError::Storage("connection reset".into()));
        }
        let media_ref = format!("media/{}", Uuid::new_v4());
        self.objects.lock().unwrap().insert(media_ref.clone(), data);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(latch) = &self.latch {
            latch.written.notify_one();
            latch.release.notified().await;
        }
        Ok(media_ref)
    }

    async fn exists(&self, media_ref: &str) -> Result<bool, MediaError> {
        Ok(media_ref == EXISTING_MEDIA || self.contains(media_ref))
    }

    async fn discard(&self, media_ref: &str) -> Result<(), MediaError> {
        self.objects.lock().unwrap().remove(media_ref);
        Ok(())
    }
}
