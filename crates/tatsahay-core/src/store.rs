//! Async access to the incident store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use tatsahay_shared::{Report, ReportId, UnsavedReport, UserId, VerificationState};
use tatsahay_store::{Database, ReportFilter, ReportSort, StoreError};

/// Durable, queryable persistence for reports.
///
/// Listings return an owned snapshot that can be iterated any number of
/// times. `create` is all-or-nothing.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create(&self, report: UnsavedReport) -> Result<Report, StoreError>;

    async fn list_all(
        &self,
        filter: ReportFilter,
        sort: ReportSort,
    ) -> Result<Vec<Report>, StoreError>;

    async fn list_by_author(&self, author: &UserId) -> Result<Vec<Report>, StoreError>;

    async fn get_by_id(&self, id: ReportId) -> Result<Report, StoreError>;

    /// The report created by submission attempt `key`, if it was committed.
    async fn get_by_submission_key(&self, key: Uuid) -> Result<Option<Report>, StoreError>;

    async fn set_verification(
        &self,
        id: ReportId,
        state: VerificationState,
    ) -> Result<Report, StoreError>;

    /// Total stored reports, whatever their moderation state.
    async fn count(&self) -> Result<u64, StoreError>;
}

/// [`IncidentStore`] over the SQLite [`Database`].
///
/// The connection sits behind a mutex and every call runs on the blocking
/// pool, so writes are serialized and each read sees one snapshot.
#[derive(Clone)]
pub struct SqliteIncidentStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteIncidentStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("Store worker failed: {e}")))?
    }
}

#[async_trait]
impl IncidentStore for SqliteIncidentStore {
    async fn create(&self, report: UnsavedReport) -> Result<Report, StoreError> {
        self.with_db(move |db| db.create_report(&report)).await
    }

    async fn list_all(
        &self,
        filter: ReportFilter,
        sort: ReportSort,
    ) -> Result<Vec<Report>, StoreError> {
        self.with_db(move |db| db.list_reports(&filter, sort)).await
    }

    async fn list_by_author(&self, author: &UserId) -> Result<Vec<Report>, StoreError> {
        let author = author.clone();
        self.with_db(move |db| db.list_reports_by_author(&author))
            .await
    }

    async fn get_by_id(&self, id: ReportId) -> Result<Report, StoreError> {
        self.with_db(move |db| db.get_report(id)).await
    }

    async fn get_by_submission_key(&self, key: Uuid) -> Result<Option<Report>, StoreError> {
        self.with_db(move |db| db.find_by_submission_key(key)).await
    }

    async fn set_verification(
        &self,
        id: ReportId,
        state: VerificationState,
    ) -> Result<Report, StoreError> {
        self.with_db(move |db| db.set_verification(id, state)).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.with_db(|db| db.count_reports()).await
    }
}
