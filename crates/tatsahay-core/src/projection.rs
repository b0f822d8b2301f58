//! Materialized views for the presentation layer.
//!
//! Three view families are kept: the global feed, one profile feed per
//! author, and the aggregated map. A view remembers the invalidation
//! watermark it was computed for; it is stale as soon as the bus watermark
//! for its scope moves past that.
//!
//! Reads are stale-while-revalidate: a stale view is served as-is (flagged)
//! while a background refresh runs. Only a view that was never computed is
//! computed inline. The `*_fresh` variants wait until the view has caught
//! up with every write signalled before the call.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tatsahay_shared::map::aggregate_map_points;
use tatsahay_shared::{MapPoint, Report, UserId};
use tatsahay_store::{ReportFilter, ReportSort, StoreError, Visibility};

use crate::invalidation::{InvalidationBus, Scope};
use crate::store::IncidentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionPolicy {
    /// Whether reports awaiting moderation show up in the global feed.
    pub feed_includes_unverified: bool,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        Self {
            feed_includes_unverified: true,
        }
    }
}

/// What a reader gets back. Never an error: a failed refresh keeps the
/// previous items and sets `error`.
#[derive(Debug, Clone)]
pub struct ViewSnapshot<T> {
    pub items: Arc<Vec<T>>,
    /// Watermark the items were computed for.
    pub generation: u64,
    pub stale: bool,
    pub error: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl<T> ViewSnapshot<T> {
    fn cold() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            generation: 0,
            stale: true,
            error: None,
            refreshed_at: None,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct Installed<T> {
    items: Arc<Vec<T>>,
    generation: u64,
    error: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl<T> Installed<T> {
    fn is_fresh(&self, watermark: u64) -> bool {
        self.error.is_none() && self.generation >= watermark
    }

    fn snapshot(&self, watermark: u64) -> ViewSnapshot<T> {
        ViewSnapshot {
            items: Arc::clone(&self.items),
            generation: self.generation,
            stale: !self.is_fresh(watermark),
            error: self.error.clone(),
            refreshed_at: self.refreshed_at,
        }
    }
}

/// One cached view.
struct Slot<T> {
    current: RwLock<Option<Installed<T>>>,
    /// Serializes recomputations of this view.
    refresh: Mutex<()>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    fn snapshot(&self, watermark: u64) -> Option<ViewSnapshot<T>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|installed| installed.snapshot(watermark))
    }

    fn is_fresh(&self, watermark: u64) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|installed| installed.is_fresh(watermark))
    }

    fn is_materialized(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn install(&self, items: Vec<T>, generation: u64) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        // Never replace a view computed for a later write.
        if current.as_ref().is_some_and(|c| c.generation > generation) {
            return;
        }
        *current = Some(Installed {
            items: Arc::new(items),
            generation,
            error: None,
            refreshed_at: Some(Utc::now()),
        });
    }

    fn record_error(&self, error: String) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        match current.as_mut() {
            Some(installed) => installed.error = Some(error),
            None => {
                *current = Some(Installed {
                    items: Arc::new(Vec::new()),
                    generation: 0,
                    error: Some(error),
                    refreshed_at: None,
                })
            }
        }
    }
}

/// Bring `slot` up to the current watermark of `scope`.
async fn refresh_slot<T, F, Fut>(
    slot: &Slot<T>,
    bus: &InvalidationBus,
    scope: &Scope,
    compute: F,
) -> ViewSnapshot<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let _guard = slot.refresh.lock().await;

    // The watermark is read before querying: every write it covers has
    // already committed, so the query is guaranteed to see it.
    let target = bus.watermark(scope);
    if !slot.is_fresh(target) {
        match compute().await {
            Ok(items) => {
                debug!(scope = %scope, generation = target, items = items.len(), "view refreshed");
                slot.install(items, target);
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "view refresh failed, keeping last known good");
                slot.record_error(e.to_string());
            }
        }
    }

    slot.snapshot(bus.watermark(scope))
        .unwrap_or_else(ViewSnapshot::cold)
}

struct CacheInner {
    store: Arc<dyn IncidentStore>,
    bus: InvalidationBus,
    policy: ProjectionPolicy,
    all: Slot<Report>,
    map: Slot<MapPoint>,
    users: RwLock<HashMap<UserId, Arc<Slot<Report>>>>,
    /// Scopes with a background refresh in flight.
    pending: StdMutex<HashSet<Scope>>,
}

impl CacheInner {
    fn user_slot(&self, author: &UserId) -> Arc<Slot<Report>> {
        if let Some(slot) = self.existing_user_slot(author) {
            return slot;
        }
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            users
                .entry(author.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn existing_user_slot(&self, author: &UserId) -> Option<Arc<Slot<Report>>> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(author)
            .cloned()
    }

    fn is_materialized(&self, scope: &Scope) -> bool {
        match scope {
            Scope::All => self.all.is_materialized(),
            Scope::Map => self.map.is_materialized(),
            Scope::User(author) => self
                .existing_user_slot(author)
                .is_some_and(|slot| slot.is_materialized()),
        }
    }

    fn materialized_scopes(&self) -> Vec<Scope> {
        let mut scopes = Vec::new();
        if self.all.is_materialized() {
            scopes.push(Scope::All);
        }
        if self.map.is_materialized() {
            scopes.push(Scope::Map);
        }
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        scopes.extend(
            users
                .iter()
                .filter(|(_, slot)| slot.is_materialized())
                .map(|(author, _)| Scope::User(author.clone())),
        );
        scopes
    }

    async fn compute_all(&self) -> Result<Vec<Report>, StoreError> {
        let visibility = if self.policy.feed_includes_unverified {
            Visibility::Public
        } else {
            Visibility::VerifiedOnly
        };
        self.store
            .list_all(
                ReportFilter::default().with_visibility(visibility),
                ReportSort::NewestFirst,
            )
            .await
    }

    async fn compute_map(&self) -> Result<Vec<MapPoint>, StoreError> {
        let verified = self
            .store
            .list_all(
                ReportFilter::default().with_visibility(Visibility::VerifiedOnly),
                ReportSort::NewestFirst,
            )
            .await?;
        Ok(aggregate_map_points(&verified))
    }

    async fn refresh_all(&self) -> ViewSnapshot<Report> {
        refresh_slot(&self.all, &self.bus, &Scope::All, || self.compute_all()).await
    }

    async fn refresh_user(&self, author: &UserId) -> ViewSnapshot<Report> {
        let slot = self.user_slot(author);
        let scope = Scope::User(author.clone());
        refresh_slot(&slot, &self.bus, &scope, || {
            self.store.list_by_author(author)
        })
        .await
    }

    async fn refresh_map(&self) -> ViewSnapshot<MapPoint> {
        refresh_slot(&self.map, &self.bus, &Scope::Map, || self.compute_map()).await
    }

    /// Refresh `scope` once. Returns the generation reached and whether the
    /// attempt failed.
    async fn refresh_scope(&self, scope: &Scope) -> (u64, bool) {
        match scope {
            Scope::All => {
                let view = self.refresh_all().await;
                (view.generation, view.error.is_some())
            }
            Scope::User(author) => {
                let view = self.refresh_user(author).await;
                (view.generation, view.error.is_some())
            }
            Scope::Map => {
                let view = self.refresh_map().await;
                (view.generation, view.error.is_some())
            }
        }
    }
}

/// Start a background refresh of `scope` unless one is already in flight.
///
/// The task keeps going while new signals land during its computation and
/// stops after a failed attempt; the next read or signal retries.
fn schedule_refresh(inner: &Arc<CacheInner>, scope: Scope) {
    {
        let mut pending = inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.insert(scope.clone()) {
            return;
        }
    }

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        loop {
            let (generation, failed) = inner.refresh_scope(&scope).await;

            let mut pending = inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            if failed || generation >= inner.bus.watermark(&scope) {
                pending.remove(&scope);
                break;
            }
        }
    });
}

/// Feed, profile and map views kept consistent with the incident store.
#[derive(Clone)]
pub struct ProjectionCache {
    inner: Arc<CacheInner>,
}

impl ProjectionCache {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        bus: InvalidationBus,
        policy: ProjectionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                bus,
                policy,
                all: Slot::new(),
                map: Slot::new(),
                users: RwLock::new(HashMap::new()),
                pending: StdMutex::new(HashSet::new()),
            }),
        }
    }

    pub fn policy(&self) -> ProjectionPolicy {
        self.inner.policy
    }

    fn serve<T>(&self, cached: Option<ViewSnapshot<T>>, scope: Scope) -> Option<ViewSnapshot<T>> {
        let snapshot = cached?;
        if snapshot.stale {
            schedule_refresh(&self.inner, scope);
        }
        Some(snapshot)
    }

    /// Global feed, newest first. Rejected reports never appear.
    pub async fn all_reports_view(&self) -> ViewSnapshot<Report> {
        let cached = self
            .inner
            .all
            .snapshot(self.inner.bus.watermark(&Scope::All));
        match self.serve(cached, Scope::All) {
            Some(snapshot) => snapshot,
            None => self.inner.refresh_all().await,
        }
    }

    pub async fn all_reports_view_fresh(&self) -> ViewSnapshot<Report> {
        self.inner.refresh_all().await
    }

    /// Every report by `author`, whatever its moderation state.
    pub async fn user_reports_view(&self, author: &UserId) -> ViewSnapshot<Report> {
        let scope = Scope::User(author.clone());
        let cached = self
            .inner
            .user_slot(author)
            .snapshot(self.inner.bus.watermark(&scope));
        match self.serve(cached, scope) {
            Some(snapshot) => snapshot,
            None => self.inner.refresh_user(author).await,
        }
    }

    pub async fn user_reports_view_fresh(&self, author: &UserId) -> ViewSnapshot<Report> {
        self.inner.refresh_user(author).await
    }

    /// Verified reports aggregated by location.
    pub async fn map_points_view(&self) -> ViewSnapshot<MapPoint> {
        let cached = self
            .inner
            .map
            .snapshot(self.inner.bus.watermark(&Scope::Map));
        match self.serve(cached, Scope::Map) {
            Some(snapshot) => snapshot,
            None => self.inner.refresh_map().await,
        }
    }

    pub async fn map_points_view_fresh(&self) -> ViewSnapshot<MapPoint> {
        self.inner.refresh_map().await
    }

    /// Recompute materialized views as soon as a signal arrives instead of
    /// waiting for the next read.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped or the bus closes. Views nobody has read yet are skipped.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let mut rx = self.inner.bus.subscribe();
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            info!("projection listener started");
            loop {
                let signalled = match rx.recv().await {
                    Ok(signal) => Some(signal.scopes),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "projection listener lagged, refreshing every view");
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(inner) = weak.upgrade() else { break };
                let scopes = signalled.unwrap_or_else(|| inner.materialized_scopes());
                for scope in scopes {
                    if inner.is_materialized(&scope) {
                        schedule_refresh(&inner, scope);
                    }
                }
            }
            info!("projection listener stopped");
        })
    }
}
