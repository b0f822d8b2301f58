//! Verification changes made by moderators.

use std::sync::Arc;

use tracing::info;

use tatsahay_shared::{Report, ReportId, VerificationState};
use tatsahay_store::StoreError;

use crate::invalidation::InvalidationBus;
use crate::store::IncidentStore;

#[derive(Clone)]
pub struct Moderation {
    store: Arc<dyn IncidentStore>,
    bus: InvalidationBus,
}

impl Moderation {
    pub fn new(store: Arc<dyn IncidentStore>, bus: InvalidationBus) -> Self {
        Self { store, bus }
    }

    /// Move `id` to `state` and invalidate every view showing it.
    pub async fn apply(
        &self,
        id: ReportId,
        state: VerificationState,
    ) -> Result<Report, StoreError> {
        let updated = self.store.set_verification(id, state).await?;
        info!(report = %id, state = state.as_str(), "verification changed");
        self.bus.report_changed(&updated);
        Ok(updated)
    }
}
