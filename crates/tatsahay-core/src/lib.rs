//! # tatsahay-core
//!
//! The incident pipeline: how a submitted report is validated, gets its
//! photo stored, lands in the incident store, and becomes visible in the
//! feed, profile and map projections.
//!
//! - [`pipeline`] runs one submission attempt through its state machine
//! - [`invalidation`] carries "this view is stale" signals to the cache
//! - [`projection`] keeps the materialized views consistent with the store
//! - [`store`], [`media`] and [`auth`] are the seams to the collaborators

pub mod auth;
pub mod error;
pub mod invalidation;
pub mod media;
pub mod moderation;
pub mod pipeline;
pub mod projection;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthProvider, Session, StaticAuth};
pub use error::{AuthError, FailureReason, MediaError};
pub use invalidation::{Invalidation, InvalidationBus, Scope};
pub use media::MediaStore;
pub use moderation::Moderation;
pub use pipeline::{PipelineConfig, SubmissionHandle, SubmissionPipeline, SubmissionState};
pub use projection::{ProjectionCache, ProjectionPolicy, ViewSnapshot};
pub use store::{IncidentStore, SqliteIncidentStore};
