//! # tatsahay-shared
//!
//! Types shared by every Tat-Sahay crate: the report entity model and its
//! validation rules, the derived map point shape, and common constants.

pub mod constants;
pub mod error;
pub mod map;
pub mod report;
pub mod types;

pub use error::ValidationError;
pub use map::MapPoint;
pub use report::{
    validate_report, ImageInput, Report, ReportCandidate, UnsavedReport, ValidReport,
};
pub use types::{Coordinates, DisasterType, ReportId, Severity, User, UserId, VerificationState};
