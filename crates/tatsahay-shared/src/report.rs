//! The report entity model.
//!
//! A report travels through three shapes: the raw [`ReportCandidate`] typed
//! in by a user, the [`ValidReport`] that passed [`validate_report`], and the
//! canonical [`Report`] returned by the incident store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::{Coordinates, DisasterType, ReportId, Severity, UserId, VerificationState};

/// Photo attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Raw bytes that still need to go to the media store.
    Upload { data: Bytes, content_type: String },
    /// Reference to media that is already stored.
    Stored(String),
}

impl ImageInput {
    fn is_empty(&self) -> bool {
        match self {
            Self::Upload { data, .. } => data.is_empty(),
            Self::Stored(reference) => reference.trim().is_empty(),
        }
    }
}

/// Unvalidated form input. Every field is optional so that a missing value
/// can be reported by name instead of failing deserialization.
#[derive(Debug, Clone, Default)]
pub struct ReportCandidate {
    pub disaster_type: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    /// Raw form text; parsed during validation.
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub image: Option<ImageInput>,
}

/// A candidate that satisfied every field rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub disaster_type: DisasterType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub coordinates: Option<Coordinates>,
    pub image: ImageInput,
}

impl ValidReport {
    /// Build the store input once the image has a confirmed reference.
    pub fn to_unsaved(
        &self,
        author_id: &UserId,
        image_ref: String,
        submission_key: Uuid,
    ) -> UnsavedReport {
        UnsavedReport {
            submission_key,
            author_id: author_id.clone(),
            disaster_type: self.disaster_type,
            location: self.location.clone(),
            description: self.description.clone(),
            severity: self.severity,
            coordinates: self.coordinates,
            image_ref,
        }
    }
}

/// Everything the store needs to create a report. `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsavedReport {
    /// Idempotency key of the submission attempt.
    pub submission_key: Uuid,
    pub author_id: UserId,
    pub disaster_type: DisasterType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub coordinates: Option<Coordinates>,
    pub image_ref: String,
}

/// A stored incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub author_id: UserId,
    pub disaster_type: DisasterType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub coordinates: Option<Coordinates>,
    /// `None` once the media has been purged.
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verification_state: VerificationState,
    #[serde(skip)]
    pub submission_key: Uuid,
}

impl Report {
    /// Total order used by every time-sorted projection: `(created_at, id)`.
    pub fn order_key(&self) -> (DateTime<Utc>, ReportId) {
        (self.created_at, self.id)
    }

    pub fn is_public(&self) -> bool {
        self.verification_state != VerificationState::Rejected
    }
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// A blank coordinate counts as absent.
fn coordinate(value: Option<&str>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// Check a candidate against the field rules and normalize it.
///
/// Required fields are checked in the order disaster type, location,
/// description, image; the first one missing is reported. Location and
/// description are trimmed and otherwise left untouched.
pub fn validate_report(candidate: &ReportCandidate) -> Result<ValidReport, ValidationError> {
    let disaster_type: DisasterType =
        required(candidate.disaster_type.as_deref(), "disasterType")?.parse()?;
    let location = required(candidate.location.as_deref(), "location")?;
    let description = required(candidate.description.as_deref(), "description")?;

    let image = match &candidate.image {
        Some(image) if !image.is_empty() => image.clone(),
        _ => return Err(ValidationError::MissingField("image")),
    };

    let severity = match candidate.severity.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.parse()?,
        _ => Severity::default(),
    };

    let latitude = coordinate(candidate.latitude.as_deref(), "latitude")?;
    let longitude = coordinate(candidate.longitude.as_deref(), "longitude")?;
    let coordinates = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)?),
        (Some(_), None) => return Err(ValidationError::MissingField("longitude")),
        (None, Some(_)) => return Err(ValidationError::MissingField("latitude")),
        (None, None) => None,
    };

    Ok(ValidReport {
        disaster_type,
        location,
        description,
        severity,
        coordinates,
        image,
    })
}
