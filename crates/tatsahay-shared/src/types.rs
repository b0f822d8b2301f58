use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// User identity as issued by the auth provider, e.g. `usr_12345`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// An authenticated account as seen by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DisasterType {
    Flood,
    Cyclone,
    Tsunami,
    Storm,
    Earthquake,
    Landslide,
    Other,
}

impl DisasterType {
    pub const ALL: [DisasterType; 7] = [
        Self::Flood,
        Self::Cyclone,
        Self::Tsunami,
        Self::Storm,
        Self::Earthquake,
        Self::Landslide,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flood => "Flood",
            Self::Cyclone => "Cyclone",
            Self::Tsunami => "Tsunami",
            Self::Storm => "Storm",
            Self::Earthquake => "Earthquake",
            Self::Landslide => "Landslide",
            Self::Other => "Other",
        }
    }

    /// Hex colour used for map overlays of this hazard.
    pub fn color_tag(&self) -> &'static str {
        match self {
            Self::Flood => "#3b82f6",
            Self::Cyclone => "#8b5cf6",
            Self::Tsunami => "#0ea5e9",
            Self::Storm => "#f59e0b",
            Self::Earthquake => "#b45309",
            Self::Landslide => "#65a30d",
            Self::Other => "#64748b",
        }
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisasterType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::InvalidEnum {
                field: "disasterType",
                value: trimmed.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ValidationError::InvalidEnum {
                field: "severity",
                value: s.trim().to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationState {
    #[default]
    Unverified,
    Verified,
    Rejected,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "Unverified",
            Self::Verified => "Verified",
            Self::Rejected => "Rejected",
        }
    }
}

impl FromStr for VerificationState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unverified" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ValidationError::InvalidEnum {
                field: "verificationState",
                value: s.trim().to_string(),
            }),
        }
    }
}

/// WGS84 position of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::OutOfRange { field: "latitude" });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::OutOfRange { field: "longitude" });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disaster_type_parses_case_insensitively() {
        assert_eq!("flood".parse::<DisasterType>().unwrap(), DisasterType::Flood);
        assert_eq!(" CYCLONE ".parse::<DisasterType>().unwrap(), DisasterType::Cyclone);
    }

    #[test]
    fn unknown_disaster_type_is_invalid_enum() {
        let err = "Meteor".parse::<DisasterType>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidEnum {
                field: "disasterType",
                value: "Meteor".into()
            }
        );
    }

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(19.07, 72.87).is_ok());
        assert_eq!(
            Coordinates::new(91.0, 0.0).unwrap_err(),
            ValidationError::OutOfRange { field: "latitude" }
        );
        assert_eq!(
            Coordinates::new(0.0, -181.0).unwrap_err(),
            ValidationError::OutOfRange { field: "longitude" }
        );
    }

    #[test]
    fn verification_defaults_to_unverified() {
        assert_eq!(VerificationState::default(), VerificationState::Unverified);
    }
}
