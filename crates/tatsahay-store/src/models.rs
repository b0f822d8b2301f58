//! Query parameters for report listings.
//!
//! The report records themselves live in `tatsahay-shared` so that every
//! layer agrees on one shape.

use serde::{Deserialize, Serialize};
use tatsahay_shared::{DisasterType, UserId};

/// Which verification states a listing includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Every report regardless of moderation.
    Any,
    /// Everything except rejected reports.
    #[default]
    Public,
    /// Only reports a moderator verified.
    VerifiedOnly,
}

/// Ordering of a listing. Both directions break `created_at` ties by `id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportSort {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub disaster_type: Option<DisasterType>,
    pub author: Option<UserId>,
    pub visibility: Visibility,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl ReportFilter {
    pub fn by_author(author: &UserId) -> Self {
        Self {
            author: Some(author.clone()),
            visibility: Visibility::Any,
            ..Self::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}
