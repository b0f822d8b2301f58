//! Map points: reports aggregated by declared location.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{BASE_RADIUS_METERS, MAP_POINT_ID_LEN};
use crate::report::Report;
use crate::types::{Coordinates, DisasterType, VerificationState};

/// One aggregated incident zone on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    pub id: String,
    pub name: String,
    /// Mean of the member coordinates, when any member carries them.
    pub center_coordinate: Option<Coordinates>,
    pub radius_meters: f64,
    pub color_tag: String,
    pub disaster_type: DisasterType,
    pub report_count: usize,
    pub latest_at: DateTime<Utc>,
}

/// Radius for a zone of `count` reports. Strictly increasing in `count`.
pub fn radius_for(count: usize) -> f64 {
    BASE_RADIUS_METERS * (count.max(1) as f64).sqrt()
}

fn location_key(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn point_id(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    hex::encode(hash.as_bytes())[..MAP_POINT_ID_LEN].to_string()
}

/// Group verified reports by location into map points.
///
/// Unverified and rejected reports are ignored. The dominant disaster type
/// of a group picks the colour; equal counts go to the type with the most
/// recent report. Output is ordered by latest activity, newest first.
pub fn aggregate_map_points(reports: &[Report]) -> Vec<MapPoint> {
    let mut groups: BTreeMap<String, Vec<&Report>> = BTreeMap::new();
    for report in reports
        .iter()
        .filter(|r| r.verification_state == VerificationState::Verified)
    {
        groups
            .entry(location_key(&report.location))
            .or_default()
            .push(report);
    }

    let mut points: Vec<MapPoint> = groups
        .into_iter()
        .filter_map(|(key, members)| build_point(&key, &members))
        .collect();

    points.sort_by(|a, b| b.latest_at.cmp(&a.latest_at).then_with(|| a.id.cmp(&b.id)));
    points
}

fn build_point(key: &str, members: &[&Report]) -> Option<MapPoint> {
    let newest = members.iter().max_by_key(|r| r.order_key())?;

    // type -> (count, most recent order key)
    let mut tally: HashMap<DisasterType, (usize, _)> = HashMap::new();
    for report in members {
        let entry = tally
            .entry(report.disaster_type)
            .or_insert((0, report.order_key()));
        entry.0 += 1;
        if report.order_key() > entry.1 {
            entry.1 = report.order_key();
        }
    }
    let (dominant, _) = tally
        .into_iter()
        .max_by(|(_, a), (_, b)| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))?;

    let located: Vec<Coordinates> = members.iter().filter_map(|r| r.coordinates).collect();
    let center_coordinate = if located.is_empty() {
        None
    } else {
        let n = located.len() as f64;
        Some(Coordinates {
            latitude: located.iter().map(|c| c.latitude).sum::<f64>() / n,
            longitude: located.iter().map(|c| c.longitude).sum::<f64>() / n,
        })
    };

    Some(MapPoint {
        id: point_id(key),
        name: newest.location.clone(),
        center_coordinate,
        radius_meters: radius_for(members.len()),
        color_tag: dominant.color_tag().to_string(),
        disaster_type: dominant,
        report_count: members.len(),
        latest_at: newest.created_at,
    })
}
