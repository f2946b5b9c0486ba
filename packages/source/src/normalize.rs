//! Canonicalization of raw feed records into [`Incident`] values.
//!
//! Normalization is pure and never fails: a record without a usable
//! location is skipped and counted, everything else is coerced to a
//! sensible default. Output is de-duplicated by id (first occurrence in
//! feed order wins) and sorted most severe first, then nearest to the
//! query center.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use traffic_map_geography::haversine_miles;
use traffic_map_geography_models::GeoPoint;
use traffic_map_incident_models::{Incident, Severity, by_severity_then_center_distance};
use traffic_map_source_models::RawIncidentRecord;

use crate::fields::{DEFAULT_ALIASES, FieldAliases};
use crate::road_parsing::parse_road_description;
use crate::type_mapping::classify_kind;

/// Number of description characters mixed into a synthesized id.
const ID_DESCRIPTION_PREFIX_CHARS: usize = 36;

/// Number of hash bytes kept in a synthesized id.
const ID_HASH_BYTES: usize = 8;

/// Short description used when a record carries no text at all.
const FALLBACK_DESCRIPTION: &str = "Traffic incident";

/// Counters from one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Records received.
    pub total: usize,
    /// Records dropped for lack of a usable location.
    pub skipped: usize,
    /// Records dropped because an earlier record had the same id.
    pub duplicates: usize,
}

/// Normalizes raw records around `center` with the default aliases.
#[must_use]
pub fn normalize(raw: &[RawIncidentRecord], center: GeoPoint) -> Vec<Incident> {
    normalize_with_stats(raw, center, &DEFAULT_ALIASES).0
}

/// Normalizes raw records and reports what was dropped.
#[must_use]
pub fn normalize_with_stats(
    raw: &[RawIncidentRecord],
    center: GeoPoint,
    aliases: &FieldAliases,
) -> (Vec<Incident>, NormalizeStats) {
    let mut stats = NormalizeStats {
        total: raw.len(),
        ..NormalizeStats::default()
    };
    let mut seen = BTreeSet::new();
    let mut incidents = Vec::with_capacity(raw.len());

    for record in raw {
        let Some(incident) = normalize_record(record, center, aliases) else {
            stats.skipped += 1;
            continue;
        };
        if !seen.insert(incident.id.clone()) {
            stats.duplicates += 1;
            continue;
        }
        incidents.push(incident);
    }

    incidents.sort_by(by_severity_then_center_distance);

    log::debug!(
        "normalized {} of {} records ({} skipped, {} duplicates)",
        incidents.len(),
        stats.total,
        stats.skipped,
        stats.duplicates,
    );

    (incidents, stats)
}

/// Normalizes a single record. Returns `None` if the record has no
/// resolvable location.
#[must_use]
pub fn normalize_record(
    record: &RawIncidentRecord,
    center: GeoPoint,
    aliases: &FieldAliases,
) -> Option<Incident> {
    let location = aliases.location(record)?;
    let severity = aliases.severity(record).unwrap_or_default();

    let kind_label = aliases.kind_label(record);
    let short = aliases.short_description(record);
    let full = aliases.full_description(record);
    let location_text = aliases.location_description(record);

    let kind = classify_kind(&[
        kind_label.unwrap_or_default(),
        short.unwrap_or_default(),
        full.unwrap_or_default(),
    ]);

    let road = location_text
        .or(short)
        .or(full)
        .map(parse_road_description);

    let short_description = short
        .or(full)
        .or(kind_label)
        .unwrap_or(FALLBACK_DESCRIPTION)
        .to_string();

    let id = aliases
        .id(record)
        .unwrap_or_else(|| synthesize_id(severity, location, &short_description));

    let (road, cross_street, between, direction) = road.map_or((None, None, None, None), |r| {
        (r.road, r.cross_street, r.between, r.direction)
    });

    Some(Incident {
        id,
        severity,
        location,
        kind,
        short_description,
        full_description: full.map(str::to_string),
        road,
        cross_street,
        between,
        direction,
        start_time: aliases.start_time(record),
        end_time: aliases.end_time(record),
        distance_from_center_miles: haversine_miles(center, location),
        delay_minutes: aliases.delay_minutes(record),
        route_offset_miles: None,
    })
}

/// Derives a stable id from severity, 5-decimal coordinates and the first
/// characters of the description.
///
/// Two fetches of the same incident produce the same id even when the
/// feed omits identifiers, which is what de-duplication keys on.
#[must_use]
pub fn synthesize_id(severity: Severity, location: GeoPoint, description: &str) -> String {
    let prefix: String = description
        .chars()
        .take(ID_DESCRIPTION_PREFIX_CHARS)
        .collect();
    let material = format!(
        "{}|{:.5}|{:.5}|{prefix}",
        severity.value(),
        location.lat,
        location.lng,
    );
    let digest = Sha256::digest(material.as_bytes());
    format!("syn-{}", hex::encode(&digest[..ID_HASH_BYTES]))
}
