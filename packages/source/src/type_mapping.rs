//! Incident kind classification.
//!
//! Maps free-text incident fields to the coarse [`IncidentKind`]. No
//! upstream taxonomy is trusted; classification is keyword-based and
//! case-insensitive. Closure keywords are checked first because closure
//! descriptions routinely mention construction or generic traffic words as
//! well.

use traffic_map_incident_models::IncidentKind;

const CLOSURE_KEYWORDS: &[&str] = &["closed", "closure", "lanes closed"];

const CONSTRUCTION_KEYWORDS: &[&str] = &[
    "construction",
    "road work",
    "work zone",
    "maintenance",
    "repair",
];

/// Classifies an incident from its type and description texts.
///
/// All inputs are concatenated and matched together, so a closure mentioned
/// only in the full description still wins over a construction type.
#[must_use]
pub fn classify_kind(texts: &[&str]) -> IncidentKind {
    let lower = texts.join(" ").to_lowercase();

    if contains_any(&lower, CLOSURE_KEYWORDS) {
        return IncidentKind::Closure;
    }
    if contains_any(&lower, CONSTRUCTION_KEYWORDS) {
        return IncidentKind::Construction;
    }

    IncidentKind::TrafficOther
}

/// Checks if `haystack` contains any of the given `needles`.
fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
