//! Road and cross-street extraction from free-text descriptions.
//!
//! Descriptions look like `"I-405 N at Wilshire Blvd - lanes closed"` or
//! `"Closed on SR-2 between Glendale Ave and Verdugo Rd"`. Three shapes
//! are tried in order (`between`, `at`, `near`) and the first match wins.
//! When none match, only a standalone direction token is looked for.

use std::sync::LazyLock;

use regex::Regex;
use traffic_map_incident_models::CrossStreets;

/// Optional lead-in up to the last "on " before the road name
/// (e.g. "Accident on ").
const LEAD_IN: &str = r"(?:.*?\bon\s+)?";

/// A street name: anything up to a clause separator.
const NAME: &str = r"[^,;()\x{2013}\x{2014}]+?";

/// What may follow the final name in a clause.
const TERMINATOR: &str = r"\s*(?:[,;()\x{2013}\x{2014}]|\s-\s|\.(?:\s|$)|$)";

/// `"<road> between <from> and <to>"`.
static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){LEAD_IN}(?P<road>{NAME})\s+between\s+(?P<from>{NAME})\s+and\s+(?P<to>{NAME}){TERMINATOR}"
    ))
    .expect("valid regex")
});

/// `"<road> at <cross>"`.
static AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){LEAD_IN}(?P<road>{NAME})\s+at\s+(?P<cross>{NAME}){TERMINATOR}"
    ))
    .expect("valid regex")
});

/// `"<road> near <cross>"`.
static NEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){LEAD_IN}(?P<road>{NAME})\s+near\s+(?P<cross>{NAME}){TERMINATOR}"
    ))
    .expect("valid regex")
});

/// Standalone, upper-case direction token.
static DIRECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(NB|SB|EB|WB|N|S|E|W)\b").expect("valid regex"));

/// Which description shape matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadPattern {
    /// `"<road> between <from> and <to>"`
    Between,
    /// `"<road> at <cross>"`
    At,
    /// `"<road> near <cross>"`
    Near,
    /// No shape matched; at most a direction token was found.
    DirectionOnly,
}

/// Location details parsed out of a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadDescription {
    /// Which shape produced this result.
    pub pattern: RoadPattern,
    /// Affected road.
    pub road: Option<String>,
    /// Cross street for `at`/`near`.
    pub cross_street: Option<String>,
    /// Bounding cross streets for `between`.
    pub between: Option<CrossStreets>,
    /// Direction token, only searched for when no shape matched.
    pub direction: Option<String>,
}

/// Parses road, cross street(s) and direction from a description.
#[must_use]
pub fn parse_road_description(text: &str) -> RoadDescription {
    if let Some(caps) = BETWEEN_RE.captures(text)
        && let (Some(road), Some(from), Some(to)) = (
            capture(&caps, "road"),
            capture(&caps, "from"),
            capture(&caps, "to"),
        )
    {
        return RoadDescription {
            pattern: RoadPattern::Between,
            road: Some(road),
            cross_street: None,
            between: Some(CrossStreets { from, to }),
            direction: None,
        };
    }

    for (re, pattern) in [(&AT_RE, RoadPattern::At), (&NEAR_RE, RoadPattern::Near)] {
        if let Some(caps) = re.captures(text)
            && let (Some(road), Some(cross)) = (capture(&caps, "road"), capture(&caps, "cross"))
        {
            return RoadDescription {
                pattern,
                road: Some(road),
                cross_street: Some(cross),
                between: None,
                direction: None,
            };
        }
    }

    RoadDescription {
        pattern: RoadPattern::DirectionOnly,
        road: None,
        cross_street: None,
        between: None,
        direction: DIRECTION_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

fn capture(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
    let value = caps.name(name)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}
