//! Field recommendations derived from detected pests.

use crate::types::{dedup_recommendations, Detection};

/// Advice that applies to any infestation.
const BASE: [&str; 4] = [
    "Isolate the infected area immediately",
    "Apply insecticide at the recommended dose",
    "Monitor the field every 2-3 days",
    "Improve the paddy drainage system",
];

/// Pest-specific advice, keyed by the names the detection model reports.
const SPECIFIC: [(&str, [&str; 2]); 4] = [
    (
        "Wereng Batang Coklat",
        ["Plant planthopper-resistant varieties", "Apply imidacloprid"],
    ),
    (
        "Penggerek Batang Padi",
        ["Clear rice stubble after harvest", "Synchronize planting across fields"],
    ),
    (
        "Walang Sangit",
        ["Set up light traps", "Spray in the early morning or late afternoon"],
    ),
    (
        "Ulat Grayak Padi",
        ["Use Bacillus thuringiensis", "Remove weeds around the field"],
    ),
];

/// Recommendations for a set of detections: base advice first, then advice
/// for each recognised pest in detection order, without duplicates and capped
/// at six entries. A clean field gets no advice.
pub fn for_detections(detections: &[Detection]) -> Vec<String> {
    if detections.is_empty() {
        return Vec::new();
    }

    let specific = detections.iter().flat_map(|detection| {
        SPECIFIC
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(detection.name.trim()))
            .flat_map(|(_, advice)| advice.iter())
    });

    dedup_recommendations(BASE.iter().chain(specific).map(|s| s.to_string()))
}
