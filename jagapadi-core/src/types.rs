//! Core domain types for jagapadi
//!
//! | Term | Definition |
//! |------|------------|
//! | **Workflow state** | The phase that governs which actions are currently valid |
//! | **Session** | The connection/authentication relationship with the detection service |
//! | **Staged image** | The image currently selected, pending or under analysis |
//! | **Detection** | One identified pest instance with a confidence score |
//! | **Detection record** | The immutable result of one completed analysis run |
//! | **History log** | Bounded, persisted, most-recent-first sequence of records |
//! | **Daily stats** | Aggregates derived from history entries dated today |

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Largest image accepted for staging (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Number of records kept in the history log.
pub const HISTORY_CAPACITY: usize = 20;

/// Upper bound on recommendations carried by a record.
pub const MAX_RECOMMENDATIONS: usize = 6;

// ============================================
// Workflow
// ============================================

/// Phase of the detection workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowState {
    #[default]
    Initial,
    ImageReady,
    Processing,
    Results,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Initial => "initial",
            WorkflowState::ImageReady => "imageReady",
            WorkflowState::Processing => "processing",
            WorkflowState::Results => "results",
        }
    }

    /// Returns whether moving from `self` to `next` is an edge of the workflow.
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;

        matches!(
            (self, next),
            (Initial, ImageReady)
                | (ImageReady, Processing)
                | (ImageReady, Initial)
                | (Processing, Results)
                | (Processing, ImageReady) // submission failed
                | (Results, Initial)
                | (Results, ImageReady) // re-run a historical image
        )
    }

    /// Whether a staged image may exist in this state.
    pub fn holds_image(self) -> bool {
        !matches!(self, WorkflowState::Initial)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted after every successful workflow transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub previous: WorkflowState,
    pub current: WorkflowState,
}

// ============================================
// Session
// ============================================

/// Connection status with the remote detection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Images
// ============================================

/// A file picked by the user, before validation.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub filename: String,
    /// MIME type as reported by whoever selected the file
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The image currently selected for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// `data:<mime>;base64,...` URL for display
    pub data_url: String,
}

impl StagedImage {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ============================================
// Detections
// ============================================

/// One identified pest instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub name: String,
    /// Percentage in `0..=100`
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
}

impl Detection {
    /// Confidence values above 100 are clamped.
    pub fn new(name: impl Into<String>, confidence: u32) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.min(100) as u8,
        }
    }
}

/// Accepts any JSON number and clamps it into `0..=100`, rounding down.
fn deserialize_confidence<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_nan() {
        return Ok(0);
    }
    Ok(value.clamp(0.0, 100.0).floor() as u8)
}

/// Floor of the mean confidence, or 0 when there are no detections.
pub fn average_confidence(detections: &[Detection]) -> u8 {
    if detections.is_empty() {
        return 0;
    }
    let sum: u64 = detections.iter().map(|d| u64::from(d.confidence)).sum();
    (sum / detections.len() as u64) as u8
}

/// The immutable result of one completed detection.
///
/// Aggregates (`total_detections`, `avg_confidence`) are always derived from
/// `detections`, including when a record is deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRecord")]
pub struct DetectionRecord {
    id: String,
    filename: String,
    timestamp: DateTime<Utc>,
    detections: Vec<Detection>,
    total_detections: u32,
    avg_confidence: u8,
    processing_time_seconds: f64,
    recommendations: Vec<String>,
    result_image: String,
}

impl DetectionRecord {
    pub fn new(
        filename: impl Into<String>,
        timestamp: DateTime<Utc>,
        detections: Vec<Detection>,
        processing_time_seconds: f64,
        recommendations: Vec<String>,
        result_image: impl Into<String>,
    ) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            filename,
            timestamp,
            detections,
            processing_time_seconds,
            recommendations,
            result_image,
        )
    }

    pub fn with_id(
        id: impl Into<String>,
        filename: impl Into<String>,
        timestamp: DateTime<Utc>,
        detections: Vec<Detection>,
        processing_time_seconds: f64,
        recommendations: Vec<String>,
        result_image: impl Into<String>,
    ) -> Self {
        let total_detections = detections.len() as u32;
        let avg_confidence = average_confidence(&detections);
        Self {
            id: id.into(),
            filename: filename.into(),
            timestamp,
            detections,
            total_detections,
            avg_confidence,
            processing_time_seconds: round_tenths(processing_time_seconds),
            recommendations: dedup_recommendations(recommendations),
            result_image: result_image.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn total_detections(&self) -> u32 {
        self.total_detections
    }

    pub fn avg_confidence(&self) -> u8 {
        self.avg_confidence
    }

    pub fn processing_time_seconds(&self) -> f64 {
        self.processing_time_seconds
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    /// Reference to the rendered output image (usually a data URL).
    pub fn result_image(&self) -> &str {
        &self.result_image
    }
}

/// On-disk shape of a record; derived fields are ignored on read.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: String,
    filename: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    processing_time_seconds: f64,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    result_image: String,
}

impl From<StoredRecord> for DetectionRecord {
    fn from(stored: StoredRecord) -> Self {
        DetectionRecord::with_id(
            stored.id,
            stored.filename,
            stored.timestamp,
            stored.detections,
            stored.processing_time_seconds,
            stored.recommendations,
            stored.result_image,
        )
    }
}

/// Round to one decimal place, never negative.
pub fn round_tenths(seconds: f64) -> f64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0.0;
    }
    (seconds * 10.0).round() / 10.0
}

/// Keep the first occurrence of each recommendation, at most [`MAX_RECOMMENDATIONS`].
pub fn dedup_recommendations<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if out.len() == MAX_RECOMMENDATIONS {
            break;
        }
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ============================================
// Daily stats
// ============================================

/// Aggregates over the records dated on one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    /// Sum of `total_detections`
    pub detections: u32,
    /// Mean `avg_confidence` rounded to the nearest integer, 0 when nothing matched
    pub accuracy: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use WorkflowState::*;

        assert!(Initial.can_transition_to(ImageReady));
        assert!(Processing.can_transition_to(ImageReady));
        assert!(Results.can_transition_to(ImageReady));
        assert!(!Initial.can_transition_to(Processing));
        assert!(!Initial.can_transition_to(Initial));
        assert!(!Processing.can_transition_to(Initial));
        assert!(!ImageReady.can_transition_to(ImageReady));
        assert!(!Results.can_transition_to(Processing));
    }

    #[test]
    fn test_average_confidence_floors() {
        let detections = vec![
            Detection::new("Walang Sangit", 90),
            Detection::new("Walang Sangit", 71),
        ];
        assert_eq!(average_confidence(&detections), 80);
        assert_eq!(average_confidence(&[]), 0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Detection::new("x", 250).confidence, 100);

        let d: Detection = serde_json::from_str(r#"{"name":"x","confidence":87.9}"#).unwrap();
        assert_eq!(d.confidence, 87);
        let d: Detection = serde_json::from_str(r#"{"name":"x","confidence":-4}"#).unwrap();
        assert_eq!(d.confidence, 0);
    }

    #[test]
    fn test_record_derives_aggregates() {
        let record = DetectionRecord::new(
            "sawah.jpg",
            Utc::now(),
            vec![Detection::new("a", 90), Detection::new("b", 70)],
            1.26,
            vec!["x".into(), "x".into(), "y".into()],
            "data:image/jpeg;base64,AAAA",
        );
        assert_eq!(record.total_detections(), 2);
        assert_eq!(record.avg_confidence(), 80);
        assert_eq!(record.processing_time_seconds(), 1.3);
        assert_eq!(record.recommendations(), ["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_deserialized_record_recomputes_aggregates() {
        let json = r#"{
            "id": "abc",
            "filename": "f.png",
            "timestamp": "2026-10-17T01:02:03Z",
            "detections": [{"name": "a", "confidence": 50}],
            "totalDetections": 9,
            "avgConfidence": 99,
            "processingTimeSeconds": 2.0,
            "recommendations": [],
            "resultImage": ""
        }"#;
        let record: DetectionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id(), "abc");
        assert_eq!(record.total_detections(), 1);
        assert_eq!(record.avg_confidence(), 50);
    }

    #[test]
    fn test_dedup_recommendations_caps_at_six() {
        let items = (0..10).map(|i| format!("r{}", i % 8));
        let out = dedup_recommendations(items);
        assert_eq!(out.len(), MAX_RECOMMENDATIONS);
        assert_eq!(out[0], "r0");
    }

    #[test]
    fn test_round_tenths() {
        assert_eq!(round_tenths(2.349), 2.3);
        assert_eq!(round_tenths(-1.0), 0.0);
        assert_eq!(round_tenths(f64::NAN), 0.0);
    }
}
