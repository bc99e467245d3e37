//! Request and response bodies exchanged with the detection service.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Detection, DetectionRecord};

/// Response from GET /api/status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub authenticated: bool,
}

impl ServiceStatus {
    /// Usable for detection only when both flags are set.
    pub fn is_ready(&self) -> bool {
        self.connected && self.authenticated
    }
}

/// Request body for POST /api/connect
#[derive(Serialize)]
pub(crate) struct ConnectRequest<'a> {
    pub password: &'a str,
}

/// Response shared by connect, disconnect and clear-history
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageResponse {
    /// Absent on endpoints that cannot fail (disconnect)
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: String,
}

/// Response from POST /api/upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Rendered output image, usually a data URL
    #[serde(default)]
    pub result_image: Option<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// One item of GET /api/history.
///
/// The service has shipped two shapes: full records (`filename`, RFC 3339
/// `timestamp`, camelCase fields, optionally nested under `results`) and the
/// legacy log (`nama_file`, `waktu` as local `YYYY-MM-DD HH:MM:SS`, `path`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "nama_file")]
    pub filename: String,
    #[serde(default, alias = "waktu")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub results: Option<EntryResults>,
    #[serde(default, alias = "processingTime")]
    pub processing_time_seconds: Option<serde_json::Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, alias = "path", alias = "result_image")]
    pub result_image: Option<String>,
}

/// Nested result block used by older clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryResults {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl HistoryEntry {
    /// Normalize into a [`DetectionRecord`].
    ///
    /// Returns `None` when the timestamp is missing or unreadable.
    pub fn into_record(self) -> Option<DetectionRecord> {
        let timestamp = self.timestamp.as_deref().and_then(parse_timestamp)?;

        let (detections, recommendations) = match self.results {
            Some(results) if self.detections.is_empty() => {
                let recs = if self.recommendations.is_empty() {
                    results.recommendations
                } else {
                    self.recommendations
                };
                (results.detections, recs)
            }
            _ => (self.detections, self.recommendations),
        };

        let processing_time = self
            .processing_time_seconds
            .as_ref()
            .and_then(number_or_numeric_string)
            .unwrap_or(0.0);

        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Some(DetectionRecord::with_id(
            id,
            self.filename,
            timestamp,
            detections,
            processing_time,
            recommendations,
            self.result_image.unwrap_or_default(),
        ))
    }
}

/// Parse RFC 3339, or a naive local `YYYY-MM-DD HH:MM:SS` / ISO timestamp.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
    })
}

fn number_or_numeric_string(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_readiness() {
        let status: ServiceStatus =
            serde_json::from_str(r#"{"connected": true, "authenticated": false}"#).unwrap();
        assert!(!status.is_ready());

        let status: ServiceStatus = serde_json::from_str(
            r#"{"connected": true, "authenticated": true, "server": "10.0.0.2:12345"}"#,
        )
        .unwrap();
        assert!(status.is_ready());
    }

    #[test]
    fn test_upload_response_without_detections() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"success": true, "message": "ok", "result_image": null, "filename": "a.jpg", "size": 10}"#,
        )
        .unwrap();
        assert!(response.success);
        assert!(response.detections.is_empty());
        assert!(response.result_image.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2026-10-17T03:04:05Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-17T03:04:05+00:00");

        let ts = parse_timestamp("2026-10-17T10:04:05+07:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-17T03:04:05+00:00");

        assert!(parse_timestamp("2026-10-17 10:04:05").is_some());
        assert!(parse_timestamp("2026-10-17T10:04:05.120").is_some());
        assert!(parse_timestamp("kemarin").is_none());
    }

    #[test]
    fn test_legacy_entry_normalizes() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{
                "nama_file": "padi.jpg",
                "path": "hasil_identifikasi/hasil_padi.jpg",
                "waktu": "2026-10-17 08:30:00",
                "timing": {"total": 1.5}
            }"#,
        )
        .unwrap();
        let record = entry.into_record().unwrap();
        assert_eq!(record.filename(), "padi.jpg");
        assert_eq!(record.result_image(), "hasil_identifikasi/hasil_padi.jpg");
        assert_eq!(record.total_detections(), 0);
        assert!(!record.id().is_empty());
    }

    #[test]
    fn test_nested_results_entry_normalizes() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{
                "id": "1760000000000",
                "filename": "wereng.png",
                "timestamp": "2026-10-17T01:00:00.000Z",
                "results": {
                    "detections": [
                        {"name": "Wereng Batang Coklat", "confidence": 91},
                        {"name": "Walang Sangit", "confidence": 84}
                    ],
                    "totalDetections": 2,
                    "avgConfidence": 87,
                    "recommendations": ["Pasang perangkap cahaya"]
                },
                "processingTime": "2.4",
                "resultImage": "data:image/png;base64,AAAA"
            }"#,
        )
        .unwrap();
        let record = entry.into_record().unwrap();
        assert_eq!(record.id(), "1760000000000");
        assert_eq!(record.total_detections(), 2);
        assert_eq!(record.avg_confidence(), 87);
        assert_eq!(record.processing_time_seconds(), 2.4);
        assert_eq!(record.recommendations().len(), 1);
    }

    #[test]
    fn test_entry_without_timestamp_is_dropped() {
        let entry: HistoryEntry = serde_json::from_str(r#"{"filename": "x.jpg"}"#).unwrap();
        assert!(entry.into_record().is_none());
    }
}
