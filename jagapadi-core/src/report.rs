//! Text rendering of detection records.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::types::DetectionRecord;

const RULE: &str = "==========================================";
const THIN_RULE: &str = "-----------------------------------------";

/// Fixed-format plain-text report for one record.
pub fn generate_report(record: &DetectionRecord) -> String {
    let timestamp = record
        .timestamp()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S");

    let mut report = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut report, record, &timestamp.to_string());
    report
}

fn write_report(out: &mut String, record: &DetectionRecord, timestamp: &str) -> std::fmt::Result {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "        PADDY PEST DETECTION REPORT")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    writeln!(out, "Date/Time        : {}", timestamp)?;
    writeln!(out, "Image File       : {}", record.filename())?;
    writeln!(out, "Session ID       : #{}", record.id())?;
    writeln!(
        out,
        "Processing Time  : {:.1} seconds",
        record.processing_time_seconds()
    )?;
    writeln!(out)?;
    writeln!(out, "DETECTION RESULTS:")?;
    writeln!(out, "{}", THIN_RULE)?;
    writeln!(out, "Total Pests      : {}", record.total_detections())?;
    writeln!(out, "Avg. Confidence  : {}%", record.avg_confidence())?;
    writeln!(out)?;
    writeln!(out, "DETECTED PESTS:")?;

    if record.detections().is_empty() {
        writeln!(out, "No pests detected.")?;
    } else {
        for (index, detection) in record.detections().iter().enumerate() {
            writeln!(
                out,
                "{}. {} ({}%)",
                index + 1,
                detection.name,
                detection.confidence
            )?;
        }
    }

    if !record.recommendations().is_empty() {
        writeln!(out)?;
        writeln!(out, "RECOMMENDED ACTIONS:")?;
        writeln!(out, "{}", THIN_RULE)?;
        for (index, recommendation) in record.recommendations().iter().enumerate() {
            writeln!(out, "{}. {}", index + 1, recommendation)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Report generated by JagaPadi v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "Paddy pest detection")?;
    writeln!(out, "{}", RULE)?;
    Ok(())
}

/// File name used when exporting a record's report.
pub fn report_file_name(record: &DetectionRecord) -> String {
    format!("detection_report_{}.txt", record.id())
}

/// Format a timestamp relative to `now` (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.with_timezone(&Local).format("%b %d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Detection;
    use chrono::Duration;

    fn sample(detections: Vec<Detection>, recommendations: Vec<String>) -> DetectionRecord {
        DetectionRecord::with_id(
            "1760000000000",
            "sawah_blok_a.jpg",
            Utc::now(),
            detections,
            2.34,
            recommendations,
            "",
        )
    }

    #[test]
    fn test_report_contents() {
        let record = sample(
            vec![
                Detection::new("Wereng Batang Coklat", 90),
                Detection::new("Walang Sangit", 70),
            ],
            vec!["Set up light traps".to_string()],
        );
        let report = generate_report(&record);

        assert!(report.contains("Image File       : sawah_blok_a.jpg"));
        assert!(report.contains("Session ID       : #1760000000000"));
        assert!(report.contains("Processing Time  : 2.3 seconds"));
        assert!(report.contains("Total Pests      : 2"));
        assert!(report.contains("Avg. Confidence  : 80%"));
        assert!(report.contains("1. Wereng Batang Coklat (90%)"));
        assert!(report.contains("2. Walang Sangit (70%)"));
        assert!(report.contains("RECOMMENDED ACTIONS:"));
        assert!(report.contains("1. Set up light traps"));
    }

    #[test]
    fn test_report_without_detections() {
        let report = generate_report(&sample(vec![], vec![]));
        assert!(report.contains("No pests detected."));
        assert!(!report.contains("RECOMMENDED ACTIONS:"));
    }

    #[test]
    fn test_report_file_name() {
        let record = sample(vec![], vec![]);
        assert_eq!(report_file_name(&record), "detection_report_1760000000000.txt");
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
    }
}
