//! Subcommand handlers.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use jagapadi_core::history::HistorySource;
use jagapadi_core::report::{format_relative_time, report_file_name};
use jagapadi_core::store::{load_dark_mode, save_dark_mode};
use jagapadi_core::{image, Config, DetectionOrchestrator, DetectionRecord, Error, FileStore};

/// Log the core error and turn it into the message shown to the user.
fn user_error(error: Error) -> anyhow::Error {
    if error.is_validation() {
        tracing::debug!(error = %error, "Input rejected");
    } else {
        tracing::warn!(error = %error, "Command failed");
    }
    anyhow!(error.user_message())
}

/// Authenticate with `password` if given, otherwise adopt the service's session.
async fn ensure_session(orchestrator: &DetectionOrchestrator, password: Option<String>) -> Result<()> {
    match password {
        Some(password) => {
            let message = orchestrator.connect(&password).await.map_err(user_error)?;
            println!("{}", message);
        }
        None => {
            let status = orchestrator.check_status().await;
            if !status.is_connected() {
                bail!("Not connected to the detection server. Run 'connect' or pass --password.");
            }
        }
    }
    Ok(())
}

pub async fn status(orchestrator: &DetectionOrchestrator, config: &Config) -> Result<()> {
    println!("JagaPadi Detection Client");
    println!("=========================");
    println!();
    println!("Server:          {}", config.service.base_url);
    println!("Timeout:         {}s", config.service.timeout_secs);
    println!("Max Retries:     {}", config.service.max_retries);
    println!("Store:           {}", config.store_dir().display());
    println!("Config:          {}", Config::config_path().display());
    println!("Log:             {}", jagapadi_core::logging::current_log_file().display());
    println!();

    let status = orchestrator.check_status().await;
    println!("Connection:      {}", status);

    orchestrator.load_history().await;
    let stats = orchestrator.history().daily_stats();
    println!("Today:           {} detection(s), {}% accuracy", stats.detections, stats.accuracy);
    Ok(())
}

pub async fn connect(orchestrator: &DetectionOrchestrator, password: Option<String>) -> Result<()> {
    let password = password.unwrap_or_default();
    let message = orchestrator.connect(&password).await.map_err(user_error)?;
    println!("{}", message);
    Ok(())
}

pub async fn disconnect(orchestrator: &DetectionOrchestrator) -> Result<()> {
    let message = orchestrator.disconnect().await;
    println!("{}", message);
    Ok(())
}

pub async fn detect(
    orchestrator: &DetectionOrchestrator,
    path: &Path,
    password: Option<String>,
) -> Result<()> {
    let file = image::read_file(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    orchestrator.stage_image(file).await.map_err(user_error)?;

    // Loaded before the new record is appended so the persisted log keeps prior entries.
    orchestrator.load_history().await;
    ensure_session(orchestrator, password).await?;

    println!("Analyzing {}...", path.display());
    run_detection(orchestrator).await
}

pub async fn rerun(
    orchestrator: &DetectionOrchestrator,
    id: &str,
    password: Option<String>,
) -> Result<()> {
    orchestrator.load_history().await;
    if !orchestrator.rerun(id).map_err(user_error)? {
        return Err(user_error(Error::RecordNotFound(id.to_string())));
    }
    ensure_session(orchestrator, password).await?;

    println!("Re-analyzing detection #{}...", id);
    run_detection(orchestrator).await
}

async fn run_detection(orchestrator: &DetectionOrchestrator) -> Result<()> {
    match orchestrator.start_detection().await.map_err(user_error)? {
        Some(record) => {
            print_record(&record);
            Ok(())
        }
        None => bail!("Detection was cancelled"),
    }
}

fn print_record(record: &DetectionRecord) {
    println!();
    println!("Detection #{}", record.id());
    println!("  Image:           {}", record.filename());
    println!("  Pests Found:     {}", record.total_detections());
    println!("  Avg. Confidence: {}%", record.avg_confidence());
    println!("  Time:            {:.1}s", record.processing_time_seconds());

    if !record.detections().is_empty() {
        println!();
        for detection in record.detections() {
            println!("  - {} ({}%)", detection.name, detection.confidence);
        }
    }

    if !record.recommendations().is_empty() {
        println!();
        println!("Recommended actions:");
        for recommendation in record.recommendations() {
            println!("  * {}", recommendation);
        }
    }
}

pub async fn history(orchestrator: &DetectionOrchestrator, limit: Option<usize>) -> Result<()> {
    let source = orchestrator.load_history().await;
    let records = orchestrator.history().records();

    if records.is_empty() {
        println!("No detection history.");
        return Ok(());
    }

    let origin = match source {
        HistorySource::Remote => "server",
        HistorySource::Local | HistorySource::Empty => "local",
    };
    println!("Detection history ({} record(s), {})", records.len(), origin);
    println!();
    println!(
        "{:<38} {:<24} {:>6} {:>6}  WHEN",
        "ID", "IMAGE", "PESTS", "CONF"
    );

    let now = Utc::now();
    for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
        println!(
            "{:<38} {:<24} {:>6} {:>5}%  {}",
            record.id(),
            truncate(record.filename(), 24),
            record.total_detections(),
            record.avg_confidence(),
            format_relative_time(record.timestamp(), now)
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub async fn report(
    orchestrator: &DetectionOrchestrator,
    id: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    orchestrator.load_history().await;
    let history = orchestrator.history();
    let (Some(record), Some(report)) = (history.find_by_id(id), history.generate_report(id)) else {
        return Err(user_error(Error::RecordNotFound(id.to_string())));
    };

    match output {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(report_file_name(&record))
            } else {
                path
            };
            std::fs::write(&path, report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report saved to {}", path.display());
        }
        None => print!("{}", report),
    }
    Ok(())
}

pub async fn stats(orchestrator: &DetectionOrchestrator) -> Result<()> {
    orchestrator.load_history().await;
    let stats = orchestrator.history().daily_stats();
    println!("Detections today: {}", stats.detections);
    println!("Accuracy:         {}%", stats.accuracy);
    Ok(())
}

pub async fn clear_history(orchestrator: &DetectionOrchestrator) -> Result<()> {
    orchestrator.clear_history().await;
    println!("Detection history cleared.");
    Ok(())
}

pub fn theme(config: &Config, dark: Option<bool>) -> Result<()> {
    let store = FileStore::new(config.store_dir());
    if let Some(dark) = dark {
        save_dark_mode(&store, dark);
    }
    let name = if load_dark_mode(&store) { "dark" } else { "light" };
    println!("Theme: {}", name);
    Ok(())
}
