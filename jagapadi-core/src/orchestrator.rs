//! Detection orchestration.
//!
//! [`DetectionOrchestrator`] is the single context object a front end holds.
//! It owns the staged image and coordinates the workflow, the session and the
//! history log:
//!
//! 1. `stage_image` validates and decodes a file, then moves to `ImageReady`.
//! 2. `start_detection` checks the session, moves to `Processing`, submits the
//!    image and records the result (`Results`) or reverts (`ImageReady`).
//!
//! Only one submission can be in flight: `start_detection` requires
//! `ImageReady` and claims `Processing` before its first await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, watch};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{HistorySource, HistoryStore};
use crate::image;
use crate::recommendations;
use crate::service::{ServiceClient, UploadResponse};
use crate::session::SessionManager;
use crate::store::{FileStore, KeyValueStore};
use crate::types::{
    DetectionRecord, ImageFile, SessionStatus, StagedImage, StateChange, WorkflowState,
};
use crate::workflow::WorkflowStateMachine;

/// The orchestration context: every user intent enters the core here.
pub struct DetectionOrchestrator {
    client: Arc<ServiceClient>,
    workflow: Arc<WorkflowStateMachine>,
    session: SessionManager,
    history: HistoryStore,
    staged: Mutex<Option<StagedImage>>,
}

impl DetectionOrchestrator {
    pub fn new(client: ServiceClient, store: Arc<dyn KeyValueStore>) -> Self {
        let client = Arc::new(client);
        let workflow = Arc::new(WorkflowStateMachine::new());
        let session = SessionManager::new(client.clone(), workflow.clone());
        let history = HistoryStore::new(store);

        Self {
            client,
            workflow,
            session,
            history,
            staged: Mutex::new(None),
        }
    }

    /// Build from configuration with a file-backed store.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ServiceClient::new(config.service.clone())?;
        let store = Arc::new(FileStore::new(config.store_dir()));
        Ok(Self::new(client, store))
    }

    // ============================================
    // Images
    // ============================================

    /// Validate, decode and stage `file`, moving to `ImageReady`.
    ///
    /// Validation and decode failures leave the workflow and any previously
    /// staged image untouched.
    pub async fn stage_image(&self, file: ImageFile) -> Result<()> {
        image::validate(&file)?;
        self.ensure_not_processing()?;

        let filename = file.filename.clone();
        let staged = image::decode(file).await.map_err(|e| {
            tracing::warn!(file = %filename, error = %e, "Failed to decode image");
            e
        })?;

        tracing::info!(
            file = %staged.filename,
            mime = %staged.mime_type,
            size = staged.size_bytes(),
            "Image staged"
        );
        self.install(staged)
    }

    /// Discard the staged image and return to `Initial`.
    pub fn clear_image(&self) -> Result<()> {
        self.ensure_not_processing()?;
        self.staged().take();
        if self.workflow.current() != WorkflowState::Initial {
            self.workflow.transition(WorkflowState::Initial)?;
        }
        Ok(())
    }

    /// The staged image, if the workflow currently holds one.
    pub fn staged_image(&self) -> Option<StagedImage> {
        if !self.workflow.current().holds_image() {
            return None;
        }
        self.staged().clone()
    }

    /// Re-stage the result image of a history record.
    ///
    /// Returns `Ok(false)` when no record has that id.
    pub fn rerun(&self, record_id: &str) -> Result<bool> {
        let Some(record) = self.history.find_by_id(record_id) else {
            tracing::debug!(id = %record_id, "Re-run requested for unknown record");
            return Ok(false);
        };

        self.ensure_not_processing()?;
        let staged = image::from_data_url(record.filename(), record.result_image())?;
        self.install(staged)?;
        tracing::info!(id = %record_id, "Historical image re-staged");
        Ok(true)
    }

    // ============================================
    // Detection
    // ============================================

    /// Submit the staged image to the service.
    ///
    /// Returns the new record, or `None` if the result arrived after the
    /// workflow had already left `Processing` and was discarded.
    pub async fn start_detection(&self) -> Result<Option<DetectionRecord>> {
        let image = self.staged_image().ok_or(Error::NoImageStaged)?;
        if !self.session.status().is_connected() {
            return Err(Error::NotConnected);
        }

        let started = Instant::now();
        self.workflow.transition(WorkflowState::Processing)?;
        tracing::info!(file = %image.filename, "Detection started");

        let outcome = self.client.upload(&image).await;
        let elapsed = started.elapsed().as_secs_f64();

        if self.workflow.current() != WorkflowState::Processing {
            tracing::debug!(
                state = %self.workflow.current(),
                "Discarding stale detection result"
            );
            return Ok(None);
        }

        match outcome {
            Ok(response) => {
                let record = build_record(&image, response, elapsed);
                tracing::info!(
                    id = %record.id(),
                    detections = record.total_detections(),
                    avg_confidence = record.avg_confidence(),
                    seconds = record.processing_time_seconds(),
                    "Detection completed"
                );
                self.history.append(record.clone());
                self.workflow.transition(WorkflowState::Results)?;
                Ok(Some(record))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Detection failed, image kept for retry");
                self.workflow.transition(WorkflowState::ImageReady)?;
                Err(e)
            }
        }
    }

    // ============================================
    // Session and history
    // ============================================

    pub async fn check_status(&self) -> SessionStatus {
        self.session.check_status().await
    }

    pub async fn connect(&self, credential: &str) -> Result<String> {
        self.session.connect(credential).await
    }

    /// Disconnect; drops the staged image if the workflow went back to `Initial`.
    pub async fn disconnect(&self) -> String {
        let message = self.session.disconnect().await;
        if self.workflow.current() == WorkflowState::Initial {
            self.staged().take();
        }
        message
    }

    pub async fn load_history(&self) -> HistorySource {
        self.history.load(&self.client).await
    }

    /// Clear local history and the service's copy.
    pub async fn clear_history(&self) {
        self.history.clear(Some(&self.client)).await;
    }

    // ============================================
    // Observation
    // ============================================

    pub fn state(&self) -> WorkflowState {
        self.workflow.current()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.workflow.subscribe()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionStatus> {
        self.session.subscribe()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn workflow(&self) -> &WorkflowStateMachine {
        &self.workflow
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    // ============================================
    // Internals
    // ============================================

    fn ensure_not_processing(&self) -> Result<()> {
        if self.workflow.current() == WorkflowState::Processing {
            return Err(Error::DetectionInProgress);
        }
        Ok(())
    }

    /// Replace the staged image and move to `ImageReady`.
    fn install(&self, staged: StagedImage) -> Result<()> {
        // Re-checked here: a detection may have started while decoding.
        self.ensure_not_processing()?;
        // A new image from `ImageReady` goes through `Initial`.
        if self.workflow.current() == WorkflowState::ImageReady {
            self.workflow.transition(WorkflowState::Initial)?;
        }
        *self.staged() = Some(staged);
        self.workflow.transition(WorkflowState::ImageReady)?;
        Ok(())
    }

    fn staged(&self) -> MutexGuard<'_, Option<StagedImage>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the history record for a successful upload.
fn build_record(image: &StagedImage, response: UploadResponse, elapsed_secs: f64) -> DetectionRecord {
    let recommendations = if response.recommendations.is_empty() {
        recommendations::for_detections(&response.detections)
    } else {
        response.recommendations
    };

    let result_image = response
        .result_image
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| image.data_url.clone());

    DetectionRecord::new(
        image.filename.clone(),
        Utc::now(),
        response.detections,
        elapsed_secs,
        recommendations,
        result_image,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::image::tests::jpeg_bytes;
    use crate::store::MemoryStore;
    use crate::types::Detection;

    fn offline_orchestrator() -> DetectionOrchestrator {
        let config = ServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            max_retries: 0,
        };
        DetectionOrchestrator::new(
            ServiceClient::new(config).unwrap(),
            Arc::new(MemoryStore::new()),
        )
    }

    fn jpeg(name: &str, len: usize) -> ImageFile {
        ImageFile::new(name, "image/jpeg", jpeg_bytes(len))
    }

    #[tokio::test]
    async fn test_stage_valid_image_reaches_image_ready() {
        let orch = offline_orchestrator();
        orch.stage_image(jpeg("padi.jpg", 1024 * 1024)).await.unwrap();

        assert_eq!(orch.state(), WorkflowState::ImageReady);
        let staged = orch.staged_image().unwrap();
        assert_eq!(staged.filename, "padi.jpg");
        assert_eq!(staged.size_bytes(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_stage_rejects_invalid_files() {
        let orch = offline_orchestrator();

        let err = orch.stage_image(jpeg("big.jpg", 11 * 1024 * 1024)).await.unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));

        let text = ImageFile::new("notes.txt", "text/plain", b"hello".to_vec());
        let err = orch.stage_image(text).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFileType { .. }));

        assert_eq!(orch.state(), WorkflowState::Initial);
        assert!(orch.staged_image().is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_stays_initial() {
        let orch = offline_orchestrator();
        let fake = ImageFile::new("fake.png", "image/png", b"plain text".to_vec());
        assert!(matches!(
            orch.stage_image(fake).await,
            Err(Error::Decode(_))
        ));
        assert_eq!(orch.state(), WorkflowState::Initial);
    }

    #[tokio::test]
    async fn test_restaging_replaces_image() {
        let orch = offline_orchestrator();
        let mut rx = orch.subscribe_state();

        orch.stage_image(jpeg("a.jpg", 16)).await.unwrap();
        orch.stage_image(jpeg("b.jpg", 16)).await.unwrap();

        assert_eq!(orch.state(), WorkflowState::ImageReady);
        assert_eq!(orch.staged_image().unwrap().filename, "b.jpg");

        let currents: Vec<WorkflowState> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|change| change.current)
            .collect();
        assert_eq!(
            currents,
            vec![
                WorkflowState::ImageReady,
                WorkflowState::Initial,
                WorkflowState::ImageReady
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_image() {
        let orch = offline_orchestrator();
        orch.stage_image(jpeg("a.jpg", 16)).await.unwrap();
        orch.clear_image().unwrap();
        assert_eq!(orch.state(), WorkflowState::Initial);
        assert!(orch.staged_image().is_none());

        // Clearing again is harmless.
        orch.clear_image().unwrap();
    }

    #[tokio::test]
    async fn test_start_detection_preconditions() {
        let orch = offline_orchestrator();
        assert!(matches!(
            orch.start_detection().await,
            Err(Error::NoImageStaged)
        ));

        orch.stage_image(jpeg("a.jpg", 16)).await.unwrap();
        assert!(matches!(
            orch.start_detection().await,
            Err(Error::NotConnected)
        ));
        assert_eq!(orch.state(), WorkflowState::ImageReady);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_restages_result_image() {
        let orch = offline_orchestrator();
        let staged = image::decode(jpeg("lama.jpg", 16)).await.unwrap();
        let record = DetectionRecord::new(
            "lama.jpg",
            Utc::now(),
            vec![Detection::new("Walang Sangit", 90)],
            1.0,
            vec![],
            staged.data_url.clone(),
        );
        let id = record.id().to_string();
        orch.history().append(record);

        assert!(!orch.rerun("missing").unwrap());
        assert_eq!(orch.state(), WorkflowState::Initial);

        assert!(orch.rerun(&id).unwrap());
        assert_eq!(orch.state(), WorkflowState::ImageReady);
        assert_eq!(orch.staged_image().unwrap().bytes, staged.bytes);
    }

    #[tokio::test]
    async fn test_disconnect_resets_and_drops_image() {
        let orch = offline_orchestrator();
        orch.stage_image(jpeg("a.jpg", 16)).await.unwrap();

        orch.disconnect().await;
        assert_eq!(orch.state(), WorkflowState::Initial);
        assert_eq!(orch.session_status(), SessionStatus::Disconnected);
        assert!(orch.staged.lock().unwrap().is_none());
    }

    #[test]
    fn test_build_record_uses_response() {
        let image = StagedImage {
            filename: "a.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![1],
            data_url: "data:image/jpeg;base64,AQ==".to_string(),
        };
        let response = UploadResponse {
            success: true,
            message: String::new(),
            result_image: None,
            detections: vec![
                Detection::new("Wereng Batang Coklat", 90),
                Detection::new("Walang Sangit", 70),
            ],
            recommendations: vec![],
        };

        let record = build_record(&image, response, 2.345);
        assert_eq!(record.total_detections(), 2);
        assert_eq!(record.avg_confidence(), 80);
        assert_eq!(record.processing_time_seconds(), 2.3);
        assert_eq!(record.result_image(), image.data_url);
        assert_eq!(record.recommendations().len(), 6);
    }

    #[test]
    fn test_build_record_without_detections_has_no_advice() {
        let image = StagedImage {
            filename: "bersih.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![1],
            data_url: "data:image/jpeg;base64,AQ==".to_string(),
        };
        let response = UploadResponse {
            success: true,
            message: "Deteksi selesai".to_string(),
            result_image: None,
            detections: vec![],
            recommendations: vec![],
        };

        let record = build_record(&image, response, 1.0);
        assert_eq!(record.total_detections(), 0);
        assert_eq!(record.avg_confidence(), 0);
        assert!(record.recommendations().is_empty());
    }
}
