//! # jagapadi-core
//!
//! Core library for JagaPadi - a client for an image-based paddy pest
//! detection service.
//!
//! This library provides:
//! - The detection workflow state machine
//! - Session management against the remote detection service
//! - A bounded, persisted history of detection records with daily stats
//! - The orchestrator that ties these together for a front end
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Front ends never mutate core state directly. They hold one
//! [`DetectionOrchestrator`], send it user intents (`stage_image`,
//! `start_detection`, `connect`, ...) and render from its notifications:
//! - [`WorkflowStateMachine`] broadcasts `(previous, current)` state changes
//! - [`SessionManager`] publishes the connection status
//! - [`HistoryStore`] publishes today's [`DailyStats`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use jagapadi_core::{Config, DetectionOrchestrator};
//!
//! # async fn run() -> jagapadi_core::Result<()> {
//! let config = Config::load()?;
//! let orchestrator = DetectionOrchestrator::from_config(&config)?;
//!
//! orchestrator.connect("secret").await?;
//! let file = jagapadi_core::image::read_file("sawah.jpg".as_ref()).await?;
//! orchestrator.stage_image(file).await?;
//! if let Some(record) = orchestrator.start_detection().await? {
//!     println!("{} pests found", record.total_detections());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use history::{HistorySource, HistoryStore};
pub use orchestrator::DetectionOrchestrator;
pub use service::ServiceClient;
pub use session::SessionManager;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;
pub use workflow::WorkflowStateMachine;

// Public modules
pub mod config;
pub mod error;
pub mod history;
pub mod image;
pub mod logging;
pub mod orchestrator;
pub mod recommendations;
pub mod report;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod workflow;
