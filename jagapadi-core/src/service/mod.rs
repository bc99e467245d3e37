//! Detection service client
//!
//! The detection service runs the actual recognition model; this crate only
//! talks to its HTTP API:
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /api/status` | Whether the service is reachable and authenticated |
//! | `POST /api/connect` | Credential handshake |
//! | `POST /api/disconnect` | Drop the authenticated session |
//! | `POST /api/upload` | Submit an image for detection (multipart field `file`) |
//! | `GET /api/history` | Detection history kept by the service |
//! | `POST /api/clear-history` | Forget that history |
//!
//! Configure the endpoint in `~/.config/jagapadi/config.toml`:
//!
//! ```toml
//! [service]
//! base_url = "http://127.0.0.1:5000"
//! timeout_secs = 30
//! ```

mod client;
mod wire;

pub use client::ServiceClient;
pub use wire::{HistoryEntry, ServiceStatus, UploadResponse};
