//! Connection lifecycle with the detection service.
//!
//! The local status is the single source of truth for whether detection may
//! start. It is only ever `Connected` after the service has confirmed both
//! reachability and authentication; every failure path lands on
//! `Disconnected`.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::service::ServiceClient;
use crate::types::{SessionStatus, WorkflowState};
use crate::workflow::WorkflowStateMachine;

/// Owner of the [`SessionStatus`].
pub struct SessionManager {
    client: Arc<ServiceClient>,
    workflow: Arc<WorkflowStateMachine>,
    status: watch::Sender<SessionStatus>,
}

impl SessionManager {
    pub fn new(client: Arc<ServiceClient>, workflow: Arc<WorkflowStateMachine>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            client,
            workflow,
            status,
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes (e.g. to enable detection controls).
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Ask the service whether it is reachable and authenticated.
    ///
    /// Transport failures count as disconnected.
    pub async fn check_status(&self) -> SessionStatus {
        let status = match self.client.status().await {
            Ok(reported) if reported.is_ready() => SessionStatus::Connected,
            Ok(reported) => {
                tracing::debug!(
                    connected = reported.connected,
                    authenticated = reported.authenticated,
                    "Service not ready"
                );
                SessionStatus::Disconnected
            }
            Err(e) => {
                tracing::info!(error = %e, "Status check failed, assuming disconnected");
                SessionStatus::Disconnected
            }
        };
        self.set_status(status);
        status
    }

    /// Authenticate with `credential`.
    ///
    /// Returns the service's confirmation message.
    pub async fn connect(&self, credential: &str) -> Result<String> {
        if credential.is_empty() {
            return Err(Error::MissingCredential);
        }

        self.set_status(SessionStatus::Connecting);

        match self.client.connect(credential).await {
            Ok(message) => {
                self.set_status(SessionStatus::Connected);
                tracing::info!("Connected to detection service");
                Ok(message)
            }
            Err(e) => {
                self.set_status(SessionStatus::Disconnected);
                tracing::warn!(error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Drop the session.
    ///
    /// Always ends `Disconnected`. The workflow returns to `Initial` unless a
    /// detection is in flight, which is left to finish.
    pub async fn disconnect(&self) -> String {
        let message = match self.client.disconnect().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Remote disconnect failed, disconnecting locally");
                "Disconnected from server".to_string()
            }
        };

        self.set_status(SessionStatus::Disconnected);

        let state = self.workflow.reset_unless_processing();
        if state == WorkflowState::Processing {
            tracing::info!("Disconnected during processing; detection continues");
        }

        message
    }

    fn set_status(&self, next: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = %*current, to = %next, "Session status changed");
            *current = next;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    /// Points at a port nothing listens on.
    fn unreachable_manager() -> SessionManager {
        let config = ServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            max_retries: 0,
        };
        let client = Arc::new(ServiceClient::new(config).unwrap());
        SessionManager::new(client, Arc::new(WorkflowStateMachine::new()))
    }

    #[tokio::test]
    async fn test_missing_credential_changes_nothing() {
        let manager = unreachable_manager();
        let mut rx = manager.subscribe();

        let err = manager.connect("").await.unwrap_err();
        assert!(matches!(err, Error::MissingCredential));
        assert_eq!(manager.status(), SessionStatus::Disconnected);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_transport_failure_is_fail_safe() {
        let manager = unreachable_manager();

        assert_eq!(manager.check_status().await, SessionStatus::Disconnected);

        let err = manager.connect("jagapadi2024").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(manager.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_local_when_remote_fails() {
        let manager = unreachable_manager();
        manager.workflow.transition(WorkflowState::ImageReady).unwrap();

        let message = manager.disconnect().await;
        assert_eq!(message, "Disconnected from server");
        assert_eq!(manager.status(), SessionStatus::Disconnected);
        assert_eq!(manager.workflow.current(), WorkflowState::Initial);
    }
}
