//! Printing of core notifications for `--verbose`.

use jagapadi_core::DetectionOrchestrator;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Running observer tasks.
///
/// They end once the orchestrator is dropped; [`Observers::finish`] waits for
/// them so the last notifications are printed before the process exits.
pub struct Observers {
    tasks: Vec<JoinHandle<()>>,
}

/// Spawn tasks that echo workflow and session changes to stderr.
pub fn spawn(orchestrator: &DetectionOrchestrator) -> Observers {
    let mut states = orchestrator.subscribe_state();
    let state_task = tokio::spawn(async move {
        loop {
            match states.recv().await {
                Ok(change) => eprintln!("[state] {} -> {}", change.previous, change.current),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("[state] ({} change(s) skipped)", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut session = orchestrator.subscribe_session();
    let session_task = tokio::spawn(async move {
        // A change made just before the sender closed is still reported.
        while session.changed().await.is_ok() {
            let status = *session.borrow_and_update();
            eprintln!("[session] {}", status);
        }
    });

    Observers {
        tasks: vec![state_task, session_task],
    }
}

impl Observers {
    /// Wait for the tasks to drain; call after the orchestrator is dropped.
    pub async fn finish(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Notification printer failed");
            }
        }
    }
}
