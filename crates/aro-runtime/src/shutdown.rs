//! Shutdown coordination.
//!
//! One [`ShutdownController`] per process ties together the three shutdown
//! triggers — termination signals, fatal service errors, and explicit
//! requests from user code — and the tasks that must observe them
//! (`keepalive` suspensions, the event scheduler's drain phase).

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Why the process is shutting down. The driver uses this to pick between
/// `Application-End: Success` and `Application-End: Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT/SIGTERM or the platform equivalent.
    Signal,
    /// The entry activation finished on its own.
    Completed,
    /// User code asked for shutdown (emitting `application-shutdown`).
    Requested,
    /// An unrecoverable error in a persistent service.
    Fatal(String),
}

/// Process-wide shutdown switch.
#[derive(Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. The first reason wins; later calls are ignored.
    pub fn request(&self, reason: ShutdownReason) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            tracing::info!(?reason, "Shutdown requested");
            *slot = Some(reason);
            self.token.cancel();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    /// Resolves when shutdown is requested. This is the suspension point
    /// `keepalive` parks on.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// A token child tasks can select against.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
