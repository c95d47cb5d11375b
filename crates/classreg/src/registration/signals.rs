//! Cancellation signal sources.
//!
//! Abstracts the platform events that abandon a registration mid-flight
//! (history navigation, window close). The wizard subscribes only while a
//! half-registered account exists; any equivalent event source can be wired
//! to the hub.

use tokio::sync::broadcast;

/// Why a registration session is being abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user navigated back out of the wizard.
    BackNavigation,
    /// The window/tab is closing.
    WindowClosed,
    /// The user clicked an explicit back/cancel control.
    UserAction,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::BackNavigation => write!(f, "back-navigation"),
            CancelReason::WindowClosed => write!(f, "window-closed"),
            CancelReason::UserAction => write!(f, "user-action"),
        }
    }
}

/// Broadcast source for cancellation signals.
#[derive(Debug, Clone)]
pub struct CancelSignalHub {
    tx: broadcast::Sender<CancelReason>,
}

impl CancelSignalHub {
    /// Create a new hub.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    /// Emit a signal to all current subscribers. Returns how many were
    /// notified; zero when nothing is listening (e.g. phase 1).
    pub fn emit(&self, reason: CancelReason) -> usize {
        self.tx.send(reason).unwrap_or(0)
    }

    /// Subscribe to future signals.
    pub fn subscribe(&self) -> broadcast::Receiver<CancelReason> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for CancelSignalHub {
    fn default() -> Self {
        Self::new()
    }
}
