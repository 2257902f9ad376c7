use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Lifecycle state of a supervised component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the application is going down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

impl ShutdownReason {
    /// Process exit code implied by this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Error(_) => 1,
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => 0,
        }
    }
}

/// One-shot shutdown request shared by signal handlers and component tasks.
///
/// Only the first request is delivered; later ones are ignored.
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub(super) fn new() -> (Self, oneshot::Receiver<ShutdownReason>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            receiver,
        )
    }

    /// Request shutdown. Returns false when a shutdown was already requested.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
