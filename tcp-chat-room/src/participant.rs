use tokio::sync::mpsc::{self, error::TrySendError};

use crate::message::ChatMessage;

/// Messages a participant may have queued before further deliveries to it
/// are dropped.
pub const INBOX_CAPACITY: usize = 10;

/// Outcome of a single best-effort delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The inbox already held `INBOX_CAPACITY` messages.
    Dropped,
    /// The owning connection has discarded its inbox.
    Gone,
}

/// The coordinator's view of a logged-in connection.
///
/// Holds only a weak sender: routing through it never keeps the inbox alive
/// once the owning connection lets go of it.
#[derive(Debug, Clone)]
pub struct Participant {
    name: String,
    inbox: mpsc::WeakSender<ChatMessage>,
}

impl Participant {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues without waiting. Never blocks the caller.
    pub fn deliver(&self, message: ChatMessage) -> Delivery {
        let Some(sender) = self.inbox.upgrade() else {
            return Delivery::Gone;
        };

        match sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}

/// Bounded delivery queue owned by one connection handler.
pub struct Inbox {
    sender: mpsc::Sender<ChatMessage>,
    receiver: mpsc::Receiver<ChatMessage>,
}

impl Inbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);
        Self { sender, receiver }
    }

    /// Creates the routing reference handed to the coordinator on join.
    pub fn participant(&self, name: impl Into<String>) -> Participant {
        Participant {
            name: name.into(),
            inbox: self.sender.downgrade(),
        }
    }

    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
