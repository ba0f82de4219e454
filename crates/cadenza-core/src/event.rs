//! Editor notifications.
//!
//! Events are values sent over a `tokio::sync::broadcast` channel. The
//! editor only ever sends, and sending never blocks or awaits, so editing
//! stays synchronous. Hosts subscribe and either await events or drain
//! them after each call.

use tokio::sync::broadcast;

use crate::navigation::Direction;

/// Something a host may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The score snapshot was replaced
    ScoreChanged,
    /// The selection changed
    SelectionChanged,
    /// The ghost cursor appeared, moved or disappeared
    PreviewChanged,
    /// Undo or redo availability changed
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// Navigation ran past the last measure; the host may append one
    MeasureRequested {
        staff_index: usize,
        measure_index: usize,
    },
    /// A navigation request had no target
    NavigationBlocked(Direction),
    /// A command was refused and the score left unchanged
    CommandRejected { label: String, reason: String },
    /// A transaction became one undo step
    TransactionCommitted { label: String },
    /// A transaction was undone
    TransactionRolledBack { commands: usize },
}

/// Event bus for broadcasting editor events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EditorEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        // Capacity of 256 events in the buffer
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Emits an event to all subscribers.
    pub fn emit(&self, event: EditorEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// Receives events, skipping over any it lagged behind on.
pub struct EventHandler {
    receiver: broadcast::Receiver<EditorEvent>,
}

impl EventHandler {
    pub fn new(receiver: broadcast::Receiver<EditorEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<EditorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-sent event without waiting.
    pub fn try_next(&mut self) -> Option<EditorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Every already-sent event, oldest first.
    pub fn drain(&mut self) -> Vec<EditorEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
