//! In-process notification fan-out over `tokio::sync::broadcast`.
//!
//! `EventBus` is the default [`NotificationDispatcher`]: every committed
//! `MessagingEvent` is broadcast to all live subscribers. With no subscriber
//! the event is simply dropped, which is not a dispatch failure.

use parley_types::conversation::ConversationId;
use parley_types::event::MessagingEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{DispatchError, NotificationDispatcher};

/// Broadcast bus for committed messaging events. Clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MessagingEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may fall behind before it
    /// starts missing events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MessagingEvent> {
        self.sender.subscribe()
    }

    /// Receive only events about one conversation.
    pub fn subscribe_conversation(&self, conversation_id: ConversationId) -> ConversationFeed {
        ConversationFeed {
            conversation_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, event: MessagingEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationDispatcher for EventBus {
    fn dispatch(&self, event: MessagingEvent) -> Result<(), DispatchError> {
        self.publish(event);
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// Subscription filtered to a single conversation.
pub struct ConversationFeed {
    conversation_id: ConversationId,
    receiver: broadcast::Receiver<MessagingEvent>,
}

impl ConversationFeed {
    /// Next event for this conversation, or `None` once the bus is gone.
    ///
    /// A lagging feed skips what it missed and keeps going.
    pub async fn next(&mut self) -> Option<MessagingEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.conversation_id() == self.conversation_id => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        conversation_id = %self.conversation_id,
                        skipped,
                        "Conversation feed lagged"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
