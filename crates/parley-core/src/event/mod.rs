//! Notification dispatch.
//!
//! The core never delivers notifications itself. After a write commits, the
//! owning service hands a [`MessagingEvent`] to a [`NotificationDispatcher`];
//! a dispatch failure is logged and never surfaces to the caller.

pub mod bus;

use parley_types::event::MessagingEvent;
use thiserror::Error;

pub use bus::EventBus;

/// Errors a dispatcher may report. Callers only log them.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification channel closed")]
    Closed,

    #[error("dispatch failed: {0}")]
    Failed(String),
}

/// Outbound notification port, called outside every transaction.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: MessagingEvent) -> Result<(), DispatchError>;
}

/// Dispatcher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn dispatch(&self, _event: MessagingEvent) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Dispatch and swallow failures with a warning.
pub(crate) fn dispatch_logged<N: NotificationDispatcher + ?Sized>(
    dispatcher: &N,
    event: MessagingEvent,
) {
    let conversation_id = event.conversation_id();
    if let Err(e) = dispatcher.dispatch(event) {
        tracing::warn!(conversation_id = %conversation_id, error = %e, "Notification dispatch failed");
    }
}
