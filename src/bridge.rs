//! Session notification bridge
//!
//! Holds the subscription tokens for the live session. One handler set per
//! session id: attaching again to the same session does nothing, attaching
//! to a different one detaches the old set first.

use tracing::debug;
use uuid::Uuid;

use crate::transport::{EventHandler, EventKind, Session, Subscription};

const BRIDGED_EVENTS: [EventKind; 3] = [
    EventKind::AccountsChanged,
    EventKind::ChainChanged,
    EventKind::Disconnect,
];

#[derive(Debug, Default)]
pub struct EventBridge {
    attached_to: Option<Uuid>,
    subscriptions: Vec<Subscription>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every bridged notification of `session` to `handler`.
    ///
    /// Returns false when the session already has handlers attached.
    pub fn attach(&mut self, session: &dyn Session, handler: EventHandler) -> bool {
        let session_id = session.id();
        if self.attached_to == Some(session_id) {
            return false;
        }
        self.detach();

        self.subscriptions = BRIDGED_EVENTS
            .iter()
            .map(|kind| session.subscribe(*kind, handler.clone()))
            .collect();
        self.attached_to = Some(session_id);
        debug!(%session_id, handlers = self.subscriptions.len(), "Session listeners attached");
        true
    }

    /// Unsubscribe every handler. Safe to call when nothing is attached.
    pub fn detach(&mut self) {
        let Some(session_id) = self.attached_to.take() else {
            return;
        };
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        debug!(%session_id, "Session listeners detached");
    }

    pub fn attached_to(&self) -> Option<Uuid> {
        self.attached_to
    }

    pub fn is_attached_to(&self, session_id: Uuid) -> bool {
        self.attached_to == Some(session_id)
    }
}
