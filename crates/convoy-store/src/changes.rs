//! Live change feed.
//!
//! Every committed write is announced exactly once on a
//! [`tokio::sync::broadcast`] channel.  A multi-document batch is announced
//! as a single event so subscribers never observe it half applied.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use convoy_shared::{AnnotationId, ParticipantId, SessionCode};

use crate::models::{Annotation, CleanupSummary, Participant};

/// Buffered events per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 256;

/// A single change to one session's collections.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Change {
    ParticipantUpserted(Participant),
    ParticipantRemoved(ParticipantId),
    AnnotationUpserted(Annotation),
    AnnotationRemoved(AnnotationId),
    /// The whole session was removed in one batch.
    SessionClosed(CleanupSummary),
}

/// A change tagged with the session it belongs to.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreEvent {
    pub session: SessionCode,
    pub change: Change,
}

/// Sender side of the feed, owned by the store.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<StoreEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Announce a committed change.  Having no subscribers is not an error.
    pub fn publish(&self, session: &SessionCode, change: Change) {
        let receivers = self
            .tx
            .send(StoreEvent {
                session: session.clone(),
                change,
            })
            .unwrap_or(0);
        trace!(session = %session, receivers, "change published");
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
