//! Session state tracking and event publication.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, warn};

use framecap_ipc::{event_channel, SessionEvent, SessionState};

/// Sends `event` without blocking, dropping it with a warning when the
/// channel is full.
pub(crate) fn publish(event_tx: &Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = event_tx.try_send(event) {
        warn!("Failed to send session event: {}", e);
    }
}

/// Owns the session state and the session event channel.
pub struct StateTracker {
    state: RwLock<SessionState>,
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
}

impl StateTracker {
    /// Create a tracker in the Idle state with a fresh event channel.
    pub fn new() -> Self {
        let (event_tx, event_rx) = event_channel();
        Self {
            state: RwLock::new(SessionState::Idle),
            event_tx,
            event_rx,
        }
    }

    /// Current state.
    pub fn current(&self) -> SessionState {
        *self.state.read()
    }

    /// Move to `new_state`, publishing the change. Returns the previous state.
    pub fn transition_to(&self, new_state: SessionState) -> SessionState {
        let previous = {
            let mut state = self.state.write();
            let prev = *state;
            *state = new_state;
            prev
        };

        if previous == new_state {
            return previous;
        }

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(SessionEvent::StateChanged {
            previous,
            current: new_state,
        });
        previous
    }

    /// Publish an event to observers.
    pub fn send_event(&self, event: SessionEvent) {
        publish(&self.event_tx, event);
    }

    /// A sender for handlers that outlive a borrow of the tracker.
    pub fn sender(&self) -> Sender<SessionEvent> {
        self.event_tx.clone()
    }

    /// A receiver for observers.
    pub fn receiver(&self) -> Receiver<SessionEvent> {
        self.event_rx.clone()
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
