//! Typed publish/subscribe channel owned by each encoder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use framecap_ipc::{EncoderEvent, EventKind};

/// Handler invoked with every event of the kind it subscribed to.
pub type EventHandler = Arc<dyn Fn(&EncoderEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: Mutex<Vec<(EventKind, EventHandler)>>,
    disposed: AtomicBool,
}

/// Per-encoder event bus.
///
/// Cloning yields another handle to the same bus, so worker threads can
/// emit on behalf of the encoder. Handlers of one kind run in registration
/// order. Emitting with no handlers, or after [`dispose`](Self::dispose),
/// does nothing.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&EncoderEvent) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return;
        }
        self.inner.handlers.lock().push((kind, Arc::new(handler)));
    }

    /// Deliver `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: EncoderEvent) {
        if self.is_disposed() {
            trace!(?event, "Event emitted on disposed bus, ignoring");
            return;
        }

        let kind = event.kind();
        // Handlers run outside the lock so they may subscribe or emit.
        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(&event);
        }
    }

    /// Signal that one frame was processed.
    pub fn step(&self) {
        self.emit(EncoderEvent::Step);
    }

    /// Report fractional progress, clamped to 0.0 - 1.0.
    pub fn progress(&self, fraction: f32) {
        self.emit(EncoderEvent::Progress(fraction.clamp(0.0, 1.0)));
    }

    /// Report a non-fatal error.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(EncoderEvent::error(message));
    }

    /// Number of handlers subscribed to `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Drop every subscription; later emits and subscriptions are ignored.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.handlers.lock().clear();
    }

    /// Returns true once the bus has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.inner.handlers.lock().len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
