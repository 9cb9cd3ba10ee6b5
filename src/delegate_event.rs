//! Events emitted by multicast delegates.
//!
//! Every registry operation reports a [`DelegateEvent`] to the `tracing` crate and to
//! an optional process-wide trace callback set with [`set_trace_callback`].

use std::{
    fmt,
    sync::{Arc, LazyLock, Mutex},
};

use crate::DelegateKind;

/// Events emitted by multicast delegates during operations.
///
/// The `Clone` derive allows callbacks to store or forward events if needed.
///
/// # Examples
///
/// ```rust
/// use multicast_delegates::{DelegateEvent, DelegateKind};
///
/// let event = DelegateEvent::Add { registry: 1, kind: DelegateKind::Function, len: 1 };
/// assert_eq!(event.to_string(), "add { registry: 1, kind: function, len: 1 }");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    /// A delegate was appended.
    Add {
        /// Id of the multicast delegate
        registry: u64,
        /// Variant of the appended delegate
        kind: DelegateKind,
        /// Number of callbacks after the append
        len: usize,
    },

    /// A removal was attempted.
    Remove {
        registry: u64,
        /// Whether a matching delegate was found and removed
        removed: bool,
        len: usize,
    },

    /// The multicast delegate was invoked.
    ///
    /// `callbacks` is zero when the invocation failed because nothing was registered.
    Invoke { registry: u64, callbacks: usize },

    /// Callbacks were copied from one multicast delegate into another.
    Copy { from: u64, to: u64, len: usize },

    /// Callbacks were moved from one multicast delegate into another.
    Move { from: u64, to: u64, len: usize },

    /// All callbacks were dropped.
    Clear { registry: u64 },
}

impl fmt::Display for DelegateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegateEvent::Add {
                registry,
                kind,
                len,
            } => write!(f, "add {{ registry: {registry}, kind: {kind}, len: {len} }}"),
            DelegateEvent::Remove {
                registry,
                removed,
                len,
            } => write!(
                f,
                "remove {{ registry: {registry}, removed: {removed}, len: {len} }}"
            ),
            DelegateEvent::Invoke {
                registry,
                callbacks,
            } => write!(f, "invoke {{ registry: {registry}, callbacks: {callbacks} }}"),
            DelegateEvent::Copy { from, to, len } => {
                write!(f, "copy {{ from: {from}, to: {to}, len: {len} }}")
            }
            DelegateEvent::Move { from, to, len } => {
                write!(f, "move {{ from: {from}, to: {to}, len: {len} }}")
            }
            DelegateEvent::Clear { registry } => write!(f, "clear {{ registry: {registry} }}"),
        }
    }
}

/// Type alias for the user-supplied tracing callback.
///
/// The callback receives every [`DelegateEvent`]. It must be thread-safe because
/// multicast delegates are shared across threads.
pub type TraceCallback = dyn Fn(&DelegateEvent) + Send + Sync + 'static;

/// Holds an optional user-defined tracing callback.
static TRACE_CALLBACK: LazyLock<Mutex<Option<Arc<TraceCallback>>>> =
    LazyLock::new(|| Mutex::new(None));

/// Sets a tracing callback that will be invoked on every multicast delegate operation.
///
/// Events are delivered after the multicast delegate's lock has been released, so the
/// callback may itself use multicast delegates.
///
/// # Example
/// ```rust
/// use multicast_delegates::{clear_trace_callback, set_trace_callback};
///
/// set_trace_callback(|event| println!("[delegate-trace] {event}"));
/// clear_trace_callback();
/// ```
pub fn set_trace_callback(callback: impl Fn(&DelegateEvent) + Send + Sync + 'static) {
    let mut guard = TRACE_CALLBACK.lock().unwrap_or_else(|p| p.into_inner());
    *guard = Some(Arc::new(callback));
}

/// Clears the tracing callback. `tracing` events are still emitted.
pub fn clear_trace_callback() {
    let mut guard = TRACE_CALLBACK.lock().unwrap_or_else(|p| p.into_inner());
    *guard = None;
}

/// Reports an event to `tracing` and to the current trace callback, if any.
pub(crate) fn emit_event(event: &DelegateEvent) {
    tracing::trace!(target: "multicast_delegates", %event, "delegate event");

    // The callback runs without the trace lock so it may replace itself.
    let callback = TRACE_CALLBACK
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone();
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_display_add() {
        let ev = DelegateEvent::Add {
            registry: 4,
            kind: DelegateKind::Method,
            len: 2,
        };
        assert_eq!(ev.to_string(), "add { registry: 4, kind: method, len: 2 }");
    }

    #[test]
    fn test_display_remove() {
        let ev = DelegateEvent::Remove {
            registry: 4,
            removed: false,
            len: 0,
        };
        assert_eq!(ev.to_string(), "remove { registry: 4, removed: false, len: 0 }");
    }

    #[test]
    fn test_display_invoke() {
        let ev = DelegateEvent::Invoke {
            registry: 9,
            callbacks: 3,
        };
        assert_eq!(ev.to_string(), "invoke { registry: 9, callbacks: 3 }");
    }

    #[test]
    fn test_display_copy_move_clear() {
        let copy = DelegateEvent::Copy {
            from: 1,
            to: 2,
            len: 5,
        };
        let moved = DelegateEvent::Move {
            from: 2,
            to: 1,
            len: 5,
        };
        assert_eq!(copy.to_string(), "copy { from: 1, to: 2, len: 5 }");
        assert_eq!(moved.to_string(), "move { from: 2, to: 1, len: 5 }");
        assert_eq!(
            DelegateEvent::Clear { registry: 7 }.to_string(),
            "clear { registry: 7 }"
        );
    }

    #[test]
    #[serial]
    fn test_trace_callback_receives_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        set_trace_callback(move |e| events_clone.lock().unwrap().push(e.clone()));

        // Ids far above anything the unit tests allocate.
        emit_event(&DelegateEvent::Clear { registry: 900_001 });

        clear_trace_callback();
        emit_event(&DelegateEvent::Clear { registry: 900_002 });

        let captured: Vec<DelegateEvent> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DelegateEvent::Clear { registry } if *registry >= 900_000))
            .cloned()
            .collect();
        assert_eq!(captured, vec![DelegateEvent::Clear { registry: 900_001 }]);
    }
}
