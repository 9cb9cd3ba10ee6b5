//! Macros for declaring process-wide events.
//!
//! This module provides a macro-based approach to declare named, thread-safe
//! multicast delegates that any component can subscribe to.

/// Declares a process-wide event backed by a [`MulticastDelegate`](crate::MulticastDelegate).
///
/// The macro generates a module containing:
/// - Storage static (hidden)
/// - `subscribe`, `unsubscribe`, `emit`, `len`, `is_empty`, `clear` free functions
/// - `handle`, returning the underlying multicast delegate
///
/// `define_event!(name: A => R)` declares an event whose handlers take `A` and return
/// `R`; `define_event!(name: A)` declares one whose handlers return `()`.
///
/// # Examples
///
/// ```rust
/// use multicast_delegates::{define_event, Delegate};
///
/// define_event!(on_save: String => usize);
///
/// fn byte_count(path: String) -> usize {
///     path.len()
/// }
///
/// on_save::subscribe(Delegate::from_fn(byte_count));
/// assert_eq!(on_save::emit("notes.txt".to_string()), Ok(9));
///
/// assert!(on_save::unsubscribe(&Delegate::from_fn(byte_count)));
/// assert!(on_save::is_empty());
/// ```
///
/// # Multiple Events
///
/// Each declared event is isolated:
///
/// ```rust
/// use multicast_delegates::{define_event, Delegate};
///
/// define_event!(on_open: u32);
/// define_event!(on_close: u32);
///
/// on_open::subscribe(Delegate::from_closure(|_: u32| ()));
///
/// assert_eq!(on_open::len(), 1);
/// assert!(on_close::is_empty());
/// ```
#[macro_export]
macro_rules! define_event {
    ($name:ident : $args:ty) => {
        $crate::define_event!($name: $args => ());
    };
    ($name:ident : $args:ty => $ret:ty) => {
        pub mod $name {
            #![allow(dead_code)]

            #[allow(unused_imports)]
            use super::*;
            use std::sync::LazyLock;

            // Handlers of this event (module-private)
            static HANDLERS: LazyLock<$crate::MulticastDelegate<$args, $ret>> =
                LazyLock::new($crate::MulticastDelegate::new);

            /// The multicast delegate behind this event.
            pub fn handle() -> &'static $crate::MulticastDelegate<$args, $ret> {
                &HANDLERS
            }

            /// Append a handler.
            pub fn subscribe(handler: $crate::Delegate<$args, $ret>) {
                HANDLERS.add(handler)
            }

            /// Remove the most recently added handler equal to `handler`.
            pub fn unsubscribe(handler: &$crate::Delegate<$args, $ret>) -> bool {
                HANDLERS.remove(handler)
            }

            /// Invoke every handler; the last result is returned.
            pub fn emit(args: $args) -> Result<$ret, $crate::DelegateError> {
                HANDLERS.invoke(args)
            }

            pub fn len() -> usize {
                HANDLERS.len()
            }

            pub fn is_empty() -> bool {
                HANDLERS.is_empty()
            }

            /// Remove every handler.
            pub fn clear() {
                HANDLERS.clear()
            }
        }
    };
}
