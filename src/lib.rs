//! # Multicast Delegates
//!
//! Thread-safe delegates for registering, comparing and invoking callbacks.
//!
//! A [`Delegate`] wraps one callable target (a function, a method bound to a shared
//! receiver, or a closure) and knows when two targets are the same handler.
//! A [`MulticastDelegate`] keeps an ordered list of delegates, invokes all of them in
//! order and can be mutated from any thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use multicast_delegates::{Delegate, DelegateError, MulticastDelegate};
//!
//! fn log(message: &'static str) -> usize {
//!     message.len()
//! }
//!
//! let on_message: MulticastDelegate<&'static str, usize> = MulticastDelegate::new();
//! assert_eq!(on_message.invoke("hello"), Err(DelegateError::EmptyInvocation));
//!
//! on_message.add(Delegate::from_fn(log));
//! assert_eq!(on_message.invoke("hello"), Ok(5));
//!
//! on_message.remove(&Delegate::from_fn(log));
//! assert!(on_message.is_empty());
//! ```
//!
//! ## Features
//!
//! - **Thread-safe**: every operation locks the instance; copies lock both sides in a
//!   fixed order
//! - **Handler identity**: removal finds the most recently added equal delegate
//! - **Tracing support**: every operation emits a [`DelegateEvent`] through `tracing`
//!   and an optional callback
//!
//! ## Main Items
//!
//! - [`Delegate`] - a single callable target
//! - [`ClosureKey`] - identity token for closure delegates
//! - [`MulticastDelegate`] - the ordered, thread-safe list of delegates
//! - [`define_event!`] - declare a process-wide event
//! - [`set_trace_callback`] - observe multicast delegate operations

mod delegate;
mod delegate_error;
mod delegate_event;
mod macros;
mod multicast_delegate;

pub use delegate::{ClosureKey, Delegate, DelegateKind, LayoutKey, MAX_LAYOUT_BYTES};
pub use delegate_error::DelegateError;
pub use delegate_event::{clear_trace_callback, set_trace_callback, DelegateEvent, TraceCallback};
pub use multicast_delegate::MulticastDelegate;

/// Callback notified when a link store replaces `before` with `after`.
///
/// Returns the handler's decision for the write, typically a link or a status.
pub type WriteHandler<L> = Delegate<(Vec<L>, Vec<L>), L>;

/// Every [`WriteHandler`] subscribed to a link store.
pub type WriteHandlers<L> = MulticastDelegate<(Vec<L>, Vec<L>), L>;
