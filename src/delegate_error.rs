use thiserror::Error;

/// Errors reported by delegates and multicast delegates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegateError {
    /// A multicast delegate was invoked while holding no callbacks.
    #[error("Invoked a multicast delegate with no callbacks")]
    EmptyInvocation,

    /// A layout-keyed closure is too large to be compared byte for byte.
    #[error("Closure layout of {size} bytes is not supported for equality (max {max} bytes)")]
    UnsupportedEqualityLayout { size: usize, max: usize },

    /// A bound method was requested for a receiver that no longer exists.
    #[error("Receiver of type {type_name} was dropped before the delegate was created")]
    ReceiverDropped { type_name: &'static str },
}
