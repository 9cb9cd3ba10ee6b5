//! A single callable target with a well-defined identity.
//!
//! A [`Delegate`] wraps exactly one of:
//!
//! - a plain function pointer, compared by address;
//! - a method bound to a shared receiver, compared by receiver identity and method;
//! - a closure, compared by an explicit [`ClosureKey`].
//!
//! Closures are never compared by looking at their memory unless the caller opts into
//! [`Delegate::from_closure_layout`].

use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt, mem, ptr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::DelegateError;

/// Largest closure, in bytes, accepted by [`Delegate::from_closure_layout`].
///
/// A policy cap, not a storage limit: layout keys are meant for closures capturing a
/// few scalars or references. Larger closures should carry an explicit [`ClosureKey`].
pub const MAX_LAYOUT_BYTES: usize = 64;

/// Source of keys for closures registered without an explicit key.
static NEXT_UNIQUE_KEY: AtomicU64 = AtomicU64::new(1);

// -------------------------------------------------------------------------------------------------
// Kinds and keys
// -------------------------------------------------------------------------------------------------

/// The variant a [`Delegate`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateKind {
    Function,
    Method,
    Closure,
}

impl fmt::Display for DelegateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegateKind::Function => write!(f, "function"),
            DelegateKind::Method => write!(f, "method"),
            DelegateKind::Closure => write!(f, "closure"),
        }
    }
}

/// Identity token attached to a closure delegate.
///
/// Two closure delegates are equal exactly when their keys are equal. Keys of
/// different kinds never compare equal.
///
/// # Examples
///
/// ```rust
/// use multicast_delegates::ClosureKey;
/// use std::sync::Arc;
///
/// let owner = Arc::new(5u32);
/// assert_eq!(ClosureKey::id(3), ClosureKey::id(3));
/// assert_eq!(ClosureKey::receiver(&owner), ClosureKey::receiver(&owner.clone()));
/// assert_ne!(ClosureKey::receiver(&owner), ClosureKey::receiver(&Arc::new(5u32)));
/// assert_ne!(ClosureKey::id(3), ClosureKey::name("3"));
/// ```
#[derive(Clone)]
pub enum ClosureKey {
    /// Caller-supplied numeric id.
    Id(u64),
    /// Caller-supplied name.
    Name(Cow<'static, str>),
    /// Identity of a shared object captured by the closure.
    ///
    /// The key holds a strong reference, so the address cannot be reused while it lives.
    Receiver(Arc<dyn Any + Send + Sync>),
    /// Assigned by [`Delegate::from_closure`]; shared only by clones of that delegate.
    Unique(u64),
    /// Snapshot of the closure's captured bytes, see [`Delegate::from_closure_layout`].
    Layout(LayoutKey),
}

impl ClosureKey {
    pub fn id(id: u64) -> Self {
        ClosureKey::Id(id)
    }

    pub fn name(name: impl Into<Cow<'static, str>>) -> Self {
        ClosureKey::Name(name.into())
    }

    /// Key identifying `receiver` by reference, not by value.
    pub fn receiver<T: Send + Sync + 'static>(receiver: &Arc<T>) -> Self {
        ClosureKey::Receiver(receiver.clone())
    }

    fn unique() -> Self {
        ClosureKey::Unique(NEXT_UNIQUE_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl PartialEq for ClosureKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClosureKey::Id(a), ClosureKey::Id(b)) => a == b,
            (ClosureKey::Name(a), ClosureKey::Name(b)) => a == b,
            (ClosureKey::Receiver(a), ClosureKey::Receiver(b)) => {
                ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (ClosureKey::Unique(a), ClosureKey::Unique(b)) => a == b,
            (ClosureKey::Layout(a), ClosureKey::Layout(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ClosureKey {}

impl fmt::Debug for ClosureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosureKey::Id(id) => f.debug_tuple("Id").field(id).finish(),
            ClosureKey::Name(name) => f.debug_tuple("Name").field(name).finish(),
            ClosureKey::Receiver(receiver) => f
                .debug_tuple("Receiver")
                .field(&Arc::as_ptr(receiver).cast::<()>())
                .finish(),
            ClosureKey::Unique(id) => f.debug_tuple("Unique").field(id).finish(),
            ClosureKey::Layout(layout) => f.debug_tuple("Layout").field(layout).finish(),
        }
    }
}

/// Closure type plus a copy of its captured bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct LayoutKey {
    type_id: TypeId,
    bytes: Box<[u8]>,
}

impl LayoutKey {
    /// Number of captured bytes in the snapshot.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for LayoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutKey")
            .field("size", &self.bytes.len())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
// Type-erased targets
// -------------------------------------------------------------------------------------------------

/// A method bound to a receiver, with the receiver type erased.
trait MethodTarget<A, R>: Send + Sync {
    fn call(&self, args: A) -> R;

    fn same_target(&self, other: &dyn MethodTarget<A, R>) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn receiver_type(&self) -> &'static str;
}

struct BoundMethod<T, A, R> {
    receiver: Arc<T>,
    method: fn(&T, A) -> R,
}

impl<T, A, R> MethodTarget<A, R> for BoundMethod<T, A, R>
where
    T: Send + Sync + 'static,
    A: 'static,
    R: 'static,
{
    fn call(&self, args: A) -> R {
        (self.method)(&self.receiver, args)
    }

    fn same_target(&self, other: &dyn MethodTarget<A, R>) -> bool {
        // A failed downcast means a different receiver type.
        other.as_any().downcast_ref::<Self>().is_some_and(|other| {
            Arc::ptr_eq(&self.receiver, &other.receiver)
                && ptr::fn_addr_eq(self.method, other.method)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn receiver_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A cloneable closure with its concrete type erased.
trait ClosureTarget<A, R>: Send + Sync {
    fn invoke(&self, args: A) -> R;

    fn clone_box(&self) -> Box<dyn ClosureTarget<A, R>>;
}

impl<F, A, R> ClosureTarget<A, R> for F
where
    F: Fn(A) -> R + Clone + Send + Sync + 'static,
{
    fn invoke(&self, args: A) -> R {
        self(args)
    }

    fn clone_box(&self) -> Box<dyn ClosureTarget<A, R>> {
        Box::new(self.clone())
    }
}

enum Target<A, R> {
    Function(fn(A) -> R),
    Method(Arc<dyn MethodTarget<A, R>>),
    Closure {
        key: ClosureKey,
        f: Box<dyn ClosureTarget<A, R>>,
    },
}

// -------------------------------------------------------------------------------------------------
// Delegate
// -------------------------------------------------------------------------------------------------

/// One invocable target taking `A` and returning `R`.
///
/// Several arguments are passed as a tuple, no arguments as `()`.
///
/// # Examples
///
/// ```rust
/// use multicast_delegates::Delegate;
///
/// fn double(x: i32) -> i32 {
///     x * 2
/// }
///
/// fn triple(x: i32) -> i32 {
///     x * 3
/// }
///
/// let d = Delegate::from_fn(double);
/// assert_eq!(d.invoke(21), 42);
/// assert_eq!(d, Delegate::from_fn(double));
/// assert_ne!(d, Delegate::from_fn(triple));
/// ```
pub struct Delegate<A, R = ()> {
    target: Target<A, R>,
}

impl<A, R> Delegate<A, R> {
    /// Wraps a plain function. Identity is the function address.
    pub fn from_fn(f: fn(A) -> R) -> Self {
        Self {
            target: Target::Function(f),
        }
    }

    /// Binds `method` to a shared `receiver`.
    ///
    /// Two bound methods are equal when they share the same receiver allocation and
    /// the same method. Receivers are shared, so methods take `&T`; use interior
    /// mutability for state the method changes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multicast_delegates::Delegate;
    /// use std::sync::atomic::{AtomicI32, Ordering};
    /// use std::sync::Arc;
    ///
    /// struct Counter(AtomicI32);
    ///
    /// impl Counter {
    ///     fn add(&self, by: i32) -> i32 {
    ///         self.0.fetch_add(by, Ordering::SeqCst) + by
    ///     }
    /// }
    ///
    /// let counter = Arc::new(Counter(AtomicI32::new(0)));
    /// let d = Delegate::from_method(counter.clone(), Counter::add);
    /// assert_eq!(d.invoke(5), 5);
    /// assert_eq!(d, Delegate::from_method(counter, Counter::add));
    /// ```
    pub fn from_method<T>(receiver: Arc<T>, method: fn(&T, A) -> R) -> Self
    where
        T: Send + Sync + 'static,
        A: 'static,
        R: 'static,
    {
        Self {
            target: Target::Method(Arc::new(BoundMethod { receiver, method })),
        }
    }

    /// Binds `method` to the receiver behind `receiver`, if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`DelegateError::ReceiverDropped`] when the receiver no longer exists.
    pub fn from_weak<T>(receiver: &Weak<T>, method: fn(&T, A) -> R) -> Result<Self, DelegateError>
    where
        T: Send + Sync + 'static,
        A: 'static,
        R: 'static,
    {
        let receiver = receiver.upgrade().ok_or(DelegateError::ReceiverDropped {
            type_name: std::any::type_name::<T>(),
        })?;
        Ok(Self::from_method(receiver, method))
    }

    /// Wraps a closure under a freshly assigned key.
    ///
    /// Only clones of the returned delegate compare equal to it, so keep a clone
    /// around to remove it later.
    pub fn from_closure<F>(f: F) -> Self
    where
        F: Fn(A) -> R + Clone + Send + Sync + 'static,
    {
        Self::from_keyed_closure(ClosureKey::unique(), f)
    }

    /// Wraps a closure whose identity is `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multicast_delegates::{ClosureKey, Delegate};
    ///
    /// let offset = 10;
    /// let a = Delegate::from_keyed_closure(ClosureKey::name("offset"), move |x: i32| x + offset);
    /// let b = Delegate::from_keyed_closure(ClosureKey::name("offset"), move |x: i32| x + offset);
    /// assert_eq!(a, b);
    /// assert_eq!(a.invoke(1), 11);
    /// ```
    pub fn from_keyed_closure<F>(key: ClosureKey, f: F) -> Self
    where
        F: Fn(A) -> R + Clone + Send + Sync + 'static,
    {
        Self {
            target: Target::Closure {
                key,
                f: Box::new(f),
            },
        }
    }

    /// Wraps a closure whose identity is its type plus a copy of its captured bytes.
    ///
    /// Two delegates built this way are equal when they come from the same closure
    /// expression with bit-identical captures. This is an approximation: captures that
    /// are equal by value but differ in representation compare unequal.
    ///
    /// # Errors
    ///
    /// Returns [`DelegateError::UnsupportedEqualityLayout`] when the closure is larger
    /// than [`MAX_LAYOUT_BYTES`].
    ///
    /// # Safety
    ///
    /// The caller guarantees that `F` contains no padding and no uninitialized bytes,
    /// for example a closure capturing only integers of the same width or references.
    pub unsafe fn from_closure_layout<F>(f: F) -> Result<Self, DelegateError>
    where
        F: Fn(A) -> R + Clone + Send + Sync + 'static,
    {
        let size = mem::size_of::<F>();
        if size > MAX_LAYOUT_BYTES {
            return Err(DelegateError::UnsupportedEqualityLayout {
                size,
                max: MAX_LAYOUT_BYTES,
            });
        }

        // SAFETY: `f` is live for `size` bytes and the caller guarantees every byte is
        // initialized.
        let bytes = unsafe { std::slice::from_raw_parts(ptr::from_ref(&f).cast::<u8>(), size) };
        let key = ClosureKey::Layout(LayoutKey {
            type_id: TypeId::of::<F>(),
            bytes: bytes.into(),
        });

        Ok(Self::from_keyed_closure(key, f))
    }

    /// Calls the target.
    pub fn invoke(&self, args: A) -> R {
        match &self.target {
            Target::Function(f) => f(args),
            Target::Method(method) => method.call(args),
            Target::Closure { f, .. } => f.invoke(args),
        }
    }

    pub fn kind(&self) -> DelegateKind {
        match &self.target {
            Target::Function(_) => DelegateKind::Function,
            Target::Method(_) => DelegateKind::Method,
            Target::Closure { .. } => DelegateKind::Closure,
        }
    }

    /// The key of a closure delegate, `None` for other kinds.
    pub fn closure_key(&self) -> Option<&ClosureKey> {
        match &self.target {
            Target::Closure { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl<A, R> Clone for Delegate<A, R> {
    fn clone(&self) -> Self {
        let target = match &self.target {
            Target::Function(f) => Target::Function(*f),
            Target::Method(method) => Target::Method(Arc::clone(method)),
            Target::Closure { key, f } => Target::Closure {
                key: key.clone(),
                f: f.clone_box(),
            },
        };
        Self { target }
    }
}

impl<A, R> PartialEq for Delegate<A, R> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (Target::Function(a), Target::Function(b)) => ptr::fn_addr_eq(*a, *b),
            (Target::Method(a), Target::Method(b)) => a.same_target(b.as_ref()),
            (Target::Closure { key: a, .. }, Target::Closure { key: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl<A, R> Eq for Delegate<A, R> {}

impl<A, R> From<fn(A) -> R> for Delegate<A, R> {
    fn from(f: fn(A) -> R) -> Self {
        Self::from_fn(f)
    }
}

impl<A, R> fmt::Debug for Delegate<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Function(function) => f
                .debug_struct("Delegate")
                .field("kind", &DelegateKind::Function)
                .field("address", &(*function as usize as *const ()))
                .finish(),
            Target::Method(method) => f
                .debug_struct("Delegate")
                .field("kind", &DelegateKind::Method)
                .field("receiver", &method.receiver_type())
                .finish(),
            Target::Closure { key, .. } => f
                .debug_struct("Delegate")
                .field("kind", &DelegateKind::Closure)
                .field("key", key)
                .finish(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
