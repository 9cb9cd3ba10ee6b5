//! An ordered, thread-safe list of delegates invoked together.
//!
//! A [`MulticastDelegate`] guards its callbacks with one mutex per instance. Every
//! operation takes `&self`, so a multicast delegate is usually shared through an `Arc`.
//!
//! # Examples
//!
//! ```
//! use multicast_delegates::{Delegate, MulticastDelegate};
//!
//! fn double(x: i32) -> i32 {
//!     x * 2
//! }
//!
//! fn square(x: i32) -> i32 {
//!     x * x
//! }
//!
//! let mut handlers: MulticastDelegate<i32, i32> = MulticastDelegate::new();
//! handlers += Delegate::from_fn(double);
//! handlers += Delegate::from_fn(square);
//!
//! // Every handler runs, the last result wins.
//! assert_eq!(handlers.invoke(3), Ok(9));
//!
//! handlers -= Delegate::from_fn(square);
//! assert_eq!(handlers.invoke(3), Ok(6));
//! ```

use std::{
    fmt, mem,
    ops::{AddAssign, SubAssign},
    ptr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError, TryLockError,
    },
};

use crate::delegate_event::emit_event;
use crate::{Delegate, DelegateError, DelegateEvent};

/// Source of instance ids. Ids order lock acquisition between two instances.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Callbacks<A, R> = Vec<Delegate<A, R>>;

/// Ordered, thread-safe collection of [`Delegate`]s sharing one signature.
pub struct MulticastDelegate<A, R = ()> {
    id: u64,
    callbacks: Mutex<Callbacks<A, R>>,
}

impl<A, R> MulticastDelegate<A, R> {
    /// Creates an empty multicast delegate.
    pub fn new() -> Self {
        Self::with_callbacks(Vec::new())
    }

    fn with_callbacks(callbacks: Callbacks<A, R>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            callbacks: Mutex::new(callbacks),
        }
    }

    /// Process-unique id of this instance, as reported in [`DelegateEvent`]s.
    pub fn id(&self) -> u64 {
        self.id
    }

    // Handlers never leave the list half-mutated when they panic, so a poisoned
    // lock still guards a consistent list.
    fn lock(&self) -> MutexGuard<'_, Callbacks<A, R>> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks both instances, lower id first. Returns `(self, other)` guards.
    fn lock_pair<'a>(
        &'a self,
        other: &'a Self,
    ) -> (MutexGuard<'a, Callbacks<A, R>>, MutexGuard<'a, Callbacks<A, R>>) {
        if self.id < other.id {
            let this = self.lock();
            let other = other.lock();
            (this, other)
        } else {
            let other = other.lock();
            let this = self.lock();
            (this, other)
        }
    }

    /// Appends `delegate` after every callback already registered.
    pub fn add(&self, delegate: Delegate<A, R>) {
        let kind = delegate.kind();
        let len = {
            let mut callbacks = self.lock();
            callbacks.push(delegate);
            callbacks.len()
        };

        emit_event(&DelegateEvent::Add {
            registry: self.id,
            kind,
            len,
        });
    }

    /// Removes the most recently added callback equal to `delegate`.
    ///
    /// Returns `false`, and changes nothing, when no callback matches. The order of
    /// the remaining callbacks is preserved.
    pub fn remove(&self, delegate: &Delegate<A, R>) -> bool {
        let (removed, len) = {
            let mut callbacks = self.lock();
            let removed = callbacks
                .iter()
                .rposition(|candidate| candidate == delegate)
                .map(|index| callbacks.remove(index));
            (removed, callbacks.len())
        };

        let found = removed.is_some();
        // Dropped here, outside the lock.
        drop(removed);

        emit_event(&DelegateEvent::Remove {
            registry: self.id,
            removed: found,
            len,
        });
        found
    }

    /// Invokes every callback in insertion order and returns the last result.
    ///
    /// Each callback but the last receives a clone of `args`. All callbacks run on the
    /// calling thread while the lock is held, so concurrent `add`, `remove` and
    /// `invoke` calls wait until the traversal finishes.
    ///
    /// A callback must not call back into a mutating or invoking operation of the
    /// same multicast delegate: the lock is not re-entrant and the call deadlocks.
    ///
    /// # Errors
    ///
    /// Returns [`DelegateError::EmptyInvocation`] when no callback is registered.
    pub fn invoke(&self, args: A) -> Result<R, DelegateError>
    where
        A: Clone,
    {
        let callbacks = self.lock();
        let count = callbacks.len();

        let result = match callbacks.split_last() {
            Some((last, rest)) => {
                for callback in rest {
                    callback.invoke(args.clone());
                }
                Ok(last.invoke(args))
            }
            None => Err(DelegateError::EmptyInvocation),
        };
        drop(callbacks);

        emit_event(&DelegateEvent::Invoke {
            registry: self.id,
            callbacks: count,
        });
        result
    }

    /// Replaces this instance's callbacks with a copy of `other`'s.
    ///
    /// Both locks are held during the copy, acquired in id order, so two threads
    /// copying in opposite directions cannot deadlock. Copying from `self` is a no-op.
    pub fn copy_from(&self, other: &Self) {
        if ptr::eq(self, other) {
            return;
        }

        let (len, previous) = {
            let (mut this, source) = self.lock_pair(other);
            let previous = mem::replace(&mut *this, source.clone());
            (this.len(), previous)
        };
        drop(previous);

        emit_event(&DelegateEvent::Copy {
            from: other.id,
            to: self.id,
            len,
        });
    }

    /// Moves every callback of `other` into this instance, leaving `other` empty.
    ///
    /// Uses the same lock ordering as [`copy_from`](Self::copy_from). Moving from
    /// `self` is a no-op.
    pub fn move_from(&self, other: &Self) {
        if ptr::eq(self, other) {
            return;
        }

        let (len, previous) = {
            let (mut this, mut source) = self.lock_pair(other);
            let previous = mem::replace(&mut *this, mem::take(&mut *source));
            (this.len(), previous)
        };
        drop(previous);

        emit_event(&DelegateEvent::Move {
            from: other.id,
            to: self.id,
            len,
        });
    }

    /// Moves every callback into a new multicast delegate, leaving this one empty.
    pub fn take(&self) -> Self {
        let callbacks = mem::take(&mut *self.lock());
        let taken = Self::with_callbacks(callbacks);

        emit_event(&DelegateEvent::Move {
            from: self.id,
            to: taken.id,
            len: taken.len(),
        });
        taken
    }

    /// Drops every callback.
    pub fn clear(&self) {
        let previous = mem::take(&mut *self.lock());
        drop(previous);

        emit_event(&DelegateEvent::Clear { registry: self.id });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a callback equal to `delegate` is registered.
    pub fn contains(&self, delegate: &Delegate<A, R>) -> bool {
        self.lock().iter().any(|candidate| candidate == delegate)
    }

    /// A copy of the callbacks, in invocation order.
    pub fn snapshot(&self) -> Vec<Delegate<A, R>> {
        self.lock().clone()
    }
}

impl<A, R> Default for MulticastDelegate<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Clone for MulticastDelegate<A, R> {
    fn clone(&self) -> Self {
        let copy = Self::with_callbacks(self.snapshot());

        emit_event(&DelegateEvent::Copy {
            from: self.id,
            to: copy.id,
            len: copy.len(),
        });
        copy
    }

    fn clone_from(&mut self, source: &Self) {
        self.copy_from(source);
    }
}

impl<A, R> From<Delegate<A, R>> for MulticastDelegate<A, R> {
    fn from(delegate: Delegate<A, R>) -> Self {
        let multicast = Self::new();
        multicast.add(delegate);
        multicast
    }
}

impl<A, R> From<fn(A) -> R> for MulticastDelegate<A, R> {
    fn from(f: fn(A) -> R) -> Self {
        Self::from(Delegate::from_fn(f))
    }
}

impl<A, R> FromIterator<Delegate<A, R>> for MulticastDelegate<A, R> {
    fn from_iter<I: IntoIterator<Item = Delegate<A, R>>>(iter: I) -> Self {
        Self::with_callbacks(iter.into_iter().collect())
    }
}

impl<A, R> AddAssign<Delegate<A, R>> for MulticastDelegate<A, R> {
    fn add_assign(&mut self, delegate: Delegate<A, R>) {
        self.add(delegate);
    }
}

impl<A, R> AddAssign<fn(A) -> R> for MulticastDelegate<A, R> {
    fn add_assign(&mut self, f: fn(A) -> R) {
        self.add(Delegate::from_fn(f));
    }
}

impl<'a, A, R> SubAssign<&'a Delegate<A, R>> for MulticastDelegate<A, R> {
    fn sub_assign(&mut self, delegate: &'a Delegate<A, R>) {
        self.remove(delegate);
    }
}

impl<A, R> SubAssign<Delegate<A, R>> for MulticastDelegate<A, R> {
    fn sub_assign(&mut self, delegate: Delegate<A, R>) {
        self.remove(&delegate);
    }
}

impl<A, R> SubAssign<fn(A) -> R> for MulticastDelegate<A, R> {
    fn sub_assign(&mut self, f: fn(A) -> R) {
        self.remove(&Delegate::from_fn(f));
    }
}

impl<A, R> fmt::Debug for MulticastDelegate<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MulticastDelegate");
        debug.field("id", &self.id);

        // Formatting from inside a callback must not deadlock.
        match self.callbacks.try_lock() {
            Ok(callbacks) => debug.field("callbacks", &*callbacks).finish(),
            Err(TryLockError::Poisoned(poisoned)) => {
                debug.field("callbacks", &*poisoned.into_inner()).finish()
            }
            Err(TryLockError::WouldBlock) => {
                debug.field("callbacks", &format_args!("<locked>")).finish()
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClosureKey;
    use std::sync::atomic::AtomicI32;
    use std::sync::{Arc, Barrier};
    use std::thread;

    struct Counter {
        value: AtomicI32,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Counter {
                value: AtomicI32::new(0),
            })
        }

        fn increase(&self, _: ()) -> i32 {
            self.value.fetch_add(5, Ordering::SeqCst) + 5
        }

        fn decrease(&self, _: ()) -> i32 {
            self.value.fetch_sub(5, Ordering::SeqCst) - 5
        }

        fn get(&self) -> i32 {
            self.value.load(Ordering::SeqCst)
        }
    }

    fn identity(x: i32) -> i32 {
        x
    }

    fn negate(x: i32) -> i32 {
        -x
    }

    #[test]
    fn test_invoke_empty_fails() {
        let multicast: MulticastDelegate<i32, i32> = MulticastDelegate::new();
        assert_eq!(multicast.invoke(1), Err(DelegateError::EmptyInvocation));
    }

    #[test]
    fn test_invoke_increase_then_decrease() {
        let counter = Counter::new();
        let mut multicast: MulticastDelegate<(), i32> = MulticastDelegate::new();
        multicast += Delegate::from_method(counter.clone(), Counter::increase);
        multicast += Delegate::from_method(counter.clone(), Counter::decrease);

        // `decrease` runs last and its result is returned.
        assert_eq!(multicast.invoke(()), Ok(0));
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_invoke_runs_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let multicast: MulticastDelegate<(), usize> = MulticastDelegate::new();
        for i in 0..4 {
            let order = order.clone();
            multicast.add(Delegate::from_closure(move |_: ()| {
                order.lock().unwrap().push(i);
                i
            }));
        }

        assert_eq!(multicast.invoke(()), Ok(3));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_add_then_remove_restores_sequence() {
        let multicast = MulticastDelegate::from(identity as fn(i32) -> i32);
        let before = multicast.snapshot();

        let extra = Delegate::from_fn(negate);
        multicast.add(extra.clone());
        assert_eq!(multicast.len(), 2);
        assert!(multicast.remove(&extra));

        assert_eq!(multicast.snapshot(), before);
    }

    #[test]
    fn test_remove_prefers_most_recent() {
        let multicast: MulticastDelegate<i32, i32> = MulticastDelegate::new();
        let first = Delegate::from_keyed_closure(ClosureKey::id(1), |x: i32| x + 100);
        let second = Delegate::from_keyed_closure(ClosureKey::id(1), |x: i32| x + 200);
        multicast.add(first);
        multicast.add(Delegate::from_fn(negate));
        multicast.add(second);

        // Keys match, so the later registration goes first.
        assert!(multicast.remove(&Delegate::from_keyed_closure(ClosureKey::id(1), |x: i32| x)));

        assert_eq!(multicast.len(), 2);
        assert_eq!(multicast.invoke(1), Ok(-1));
        assert_eq!(multicast.snapshot()[0].invoke(1), 101);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let multicast = MulticastDelegate::from(identity as fn(i32) -> i32);
        assert!(!multicast.remove(&Delegate::from_fn(negate)));
        assert_eq!(multicast.len(), 1);
    }

    #[test]
    fn test_operators() {
        let mut multicast: MulticastDelegate<i32, i32> = MulticastDelegate::default();
        multicast += identity as fn(i32) -> i32;
        multicast += negate as fn(i32) -> i32;
        multicast += negate as fn(i32) -> i32;
        multicast -= negate as fn(i32) -> i32;

        assert_eq!(multicast.len(), 2);
        assert_eq!(multicast.invoke(4), Ok(-4));

        let d = Delegate::from_fn(negate);
        multicast -= &d;
        multicast -= Delegate::from_fn(identity);
        assert!(multicast.is_empty());
    }

    #[test]
    fn test_contains_and_clear() {
        let multicast: MulticastDelegate<i32, i32> =
            [Delegate::from_fn(identity), Delegate::from_fn(negate)]
                .into_iter()
                .collect();
        assert!(multicast.contains(&Delegate::from_fn(negate)));

        multicast.clear();
        assert!(multicast.is_empty());
        assert!(!multicast.contains(&Delegate::from_fn(negate)));
    }

    #[test]
    fn test_clone_is_independent() {
        let counter = Counter::new();
        let original = MulticastDelegate::from(Delegate::from_method(counter.clone(), Counter::increase));
        let copy = original.clone();
        assert_ne!(copy.id(), original.id());

        original.add(Delegate::from_method(counter.clone(), Counter::decrease));
        assert_eq!(original.len(), 2);
        assert_eq!(copy.len(), 1);

        // Both share the same receiver.
        copy.invoke(()).unwrap();
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_clone_from_uses_copy_from() {
        let source = MulticastDelegate::from(identity as fn(i32) -> i32);
        let mut target = MulticastDelegate::from(negate as fn(i32) -> i32);
        let target_id = target.id();

        target.clone_from(&source);
        assert_eq!(target.id(), target_id);
        assert_eq!(target.invoke(3), Ok(3));
    }

    #[test]
    fn test_copy_from_self_is_noop() {
        let multicast = MulticastDelegate::from(identity as fn(i32) -> i32);
        multicast.copy_from(&multicast);
        multicast.move_from(&multicast);
        assert_eq!(multicast.len(), 1);
    }

    #[test]
    fn test_move_from_empties_source() {
        let source = MulticastDelegate::from(identity as fn(i32) -> i32);
        source.add(Delegate::from_fn(negate));
        let target = MulticastDelegate::from(identity as fn(i32) -> i32);

        target.move_from(&source);
        assert!(source.is_empty());
        assert_eq!(target.len(), 2);
        assert_eq!(target.invoke(2), Ok(-2));
    }

    #[test]
    fn test_take() {
        let source = MulticastDelegate::from(negate as fn(i32) -> i32);
        let taken = source.take();
        assert!(source.is_empty());
        assert_eq!(taken.invoke(8), Ok(-8));
        assert_eq!(source.invoke(8), Err(DelegateError::EmptyInvocation));
    }

    #[test]
    fn test_concurrent_add() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let multicast: Arc<MulticastDelegate<(), ()>> = Arc::new(MulticastDelegate::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let multicast = multicast.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        let id = (t * PER_THREAD + i) as u64;
                        multicast.add(Delegate::from_keyed_closure(ClosureKey::id(id), |_: ()| ()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = multicast.snapshot();
        assert_eq!(snapshot.len(), THREADS * PER_THREAD);
        for id in 0..(THREADS * PER_THREAD) as u64 {
            let probe = Delegate::from_keyed_closure(ClosureKey::id(id), |_: ()| ());
            assert_eq!(snapshot.iter().filter(|d| **d == probe).count(), 1);
        }
    }

    #[test]
    fn test_opposite_copies_do_not_deadlock() {
        let a = Arc::new(MulticastDelegate::from(identity as fn(i32) -> i32));
        let b = Arc::new(MulticastDelegate::from(negate as fn(i32) -> i32));
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |to: Arc<MulticastDelegate<i32, i32>>, from: Arc<MulticastDelegate<i32, i32>>| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..1_000 {
                    to.copy_from(&from);
                }
            })
        };

        let first = spawn(a.clone(), b.clone());
        let second = spawn(b.clone(), a.clone());
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_poisoned_lock_recovers() {
        let multicast: Arc<MulticastDelegate<(), ()>> = Arc::new(MulticastDelegate::new());
        multicast.add(Delegate::from_closure(|_: ()| panic!("handler failed")));

        let shared = multicast.clone();
        let result = thread::spawn(move || shared.invoke(())).join();
        assert!(result.is_err());

        assert_eq!(multicast.len(), 1);
        multicast.clear();
        multicast.add(Delegate::from_closure(|_: ()| ()));
        assert_eq!(multicast.invoke(()), Ok(()));
    }

    #[test]
    fn test_debug_while_locked() {
        let multicast = MulticastDelegate::from(identity as fn(i32) -> i32);
        let rendered = format!("{:?}", multicast);
        assert!(rendered.contains("MulticastDelegate"));
        assert!(rendered.contains("Function"));

        let _guard = multicast.lock();
        assert!(format!("{:?}", multicast).contains("<locked>"));
    }
}
