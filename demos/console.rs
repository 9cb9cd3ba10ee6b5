//! Console walkthrough of delegates and multicast delegates.
//!
//! Demonstrates:
//! - Registering plain functions, bound methods and keyed closures
//! - Removing the most recent matching registration
//! - Observing operations through `tracing`
//!
//! Run with: `cargo run --example console`

use multicast_delegates::{ClosureKey, Delegate, MulticastDelegate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn f(message: &'static str) {
    println!("f({message})");
}

fn g(message: &'static str) {
    println!("g({message})");
}

fn h(message: &'static str) {
    println!("h({message})");
}

struct Foo {
    id: usize,
    bar_calls: AtomicUsize,
    cbs_calls: AtomicUsize,
}

impl Foo {
    fn new(id: usize) -> Arc<Self> {
        Arc::new(Foo {
            id,
            bar_calls: AtomicUsize::new(0),
            cbs_calls: AtomicUsize::new(0),
        })
    }

    fn bar(&self, message: &'static str) {
        println!("foo({})::bar({message})", self.id);
        self.bar_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn cbs(&self, message: &'static str) {
        println!("foo({})::cbs({message})", self.id);
        self.cbs_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A closure binding `Foo::bar` to `foo`, identified by the receiver.
fn bind_bar(foo: &Arc<Foo>) -> Delegate<&'static str> {
    let receiver = foo.clone();
    Delegate::from_keyed_closure(ClosureKey::receiver(foo), move |message: &'static str| {
        receiver.bar(message)
    })
}

/// Keyed by name, so it never matches [`bind_bar`] on the same receiver.
fn bind_cbs(foo: &Arc<Foo>) -> Delegate<&'static str> {
    let receiver = foo.clone();
    Delegate::from_keyed_closure(ClosureKey::name(format!("cbs@{}", foo.id)), move |message: &'static str| {
        receiver.cbs(message)
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    println!("=== multicast-delegates: Console ===\n");

    let f0 = Foo::new(0);
    let f1 = Foo::new(1);

    let mut d0: MulticastDelegate<&'static str> = MulticastDelegate::new();

    d0 += f as fn(&'static str);
    d0 += g as fn(&'static str);
    d0 += g as fn(&'static str);
    d0 += h as fn(&'static str);

    d0 += Delegate::from_method(f0.clone(), Foo::bar);
    d0 += Delegate::from_method(f0.clone(), Foo::cbs);
    d0 += bind_bar(&f1);
    d0 += bind_cbs(&f1);

    if let Err(err) = d0.invoke("first call") {
        eprintln!("first call failed: {err}");
    }

    d0 -= g as fn(&'static str);
    d0 -= Delegate::from_method(f0.clone(), Foo::cbs);
    d0 -= bind_bar(&f1);

    println!();
    if let Err(err) = d0.invoke("second call") {
        eprintln!("second call failed: {err}");
    }

    println!(
        "\nfoo(0): bar {} / cbs {}, foo(1): bar {} / cbs {}",
        f0.bar_calls.load(Ordering::SeqCst),
        f0.cbs_calls.load(Ordering::SeqCst),
        f1.bar_calls.load(Ordering::SeqCst),
        f1.cbs_calls.load(Ordering::SeqCst),
    );
}
