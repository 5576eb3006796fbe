// egl-runtime/src/lock.rs
//
//! Mutexes with a fixed acquisition order.
//!
//! Every lock in the driver has a level. A thread may only acquire a lock whose level is higher
//! than that of every lock it already holds: main, then thread table, then a surface. With
//! debug assertions (or the `sm-lock-order-check` feature) an out-of-order acquisition panics
//! instead of risking a deadlock.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

#[cfg(any(debug_assertions, feature = "sm-lock-order-check"))]
use std::cell::RefCell;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LockLevel {
    Main,
    ThreadTable,
    Surface,
}

#[cfg(any(debug_assertions, feature = "sm-lock-order-check"))]
thread_local! {
    static HELD_LOCKS: RefCell<Vec<LockLevel>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct OrderedMutex<T> {
    level: LockLevel,
    inner: Mutex<T>,
}

pub(crate) struct OrderedGuard<'a, T> {
    level: LockLevel,
    guard: MutexGuard<'a, T>,
}

impl<T> OrderedMutex<T> {
    pub(crate) fn new(level: LockLevel, value: T) -> OrderedMutex<T> {
        OrderedMutex { level, inner: Mutex::new(value) }
    }

    /// Blocks until the lock is available. A lock poisoned by a panicking thread is recovered.
    pub(crate) fn lock(&self) -> OrderedGuard<T> {
        check_order(self.level);
        let guard = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        OrderedGuard { level: self.level, guard }
    }
}

impl<'a, T> Deref for OrderedGuard<'a, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for OrderedGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T> Drop for OrderedGuard<'a, T> {
    fn drop(&mut self) {
        release_level(self.level);
    }
}

#[cfg(any(debug_assertions, feature = "sm-lock-order-check"))]
fn check_order(level: LockLevel) {
    HELD_LOCKS.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(&highest) = held.iter().max() {
            assert!(
                highest < level,
                "lock order violation: acquiring {:?} while holding {:?}",
                level,
                highest
            );
        }
        held.push(level);
    })
}

#[cfg(not(any(debug_assertions, feature = "sm-lock-order-check")))]
#[inline]
fn check_order(_: LockLevel) {}

#[cfg(any(debug_assertions, feature = "sm-lock-order-check"))]
fn release_level(level: LockLevel) {
    // Thread-local storage may already be gone while a guard drops during thread teardown.
    let _ = HELD_LOCKS.try_with(|held| {
        let mut held = held.borrow_mut();
        if let Some(position) = held.iter().rposition(|&held_level| held_level == level) {
            held.remove(position);
        }
    });
}

#[cfg(not(any(debug_assertions, feature = "sm-lock-order-check")))]
#[inline]
fn release_level(_: LockLevel) {}
