// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! A mutex that can be safely (if unsuccessfully) locked from a signal handler.
//!
//! An ordinary spin lock deadlocks if a signal handler tries to lock it while the interrupted
//! code on the same thread is holding it: the handler spins forever waiting for a release that
//! can only happen after the handler returns. [`SignalSafeMutex`] pairs the spin lock with a
//! per-thread marker that is set *before* the spin lock is acquired and cleared *after* it is
//! released. A locking attempt that finds the marker already set knows it has interrupted its
//! own thread, and gives up immediately instead of spinning.
//!
//! The marker is per thread, not per mutex: a thread that is inside the critical section of any
//! `SignalSafeMutex` cannot lock any other one until it leaves.

use core::cell::Cell;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::Deref;
use core::ops::DerefMut;
use core::sync::atomic::compiler_fence;
use core::sync::atomic::Ordering;
use spin::Mutex;
use spin::MutexGuard;

thread_local! {
    // `const` initialization without a destructor compiles down to a plain thread-local access,
    // with no lazy initialization and no allocation.
    static HOLDING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as holding (or acquiring) a lock.
///
/// Returns `false` if the thread was already marked, or if the thread-local storage is not
/// available anymore (thread teardown).
#[inline]
fn enter() -> bool {
    let was_holding = HOLDING.try_with(|holding| holding.replace(true));
    // A signal handler runs on this same thread, so ordering against the compiler is enough.
    compiler_fence(Ordering::SeqCst);
    matches!(was_holding, Ok(false))
}

#[inline]
fn leave() {
    compiler_fence(Ordering::SeqCst);
    let _ = HOLDING.try_with(|holding| holding.set(false));
}

/// Returns `true` if the current thread is inside the critical section of a
/// [`SignalSafeMutex`], or is in the middle of acquiring one.
#[cfg(test)]
#[must_use]
pub(crate) fn is_held_by_current_thread() -> bool {
    HOLDING.try_with(Cell::get).unwrap_or(true)
}

pub(crate) struct SignalSafeMutex<T> {
    inner: Mutex<T>,
}

impl<T> SignalSafeMutex<T> {
    #[inline]
    #[must_use]
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the mutex, spinning while another thread holds it.
    ///
    /// Returns `None` without waiting if the current thread is already inside a critical section,
    /// which happens when this is called from a signal handler that interrupted a locked (or
    /// locking) section on the same thread.
    ///
    /// Neither acquiring nor releasing allocates memory or makes system calls.
    #[inline]
    pub(crate) fn lock(&self) -> Option<SignalSafeGuard<'_, T>> {
        if !enter() {
            return None;
        }
        Some(SignalSafeGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for SignalSafeMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSafeMutex")
            .field("inner", &self.inner)
            .finish()
    }
}

pub(crate) struct SignalSafeGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
}

impl<T> Deref for SignalSafeGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SignalSafeGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SignalSafeGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // The spin lock must be released before the marker is cleared: a signal arriving in
        // between then fails fast instead of spinning on a lock its own thread holds.
        // SAFETY: `guard` is not used after this point.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        leave();
    }
}
