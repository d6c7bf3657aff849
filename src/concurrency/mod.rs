//! Coordination primitives shared by blocks and containers.

pub mod completion;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// All state guarded by these mutexes stays consistent across panics (plain
/// collections mutated in place with no intermediate states), so poisoning
/// carries no information we need to act on.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
