//! Process-wide naming for containers and blocks.
//!
//! Container display names are built from a human-readable friendly type name
//! plus a monotonic per-type counter, so two containers of the same type can
//! be told apart in logs without any coordination between call sites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

static COUNTERS: OnceLock<Mutex<HashMap<String, Arc<AtomicU64>>>> = OnceLock::new();

fn counter_for(friendly_name: &str) -> Arc<AtomicU64> {
    let counters = COUNTERS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut counters = counters.lock().unwrap_or_else(PoisonError::into_inner);
    counters
        .entry(friendly_name.to_string())
        .or_default()
        .clone()
}

/// Returns the next unique display name for the given friendly type name.
///
/// Counting starts at 1 and never resets for the lifetime of the process.
/// The lock is only held to look up the per-type counter; the increment
/// itself is a lock-free atomic operation.
pub fn next_instance_name(friendly_name: &str) -> String {
    let counter = counter_for(friendly_name);
    let sequence = counter.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{friendly_name}{sequence}")
}
