#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use conflux::prelude::*;
use tokio::time::timeout;

/// Upper bound on any single completion wait in tests, so a wedged pipeline
/// fails fast instead of hanging the suite.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

static INIT_TRACING: Once = Once::new();

pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub type SharedItems<T> = Arc<Mutex<Vec<T>>>;

/// An action container that appends every received item to a shared vector.
pub fn collecting_sink<T: Send + 'static>() -> (ActionContainer<T>, SharedItems<T>) {
    let items: SharedItems<T> = Arc::default();
    let sink_items = items.clone();
    let sink = ActionContainer::new(ContainerOptions::default(), move |item: T| {
        let sink_items = sink_items.clone();
        async move {
            sink_items.lock().unwrap().push(item);
            Ok(())
        }
    })
    .expect("failed to build collecting sink");
    (sink, items)
}

/// Waits for a completion with the suite timeout.
pub async fn wait_terminal(completion: &Completion) -> Outcome {
    timeout(WAIT_TIMEOUT, completion.wait())
        .await
        .expect("completion timed out, the pipeline is stuck")
}
