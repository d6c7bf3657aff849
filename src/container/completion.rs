//! The completion wrapper installed around every registered child.

use std::sync::{Arc, Weak};

use tracing::error;

use crate::concurrency::completion::{Completion, Outcome, completion_pair};
use crate::container::ContainerCore;
use crate::error::{Error, ErrorKind, most_significant};

/// Callback invoked when a child completes successfully.
pub type SuccessCallback = Box<dyn FnOnce() -> crate::error::Result<()> + Send>;

/// Wraps a child's raw completion with the container's fault semantics.
///
/// The wrapped completion resolves with the classified outcome, and the
/// owning container is faulted exactly when the outcome represents a new
/// incident: an originating failure, a cancellation, or a failed success
/// callback. A child that failed with a propagated marker already is the
/// result of a fault, so its completion must not start another round.
pub(crate) fn wrap_child_completion(
    raw: Completion,
    unit_name: String,
    owner: Weak<ContainerCore>,
    on_success: Option<SuccessCallback>,
) -> Completion {
    let (tx, wrapped) = completion_pair();

    tokio::spawn(async move {
        match raw.wait().await {
            Outcome::Failed(cause) => {
                let cause = most_significant(&cause);
                tx.fail(cause.clone());
                if !cause.kind().is_propagated()
                    && let Some(owner) = owner.upgrade()
                {
                    owner.fault(&cause);
                }
            }
            Outcome::Canceled => {
                tx.cancel();
                if let Some(owner) = owner.upgrade() {
                    owner.fault(&Arc::new(Error::canceled()));
                }
            }
            Outcome::Success => match on_success {
                Some(callback) => match callback() {
                    Ok(()) => {
                        tx.succeed();
                    }
                    Err(callback_error) => {
                        let cause = Arc::new(Error::with_source(
                            ErrorKind::CallbackFailed {
                                unit: unit_name.clone(),
                            },
                            callback_error,
                        ));
                        error!(unit = %unit_name, error = %cause, "completion callback failed");
                        tx.fail(cause.clone());
                        if let Some(owner) = owner.upgrade() {
                            owner.fault(&cause);
                        }
                    }
                },
                None => {
                    tx.succeed();
                }
            },
        }
    });

    wrapped
}
