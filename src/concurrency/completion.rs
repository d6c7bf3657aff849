//! One-shot, multi-observer completion signaling.
//!
//! This module abstracts tokio's watch channels into a completion primitive
//! shared by blocks and containers: a unit resolves its completion exactly
//! once, and any number of observers can await or poll the terminal outcome.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Error;

/// Terminal outcome of a processing unit.
///
/// The failure payload is reference-counted so that every observer of a
/// completion sees the same error value without cloning the error itself.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The unit processed its whole input and shut down cleanly.
    Success,
    /// The unit failed, either originating the error or being faulted with it.
    Failed(Arc<Error>),
    /// The unit was canceled before finishing its input.
    Canceled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }

    /// Returns the failure cause, if this outcome is a failure.
    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Creates a linked completion transmitter/observer pair.
pub fn completion_pair() -> (CompletionTx, Completion) {
    let (tx, rx) = watch::channel(None);
    (CompletionTx { tx }, Completion { rx })
}

/// Transmitter side of a completion.
///
/// The first resolution wins; later attempts are ignored and reported via the
/// returned flag. This is what makes the completion wrapper and the fault
/// protocol safe to race against each other.
#[derive(Debug)]
pub struct CompletionTx {
    tx: watch::Sender<Option<Outcome>>,
}

impl CompletionTx {
    /// Resolves the completion with the given outcome.
    ///
    /// Returns true if this call was the one that resolved it.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = outcome.take();
                true
            } else {
                false
            }
        })
    }

    pub fn succeed(&self) -> bool {
        self.resolve(Outcome::Success)
    }

    pub fn fail(&self, error: Arc<Error>) -> bool {
        self.resolve(Outcome::Failed(error))
    }

    pub fn cancel(&self) -> bool {
        self.resolve(Outcome::Canceled)
    }
}

/// Observer side of a completion.
///
/// Cheap to clone; every clone observes the same single resolution.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
}

impl Completion {
    /// Returns the outcome if the unit already reached a terminal state.
    pub fn peek(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// Returns true once the unit reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Waits for the terminal outcome.
    ///
    /// A completion whose transmitter is dropped without resolving is
    /// reported as canceled, so observers can never hang on a unit that
    /// disappeared.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Outcome::Canceled;
            }
        }
    }
}
