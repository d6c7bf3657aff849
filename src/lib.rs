//! Composable asynchronous dataflow containers.
//!
//! Pipelines are built out of reusable, typed processing containers, each
//! owning one or more asynchronous blocks. Containers link into arbitrary
//! directed graphs: data flows along the edges, while completion and
//! failure propagate over the same topology with deterministic semantics.
//! Aggregated completion resolves only after every child did, one
//! originating failure tears a container down exactly once, and fan-out
//! never drops an item.
//!
//! Containers and blocks spawn worker tasks at construction time, so they
//! must be created within a Tokio runtime.

pub mod block;
pub mod broadcast;
pub mod concurrency;
pub mod container;
pub mod containers;
pub mod error;
mod link;
mod macros;
mod metrics;
mod naming;

pub mod prelude {
    //! Commonly used types and traits for building pipelines.

    pub use crate::bail;
    pub use crate::block::{BlockOptions, BlockUnit, InputPort, OutputPort, PostError};
    pub use crate::broadcast::Broadcaster;
    pub use crate::concurrency::completion::{Completion, Outcome};
    pub use crate::conflux_error;
    pub use crate::container::{
        AnyItem, Container, ContainerCore, ContainerOptions, DiscardRecorder, HasInput,
        HasOutput, InputOps, LinkDowncast, MonitorMode, OutputOps,
    };
    pub use crate::containers::{ActionContainer, TransformContainer};
    pub use crate::error::{Error, ErrorKind, Result};
}
