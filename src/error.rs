use std::sync::Arc;
use std::{error, fmt, result};

/// Type alias for convenience when using the Result type with our Error.
pub type Result<T> = result::Result<T, Error>;

/// Internal error representation with kind and optional source error.
///
/// Uses boxing to keep the public Error type size consistent and enable
/// rich error context without performance penalties for the success path.
struct ErrorInner {
    kind: ErrorKind,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

/// Error classification for dataflow container operations.
///
/// Kinds split into three groups: registration and wiring failures,
/// propagated markers that signal "a peer failed" without carrying the
/// peer's diagnosis, and originating failures surfaced by block bodies or
/// completion callbacks.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The aggregated completion was observed before any child was registered.
    NoChildRegistered,
    /// The same underlying block was registered twice in one container.
    DuplicateChild { unit: String },
    /// A container was registered as a child of itself.
    SelfRegistration,
    /// A broadcast target was attached with a routing predicate.
    PredicateLinkUnsupported,

    /// A processing unit was canceled.
    Canceled,
    /// An item was offered to an input that is completed or faulted.
    InputClosed { unit: String },
    /// A completion callback returned an error.
    CallbackFailed { unit: String },

    /// A sibling unit in the same container failed.
    SiblingUnitFailed,
    /// A sibling unit in the same container was canceled.
    SiblingUnitCanceled,
    /// A linked container failed.
    OtherContainerFailed,
    /// A linked container was canceled.
    OtherContainerCanceled,

    /// Error that contains many errors.
    Many { amount: u64 },

    /// Error that doesn't fit other categories.
    Other { description: String },
}

impl ErrorKind {
    /// Returns true for marker kinds that signal a peer's failure without
    /// carrying the peer's original cause.
    ///
    /// Propagated errors never re-trigger a container fault when they land,
    /// which is what keeps a single originating incident from cascading
    /// through the fault protocol forever.
    pub fn is_propagated(&self) -> bool {
        matches!(
            self,
            ErrorKind::SiblingUnitFailed
                | ErrorKind::SiblingUnitCanceled
                | ErrorKind::OtherContainerFailed
                | ErrorKind::OtherContainerCanceled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NoChildRegistered => {
                write!(f, "completion was observed before any child was registered")
            }
            ErrorKind::DuplicateChild { unit } => {
                write!(f, "block {unit} is already registered in this container")
            }
            ErrorKind::SelfRegistration => {
                write!(f, "a container cannot be registered as a child of itself")
            }
            ErrorKind::PredicateLinkUnsupported => {
                write!(f, "broadcast targets receive every item and cannot be linked with a predicate")
            }
            ErrorKind::Canceled => write!(f, "the unit was canceled"),
            ErrorKind::InputClosed { unit } => {
                write!(f, "input of {unit} is completed or faulted")
            }
            ErrorKind::CallbackFailed { unit } => {
                write!(f, "completion callback of {unit} failed")
            }
            ErrorKind::SiblingUnitFailed => write!(f, "a sibling unit failed"),
            ErrorKind::SiblingUnitCanceled => write!(f, "a sibling unit was canceled"),
            ErrorKind::OtherContainerFailed => write!(f, "a linked container failed"),
            ErrorKind::OtherContainerCanceled => write!(f, "a linked container was canceled"),
            ErrorKind::Many { amount } => write!(f, "{amount} errors occurred"),
            ErrorKind::Other { description } => write!(f, "{description}"),
        }
    }
}

/// A collection of errors that failed together.
///
/// Used as the source of a [`ErrorKind::Many`] error so that an aggregate
/// can be carried through a single [`Error`] value and later unwrapped with
/// priority (originating causes beat propagated markers).
pub struct Errors(Vec<Arc<Error>>);

impl From<Vec<Arc<Error>>> for Errors {
    fn from(value: Vec<Arc<Error>>) -> Self {
        Errors(value)
    }
}

impl Errors {
    /// Iterates the contained errors in observation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Error>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Errors")
            .field("count", &self.0.len())
            .field("errors", &self.0)
            .finish()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.0[0]),
            count => {
                write!(f, "{count} errors: ")?;
                for (i, error) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Errors {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        // We return only the first error as the source, since we can't do better.
        self.0.first().map(|err| err.as_ref() as &(dyn error::Error + 'static))
    }
}

/// A stable error type for the dataflow library using the ErrorInner pattern.
///
/// This error type provides a stable public API while allowing internal error
/// details to evolve. It supports error chaining, structured error data, and
/// the propagated/originating classification used by the fault protocol.
pub struct Error(Box<ErrorInner>);

impl Error {
    /// Creates a new error with the specified kind.
    pub fn new(kind: ErrorKind) -> Self {
        Error(Box::new(ErrorInner { kind, source: None }))
    }

    /// Creates a new error with the specified kind and source error.
    pub fn with_source<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error(Box::new(ErrorInner {
            kind,
            source: Some(source.into()),
        }))
    }

    /// Bundles several errors into a single [`ErrorKind::Many`] error.
    pub fn from_many(errors: impl Into<Errors>) -> Self {
        let errors = errors.into();
        Error::with_source(
            ErrorKind::Many {
                amount: errors.len() as u64,
            },
            errors,
        )
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled)
    }

    pub fn sibling_unit_failed() -> Self {
        Self::new(ErrorKind::SiblingUnitFailed)
    }

    pub fn sibling_unit_canceled() -> Self {
        Self::new(ErrorKind::SiblingUnitCanceled)
    }

    pub fn other_container_failed() -> Self {
        Self::new(ErrorKind::OtherContainerFailed)
    }

    pub fn other_container_canceled() -> Self {
        Self::new(ErrorKind::OtherContainerCanceled)
    }

    /// Creates an input closed error for the named unit.
    pub fn input_closed(unit: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputClosed { unit: unit.into() })
    }

    /// Creates an external error.
    pub fn other(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other {
            description: description.into(),
        })
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Returns the source downcast to a concrete type, if it matches.
    pub fn source_as<T: error::Error + 'static>(&self) -> Option<&T> {
        self.0.source.as_ref().and_then(|source| source.downcast_ref::<T>())
    }
}

/// Unwrap-with-priority over an error that may aggregate several causes.
///
/// From a [`ErrorKind::Many`] aggregate, the first cause whose kind is not a
/// propagated marker wins; among originals, first-observed wins. A
/// non-aggregate error is returned unchanged. This is what lets a container's
/// completion surface the originating diagnosis instead of a propagated
/// marker when both reached it together.
pub fn most_significant(error: &Arc<Error>) -> Arc<Error> {
    if let ErrorKind::Many { .. } = error.kind()
        && let Some(errors) = error.source_as::<Errors>()
    {
        if let Some(original) = errors.iter().find(|e| !e.kind().is_propagated()) {
            return original.clone();
        }
        if let Some(first) = errors.iter().next() {
            return first.clone();
        }
    }

    error.clone()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.kind)?;
        if let Some(source) = &self.0.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.0.kind)
            .field("source", &self.0.source)
            .finish()
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}
