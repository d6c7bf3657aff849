//! Utility macros for error handling and common operations.
//!
//! This module provides convenient macros for creating and returning errors
//! with consistent formatting and reduced boilerplate code.

/// Creates a [`crate::error::Error`] from an error kind and optional source.
///
/// # Examples
/// ```rust,no_run
/// use conflux::prelude::*;
///
/// // Simple error from a kind
/// let error = conflux_error!(ErrorKind::SelfRegistration);
///
/// // Error with a source attached
/// let error = conflux_error!(
///     ErrorKind::Other { description: "wiring failed".into() },
///     std::io::Error::other("broken pipe")
/// );
/// ```
#[macro_export]
macro_rules! conflux_error {
    ($kind:expr) => {
        $crate::error::Error::new($kind)
    };
    ($kind:expr, $source:expr) => {
        $crate::error::Error::with_source($kind, $source)
    };
}

/// Creates and returns a [`crate::error::Error`] from the current function.
///
/// This macro combines error creation with early return, reducing boilerplate
/// when handling error conditions that should immediately terminate execution.
///
/// # Examples
/// ```rust,no_run
/// use conflux::prelude::*;
///
/// fn check_attachment(has_predicate: bool) -> conflux::error::Result<()> {
///     if has_predicate {
///         bail!(ErrorKind::PredicateLinkUnsupported);
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($kind:expr) => {
        return Err($crate::conflux_error!($kind))
    };
    ($kind:expr, $source:expr) => {
        return Err($crate::conflux_error!($kind, $source))
    };
}
