//! Diagnostics.

use std::fmt::{self, Display, Formatter};

use ecow::EcoVec;

use crate::tree::NodeId;

/// Early-return with a [`LayoutResult`].
///
/// Takes an [`ErrorKind`] variant name, a format string and its arguments.
/// Hints can be attached with the `; hint: "..."` syntax.
///
/// ```ignore
/// bail!(StaleHandle, "node {:?} was freed", id);
/// bail!(
///     WrongKind, "expected a section, found {}", kind;
///     hint: "sections are created with `create_section`"
/// );
/// ```
#[macro_export]
#[doc(hidden)]
macro_rules! __bail {
    // For bail!(error!(..))
    ($error:expr) => {
        return Err($error)
    };

    ($($tts:tt)*) => {
        return Err($crate::diag::error!($($tts)*))
    };
}

/// Construct a [`LayoutError`].
#[macro_export]
#[doc(hidden)]
macro_rules! __error {
    (
        $kind:ident, $fmt:literal $(, $arg:expr)*
        $(; hint: $hint:literal $(, $hint_arg:expr)*)*
        $(,)?
    ) => {
        $crate::diag::LayoutError::new(
            $crate::diag::ErrorKind::$kind,
            $crate::diag::eco_format!($fmt, $($arg),*),
        ) $(.with_hint($crate::diag::eco_format!($hint, $($hint_arg),*)))*
    };
}

/// Construct a [`Warning`].
#[macro_export]
#[doc(hidden)]
macro_rules! __warning {
    (
        $node:expr,
        $fmt:literal $(, $arg:expr)*
        $(,)?
    ) => {
        $crate::diag::Warning::new($node, $crate::diag::eco_format!($fmt, $($arg),*))
    };
}

#[rustfmt::skip]
#[doc(inline)]
pub use {
    crate::__bail as bail,
    crate::__error as error,
    crate::__warning as warning,
    ecow::{eco_format, EcoString},
};

/// A result type with a layout error.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// An error raised by a public layout operation.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LayoutError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// A message describing the problem.
    pub message: EcoString,
    /// Additional hints, indicating how this problem could be avoided.
    pub hints: EcoVec<EcoString>,
}

/// The category of a [`LayoutError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// A node handle refers to a freed slot.
    StaleHandle,
    /// A node exists but is of the wrong kind for the operation.
    WrongKind,
    /// A document handle does not resolve.
    UnknownItem,
    /// An argument is outside the operation's domain.
    InvalidArgument,
    /// Settings could not be loaded.
    Config,
}

impl LayoutError {
    /// Create a new, hint-less error.
    pub fn new(kind: ErrorKind, message: impl Into<EcoString>) -> Self {
        Self { kind, message: message.into(), hints: EcoVec::new() }
    }

    /// Adds a user-facing hint to the error.
    pub fn with_hint(mut self, hint: impl Into<EcoString>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.message)?;
        for hint in &self.hints {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for LayoutError {}

/// A recorded layout anomaly.
///
/// Anomalies are conditions that indicate a bug in a caller or in the engine
/// itself. The engine logs them, records them here and carries on with a
/// no-op instead of corrupting the tree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Warning {
    /// The node the anomaly was detected on.
    pub node: Option<NodeId>,
    /// A description of the anomaly.
    pub message: EcoString,
}

impl Warning {
    /// Create a new warning.
    pub fn new(node: Option<NodeId>, message: impl Into<EcoString>) -> Self {
        Self { node, message: message.into() }
    }
}

/// Collects warnings during layout.
#[derive(Debug, Default, Clone)]
pub struct Sink {
    warnings: EcoVec<Warning>,
}

impl Sink {
    /// Records a warning.
    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// The warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Removes and returns all recorded warnings.
    pub fn take(&mut self) -> EcoVec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails(flag: bool) -> LayoutResult<u32> {
        if flag {
            bail!(InvalidArgument, "bad value {}", 3; hint: "try {}", 4);
        }
        Ok(1)
    }

    #[test]
    fn test_bail_with_hint() {
        let err = fails(true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.message, "bad value 3");
        assert_eq!(err.hints.as_slice(), &[EcoString::from("try 4")]);
        assert_eq!(err.to_string(), "bad value 3 (hint: try 4)");
        assert_eq!(fails(false), Ok(1));
    }

    #[test]
    fn test_sink_take() {
        let mut sink = Sink::default();
        sink.warn(warning!(None, "first {}", 1));
        assert_eq!(sink.warnings().len(), 1);
        assert_eq!(sink.take()[0].message, "first 1");
        assert!(sink.warnings().is_empty());
    }
}
