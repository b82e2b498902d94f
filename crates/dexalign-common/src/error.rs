//! Library-wide error representation.
//!
//! - **`ErrorKind`** : the canonical set of failure categories
//! - **`Error`**     : one struct carrying the kind, an optional message
//!   and optional source coordinates (file, line, column, size)
//!
//! Parser crates keep their own precise error enums and convert into this
//! type at the API boundary, so callers match on a single taxonomy.

use std::fmt;

/// All recognised failure categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// An input or output file could not be opened.
    FileAccess,
    /// The DEXi model document was rejected.
    ParseModel,
    /// The options CSV was rejected.
    ParseOptions,
    /// An integer did not fit the narrower target type.
    NumericCast,
    /// The stack evaluator detected an inconsistent model.
    EvaluatorInvariant,
    /// Parallel observation vectors disagree, or a required subdataset
    /// is empty.
    OptionsInconsistent,
    /// A caller-requested limit was reached. Terminal status rather than
    /// a hard failure.
    BudgetExceeded,
    /// The cancellation flag was observed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FileAccess => "file access",
            Self::ParseModel => "model parse",
            Self::ParseOptions => "options parse",
            Self::NumericCast => "numeric cast",
            Self::EvaluatorInvariant => "evaluator invariant",
            Self::OptionsInconsistent => "options inconsistent",
            Self::BudgetExceeded => "budget exceeded",
            Self::Cancelled => "cancelled",
        })
    }
}

/// The single error struct the public API passes around.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub path: Option<String>,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub size: Option<usize>,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            line: None,
            column: None,
            size: None,
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attach the path of the offending file.
    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach source coordinates.
    pub fn with_location(mut self, line: u64, column: u64) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Attach an offending size (scale too big, vector length mismatch).
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(ref path) = self.path {
            write!(f, " in `{path}'")?;
        }
        if let (Some(l), Some(c)) = (self.line, self.column) {
            write!(f, " at {l}:{c}")?;
        }
        if let Some(s) = self.size {
            write!(f, " (size {s})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<Error> for String {
    fn from(error: Error) -> Self {
        format!("{error}")
    }
}
