use std::borrow::Cow;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::result;


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


/// The last diagnostic code reported by the debug information backend.
///
/// On Windows this is the value of `GetLastError` after the failing
/// DbgHelp call, elsewhere it is an `errno` style value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DiagCode(pub u32);

impl DiagCode {
    /// The code used when the backend did not report anything useful.
    pub const NONE: DiagCode = DiagCode(0);
}

impl Display for DiagCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DiagCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}


/// The kind of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backend binding for a process could not be set up.
    Initialization,
    /// A debug information module could not be loaded.
    ModuleLoad,
    /// A module was loaded but its metadata could not be retrieved.
    ModuleInfo,
    /// No lexical scope could be activated for the requested address.
    ScopeActivation,
    /// The backend's symbol walk failed.
    Enumeration,
    /// The register snapshot's layout does not match the emulation mode
    /// of the process.
    ContextMismatch,
}

impl ErrorKind {
    /// Retrieve a textual representation of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization failed",
            Self::ModuleLoad => "module load failed",
            Self::ModuleInfo => "module info unavailable",
            Self::ScopeActivation => "scope activation failed",
            Self::Enumeration => "symbol enumeration failed",
            Self::ContextMismatch => "register context mismatch",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}


/// The error type used by the library.
///
/// Every error carries the backend's last diagnostic code, if any, for
/// operator facing logging.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message} (code {code})")]
pub struct Error {
    kind: ErrorKind,
    code: DiagCode,
    message: Cow<'static, str>,
}

impl Error {
    pub(crate) fn new<M>(kind: ErrorKind, code: DiagCode, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Retrieve the [`ErrorKind`] of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Retrieve the backend diagnostic code associated with the error.
    #[inline]
    pub fn code(&self) -> DiagCode {
        self.code
    }

    /// Retrieve the human readable message of the error.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that an error's `Display` representation mentions kind,
    /// message, and diagnostic code.
    #[test]
    fn error_display() {
        let err = Error::new(
            ErrorKind::ModuleLoad,
            DiagCode(2),
            "failed to load `/does/not/exist`",
        );
        assert_eq!(
            err.to_string(),
            "module load failed: failed to load `/does/not/exist` (code 2)"
        );
        assert_eq!(err.kind(), ErrorKind::ModuleLoad);
        assert_eq!(err.code(), DiagCode(2));
        assert_eq!(err.message(), "failed to load `/does/not/exist`");
    }

    /// Make sure that every error kind has a distinct textual
    /// representation.
    #[test]
    fn kind_strings() {
        let kinds = [
            ErrorKind::Initialization,
            ErrorKind::ModuleLoad,
            ErrorKind::ModuleInfo,
            ErrorKind::ScopeActivation,
            ErrorKind::Enumeration,
            ErrorKind::ContextMismatch,
        ];

        for (i, kind) in kinds.iter().enumerate() {
            for other in &kinds[i + 1..] {
                assert_ne!(kind.as_str(), other.as_str());
            }
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
