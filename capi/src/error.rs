use std::cell::Cell;
use std::ffi::c_char;

use framesym::Error;
use framesym::ErrorKind;


/// An enum providing a rough classification of errors.
///
/// C ABI compatible version of [`framesym::ErrorKind`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct fsym_err(i16);

impl fsym_err {
    /// The operation was successful.
    pub const FSYM_ERR_OK: Self = Self(0);
    /// The backend binding for a process could not be set up.
    pub const FSYM_ERR_INITIALIZATION: Self = Self(-1);
    /// A debug information module could not be loaded.
    pub const FSYM_ERR_MODULE_LOAD: Self = Self(-2);
    /// A module was loaded but its metadata could not be retrieved.
    pub const FSYM_ERR_MODULE_INFO: Self = Self(-3);
    /// No lexical scope could be activated for the requested address.
    pub const FSYM_ERR_SCOPE_ACTIVATION: Self = Self(-4);
    /// The backend's symbol walk failed.
    pub const FSYM_ERR_ENUMERATION: Self = Self(-5);
    /// The register snapshot does not match the emulation mode of the
    /// process.
    pub const FSYM_ERR_CONTEXT_MISMATCH: Self = Self(-6);
    /// A parameter was incorrect.
    pub const FSYM_ERR_INVALID_INPUT: Self = Self(-256);
    /// A tracing subscriber was installed already.
    pub const FSYM_ERR_ALREADY_EXISTS: Self = Self(-257);
    /// An error that does not fall under any other kind.
    pub const FSYM_ERR_OTHER: Self = Self(-260);
}

impl From<ErrorKind> for fsym_err {
    fn from(other: ErrorKind) -> Self {
        match other {
            ErrorKind::Initialization => Self::FSYM_ERR_INITIALIZATION,
            ErrorKind::ModuleLoad => Self::FSYM_ERR_MODULE_LOAD,
            ErrorKind::ModuleInfo => Self::FSYM_ERR_MODULE_INFO,
            ErrorKind::ScopeActivation => Self::FSYM_ERR_SCOPE_ACTIVATION,
            ErrorKind::Enumeration => Self::FSYM_ERR_ENUMERATION,
            ErrorKind::ContextMismatch => Self::FSYM_ERR_CONTEXT_MISMATCH,
            _ => Self::FSYM_ERR_OTHER,
        }
    }
}


thread_local! {
    /// The error reported by the last fallible API function invoked.
    static LAST_ERR: Cell<fsym_err> = const { Cell::new(fsym_err::FSYM_ERR_OK) };
    /// The backend diagnostic code accompanying `LAST_ERR`.
    static LAST_CODE: Cell<u32> = const { Cell::new(0) };
}

/// Retrieve the error reported by the last fallible API function invoked.
#[no_mangle]
pub extern "C" fn fsym_err_last() -> fsym_err {
    LAST_ERR.with(Cell::get)
}

/// Retrieve the backend diagnostic code reported by the last fallible
/// API function invoked.
///
/// On Windows this is the `GetLastError` value of the failing DbgHelp
/// call, elsewhere an `errno` style value. It is `0` if the last call
/// succeeded or the backend did not report anything.
#[no_mangle]
pub extern "C" fn fsym_err_code_last() -> u32 {
    LAST_CODE.with(Cell::get)
}

/// Set the thread's last error, without a diagnostic code.
pub(crate) fn set_last_err(err: fsym_err) {
    let () = LAST_ERR.with(|cell| cell.set(err));
    let () = LAST_CODE.with(|cell| cell.set(0));
}

/// Set the thread's last error based on a library error.
pub(crate) fn set_last_error(err: &Error) {
    let () = LAST_ERR.with(|cell| cell.set(err.kind().into()));
    let () = LAST_CODE.with(|cell| cell.set(err.code().0));
}


/// Retrieve a textual representation of the error code.
#[no_mangle]
pub extern "C" fn fsym_err_str(err: fsym_err) -> *const c_char {
    let s: &[u8] = match err {
        fsym_err::FSYM_ERR_OK => b"success\0",
        fsym_err::FSYM_ERR_INITIALIZATION => b"initialization failed\0",
        fsym_err::FSYM_ERR_MODULE_LOAD => b"module load failed\0",
        fsym_err::FSYM_ERR_MODULE_INFO => b"module info unavailable\0",
        fsym_err::FSYM_ERR_SCOPE_ACTIVATION => b"scope activation failed\0",
        fsym_err::FSYM_ERR_ENUMERATION => b"symbol enumeration failed\0",
        fsym_err::FSYM_ERR_CONTEXT_MISMATCH => b"register context mismatch\0",
        fsym_err::FSYM_ERR_INVALID_INPUT => b"invalid input\0",
        fsym_err::FSYM_ERR_ALREADY_EXISTS => b"already exists\0",
        _ => b"other error\0",
    };
    s.as_ptr().cast()
}
