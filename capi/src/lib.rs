//! C API bindings for the library.
//!
//! # Memory ownership
//! Symbol arrays returned by the library are owned by the caller. Each
//! of them has to be released with the free function matching the
//! function that created it ([`fsym_module_syms_free`] or
//! [`fsym_local_syms_free`]), passing in the length that was reported
//! at creation time.
//!
//! # Error reporting
//! Fallible functions set a thread-local last error, which can be
//! retrieved using [`fsym_err_last`]. The backend diagnostic code
//! accompanying it is available via [`fsym_err_code_last`].

#![allow(
    clippy::collapsible_if,
    clippy::let_and_return,
    clippy::let_unit_value
)]
#![deny(unsafe_op_in_unsafe_fn)]


#[allow(non_camel_case_types)]
mod error;
#[allow(non_camel_case_types)]
mod register;
#[allow(non_camel_case_types)]
mod symbols;
#[allow(non_camel_case_types)]
mod trace;

use std::ffi::c_char;
use std::ffi::CStr;
use std::ffi::CString;
use std::path::PathBuf;

pub use error::*;
pub use register::*;
pub use symbols::*;
pub use trace::*;


/// Convert a user provided C string into a path.
///
/// # Safety
/// `path` needs to be `NULL` or point to a valid NUL terminated string.
pub(crate) unsafe fn path_from_user(path: *const c_char) -> Option<PathBuf> {
    if path.is_null() {
        return None
    }

    // SAFETY: The caller guarantees that `path` is a valid C string.
    let cstr = unsafe { CStr::from_ptr(path) };

    #[cfg(unix)]
    {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt as _;

        Some(PathBuf::from(OsStr::from_bytes(cstr.to_bytes())))
    }
    #[cfg(not(unix))]
    {
        cstr.to_str().ok().map(PathBuf::from)
    }
}

/// Convert a string into a heap allocated C string, to be released
/// with [`free_cstring`].
///
/// NUL bytes contained in `s` are dropped.
pub(crate) fn into_cstring(s: String) -> *mut c_char {
    let cstring = CString::new(s).unwrap_or_else(|err| {
        let mut bytes = err.into_vec();
        let () = bytes.retain(|b| *b != b'\0');
        // SAFETY: We just removed all NUL bytes.
        unsafe { CString::from_vec_unchecked(bytes) }
    });
    cstring.into_raw()
}

/// Release a C string created by [`into_cstring`].
///
/// # Safety
/// `s` needs to be `NULL` or a pointer returned by [`into_cstring`]
/// that was not released before.
pub(crate) unsafe fn free_cstring(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: The caller guarantees that `s` came from
        //         `CString::into_raw`.
        drop(unsafe { CString::from_raw(s) });
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::ptr;


    /// Check that user provided paths are converted faithfully.
    #[test]
    fn path_conversion() {
        assert_eq!(unsafe { path_from_user(ptr::null()) }, None);

        let path = CStr::from_bytes_with_nul(b"/usr/lib/libc.so.6\0").unwrap();
        assert_eq!(
            unsafe { path_from_user(path.as_ptr()) }.as_deref(),
            Some(Path::new("/usr/lib/libc.so.6"))
        );
    }

    /// Check that strings survive the trip through a C string, minus
    /// NUL bytes.
    #[test]
    fn cstring_conversion() {
        let main = CStr::from_bytes_with_nul(b"main\0").unwrap();
        let ptr = into_cstring("main".to_string());
        assert_eq!(unsafe { CStr::from_ptr(ptr) }, main);
        let () = unsafe { free_cstring(ptr) };

        let ptr = into_cstring("ma\0in".to_string());
        assert_eq!(unsafe { CStr::from_ptr(ptr) }, main);
        let () = unsafe { free_cstring(ptr) };

        let () = unsafe { free_cstring(ptr::null_mut()) };
    }
}
