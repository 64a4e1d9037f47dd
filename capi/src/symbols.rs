use std::ffi::c_char;
#[cfg(windows)]
use std::ffi::c_void;
use std::ptr;

use framesym::backend::default_backend;
use framesym::backend::Backend;
use framesym::backend::DefaultBackend;
#[cfg(unix)]
use framesym::backend::Pid;
#[cfg(unix)]
use framesym::backend::ProcessHandle;
use framesym::initialize_debug_binding;
use framesym::Addr;
use framesym::LocalSymbol;
use framesym::ModuleSymbol;
use framesym::RegisterSnapshot;
use framesym::Result;
use framesym::Session;
use framesym::Storage;
use framesym::SymTag;

use crate::free_cstring;
use crate::fsym_err;
#[cfg(doc)]
use crate::fsym_err_last;
use crate::fsym_register_snapshot;
use crate::into_cstring;
use crate::path_from_user;
use crate::set_last_err;
use crate::set_last_error;


/// A handle identifying a process.
///
/// This is a process `HANDLE` as returned by, e.g., `OpenProcess`.
#[cfg(windows)]
pub type fsym_process = *mut c_void;

/// A handle identifying a process.
///
/// This is the process' ID, with `0` referring to the calling process.
#[cfg(unix)]
pub type fsym_process = libc::pid_t;

type Process = <DefaultBackend as Backend>::Process;

#[cfg(windows)]
fn process_handle(process: fsym_process) -> Option<Process> {
    Some(process)
}

#[cfg(unix)]
fn process_handle(process: fsym_process) -> Option<Process> {
    let pid = u32::try_from(process).ok()?;
    Some(ProcessHandle::from_pid(Pid::from(pid)))
}


/// A symbol found in a module's debug information.
#[repr(C)]
#[derive(Debug)]
pub struct fsym_module_sym {
    /// The symbol's name, as a NUL terminated string.
    ///
    /// Symbols without a name are reported as `<unnamed>`.
    pub name: *mut c_char,
    /// The symbol's size, in bytes.
    pub size: u64,
    /// The symbol's address.
    pub addr: Addr,
    /// The symbol's tag. Use [`fsym_tag_str`] to retrieve its name.
    pub tag: u32,
    /// The symbol's value, for constants.
    pub value: u64,
    /// The source file the symbol's address maps to, or `Unknown`.
    pub file: *mut c_char,
    /// The line the symbol's address maps to, or `0`.
    pub line: u32,
}

impl From<ModuleSymbol> for fsym_module_sym {
    fn from(other: ModuleSymbol) -> Self {
        let ModuleSymbol {
            name,
            size,
            addr,
            tag,
            value,
            file,
            line,
        } = other;

        Self {
            name: into_cstring(name),
            size,
            addr,
            tag: tag.0,
            value,
            file: into_cstring(file),
            line,
        }
    }
}


/// The storage of a [`fsym_local_sym`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum fsym_storage {
    /// The symbol lives at a fixed address.
    FSYM_STORAGE_STATIC,
    /// The symbol lives in memory, at an offset from a register's value.
    FSYM_STORAGE_REGISTER_RELATIVE,
    /// The symbol's value lives in a register.
    FSYM_STORAGE_REGISTER,
}


/// A variable or parameter visible in a function activation.
#[repr(C)]
#[derive(Debug)]
pub struct fsym_local_sym {
    /// The symbol's name, as a NUL terminated string.
    pub name: *mut c_char,
    /// The symbol's size, in bytes.
    pub size: u64,
    /// The symbol's effective address, resolved against the register
    /// snapshot provided.
    ///
    /// For [`fsym_storage::FSYM_STORAGE_REGISTER`] storage, this is the
    /// register's value.
    pub addr: Addr,
    /// The symbol's tag.
    pub tag: u32,
    /// The symbol's value, for constants.
    pub value: u64,
    /// The source file the symbol maps to, or `Unknown`.
    pub file: *mut c_char,
    /// The line the symbol maps to, or `0`.
    pub line: u32,
    /// The CodeView id of the register the storage refers to.
    pub reg: u32,
    /// The kind of storage of the symbol.
    pub storage: fsym_storage,
    /// The offset from the register's value, for
    /// [`fsym_storage::FSYM_STORAGE_REGISTER_RELATIVE`] storage.
    pub offset: i64,
    /// Whether `reg` could be resolved against the snapshot. If it could
    /// not, its value was taken to be `0`.
    pub resolved: bool,
}

impl From<LocalSymbol> for fsym_local_sym {
    fn from(other: LocalSymbol) -> Self {
        let LocalSymbol {
            name,
            size,
            addr,
            tag,
            value,
            file,
            line,
            register,
            storage,
            resolved,
        } = other;

        let (storage, offset) = match storage {
            Storage::Static => (fsym_storage::FSYM_STORAGE_STATIC, 0),
            Storage::RegisterRelative { offset, .. } => {
                (fsym_storage::FSYM_STORAGE_REGISTER_RELATIVE, offset)
            }
            Storage::Register { .. } => (fsym_storage::FSYM_STORAGE_REGISTER, 0),
        };

        Self {
            name: into_cstring(name),
            size,
            addr,
            tag: tag.0,
            value,
            file: into_cstring(file),
            line,
            reg: register,
            storage,
            offset,
            resolved,
        }
    }
}


/// Convert `syms` into a caller owned array, reporting its length in
/// `len`.
///
/// # Safety
/// `len` needs to be a valid pointer.
unsafe fn into_user_array<S, T>(syms: Vec<S>, len: *mut usize) -> *mut T
where
    T: From<S>,
{
    let syms = syms.into_iter().map(T::from).collect::<Box<[T]>>();
    // SAFETY: The caller guarantees that `len` is valid.
    let () = unsafe { len.write(syms.len()) };
    Box::into_raw(syms).cast()
}

/// Take back ownership of an array created by [`into_user_array`].
///
/// # Safety
/// `syms` needs to be non-NULL and have been created by
/// [`into_user_array`] with `len` elements.
unsafe fn from_user_array<T>(syms: *mut T, len: usize) -> Box<[T]> {
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(syms, len)) }
}


/// Report the outcome of an operation producing symbols to the caller.
///
/// # Safety
/// `len` needs to be a valid pointer.
unsafe fn report<S, T>(result: Result<Vec<S>>, len: *mut usize) -> *mut T
where
    T: From<S>,
{
    match result {
        Ok(syms) => {
            let () = set_last_err(fsym_err::FSYM_ERR_OK);
            unsafe { into_user_array(syms, len) }
        }
        Err(err) => {
            let () = set_last_error(&err);
            ptr::null_mut()
        }
    }
}


/// Set up the debug information binding for `process`.
///
/// This is meant to be invoked once for a process that is later used
/// with [`fsym_local_syms`]. All modules currently mapped into the
/// process are loaded. If `path` is not `NULL`, the debug information
/// at `path` is additionally loaded at `base`.
///
/// On error, the function returns `false` and sets the thread's last
/// error to indicate the problem encountered. Use [`fsym_err_last`] to
/// retrieve this error.
///
/// # Safety
/// - `path` needs to be `NULL` or a valid pointer to a NUL terminated
///   string
#[no_mangle]
pub unsafe extern "C" fn fsym_init(process: fsym_process, path: *const c_char, base: Addr) -> bool {
    let Some(process) = process_handle(process) else {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return false
    };

    // SAFETY: The caller guarantees that `path` is `NULL` or valid.
    let path = match unsafe { path_from_user(path) } {
        Some(path) => Some(path),
        None if path.is_null() => None,
        None => {
            let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
            return false
        }
    };

    match initialize_debug_binding(default_backend(), process, path.as_deref(), base) {
        Ok(()) => {
            let () = set_last_err(fsym_err::FSYM_ERR_OK);
            true
        }
        Err(err) => {
            let () = set_last_error(&err);
            false
        }
    }
}


/// Retrieve all symbols of the module at `path`.
///
/// The module is loaded into a private binding for the calling process
/// for the duration of the call.
///
/// On success, the function returns an array of `*len`
/// [`fsym_module_sym`] objects. The array should be released using
/// [`fsym_module_syms_free`] once it is no longer needed. The pointer
/// is non-`NULL` even if no symbols were found.
///
/// On error, the function returns `NULL` and sets the thread's last
/// error to indicate the problem encountered. Use [`fsym_err_last`] to
/// retrieve this error.
///
/// # Safety
/// - `path` needs to be a valid pointer to a NUL terminated string
/// - `len` needs to be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn fsym_module_syms(
    path: *const c_char,
    len: *mut usize,
) -> *mut fsym_module_sym {
    // SAFETY: The caller guarantees that `path` is valid.
    let Some(path) = (unsafe { path_from_user(path) }) else {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    };
    if len.is_null() {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    }

    let result = Session::new(default_backend())
        .and_then(|mut session| session.module_symbols(&path));
    unsafe { report(result, len) }
}


/// Retrieve all symbols of the debug information file at `path`, as
/// loaded at address `base`.
///
/// This is useful for resolving symbols against a module's known
/// mapping in a live process.
///
/// On success, the function returns an array of `*len`
/// [`fsym_module_sym`] objects. The array should be released using
/// [`fsym_module_syms_free`] once it is no longer needed.
///
/// On error, the function returns `NULL` and sets the thread's last
/// error to indicate the problem encountered. Use [`fsym_err_last`] to
/// retrieve this error.
///
/// # Safety
/// - `path` needs to be a valid pointer to a NUL terminated string
/// - `len` needs to be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn fsym_pdb_syms(
    path: *const c_char,
    base: Addr,
    len: *mut usize,
) -> *mut fsym_module_sym {
    // SAFETY: The caller guarantees that `path` is valid.
    let Some(path) = (unsafe { path_from_user(path) }) else {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    };
    if len.is_null() {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    }

    let result = Session::new(default_backend())
        .and_then(|mut session| session.module_symbols_at(&path, base));
    unsafe { report(result, len) }
}


/// Retrieve the variables and parameters visible in the function
/// activation containing `func_addr` in `process`.
///
/// The binding for `process` has to be set up with [`fsym_init`]
/// beforehand. It is released again by this function, i.e., every
/// invocation needs to be preceded by one of [`fsym_init`].
///
/// On success, the function returns an array of `*len`
/// [`fsym_local_sym`] objects. The array should be released using
/// [`fsym_local_syms_free`] once it is no longer needed.
///
/// On error, the function returns `NULL` and sets the thread's last
/// error to indicate the problem encountered. Use [`fsym_err_last`] to
/// retrieve this error.
///
/// # Safety
/// - `snapshot` needs to point to a valid [`fsym_register_snapshot`]
/// - `len` needs to be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn fsym_local_syms(
    process: fsym_process,
    func_addr: Addr,
    snapshot: *const fsym_register_snapshot,
    len: *mut usize,
) -> *mut fsym_local_sym {
    let Some(process) = process_handle(process) else {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    };
    if snapshot.is_null() || len.is_null() {
        let () = set_last_err(fsym_err::FSYM_ERR_INVALID_INPUT);
        return ptr::null_mut()
    }

    // SAFETY: The caller guarantees that `snapshot` is valid.
    let snapshot = RegisterSnapshot::from(unsafe { snapshot.read() });
    let mut session = Session::with_process(default_backend(), process);
    let result = session.local_symbols(func_addr, &snapshot);
    unsafe { report(result, len) }
}


/// Retrieve the name of the symbol tag `tag`, e.g., `SymTagFunction`.
///
/// Unknown tags are reported as `Unknown`. The returned string is
/// static and must not be freed.
#[no_mangle]
pub extern "C" fn fsym_tag_str(tag: u32) -> *const c_char {
    SymTag(tag).as_bytes().as_ptr().cast()
}


/// Free an array returned by [`fsym_module_syms`] or [`fsym_pdb_syms`].
///
/// # Safety
/// - `syms` needs to be `NULL` or an array returned by one of the
///   aforementioned functions, with `len` being the length reported
///   alongside it
/// - the array must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn fsym_module_syms_free(syms: *mut fsym_module_sym, len: usize) {
    if syms.is_null() {
        return
    }

    let syms = unsafe { from_user_array(syms, len) };
    for sym in syms.iter() {
        let () = unsafe { free_cstring(sym.name) };
        let () = unsafe { free_cstring(sym.file) };
    }
}

/// Free an array returned by [`fsym_local_syms`].
///
/// # Safety
/// - `syms` needs to be `NULL` or an array returned by
///   [`fsym_local_syms`], with `len` being the length reported alongside
///   it
/// - the array must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn fsym_local_syms_free(syms: *mut fsym_local_sym, len: usize) {
    if syms.is_null() {
        return
    }

    let syms = unsafe { from_user_array(syms, len) };
    for sym in syms.iter() {
        let () = unsafe { free_cstring(sym.name) };
        let () = unsafe { free_cstring(sym.file) };
    }
}
