//! A backend driving the system's DbgHelp library.

use std::ffi::c_void;
use std::ffi::CStr;
use std::ffi::CString;
use std::mem;
use std::mem::size_of;
use std::ops::ControlFlow;
use std::path::Path;
use std::path::PathBuf;
use std::ptr;
use std::slice;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::BOOL;
use windows_sys::Win32::Foundation::ERROR_ALREADY_EXISTS;
use windows_sys::Win32::Foundation::ERROR_INVALID_PARAMETER;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::Diagnostics::Debug::SymCleanup;
use windows_sys::Win32::System::Diagnostics::Debug::SymEnumSymbols;
use windows_sys::Win32::System::Diagnostics::Debug::SymGetLineFromAddr64;
use windows_sys::Win32::System::Diagnostics::Debug::SymGetModuleInfo64;
use windows_sys::Win32::System::Diagnostics::Debug::SymGetOptions;
use windows_sys::Win32::System::Diagnostics::Debug::SymInitialize;
use windows_sys::Win32::System::Diagnostics::Debug::SymLoadModule64;
use windows_sys::Win32::System::Diagnostics::Debug::SymSetContext;
use windows_sys::Win32::System::Diagnostics::Debug::SymSetOptions;
use windows_sys::Win32::System::Diagnostics::Debug::SymUnloadModule64;
use windows_sys::Win32::System::Diagnostics::Debug::IMAGEHLP_LINE64;
use windows_sys::Win32::System::Diagnostics::Debug::IMAGEHLP_MODULE64;
use windows_sys::Win32::System::Diagnostics::Debug::IMAGEHLP_STACK_FRAME;
use windows_sys::Win32::System::Diagnostics::Debug::SYMBOL_INFO;
use windows_sys::Win32::System::Threading::GetCurrentProcess;
use windows_sys::Win32::System::Threading::IsWow64Process;
use windows_sys::Win32::System::Threading::OpenProcess;
use windows_sys::Win32::System::Threading::PROCESS_QUERY_INFORMATION;
use windows_sys::Win32::System::Threading::PROCESS_VM_READ;

use super::Backend;
use super::LineInfo;
use super::ModuleInfo;
use super::SymOptions;
use super::SymbolFlags;
use super::SymbolInfo;
use crate::log::debug;
use crate::log::trace;
use crate::Addr;
use crate::DiagCode;


fn last_error() -> DiagCode {
    // SAFETY: `GetLastError` is always safe to call.
    DiagCode(unsafe { GetLastError() })
}

fn check(result: BOOL) -> Result<(), DiagCode> {
    if result != 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

/// Convert a NUL terminated C character array into a string.
fn chars_to_string(chars: &[i8]) -> String {
    let bytes = chars
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect::<Vec<_>>();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn path_to_cstring(path: &Path) -> Result<CString, DiagCode> {
    let path = path
        .to_str()
        .ok_or(DiagCode(ERROR_INVALID_PARAMETER))?;
    CString::new(path).map_err(|_err| DiagCode(ERROR_INVALID_PARAMETER))
}


/// A symbol copied out of a DbgHelp `SYMBOL_INFO`.
#[derive(Debug)]
struct OwnedSymbol {
    name: String,
    addr: Addr,
    size: u64,
    value: u64,
    tag: u32,
    flags: SymbolFlags,
    register: u32,
    module_base: Addr,
}

impl OwnedSymbol {
    fn as_info(&self) -> SymbolInfo<'_> {
        SymbolInfo {
            name: (!self.name.is_empty()).then_some(self.name.as_str()),
            addr: self.addr,
            size: self.size,
            value: self.value,
            tag: self.tag,
            flags: self.flags,
            register: self.register,
            module_base: self.module_base,
        }
    }
}


unsafe extern "system" fn collect_symbol(
    info: *const SYMBOL_INFO,
    _size: u32,
    ctx: *const c_void,
) -> BOOL {
    // SAFETY: `ctx` is the vector passed to `SymEnumSymbols` by
    //         `DbgHelp::enum_symbols`, which outlives the enumeration.
    let syms = unsafe { &mut *(ctx as *mut Vec<OwnedSymbol>) };
    // SAFETY: DbgHelp hands us a valid symbol descriptor.
    let info = unsafe { &*info };
    // SAFETY: The name is stored inline, with `NameLen` characters
    //         following the `Name` member.
    let name = unsafe {
        slice::from_raw_parts(info.Name.as_ptr().cast::<u8>(), info.NameLen as usize)
    };

    let sym = OwnedSymbol {
        name: String::from_utf8_lossy(name).into_owned(),
        addr: info.Address,
        size: u64::from(info.Size),
        value: info.Value,
        tag: info.Tag,
        flags: SymbolFlags::from_bits_retain(info.Flags),
        register: info.Register,
        module_base: info.ModBase,
    };
    let () = syms.push(sym);
    1
}


/// A backend using DbgHelp.
///
/// DbgHelp is single threaded. All calls into it are serialized, but
/// symbol enumeration callbacks run without holding the lock, so that
/// they may call back into the backend.
#[derive(Debug)]
pub struct DbgHelp {
    lock: Mutex<()>,
}

impl DbgHelp {
    /// Create a new backend instance.
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DbgHelp {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DbgHelp {
    type Process = HANDLE;

    fn options(&self) -> SymOptions {
        let _guard = self.lock();
        // SAFETY: `SymGetOptions` is always safe to call.
        SymOptions::from_bits_retain(unsafe { SymGetOptions() })
    }

    fn set_options(&self, options: SymOptions) {
        let _guard = self.lock();
        // SAFETY: `SymSetOptions` is always safe to call.
        let _prev = unsafe { SymSetOptions(options.bits()) };
    }

    fn open_current_process(&self) -> Result<Self::Process, DiagCode> {
        // SAFETY: `GetCurrentProcess` is always safe to call.
        Ok(unsafe { GetCurrentProcess() })
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, DiagCode> {
        if pid == 0 {
            return self.open_current_process()
        }

        // SAFETY: `OpenProcess` is always safe to call.
        let handle =
            unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, 0, pid) };
        if handle.is_null() {
            return Err(last_error())
        }
        Ok(handle)
    }

    fn close_process(&self, process: Self::Process) {
        // SAFETY: The handle was opened by us. Closing the pseudo handle
        //         of the current process is a no-op.
        if unsafe { CloseHandle(process) } == 0 {
            debug!("failed to close process handle: {}", last_error());
        }
    }

    fn initialize(&self, process: Self::Process, invade: bool) -> Result<(), DiagCode> {
        let _guard = self.lock();
        // SAFETY: A NULL search path makes DbgHelp use its default one.
        check(unsafe { SymInitialize(process, ptr::null(), BOOL::from(invade)) })
    }

    fn cleanup(&self, process: Self::Process) -> Result<(), DiagCode> {
        let _guard = self.lock();
        // SAFETY: `SymCleanup` validates the handle.
        check(unsafe { SymCleanup(process) })
    }

    fn load_module(
        &self,
        process: Self::Process,
        path: &Path,
        base: Addr,
        size: u32,
    ) -> Result<Addr, DiagCode> {
        let image = path_to_cstring(path)?;
        let _guard = self.lock();
        // SAFETY: `image` is a valid NUL terminated string that outlives
        //         the call.
        let loaded = unsafe {
            SymLoadModule64(
                process,
                ptr::null_mut(),
                image.as_ptr().cast(),
                ptr::null(),
                base,
                size,
            )
        };
        if loaded != 0 {
            debug!("loaded {} at {loaded:#x}", path.display());
            return Ok(loaded)
        }

        match last_error() {
            // DbgHelp reports success if the module was loaded already.
            DiagCode::NONE => Err(DiagCode(ERROR_ALREADY_EXISTS)),
            code => Err(code),
        }
    }

    fn module_info(&self, process: Self::Process, base: Addr) -> Result<ModuleInfo, DiagCode> {
        // SAFETY: `IMAGEHLP_MODULE64` is plain old data, for which all
        //         zeroes is a valid bit pattern.
        let mut module = unsafe { mem::zeroed::<IMAGEHLP_MODULE64>() };
        module.SizeOfStruct = size_of::<IMAGEHLP_MODULE64>() as u32;

        let _guard = self.lock();
        // SAFETY: `module` is a valid, properly sized output buffer.
        let () = check(unsafe { SymGetModuleInfo64(process, base, &mut module) })?;

        let info = ModuleInfo {
            base: module.BaseOfImage,
            size: u64::from(module.ImageSize),
            name: chars_to_string(&module.ModuleName),
            path: PathBuf::from(chars_to_string(&module.ImageName)),
            symbol_count: module.NumSyms,
            line_numbers: module.LineNumbers != 0,
        };
        Ok(info)
    }

    fn unload_module(&self, process: Self::Process, base: Addr) -> Result<(), DiagCode> {
        let _guard = self.lock();
        // SAFETY: `SymUnloadModule64` validates its arguments.
        check(unsafe { SymUnloadModule64(process, base) })
    }

    fn set_scope(&self, process: Self::Process, addr: Addr) -> Result<(), DiagCode> {
        // SAFETY: `IMAGEHLP_STACK_FRAME` is plain old data, for which all
        //         zeroes is a valid bit pattern.
        let mut frame = unsafe { mem::zeroed::<IMAGEHLP_STACK_FRAME>() };
        frame.InstructionOffset = addr;

        let _guard = self.lock();
        // SAFETY: `frame` is valid for the duration of the call; the
        //         context argument is ignored.
        let result = unsafe { SymSetContext(process, &frame, ptr::null()) };
        if result != 0 {
            return Ok(())
        }
        match last_error() {
            // Setting the context that is active already "fails" with
            // `ERROR_SUCCESS`.
            DiagCode::NONE => Ok(()),
            code => Err(code),
        }
    }

    fn enum_symbols(
        &self,
        process: Self::Process,
        base: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        let mask = mask
            .map(CString::new)
            .transpose()
            .map_err(|_err| DiagCode(ERROR_INVALID_PARAMETER))?;
        let mask_ptr = mask
            .as_ref()
            .map(|mask| mask.as_ptr().cast())
            .unwrap_or(ptr::null());

        let mut syms = Vec::<OwnedSymbol>::new();
        {
            let _guard = self.lock();
            // SAFETY: `syms` outlives the enumeration and is only accessed
            //         by `collect_symbol`.
            let () = check(unsafe {
                SymEnumSymbols(
                    process,
                    base,
                    mask_ptr,
                    Some(collect_symbol),
                    ptr::addr_of_mut!(syms).cast::<c_void>(),
                )
            })?;
        }

        trace!("enumerated {} symbols at {base:#x}", syms.len());
        for sym in &syms {
            if callback(&sym.as_info()).is_break() {
                break
            }
        }
        Ok(())
    }

    fn line_from_addr(&self, process: Self::Process, addr: Addr) -> Option<LineInfo> {
        let mut line = IMAGEHLP_LINE64 {
            SizeOfStruct: size_of::<IMAGEHLP_LINE64>() as u32,
            Key: ptr::null_mut(),
            LineNumber: 0,
            FileName: ptr::null_mut(),
            Address: 0,
        };
        let mut displacement = 0u32;

        let _guard = self.lock();
        // SAFETY: Both output arguments are valid for writes.
        let result =
            unsafe { SymGetLineFromAddr64(process, addr, &mut displacement, &mut line) };
        if result == 0 || line.FileName.is_null() {
            return None
        }

        // SAFETY: DbgHelp provides a NUL terminated file name that stays
        //         valid until the next call, which we exclude by holding
        //         the lock.
        let file = unsafe { CStr::from_ptr(line.FileName.cast()) };
        Some(LineInfo {
            file: file.to_string_lossy().into_owned(),
            line: line.LineNumber,
        })
    }

    fn is_emulated_32(&self, process: Self::Process) -> bool {
        let mut wow64 = 0;
        // SAFETY: `wow64` is valid for writes.
        let result = unsafe { IsWow64Process(process, &mut wow64) };
        result != 0 && wow64 != 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::env::current_exe;


    /// Check that C character arrays are converted properly.
    #[test]
    fn char_conversion() {
        let chars = [b'a' as i8, b'b' as i8, 0, b'c' as i8];
        assert_eq!(chars_to_string(&chars), "ab");
        assert_eq!(chars_to_string(&[]), "");
    }

    /// Check that we can load our own executable and find symbols in it.
    #[test]
    fn load_self() {
        let backend = DbgHelp::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();

        let base = backend
            .load_module(process, &current_exe().unwrap(), 0, 0)
            .unwrap();
        let info = backend.module_info(process, base).unwrap();
        assert_eq!(info.base, base);

        let mut count = 0;
        let () = backend
            .enum_symbols(process, base, None, &mut |_info| {
                count += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_ne!(count, 0);

        let () = backend.cleanup(process).unwrap();
    }
}
