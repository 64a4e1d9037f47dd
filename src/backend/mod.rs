//! The contract with the debug information backend.
//!
//! The backend is the component that actually parses debug information.
//! It keeps a binding per process handle, loads modules into that
//! binding, and walks symbols by invoking a callback once per symbol.
//! This crate only drives it through the [`Backend`] trait.

#[cfg(windows)]
mod dbghelp;
#[cfg(unix)]
mod elf;

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::path::Path;
use std::path::PathBuf;
#[cfg(any(windows, unix))]
use std::sync::OnceLock;

use bitflags::bitflags;

#[cfg(windows)]
pub use self::dbghelp::DbgHelp;
#[cfg(unix)]
pub use self::elf::ElfBackend;
#[cfg(unix)]
pub use self::elf::Pid;
#[cfg(unix)]
pub use self::elf::ProcessHandle;

use crate::Addr;
use crate::DiagCode;


bitflags! {
    /// Process wide backend options.
    ///
    /// Bit values match the corresponding DbgHelp `SYMOPT_*` constants.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SymOptions: u32 {
        /// Match symbol names case insensitively.
        const CASE_INSENSITIVE = 0x1;
        /// Present symbol names in undecorated (demangled) form.
        const UNDNAME = 0x2;
        /// Defer parsing of debug information until it is first needed.
        const DEFERRED_LOADS = 0x4;
        /// Load line number information.
        const LOAD_LINES = 0x10;
        /// Include 32 bit modules when running on a 64 bit host.
        const INCLUDE_32BIT_MODULES = 0x2000;
        /// Emit backend debug output.
        const DEBUG = 0x8000_0000;
    }
}

impl SymOptions {
    /// The options configured by sessions bound to an externally owned
    /// process handle and by [`initialize_debug_binding`][crate::initialize_debug_binding].
    pub const SESSION: SymOptions = SymOptions::CASE_INSENSITIVE
        .union(SymOptions::UNDNAME)
        .union(SymOptions::DEFERRED_LOADS)
        .union(SymOptions::LOAD_LINES)
        .union(SymOptions::INCLUDE_32BIT_MODULES)
        .union(SymOptions::DEBUG);
}


bitflags! {
    /// Storage and classification flags of an enumerated symbol.
    ///
    /// Bit values match the corresponding DbgHelp `SYMFLAG_*` constants.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SymbolFlags: u32 {
        /// The symbol's value is present.
        const VALUEPRESENT = 0x1;
        /// The symbol lives in a register.
        const REGISTER = 0x8;
        /// The symbol lives at an offset from a register's value.
        const REGREL = 0x10;
        /// The symbol lives at an offset from the frame.
        const FRAMEREL = 0x20;
        /// The symbol is a parameter.
        const PARAMETER = 0x40;
        /// The symbol is a local variable.
        const LOCAL = 0x80;
        /// The symbol is a constant.
        const CONSTANT = 0x100;
        /// The symbol is exported.
        const EXPORT = 0x200;
        /// The symbol is a forwarder.
        const FORWARDER = 0x400;
        /// The symbol is a function.
        const FUNCTION = 0x800;
        /// The symbol is virtual.
        const VIRTUAL = 0x1000;
        /// The symbol is a thunk.
        const THUNK = 0x2000;
        /// The symbol lives at an offset in thread local storage.
        const TLSREL = 0x4000;

        // The backend may report bits we have no name for.
        const _ = !0;
    }
}


/// The descriptor of one symbol, as handed to the enumeration callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolInfo<'info> {
    /// The symbol's name, if it has one.
    pub name: Option<&'info str>,
    /// The symbol's address or, for register relative storage, the offset
    /// from the register.
    pub addr: Addr,
    /// The symbol's size, in bytes.
    pub size: u64,
    /// The symbol's resolved value.
    pub value: u64,
    /// The raw symbol tag.
    pub tag: u32,
    /// Storage and classification flags.
    pub flags: SymbolFlags,
    /// The CodeView id of the register the symbol's storage depends on.
    pub register: u32,
    /// The base address of the module containing the symbol.
    pub module_base: Addr,
}


/// Source location information for an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineInfo {
    /// The path of the source file.
    pub file: String,
    /// The line number.
    pub line: u32,
}


/// Metadata about a loaded module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    /// The address the module was loaded at.
    pub base: Addr,
    /// The size of the module's image.
    pub size: u64,
    /// The module's name.
    pub name: String,
    /// The path of the file backing the module.
    pub path: PathBuf,
    /// The number of symbols in the module.
    pub symbol_count: u32,
    /// Whether line number information is available.
    pub line_numbers: bool,
}


/// A debug information backend.
///
/// Failing operations report the backend's last diagnostic code. The
/// binding for a process handle is not safe for concurrent use, callers
/// have to make sure that at most one enumeration is in flight per
/// handle.
pub trait Backend {
    /// A handle identifying a process.
    type Process: Copy + Debug;

    /// Retrieve the process wide options.
    fn options(&self) -> SymOptions;

    /// Set the process wide options.
    ///
    /// Options are global state. Concurrent users configuring them
    /// differently are not supported.
    fn set_options(&self, options: SymOptions);

    /// Open a handle to the calling process.
    fn open_current_process(&self) -> Result<Self::Process, DiagCode>;

    /// Open a handle to the process with the given ID.
    fn open_process(&self, pid: u32) -> Result<Self::Process, DiagCode>;

    /// Close a handle opened by [`Backend::open_current_process`] or
    /// [`Backend::open_process`].
    fn close_process(&self, process: Self::Process);

    /// Create the binding for `process`.
    ///
    /// If `invade` is `true`, all modules currently mapped into the
    /// process are loaded as well.
    fn initialize(&self, process: Self::Process, invade: bool) -> Result<(), DiagCode>;

    /// Destroy the binding for `process`, along with all modules loaded
    /// into it.
    fn cleanup(&self, process: Self::Process) -> Result<(), DiagCode>;

    /// Load the module at `path` at address `base`.
    ///
    /// A `base` of `0` lets the backend pick an address. A `size` of `0`
    /// lets the backend determine the image size. Returns the address the
    /// module was loaded at.
    fn load_module(
        &self,
        process: Self::Process,
        path: &Path,
        base: Addr,
        size: u32,
    ) -> Result<Addr, DiagCode>;

    /// Retrieve metadata about the module loaded at `base`.
    fn module_info(&self, process: Self::Process, base: Addr) -> Result<ModuleInfo, DiagCode>;

    /// Unload the module loaded at `base`.
    fn unload_module(&self, process: Self::Process, base: Addr) -> Result<(), DiagCode>;

    /// Activate the lexical scope containing the instruction at `addr`.
    fn set_scope(&self, process: Self::Process, addr: Addr) -> Result<(), DiagCode>;

    /// Invoke `callback` once for every symbol of the module loaded at
    /// `base` or, if `base` is `0`, of the active lexical scope.
    ///
    /// `mask` optionally restricts enumeration to symbols whose name
    /// matches the given wildcard pattern.
    fn enum_symbols(
        &self,
        process: Self::Process,
        base: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode>;

    /// Look up the source location of `addr`, if known.
    fn line_from_addr(&self, process: Self::Process, addr: Addr) -> Option<LineInfo>;

    /// Check whether `process` is a 32 bit program running under
    /// emulation on a 64 bit host.
    fn is_emulated_32(&self, process: Self::Process) -> bool;
}

impl<B> Backend for &B
where
    B: Backend + ?Sized,
{
    type Process = B::Process;

    fn options(&self) -> SymOptions {
        (**self).options()
    }

    fn set_options(&self, options: SymOptions) {
        (**self).set_options(options)
    }

    fn open_current_process(&self) -> Result<Self::Process, DiagCode> {
        (**self).open_current_process()
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, DiagCode> {
        (**self).open_process(pid)
    }

    fn close_process(&self, process: Self::Process) {
        (**self).close_process(process)
    }

    fn initialize(&self, process: Self::Process, invade: bool) -> Result<(), DiagCode> {
        (**self).initialize(process, invade)
    }

    fn cleanup(&self, process: Self::Process) -> Result<(), DiagCode> {
        (**self).cleanup(process)
    }

    fn load_module(
        &self,
        process: Self::Process,
        path: &Path,
        base: Addr,
        size: u32,
    ) -> Result<Addr, DiagCode> {
        (**self).load_module(process, path, base, size)
    }

    fn module_info(&self, process: Self::Process, base: Addr) -> Result<ModuleInfo, DiagCode> {
        (**self).module_info(process, base)
    }

    fn unload_module(&self, process: Self::Process, base: Addr) -> Result<(), DiagCode> {
        (**self).unload_module(process, base)
    }

    fn set_scope(&self, process: Self::Process, addr: Addr) -> Result<(), DiagCode> {
        (**self).set_scope(process, addr)
    }

    fn enum_symbols(
        &self,
        process: Self::Process,
        base: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        (**self).enum_symbols(process, base, mask, callback)
    }

    fn line_from_addr(&self, process: Self::Process, addr: Addr) -> Option<LineInfo> {
        (**self).line_from_addr(process, addr)
    }

    fn is_emulated_32(&self, process: Self::Process) -> bool {
        (**self).is_emulated_32(process)
    }
}


/// The backend used by default on the current platform.
#[cfg(windows)]
pub type DefaultBackend = DbgHelp;
/// The backend used by default on the current platform.
#[cfg(unix)]
pub type DefaultBackend = ElfBackend;


/// Retrieve the process wide instance of the default backend.
#[cfg(any(windows, unix))]
pub fn default_backend() -> &'static DefaultBackend {
    static BACKEND: OnceLock<DefaultBackend> = OnceLock::new();

    BACKEND.get_or_init(DefaultBackend::new)
}
