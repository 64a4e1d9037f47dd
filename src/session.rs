use std::fs;
use std::path::Path;

use crate::adapter::CallbackContext;
use crate::backend::Backend;
use crate::backend::SymOptions;
use crate::backend::SymbolInfo;
use crate::log::debug;
use crate::log::warn;
use crate::register::ContextMode;
use crate::register::RegisterSnapshot;
use crate::symbol::LocalSymbol;
use crate::symbol::ModuleSymbol;
use crate::Addr;
use crate::DiagCode;
use crate::Error;
use crate::ErrorKind;
use crate::Result;


/// Determine the size of the file at `path`, for use as a module's
/// image size.
///
/// Files that cannot be inspected report a size of zero, leaving it to
/// the backend to figure out the size.
fn module_size(path: &Path) -> u32 {
    fs::metadata(path)
        .map(|meta| u32::try_from(meta.len()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}


/// A module loaded for the duration of one enumeration, unloaded again
/// when dropped.
struct ModuleGuard<'backend, B>
where
    B: Backend,
{
    backend: &'backend B,
    process: B::Process,
    base: Addr,
}

impl<B> Drop for ModuleGuard<'_, B>
where
    B: Backend,
{
    fn drop(&mut self) {
        if let Err(code) = self.backend.unload_module(self.process, self.base) {
            warn!(
                "failed to unload module at {:#x}: diagnostic code {code}",
                self.base
            );
        } else {
            debug!("unloaded module at {:#x}", self.base);
        }
    }
}


/// A binding between a process handle and the debug information backend.
///
/// A session is meant to be created for one logical extraction and
/// dropped afterwards. Dropping it releases the backend binding of its
/// process handle and, if the session opened the handle itself, closes
/// the handle.
#[derive(Debug)]
pub struct Session<'backend, B>
where
    B: Backend,
{
    backend: &'backend B,
    process: B::Process,
    owned: bool,
}

impl<'backend, B> Session<'backend, B>
where
    B: Backend,
{
    /// Create a session for the calling process.
    ///
    /// The session opens its own handle, initializes the backend binding
    /// for it (without loading any of the process' modules), and owns
    /// the handle.
    pub fn new(backend: &'backend B) -> Result<Self> {
        let process = backend.open_current_process().map_err(|code| {
            Error::new(
                ErrorKind::Initialization,
                code,
                "failed to open handle to current process",
            )
        })?;

        if let Err(code) = backend.initialize(process, false) {
            let () = backend.close_process(process);
            return Err(Error::new(
                ErrorKind::Initialization,
                code,
                format!("failed to initialize backend for process {process:?}"),
            ))
        }

        debug!("created session for process {process:?}");
        let slf = Self {
            backend,
            process,
            owned: true,
        };
        Ok(slf)
    }

    /// Create a session for a process handle owned by the caller.
    ///
    /// This only configures the backend's options ([`SymOptions::SESSION`]).
    /// The backend binding for `process` is expected to be initialized
    /// already, e.g., by means of [`initialize_debug_binding`].
    pub fn with_process(backend: &'backend B, process: B::Process) -> Self {
        let () = backend.set_options(SymOptions::SESSION);
        debug!("created session for borrowed process handle {process:?}");

        Self {
            backend,
            process,
            owned: false,
        }
    }

    /// Retrieve the process handle the session is bound to.
    #[inline]
    pub fn process(&self) -> B::Process {
        self.process
    }

    /// Check whether the session owns its process handle.
    #[inline]
    pub fn owns_process(&self) -> bool {
        self.owned
    }

    fn load(&self, path: &Path, base: Addr, size: u32) -> Result<ModuleGuard<'backend, B>> {
        let base = self
            .backend
            .load_module(self.process, path, base, size)
            .map_err(|code| {
                Error::new(
                    ErrorKind::ModuleLoad,
                    code,
                    format!("failed to load module `{}`", path.display()),
                )
            })?;
        debug!("loaded module `{}` at {base:#x}", path.display());

        let guard = ModuleGuard {
            backend: self.backend,
            process: self.process,
            base,
        };
        Ok(guard)
    }

    fn enumerate_module(&self, module: &ModuleGuard<'_, B>) -> Result<Vec<ModuleSymbol>> {
        let mut syms = Vec::new();
        let mut ctx = CallbackContext::Module {
            backend: self.backend,
            process: self.process,
            syms: &mut syms,
        };

        let () = self
            .backend
            .enum_symbols(
                self.process,
                module.base,
                None,
                &mut |info: &SymbolInfo<'_>| ctx.visit(info),
            )
            .map_err(|code| {
                Error::new(
                    ErrorKind::Enumeration,
                    code,
                    format!("failed to enumerate symbols of module at {:#x}", module.base),
                )
            })?;

        debug!(
            "enumerated {} symbols of module at {:#x}",
            syms.len(),
            module.base
        );
        Ok(syms)
    }

    /// Load the module at `path` at an address picked by the backend and
    /// retrieve all its symbols.
    ///
    /// The module is unloaded again before this function returns, on
    /// success as well as on failure.
    pub fn module_symbols(&mut self, path: &Path) -> Result<Vec<ModuleSymbol>> {
        let module = self.load(path, 0, 0)?;

        let info = self
            .backend
            .module_info(self.process, module.base)
            .map_err(|code| {
                Error::new(
                    ErrorKind::ModuleInfo,
                    code,
                    format!("failed to retrieve information about module `{}`", path.display()),
                )
            })?;
        debug!(
            "module `{}` spans {:#x}..{:#x} ({} symbols, line numbers: {})",
            info.name,
            info.base,
            info.base.wrapping_add(info.size),
            info.symbol_count,
            info.line_numbers
        );

        self.enumerate_module(&module)
    }

    /// Load the debug information file at `path` at the given `base`
    /// address and retrieve all its symbols.
    ///
    /// This is meant for resolving symbols against a known mapping, such
    /// as a module mapped into a live process. The module is unloaded
    /// again before this function returns.
    pub fn module_symbols_at(&mut self, path: &Path, base: Addr) -> Result<Vec<ModuleSymbol>> {
        let module = self.load(path, base, module_size(path))?;
        self.enumerate_module(&module)
    }

    /// Retrieve the local variables and parameters visible in the
    /// function activation containing `func_addr`.
    ///
    /// Register based storage is resolved against `snapshot`, whose
    /// layout has to match the emulation mode of the session's process.
    /// The debug information covering `func_addr` has to be loaded into
    /// the process' binding already.
    pub fn local_symbols(
        &mut self,
        func_addr: Addr,
        snapshot: &RegisterSnapshot,
    ) -> Result<Vec<LocalSymbol>> {
        let emulated = self.backend.is_emulated_32(self.process);
        let mode = snapshot.mode();
        if emulated != matches!(mode, ContextMode::Emulated32) {
            return Err(Error::new(
                ErrorKind::ContextMismatch,
                DiagCode::NONE,
                format!(
                    "{mode} register snapshot provided for {} process",
                    if emulated { "emulated 32 bit" } else { "native" }
                ),
            ))
        }

        let () = self
            .backend
            .set_scope(self.process, func_addr)
            .map_err(|code| {
                Error::new(
                    ErrorKind::ScopeActivation,
                    code,
                    format!("failed to activate scope for address {func_addr:#x}"),
                )
            })?;

        let mut syms = Vec::new();
        let mut ctx = CallbackContext::Local {
            backend: self.backend,
            process: self.process,
            snapshot,
            syms: &mut syms,
        };

        let () = self
            .backend
            .enum_symbols(
                self.process,
                0,
                Some("*"),
                &mut |info: &SymbolInfo<'_>| ctx.visit(info),
            )
            .map_err(|code| {
                Error::new(
                    ErrorKind::Enumeration,
                    code,
                    format!("failed to enumerate local symbols at {func_addr:#x}"),
                )
            })?;

        debug!("enumerated {} local symbols at {func_addr:#x}", syms.len());
        Ok(syms)
    }
}

impl<B> Drop for Session<'_, B>
where
    B: Backend,
{
    fn drop(&mut self) {
        if let Err(code) = self.backend.cleanup(self.process) {
            warn!(
                "failed to clean up backend binding for process {:?}: diagnostic code {code}",
                self.process
            );
        }

        if self.owned {
            let () = self.backend.close_process(self.process);
        }
        debug!("closed session for process {:?}", self.process);
    }
}


/// Set up the backend binding for a process handle that will later be
/// used with [`Session::with_process`].
///
/// This configures the backend's options ([`SymOptions::SESSION`]),
/// initializes the binding (loading all modules currently mapped into
/// the process), and, if `path` is provided, additionally loads the
/// debug information at `path` at `base`.
pub fn initialize_debug_binding<B>(
    backend: &B,
    process: B::Process,
    path: Option<&Path>,
    base: Addr,
) -> Result<()>
where
    B: Backend,
{
    let () = backend.set_options(SymOptions::SESSION);
    let () = backend.initialize(process, true).map_err(|code| {
        Error::new(
            ErrorKind::Initialization,
            code,
            format!("failed to initialize backend for process {process:?}"),
        )
    })?;

    if let Some(path) = path {
        let base = backend
            .load_module(process, path, base, module_size(path))
            .map_err(|code| {
                Error::new(
                    ErrorKind::ModuleLoad,
                    code,
                    format!("failed to load module `{}`", path.display()),
                )
            })?;
        debug!("loaded module `{}` at {base:#x}", path.display());
    }
    Ok(())
}
