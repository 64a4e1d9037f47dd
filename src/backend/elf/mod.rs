//! A backend reading symbols from ELF images and their DWARF debug
//! information.

#[cfg(feature = "dwarf")]
mod dwarf;
mod image;
mod maps;
mod process;

use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub use self::process::Pid;
pub use self::process::ProcessHandle;

#[cfg(feature = "dwarf")]
use self::dwarf::VarKind;
#[cfg(feature = "dwarf")]
use self::dwarf::VarLocation;
use self::image::demangle;
use self::image::Image;

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
#[cfg(feature = "dwarf")]
use crate::SymTag;
#[cfg(feature = "dwarf")]
use crate::UNNAMED;


/// The address at which we start searching for a free spot for modules
/// that have no preferred base.
const AUTO_BASE: Addr = 0x1000_0000;
/// The alignment of automatically chosen module addresses.
const AUTO_ALIGN: Addr = 0x1_0000;


fn diag(errno: i32) -> DiagCode {
    DiagCode(errno as u32)
}

fn io_diag(err: &io::Error) -> DiagCode {
    let errno = match err.raw_os_error() {
        Some(errno) => errno,
        None if err.kind() == io::ErrorKind::InvalidData => libc::ENOEXEC,
        None => libc::EIO,
    };
    diag(errno)
}


/// Check whether `text` matches the wildcard `pattern`, in which `*`
/// matches any sequence of characters and `?` any single one.
fn wildcard_match(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let eq = |p: char, t: char| {
        if case_insensitive {
            p.to_lowercase().eq(t.to_lowercase())
        } else {
            p == t
        }
    };

    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0, 0);
    // The position of the last `*` seen and the text position it was
    // tried at.
    let mut backtrack = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '?' || eq(pattern[p], text[t])) {
            p += 1;
            t += 1;
        } else if let Some((star, mark)) = backtrack {
            backtrack = Some((star, mark + 1));
            p = star + 1;
            t = mark + 1;
        } else {
            return false
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}


#[derive(Debug)]
struct Module {
    base: Addr,
    size: u64,
    image: Arc<Image>,
}

impl Module {
    /// The difference between the address the module is loaded at and
    /// the one it was linked for.
    fn bias(&self) -> Addr {
        self.base.wrapping_sub(self.image.preferred_base())
    }

    fn end(&self) -> Addr {
        self.base.saturating_add(self.size.max(1))
    }

    fn contains(&self, addr: Addr) -> bool {
        (self.base..self.end()).contains(&addr)
    }
}


/// The lexical scope activated via `set_scope`.
#[derive(Clone, Copy, Debug)]
struct Scope {
    module_base: Addr,
    pc: Addr,
}


#[derive(Debug, Default)]
struct Binding {
    modules: BTreeMap<Addr, Module>,
    scope: Option<Scope>,
}

impl Binding {
    fn find_module(&self, addr: Addr) -> Option<&Module> {
        self.modules
            .range(..=addr)
            .next_back()
            .map(|(_base, module)| module)
            .filter(|module| module.contains(addr))
    }

    /// Find a spot for a module of `size` bytes, starting at `base`.
    fn free_base(&self, mut base: Addr, size: u64) -> Option<Addr> {
        let size = size.max(1);
        loop {
            let end = base.checked_add(size)?;
            let overlap = self
                .modules
                .values()
                .filter(|module| module.base < end && base < module.end())
                .map(Module::end)
                .max();
            match overlap {
                None => return Some(base),
                Some(overlap_end) => {
                    base = overlap_end.checked_next_multiple_of(AUTO_ALIGN)?;
                }
            }
        }
    }
}


/// A snapshot of what is needed to enumerate a module's symbols without
/// holding on to the binding.
struct Target {
    base: Addr,
    bias: Addr,
    image: Arc<Image>,
}

impl From<&Module> for Target {
    fn from(module: &Module) -> Self {
        Self {
            base: module.base,
            bias: module.bias(),
            image: Arc::clone(&module.image),
        }
    }
}


/// A backend working on ELF images.
///
/// Modules are memory mapped and their symbol tables read eagerly. DWARF
/// debug information is parsed on first use if
/// [`SymOptions::DEFERRED_LOADS`] is set, and right when loading a
/// module otherwise.
#[derive(Debug)]
pub struct ElfBackend {
    options: AtomicU32,
    bindings: Mutex<HashMap<ProcessHandle, Binding>>,
}

impl ElfBackend {
    /// Create a new backend instance, configured with
    /// [`SymOptions::SESSION`].
    pub fn new() -> Self {
        Self {
            options: AtomicU32::new(SymOptions::SESSION.bits()),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn bindings(&self) -> MutexGuard<'_, HashMap<ProcessHandle, Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_image(&self, path: &Path) -> io::Result<Arc<Image>> {
        let options = self.options();
        let image = Image::open(path, options)?;
        #[cfg(feature = "dwarf")]
        if !options.contains(SymOptions::DEFERRED_LOADS) {
            let _info = image.debug_info();
        }
        Ok(Arc::new(image))
    }

    fn enum_module(
        &self,
        target: Target,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) {
        let options = self.options();
        let undname = options.contains(SymOptions::UNDNAME);
        let case_insensitive = options.contains(SymOptions::CASE_INSENSITIVE);

        for sym in target.image.symbols() {
            let name = if undname {
                demangle(&sym.name)
            } else {
                Cow::Borrowed(&*sym.name)
            };
            if let Some(mask) = mask {
                if !wildcard_match(mask, &name, case_insensitive) {
                    continue
                }
            }

            let (addr, value) = if sym.is_absolute() {
                (sym.addr, sym.addr)
            } else {
                (sym.addr.wrapping_add(target.bias), 0)
            };
            let info = SymbolInfo {
                name: Some(&name),
                addr,
                size: sym.size,
                value,
                tag: sym.tag.0,
                flags: sym.flags,
                register: 0,
                module_base: target.base,
            };
            if callback(&info).is_break() {
                break
            }
        }
    }

    #[cfg(feature = "dwarf")]
    fn enum_scope(
        &self,
        target: Target,
        pc: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        let case_insensitive = self.options().contains(SymOptions::CASE_INSENSITIVE);
        let svma = pc.wrapping_sub(target.bias);
        let function = target
            .image
            .debug_info()
            .and_then(|info| info.find_function(svma))
            .ok_or_else(|| diag(libc::ENOENT))?;

        for var in function.vars.iter() {
            if !var.is_visible_at(svma) {
                continue
            }
            if let Some(mask) = mask {
                if !wildcard_match(mask, var.name.as_deref().unwrap_or(""), case_insensitive) {
                    continue
                }
            }

            let mut flags = match var.kind {
                VarKind::Parameter => SymbolFlags::PARAMETER,
                VarKind::Local => SymbolFlags::LOCAL,
            };
            let (addr, register) = match var.location {
                VarLocation::RegisterRelative { register, offset } => {
                    flags |= SymbolFlags::REGREL;
                    (offset as Addr, register)
                }
                VarLocation::Register(register) => {
                    flags |= SymbolFlags::REGISTER;
                    (0, register)
                }
                VarLocation::Static(addr) => (addr.wrapping_add(target.bias), 0),
                // Register id 0 is never mapped, so such variables
                // surface as unresolved.
                VarLocation::Unknown => {
                    flags |= SymbolFlags::REGISTER;
                    (0, 0)
                }
            };

            let info = SymbolInfo {
                name: var.name.as_deref(),
                addr,
                size: var.size,
                value: 0,
                tag: SymTag::DATA.0,
                flags,
                register,
                module_base: target.base,
            };
            if callback(&info).is_break() {
                break
            }
        }
        Ok(())
    }

    /// Make sure a function covers `pc`.
    #[cfg(feature = "dwarf")]
    fn check_scope(&self, target: &Target, pc: Addr) -> Result<(), DiagCode> {
        let svma = pc.wrapping_sub(target.bias);
        let function = target
            .image
            .debug_info()
            .and_then(|info| info.find_function(svma))
            .ok_or_else(|| diag(libc::ENOENT))?;
        debug!(
            "activating scope of function {} at {pc:#x} in module at {:#x}",
            function.name.as_deref().unwrap_or(UNNAMED),
            target.base
        );
        Ok(())
    }

    #[cfg(not(feature = "dwarf"))]
    fn check_scope(&self, _target: &Target, _pc: Addr) -> Result<(), DiagCode> {
        Err(diag(libc::ENOTSUP))
    }

    #[cfg(not(feature = "dwarf"))]
    fn enum_scope(
        &self,
        _target: Target,
        _pc: Addr,
        _mask: Option<&str>,
        _callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        Err(diag(libc::ENOTSUP))
    }
}

impl Default for ElfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ElfBackend {
    type Process = ProcessHandle;

    fn options(&self) -> SymOptions {
        SymOptions::from_bits_retain(self.options.load(Ordering::Relaxed))
    }

    fn set_options(&self, options: SymOptions) {
        let () = self.options.store(options.bits(), Ordering::Relaxed);
    }

    fn open_current_process(&self) -> Result<Self::Process, DiagCode> {
        Ok(ProcessHandle::unique_self())
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, DiagCode> {
        let pid = Pid::from(pid);
        if !Path::new(&format!("/proc/{pid}")).exists() {
            return Err(diag(libc::ESRCH))
        }
        Ok(ProcessHandle::from_pid(pid))
    }

    fn close_process(&self, process: Self::Process) {
        trace!("closing process handle {process}");
    }

    fn initialize(&self, process: Self::Process, invade: bool) -> Result<(), DiagCode> {
        let mut binding = Binding::default();

        if invade {
            let pid = process.pid();
            let loaded = maps::loaded_modules(pid).map_err(|err| io_diag(&err))?;
            for (path, base) in loaded {
                let image = match self.open_image(&path) {
                    Ok(image) => image,
                    Err(err) => {
                        debug!("skipping module {} of process {pid}: {err}", path.display());
                        continue
                    }
                };
                let module = Module {
                    base,
                    size: image.size(),
                    image,
                };
                let _prev = binding.modules.insert(base, module);
            }
            debug!(
                "loaded {} modules of process {pid}",
                binding.modules.len()
            );
        }

        let _prev = self.bindings().insert(process, binding);
        Ok(())
    }

    fn cleanup(&self, process: Self::Process) -> Result<(), DiagCode> {
        self.bindings()
            .remove(&process)
            .map(|_binding| ())
            .ok_or_else(|| diag(libc::ESRCH))
    }

    fn load_module(
        &self,
        process: Self::Process,
        path: &Path,
        base: Addr,
        size: u32,
    ) -> Result<Addr, DiagCode> {
        if !self.bindings().contains_key(&process) {
            return Err(diag(libc::ESRCH))
        }

        let image = self.open_image(path).map_err(|err| {
            debug!("failed to load module {}: {err}", path.display());
            io_diag(&err)
        })?;
        let size = if size == 0 {
            image.size()
        } else {
            u64::from(size)
        };

        let mut bindings = self.bindings();
        let binding = bindings
            .get_mut(&process)
            .ok_or_else(|| diag(libc::ESRCH))?;
        let base = if base == 0 {
            let start = match image.preferred_base() {
                0 => AUTO_BASE,
                preferred => preferred,
            };
            binding
                .free_base(start, size)
                .ok_or_else(|| diag(libc::ENOMEM))?
        } else {
            base
        };

        match binding.modules.entry(base) {
            Entry::Occupied(..) => Err(diag(libc::EEXIST)),
            Entry::Vacant(vacancy) => {
                debug!("loaded {} at {base:#x}", path.display());
                let _module = vacancy.insert(Module { base, size, image });
                Ok(base)
            }
        }
    }

    fn module_info(&self, process: Self::Process, base: Addr) -> Result<ModuleInfo, DiagCode> {
        let bindings = self.bindings();
        let binding = bindings.get(&process).ok_or_else(|| diag(libc::ESRCH))?;
        let module = binding
            .find_module(base)
            .ok_or_else(|| diag(libc::EINVAL))?;
        let image = &module.image;
        let path = image.path();

        let info = ModuleInfo {
            base: module.base,
            size: module.size,
            name: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            symbol_count: u32::try_from(image.symbols().len()).unwrap_or(u32::MAX),
            line_numbers: image.has_line_section()
                && self.options().contains(SymOptions::LOAD_LINES),
        };
        Ok(info)
    }

    fn unload_module(&self, process: Self::Process, base: Addr) -> Result<(), DiagCode> {
        let mut bindings = self.bindings();
        let binding = bindings
            .get_mut(&process)
            .ok_or_else(|| diag(libc::ESRCH))?;
        let _module = binding
            .modules
            .remove(&base)
            .ok_or_else(|| diag(libc::EINVAL))?;
        if binding
            .scope
            .is_some_and(|scope| scope.module_base == base)
        {
            binding.scope = None;
        }
        Ok(())
    }

    fn set_scope(&self, process: Self::Process, addr: Addr) -> Result<(), DiagCode> {
        let target = {
            let bindings = self.bindings();
            let binding = bindings.get(&process).ok_or_else(|| diag(libc::ESRCH))?;
            binding
                .find_module(addr)
                .map(Target::from)
                .ok_or_else(|| diag(libc::EFAULT))?
        };
        // Debug information may get parsed here, so don't hold the lock.
        let () = self.check_scope(&target, addr)?;

        let mut bindings = self.bindings();
        let binding = bindings
            .get_mut(&process)
            .ok_or_else(|| diag(libc::ESRCH))?;
        // The module may have been unloaded in the meantime.
        if !binding.modules.contains_key(&target.base) {
            return Err(diag(libc::EFAULT))
        }
        binding.scope = Some(Scope {
            module_base: target.base,
            pc: addr,
        });
        Ok(())
    }

    fn enum_symbols(
        &self,
        process: Self::Process,
        base: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        // Collect what we need and let go of the lock before invoking the
        // callback.
        let (target, scope) = {
            let bindings = self.bindings();
            let binding = bindings.get(&process).ok_or_else(|| diag(libc::ESRCH))?;
            if base == 0 {
                let scope = binding.scope.ok_or_else(|| diag(libc::EINVAL))?;
                let module = binding
                    .modules
                    .get(&scope.module_base)
                    .ok_or_else(|| diag(libc::EINVAL))?;
                (Target::from(module), Some(scope))
            } else {
                let module = binding
                    .modules
                    .get(&base)
                    .ok_or_else(|| diag(libc::EINVAL))?;
                (Target::from(module), None)
            }
        };

        match scope {
            Some(scope) => self.enum_scope(target, scope.pc, mask, callback),
            None => {
                let () = self.enum_module(target, mask, callback);
                Ok(())
            }
        }
    }

    fn line_from_addr(&self, process: Self::Process, addr: Addr) -> Option<LineInfo> {
        if !self.options().contains(SymOptions::LOAD_LINES) {
            return None
        }

        let target = {
            let bindings = self.bindings();
            let module = bindings.get(&process)?.find_module(addr)?;
            Target::from(module)
        };

        #[cfg(feature = "dwarf")]
        {
            let svma = addr.wrapping_sub(target.bias);
            let location = target.image.debug_info()?.find_location(svma)?;
            Some(LineInfo {
                file: location.file.to_string(),
                line: location.line,
            })
        }
        #[cfg(not(feature = "dwarf"))]
        {
            let _target = target;
            None
        }
    }

    fn is_emulated_32(&self, process: Self::Process) -> bool {
        process::is_emulated_32(process.pid())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::env::current_exe;
    use std::hint::black_box;

    use test_log::test;


    /// A function with a known set of parameters and locals.
    #[inline(never)]
    fn sample_locals(alpha: u64, beta: u32) -> u64 {
        let gamma = alpha.wrapping_mul(u64::from(beta));
        black_box(gamma)
    }


    fn enum_names(
        backend: &ElfBackend,
        process: ProcessHandle,
        base: Addr,
        mask: Option<&str>,
    ) -> Vec<(String, Addr, SymbolFlags)> {
        let mut names = Vec::new();
        let () = backend
            .enum_symbols(process, base, mask, &mut |info| {
                let name = info.name.unwrap_or_default().to_string();
                let () = names.push((name, info.addr, info.flags));
                ControlFlow::Continue(())
            })
            .unwrap();
        names
    }


    /// Check that our wildcard matching works as expected.
    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*", "", false));
        assert!(wildcard_match("*", "anything", false));
        assert!(wildcard_match("foo*", "foobar", false));
        assert!(wildcard_match("*bar", "foobar", false));
        assert!(wildcard_match("f?o*r", "foobar", false));
        assert!(wildcard_match("*o*a*", "foobar", false));
        assert!(!wildcard_match("foo", "foobar", false));
        assert!(!wildcard_match("?", "", false));
        assert!(!wildcard_match("FOO*", "foobar", false));
        assert!(wildcard_match("FOO*", "foobar", true));
    }

    /// Check that automatically chosen bases never overlap existing
    /// modules.
    #[test]
    fn free_base_selection() {
        let image = Arc::new(Image::open(&current_exe().unwrap(), SymOptions::SESSION).unwrap());
        let mut binding = Binding::default();
        assert_eq!(binding.free_base(AUTO_BASE, 0x1000), Some(AUTO_BASE));

        let module = Module {
            base: AUTO_BASE,
            size: 0x1_2345,
            image,
        };
        let _prev = binding.modules.insert(AUTO_BASE, module);
        assert_eq!(
            binding.free_base(AUTO_BASE, 0x1000),
            Some(AUTO_BASE + 0x2_0000)
        );
        assert_eq!(
            binding.free_base(AUTO_BASE - 0x1000, 0x800),
            Some(AUTO_BASE - 0x1000)
        );
        assert_eq!(binding.free_base(Addr::MAX - 0x10, 0x100), None);
    }

    /// Check that operations on a process without binding fail.
    #[test]
    fn unbound_process() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let exe = current_exe().unwrap();

        let err = backend.load_module(process, &exe, 0, 0).unwrap_err();
        assert_eq!(err, diag(libc::ESRCH));
        let err = backend.cleanup(process).unwrap_err();
        assert_eq!(err, diag(libc::ESRCH));
        let err = backend.set_scope(process, 0x1000).unwrap_err();
        assert_eq!(err, diag(libc::ESRCH));
    }

    /// Check that we can load our own executable and enumerate its
    /// symbols.
    #[test]
    fn enumerate_own_symbols() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();

        let exe = current_exe().unwrap();
        let base = backend.load_module(process, &exe, 0, 0).unwrap();
        let info = backend.module_info(process, base).unwrap();
        assert_eq!(info.base, base);
        assert_eq!(info.path, exe);
        assert_ne!(info.symbol_count, 0);

        let syms = enum_names(&backend, process, base, Some("*enumerate_own_symbols*"));
        assert!(!syms.is_empty());
        assert!(syms
            .iter()
            .all(|(name, _addr, _flags)| name.contains("enumerate_own_symbols")));
        assert!(syms
            .iter()
            .any(|(_name, addr, flags)| flags.contains(SymbolFlags::FUNCTION) && *addr >= base));

        let () = backend.cleanup(process).unwrap();
    }

    /// Check that loading at an explicit address honors it and rejects
    /// duplicates.
    #[test]
    fn load_at_explicit_base() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();

        let exe = current_exe().unwrap();
        let base = backend
            .load_module(process, &exe, 0x7000_0000_0000, 0x1000)
            .unwrap();
        assert_eq!(base, 0x7000_0000_0000);
        let info = backend.module_info(process, base + 0x10).unwrap();
        assert_eq!(info.base, base);
        assert_eq!(info.size, 0x1000);

        let err = backend
            .load_module(process, &exe, 0x7000_0000_0000, 0)
            .unwrap_err();
        assert_eq!(err, diag(libc::EEXIST));

        // Another module loaded with automatic base must not overlap.
        let other = backend.load_module(process, &exe, 0, 0).unwrap();
        assert_ne!(other, base);

        let () = backend.unload_module(process, base).unwrap();
        let err = backend.unload_module(process, base).unwrap_err();
        assert_eq!(err, diag(libc::EINVAL));
        let err = backend.module_info(process, base).unwrap_err();
        assert_eq!(err, diag(libc::EINVAL));
    }

    /// Check that a file that is not an ELF image cannot be loaded.
    #[test]
    fn load_invalid_module() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();

        let err = backend
            .load_module(process, Path::new("/does/not/exist"), 0, 0)
            .unwrap_err();
        assert_eq!(err, diag(libc::ENOENT));

        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let err = backend.load_module(process, &manifest, 0, 0).unwrap_err();
        assert_eq!(err, diag(libc::ENOEXEC));
    }

    /// Check that symbol names are presented demangled or raw, depending
    /// on the configured options.
    #[cfg(feature = "demangle")]
    #[test]
    fn undecorated_names() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();
        let base = backend
            .load_module(process, &current_exe().unwrap(), 0, 0)
            .unwrap();

        let syms = enum_names(&backend, process, base, Some("*undecorated_names*"));
        assert!(syms.iter().any(|(name, ..)| name.contains("::")), "{syms:?}");

        let () = backend.set_options(SymOptions::SESSION - SymOptions::UNDNAME);
        let syms = enum_names(&backend, process, base, Some("_ZN*undecorated_names*"));
        assert!(!syms.is_empty());
    }

    /// Check that we can enumerate the parameters of a function in the
    /// current process.
    #[cfg(feature = "dwarf")]
    #[test]
    fn enumerate_function_locals() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, true).unwrap();

        let addr = sample_locals as usize as Addr;
        let _result = sample_locals(black_box(3), black_box(4));
        let info = backend.module_info(process, addr).unwrap();
        if !info.line_numbers {
            // No debug information to work with.
            return
        }

        let () = backend.set_scope(process, addr).unwrap();
        let syms = enum_names(&backend, process, 0, Some("*"));
        let alpha = syms.iter().find(|(name, ..)| name == "alpha").unwrap();
        let beta = syms.iter().find(|(name, ..)| name == "beta").unwrap();
        assert!(alpha.2.contains(SymbolFlags::PARAMETER));
        assert!(beta.2.contains(SymbolFlags::PARAMETER));
        if cfg!(target_arch = "x86_64") {
            assert!(alpha.2.contains(SymbolFlags::REGREL), "{alpha:?}");
        }

        let syms = enum_names(&backend, process, 0, Some("ALPHA"));
        assert_eq!(syms.len(), 1);

        let line = backend.line_from_addr(process, addr).unwrap();
        assert!(line.file.ends_with("mod.rs"), "{line:?}");
        assert_ne!(line.line, 0);
    }

    /// Check that a scope can only be activated at an address some
    /// function covers.
    #[cfg(feature = "dwarf")]
    #[test]
    fn scope_outside_function() {
        let backend = ElfBackend::new();
        let process = backend.open_current_process().unwrap();
        let () = backend.initialize(process, false).unwrap();
        let base = backend
            .load_module(process, &current_exe().unwrap(), 0, 0)
            .unwrap();

        // The image starts with its ELF header, not with code.
        let err = backend.set_scope(process, base).unwrap_err();
        assert_eq!(err, diag(libc::ENOENT));
        // No scope got activated.
        let err = backend
            .enum_symbols(process, 0, Some("*"), &mut |_info| ControlFlow::Continue(()))
            .unwrap_err();
        assert_eq!(err, diag(libc::EINVAL));

        let err = backend.set_scope(process, base.wrapping_sub(1)).unwrap_err();
        assert_eq!(err, diag(libc::EFAULT));
    }
}
