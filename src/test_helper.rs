//! A scripted in-memory backend for exercising the session logic.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use crate::backend::Backend;
use crate::backend::LineInfo;
use crate::backend::ModuleInfo;
use crate::backend::SymOptions;
use crate::backend::SymbolFlags;
use crate::backend::SymbolInfo;
use crate::Addr;
use crate::DiagCode;
use crate::SymTag;


/// A symbol known to the fake backend.
#[derive(Clone, Debug)]
pub(crate) struct FakeSymbol {
    name: Option<&'static str>,
    addr: Addr,
    size: u64,
    tag: SymTag,
    flags: SymbolFlags,
    register: u32,
}

impl FakeSymbol {
    pub(crate) fn function(name: &'static str, addr: Addr) -> Self {
        Self {
            name: Some(name),
            addr,
            size: 0x20,
            tag: SymTag::FUNCTION,
            flags: SymbolFlags::FUNCTION,
            register: 0,
        }
    }

    pub(crate) fn data(name: &'static str, addr: Addr) -> Self {
        Self {
            name: Some(name),
            addr,
            size: 8,
            tag: SymTag::DATA,
            flags: SymbolFlags::empty(),
            register: 0,
        }
    }

    pub(crate) fn unnamed(addr: Addr) -> Self {
        Self {
            name: None,
            ..Self::data("", addr)
        }
    }

    pub(crate) fn flags(mut self, flags: SymbolFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn register(mut self, register: u32) -> Self {
        self.register = register;
        self
    }

    /// Create the descriptor handed to enumeration callbacks; the
    /// symbol's address is taken relative to `module_base`.
    pub(crate) fn info(&self, module_base: Addr) -> SymbolInfo<'_> {
        SymbolInfo {
            name: self.name,
            addr: module_base.wrapping_add(self.addr),
            size: self.size,
            value: 0,
            tag: self.tag.0,
            flags: self.flags,
            register: self.register,
            module_base,
        }
    }
}


/// An operation of the fake backend that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Open,
    Initialize,
    LoadModule,
    ModuleInfo,
    SetScope,
    EnumSymbols,
}

impl Op {
    fn code(&self) -> DiagCode {
        match self {
            Self::Open => DiagCode(5),
            Self::Initialize => DiagCode(87),
            Self::LoadModule => DiagCode(2),
            Self::ModuleInfo => DiagCode(126),
            Self::SetScope => DiagCode(487),
            Self::EnumSymbols => DiagCode(6),
        }
    }
}


/// A backend call, as recorded by the fake backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    SetOptions(SymOptions),
    Open(u64),
    Close(u64),
    Initialize(u64, bool),
    Cleanup(u64),
    Load(PathBuf, Addr, u32),
    Unload(Addr),
    SetScope(Addr),
    Enum(Addr, Option<String>),
}


#[derive(Debug)]
struct FakeModule {
    path: PathBuf,
    preferred_base: Addr,
    syms: Vec<FakeSymbol>,
}

#[derive(Debug)]
struct FakeScope {
    range: Range<Addr>,
    locals: Vec<FakeSymbol>,
}

#[derive(Debug, Default)]
struct State {
    options: SymOptions,
    next_handle: u64,
    /// Loaded modules per bound process.
    bindings: HashMap<u64, BTreeMap<Addr, usize>>,
    scopes: HashMap<u64, usize>,
    calls: Vec<Call>,
}


/// A backend serving scripted modules, scopes, and line information.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    modules: Vec<FakeModule>,
    scopes: Vec<FakeScope>,
    lines: HashMap<Addr, (String, u32)>,
    emulated: bool,
    failing: HashSet<Op>,
    state: RefCell<State>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            modules: Vec::new(),
            scopes: Vec::new(),
            lines: HashMap::new(),
            emulated: false,
            failing: HashSet::new(),
            state: RefCell::new(State {
                next_handle: 1,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn with_module<P>(mut self, path: P, preferred_base: Addr, syms: Vec<FakeSymbol>) -> Self
    where
        P: Into<PathBuf>,
    {
        self.modules.push(FakeModule {
            path: path.into(),
            preferred_base,
            syms,
        });
        self
    }

    pub(crate) fn with_scope(mut self, range: Range<Addr>, locals: Vec<FakeSymbol>) -> Self {
        self.scopes.push(FakeScope { range, locals });
        self
    }

    pub(crate) fn with_line(mut self, addr: Addr, file: &str, line: u32) -> Self {
        let _prev = self.lines.insert(addr, (file.to_string(), line));
        self
    }

    pub(crate) fn emulated(mut self) -> Self {
        self.emulated = true;
        self
    }

    pub(crate) fn failing(mut self, op: Op) -> Self {
        let _new = self.failing.insert(op);
        self
    }

    /// Retrieve the calls made so far.
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Retrieve the number of modules currently loaded for `process`.
    pub(crate) fn loaded(&self, process: u64) -> usize {
        self.state
            .borrow()
            .bindings
            .get(&process)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Check whether a binding for `process` exists.
    pub(crate) fn is_bound(&self, process: u64) -> bool {
        self.state.borrow().bindings.contains_key(&process)
    }

    fn check(&self, op: Op) -> Result<(), DiagCode> {
        if self.failing.contains(&op) {
            Err(op.code())
        } else {
            Ok(())
        }
    }

    fn record(&self, call: Call) {
        let () = self.state.borrow_mut().calls.push(call);
    }
}

impl Backend for FakeBackend {
    type Process = u64;

    fn options(&self) -> SymOptions {
        self.state.borrow().options
    }

    fn set_options(&self, options: SymOptions) {
        let () = self.record(Call::SetOptions(options));
        self.state.borrow_mut().options = options;
    }

    fn open_current_process(&self) -> Result<Self::Process, DiagCode> {
        let () = self.check(Op::Open)?;
        let handle = {
            let mut state = self.state.borrow_mut();
            let handle = state.next_handle;
            state.next_handle += 1;
            handle
        };
        let () = self.record(Call::Open(handle));
        Ok(handle)
    }

    fn open_process(&self, _pid: u32) -> Result<Self::Process, DiagCode> {
        self.open_current_process()
    }

    fn close_process(&self, process: Self::Process) {
        self.record(Call::Close(process))
    }

    fn initialize(&self, process: Self::Process, invade: bool) -> Result<(), DiagCode> {
        let () = self.record(Call::Initialize(process, invade));
        let () = self.check(Op::Initialize)?;
        let _prev = self
            .state
            .borrow_mut()
            .bindings
            .insert(process, BTreeMap::new());
        Ok(())
    }

    fn cleanup(&self, process: Self::Process) -> Result<(), DiagCode> {
        let () = self.record(Call::Cleanup(process));
        let mut state = self.state.borrow_mut();
        let _scope = state.scopes.remove(&process);
        match state.bindings.remove(&process) {
            Some(_modules) => Ok(()),
            None => Err(DiagCode(6)),
        }
    }

    fn load_module(
        &self,
        process: Self::Process,
        path: &Path,
        base: Addr,
        size: u32,
    ) -> Result<Addr, DiagCode> {
        let () = self.record(Call::Load(path.to_path_buf(), base, size));
        let () = self.check(Op::LoadModule)?;

        let idx = self
            .modules
            .iter()
            .position(|module| module.path == path)
            .ok_or(DiagCode(2))?;
        let base = if base == 0 {
            self.modules[idx].preferred_base
        } else {
            base
        };

        let mut state = self.state.borrow_mut();
        let modules = state.bindings.get_mut(&process).ok_or(DiagCode(6))?;
        if modules.contains_key(&base) {
            return Err(DiagCode(183))
        }
        let _prev = modules.insert(base, idx);
        Ok(base)
    }

    fn module_info(&self, process: Self::Process, base: Addr) -> Result<ModuleInfo, DiagCode> {
        let () = self.check(Op::ModuleInfo)?;
        let state = self.state.borrow();
        let idx = *state
            .bindings
            .get(&process)
            .and_then(|modules| modules.get(&base))
            .ok_or(DiagCode(126))?;
        let module = &self.modules[idx];
        let info = ModuleInfo {
            base,
            size: 0x1000,
            name: module
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: module.path.clone(),
            symbol_count: module.syms.len() as u32,
            line_numbers: !self.lines.is_empty(),
        };
        Ok(info)
    }

    fn unload_module(&self, process: Self::Process, base: Addr) -> Result<(), DiagCode> {
        let () = self.record(Call::Unload(base));
        let mut state = self.state.borrow_mut();
        let modules = state.bindings.get_mut(&process).ok_or(DiagCode(6))?;
        modules.remove(&base).map(|_idx| ()).ok_or(DiagCode(126))
    }

    fn set_scope(&self, process: Self::Process, addr: Addr) -> Result<(), DiagCode> {
        let () = self.record(Call::SetScope(addr));
        let () = self.check(Op::SetScope)?;
        let idx = self
            .scopes
            .iter()
            .position(|scope| scope.range.contains(&addr))
            .ok_or(DiagCode(487))?;

        let mut state = self.state.borrow_mut();
        if !state.bindings.contains_key(&process) {
            return Err(DiagCode(6))
        }
        let _prev = state.scopes.insert(process, idx);
        Ok(())
    }

    fn enum_symbols(
        &self,
        process: Self::Process,
        base: Addr,
        mask: Option<&str>,
        callback: &mut dyn FnMut(&SymbolInfo<'_>) -> ControlFlow<()>,
    ) -> Result<(), DiagCode> {
        let () = self.record(Call::Enum(base, mask.map(str::to_string)));
        let () = self.check(Op::EnumSymbols)?;

        let (syms, module_base) = {
            let state = self.state.borrow();
            if base == 0 {
                let idx = *state.scopes.get(&process).ok_or(DiagCode(6))?;
                (&self.scopes[idx].locals, 0)
            } else {
                let idx = *state
                    .bindings
                    .get(&process)
                    .and_then(|modules| modules.get(&base))
                    .ok_or(DiagCode(126))?;
                (&self.modules[idx].syms, base)
            }
        };

        for sym in syms {
            if callback(&sym.info(module_base)).is_break() {
                break
            }
        }
        Ok(())
    }

    fn line_from_addr(&self, _process: Self::Process, addr: Addr) -> Option<LineInfo> {
        self.lines.get(&addr).map(|(file, line)| LineInfo {
            file: file.clone(),
            line: *line,
        })
    }

    fn is_emulated_32(&self, _process: Self::Process) -> bool {
        self.emulated
    }
}
