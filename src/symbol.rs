//! The records produced by symbol enumeration.

use crate::backend::LineInfo;
use crate::backend::SymbolFlags;
use crate::backend::SymbolInfo;
use crate::register;
use crate::register::RegisterSnapshot;
use crate::Addr;
use crate::SymTag;


/// The file name reported for symbols without a line mapping.
pub const UNKNOWN_FILE: &str = "Unknown";
/// The name reported for symbols the backend did not name.
pub const UNNAMED: &str = "<unnamed>";


fn name_of(info: &SymbolInfo<'_>) -> String {
    info.name.unwrap_or(UNNAMED).to_string()
}

fn location_of(line: Option<LineInfo>) -> (String, u32) {
    match line {
        Some(LineInfo { file, line }) => (file, line),
        None => (UNKNOWN_FILE.to_string(), 0),
    }
}


/// A named symbol found in a loaded module's debug information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSymbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's size, in bytes.
    pub size: u64,
    /// The symbol's runtime address.
    ///
    /// Only meaningful for code and data symbols.
    pub addr: Addr,
    /// The symbol's classification.
    pub tag: SymTag,
    /// The symbol's resolved value, used for non-address symbols such as
    /// constants.
    pub value: u64,
    /// The source file declaring the symbol, or [`UNKNOWN_FILE`].
    pub file: String,
    /// The source line declaring the symbol, or `0`.
    pub line: u32,
}

impl ModuleSymbol {
    /// Create a record from a backend symbol descriptor and the result
    /// of a best effort line lookup for it.
    pub fn from_info(info: &SymbolInfo<'_>, line: Option<LineInfo>) -> Self {
        let (file, line) = location_of(line);
        Self {
            name: name_of(info),
            size: info.size,
            addr: info.addr,
            tag: SymTag(info.tag),
            value: info.value,
            file,
            line,
        }
    }
}


/// The storage of a local symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// The symbol lives at a fixed address.
    Static,
    /// The symbol lives in memory at a fixed offset from a register's
    /// value.
    RegisterRelative {
        /// The CodeView id of the base register.
        register: u32,
        /// The offset from the register's value.
        offset: i64,
    },
    /// The symbol's value lives entirely in a register.
    Register {
        /// The CodeView id of the register.
        register: u32,
    },
}

impl Storage {
    /// Classify the storage described by a backend symbol descriptor.
    ///
    /// Register relative storage takes precedence over register
    /// residency if a descriptor claims both.
    pub fn from_info(info: &SymbolInfo<'_>) -> Self {
        if info.flags.contains(SymbolFlags::REGREL) {
            Self::RegisterRelative {
                register: info.register,
                offset: info.addr as i64,
            }
        } else if info.flags.contains(SymbolFlags::REGISTER) {
            Self::Register {
                register: info.register,
            }
        } else {
            Self::Static
        }
    }

    /// Compute the effective address of a symbol with this storage.
    ///
    /// The second tuple member reports whether the register the storage
    /// depends on could be resolved. If it could not, the register's
    /// value is taken to be `0`.
    pub fn effective_addr(&self, addr: Addr, snapshot: &RegisterSnapshot) -> (Addr, bool) {
        match self {
            Self::Static => (addr, true),
            Self::RegisterRelative { register, offset } => {
                let value = register::try_resolve(*register, snapshot);
                let base = value.unwrap_or(0);
                (base.wrapping_add(*offset) as Addr, value.is_some())
            }
            Self::Register { register } => {
                let value = register::try_resolve(*register, snapshot);
                (value.unwrap_or(0) as Addr, value.is_some())
            }
        }
    }
}


/// A variable or parameter visible in a function activation's lexical
/// scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSymbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's size, in bytes.
    pub size: u64,
    /// The symbol's effective runtime address, already resolved against
    /// the register snapshot.
    ///
    /// For register resident symbols this is the register's value.
    pub addr: Addr,
    /// The symbol's classification.
    pub tag: SymTag,
    /// The symbol's resolved value.
    pub value: u64,
    /// The source file declaring the symbol, or [`UNKNOWN_FILE`].
    pub file: String,
    /// The source line declaring the symbol, or `0`.
    pub line: u32,
    /// The CodeView id of the register the symbol's storage depends on.
    ///
    /// Only meaningful for register relative and register resident
    /// storage.
    pub register: u32,
    /// The symbol's storage.
    pub storage: Storage,
    /// Whether the register the storage depends on was resolved.
    ///
    /// Always `true` for static storage.
    pub resolved: bool,
}

impl LocalSymbol {
    /// Create a record from a backend symbol descriptor, the result of a
    /// line lookup for it, and the register snapshot of the activation.
    pub fn from_info(
        info: &SymbolInfo<'_>,
        line: Option<LineInfo>,
        snapshot: &RegisterSnapshot,
    ) -> Self {
        let storage = Storage::from_info(info);
        let (addr, resolved) = storage.effective_addr(info.addr, snapshot);
        let (file, line) = location_of(line);

        Self {
            name: name_of(info),
            size: info.size,
            addr,
            tag: SymTag(info.tag),
            value: info.value,
            file,
            line,
            register: info.register,
            storage,
            resolved,
        }
    }
}
