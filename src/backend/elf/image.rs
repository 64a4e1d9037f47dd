use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;
#[cfg(feature = "dwarf")]
use std::sync::OnceLock;

use memmap2::Mmap;

use object::BinaryFormat;
use object::Object as _;
use object::ObjectSegment as _;
use object::SymbolKind;
use object::SymbolSection;

#[cfg(feature = "dwarf")]
use super::dwarf::DebugInfo;
use crate::backend::SymOptions;
use crate::backend::SymbolFlags;
use crate::log::debug;
#[cfg(feature = "dwarf")]
use crate::log::warn;
use crate::Addr;
use crate::SymTag;


fn invalid_image(path: &Path, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: {reason}", path.display()),
    )
}


/// A symbol as read from an ELF symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ElfSymbol {
    /// The raw (possibly mangled) name.
    pub name: Box<str>,
    /// The symbol's address, relative to the image's preferred base
    /// layout. For absolute symbols, its value.
    pub addr: Addr,
    pub size: u64,
    pub tag: SymTag,
    pub flags: SymbolFlags,
}

impl ElfSymbol {
    /// Check whether the symbol is an absolute one, i.e., one that is not
    /// subject to relocation.
    pub fn is_absolute(&self) -> bool {
        self.flags.contains(SymbolFlags::CONSTANT)
    }
}


fn convert_symbol<'data, S>(sym: &S) -> Option<ElfSymbol>
where
    S: object::ObjectSymbol<'data>,
{
    if sym.is_undefined() {
        return None
    }

    let (tag, mut flags) = match sym.kind() {
        SymbolKind::Text => (SymTag::FUNCTION, SymbolFlags::FUNCTION),
        SymbolKind::Data => (SymTag::DATA, SymbolFlags::empty()),
        SymbolKind::Tls => (SymTag::DATA, SymbolFlags::TLSREL),
        SymbolKind::Label => (SymTag::LABEL, SymbolFlags::empty()),
        SymbolKind::Unknown => (SymTag::PUBLIC_SYMBOL, SymbolFlags::empty()),
        // Section and file symbols, and whatever else may come.
        _ => return None,
    };

    let name = sym.name().ok().filter(|name| !name.is_empty())?;
    if sym.section() == SymbolSection::Absolute {
        flags |= SymbolFlags::CONSTANT | SymbolFlags::VALUEPRESENT;
    }
    if sym.is_global() {
        flags |= SymbolFlags::EXPORT;
    }

    let sym = ElfSymbol {
        name: Box::from(name),
        addr: sym.address(),
        size: sym.size(),
        tag,
        flags,
    };
    Some(sym)
}


/// Present `name` the way it would appear in source code, if it is a
/// mangled Rust or C++ name.
#[cfg(feature = "demangle")]
pub(crate) fn demangle(name: &str) -> Cow<'_, str> {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return Cow::Owned(format!("{demangled:#}"))
    }

    if name.starts_with("_Z") {
        let demangled = cpp_demangle::Symbol::new(name)
            .ok()
            .and_then(|sym| sym.demangle(&cpp_demangle::DemangleOptions::default()).ok());
        if let Some(demangled) = demangled {
            return Cow::Owned(demangled)
        }
    }
    Cow::Borrowed(name)
}

#[cfg(not(feature = "demangle"))]
pub(crate) fn demangle(name: &str) -> Cow<'_, str> {
    Cow::Borrowed(name)
}


/// A memory mapped ELF image along with the information extracted from
/// it.
#[derive(Debug)]
pub(crate) struct Image {
    path: PathBuf,
    mmap: Mmap,
    /// The address the image's file offset zero is mapped at, absent
    /// relocation.
    preferred_base: Addr,
    size: u64,
    symbols: Box<[ElfSymbol]>,
    has_line_section: bool,
    #[cfg(feature = "dwarf")]
    debug_info: OnceLock<Option<DebugInfo>>,
}

impl Image {
    /// Open and parse the ELF file at `path`.
    pub fn open(path: &Path, options: SymOptions) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(invalid_image(path, "file is empty"))
        }

        // SAFETY: We never hand out the mapping mutably and treat it as
        //         untrusted input. Concurrent truncation of the file is
        //         outside of our control.
        let mmap = unsafe { Mmap::map(&file) }?;
        let elf = object::File::parse(&*mmap)
            .map_err(|err| invalid_image(path, &format!("failed to parse object: {err}")))?;
        if elf.format() != BinaryFormat::Elf {
            return Err(invalid_image(path, "not an ELF file"))
        }
        if cfg!(target_pointer_width = "64")
            && !elf.is_64()
            && !options.contains(SymOptions::INCLUDE_32BIT_MODULES)
        {
            return Err(invalid_image(path, "32 bit modules are excluded"))
        }

        let mut preferred_base = None::<(Addr, u64)>;
        let mut end = 0;
        for segment in elf.segments() {
            let addr = segment.address();
            let (offset, _size) = segment.file_range();
            if preferred_base.map(|(lowest, _)| addr < lowest).unwrap_or(true) {
                preferred_base = Some((addr, offset));
            }
            end = end.max(addr.saturating_add(segment.size()));
        }
        let preferred_base = preferred_base
            .map(|(addr, offset)| addr.saturating_sub(offset))
            .unwrap_or(0);
        let size = end.saturating_sub(preferred_base);

        let symbols = if elf.symbol_table().is_some() {
            elf.symbols().filter_map(|sym| convert_symbol(&sym)).collect()
        } else {
            elf.dynamic_symbols()
                .filter_map(|sym| convert_symbol(&sym))
                .collect::<Vec<_>>()
        };
        let has_line_section = elf.section_by_name(".debug_line").is_some();

        debug!(
            "opened {}: {} symbols, preferred base {preferred_base:#x}, size {size:#x}",
            path.display(),
            symbols.len()
        );

        let slf = Self {
            path: path.to_path_buf(),
            mmap,
            preferred_base,
            size,
            symbols: symbols.into_boxed_slice(),
            has_line_section,
            #[cfg(feature = "dwarf")]
            debug_info: OnceLock::new(),
        };
        Ok(slf)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferred_base(&self) -> Addr {
        self.preferred_base
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn symbols(&self) -> &[ElfSymbol] {
        &self.symbols
    }

    /// Check whether the image carries a line number table.
    pub fn has_line_section(&self) -> bool {
        self.has_line_section
    }

    /// Retrieve the image's DWARF debug information, parsing it on first
    /// access.
    #[cfg(feature = "dwarf")]
    pub fn debug_info(&self) -> Option<&DebugInfo> {
        self.debug_info
            .get_or_init(|| {
                let result = object::File::parse(&*self.mmap)
                    .map_err(|err| err.to_string())
                    .and_then(|elf| DebugInfo::parse(&elf).map_err(|err| err.to_string()));
                match result {
                    Ok(info) => Some(info),
                    Err(err) => {
                        warn!(
                            "failed to parse debug information of {}: {err}",
                            self.path.display()
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}
