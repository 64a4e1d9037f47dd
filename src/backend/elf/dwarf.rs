//! Extraction of line tables and function local variables from DWARF
//! debug information.
//!
//! Everything is converted into owned data structures up front, so that
//! the result can be cached alongside the memory mapped image it was
//! parsed from.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::mem;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use gimli::AttributeValue;
use gimli::DebuggingInformationEntry;
use gimli::EndianSlice;
use gimli::EntriesTreeNode;
use gimli::Operation;
use gimli::RunTimeEndian;
use gimli::SectionId;
use gimli::UnitOffset;
use gimli::UnitRef;

use object::elf::SHF_EXECINSTR;
use object::Architecture;
use object::Object as _;
use object::ObjectSection as _;
use object::SectionFlags;

use crate::log::debug;
use crate::log::warn;
use crate::Addr;


/// The gimli reader type we use.
pub(crate) type R<'dat> = EndianSlice<'dat, RunTimeEndian>;

/// The maximum number of references we follow when looking up attributes
/// through `DW_AT_abstract_origin`, `DW_AT_specification`, or type
/// chains.
const MAX_DEPTH: usize = 16;


/// Map a DWARF register number onto a CodeView register id.
///
/// Returns `0` for registers without CodeView counterpart.
pub(crate) fn codeview_register(arch: Architecture, reg: u16) -> u32 {
    match arch {
        Architecture::X86_64 => match reg {
            // rax, rdx, rcx, rbx, rsi, rdi, rbp, rsp
            0 => 328,
            1 => 331,
            2 => 330,
            3 => 329,
            4 => 332,
            5 => 333,
            6 => 334,
            7 => 335,
            // r8 through r15
            8..=15 => 336 + u32::from(reg - 8),
            _ => 0,
        },
        // eax, ecx, edx, ebx, esp, ebp, esi, edi
        Architecture::I386 => match reg {
            0..=7 => 17 + u32::from(reg),
            _ => 0,
        },
        _ => 0,
    }
}


/// The location of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarLocation {
    /// At `offset` from the value of the register with the given
    /// CodeView id.
    RegisterRelative { register: u32, offset: i64 },
    /// In the register with the given CodeView id.
    Register(u32),
    /// At a fixed address, relative to the image's preferred base.
    Static(Addr),
    /// Anywhere else, e.g., described by a location list.
    Unknown,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarKind {
    Parameter,
    Local,
}


#[derive(Debug)]
pub(crate) struct Variable {
    pub name: Option<Box<str>>,
    pub kind: VarKind,
    pub location: VarLocation,
    pub size: u64,
    /// The address ranges of the lexical block declaring the variable,
    /// if it is not declared at function level.
    pub scope: Option<Box<[Range<Addr>]>>,
}

impl Variable {
    /// Check whether the variable is visible at `pc`.
    pub fn is_visible_at(&self, pc: Addr) -> bool {
        match &self.scope {
            None => true,
            Some(ranges) => ranges.iter().any(|range| range.contains(&pc)),
        }
    }
}


#[derive(Debug)]
pub(crate) struct Function {
    pub name: Option<Box<str>>,
    pub ranges: Box<[Range<Addr>]>,
    pub vars: Box<[Variable]>,
}

impl Function {
    fn contains(&self, pc: Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(&pc))
    }
}


/// The location a function's frame base refers to.
#[derive(Clone, Copy, Debug)]
enum FrameBase {
    Register(u16),
    RegisterOffset(u16, i64),
    Cfa,
    Unknown,
}


#[derive(Debug)]
struct LineRow {
    address: Addr,
    file: usize,
    line: u32,
}

#[derive(Debug)]
struct LineSequence {
    start: Addr,
    end: Addr,
    rows: Box<[LineRow]>,
}


/// A source location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Location<'info> {
    pub file: &'info str,
    pub line: u32,
}


/// The debug information of an image.
#[derive(Debug)]
pub(crate) struct DebugInfo {
    /// The source files referenced by any line table row.
    files: Box<[Box<str>]>,
    /// All line sequences, ordered by start address.
    sequences: Box<[LineSequence]>,
    /// All functions with code.
    functions: Box<[Function]>,
}

impl DebugInfo {
    /// Parse the DWARF debug information contained in `file`.
    pub fn parse(file: &object::File<'_>) -> gimli::Result<Self> {
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let load_section = |id: SectionId| {
            let data = file
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(Cow::Borrowed(&[]));
            Ok::<_, gimli::Error>(data)
        };
        let sections = gimli::DwarfSections::load(load_section)?;
        let dwarf = sections.borrow(|section| EndianSlice::new(&**section, endian));

        let mut parser = Parser {
            arch: file.architecture(),
            text: text_ranges(file),
            files: Vec::new(),
            file_ids: HashMap::new(),
            sequences: Vec::new(),
            functions: Vec::new(),
        };

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            match header.type_() {
                gimli::UnitType::Type { .. } | gimli::UnitType::SplitType { .. } => continue,
                _ => (),
            }
            let unit = dwarf.unit(header)?;
            let unit = unit.unit_ref(&dwarf);
            // A single broken unit should not cost us everything else.
            if let Err(err) = parser.parse_unit(unit) {
                warn!("failed to parse DWARF unit: {err}");
            }
        }

        let Parser {
            files,
            mut sequences,
            functions,
            ..
        } = parser;
        let () = sequences.sort_by_key(|sequence| sequence.start);

        debug!(
            "parsed {} line sequences and {} functions",
            sequences.len(),
            functions.len()
        );

        Ok(Self {
            files: files.into_boxed_slice(),
            sequences: sequences.into_boxed_slice(),
            functions: functions.into_boxed_slice(),
        })
    }

    /// Look up the source location of `addr`.
    pub fn find_location(&self, addr: Addr) -> Option<Location<'_>> {
        let idx = self
            .sequences
            .binary_search_by(|sequence| {
                if addr < sequence.start {
                    Ordering::Greater
                } else if addr >= sequence.end {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()?;
        let sequence = &self.sequences[idx];

        let idx = match sequence.rows.binary_search_by(|row| row.address.cmp(&addr)) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let row = &sequence.rows[idx];
        let file = self.files.get(row.file)?;
        Some(Location { file, line: row.line })
    }

    /// Find the function whose code covers `addr`.
    pub fn find_function(&self, addr: Addr) -> Option<&Function> {
        self.functions.iter().find(|function| function.contains(addr))
    }

    /// Check whether any line information is present.
    pub fn has_lines(&self) -> bool {
        !self.sequences.is_empty()
    }
}


struct Parser {
    arch: Architecture,
    /// The address ranges of the image's executable sections.
    text: Vec<Range<Addr>>,
    files: Vec<Box<str>>,
    file_ids: HashMap<Box<str>, usize>,
    sequences: Vec<LineSequence>,
    functions: Vec<Function>,
}

impl Parser {
    fn parse_unit<'dwarf>(&mut self, unit: UnitRef<'_, R<'dwarf>>) -> gimli::Result<()> {
        if let Some(program) = unit.line_program.clone() {
            let () = self.parse_lines(unit, program)?;
        }

        let mut tree = unit.entries_tree(None)?;
        let root = tree.root()?;
        self.parse_children(unit, root)
    }

    fn parse_lines<'dwarf>(
        &mut self,
        unit: UnitRef<'_, R<'dwarf>>,
        program: gimli::IncompleteLineProgram<R<'dwarf>>,
    ) -> gimli::Result<()> {
        // Unit local file index -> index into `self.files`.
        let mut file_map = HashMap::<u64, usize>::new();
        let mut sequence_rows = Vec::<LineRow>::new();
        let mut rows = program.rows();

        while let Some((header, row)) = rows.next_row()? {
            if row.end_sequence() {
                if let Some(start) = sequence_rows.first().map(|row| row.address) {
                    let rows = mem::take(&mut sequence_rows);
                    let () = self.sequences.push(LineSequence {
                        start,
                        end: row.address(),
                        rows: rows.into_boxed_slice(),
                    });
                }
                continue
            }

            let file_index = row.file_index();
            let file = match file_map.get(&file_index) {
                Some(file) => *file,
                None => {
                    let path = match header.file(file_index) {
                        Some(entry) => render_file(unit, entry, header)?,
                        None => PathBuf::new(),
                    };
                    let file = self.intern_file(&path);
                    let _prev = file_map.insert(file_index, file);
                    file
                }
            };
            let line = row
                .line()
                .map(|line| u32::try_from(line.get()).unwrap_or(u32::MAX))
                .unwrap_or(0);
            let address = row.address();

            if let Some(last) = sequence_rows.last_mut() {
                if last.address == address {
                    last.file = file;
                    last.line = line;
                    continue
                }
            }

            let () = sequence_rows.push(LineRow {
                address,
                file,
                line,
            });
        }
        Ok(())
    }

    fn intern_file(&mut self, path: &Path) -> usize {
        let path = path.to_string_lossy();
        if let Some(id) = self.file_ids.get(&*path) {
            return *id
        }

        let id = self.files.len();
        let path = Box::<str>::from(path);
        let () = self.files.push(path.clone());
        let _prev = self.file_ids.insert(path, id);
        id
    }

    fn parse_children<'dwarf>(
        &mut self,
        unit: UnitRef<'_, R<'dwarf>>,
        node: EntriesTreeNode<'_, '_, '_, R<'dwarf>>,
    ) -> gimli::Result<()> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            if child.entry().tag() == gimli::DW_TAG_subprogram {
                let () = self.parse_function(unit, child)?;
            } else {
                let () = self.parse_children(unit, child)?;
            }
        }
        Ok(())
    }

    fn parse_function<'dwarf>(
        &mut self,
        unit: UnitRef<'_, R<'dwarf>>,
        node: EntriesTreeNode<'_, '_, '_, R<'dwarf>>,
    ) -> gimli::Result<()> {
        let entry = node.entry();
        let mut ranges = collect_ranges(unit, entry)?;
        // Functions discarded by the linker keep their debug information
        // but have their addresses zeroed out.
        let () = ranges.retain(|range| self.is_text(range.start));
        if ranges.is_empty() {
            // A declaration or an abstract instance. Either way there is no
            // code to scope variables to, but nested definitions may still
            // exist.
            return self.parse_children(unit, node)
        }

        let name = entry_name(unit, entry, MAX_DEPTH)?;
        let frame_base = match entry.attr_value(gimli::DW_AT_frame_base)? {
            Some(AttributeValue::Exprloc(expr)) => {
                let mut ops = expr.operations(unit.encoding());
                match ops.next()? {
                    Some(Operation::Register { register }) => FrameBase::Register(register.0),
                    Some(Operation::RegisterOffset {
                        register, offset, ..
                    }) => FrameBase::RegisterOffset(register.0, offset),
                    Some(Operation::CallFrameCFA) => FrameBase::Cfa,
                    _ => FrameBase::Unknown,
                }
            }
            _ => FrameBase::Unknown,
        };

        let mut vars = Vec::new();
        let () = self.parse_scope(unit, node, frame_base, None, &mut vars)?;

        let () = self.functions.push(Function {
            name,
            ranges: ranges.into_boxed_slice(),
            vars: vars.into_boxed_slice(),
        });
        Ok(())
    }

    fn parse_scope<'dwarf>(
        &mut self,
        unit: UnitRef<'_, R<'dwarf>>,
        node: EntriesTreeNode<'_, '_, '_, R<'dwarf>>,
        frame_base: FrameBase,
        scope: Option<&[Range<Addr>]>,
        vars: &mut Vec<Variable>,
    ) -> gimli::Result<()> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            match entry.tag() {
                gimli::DW_TAG_formal_parameter | gimli::DW_TAG_variable => {
                    let kind = if entry.tag() == gimli::DW_TAG_formal_parameter {
                        VarKind::Parameter
                    } else {
                        VarKind::Local
                    };
                    let var = Variable {
                        name: entry_name(unit, entry, MAX_DEPTH)?,
                        kind,
                        location: self.var_location(unit, entry, frame_base)?,
                        size: var_size(unit, entry)?,
                        scope: scope.map(Box::from),
                    };
                    let () = vars.push(var);
                }
                gimli::DW_TAG_lexical_block => {
                    let ranges = collect_ranges(unit, entry)?;
                    let scope = if ranges.is_empty() {
                        scope.map(<[_]>::to_vec)
                    } else {
                        Some(ranges)
                    };
                    let () =
                        self.parse_scope(unit, child, frame_base, scope.as_deref(), vars)?;
                }
                gimli::DW_TAG_subprogram => {
                    let () = self.parse_function(unit, child)?;
                }
                // Variables of inlined callees belong to those.
                _ => (),
            }
        }
        Ok(())
    }

    fn var_location<'dwarf>(
        &self,
        unit: UnitRef<'_, R<'dwarf>>,
        entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
        frame_base: FrameBase,
    ) -> gimli::Result<VarLocation> {
        let expr = match entry.attr_value(gimli::DW_AT_location)? {
            Some(AttributeValue::Exprloc(expr)) => expr,
            // Location lists and missing locations.
            _ => return Ok(VarLocation::Unknown),
        };

        let mut ops = expr.operations(unit.encoding());
        let location = match ops.next()? {
            Some(Operation::FrameOffset { offset }) => self.frame_relative(frame_base, offset),
            Some(Operation::RegisterOffset {
                register, offset, ..
            }) => self.register_relative(register.0, offset),
            Some(Operation::Register { register }) => {
                match codeview_register(self.arch, register.0) {
                    0 => VarLocation::Unknown,
                    register => VarLocation::Register(register),
                }
            }
            Some(Operation::Address { address }) => VarLocation::Static(address),
            Some(Operation::AddressIndex { index }) => VarLocation::Static(unit.address(index)?),
            _ => VarLocation::Unknown,
        };

        // Anything beyond a single operation computes a value we cannot
        // express.
        if ops.next()?.is_some() {
            return Ok(VarLocation::Unknown)
        }
        Ok(location)
    }

    fn is_text(&self, addr: Addr) -> bool {
        if self.text.is_empty() {
            return addr != 0
        }
        self.text.iter().any(|range| range.contains(&addr))
    }

    fn register_relative(&self, reg: u16, offset: i64) -> VarLocation {
        match codeview_register(self.arch, reg) {
            0 => VarLocation::Unknown,
            register => VarLocation::RegisterRelative { register, offset },
        }
    }

    fn frame_relative(&self, frame_base: FrameBase, offset: i64) -> VarLocation {
        match frame_base {
            FrameBase::Register(reg) => self.register_relative(reg, offset),
            FrameBase::RegisterOffset(reg, base) => {
                self.register_relative(reg, base.wrapping_add(offset))
            }
            // We do not evaluate call frame information. With frame
            // pointers the CFA sits right above the saved frame pointer and
            // return address.
            FrameBase::Cfa => match self.arch {
                Architecture::X86_64 => self.register_relative(6, offset.wrapping_add(16)),
                Architecture::I386 => self.register_relative(5, offset.wrapping_add(8)),
                _ => VarLocation::Unknown,
            },
            FrameBase::Unknown => VarLocation::Unknown,
        }
    }
}


fn render_file<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    file: &gimli::FileEntry<R<'dwarf>>,
    header: &gimli::LineProgramHeader<R<'dwarf>>,
) -> gimli::Result<PathBuf> {
    let mut path = match unit.comp_dir {
        Some(ref comp_dir) => PathBuf::from(&*comp_dir.to_string_lossy()),
        None => PathBuf::new(),
    };

    // The directory index 0 is defined to correspond to the compilation
    // unit directory.
    if file.directory_index() != 0 {
        if let Some(directory) = file.directory(header) {
            let dir = unit.attr_string(directory)?;
            let () = path.push(&*dir.to_string_lossy());
        }
    }

    let name = unit.attr_string(file.path_name())?;
    let () = path.push(&*name.to_string_lossy());
    Ok(path)
}


/// Gather the address ranges of all executable sections of `file`.
///
/// Separate debug files describe their code sections as `SHT_NOBITS`
/// but keep addresses and flags intact, so they are covered as well.
fn text_ranges(file: &object::File<'_>) -> Vec<Range<Addr>> {
    file.sections()
        .filter(|section| match section.flags() {
            SectionFlags::Elf { sh_flags } => sh_flags & u64::from(SHF_EXECINSTR) != 0,
            _ => false,
        })
        .filter(|section| section.size() > 0)
        .map(|section| section.address()..section.address().saturating_add(section.size()))
        .collect()
}


fn collect_ranges<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
) -> gimli::Result<Vec<Range<Addr>>> {
    let mut ranges = Vec::new();
    let mut iter = unit.die_ranges(entry)?;
    while let Some(range) = iter.next()? {
        if range.begin < range.end {
            let () = ranges.push(range.begin..range.end);
        }
    }
    Ok(ranges)
}


/// Look up attribute `name` on `entry`, falling back to the entry it
/// refers to via `DW_AT_abstract_origin` or `DW_AT_specification`.
fn attr_with_origin<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
    name: gimli::DwAt,
    depth: usize,
) -> gimli::Result<Option<AttributeValue<R<'dwarf>>>> {
    if let Some(value) = entry.attr_value(name)? {
        return Ok(Some(value))
    }
    if depth == 0 {
        return Ok(None)
    }

    for origin in [gimli::DW_AT_abstract_origin, gimli::DW_AT_specification] {
        // References into other units are not followed.
        if let Some(AttributeValue::UnitRef(offset)) = entry.attr_value(origin)? {
            let origin = unit.entry(offset)?;
            return attr_with_origin(unit, &origin, name, depth - 1)
        }
    }
    Ok(None)
}


fn entry_name<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
    depth: usize,
) -> gimli::Result<Option<Box<str>>> {
    match attr_with_origin(unit, entry, gimli::DW_AT_name, depth)? {
        Some(value) => {
            let name = unit.attr_string(value)?;
            Ok(Some(Box::from(&*name.to_string_lossy())))
        }
        None => Ok(None),
    }
}


fn var_size<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
) -> gimli::Result<u64> {
    match attr_with_origin(unit, entry, gimli::DW_AT_type, MAX_DEPTH)? {
        Some(AttributeValue::UnitRef(offset)) => type_size(unit, offset, MAX_DEPTH),
        _ => Ok(0),
    }
}


/// Determine the size of the type at `offset`, in bytes.
fn type_size<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    offset: UnitOffset,
    depth: usize,
) -> gimli::Result<u64> {
    if depth == 0 {
        return Ok(0)
    }

    let entry = unit.entry(offset)?;
    if let Some(size) = entry
        .attr_value(gimli::DW_AT_byte_size)?
        .and_then(|value| value.udata_value())
    {
        return Ok(size)
    }

    match entry.tag() {
        gimli::DW_TAG_pointer_type
        | gimli::DW_TAG_reference_type
        | gimli::DW_TAG_rvalue_reference_type
        | gimli::DW_TAG_ptr_to_member_type => Ok(u64::from(unit.encoding().address_size)),
        gimli::DW_TAG_typedef
        | gimli::DW_TAG_const_type
        | gimli::DW_TAG_volatile_type
        | gimli::DW_TAG_restrict_type
        | gimli::DW_TAG_atomic_type => match entry.attr_value(gimli::DW_AT_type)? {
            Some(AttributeValue::UnitRef(offset)) => type_size(unit, offset, depth - 1),
            _ => Ok(0),
        },
        gimli::DW_TAG_array_type => {
            let element = match entry.attr_value(gimli::DW_AT_type)? {
                Some(AttributeValue::UnitRef(offset)) => type_size(unit, offset, depth - 1)?,
                _ => return Ok(0),
            };
            let count = array_count(unit, &entry)?;
            Ok(element.saturating_mul(count))
        }
        _ => Ok(0),
    }
}

/// Determine the total number of elements of an array type.
fn array_count<'dwarf>(
    unit: UnitRef<'_, R<'dwarf>>,
    entry: &DebuggingInformationEntry<'_, '_, R<'dwarf>>,
) -> gimli::Result<u64> {
    let mut tree = unit.entries_tree(Some(entry.offset()))?;
    let root = tree.root()?;
    let mut children = root.children();
    let mut total = 1u64;
    let mut any = false;

    while let Some(child) = children.next()? {
        let entry = child.entry();
        if entry.tag() != gimli::DW_TAG_subrange_type {
            continue
        }

        let count = if let Some(count) = entry
            .attr_value(gimli::DW_AT_count)?
            .and_then(|value| value.udata_value())
        {
            count
        } else if let Some(upper) = entry
            .attr_value(gimli::DW_AT_upper_bound)?
            .and_then(|value| value.udata_value())
        {
            let lower = entry
                .attr_value(gimli::DW_AT_lower_bound)?
                .and_then(|value| value.udata_value())
                .unwrap_or(0);
            bounded_count(lower, upper)
        } else {
            0
        };
        total = total.saturating_mul(count);
        any = true;
    }
    Ok(if any { total } else { 0 })
}

/// The number of elements of a subrange with inclusive bounds.
fn bounded_count(lower: u64, upper: u64) -> u64 {
    upper.saturating_add(1).saturating_sub(lower)
}
