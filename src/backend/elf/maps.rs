use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Result;
use std::ops::Range;
use std::path::Component;
use std::path::PathBuf;

use super::process::Pid;
use crate::Addr;


#[derive(Debug)]
pub(crate) struct MapsEntry {
    /// The virtual address range covered by this entry.
    pub range: Range<Addr>,
    pub mode: u8,
    pub offset: u64,
    pub path: PathBuf,
}

impl MapsEntry {
    /// Check whether the mapping is readable and executable.
    fn is_executable(&self) -> bool {
        (self.mode & 0b1010) == 0b1010
    }

    /// Check whether the mapping is backed by a file system path.
    fn is_file_backed(&self) -> bool {
        self.path.as_path().components().next() == Some(Component::RootDir)
    }
}


/// Parse a line of a proc maps file.
fn parse_maps_line<'line>(line: &'line str, pid: Pid) -> Result<MapsEntry> {
    let full_line = line;

    let split_once = |line: &'line str, component| -> Result<(&'line str, &'line str)> {
        line.split_once(|c: char| c.is_ascii_whitespace())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("failed to find {component} in proc maps line: {line}\n{full_line}"),
                )
            })
    };
    let parse_hex = |s: &str, component: &str| {
        u64::from_str_radix(s, 16).map_err(|err| {
            Error::new(
                ErrorKind::InvalidData,
                format!("encountered malformed {component} in proc maps line: {full_line}: {err}"),
            )
        })
    };

    // Lines have the following format:
    // address           perms offset  dev   inode      pathname
    // 08048000-08049000 r-xp 00000000 03:00 8312       /opt/test
    // 0804a000-0806b000 rw-p 00000000 00:00 0          [heap]
    let (address_str, line) = split_once(line, "address range")?;
    let (start_str, end_str) = address_str.split_once('-').ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidData,
            format!("encountered malformed address range in proc maps line: {full_line}"),
        )
    })?;
    let start = parse_hex(start_str, "start address")?;
    let end = parse_hex(end_str, "end address")?;

    let (mode_str, line) = split_once(line, "permissions component")?;
    let mode = mode_str
        .chars()
        .fold(0, |mode, c| (mode << 1) | u8::from(c != '-'));

    let (offset_str, line) = split_once(line, "offset component")?;
    let offset = parse_hex(offset_str, "offset component")?;

    let (_dev, line) = split_once(line, "device component")?;
    // Anonymous mappings have no path.
    let path_str = split_once(line, "inode component")
        .map(|(_inode, line)| line.trim())
        .unwrap_or("");
    let path = if path_str.ends_with(" (deleted)") {
        PathBuf::from(format!("/proc/{pid}/map_files/{address_str}"))
    } else {
        PathBuf::from(path_str)
    };

    let entry = MapsEntry {
        range: (start..end),
        mode,
        offset,
        path,
    };
    Ok(entry)
}


/// Parse a proc maps file from the provided reader.
fn parse_file<R>(reader: R, pid: Pid) -> impl Iterator<Item = Result<MapsEntry>>
where
    R: Read,
{
    BufReader::new(reader).lines().filter_map(move |line| {
        let line = match line {
            Ok(line) => line,
            Err(err) => return Some(Err(err)),
        };
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(parse_maps_line(line, pid))
        }
    })
}

/// Parse the maps file for the process with the given PID.
fn parse(pid: Pid) -> Result<impl Iterator<Item = Result<MapsEntry>>> {
    let path = format!("/proc/{pid}/maps");
    let file = File::open(path)?;
    let iter = parse_file(file, pid);
    Ok(iter)
}


/// Determine the load address of every file with an executable mapping
/// in the given list of entries.
///
/// The load address of a file is the address at which its file offset
/// zero is mapped, as derived from the file's lowest offset mapping.
fn module_bases<I>(entries: I) -> Result<Vec<(PathBuf, Addr)>>
where
    I: IntoIterator<Item = Result<MapsEntry>>,
{
    // Path -> (executable?, lowest offset, start of that mapping)
    let mut files = BTreeMap::<PathBuf, (bool, u64, Addr)>::new();

    for entry in entries {
        let entry = entry?;
        if !entry.is_file_backed() {
            continue
        }

        let executable = entry.is_executable();
        let (exec, offset, start) = files
            .entry(entry.path)
            .or_insert((false, u64::MAX, 0));
        *exec |= executable;
        if entry.offset < *offset {
            *offset = entry.offset;
            *start = entry.range.start;
        }
    }

    let bases = files
        .into_iter()
        .filter(|(_path, (exec, _offset, _start))| *exec)
        .map(|(path, (_exec, offset, start))| (path, start.wrapping_sub(offset)))
        .collect();
    Ok(bases)
}

/// Determine the load address of every file with an executable mapping
/// in the process identified by `pid`.
pub(crate) fn loaded_modules(pid: Pid) -> Result<Vec<(PathBuf, Addr)>> {
    module_bases(parse(pid)?)
}
