use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::fs::File;
use std::io::Read as _;
use std::num::NonZeroU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;


/// An enumeration identifying a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pid {
    /// The current process.
    Slf,
    /// The process identified by the provided ID.
    Pid(NonZeroU32),
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Slf => write!(f, "self"),
            Self::Pid(pid) => write!(f, "{pid}"),
        }
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        NonZeroU32::new(pid).map(Pid::Pid).unwrap_or(Pid::Slf)
    }
}


/// Bit marking handles handed out by `open_current_process`.
const SELF_TAG: u64 = 1 << 63;


/// A handle referring to a process, as used by the ELF backend.
///
/// Handles created for a PID are stable: the same PID always maps to the
/// same handle and, hence, the same backend binding. Handles opened for
/// the calling process are unique, so that independently created
/// sessions never share a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    /// Create the handle for the process identified by `pid`.
    pub fn from_pid(pid: Pid) -> Self {
        match pid {
            Pid::Slf => Self(0),
            Pid::Pid(pid) => Self(u64::from(pid.get())),
        }
    }

    /// Create a new unique handle for the calling process.
    pub(crate) fn unique_self() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(SELF_TAG | id)
    }

    /// Retrieve the process this handle refers to.
    pub fn pid(&self) -> Pid {
        if self.0 & SELF_TAG != 0 {
            Pid::Slf
        } else {
            Pid::from(self.0 as u32)
        }
    }
}

impl Display for ProcessHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.0 & SELF_TAG != 0 {
            write!(f, "self#{}", self.0 & !SELF_TAG)
        } else {
            write!(f, "{}", self.pid())
        }
    }
}


/// `EM_386`
const EM_386: u16 = 3;
/// `ELFCLASS32`
const ELFCLASS32: u8 = 1;


/// Check whether the executable of the process identified by `pid` is a
/// 32 bit x86 program, running on a 64 bit host.
pub(crate) fn is_emulated_32(pid: Pid) -> bool {
    if !cfg!(target_pointer_width = "64") {
        return false
    }

    let path = format!("/proc/{pid}/exe");
    let mut header = [0u8; 20];
    let result = File::open(path).and_then(|mut file| file.read_exact(&mut header));
    if result.is_err() {
        return false
    }

    if &header[0..4] != b"\x7fELF" || header[4] != ELFCLASS32 {
        return false
    }

    let machine = match header[5] {
        // ELFDATA2MSB
        2 => u16::from_be_bytes([header[18], header[19]]),
        _ => u16::from_le_bytes([header[18], header[19]]),
    };
    machine == EM_386
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that handles for PIDs are stable while self handles are
    /// unique.
    #[test]
    fn handle_identity() {
        let pid = Pid::from(1234);
        assert_eq!(ProcessHandle::from_pid(pid), ProcessHandle::from_pid(pid));
        assert_eq!(ProcessHandle::from_pid(pid).pid(), pid);
        assert_eq!(ProcessHandle::from_pid(Pid::Slf).pid(), Pid::Slf);

        let h1 = ProcessHandle::unique_self();
        let h2 = ProcessHandle::unique_self();
        assert_ne!(h1, h2);
        assert_eq!(h1.pid(), Pid::Slf);
        assert_ne!(h1, ProcessHandle::from_pid(Pid::Slf));
        assert!(h1.to_string().starts_with("self#"));
    }

    /// Our own test binary is never an emulated 32 bit program.
    #[test]
    fn self_not_emulated() {
        assert!(!is_emulated_32(Pid::Slf));
    }
}
