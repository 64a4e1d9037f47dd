//! Register snapshots and the resolution of CodeView register ids
//! against them.
//!
//! Debug information describes register based storage in terms of
//! CodeView register ids. 32 bit registers and 64 bit registers live in
//! two disjoint id ranges and a captured snapshot is tagged with the
//! layout it was captured in, so that one layout can never be
//! reinterpreted as the other.

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;


/// The layout in which a thread's register state was captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextMode {
    /// A native 64 bit (x86-64) context.
    Native64,
    /// A 32 bit (x86) context of a program running under 32-bit-on-64-bit
    /// emulation.
    Emulated32,
}

impl Display for ContextMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Native64 => f.write_str("native 64 bit"),
            Self::Emulated32 => f.write_str("emulated 32 bit"),
        }
    }
}


macro_rules! registers {
    ($($(#[$docs:meta])* $name:ident = $id:literal, $str:literal, $mode:ident;)*) => {
        /// A general purpose register addressable through a CodeView
        /// register id.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Register {
            $(
                $(#[$docs])*
                $name,
            )*
        }

        impl Register {
            /// Every known register.
            pub const ALL: &'static [Register] = &[$(Register::$name,)*];

            /// Retrieve the CodeView id of the register.
            pub fn id(&self) -> u32 {
                match self {
                    $(Self::$name => $id,)*
                }
            }

            /// Retrieve the lower case name of the register.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => $str,)*
                }
            }

            /// Retrieve the context layout that this register belongs to.
            pub fn mode(&self) -> ContextMode {
                match self {
                    $(Self::$name => ContextMode::$mode,)*
                }
            }

            /// Look up the register with the given CodeView id in the
            /// table for `mode`.
            ///
            /// Ids belonging to the other table are not found.
            pub fn from_id(id: u32, mode: ContextMode) -> Option<Register> {
                let reg = match id {
                    $($id => Self::$name,)*
                    _ => return None,
                };

                if reg.mode() == mode {
                    Some(reg)
                } else {
                    None
                }
            }
        }
    };
}

registers! {
    /// `eax`
    Eax = 17, "eax", Emulated32;
    /// `ecx`
    Ecx = 18, "ecx", Emulated32;
    /// `edx`
    Edx = 19, "edx", Emulated32;
    /// `ebx`
    Ebx = 20, "ebx", Emulated32;
    /// `esp`
    Esp = 21, "esp", Emulated32;
    /// `ebp`
    Ebp = 22, "ebp", Emulated32;
    /// `esi`
    Esi = 23, "esi", Emulated32;
    /// `edi`
    Edi = 24, "edi", Emulated32;
    /// `rax`
    Rax = 328, "rax", Native64;
    /// `rbx`
    Rbx = 329, "rbx", Native64;
    /// `rcx`
    Rcx = 330, "rcx", Native64;
    /// `rdx`
    Rdx = 331, "rdx", Native64;
    /// `rsi`
    Rsi = 332, "rsi", Native64;
    /// `rdi`
    Rdi = 333, "rdi", Native64;
    /// `rbp`
    Rbp = 334, "rbp", Native64;
    /// `rsp`
    Rsp = 335, "rsp", Native64;
    /// `r8`
    R8 = 336, "r8", Native64;
    /// `r9`
    R9 = 337, "r9", Native64;
    /// `r10`
    R10 = 338, "r10", Native64;
    /// `r11`
    R11 = 339, "r11", Native64;
    /// `r12`
    R12 = 340, "r12", Native64;
    /// `r13`
    R13 = 341, "r13", Native64;
    /// `r14`
    R14 = 342, "r14", Native64;
    /// `r15`
    R15 = 343, "r15", Native64;
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown register `{s}`"))
    }
}


/// The general purpose registers of a native 64 bit thread context.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Amd64Context {
    /// `rax`
    pub rax: u64,
    /// `rbx`
    pub rbx: u64,
    /// `rcx`
    pub rcx: u64,
    /// `rdx`
    pub rdx: u64,
    /// `rsi`
    pub rsi: u64,
    /// `rdi`
    pub rdi: u64,
    /// `rbp`
    pub rbp: u64,
    /// `rsp`
    pub rsp: u64,
    /// `r8`
    pub r8: u64,
    /// `r9`
    pub r9: u64,
    /// `r10`
    pub r10: u64,
    /// `r11`
    pub r11: u64,
    /// `r12`
    pub r12: u64,
    /// `r13`
    pub r13: u64,
    /// `r14`
    pub r14: u64,
    /// `r15`
    pub r15: u64,
    /// The instruction pointer.
    pub rip: u64,
    /// The flags register.
    pub rflags: u64,
}


/// The general purpose registers of an emulated 32 bit thread context.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct X86Context {
    /// `eax`
    pub eax: u32,
    /// `ecx`
    pub ecx: u32,
    /// `edx`
    pub edx: u32,
    /// `ebx`
    pub ebx: u32,
    /// `esp`
    pub esp: u32,
    /// `ebp`
    pub ebp: u32,
    /// `esi`
    pub esi: u32,
    /// `edi`
    pub edi: u32,
    /// The instruction pointer.
    pub eip: u32,
    /// The flags register.
    pub eflags: u32,
}


/// The captured register state of a stopped thread, tagged with the
/// layout it was captured in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterSnapshot {
    /// A native 64 bit context.
    Native64(Amd64Context),
    /// A 32 bit context captured under emulation.
    Emulated32(X86Context),
}

impl RegisterSnapshot {
    /// Create an all-zero snapshot for the given mode.
    pub fn zeroed(mode: ContextMode) -> Self {
        match mode {
            ContextMode::Native64 => Self::Native64(Amd64Context::default()),
            ContextMode::Emulated32 => Self::Emulated32(X86Context::default()),
        }
    }

    /// Retrieve the layout of this snapshot.
    #[inline]
    pub fn mode(&self) -> ContextMode {
        match self {
            Self::Native64(..) => ContextMode::Native64,
            Self::Emulated32(..) => ContextMode::Emulated32,
        }
    }

    /// Retrieve the value of `reg`.
    ///
    /// 32 bit registers are zero extended. `None` is returned if `reg`
    /// does not belong to the snapshot's layout.
    pub fn get(&self, reg: Register) -> Option<i64> {
        let value = match (self, reg) {
            (Self::Native64(ctx), reg) => {
                let value = match reg {
                    Register::Rax => ctx.rax,
                    Register::Rbx => ctx.rbx,
                    Register::Rcx => ctx.rcx,
                    Register::Rdx => ctx.rdx,
                    Register::Rsi => ctx.rsi,
                    Register::Rdi => ctx.rdi,
                    Register::Rbp => ctx.rbp,
                    Register::Rsp => ctx.rsp,
                    Register::R8 => ctx.r8,
                    Register::R9 => ctx.r9,
                    Register::R10 => ctx.r10,
                    Register::R11 => ctx.r11,
                    Register::R12 => ctx.r12,
                    Register::R13 => ctx.r13,
                    Register::R14 => ctx.r14,
                    Register::R15 => ctx.r15,
                    _ => return None,
                };
                value as i64
            }
            (Self::Emulated32(ctx), reg) => {
                let value = match reg {
                    Register::Eax => ctx.eax,
                    Register::Ecx => ctx.ecx,
                    Register::Edx => ctx.edx,
                    Register::Ebx => ctx.ebx,
                    Register::Esp => ctx.esp,
                    Register::Ebp => ctx.ebp,
                    Register::Esi => ctx.esi,
                    Register::Edi => ctx.edi,
                    _ => return None,
                };
                i64::from(value)
            }
        };
        Some(value)
    }

    /// Set the value of `reg`, truncating it for 32 bit registers.
    ///
    /// Returns `false` if `reg` does not belong to the snapshot's layout.
    pub fn set(&mut self, reg: Register, value: u64) -> bool {
        match self {
            Self::Native64(ctx) => {
                let slot = match reg {
                    Register::Rax => &mut ctx.rax,
                    Register::Rbx => &mut ctx.rbx,
                    Register::Rcx => &mut ctx.rcx,
                    Register::Rdx => &mut ctx.rdx,
                    Register::Rsi => &mut ctx.rsi,
                    Register::Rdi => &mut ctx.rdi,
                    Register::Rbp => &mut ctx.rbp,
                    Register::Rsp => &mut ctx.rsp,
                    Register::R8 => &mut ctx.r8,
                    Register::R9 => &mut ctx.r9,
                    Register::R10 => &mut ctx.r10,
                    Register::R11 => &mut ctx.r11,
                    Register::R12 => &mut ctx.r12,
                    Register::R13 => &mut ctx.r13,
                    Register::R14 => &mut ctx.r14,
                    Register::R15 => &mut ctx.r15,
                    _ => return false,
                };
                *slot = value;
            }
            Self::Emulated32(ctx) => {
                let slot = match reg {
                    Register::Eax => &mut ctx.eax,
                    Register::Ecx => &mut ctx.ecx,
                    Register::Edx => &mut ctx.edx,
                    Register::Ebx => &mut ctx.ebx,
                    Register::Esp => &mut ctx.esp,
                    Register::Ebp => &mut ctx.ebp,
                    Register::Esi => &mut ctx.esi,
                    Register::Edi => &mut ctx.edi,
                    _ => return false,
                };
                *slot = value as u32;
            }
        }
        true
    }
}

impl From<Amd64Context> for RegisterSnapshot {
    fn from(ctx: Amd64Context) -> Self {
        Self::Native64(ctx)
    }
}

impl From<X86Context> for RegisterSnapshot {
    fn from(ctx: X86Context) -> Self {
        Self::Emulated32(ctx)
    }
}


/// Resolve the CodeView register id `id` against `snapshot`.
///
/// The register table is picked based on the snapshot's layout. `None`
/// is returned for ids that are not part of that table.
pub fn try_resolve(id: u32, snapshot: &RegisterSnapshot) -> Option<i64> {
    let reg = Register::from_id(id, snapshot.mode())?;
    snapshot.get(reg)
}

/// Resolve the CodeView register id `id` against `snapshot`, defaulting
/// to `0` for ids that cannot be resolved.
///
/// A result of `0` is indistinguishable from a register that legitimately
/// holds zero; use [`try_resolve`] where that matters.
#[inline]
pub fn resolve(id: u32, snapshot: &RegisterSnapshot) -> i64 {
    try_resolve(id, snapshot).unwrap_or(0)
}
