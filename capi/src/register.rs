use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use framesym::register::Amd64Context;
use framesym::register::X86Context;
use framesym::RegisterSnapshot;


/// The general purpose registers of a native 64 bit thread context.
pub type fsym_amd64_context = Amd64Context;

/// The general purpose registers of an emulated 32 bit thread context.
pub type fsym_x86_context = X86Context;


/// The layout of a [`fsym_register_snapshot`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum fsym_context_mode {
    /// The snapshot holds a native 64 bit context in its `amd64`
    /// member.
    FSYM_CONTEXT_NATIVE64,
    /// The snapshot holds a 32 bit context captured under emulation in
    /// its `x86` member.
    FSYM_CONTEXT_EMULATED32,
}


/// The register state of a thread, in one of the two supported
/// layouts.
#[repr(C)]
#[derive(Copy, Clone)]
pub union fsym_context {
    /// Valid for [`fsym_context_mode::FSYM_CONTEXT_NATIVE64`].
    pub amd64: fsym_amd64_context,
    /// Valid for [`fsym_context_mode::FSYM_CONTEXT_EMULATED32`].
    pub x86: fsym_x86_context,
}

impl Debug for fsym_context {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("fsym_context").finish_non_exhaustive()
    }
}


/// The captured register state of a stopped thread, as passed to
/// [`fsym_local_syms`][crate::fsym_local_syms].
///
/// The layout has to match the emulation mode of the process the
/// thread belongs to.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct fsym_register_snapshot {
    /// The layout of `ctx`.
    pub mode: fsym_context_mode,
    /// The register values.
    pub ctx: fsym_context,
}

impl Debug for fsym_register_snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("fsym_register_snapshot")
            .field(&RegisterSnapshot::from(*self))
            .finish()
    }
}

impl From<fsym_register_snapshot> for RegisterSnapshot {
    fn from(other: fsym_register_snapshot) -> Self {
        // SAFETY: `mode` tells us which union member is initialized.
        match other.mode {
            fsym_context_mode::FSYM_CONTEXT_NATIVE64 => {
                Self::Native64(unsafe { other.ctx.amd64 })
            }
            fsym_context_mode::FSYM_CONTEXT_EMULATED32 => {
                Self::Emulated32(unsafe { other.ctx.x86 })
            }
        }
    }
}
