//! Per-call enumeration state and the callbacks turning backend symbol
//! descriptors into records.

use std::ops::ControlFlow;

use crate::backend::Backend;
use crate::backend::SymbolInfo;
use crate::log::trace;
use crate::register::RegisterSnapshot;
use crate::symbol::LocalSymbol;
use crate::symbol::ModuleSymbol;


/// The state threaded through one symbol enumeration.
///
/// An instance is created fresh for every enumeration call and never
/// outlives it.
#[derive(Debug)]
pub(crate) enum CallbackContext<'ctx, B>
where
    B: Backend,
{
    /// Enumeration of a module's symbols.
    Module {
        backend: &'ctx B,
        process: B::Process,
        syms: &'ctx mut Vec<ModuleSymbol>,
    },
    /// Enumeration of the symbols visible in a function activation.
    Local {
        backend: &'ctx B,
        process: B::Process,
        snapshot: &'ctx RegisterSnapshot,
        syms: &'ctx mut Vec<LocalSymbol>,
    },
}

impl<B> CallbackContext<'_, B>
where
    B: Backend,
{
    /// Build a record for one enumerated symbol and append it.
    ///
    /// Enumeration is never cut short: failing to look up a symbol's line
    /// degrades that record only.
    pub(crate) fn visit(&mut self, info: &SymbolInfo<'_>) -> ControlFlow<()> {
        match self {
            Self::Module {
                backend,
                process,
                syms,
            } => {
                let line = backend.line_from_addr(*process, info.addr);
                let sym = ModuleSymbol::from_info(info, line);
                trace!("module symbol {} @ {:#x}", sym.name, sym.addr);
                let () = syms.push(sym);
            }
            Self::Local {
                backend,
                process,
                snapshot,
                syms,
            } => {
                // The lookup happens for the descriptor's raw address, not
                // the resolved one.
                let line = backend.line_from_addr(*process, info.addr);
                let sym = LocalSymbol::from_info(info, line, snapshot);
                trace!(
                    "local symbol {} @ {:#x} (storage: {:?})",
                    sym.name,
                    sym.addr,
                    sym.storage
                );
                let () = syms.push(sym);
            }
        }
        ControlFlow::Continue(())
    }
}
