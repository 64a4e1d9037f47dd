#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod log;

mod adapter;
pub mod backend;
mod error;
pub mod register;
mod session;
mod symbol;
mod tag;
#[cfg(test)]
mod test_helper;


pub use crate::error::DiagCode;
pub use crate::error::Error;
pub use crate::error::ErrorKind;
pub use crate::error::Result;
pub use crate::register::ContextMode;
pub use crate::register::RegisterSnapshot;
pub use crate::session::initialize_debug_binding;
pub use crate::session::Session;
pub use crate::symbol::LocalSymbol;
pub use crate::symbol::ModuleSymbol;
pub use crate::symbol::Storage;
pub use crate::symbol::UNKNOWN_FILE;
pub use crate::symbol::UNNAMED;
pub use crate::tag::tag_name;
pub use crate::tag::SymTag;


/// A type representing addresses.
pub type Addr = u64;
