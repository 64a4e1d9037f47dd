use std::env::current_exe;
use std::hint::black_box;
use std::path::Path;

use framesym::backend::default_backend;
use framesym::ErrorKind;
use framesym::Session;
use framesym::SymTag;

use test_log::test;


/// A function we can look for among the symbols of the test binary.
#[no_mangle]
#[inline(never)]
pub extern "C" fn framesym_sample_function(value: u64) -> u64 {
    black_box(value).wrapping_add(42)
}


/// Check that we can retrieve the symbols of our own test binary.
#[test]
fn module_symbols_of_self() {
    let _value = framesym_sample_function(black_box(1));

    let mut session = Session::new(default_backend()).unwrap();
    assert!(session.owns_process());

    let exe = current_exe().unwrap();
    let syms = session.module_symbols(&exe).unwrap();
    let sym = syms
        .iter()
        .find(|sym| sym.name == "framesym_sample_function")
        .unwrap();
    assert_eq!(sym.tag, SymTag::FUNCTION);
    assert_ne!(sym.addr, 0);
    assert_ne!(sym.size, 0);
    if sym.line != 0 {
        assert!(sym.file.ends_with("module.rs"), "{sym:?}");
    }
}

/// Check that symbols loaded at a given base address are reported
/// relative to it.
#[test]
fn module_symbols_at_base() {
    const BASE: u64 = 0x7000_0000_0000;

    let mut session = Session::new(default_backend()).unwrap();
    let exe = current_exe().unwrap();
    let syms = session.module_symbols_at(&exe, BASE).unwrap();
    let sym = syms
        .iter()
        .find(|sym| sym.name == "framesym_sample_function")
        .unwrap();
    assert!(sym.addr > BASE, "{sym:?}");

    // The module got unloaded again, so loading it at the same address
    // works once more.
    let again = session.module_symbols_at(&exe, BASE).unwrap();
    assert_eq!(again.len(), syms.len());
}

/// Check that loading a module that does not exist reports a module
/// load error.
#[test]
fn module_symbols_invalid_path() {
    let mut session = Session::new(default_backend()).unwrap();
    let err = session
        .module_symbols(Path::new("/does/not/exist.so"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModuleLoad);
    assert_ne!(err.code().0, 0);
}
