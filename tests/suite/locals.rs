#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::hint::black_box;
use std::process;

use framesym::backend::Backend as _;
use framesym::backend::ElfBackend;
use framesym::initialize_debug_binding;
use framesym::register::Register;
use framesym::ContextMode;
use framesym::ErrorKind;
use framesym::RegisterSnapshot;
use framesym::Session;
use framesym::Storage;

use test_log::test;


#[inline(never)]
fn sample_locals(alpha: u64, beta: u32) -> u64 {
    let gamma = alpha.wrapping_mul(u64::from(beta));
    black_box(gamma)
}

static SAMPLE_DATA: [u64; 4] = [1, 2, 3, 4];


/// Check that we can retrieve the parameters of a function of the
/// current process through a process handle bound up front.
#[test]
fn local_symbols_of_self() {
    let _value = sample_locals(black_box(2), black_box(3));

    let backend = ElfBackend::new();
    let process = backend.open_process(process::id()).unwrap();
    let () = initialize_debug_binding(&backend, process, None, 0).unwrap();

    let addr = sample_locals as usize as u64;
    let info = backend.module_info(process, addr).unwrap();
    if !info.line_numbers {
        // Without debug information there is nothing to find.
        return
    }

    let mut snapshot = RegisterSnapshot::zeroed(ContextMode::Native64);
    assert!(snapshot.set(Register::Rsp, 0x7fff_0000));
    assert!(snapshot.set(Register::Rbp, 0x7fff_0100));

    let mut session = Session::with_process(&backend, process);
    assert!(!session.owns_process());
    let syms = session.local_symbols(addr, &snapshot).unwrap();

    for name in ["alpha", "beta"] {
        let sym = syms.iter().find(|sym| sym.name == name).unwrap();
        assert!(
            matches!(sym.storage, Storage::RegisterRelative { .. }),
            "{sym:?}"
        );
        assert!(sym.resolved, "{sym:?}");
        assert_ne!(sym.addr, 0);
    }
}

/// Check that a register snapshot for the wrong emulation mode is
/// rejected.
#[test]
fn local_symbols_mode_mismatch() {
    let backend = ElfBackend::new();
    let process = backend.open_process(process::id()).unwrap();
    let () = initialize_debug_binding(&backend, process, None, 0).unwrap();

    let snapshot = RegisterSnapshot::zeroed(ContextMode::Emulated32);
    let mut session = Session::with_process(&backend, process);
    let err = session
        .local_symbols(sample_locals as usize as u64, &snapshot)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextMismatch);
}

/// Check that activating a scope at an address of a loaded module that
/// no function covers fails.
#[test]
fn local_symbols_outside_function() {
    let backend = ElfBackend::new();
    let process = backend.open_process(process::id()).unwrap();
    let () = initialize_debug_binding(&backend, process, None, 0).unwrap();

    let data = black_box(&SAMPLE_DATA) as *const _ as u64;
    let info = backend
        .module_info(process, sample_locals as usize as u64)
        .unwrap();
    // Both addresses belong to the test binary.
    assert_eq!(backend.module_info(process, data).unwrap().base, info.base);

    let snapshot = RegisterSnapshot::zeroed(ContextMode::Native64);
    for addr in [data, info.base] {
        let () = initialize_debug_binding(&backend, process, None, 0).unwrap();
        let mut session = Session::with_process(&backend, process);
        let err = session.local_symbols(addr, &snapshot).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScopeActivation, "{addr:#x}: {err}");
    }
}
