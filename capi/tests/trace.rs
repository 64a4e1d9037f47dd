//! Test capturing of trace information.
//!
//! Modifies global state; keep in separate test binary.

use std::env::current_exe;
use std::ffi::c_char;
use std::ffi::CStr;
use std::ffi::CString;
use std::sync::Mutex;

use framesym_c::fsym_err;
use framesym_c::fsym_err_last;
use framesym_c::fsym_module_syms;
use framesym_c::fsym_module_syms_free;
use framesym_c::fsym_trace;
use framesym_c::fsym_trace_lvl::*;


/// Check that we retrieve callbacks for traces being emitted.
#[test]
fn trace_callbacks() {
    static TRACES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    extern "C" fn trace_cb(msg: *const c_char) {
        let msg = unsafe { CStr::from_ptr(msg) };
        let msg = msg.to_string_lossy().to_string();
        let mut traces = TRACES.lock().unwrap();
        let () = traces.push(msg);
    }

    let () = fsym_trace(FSYM_LVL_DEBUG, trace_cb);
    assert_eq!(fsym_err_last(), fsym_err::FSYM_ERR_OK);

    // Retrieve module symbols, which creates a session and loads a
    // module, both of which are traced.
    {
        let path = CString::new(current_exe().unwrap().to_str().unwrap()).unwrap();
        let mut len = 0;
        let syms = unsafe { fsym_module_syms(path.as_ptr(), &mut len) };
        assert!(!syms.is_null());
        let () = unsafe { fsym_module_syms_free(syms, len) };
    }

    let traces = TRACES.lock().unwrap();
    assert!(
        traces.iter().any(|trace| trace.contains("loaded module")),
        "{traces:?}"
    );

    let () = fsym_trace(FSYM_LVL_TRACE, trace_cb);
    assert_eq!(fsym_err_last(), fsym_err::FSYM_ERR_ALREADY_EXISTS);
}
