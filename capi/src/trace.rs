use std::ffi::c_char;
use std::ffi::CStr;
use std::io;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;

use crate::fsym_err;
#[cfg(doc)]
use crate::fsym_err_last;
use crate::set_last_err;


/// The level at which to emit traces.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum fsym_trace_lvl {
    /// Emit all trace events, including every symbol visited.
    FSYM_LVL_TRACE,
    /// Emit debug traces and above, e.g., session and module state
    /// changes.
    FSYM_LVL_DEBUG,
    /// Emit info level traces and above.
    FSYM_LVL_INFO,
    /// Only emit warnings, e.g., about modules that failed to unload.
    FSYM_LVL_WARN,
}

impl From<fsym_trace_lvl> for LevelFilter {
    fn from(other: fsym_trace_lvl) -> Self {
        match other {
            fsym_trace_lvl::FSYM_LVL_TRACE => LevelFilter::TRACE,
            fsym_trace_lvl::FSYM_LVL_DEBUG => LevelFilter::DEBUG,
            fsym_trace_lvl::FSYM_LVL_INFO => LevelFilter::INFO,
            fsym_trace_lvl::FSYM_LVL_WARN => LevelFilter::WARN,
        }
    }
}


/// The signature of a callback function as passed to [`fsym_trace`].
///
/// The callback receives one NUL terminated line at a time, including
/// the trailing newline.
pub type fsym_trace_cb = extern "C" fn(*const c_char);


/// An [`io::Write`] implementation handing complete lines to a
/// callback.
struct LineWriter<F> {
    /// The (incomplete) line currently being assembled.
    line: Vec<u8>,
    emit: F,
}

impl<F> LineWriter<F>
where
    F: FnMut(&CStr),
{
    fn new(emit: F) -> Self {
        Self {
            line: Vec::new(),
            emit,
        }
    }

    fn emit_line(&mut self) {
        let () = self.line.push(b'\0');
        // A line containing NUL bytes gets cut short at the first one.
        if let Ok(cstr) = CStr::from_bytes_until_nul(&self.line) {
            let () = (self.emit)(cstr);
        }
        let () = self.line.clear();
    }
}

impl<F> io::Write for LineWriter<F>
where
    F: FnMut(&CStr),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            let () = self.line.extend_from_slice(chunk);
            if chunk.ends_with(b"\n") {
                let () = self.emit_line();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Lines are only ever emitted once complete.
        Ok(())
    }
}


/// Route the library's traces to `cb`, one line at a time.
///
/// The provided [`fsym_trace_lvl`] determines what kind of traces are
/// emitted.
///
/// Tracing can be enabled once per process. Subsequent invocations
/// leave the existing configuration in place and set the thread's last
/// error to [`FSYM_ERR_ALREADY_EXISTS`][fsym_err::FSYM_ERR_ALREADY_EXISTS].
/// Use [`fsym_err_last`] to retrieve it.
///
/// # Notes
/// - the format of emitted lines is meant for human consumption and may
///   change at any time
#[no_mangle]
pub extern "C" fn fsym_trace(lvl: fsym_trace_lvl, cb: fsym_trace_cb) {
    let format = fmt::format().with_target(false).compact();
    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_max_level(LevelFilter::from(lvl))
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_timer(SystemTime)
        .with_writer(move || LineWriter::new(move |cstr: &CStr| cb(cstr.as_ptr())))
        .finish();

    let err = set_global_subscriber(subscriber)
        .map(|()| fsym_err::FSYM_ERR_OK)
        .unwrap_or(fsym_err::FSYM_ERR_ALREADY_EXISTS);
    let () = set_last_err(err);
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;


    /// Check that `fsym_trace_lvl` values map to the expected
    /// `LevelFilter` counterparts.
    #[test]
    fn lvl_conversions() {
        use super::fsym_trace_lvl::*;

        assert_eq!(LevelFilter::from(FSYM_LVL_TRACE), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(FSYM_LVL_DEBUG), LevelFilter::DEBUG);
        assert_eq!(LevelFilter::from(FSYM_LVL_INFO), LevelFilter::INFO);
        assert_eq!(LevelFilter::from(FSYM_LVL_WARN), LevelFilter::WARN);
    }

    /// Check that `LineWriter` emits exactly the complete lines written
    /// to it, no matter how the input is chunked.
    #[test]
    fn line_writing() {
        let data = br"DEBUG created session for process self#1
DEBUG opened /usr/lib/libc.so.6: 3012 symbols, preferred base 0x0, size 0x1e8f50
DEBUG loaded module `/usr/lib/libc.so.6` at 0x10000000
DEBUG enumerated 3012 symbols of module at 0x10000000
DEBUG unloaded module at 0x10000000
DEBUG closed session for process self#1
";

        for chunk_size in [1, 2, 7, 64, data.len()] {
            let mut lines = Vec::new();
            let mut writer = LineWriter::new(|line: &CStr| {
                let () = lines.push(line.to_bytes().to_vec());
            });

            for chunk in data.chunks(chunk_size) {
                let n = writer.write(chunk).unwrap();
                assert_eq!(n, chunk.len());
                let () = writer.flush().unwrap();
            }

            assert_eq!(lines.len(), 6);
            for line in &lines {
                assert!(line.ends_with(b"\n"), "{line:?}");
                assert!(!line[..line.len() - 1].contains(&b'\n'), "{line:?}");
            }
            assert_eq!(lines.concat(), data);
        }
    }

    /// Check that a trailing partial line is held back.
    #[test]
    fn partial_line() {
        let mut count = 0;
        let mut writer = LineWriter::new(|_line: &CStr| count += 1);
        let _n = writer.write(b"first\nsecond").unwrap();
        let () = writer.flush().unwrap();
        drop(writer);
        assert_eq!(count, 1);
    }
}
