//! OS-visible process naming

use shared::{process_debug, ProcessRole};

use crate::traits::ProcessTitle;

/// Sets the process name through the platform facility
///
/// Skipped entirely on macOS, where renaming a running process is not
/// reliable. On Linux the kernel keeps at most 15 bytes of the thread name,
/// so the full title is also written over the argument area shown by `ps`
/// and `/proc/<pid>/cmdline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessTitle;

impl OsProcessTitle {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTitle for OsProcessTitle {
    #[cfg(target_os = "macos")]
    fn set(&self, _name: &str) {}

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn set(&self, name: &str) {
        let c_name = match std::ffi::CString::new(name) {
            Ok(c_name) => c_name,
            Err(_) => {
                process_debug!(ProcessRole::current(), "Process name contains a NUL byte: {:?}", name);
                return;
            }
        };

        if let Err(e) = nix::sys::prctl::set_name(&c_name) {
            process_debug!(ProcessRole::current(), "Failed to set process name: {}", e);
        }

        match cmdline::write(name) {
            Ok(written) if written < name.len() => process_debug!(
                ProcessRole::current(),
                "Process title truncated to {} of {} bytes",
                written,
                name.len()
            ),
            Ok(_) => {}
            Err(e) => process_debug!(ProcessRole::current(), "Failed to set process title: {}", e),
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "android")))]
    fn set(&self, name: &str) {
        process_debug!(
            ProcessRole::current(),
            "Process naming unsupported on this platform, keeping name {:?} unset",
            name
        );
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod cmdline {
    use std::io;
    use std::sync::Mutex;

    /// 1-based positions of `arg_start` and `arg_end` in `/proc/self/stat`
    const ARG_START_FIELD: usize = 48;

    static TITLE_LOCK: Mutex<()> = Mutex::new(());

    /// Bounds of the original argv strings in this process
    fn argument_area() -> io::Result<(usize, usize)> {
        let stat = std::fs::read_to_string("/proc/self/stat")?;

        // The command name may contain spaces and parentheses; fields resume after the last ')'
        let (_, fields) = stat
            .rsplit_once(')')
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/self/stat"))?;
        let mut fields = fields.split_whitespace().skip(ARG_START_FIELD - 3);
        let mut next_address = || -> io::Result<usize> {
            fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "argument area missing from /proc/self/stat"))
        };

        let start = next_address()?;
        let end = next_address()?;
        if start == 0 || end <= start {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty argument area"));
        }
        Ok((start, end))
    }

    /// Overwrite the argument area with `title`, returning the bytes kept
    ///
    /// The rest of the area is zeroed so the kernel reports only the title.
    pub(super) fn write(title: &str) -> io::Result<usize> {
        let _guard = TITLE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let (start, end) = argument_area()?;

        // One byte stays reserved for the terminating NUL
        let capacity = end - start - 1;
        let bytes = &title.as_bytes()[..title.len().min(capacity)];

        // SAFETY: [start, end) is this process's own argv block as reported by
        // the kernel. It lives on the initial stack for the whole process
        // lifetime and is writable; writes stay inside it and are serialised
        // by TITLE_LOCK.
        unsafe {
            let area = start as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), area, bytes.len());
            std::ptr::write_bytes(area.add(bytes.len()), 0, end - start - bytes.len());
        }
        Ok(bytes.len())
    }
}
