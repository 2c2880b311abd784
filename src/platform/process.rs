//! Child-process termination decoding.
//!
//! Every way a child can end maps to exactly one [`ExitStatus`] variant:
//! a normal exit carries its code, a signal death carries the signal number,
//! and anything the platform reports in another encoding (e.g. a stopped
//! child) is kept as the raw wait status.

use std::fmt;

/// Decoded termination of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    ExitedWithCode(i32),
    TerminatedBySignal(i32),
    UnknownRawStatus(i32),
}

impl ExitStatus {
    /// Only a zero exit code counts as success.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::ExitedWithCode(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ExitedWithCode(code) => write!(f, "exited with status: {code}"),
            Self::TerminatedBySignal(sig) => match signal_name(sig) {
                Some(name) => write!(f, "terminated by signal: {sig} ({name})"),
                None => write!(f, "terminated by signal: {sig}"),
            },
            Self::UnknownRawStatus(raw) => write!(f, "ended with raw status: {raw}"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        decode(status)
    }
}

#[cfg(unix)]
fn decode(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        ExitStatus::ExitedWithCode(code)
    } else if let Some(sig) = status.signal() {
        ExitStatus::TerminatedBySignal(sig)
    } else {
        ExitStatus::UnknownRawStatus(status.into_raw())
    }
}

#[cfg(not(unix))]
fn decode(status: std::process::ExitStatus) -> ExitStatus {
    status
        .code()
        .map_or(ExitStatus::UnknownRawStatus(-1), ExitStatus::ExitedWithCode)
}

/// Symbolic name for a signal number, e.g. `SIGKILL`.
#[must_use]
pub fn signal_name(sig: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        nix::sys::signal::Signal::try_from(sig)
            .ok()
            .map(nix::sys::signal::Signal::as_str)
    }
    #[cfg(not(unix))]
    {
        let _ = sig;
        None
    }
}

/// errno values used as negative result codes, following the `-errno`
/// convention of the Lustre user API.
pub mod errno {
    #[cfg(unix)]
    use nix::errno::Errno;

    /// Argument list too long.
    #[must_use]
    pub fn e2big() -> i32 {
        #[cfg(unix)]
        {
            Errno::E2BIG as i32
        }
        #[cfg(not(unix))]
        {
            7
        }
    }

    /// Invalid argument.
    #[must_use]
    pub fn einval() -> i32 {
        #[cfg(unix)]
        {
            Errno::EINVAL as i32
        }
        #[cfg(not(unix))]
        {
            22
        }
    }

    /// Interrupted.
    #[must_use]
    pub fn eintr() -> i32 {
        #[cfg(unix)]
        {
            Errno::EINTR as i32
        }
        #[cfg(not(unix))]
        {
            4
        }
    }

    /// I/O error, used when the OS reported no errno at all.
    #[must_use]
    pub fn eio() -> i32 {
        #[cfg(unix)]
        {
            Errno::EIO as i32
        }
        #[cfg(not(unix))]
        {
            5
        }
    }

    /// errno carried by an IO error, falling back to `EIO`.
    #[must_use]
    pub fn of(err: &std::io::Error) -> i32 {
        err.raw_os_error().unwrap_or_else(eio)
    }
}
