//! Error-handling.
//!
//! Types for error-handling in this crate, based on the [`failure`] crate.
//!
//! [`Error`] is the wrapper which implements [`Fail`] and contains the inner
//! [`ErrorKind`] and its [`Context`].
//!
//! [`failure`]: ../../failure/index.html
//! [`Error`]: ./struct.Error.html
//! [`ErrorKind`]: ./enum.ErrorKind.html
//! [`Fail`]: ../../failure/trait.Fail.html
//! [`Context`]: ../../failure/struct.Context.html

use failure::{Backtrace, Context, Fail};
use std::{fmt, fmt::Display, result};

/// Internal [`Result`] type which uses the crate's [`Error`] type.
///
/// [`Error`]: ./struct.Error.html
pub type Result<T> = result::Result<T, Error>;

/// Re-export the [`ResultExt`] trait which adds the [`Context`] methods to
/// [`Result`].
///
/// [`ResultExt`]: ../../failure/trait.ResultExt.html
pub use failure::ResultExt;

/// [`Error`] type for this crate.
///
/// Implements [`Fail`].
///
/// [`Error`]: ./struct.Error.html
/// [`Fail`]: ../../failure/trait.Fail.html
#[derive(Debug)]
pub struct Error {
    /// [`Context`] which contains the [`ErrorKind`].
    ///
    /// [`Context`]: ../../failure/struct.Context.html
    /// [`ErrorKind`]: ./enum.ErrorKind.html
    ctx: Context<ErrorKind>,
}

#[derive(Debug, Fail)]
pub enum ErrorKind {
    /// Init/finalize or a dependent call happened in the wrong order.
    #[fail(display = "Illegal state: {}", _0)]
    IllegalState(String),

    /// A level name or number could not be interpreted.
    #[fail(display = "Bad level: {}", _0)]
    BadLevel(String),

    /// A filter string did not match the `prefix:level[,prefix:level]*`
    /// grammar.
    #[fail(display = "Bad filter syntax: {}", _0)]
    BadSyntax(String),

    /// A configuration value was rejected.
    #[fail(display = "Bad configuration: {}", _0)]
    BadConfig(String),

    /// A logger with the same name but a divergent level is already
    /// registered.
    #[fail(display = "Already registered: {}", _0)]
    AlreadyRegistered(String),

    /// A malformed frame arrived on the remote protocol.
    #[fail(display = "Protocol error: {}", _0)]
    Protocol(String),

    /// A signal prevented an operation from completing.
    #[fail(display = "Interrupted by signal: {}", _0)]
    SignalInterrupted(String),

    /// One or more handlers failed to acknowledge a flush; carries the
    /// per-handler causes.
    #[fail(display = "Flush failed for {} handler(s)", _0)]
    FlushFailed(usize, Vec<String>),

    /// A handler worker terminated on its own.
    #[fail(display = "Handler exited: {}", _0)]
    HandlerExit(String),

    /// A handler exceeded its distinct-error budget.
    #[fail(display = "Too many distinct errors: {}", _0)]
    TooManyErrors(usize),

    /// For propagating std::io::Error errors.
    #[fail(display = "I/O error: {}", _0)]
    Io(String, std::io::ErrorKind),

    /// For propagating crossbeam_channel errors.
    #[fail(display = "Inter-thread communication error: {}", _0)]
    Itc(String),
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    /// Numeric code for CLI exit statuses: the discriminant position of the
    /// kind, starting at 1.
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::IllegalState(_) => 1,
            ErrorKind::BadLevel(_) => 2,
            ErrorKind::BadSyntax(_) => 3,
            ErrorKind::BadConfig(_) => 4,
            ErrorKind::AlreadyRegistered(_) => 5,
            ErrorKind::Protocol(_) => 6,
            ErrorKind::SignalInterrupted(_) => 7,
            ErrorKind::FlushFailed(..) => 8,
            ErrorKind::HandlerExit(_) => 9,
            ErrorKind::TooManyErrors(_) => 10,
            ErrorKind::Io(..) => 11,
            ErrorKind::Itc(_) => 12,
        }
    }
}

/// Shorthand for producing an illegal state error.
pub fn illegal_state<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::IllegalState(s.into()).into())
}

/// Shorthand for producing an illegal state error in an or_else function.
pub fn oe_illegal_state(s: impl Into<String>) -> impl FnOnce() -> Error {
    move || ErrorKind::IllegalState(s.into()).into()
}

/// Shorthand for producing a bad level error.
pub fn bad_level<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::BadLevel(s.into()).into())
}

/// Shorthand for producing a bad syntax error.
pub fn bad_syntax<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::BadSyntax(s.into()).into())
}

/// Shorthand for producing a bad configuration error.
pub fn bad_cfg<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::BadConfig(s.into()).into())
}

/// Shorthand for producing a bad configuration error in an or_else function.
pub fn oe_bad_cfg(s: impl Into<String>) -> impl FnOnce() -> Error {
    move || ErrorKind::BadConfig(s.into()).into()
}

/// Shorthand for producing a protocol error.
pub fn proto_err<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::Protocol(s.into()).into())
}

/// Shorthand for producing a protocol error in an or_else function.
pub fn oe_proto_err(s: impl Into<String>) -> impl FnOnce() -> Error {
    move || ErrorKind::Protocol(s.into()).into()
}

/// Shorthand for producing a handler exit error.
pub fn handler_exit<T>(s: impl Into<String>) -> Result<T> {
    Err(ErrorKind::HandlerExit(s.into()).into())
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.ctx.fmt(f)
    }
}

impl From<ErrorKind> for Error {
    fn from(ctx: ErrorKind) -> Error {
        Error {
            ctx: Context::new(ctx),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Io(msg, error.kind())),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(error: crossbeam_channel::SendError<T>) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Itc(msg)),
        }
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    fn from(error: crossbeam_channel::RecvError) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Itc(msg)),
        }
    }
}

impl From<crossbeam_channel::RecvTimeoutError> for Error {
    fn from(error: crossbeam_channel::RecvTimeoutError) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Itc(msg)),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(error: std::str::Utf8Error) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Protocol(msg)),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Protocol(msg)),
        }
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(error: std::ffi::NulError) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::BadConfig(msg)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        let msg = error.to_string();
        Error {
            ctx: Context::new(ErrorKind::Protocol(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render() {
        let e: Error = ErrorKind::BadLevel("13".to_string()).into();
        assert_eq!(e.to_string(), "Bad level: 13");
        assert_eq!(e.code(), 2);

        let e: Error = ErrorKind::FlushFailed(2, vec!["a".into(), "b".into()]).into();
        assert_eq!(e.to_string(), "Flush failed for 2 handler(s)");
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        match e.kind() {
            ErrorKind::Io(_, kind) => assert_eq!(*kind, std::io::ErrorKind::NotFound),
            _ => panic!("expected Io kind"),
        }
    }
}
