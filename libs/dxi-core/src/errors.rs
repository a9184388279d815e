//! Error kinds, propagation policy and the process-wide failure mode.
//!
//! Every fallible operation in this crate returns [`Result`].  The error
//! carries one of the closed [`ErrorKind`] tags, a formatted message and an
//! optional chained source error.  Layers add context by prepending a short
//! prefix to the message without changing the kind; storage boundaries
//! re-kind errors to one of the `Storage*` kinds and chain the inner error.

use snafu::Snafu;
use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Closed enumeration of error kinds.
///
/// The names returned by [`ErrorKind::name`] are stable and may appear in
/// serialized logs; do not rename them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ErrorKind {
    /// Generic unclassified error
    Unknown,
    Io,
    Runtime,
    Index,
    Type,
    Value,
    Syntax,
    Memory,
    Key,
    Parse,
    Permission,
    Serialise,
    Unsupported,
    Verify,
    InconsistentData,
    InvalidMetadata,
    StorageOpen,
    StorageLoad,
    StorageSave,
    Option,
    MissingInstance,
    MissingMetadata,
    MetadataExist,
    Protocol,
    Timeout,
}

impl ErrorKind {
    /// Stable name of this kind.
    pub const fn name(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            Unknown => "Unknown",
            Io => "IO",
            Runtime => "Runtime",
            Index => "Index",
            Type => "Type",
            Value => "Value",
            Syntax => "Syntax",
            Memory => "Memory",
            Key => "Key",
            Parse => "Parse",
            Permission => "Permission",
            Serialise => "Serialise",
            Unsupported => "Unsupported",
            Verify => "Verify",
            InconsistentData => "InconsistentData",
            InvalidMetadata => "InvalidMetadata",
            StorageOpen => "StorageOpen",
            StorageLoad => "StorageLoad",
            StorageSave => "StorageSave",
            Option => "Option",
            MissingInstance => "MissingInstance",
            MissingMetadata => "MissingMetadata",
            MetadataExist => "MetadataExist",
            Protocol => "Protocol",
            Timeout => "Timeout",
        }
    }

    /// One-line description of this kind.
    pub const fn description(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            Unknown => "Generic unknown error",
            Io => "I/O related error",
            Runtime => "Unspecified run-time error",
            Index => "Index out of range",
            Type => "Inappropriate argument type",
            Value => "Inappropriate argument value (of correct type)",
            Syntax => "Invalid syntax",
            Memory => "Out of memory",
            Key => "Mapping key is not found",
            Parse => "Cannot parse input",
            Permission => "Not enough permissions",
            Serialise => "Cannot serialise output",
            Unsupported => "Feature is not implemented/supported",
            Verify => "Object cannot be verified",
            InconsistentData => "Inconsistent data",
            InvalidMetadata => "Invalid metadata",
            StorageOpen => "Cannot open storage",
            StorageLoad => "Cannot load from storage",
            StorageSave => "Cannot save to storage",
            Option => "Invalid storage option",
            MissingInstance => "No instance with given id",
            MissingMetadata => "No metadata with given id",
            MetadataExist => "Metadata with given id already exists",
            Protocol => "Error in a protocol layer",
            Timeout => "Operation timed out",
        }
    }

    /// Inverse of [`name`](Self::name).  Unknown names map to
    /// [`ErrorKind::Unknown`].
    pub fn from_name(name: &str) -> ErrorKind {
        use ErrorKind::*;
        const ALL: &[ErrorKind] = &[
            Unknown,
            Io,
            Runtime,
            Index,
            Type,
            Value,
            Syntax,
            Memory,
            Key,
            Parse,
            Permission,
            Serialise,
            Unsupported,
            Verify,
            InconsistentData,
            InvalidMetadata,
            StorageOpen,
            StorageLoad,
            StorageSave,
            Option,
            MissingInstance,
            MissingMetadata,
            MetadataExist,
            Protocol,
            Timeout,
        ];
        ALL.iter()
            .copied()
            .find(|k| k.name() == name)
            .unwrap_or(Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error value returned by every fallible operation of this crate.
#[derive(Debug, Clone, Snafu)]
#[snafu(display("{kind}: {message}"))]
pub struct Error {
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
    #[snafu(source(false))]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    /// Creates a new error and dispatches it according to the process-wide
    /// [fail mode](fail_mode).
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Error {
        let err = Error {
            kind,
            message: message.into(),
            source: None,
        };
        err.dispatch();
        err
    }

    /// Creates a new error chaining `source` under it.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: Error) -> Error {
        let err = Error {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        };
        err.dispatch();
        err
    }

    /// The kind tag of this error.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The formatted message (without the kind name).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The chained source error, if any.
    pub fn inner(&self) -> std::option::Option<&Error> {
        self.source.as_deref()
    }

    /// Prepends `prefix` to the message, keeping the kind and the source.
    pub fn context(mut self, prefix: impl AsRef<str>) -> Error {
        self.message = format!("{}: {}", prefix.as_ref(), self.message);
        self
    }

    /// Wraps this error under a new kind.  Used when crossing the storage
    /// boundary.
    pub fn rekind(self, kind: ErrorKind, message: impl Into<String>) -> Error {
        Error::with_source(kind, message, self)
    }

    fn dispatch(&self) {
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(self.clone()));
        match fail_mode() {
            FailMode::Return => {}
            FailMode::Exit => {
                emit(&format!("{self}"));
                std::process::exit(1);
            }
            FailMode::Abort => {
                emit(&format!("{self}"));
                std::process::abort();
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, value.to_string())
    }
}

/// Extension methods for [`Result`].
pub trait ResultExt<T> {
    /// Prepends a lazily-built prefix to the error message.
    fn context_with(self, f: impl FnOnce() -> String) -> Result<T>;

    /// Re-kinds the error, chaining the original one.
    fn rekind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context_with(self, f: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }

    fn rekind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.rekind(kind, message))
    }
}

/// Shorthand for `Err(Error::new(kind, format!(...)))`.
macro_rules! raise {
    ($kind:expr, $($arg:tt)*) => {
        return Err($crate::errors::Error::new($kind, format!($($arg)*)))
    };
}

/// Evaluates `cond` and raises the given kind with a formatted message when
/// it does not hold.
macro_rules! ensure_or {
    ($cond:expr, $kind:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::errors::Error::new($kind, format!($($arg)*)));
        }
    };
}

pub(crate) use ensure_or;
pub(crate) use raise;

// ---------------------------------------------------------------------------
// Process-wide failure policy
// ---------------------------------------------------------------------------

/// What to do when an error value is created.
///
/// Selected at startup from the `ERR_FAIL_MODE` environment variable:
/// `"return"` (default), `"exit"` or `"abort"`.  `exit`/`abort` let an
/// embedding program treat every error as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Return,
    Exit,
    Abort,
}

/// Returns the process-wide fail mode.  Read once from `ERR_FAIL_MODE`.
pub fn fail_mode() -> FailMode {
    static MODE: OnceLock<FailMode> = OnceLock::new();
    *MODE.get_or_init(|| {
        match std::env::var("ERR_FAIL_MODE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "exit" => FailMode::Exit,
            "abort" => FailMode::Abort,
            _ => FailMode::Return,
        }
    })
}

/// Where fatal error messages are written when the fail mode is not
/// [`FailMode::Return`].
///
/// Read once from the `ERR_STREAM` environment variable: `"stderr"`
/// (default), `"stdout"`, `"none"` or a file path opened in append mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrStream {
    Stderr,
    Stdout,
    Discard,
    File(PathBuf),
}

/// Returns the configured error sink.
pub fn err_stream() -> &'static ErrStream {
    static STREAM: OnceLock<ErrStream> = OnceLock::new();
    STREAM.get_or_init(|| match std::env::var("ERR_STREAM").ok().as_deref() {
        None | Some("stderr") | Some("") => ErrStream::Stderr,
        Some("stdout") => ErrStream::Stdout,
        Some("none") => ErrStream::Discard,
        Some(path) => ErrStream::File(PathBuf::from(path)),
    })
}

fn emit(message: &str) {
    match err_stream() {
        ErrStream::Stderr => eprintln!("{message}"),
        ErrStream::Stdout => println!("{message}"),
        ErrStream::Discard => {}
        ErrStream::File(path) => {
            if let Ok(mut f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                let _ = writeln!(f, "{message}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Thread-local last error
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: RefCell<std::option::Option<Error>> = const { RefCell::new(None) };
}

/// Returns a copy of the last error created on this thread, if any.
///
/// Kept for FFI-style interrogation; internal code never relies on it.
pub fn last_error() -> std::option::Option<Error> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clears the last-error slot of this thread.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(ErrorKind::Io.name(), "IO");
        assert_eq!(ErrorKind::InvalidMetadata.name(), "InvalidMetadata");
        assert_eq!(ErrorKind::StorageLoad.name(), "StorageLoad");
        assert_eq!(ErrorKind::from_name("Parse"), ErrorKind::Parse);
        assert_eq!(ErrorKind::from_name("NoSuchKind"), ErrorKind::Unknown);
    }

    #[test]
    fn context_keeps_kind() {
        let e = Error::new(ErrorKind::Parse, "unexpected token")
            .context("parsing property elements");
        assert_eq!(e.kind(), ErrorKind::Parse);
        assert_eq!(
            e.to_string(),
            "Parse: parsing property elements: unexpected token"
        );
    }

    #[test]
    fn rekind_chains_source() {
        let inner = Error::new(ErrorKind::Io, "file vanished");
        let outer = inner.rekind(ErrorKind::StorageLoad, "loading \"abc\"");
        assert_eq!(outer.kind(), ErrorKind::StorageLoad);
        assert_eq!(outer.inner().unwrap().kind(), ErrorKind::Io);
    }

    #[test]
    fn last_error_is_recorded() {
        clear_last_error();
        let _ = Error::new(ErrorKind::Key, "no such key");
        assert_eq!(last_error().unwrap().kind(), ErrorKind::Key);
        clear_last_error();
        assert!(last_error().is_none());
    }
}
