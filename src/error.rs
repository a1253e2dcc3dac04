use std::{error, fmt, io, result};

/// The specific type of an error.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Wrap a [std::io::Error] raised by the underlying source or sink.
    Io(io::Error),

    /// Indicate that a builder was given an unusable combination of control
    /// bytes, e.g. a CSV quote char equal to `\n`.
    InvalidConfig {
        /// Human-readable description of the conflict
        reason: &'static str,
    },

    /// Indicate that the stream was expected to be UTF-8 but contained an
    /// invalid or truncated byte sequence.
    Decode {
        /// Byte offset of the first offending byte in the stream
        pos: u64,
    },

    /// Indicate that a single record grew past the reader's maximum record
    /// length.
    RecordTooLong {
        /// Configured maximum record length, in bytes
        max_len: usize,
        /// Byte offset of the start of the offending record
        pos: u64,
    },

    /// Indicate that binary delimited data does not follow the wire format,
    /// e.g. an escaped field that is never closed.
    Malformed {
        /// Byte offset of the record (or stuffed field) being decoded
        pos: u64,
        /// What exactly went wrong
        reason: &'static str,
    },

    /// Indicate that an asynchronous reader observed its
    /// [`CancelToken`](crate::CancelToken) before refilling its buffer.
    Cancelled,
}

/// An error occurring when reading/writing delimited data.
#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub(crate) fn invalid_config(reason: &'static str) -> Self {
        Self(ErrorKind::InvalidConfig { reason })
    }

    pub(crate) fn malformed(pos: u64, reason: &'static str) -> Self {
        Self(ErrorKind::Malformed { pos, reason })
    }

    /// Return whether the wrapped error is a [`std::io::Error`].
    pub fn is_io_error(&self) -> bool {
        matches!(self.0, ErrorKind::Io(_))
    }

    /// Return a reference to the underlying [`ErrorKind`].
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwraps the error into its underlying [`ErrorKind`].
    pub fn into_kind(self) -> ErrorKind {
        self.0
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err.0 {
            ErrorKind::Io(inner) => inner,
            ErrorKind::Decode { .. } => Self::new(io::ErrorKind::InvalidData, err),
            _ => Self::other(err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.0 {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::InvalidConfig { reason } => write!(f, "invalid configuration: {}", reason),
            ErrorKind::Decode { pos } => {
                write!(f, "invalid UTF-8 sequence (byte: {})", pos)
            }
            ErrorKind::RecordTooLong { max_len, pos } => write!(
                f,
                "record (byte: {}) is longer than the maximum of {} bytes",
                pos, max_len
            ),
            ErrorKind::Malformed { pos, reason } => {
                write!(f, "malformed delimited data (byte: {}): {}", pos, reason)
            }
            ErrorKind::Cancelled => write!(f, "reading was cancelled"),
        }
    }
}

/// A type alias for `Result<T, simd_delimited::Error>`.
pub type Result<T> = result::Result<T, Error>;
