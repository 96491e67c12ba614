use std::{fmt, io, path::PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// What was wrong with a record that did not match `<key>;<-?digits.digit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// A newline (or end of file) was reached before the `;` delimiter.
    MissingDelimiter,
    EmptyKey,
    EmptyValue,
    MissingIntegerDigits,
    MissingDecimalPoint,
    MissingFractionDigit,
    UnexpectedByte(u8),
    TrailingBytes,
    Overflow,
    /// A single record did not fit into the reader's buffer.
    RecordTooLong { capacity: usize },
}

#[derive(Debug)]
pub enum Error {
    /// The input file could not be opened or statted.
    Open { path: PathBuf, source: io::Error },

    Io(io::Error),

    /// A record broke the fixed grammar. `offset` is the absolute byte offset
    /// of the offending byte in the input file.
    Malformed { offset: u64, kind: MalformedKind },

    /// A refill returned no bytes while the chunk still expected input up to
    /// `expected_end`.
    NoProgress { offset: u64, expected_end: u64 },

    /// Two different keys produced the same digest.
    DigestCollision {
        digest: u64,
        first: String,
        second: String,
    },

    /// The exact sum of a key's values no longer fits in an `i64`.
    SumOverflow { key: String },

    InvalidConfig(&'static str),

    ThreadPool(rayon::ThreadPoolBuildError),

    /// The worker stopped early because another worker failed.
    Cancelled,
}

impl Error {
    pub(crate) fn malformed(offset: u64, kind: MalformedKind) -> Self {
        Error::Malformed { offset, kind }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Malformed { .. })
    }
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedKind::MissingDelimiter => write!(f, "missing ';' delimiter"),
            MalformedKind::EmptyKey => write!(f, "empty key"),
            MalformedKind::EmptyValue => write!(f, "empty value"),
            MalformedKind::MissingIntegerDigits => write!(f, "expected an integer digit"),
            MalformedKind::MissingDecimalPoint => write!(f, "expected '.'"),
            MalformedKind::MissingFractionDigit => write!(f, "expected one fractional digit"),
            MalformedKind::UnexpectedByte(b) => write!(f, "unexpected byte 0x{:02x}", b),
            MalformedKind::TrailingBytes => write!(f, "trailing bytes after the value"),
            MalformedKind::Overflow => write!(f, "value does not fit in 64 bits"),
            MalformedKind::RecordTooLong { capacity } => {
                write!(f, "record longer than the {} byte buffer", capacity)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open { path, source } => {
                write!(f, "cannot open {}: {}", path.display(), source)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Malformed { offset, kind } => {
                write!(f, "malformed record at byte {}: {}", offset, kind)
            }
            Error::NoProgress {
                offset,
                expected_end,
            } => write!(
                f,
                "input ended at byte {} but the chunk expected data up to byte {}",
                offset, expected_end
            ),
            Error::DigestCollision {
                digest,
                first,
                second,
            } => write!(
                f,
                "keys {:?} and {:?} share digest {:#018x}",
                first, second, digest
            ),
            Error::SumOverflow { key } => {
                write!(f, "sum of values for key {:?} overflows 64 bits", key)
            }
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::ThreadPool(e) => write!(f, "cannot start worker pool: {}", e),
            Error::Cancelled => write!(f, "cancelled after another worker failed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            Error::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(value)
    }
}
