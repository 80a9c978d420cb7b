use std::borrow::Cow;
use std::path::PathBuf;
use std::{io, result};

use crate::convert::ConversionError;
use crate::dialect::FileFormat;

/// The specific type of an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Wrap a [std::io::Error], raised either when opening a file or while
    /// refilling the scanning window.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The configured encoding label is not known, or names an encoding
    /// that cannot hold CSV data.
    #[error("unsupported encoding: {label:?}")]
    UnsupportedEncoding {
        /// Label as given in the configuration
        label: String,
    },

    /// A dialect pattern (delimiter, enclosure...) cannot be represented in
    /// the declared encoding.
    #[error("{what} {pattern:?} cannot be encoded as {encoding}")]
    UnmappablePattern {
        /// Role of the pattern in the dialect
        what: &'static str,
        /// Pattern as given in the configuration
        pattern: String,
        /// Name of the declared encoding
        encoding: &'static str,
    },

    /// The dialect configuration does not make sense.
    #[error("invalid dialect: {details}")]
    InvalidDialect {
        /// What is wrong with it
        details: Cow<'static, str>,
    },

    /// A row terminator does not belong to the declared file format.
    #[error("{found} line terminator found in {expected} data")]
    LineTerminator {
        /// Declared file format
        expected: FileFormat,
        /// Offending terminator
        found: &'static str,
    },

    /// A worker was given an ordinal outside of `[0, count)`.
    #[error("invalid worker {ordinal} for a worker count of {count}")]
    InvalidWorker {
        /// Ordinal of the worker
        ordinal: usize,
        /// Total number of workers
        count: usize,
    },

    /// The computed start offset of a worker does not fit the file it
    /// designates, typically because the file changed since its size was
    /// measured.
    #[error("cannot start reading {} at byte {offset}: file is {len} bytes long", path.display())]
    Partition {
        /// File the worker should start in
        path: PathBuf,
        /// Computed offset within this file
        offset: u64,
        /// Actual length of the file
        len: u64,
    },

    /// A field could not be converted and error handling is disabled. Only
    /// the first failure of the row is reported.
    #[error("row {row}, field {field}: {source} ({count} conversion error(s) on this row)")]
    Conversion {
        /// Row number within the current file
        row: u64,
        /// Index of the field in the output schema
        field: usize,
        /// Number of failed fields on this row
        count: usize,
        /// First failure
        source: ConversionError,
    },
}

/// An error occurring when configuring or reading CSV data.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self(kind)
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
            kind => Self::other(Error(kind)),
        }
    }
}

/// A type alias for `Result<T, partitioned_csv::Error>`.
pub type Result<T> = result::Result<T, Error>;
