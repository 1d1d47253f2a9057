use std::path::PathBuf;

use crate::constants::MetricKind;

/// Custom Result type for interop operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the interop library, encompassing all possible error cases
/// that can occur while decoding, encoding, or post-processing metric files.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// The byte stream does not follow any known layout (corrupt or unsupported)
    FormatError(#[from] FormatError),
    /// Errors that occur while locating or reading metric files
    ReadError(#[from] ReadError),
    /// Errors that occur during write operations
    WriteError(#[from] WriteError),
    /// Errors raised by queries and derived computations on a metric set
    MetricError(#[from] MetricError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// True if the error means the bytes are corrupt or of an unsupported version
    #[must_use]
    pub fn is_bad_format(&self) -> bool {
        matches!(self, Self::FormatError(_))
    }

    /// True if the error means the data ended early
    ///
    /// An empty file is treated as the degenerate case of an incomplete one,
    /// since both occur while an instrument is still writing.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Self::ReadError(
                ReadError::EmptyFile
                    | ReadError::IncompleteFile { .. }
                    | ReadError::IncompleteFiles(_)
            )
        )
    }

    #[must_use]
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, Self::ReadError(ReadError::FileNotFound(_)))
    }
}

/// Errors raised when the bytes do not match the expected layout
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// No codec is registered for the version byte found at the start of the stream
    #[error("No format found to parse {kind} metrics with version: {version}")]
    UnknownVersion { kind: MetricKind, version: u8 },

    /// The record size declared in the header disagrees with the layout of the version
    #[error("Record size does not match layout size, record size: {declared} != layout size: {layout}")]
    LayoutSizeMismatch { declared: usize, layout: usize },

    /// A decoded record consumed a different number of bytes than the header declared
    #[error("Record does not match expected size: {got} != {expected}")]
    RecordSizeMismatch { expected: usize, got: usize },

    /// A tile record carried a code outside of the known set
    #[error("Unexpected tile code: {0}")]
    UnexpectedTileCode(u16),

    /// An image record addressed a channel beyond the supported maximum
    #[error("Channel index ({channel}) exceeds the maximum number of channels ({max})")]
    InvalidChannel { channel: u16, max: usize },

    /// A q-score bin points outside of the 50-slot histogram
    #[error("Q-score bin value ({0}) is outside of the histogram")]
    InvalidBinValue(u16),

    /// A bin table holds more bins than its one-byte count can express
    #[error("Q-score bin count ({0}) does not fit the bin table")]
    InvalidBinCount(usize),

    /// The record size of a layout does not fit the one-byte size field
    #[error("Record size ({0}) does not fit the record size field")]
    RecordSizeOverflow(usize),
}

/// Errors that can occur while reading metric data
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The requested metric file does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Not even the version byte could be read
    #[error("File is empty: no version byte available")]
    EmptyFile,

    /// The data ended before a complete header or record was read
    ///
    /// # Fields
    /// * `got` - The number of bytes available for the partial unit
    /// * `expected` - The number of bytes required to complete it
    #[error("Insufficient data read from the file, got: {got} != expected: {expected}")]
    IncompleteFile { got: usize, expected: usize },

    /// One or more files in a multi-file read ended early and were skipped
    #[error("Incomplete metric files were skipped: {0:?}")]
    IncompleteFiles(Vec<PathBuf>),
}

/// Errors that can occur while writing metric data
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The caller supplied buffer cannot hold the encoded set
    #[error("Output buffer too small: {got} bytes available, {expected} bytes required")]
    BufferTooSmall { expected: usize, got: usize },

    /// A string field exceeds the 16-bit length prefix
    #[error("String field of length {0} does not fit a 16-bit length prefix")]
    StringTooLong(usize),

    /// A coordinate of the identity does not fit its 16-bit field
    #[error("Identity does not fit 16-bit fields, lane: {lane}, tile: {tile}, cycle: {cycle}")]
    IdentityOutOfRange { lane: u32, tile: u32, cycle: u32 },

    /// A histogram does not have the number of slots the layout requires
    #[error("Histogram has {got} slots but the layout requires {expected}")]
    HistogramLength { expected: usize, got: usize },
}

/// Errors raised by metric set queries and derived computations
#[derive(thiserror::Error, Debug)]
pub enum MetricError {
    /// No record exists for the requested identity
    #[error("No metric found for lane: {lane}, tile: {tile}, cycle: {cycle}")]
    IndexOutOfBounds { lane: u32, tile: u32, cycle: u32 },

    /// Two records of the same tile share a cycle, so no cumulative order exists
    #[error("Cycles are not strictly increasing for lane: {lane}, tile: {tile} at cycle: {cycle}")]
    NonIncreasingCycle { lane: u32, tile: u32, cycle: u32 },
}
