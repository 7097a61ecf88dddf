//! Error types for archive access, package parsing and markup streaming.

use core::fmt;
use std::io;

/// Failures raised while reading entries out of the zip container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// No central directory record carries this name.
    EntryNotFound(String),
    /// The entry uses a compression method other than stored or DEFLATE.
    UnsupportedCompression { entry: String, method: u16 },
    /// Encryption, ZIP64 and multi-disk archives are not handled.
    UnsupportedFeature(String),
    /// A signature or fixed-size record did not parse.
    CorruptHeader(String),
    /// Compressed input ran out before the inflater reported completion.
    TruncatedStream,
    /// Bytes produced differ from the size recorded in the directory.
    SizeMismatch {
        entry: String,
        expected: u64,
        actual: u64,
    },
    /// CRC-32 of the produced bytes differs from the directory record.
    ChecksumMismatch { entry: String },
    /// One-shot extraction refused because the entry exceeds the byte cap.
    EntryTooLarge {
        entry: String,
        size: u64,
        limit: usize,
    },
    /// The inflater reported a negative status.
    Inflate(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::EntryNotFound(name) => write!(f, "entry not found: {}", name),
            ArchiveError::UnsupportedCompression { entry, method } => {
                write!(f, "unsupported compression method {} for {}", method, entry)
            }
            ArchiveError::UnsupportedFeature(what) => write!(f, "unsupported zip feature: {}", what),
            ArchiveError::CorruptHeader(msg) => write!(f, "corrupt zip header: {}", msg),
            ArchiveError::TruncatedStream => write!(f, "compressed stream ended early"),
            ArchiveError::SizeMismatch {
                entry,
                expected,
                actual,
            } => write!(
                f,
                "size mismatch for {}: expected {} bytes, got {}",
                entry, expected, actual
            ),
            ArchiveError::ChecksumMismatch { entry } => write!(f, "crc32 mismatch for {}", entry),
            ArchiveError::EntryTooLarge { entry, size, limit } => write!(
                f,
                "entry {} is {} bytes, exceeds max_entry_bytes ({})",
                entry, size, limit
            ),
            ArchiveError::Inflate(msg) => write!(f, "inflate failed: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Top-level error for opening a book and streaming its content.
#[derive(Debug)]
pub enum EpubError {
    /// Zip container failure.
    Archive(ArchiveError),
    /// Missing or malformed container.xml, package document or navigation.
    Container(String),
    /// Section markup could not be tokenized.
    Markup(String),
    /// Storage failure while reading or writing.
    Io(io::Error),
    /// A parser or buffer could not be sized for the input.
    LayoutAllocation(String),
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubError::Archive(err) => write!(f, "archive error: {}", err),
            EpubError::Container(msg) => write!(f, "container error: {}", msg),
            EpubError::Markup(msg) => write!(f, "markup error: {}", msg),
            EpubError::Io(err) => write!(f, "I/O error: {}", err),
            EpubError::LayoutAllocation(msg) => write!(f, "allocation error: {}", msg),
        }
    }
}

impl std::error::Error for EpubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EpubError::Archive(err) => Some(err),
            EpubError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArchiveError> for EpubError {
    fn from(err: ArchiveError) -> Self {
        EpubError::Archive(err)
    }
}

impl From<io::Error> for EpubError {
    fn from(err: io::Error) -> Self {
        EpubError::Io(err)
    }
}
