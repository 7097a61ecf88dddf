use core::fmt;
use std::io;

use epub_pager::EpubError;

/// A page or section file that does not match the expected binary layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheFormatError {
    UnknownVersion { found: u8, expected: u8 },
    /// Element tag other than the line tag.
    UnknownTag(u8),
    /// Block word count above the per-block sanity cap.
    WordCountTooLarge(u16),
    /// Length prefix above the per-string sanity cap.
    StringTooLong(u32),
    /// A block whose parallel word, position and style lists disagree.
    LengthMismatch {
        words: usize,
        positions: usize,
        styles: usize,
    },
    UnknownStyle(u8),
    /// The file ended inside a record.
    Truncated,
}

impl fmt::Display for CacheFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVersion { found, expected } => {
                write!(f, "unknown cache version {} (expected {})", found, expected)
            }
            Self::UnknownTag(tag) => write!(f, "unknown page element tag {}", tag),
            Self::WordCountTooLarge(count) => write!(f, "word count {} exceeds maximum", count),
            Self::StringTooLong(len) => write!(f, "string length {} exceeds maximum", len),
            Self::LengthMismatch {
                words,
                positions,
                styles,
            } => write!(
                f,
                "block size mismatch (words={} xpos={} styles={})",
                words, positions, styles
            ),
            Self::UnknownStyle(value) => write!(f, "unknown style value {}", value),
            Self::Truncated => write!(f, "cache file truncated"),
        }
    }
}

impl std::error::Error for CacheFormatError {}

/// Errors raised while paginating, caching or reading back pages.
#[derive(Debug)]
pub enum RenderError {
    Epub(EpubError),
    CacheFormat(CacheFormatError),
    Io(io::Error),
    SpineIndexOutOfRange { index: usize, len: usize },
    /// Another thread panicked while holding the reader state.
    LockPoisoned,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epub(err) => write!(f, "{}", err),
            Self::CacheFormat(err) => write!(f, "cache format error: {}", err),
            Self::Io(err) => write!(f, "cache I/O error: {}", err),
            Self::SpineIndexOutOfRange { index, len } => {
                write!(f, "spine index {} out of range ({} items)", index, len)
            }
            Self::LockPoisoned => write!(f, "reader state lock poisoned"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Epub(err) => Some(err),
            Self::CacheFormat(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EpubError> for RenderError {
    fn from(value: EpubError) -> Self {
        Self::Epub(value)
    }
}

impl From<CacheFormatError> for RenderError {
    fn from(value: CacheFormatError) -> Self {
        Self::CacheFormat(value)
    }
}

impl From<io::Error> for RenderError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
