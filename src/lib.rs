//! Streaming EPUB ingestion for page-cached e-reader layout.
//!
//! `epub-pager` opens an EPUB archive, parses its package and navigation
//! documents into a [`Book`] and turns section markup into styled
//! [`TextBlock`]s without ever building a DOM. Pagination and the on-disk
//! page cache live in `epub-pager-render`.
//!
//! ```no_run
//! use epub_pager::{parse_text_blocks, Book};
//!
//! let book = Book::open("book.epub")?;
//! println!("{} ({} sections)", book.title(), book.spine().len());
//! if let Some(first) = book.spine_item(0) {
//!     let html = book.read_item_to_memory(&first.href, false)?;
//!     for block in parse_text_blocks(&html)? {
//!         println!("{}", block.text());
//!     }
//! }
//! # Ok::<(), epub_pager::EpubError>(())
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod book;
pub mod error;
pub mod html_flow;
pub mod navigation;
pub mod package;
pub mod path;
pub mod text_block;
mod xml;
pub mod zip;

pub use book::{Book, OpenOptions, SpineItem, CONTAINER_PATH};
pub use error::{ArchiveError, EpubError};
pub use html_flow::{
    parse_text_blocks, stream_text_blocks, BlockSink, FlowParser, TagKind, MAX_WORD_BYTES,
};
pub use navigation::{NavigationLimits, TocEntry};
pub use path::normalize_path;
pub use text_block::{BlockStyle, TextBlock, WordStyle};
pub use zip::{ZipArchive, ZipEntry, ZipLimits};
