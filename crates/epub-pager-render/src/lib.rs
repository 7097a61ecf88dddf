//! Pagination engine and page cache for `epub-pager`.
//!
//! A [`Section`] streams one spine item out of the archive, runs it through
//! the flow parser and the [`Paginator`], and persists every page as it is
//! completed. Later opens with the same [`LayoutParams`] read pages straight
//! from the cache. [`BookReader`] wraps this in a lock-guarded reading
//! session.

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

mod cache;
mod error;
mod layout;
mod page;
mod reader;
mod section;

pub use cache::{BookCache, SectionMetadata, SECTION_FILE_VERSION};
pub use error::{CacheFormatError, RenderError};
pub use layout::{wrap_greedy, FontMetrics, LayoutParams, Paginator, Viewport};
pub use page::{
    Page, PageLine, MAX_STRING_BYTES, MAX_WORDS_PER_BLOCK, PAGE_FILE_VERSION, TAG_LINE,
};
pub use reader::{BookReader, PageView};
pub use section::{Section, STREAM_CHUNK_BYTES};
