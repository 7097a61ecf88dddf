//! One spine item's pages, built once and read back from the cache.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use epub_pager::{stream_text_blocks, BlockSink, Book, TextBlock};

use crate::cache::{remove_dir_if_exists, remove_file_quiet, write_file_atomic, BookCache, SectionMetadata};
use crate::error::RenderError;
use crate::layout::{FontMetrics, LayoutParams, Paginator, Viewport};
use crate::page::Page;

/// Compressed bytes read per step while streaming a section out of the
/// archive.
pub const STREAM_CHUNK_BYTES: usize = 1024;

/// The paginated form of one spine item.
#[derive(Clone, Debug)]
pub struct Section {
    spine_index: usize,
    dir: PathBuf,
    scratch_dir: PathBuf,
    page_count: usize,
    /// Reading cursor. Not part of the cached content.
    pub current_page: usize,
}

impl Section {
    pub fn new(cache: &BookCache, book: &Book, spine_index: usize) -> Self {
        Self {
            spine_index,
            dir: cache.section_dir(book, spine_index),
            scratch_dir: cache.book_dir(book),
            page_count: 0,
            current_page: 0,
        }
    }

    pub fn spine_index(&self) -> usize {
        self.spine_index
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Cache directory of this section.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Adopt the cached pages if they were built with `params`.
    ///
    /// Returns `false` when there is no usable cache. A cache built with other
    /// parameters, another format version or an unreadable `section.bin` is
    /// deleted first.
    pub fn load_cache_metadata(&mut self, params: &LayoutParams) -> Result<bool, RenderError> {
        let path = SectionMetadata::path(&self.dir);
        if !path.exists() {
            return Ok(false);
        }

        let file = File::open(&path)?;
        let meta = match SectionMetadata::read_from(&mut BufReader::new(file)) {
            Ok(meta) => meta,
            Err(RenderError::CacheFormat(err)) => {
                log::warn!("section {} cache unreadable ({}); rebuilding", self.spine_index, err);
                self.clear_cache()?;
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        if !meta.params.matches(params) {
            log::debug!("section {} cache built with other parameters", self.spine_index);
            self.clear_cache()?;
            return Ok(false);
        }

        self.page_count = meta.page_count;
        log::debug!(
            "section {} cache hit: {} pages",
            self.spine_index,
            self.page_count
        );
        Ok(true)
    }

    /// Stream the section's markup out of the archive, paginate it and
    /// persist every page followed by the metadata. Returns the page count.
    ///
    /// Pages are written as they complete; only one is held in memory.
    pub fn build<M: FontMetrics + ?Sized>(
        &mut self,
        book: &Book,
        metrics: &M,
        viewport: Viewport,
        params: &LayoutParams,
    ) -> Result<usize, RenderError> {
        let item = book
            .spine_item(self.spine_index)
            .ok_or(RenderError::SpineIndexOutOfRange {
                index: self.spine_index,
                len: book.spine().len(),
            })?;

        self.clear_cache()?;
        fs::create_dir_all(&self.dir)?;
        fs::create_dir_all(&self.scratch_dir)?;

        let temp_html = self
            .scratch_dir
            .join(format!(".tmp_{}.html", self.spine_index));
        let result = self.build_from_temp(book, &item.href, &temp_html, metrics, viewport, params);
        remove_file_quiet(&temp_html);
        let page_count = result?;

        let meta = SectionMetadata {
            params: *params,
            page_count,
        };
        write_file_atomic(&SectionMetadata::path(&self.dir), |out| meta.write_to(out))?;
        self.page_count = page_count;
        log::debug!(
            "section {} built: {} pages from {}",
            self.spine_index,
            page_count,
            item.href
        );
        Ok(page_count)
    }

    fn build_from_temp<M: FontMetrics + ?Sized>(
        &self,
        book: &Book,
        href: &str,
        temp_html: &Path,
        metrics: &M,
        viewport: Viewport,
        params: &LayoutParams,
    ) -> Result<usize, RenderError> {
        {
            let mut out = BufWriter::new(File::create(temp_html)?);
            book.read_item_to_sink(href, &mut out, STREAM_CHUNK_BYTES)?;
            out.into_inner().map_err(|err| err.into_error())?.sync_all()?;
        }

        let dir = self.dir.as_path();
        let mut next_index = 0usize;
        let mut sink = PaginatingSink {
            paginator: Paginator::new(metrics, viewport, *params),
            on_page: |page: Page| -> Result<(), RenderError> {
                write_file_atomic(&page_path(dir, next_index), |out| page.write_to(out))?;
                next_index += 1;
                Ok(())
            },
        };
        let input = BufReader::new(File::open(temp_html)?);
        stream_text_blocks(input, &mut sink)?;
        let PaginatingSink {
            paginator,
            mut on_page,
        } = sink;
        paginator.finish(&mut on_page)
    }

    /// Read one page back from the cache.
    pub fn load_page(&self, index: usize) -> Result<Page, RenderError> {
        let file = File::open(page_path(&self.dir, index))?;
        Page::read_from(&mut BufReader::new(file))
    }

    /// Delete this section's cache directory. A missing directory is fine.
    pub fn clear_cache(&self) -> Result<(), RenderError> {
        remove_dir_if_exists(&self.dir)
    }
}

fn page_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("page_{}.bin", index))
}

/// Feeds parsed blocks straight into the paginator.
struct PaginatingSink<'a, M: FontMetrics + ?Sized, F> {
    paginator: Paginator<'a, M>,
    on_page: F,
}

impl<M, F> BlockSink for PaginatingSink<'_, M, F>
where
    M: FontMetrics + ?Sized,
    F: FnMut(Page) -> Result<(), RenderError>,
{
    type Error = RenderError;

    fn push_block(&mut self, block: TextBlock) -> Result<(), RenderError> {
        self.paginator.push_block(block, &mut self.on_page)
    }
}
