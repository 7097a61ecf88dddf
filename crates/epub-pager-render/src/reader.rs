//! Reading session over one book.

use std::sync::{Mutex, MutexGuard};

use epub_pager::Book;

use crate::cache::BookCache;
use crate::error::RenderError;
use crate::layout::{FontMetrics, LayoutParams, Viewport};
use crate::page::Page;
use crate::section::Section;

/// What the reader should show for the current position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageView {
    Page(Page),
    /// The section has no text.
    EmptyChapter,
    /// The cursor points past the section's pages.
    OutOfBounds { page: usize, page_count: usize },
}

/// Page to select once the next section is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingPage {
    Index(usize),
    Last,
}

#[derive(Debug)]
struct ReaderState {
    spine_index: usize,
    params: LayoutParams,
    section: Option<Section>,
    pending: PendingPage,
}

/// A book, its cache and the reading position.
///
/// All state lives behind one mutex. Loading, building and discarding the
/// current [`Section`] happen while it is held, so a concurrent
/// [`current_page`](Self::current_page) never sees a half-replaced section.
pub struct BookReader<M: FontMetrics> {
    book: Book,
    cache: BookCache,
    metrics: M,
    viewport: Viewport,
    state: Mutex<ReaderState>,
}

impl<M: FontMetrics> BookReader<M> {
    /// Start reading at the saved position, or at the beginning.
    pub fn open(
        book: Book,
        cache: BookCache,
        metrics: M,
        viewport: Viewport,
        params: LayoutParams,
    ) -> Result<Self, RenderError> {
        let (spine_index, page) = cache.load_progress(&book)?.unwrap_or((0, 0));
        let spine_index = if spine_index < book.spine().len() {
            spine_index
        } else {
            0
        };
        Ok(Self {
            book,
            cache,
            metrics,
            viewport,
            state: Mutex::new(ReaderState {
                spine_index,
                params,
                section: None,
                pending: PendingPage::Index(page),
            }),
        })
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn cache(&self) -> &BookCache {
        &self.cache
    }

    /// Current `(spine_index, page)`. The page is the pending one when the
    /// section has not been loaded yet.
    pub fn position(&self) -> Result<(usize, usize), RenderError> {
        let state = self.lock()?;
        let page = match (&state.section, state.pending) {
            (Some(section), _) => section.current_page,
            (None, PendingPage::Index(page)) => page,
            (None, PendingPage::Last) => 0,
        };
        Ok((state.spine_index, page))
    }

    /// Load (building if needed) the current section and return the page
    /// under the cursor. The position is saved on success.
    pub fn current_page(&self) -> Result<PageView, RenderError> {
        let mut state = self.lock()?;
        let spine_index = state.spine_index;
        let section = self.ensure_section(&mut state)?;

        if section.page_count() == 0 {
            return Ok(PageView::EmptyChapter);
        }
        if section.current_page >= section.page_count() {
            log::warn!(
                "page {} out of bounds ({} pages)",
                section.current_page,
                section.page_count()
            );
            return Ok(PageView::OutOfBounds {
                page: section.current_page,
                page_count: section.page_count(),
            });
        }

        let page = section.load_page(section.current_page)?;
        if page.is_empty() && section.page_count() == 1 {
            return Ok(PageView::EmptyChapter);
        }
        self.cache
            .save_progress(&self.book, spine_index, section.current_page)?;
        Ok(PageView::Page(page))
    }

    /// Advance one page, moving into the next section at a section's end.
    /// Does nothing on the last page of the book.
    pub fn next_page(&self) -> Result<(), RenderError> {
        let mut state = self.lock()?;
        let section = self.ensure_section(&mut state)?;
        if section.current_page + 1 < section.page_count() {
            section.current_page += 1;
            return Ok(());
        }
        let next = state.spine_index + 1;
        if next < self.book.spine().len() {
            Self::swap_section(&mut state, next, PendingPage::Index(0));
        }
        Ok(())
    }

    /// Go back one page, moving to the last page of the previous section at
    /// a section's start. Does nothing on the first page of the book.
    pub fn prev_page(&self) -> Result<(), RenderError> {
        let mut state = self.lock()?;
        let section = self.ensure_section(&mut state)?;
        if section.current_page > 0 {
            section.current_page -= 1;
            return Ok(());
        }
        if state.spine_index > 0 {
            let prev = state.spine_index - 1;
            Self::swap_section(&mut state, prev, PendingPage::Last);
        }
        Ok(())
    }

    /// Jump to the first page of the section a TOC entry points at.
    pub fn jump_to_toc(&self, toc_index: usize) -> Result<(), RenderError> {
        let spine_index = self.book.spine_index_for_toc(toc_index);
        self.jump_to_spine(spine_index)
    }

    pub fn jump_to_spine(&self, spine_index: usize) -> Result<(), RenderError> {
        let len = self.book.spine().len();
        if spine_index >= len {
            return Err(RenderError::SpineIndexOutOfRange {
                index: spine_index,
                len,
            });
        }
        let mut state = self.lock()?;
        Self::swap_section(&mut state, spine_index, PendingPage::Index(0));
        Ok(())
    }

    /// Change layout parameters. The current section is reloaded on the next
    /// access and rebuilt if its cache no longer matches.
    pub fn set_layout_params(&self, params: LayoutParams) -> Result<(), RenderError> {
        let mut state = self.lock()?;
        if state.params.matches(&params) {
            return Ok(());
        }
        state.params = params;
        let spine_index = state.spine_index;
        Self::swap_section(&mut state, spine_index, PendingPage::Index(0));
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ReaderState>, RenderError> {
        self.state.lock().map_err(|_| RenderError::LockPoisoned)
    }

    fn swap_section(state: &mut ReaderState, spine_index: usize, pending: PendingPage) {
        state.section = None;
        state.spine_index = spine_index;
        state.pending = pending;
    }

    fn ensure_section<'s>(&self, state: &'s mut ReaderState) -> Result<&'s mut Section, RenderError> {
        let section = match state.section.take() {
            Some(section) => section,
            None => {
                let mut section = Section::new(&self.cache, &self.book, state.spine_index);
                if !section.load_cache_metadata(&state.params)? {
                    log::debug!("section {} not cached; building", state.spine_index);
                    section.build(&self.book, &self.metrics, self.viewport, &state.params)?;
                }
                section.current_page = match state.pending {
                    PendingPage::Index(page) => page,
                    PendingPage::Last => section.page_count().saturating_sub(1),
                };
                section
            }
        };
        Ok(state.section.insert(section))
    }
}
