//! Line wrapping and page breaking.

use epub_pager::{BlockStyle, TextBlock, WordStyle};
use smallvec::SmallVec;

use crate::page::{Page, PageLine};

/// Text measurement supplied by the font backend.
pub trait FontMetrics {
    /// Natural line height of a font in pixels.
    fn line_height(&self, font_id: i32) -> i32;

    /// Rendered width of `text` in pixels.
    fn measure(&self, font_id: i32, text: &str, style: WordStyle) -> i32;

    /// Width of the inter-word gap.
    ///
    /// Default measures a single regular space.
    fn space_width(&self, font_id: i32) -> i32 {
        self.measure(font_id, " ", WordStyle::Regular)
    }

    /// Split a block into one block per physical line, filling in
    /// `word_xpos` relative to the line's left edge.
    ///
    /// Default is [`wrap_greedy`].
    fn wrap_text_block(&self, font_id: i32, block: TextBlock, max_width: i32) -> Vec<TextBlock> {
        wrap_greedy(self, font_id, block, max_width)
    }
}

/// Greedy line filling.
///
/// Justified lines other than the last spread their slack over the word
/// gaps. Centered lines are offset by half the slack. A word wider than
/// `max_width` gets a line to itself.
pub fn wrap_greedy<M: FontMetrics + ?Sized>(
    metrics: &M,
    font_id: i32,
    block: TextBlock,
    max_width: i32,
) -> Vec<TextBlock> {
    let style = block.style;
    let space = metrics.space_width(font_id).max(0);
    let widths: SmallVec<[i32; 32]> = block
        .iter()
        .map(|(word, word_style)| metrics.measure(font_id, word, word_style).max(0))
        .collect();

    // Word index ranges, one per line.
    let mut breaks: SmallVec<[(usize, usize); 16]> = SmallVec::new();
    let mut start = 0usize;
    let mut line_width = 0i32;
    for (i, &width) in widths.iter().enumerate() {
        if i == start {
            line_width = width;
            continue;
        }
        let next = line_width.saturating_add(space).saturating_add(width);
        if next > max_width {
            breaks.push((start, i));
            start = i;
            line_width = width;
        } else {
            line_width = next;
        }
    }
    if start < widths.len() {
        breaks.push((start, widths.len()));
    }

    let line_count = breaks.len();
    let mut words = block.words.into_iter();
    let mut styles = block.word_styles.into_iter();
    let mut lines = Vec::with_capacity(line_count);

    for (line_index, &(from, to)) in breaks.iter().enumerate() {
        let count = to - from;
        let line_widths = &widths[from..to];
        let words_width: i32 = line_widths.iter().sum();
        let natural = words_width.saturating_add(space.saturating_mul(count as i32 - 1));
        let is_last = line_index + 1 == line_count;

        let (mut x, gap, mut remainder) = match style {
            BlockStyle::CenterAligned => ((max_width - natural).max(0) / 2, space, 0),
            BlockStyle::Justified if !is_last && count > 1 => {
                let slack = (max_width - words_width).max(0);
                let gaps = count as i32 - 1;
                (0, slack / gaps, slack % gaps)
            }
            BlockStyle::Justified => (0, space, 0),
        };

        let mut line = TextBlock::new(style);
        line.word_xpos.reserve(count);
        for &width in line_widths {
            let (Some(word), Some(word_style)) = (words.next(), styles.next()) else {
                break;
            };
            line.push_word(word, word_style);
            line.word_xpos.push(clamp_xpos(x));
            x = x.saturating_add(width).saturating_add(gap);
            if remainder > 0 {
                x += 1;
                remainder -= 1;
            }
        }
        lines.push(line);
    }
    lines
}

fn clamp_xpos(x: i32) -> u16 {
    u16::try_from(x.max(0)).unwrap_or(u16::MAX)
}

/// The six parameters a cached section is keyed on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutParams {
    pub font_id: i32,
    /// Multiplier applied to the font's natural line height.
    pub line_compression: f32,
    pub margin_top: i32,
    pub margin_right: i32,
    pub margin_bottom: i32,
    pub margin_left: i32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            font_id: 0,
            line_compression: 0.95,
            margin_top: 11,
            margin_right: 10,
            margin_bottom: 30,
            margin_left: 10,
        }
    }
}

impl LayoutParams {
    /// Exact comparison, with the compression factor compared bit for bit.
    pub fn matches(&self, other: &LayoutParams) -> bool {
        self.font_id == other.font_id
            && self.line_compression.to_bits() == other.line_compression.to_bits()
            && self.margin_top == other.margin_top
            && self.margin_right == other.margin_right
            && self.margin_bottom == other.margin_bottom
            && self.margin_left == other.margin_left
    }
}

/// Physical screen size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub content_width: i32,
    pub screen_height: i32,
}

impl Viewport {
    pub fn new(content_width: i32, screen_height: i32) -> Self {
        Self {
            content_width,
            screen_height,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(480, 800)
    }
}

/// Streams blocks into pages.
///
/// At most one page is open at a time. Finished pages are handed to the
/// caller's `on_page` callback in index order and never retained.
pub struct Paginator<'a, M: FontMetrics + ?Sized> {
    metrics: &'a M,
    params: LayoutParams,
    line_height: i32,
    page_height: i32,
    available_width: i32,
    current: Option<Page>,
    cursor_y: i32,
    pages_emitted: usize,
}

impl<'a, M: FontMetrics + ?Sized> Paginator<'a, M> {
    pub fn new(metrics: &'a M, viewport: Viewport, params: LayoutParams) -> Self {
        let natural = metrics.line_height(params.font_id) as f32;
        Self {
            metrics,
            params,
            line_height: ((natural * params.line_compression) as i32).max(1),
            page_height: viewport.screen_height - params.margin_top - params.margin_bottom,
            available_width: viewport.content_width - params.margin_left - params.margin_right,
            current: None,
            cursor_y: params.margin_top,
            pages_emitted: 0,
        }
    }

    /// Effective line advance after compression.
    pub fn line_height(&self) -> i32 {
        self.line_height
    }

    pub fn available_width(&self) -> i32 {
        self.available_width
    }

    pub fn pages_emitted(&self) -> usize {
        self.pages_emitted
    }

    /// Lay out one block, delivering every page it fills.
    pub fn push_block<F, E>(&mut self, block: TextBlock, on_page: &mut F) -> Result<(), E>
    where
        F: FnMut(Page) -> Result<(), E>,
    {
        let lines = self
            .metrics
            .wrap_text_block(self.params.font_id, block, self.available_width);

        for line in lines {
            let page_has_lines = self.current.as_ref().is_some_and(|page| !page.is_empty());
            if page_has_lines && self.cursor_y + self.line_height > self.page_height {
                self.complete_page(on_page)?;
            }
            let x = self.params.margin_left;
            let y = self.cursor_y;
            self.open_page().elements.push(PageLine { block: line, x, y });
            self.cursor_y += self.line_height;
        }
        if self.current.is_none() {
            self.open_page();
        }
        self.cursor_y += self.line_height / 2;

        std::thread::yield_now();
        Ok(())
    }

    /// Deliver the open page. An input with no blocks at all still yields a
    /// single empty page. Returns the total number of pages delivered.
    pub fn finish<F, E>(mut self, on_page: &mut F) -> Result<usize, E>
    where
        F: FnMut(Page) -> Result<(), E>,
    {
        if self.current.is_none() && self.pages_emitted == 0 {
            self.open_page();
        }
        if self.current.is_some() {
            self.complete_page(on_page)?;
        }
        Ok(self.pages_emitted)
    }

    fn open_page(&mut self) -> &mut Page {
        if self.current.is_none() {
            self.cursor_y = self.params.margin_top;
        }
        self.current.get_or_insert_with(Page::default)
    }

    fn complete_page<F, E>(&mut self, on_page: &mut F) -> Result<(), E>
    where
        F: FnMut(Page) -> Result<(), E>,
    {
        if let Some(page) = self.current.take() {
            on_page(page)?;
            self.pages_emitted += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character advances 10px, bold adds 1px per character.
    struct FixedMetrics {
        line_height: i32,
    }

    impl FontMetrics for FixedMetrics {
        fn line_height(&self, _font_id: i32) -> i32 {
            self.line_height
        }

        fn measure(&self, _font_id: i32, text: &str, style: WordStyle) -> i32 {
            let per_char = if style.is_bold() { 11 } else { 10 };
            text.chars().count() as i32 * per_char
        }
    }

    fn block(words: &[&str], style: BlockStyle) -> TextBlock {
        let mut block = TextBlock::new(style);
        for word in words {
            block.push_word(*word, WordStyle::Regular);
        }
        block
    }

    fn params(margin: i32) -> LayoutParams {
        LayoutParams {
            font_id: 0,
            line_compression: 1.0,
            margin_top: margin,
            margin_right: margin,
            margin_bottom: margin,
            margin_left: margin,
        }
    }

    fn collect(
        metrics: &FixedMetrics,
        viewport: Viewport,
        params: LayoutParams,
        blocks: Vec<TextBlock>,
    ) -> Vec<Page> {
        let mut pages = Vec::new();
        let mut on_page = |page: Page| -> Result<(), ()> {
            pages.push(page);
            Ok(())
        };
        let mut paginator = Paginator::new(metrics, viewport, params);
        for b in blocks {
            paginator.push_block(b, &mut on_page).unwrap();
        }
        let count = paginator.finish(&mut on_page).unwrap();
        assert_eq!(count, pages.len());
        pages
    }

    #[test]
    fn test_wrap_fits_on_one_line() {
        let metrics = FixedMetrics { line_height: 20 };
        let lines = metrics.wrap_text_block(0, block(&["ab", "cd"], BlockStyle::Justified), 100);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].word_xpos, vec![0, 30]);
    }

    #[test]
    fn test_wrap_justifies_all_but_last_line() {
        let metrics = FixedMetrics { line_height: 20 };
        // "aaa bbb" = 70px fits in 80, "ccc" starts the second line.
        let lines = metrics.wrap_text_block(0, block(&["aaa", "bbb", "ccc"], BlockStyle::Justified), 80);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].words, vec!["aaa", "bbb"]);
        assert_eq!(lines[0].word_xpos, vec![0, 50]);
        assert_eq!(lines[1].words, vec!["ccc"]);
        assert_eq!(lines[1].word_xpos, vec![0]);
    }

    #[test]
    fn test_wrap_centers_lines() {
        let metrics = FixedMetrics { line_height: 20 };
        let lines = metrics.wrap_text_block(0, block(&["ab"], BlockStyle::CenterAligned), 100);
        assert_eq!(lines[0].word_xpos, vec![40]);
        assert_eq!(lines[0].style, BlockStyle::CenterAligned);
    }

    #[test]
    fn test_wrap_oversized_word_gets_own_line() {
        let metrics = FixedMetrics { line_height: 20 };
        let lines = metrics.wrap_text_block(
            0,
            block(&["a", "abcdefghijklmnop", "b"], BlockStyle::Justified),
            50,
        );
        let words: Vec<_> = lines.iter().map(|l| l.words.clone()).collect();
        assert_eq!(words, vec![vec!["a"], vec!["abcdefghijklmnop"], vec!["b"]]);
    }

    #[test]
    fn test_wrap_keeps_word_styles() {
        let metrics = FixedMetrics { line_height: 20 };
        let mut input = TextBlock::new(BlockStyle::Justified);
        input.push_word("bold", WordStyle::Bold);
        input.push_word("plain", WordStyle::Regular);
        let lines = metrics.wrap_text_block(0, input, 500);
        assert_eq!(lines[0].word_styles, vec![WordStyle::Bold, WordStyle::Regular]);
        assert_eq!(lines[0].word_xpos, vec![0, 54]);
    }

    #[test]
    fn test_single_block_single_page() {
        let metrics = FixedMetrics { line_height: 20 };
        let pages = collect(
            &metrics,
            Viewport::new(480, 800),
            params(10),
            vec![block(&["Hello", "world"], BlockStyle::Justified)],
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].elements.len(), 1);
        let line = &pages[0].elements[0];
        assert_eq!((line.x, line.y), (10, 10));
        assert_eq!(line.block.words, vec!["Hello", "world"]);
    }

    #[test]
    fn test_page_break_and_block_spacing() {
        let metrics = FixedMetrics { line_height: 20 };
        // page_height = 100 - 10 - 10 = 80; lines at y = 10, 30, 50 fit, 70 + 20 > 80 breaks.
        let blocks = (0..5)
            .map(|_| block(&["x"], BlockStyle::Justified))
            .collect();
        let pages = collect(&metrics, Viewport::new(200, 100), params(10), blocks);
        let ys: Vec<Vec<i32>> = pages
            .iter()
            .map(|p| p.elements.iter().map(|l| l.y).collect())
            .collect();
        assert_eq!(ys, vec![vec![10, 40], vec![10, 40], vec![10]]);
    }

    #[test]
    fn test_line_compression_scales_advance() {
        let metrics = FixedMetrics { line_height: 20 };
        let mut p = params(0);
        p.line_compression = 0.5;
        let paginator = Paginator::new(&metrics, Viewport::new(100, 100), p);
        assert_eq!(paginator.line_height(), 10);
        assert_eq!(paginator.available_width(), 100);
    }

    #[test]
    fn test_no_blocks_still_yields_one_page() {
        let metrics = FixedMetrics { line_height: 20 };
        let pages = collect(&metrics, Viewport::new(200, 100), params(10), Vec::new());
        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_empty());
    }

    #[test]
    fn test_callback_error_stops_pagination() {
        let metrics = FixedMetrics { line_height: 50 };
        let mut paginator = Paginator::new(&metrics, Viewport::new(200, 100), params(0));
        let mut on_page = |_page: Page| -> Result<(), &'static str> { Err("disk full") };
        paginator
            .push_block(block(&["a"], BlockStyle::Justified), &mut on_page)
            .unwrap();
        let err = paginator
            .push_block(block(&["b"], BlockStyle::Justified), &mut on_page)
            .unwrap_err();
        assert_eq!(err, "disk full");
    }

    #[test]
    fn test_layout_params_match_is_exact() {
        let a = LayoutParams::default();
        let mut b = a;
        assert!(a.matches(&b));
        b.line_compression = 0.96;
        assert!(!a.matches(&b));
    }
}
