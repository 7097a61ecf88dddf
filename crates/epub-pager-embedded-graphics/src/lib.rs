//! embedded-graphics backend for `epub-pager-render` pages.
//!
//! [`MonoFontMetrics`] measures text with the built-in mono fonts so the
//! paginator can wrap lines, and [`EgRenderer`] draws the resulting pages
//! onto any binary-color `DrawTarget`.

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

use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_10X20, FONT_6X13_BOLD, FONT_6X13_ITALIC, FONT_6X9, FONT_7X13_ITALIC, FONT_7X14,
            FONT_7X14_BOLD, FONT_8X13, FONT_8X13_BOLD, FONT_8X13_ITALIC, FONT_9X18,
            FONT_9X18_BOLD,
        },
        MonoFont, MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use epub_pager::WordStyle;
use epub_pager_render::{FontMetrics, Page, PageLine};
use std::borrow::Cow;

/// Mono-font metrics keyed by font id.
///
/// Font ids 0 to 3 select the small, medium, large and extra-large size
/// buckets. Any other id falls back to the large bucket.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonoFontMetrics;

impl MonoFontMetrics {
    pub const SIZE_SMALL: i32 = 0;
    pub const SIZE_MEDIUM: i32 = 1;
    pub const SIZE_LARGE: i32 = 2;
    pub const SIZE_XL: i32 = 3;

    /// Font used for a word of `style` in size bucket `font_id`. Bold italic
    /// has no dedicated face and uses bold.
    pub fn font_for(font_id: i32, style: WordStyle) -> &'static MonoFont<'static> {
        match (font_id, style) {
            (Self::SIZE_SMALL, WordStyle::Regular) => &FONT_6X9,
            (Self::SIZE_SMALL, WordStyle::Italic) => &FONT_6X13_ITALIC,
            (Self::SIZE_SMALL, WordStyle::Bold | WordStyle::BoldItalic) => &FONT_6X13_BOLD,
            (Self::SIZE_MEDIUM, WordStyle::Regular) => &FONT_7X14,
            (Self::SIZE_MEDIUM, WordStyle::Italic) => &FONT_7X13_ITALIC,
            (Self::SIZE_MEDIUM, WordStyle::Bold | WordStyle::BoldItalic) => &FONT_7X14_BOLD,
            (Self::SIZE_XL, WordStyle::Regular) => &FONT_10X20,
            (Self::SIZE_XL, WordStyle::Italic) => &FONT_9X18,
            (Self::SIZE_XL, WordStyle::Bold | WordStyle::BoldItalic) => &FONT_9X18_BOLD,
            (_, WordStyle::Regular) => &FONT_8X13,
            (_, WordStyle::Italic) => &FONT_8X13_ITALIC,
            (_, WordStyle::Bold | WordStyle::BoldItalic) => &FONT_8X13_BOLD,
        }
    }

    fn style_for(font_id: i32, style: WordStyle) -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyle::new(Self::font_for(font_id, style), BinaryColor::On)
    }
}

impl FontMetrics for MonoFontMetrics {
    fn line_height(&self, font_id: i32) -> i32 {
        Self::font_for(font_id, WordStyle::Regular).character_size.height as i32
    }

    fn measure(&self, font_id: i32, text: &str, style: WordStyle) -> i32 {
        let font = Self::font_for(font_id, style);
        let chars = normalize_text_for_mono(text).chars().count() as i32;
        chars * font.character_size.width as i32
    }
}

/// Renderer options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EgRenderConfig {
    /// Clear display before drawing page.
    pub clear_first: bool,
    /// Size bucket the page was laid out with.
    pub font_id: i32,
}

impl Default for EgRenderConfig {
    fn default() -> Self {
        Self {
            clear_first: true,
            font_id: 0,
        }
    }
}

/// Draws cached pages word by word.
#[derive(Clone, Debug, Default)]
pub struct EgRenderer {
    cfg: EgRenderConfig,
}

impl EgRenderer {
    pub fn new(cfg: EgRenderConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> EgRenderConfig {
        self.cfg
    }

    /// Render a page to a draw target.
    pub fn render_page<D>(&self, page: &Page, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        if self.cfg.clear_first {
            display.clear(BinaryColor::Off)?;
        }
        for line in &page.elements {
            self.render_line(line, display)?;
        }
        Ok(())
    }

    /// Draw one line. Each word is placed at `(line.x + xpos, line.y)` with
    /// its top edge on `line.y`.
    pub fn render_line<D>(&self, line: &PageLine, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let block = &line.block;
        if block.words.len() != block.word_xpos.len() || block.words.len() != block.word_styles.len() {
            log::warn!(
                "line skipped: size mismatch (words={}, xpos={}, styles={})",
                block.words.len(),
                block.word_xpos.len(),
                block.word_styles.len()
            );
            return Ok(());
        }
        for ((word, style), xpos) in block.iter().zip(block.word_xpos.iter()) {
            let text_style = MonoFontMetrics::style_for(self.cfg.font_id, style);
            let normalized = normalize_text_for_mono(word);
            let origin = Point::new(line.x + i32::from(*xpos), line.y);
            Text::with_baseline(normalized.as_ref(), origin, text_style, Baseline::Top).draw(display)?;
        }
        Ok(())
    }
}

fn normalize_text_for_mono(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|ch| {
        matches!(
            ch,
            '\u{00A0}' // nbsp
                | '\u{2013}' // en dash
                | '\u{2014}' // em dash
                | '\u{2018}' // left single quote
                | '\u{2019}' // right single quote
                | '\u{201C}' // left double quote
                | '\u{201D}' // right double quote
                | '\u{2026}' // ellipsis
        )
    }) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{00A0}' => out.push(' '),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}
