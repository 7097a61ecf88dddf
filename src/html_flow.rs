//! Forward-only conversion of section XHTML into styled [`TextBlock`]s.
//!
//! No DOM is built. Tags are classified into a small set of kinds and the
//! parser tracks three depth markers (skip, bold, italic) that switch a
//! region on when a triggering tag opens and off again when nesting returns
//! to the same depth. Words accumulate in a fixed-capacity buffer and are
//! flushed on whitespace, when the buffer fills, or when a block-level tag
//! closes.

use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::text_block::{BlockStyle, TextBlock, WordStyle};
use crate::xml::decode_entities;

/// Longest word (in UTF-8 bytes) kept together before a forced split.
pub const MAX_WORD_BYTES: usize = 200;

const NOT_ACTIVE: usize = usize::MAX;

/// Receiver for finished blocks, in document order.
pub trait BlockSink {
    type Error: From<EpubError>;

    fn push_block(&mut self, block: TextBlock) -> Result<(), Self::Error>;
}

impl BlockSink for Vec<TextBlock> {
    type Error = EpubError;

    fn push_block(&mut self, block: TextBlock) -> Result<(), EpubError> {
        self.push(block);
        Ok(())
    }
}

/// How a tag affects block structure and emphasis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    /// `h1`..`h6`: centered block, bold.
    Header,
    /// `p`, `li`, `div`: new justified block.
    Block,
    /// `br`: new block keeping the previous block's alignment.
    LineBreak,
    Bold,
    Italic,
    /// Images are not rendered; their subtree is skipped.
    Image,
    /// Non-content subtrees such as `head` and `table`.
    Skip,
    /// Anything else. Only affects depth.
    Inline,
}

impl TagKind {
    /// Classify a lowercase local tag name.
    pub fn classify(name: &str) -> Self {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => TagKind::Header,
            "p" | "li" | "div" => TagKind::Block,
            "br" => TagKind::LineBreak,
            "b" | "strong" => TagKind::Bold,
            "i" | "em" => TagKind::Italic,
            "img" | "image" => TagKind::Image,
            "head" | "table" | "script" | "style" => TagKind::Skip,
            _ => TagKind::Inline,
        }
    }

    fn flushes_word_on_close(self) -> bool {
        matches!(
            self,
            TagKind::Header | TagKind::Block | TagKind::LineBreak | TagKind::Bold | TagKind::Italic
        )
    }
}

/// Parser state threaded through the markup events of one section.
#[derive(Debug)]
pub struct FlowParser {
    depth: usize,
    skip_until_depth: usize,
    bold_until_depth: usize,
    italic_until_depth: usize,
    word: heapless::String<MAX_WORD_BYTES>,
    current: TextBlock,
    blocks_emitted: usize,
}

impl Default for FlowParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowParser {
    pub fn new() -> Self {
        Self {
            depth: 0,
            skip_until_depth: NOT_ACTIVE,
            bold_until_depth: NOT_ACTIVE,
            italic_until_depth: NOT_ACTIVE,
            word: heapless::String::new(),
            current: TextBlock::new(BlockStyle::Justified),
            blocks_emitted: 0,
        }
    }

    /// Current open-tag nesting.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn in_skip_region(&self) -> bool {
        self.skip_until_depth < self.depth
    }

    fn current_word_style(&self) -> WordStyle {
        WordStyle::from_flags(
            self.bold_until_depth < self.depth,
            self.italic_until_depth < self.depth,
        )
    }

    /// Handle an opening tag (by lowercase local name).
    pub fn start_element<S: BlockSink>(&mut self, name: &str, sink: &mut S) -> Result<(), S::Error> {
        if self.in_skip_region() {
            self.depth += 1;
            return Ok(());
        }

        match TagKind::classify(name) {
            TagKind::Image | TagKind::Skip => {
                self.skip_until_depth = self.depth;
                self.depth += 1;
                return Ok(());
            }
            TagKind::Header => {
                self.start_new_block(BlockStyle::CenterAligned, sink)?;
                self.bold_until_depth = self.bold_until_depth.min(self.depth);
            }
            TagKind::Block => self.start_new_block(BlockStyle::Justified, sink)?,
            TagKind::LineBreak => {
                let style = self.current.style;
                self.start_new_block(style, sink)?;
            }
            TagKind::Bold => self.bold_until_depth = self.bold_until_depth.min(self.depth),
            TagKind::Italic => self.italic_until_depth = self.italic_until_depth.min(self.depth),
            TagKind::Inline => {}
        }

        self.depth += 1;
        Ok(())
    }

    /// Handle a run of character data.
    pub fn characters(&mut self, text: &str) {
        if self.in_skip_region() {
            return;
        }
        for ch in text.chars() {
            if is_word_separator(ch) {
                if !self.word.is_empty() {
                    self.flush_word();
                }
                continue;
            }
            if self.word.len() + ch.len_utf8() > MAX_WORD_BYTES {
                self.flush_word();
            }
            // an empty buffer always has room for one char
            let _ = self.word.push(ch);
        }
    }

    /// Handle an entity or character reference such as `&amp;` or `&#8217;`.
    ///
    /// The raw reference joins the pending word and is decoded on flush.
    pub fn reference(&mut self, name: &str) {
        if self.in_skip_region() {
            return;
        }
        let needed = name.len() + 2;
        if needed > MAX_WORD_BYTES {
            log::warn!("dropping oversized entity reference ({} bytes)", needed);
            return;
        }
        if self.word.len() + needed > MAX_WORD_BYTES {
            self.flush_word();
        }
        let _ = self.word.push('&');
        let _ = self.word.push_str(name);
        let _ = self.word.push(';');
    }

    /// Handle a closing tag (by lowercase local name).
    pub fn end_element(&mut self, name: &str) {
        if !self.word.is_empty()
            && (TagKind::classify(name).flushes_word_on_close() || self.depth == 1)
        {
            self.flush_word();
        }

        self.depth = self.depth.saturating_sub(1);
        if self.skip_until_depth == self.depth {
            self.skip_until_depth = NOT_ACTIVE;
        }
        if self.bold_until_depth == self.depth {
            self.bold_until_depth = NOT_ACTIVE;
        }
        if self.italic_until_depth == self.depth {
            self.italic_until_depth = NOT_ACTIVE;
        }
    }

    /// Flush the pending word and the open block. Returns how many blocks
    /// were delivered over the parser's lifetime.
    pub fn finish<S: BlockSink>(mut self, sink: &mut S) -> Result<usize, S::Error> {
        if !self.word.is_empty() {
            self.flush_word();
        }
        if !self.current.is_empty() {
            let block = core::mem::take(&mut self.current);
            self.deliver(block, sink)?;
        }
        Ok(self.blocks_emitted)
    }

    fn flush_word(&mut self) {
        let style = self.current_word_style();
        let word = decode_entities(self.word.as_str());
        self.word.clear();
        if !word.is_empty() {
            self.current.push_word(word, style);
        }
    }

    /// Finalize the current block if it holds words; otherwise restyle it
    /// in place so no empty blocks reach the sink.
    fn start_new_block<S: BlockSink>(&mut self, style: BlockStyle, sink: &mut S) -> Result<(), S::Error> {
        if !self.word.is_empty() {
            self.flush_word();
        }
        if self.current.is_empty() {
            self.current.style = style;
            return Ok(());
        }
        let block = core::mem::replace(&mut self.current, TextBlock::new(style));
        self.deliver(block, sink)
    }

    fn deliver<S: BlockSink>(&mut self, block: TextBlock, sink: &mut S) -> Result<(), S::Error> {
        self.blocks_emitted += 1;
        sink.push_block(block)
    }
}

fn is_word_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\r' | '\n' | '\t')
}

fn decode_tag_name<R>(reader: &Reader<R>, raw: &[u8]) -> Result<String, EpubError> {
    let decoded = reader
        .decoder()
        .decode(raw)
        .map_err(|err| EpubError::Markup(format!("tag name decode error: {:?}", err)))?;
    let local_name = decoded.rsplit(':').next().unwrap_or(decoded.as_ref());
    Ok(local_name.to_ascii_lowercase())
}

fn markup_error<R>(reader: &Reader<R>, err: impl core::fmt::Debug) -> EpubError {
    EpubError::Markup(format!(
        "parse error at byte {}: {:?}",
        reader.buffer_position(),
        err
    ))
}

/// Stream a section's markup into `sink` as finished blocks.
///
/// Returns the number of blocks delivered.
pub fn stream_text_blocks<R: BufRead, S: BlockSink>(input: R, sink: &mut S) -> Result<usize, S::Error> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut parser = FlowParser::new();
    let mut buf = Vec::with_capacity(512);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = decode_tag_name(&reader, e.name().as_ref())?;
                parser.start_element(&tag, sink)?;
            }
            Ok(Event::End(e)) => {
                let tag = decode_tag_name(&reader, e.name().as_ref())?;
                parser.end_element(&tag);
            }
            Ok(Event::Text(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| markup_error(&reader, err))?;
                parser.characters(&text);
            }
            Ok(Event::CData(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| markup_error(&reader, err))?;
                parser.characters(&text);
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e.decode().map_err(|err| markup_error(&reader, err))?;
                parser.reference(&name);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(markup_error(&reader, err).into()),
        }
        buf.clear();
    }

    parser.finish(sink)
}

/// Collect all blocks of an in-memory document.
pub fn parse_text_blocks(html: &[u8]) -> Result<Vec<TextBlock>, EpubError> {
    let mut blocks = Vec::with_capacity(8);
    stream_text_blocks(html, &mut blocks)?;
    Ok(blocks)
}
