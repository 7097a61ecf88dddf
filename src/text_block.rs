//! Styled word runs produced by the HTML flow parser.

/// Per-word emphasis. The discriminants are the on-disk style values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WordStyle {
    #[default]
    Regular = 0,
    Bold = 1,
    Italic = 2,
    BoldItalic = 3,
}

impl WordStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => WordStyle::Regular,
            (true, false) => WordStyle::Bold,
            (false, true) => WordStyle::Italic,
            (true, true) => WordStyle::BoldItalic,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, WordStyle::Bold | WordStyle::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, WordStyle::Italic | WordStyle::BoldItalic)
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WordStyle::Regular),
            1 => Some(WordStyle::Bold),
            2 => Some(WordStyle::Italic),
            3 => Some(WordStyle::BoldItalic),
            _ => None,
        }
    }
}

/// Horizontal alignment of a block. The discriminants are the on-disk values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockStyle {
    #[default]
    Justified = 0,
    CenterAligned = 1,
}

impl BlockStyle {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BlockStyle::Justified),
            1 => Some(BlockStyle::CenterAligned),
            _ => None,
        }
    }
}

/// An ordered run of words with positionally paired styles.
///
/// Before layout `word_xpos` is empty. Wrapping splits a block into one
/// block per physical line and fills in the x-offset of each word.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextBlock {
    pub words: Vec<String>,
    pub word_styles: Vec<WordStyle>,
    pub word_xpos: Vec<u16>,
    pub style: BlockStyle,
}

impl TextBlock {
    pub fn new(style: BlockStyle) -> Self {
        Self {
            words: Vec::with_capacity(8),
            word_styles: Vec::with_capacity(8),
            word_xpos: Vec::new(),
            style,
        }
    }

    /// Append one word and its style.
    pub fn push_word(&mut self, word: impl Into<String>, style: WordStyle) {
        self.words.push(word.into());
        self.word_styles.push(style);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterate `(word, style)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, WordStyle)> + '_ {
        self.words
            .iter()
            .map(String::as_str)
            .zip(self.word_styles.iter().copied())
    }

    /// Words joined by single spaces, mostly useful for diagnostics and tests.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}
