//! Laid-out pages and their binary file format.
//!
//! All integers are little-endian:
//!
//! ```text
//! page    = version:u8 count:u32 element*
//! element = tag:u8 x:i32 y:i32 block
//! block   = words:u16 (len:u32 utf8)* xpos:u16* style:u8* block_style:u8
//! ```

use std::io::{self, Read, Write};

use epub_pager::{BlockStyle, TextBlock, WordStyle};

use crate::error::{CacheFormatError, RenderError};

pub const PAGE_FILE_VERSION: u8 = 1;
/// Element tag of a [`PageLine`]; the only tag currently defined.
pub const TAG_LINE: u8 = 0;
/// Per-block word cap enforced on both read and write.
pub const MAX_WORDS_PER_BLOCK: u16 = 10_000;
/// Per-string byte cap enforced on both read and write.
pub const MAX_STRING_BYTES: u32 = 4096;

/// One wrapped line placed at an absolute position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLine {
    pub block: TextBlock,
    pub x: i32,
    pub y: i32,
}

/// A finished page of lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub elements: Vec<PageLine>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Serialize in the page file format.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), RenderError> {
        let count = u32::try_from(self.elements.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "too many page elements")
        })?;
        out.write_all(&[PAGE_FILE_VERSION])?;
        out.write_all(&count.to_le_bytes())?;
        for line in &self.elements {
            out.write_all(&[TAG_LINE])?;
            out.write_all(&line.x.to_le_bytes())?;
            out.write_all(&line.y.to_le_bytes())?;
            write_block(out, &line.block)?;
        }
        Ok(())
    }

    /// Parse a page file. Any structural problem fails the whole page.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self, RenderError> {
        let version = read_u8(input)?;
        if version != PAGE_FILE_VERSION {
            return Err(CacheFormatError::UnknownVersion {
                found: version,
                expected: PAGE_FILE_VERSION,
            }
            .into());
        }
        let count = read_u32(input)?;
        let mut elements = Vec::with_capacity((count as usize).min(64));
        for _ in 0..count {
            let tag = read_u8(input)?;
            if tag != TAG_LINE {
                return Err(CacheFormatError::UnknownTag(tag).into());
            }
            let x = read_i32(input)?;
            let y = read_i32(input)?;
            let block = read_block(input)?;
            elements.push(PageLine { block, x, y });
        }
        Ok(Self { elements })
    }
}

fn write_block<W: Write>(out: &mut W, block: &TextBlock) -> Result<(), RenderError> {
    let words = block.words.len();
    if words != block.word_xpos.len() || words != block.word_styles.len() {
        return Err(CacheFormatError::LengthMismatch {
            words,
            positions: block.word_xpos.len(),
            styles: block.word_styles.len(),
        }
        .into());
    }
    let count = match u16::try_from(words) {
        Ok(count) if count <= MAX_WORDS_PER_BLOCK => count,
        _ => {
            return Err(
                CacheFormatError::WordCountTooLarge(u16::try_from(words).unwrap_or(u16::MAX)).into(),
            )
        }
    };

    out.write_all(&count.to_le_bytes())?;
    for word in &block.words {
        let len = u32::try_from(word.len()).unwrap_or(u32::MAX);
        if len > MAX_STRING_BYTES {
            return Err(CacheFormatError::StringTooLong(len).into());
        }
        out.write_all(&len.to_le_bytes())?;
        out.write_all(word.as_bytes())?;
    }
    for xpos in &block.word_xpos {
        out.write_all(&xpos.to_le_bytes())?;
    }
    for style in &block.word_styles {
        out.write_all(&[*style as u8])?;
    }
    out.write_all(&[block.style as u8])?;
    Ok(())
}

fn read_block<R: Read>(input: &mut R) -> Result<TextBlock, RenderError> {
    let count = read_u16(input)?;
    if count > MAX_WORDS_PER_BLOCK {
        return Err(CacheFormatError::WordCountTooLarge(count).into());
    }
    let count = usize::from(count);

    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(read_string(input)?);
    }
    let mut word_xpos = Vec::with_capacity(count);
    for _ in 0..count {
        word_xpos.push(read_u16(input)?);
    }
    let mut word_styles = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = read_u8(input)?;
        word_styles.push(WordStyle::from_u8(raw).ok_or(CacheFormatError::UnknownStyle(raw))?);
    }
    let raw = read_u8(input)?;
    let style = BlockStyle::from_u8(raw).ok_or(CacheFormatError::UnknownStyle(raw))?;

    Ok(TextBlock {
        words,
        word_styles,
        word_xpos,
        style,
    })
}

fn read_string<R: Read>(input: &mut R) -> Result<String, RenderError> {
    let len = read_u32(input)?;
    if len > MAX_STRING_BYTES {
        return Err(CacheFormatError::StringTooLong(len).into());
    }
    let mut bytes = vec![0u8; len as usize];
    read_exact(input, &mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), RenderError> {
    input.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => RenderError::CacheFormat(CacheFormatError::Truncated),
        _ => RenderError::Io(err),
    })
}

pub(crate) fn read_u8<R: Read>(input: &mut R) -> Result<u8, RenderError> {
    let mut buf = [0u8; 1];
    read_exact(input, &mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16<R: Read>(input: &mut R) -> Result<u16, RenderError> {
    let mut buf = [0u8; 2];
    read_exact(input, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(input: &mut R) -> Result<u32, RenderError> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_i32<R: Read>(input: &mut R) -> Result<i32, RenderError> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(words: &[(&str, WordStyle)], style: BlockStyle, x: i32, y: i32) -> PageLine {
        let mut block = TextBlock::new(style);
        for (i, (word, word_style)) in words.iter().enumerate() {
            block.push_word(*word, *word_style);
            block.word_xpos.push(i as u16 * 40);
        }
        PageLine { block, x, y }
    }

    fn round_trip(page: &Page) -> Page {
        let mut bytes = Vec::new();
        page.write_to(&mut bytes).unwrap();
        Page::read_from(&mut bytes.as_slice()).unwrap()
    }

    #[test]
    fn test_byte_layout_of_single_line() {
        let page = Page {
            elements: vec![line(&[("Hi", WordStyle::Bold)], BlockStyle::CenterAligned, 10, 11)],
        };
        let mut bytes = Vec::new();
        page.write_to(&mut bytes).unwrap();
        let expected: Vec<u8> = [
            &[1u8][..],             // version
            &1u32.to_le_bytes(),    // element count
            &[0],                   // tag
            &10i32.to_le_bytes(),   // x
            &11i32.to_le_bytes(),   // y
            &1u16.to_le_bytes(),    // word count
            &2u32.to_le_bytes(),    // word length
            b"Hi",
            &0u16.to_le_bytes(),    // xpos
            &[1],                   // bold
            &[1],                   // centered
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let page = Page {
            elements: vec![
                line(
                    &[("Chapter", WordStyle::Bold), ("One", WordStyle::BoldItalic)],
                    BlockStyle::CenterAligned,
                    10,
                    11,
                ),
                line(
                    &[("plain", WordStyle::Regular), ("slanted", WordStyle::Italic)],
                    BlockStyle::Justified,
                    10,
                    30,
                ),
            ],
        };
        assert_eq!(round_trip(&page), page);
    }

    #[test]
    fn test_round_trip_empty_page_and_empty_block() {
        assert_eq!(round_trip(&Page::default()), Page::default());
        let page = Page {
            elements: vec![line(&[], BlockStyle::Justified, 0, 0)],
        };
        assert_eq!(round_trip(&page), page);
    }

    #[test]
    fn test_round_trip_max_word_count() {
        let mut block = TextBlock::new(BlockStyle::Justified);
        for i in 0..MAX_WORDS_PER_BLOCK {
            block.push_word(format!("w{}", i), WordStyle::Italic);
            block.word_xpos.push(i);
        }
        let page = Page {
            elements: vec![PageLine { block, x: 1, y: 2 }],
        };
        let back = round_trip(&page);
        assert_eq!(back.elements[0].block.len(), 10_000);
        assert_eq!(back, page);
    }

    #[test]
    fn test_read_rejects_word_count_over_cap() {
        let mut bytes = vec![PAGE_FILE_VERSION];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_LINE);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&10_001u16.to_le_bytes());
        let err = Page::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CacheFormat(CacheFormatError::WordCountTooLarge(10_001))
        ));
    }

    #[test]
    fn test_write_rejects_word_count_over_cap() {
        let mut block = TextBlock::new(BlockStyle::Justified);
        for _ in 0..=MAX_WORDS_PER_BLOCK {
            block.push_word("w", WordStyle::Regular);
            block.word_xpos.push(0);
        }
        let page = Page {
            elements: vec![PageLine { block, x: 0, y: 0 }],
        };
        let err = page.write_to(&mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CacheFormat(CacheFormatError::WordCountTooLarge(10_001))
        ));
    }

    #[test]
    fn test_read_rejects_oversized_string() {
        let mut bytes = vec![PAGE_FILE_VERSION];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(TAG_LINE);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&5000u32.to_le_bytes());
        let err = Page::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CacheFormat(CacheFormatError::StringTooLong(5000))
        ));
    }

    #[test]
    fn test_read_rejects_unknown_tag_and_version() {
        let mut bytes = vec![PAGE_FILE_VERSION];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(7);
        let err = Page::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, RenderError::CacheFormat(CacheFormatError::UnknownTag(7))));

        let err = Page::read_from(&mut [9u8, 0, 0, 0, 0].as_slice()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CacheFormat(CacheFormatError::UnknownVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_read_truncated_page() {
        let page = Page {
            elements: vec![line(&[("word", WordStyle::Regular)], BlockStyle::Justified, 0, 0)],
        };
        let mut bytes = Vec::new();
        page.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);
        let err = Page::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, RenderError::CacheFormat(CacheFormatError::Truncated)));
    }

    #[test]
    fn test_write_rejects_unwrapped_block() {
        let mut block = TextBlock::new(BlockStyle::Justified);
        block.push_word("no-positions", WordStyle::Regular);
        let page = Page {
            elements: vec![PageLine { block, x: 0, y: 0 }],
        };
        let err = page.write_to(&mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CacheFormat(CacheFormatError::LengthMismatch {
                words: 1,
                positions: 0,
                styles: 1
            })
        ));
    }
}
