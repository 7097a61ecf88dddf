use epub_pager::WordStyle;
use epub_pager_render::FontMetrics;

/// Every character is `char_width` pixels wide; lines are `line_height`
/// pixels tall.
pub struct FixedMetrics {
    pub char_width: i32,
    pub line_height: i32,
}

impl FixedMetrics {
    pub fn new(char_width: i32, line_height: i32) -> Self {
        Self {
            char_width,
            line_height,
        }
    }
}

impl FontMetrics for FixedMetrics {
    fn line_height(&self, _font_id: i32) -> i32 {
        self.line_height
    }

    fn measure(&self, _font_id: i32, text: &str, _style: WordStyle) -> i32 {
        text.chars().count() as i32 * self.char_width
    }
}
