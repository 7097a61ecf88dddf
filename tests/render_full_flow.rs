mod common;

use std::convert::Infallible;

use common::fixtures::{book_with_chapters, long_body};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use epub_pager::Book;
use epub_pager_embedded_graphics::{EgRenderConfig, EgRenderer, MonoFontMetrics};
use epub_pager_render::{BookCache, BookReader, LayoutParams, PageView, Viewport};
use tempfile::TempDir;

const WIDTH: u32 = 480;
const HEIGHT: u32 = 800;

struct BoundsDisplay {
    min: Point,
    max: Point,
    on_pixels: usize,
}

impl BoundsDisplay {
    fn new() -> Self {
        Self {
            min: Point::new(i32::MAX, i32::MAX),
            max: Point::new(i32::MIN, i32::MIN),
            on_pixels: 0,
        }
    }
}

impl OriginDimensions for BoundsDisplay {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl DrawTarget for BoundsDisplay {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if color == BinaryColor::On {
                self.on_pixels += 1;
                self.min = Point::new(self.min.x.min(point.x), self.min.y.min(point.y));
                self.max = Point::new(self.max.x.max(point.x), self.max.y.max(point.y));
            }
        }
        Ok(())
    }
}

#[test]
fn every_page_of_a_book_draws_inside_the_margins() {
    let dir = TempDir::new().unwrap();
    let body = format!("<h2>Opening</h2>{}", long_body(40, 12));
    let path = book_with_chapters(dir.path(), "draw.epub", "Draw", &[&body, "<p>The <b>end</b>.</p>"]);
    let book = Book::open(&path).unwrap();

    let params = LayoutParams {
        font_id: MonoFontMetrics::SIZE_SMALL,
        ..LayoutParams::default()
    };
    let reader = BookReader::open(
        book,
        BookCache::new(dir.path().join("cache")),
        MonoFontMetrics,
        Viewport::new(WIDTH as i32, HEIGHT as i32),
        params,
    )
    .unwrap();
    let renderer = EgRenderer::new(EgRenderConfig {
        clear_first: false,
        font_id: params.font_id,
    });

    let mut pages = 0;
    loop {
        let PageView::Page(page) = reader.current_page().unwrap() else {
            panic!("unexpected view at {:?}", reader.position().unwrap());
        };
        let mut display = BoundsDisplay::new();
        renderer.render_page(&page, &mut display).unwrap();
        pages += 1;

        assert!(display.on_pixels > 0, "page {} drew nothing", pages);
        assert!(display.min.x >= params.margin_left, "{:?}", display.min);
        assert!(display.min.y >= params.margin_top, "{:?}", display.min);
        assert!(display.max.x < WIDTH as i32 - params.margin_right, "{:?}", display.max);
        assert!(display.max.y < HEIGHT as i32, "{:?}", display.max);

        let before = reader.position().unwrap();
        reader.next_page().unwrap();
        if reader.position().unwrap() == before {
            break;
        }
    }
    assert!(pages > 2, "only {} pages", pages);
    assert_eq!(reader.position().unwrap().0, 1);
}
