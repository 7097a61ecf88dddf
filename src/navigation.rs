//! Table of contents parsing.
//!
//! The EPUB 2 NCX (`navMap/navPoint`) is the primary source. An EPUB 3
//! XHTML navigation document (`<nav epub:type="toc">`) is accepted as a
//! fallback. Both produce the same flat, depth-first list of [`TocEntry`]
//! values whose hrefs are resolved against the package's base directory.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::path::{resolve_href, split_anchor};
use crate::xml::{attr_value, collapse_whitespace, local_name, resolve_reference};

/// Limits for navigation parsing and structure growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationLimits {
    /// Maximum number of navigation points.
    pub max_points: usize,
    /// Maximum allowed nav tree depth.
    pub max_depth: usize,
    /// Maximum UTF-8 byte length for labels.
    pub max_label_bytes: usize,
    /// Maximum UTF-8 byte length for href values.
    pub max_href_bytes: usize,
}

impl Default for NavigationLimits {
    fn default() -> Self {
        Self {
            max_points: 4096,
            max_depth: 64,
            max_label_bytes: 4096,
            max_href_bytes: 4096,
        }
    }
}

impl NavigationLimits {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            max_points: 1024,
            max_depth: 32,
            max_label_bytes: 1024,
            max_href_bytes: 2048,
        }
    }
}

/// One table of contents entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    /// Archive path of the target section, without the fragment.
    pub href: String,
    pub anchor: Option<String>,
    /// 0 for top-level entries, 1 for their children, and so on.
    pub nesting_level: usize,
}

/// Flat builder shared by both navigation formats.
struct TocBuilder<'a> {
    base_dir: &'a str,
    limits: NavigationLimits,
    entries: Vec<TocEntry>,
    open: Vec<usize>,
}

impl<'a> TocBuilder<'a> {
    fn new(base_dir: &'a str, limits: NavigationLimits) -> Self {
        Self {
            base_dir,
            limits,
            entries: Vec::with_capacity(8),
            open: Vec::with_capacity(8),
        }
    }

    fn open_point(&mut self) -> Result<(), EpubError> {
        if self.open.len() >= self.limits.max_depth {
            return Err(EpubError::Container(format!(
                "Navigation depth exceeds max_depth ({} > {})",
                self.open.len() + 1,
                self.limits.max_depth
            )));
        }
        if self.entries.len() >= self.limits.max_points {
            return Err(EpubError::Container(format!(
                "Navigation points exceed max_points ({} > {})",
                self.entries.len() + 1,
                self.limits.max_points
            )));
        }
        self.open.push(self.entries.len());
        self.entries.push(TocEntry {
            nesting_level: self.open.len() - 1,
            ..TocEntry::default()
        });
        Ok(())
    }

    fn close_point(&mut self) {
        self.open.pop();
    }

    fn current(&mut self) -> Option<&mut TocEntry> {
        let idx = *self.open.last()?;
        self.entries.get_mut(idx)
    }

    fn set_target(&mut self, src: &str) -> Result<(), EpubError> {
        if src.len() > self.limits.max_href_bytes {
            return Err(EpubError::Container(format!(
                "Navigation href exceeds max_href_bytes ({} > {})",
                src.len(),
                self.limits.max_href_bytes
            )));
        }
        let (path, anchor) = split_anchor(src);
        let href = resolve_href(self.base_dir, path);
        let anchor = anchor.map(str::to_string);
        if let Some(entry) = self.current() {
            entry.href = href;
            entry.anchor = anchor;
        }
        Ok(())
    }

    fn push_label(&mut self, text: &str) -> Result<(), EpubError> {
        let max = self.limits.max_label_bytes;
        if let Some(entry) = self.current() {
            entry.title.push_str(text);
            if entry.title.len() > max {
                return Err(EpubError::Container(format!(
                    "Navigation label exceeds max_label_bytes ({} > {})",
                    entry.title.len(),
                    max
                )));
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<TocEntry> {
        for entry in &mut self.entries {
            entry.title = collapse_whitespace(&entry.title);
        }
        self.entries
    }
}

/// Parse an NCX document with default limits.
pub fn parse_ncx(content: &[u8], base_dir: &str) -> Result<Vec<TocEntry>, EpubError> {
    parse_ncx_with_limits(content, base_dir, NavigationLimits::default())
}

/// Parse an NCX document into a flat, depth-first TOC.
///
/// Each `navPoint` contributes its `navLabel/text` and `content/@src`;
/// children follow their parent before the parent's next sibling.
pub fn parse_ncx_with_limits(
    content: &[u8],
    base_dir: &str,
    limits: NavigationLimits,
) -> Result<Vec<TocEntry>, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);

    let mut toc = TocBuilder::new(base_dir, limits);
    let mut buf = Vec::with_capacity(8);
    let mut in_nav_map = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => toc.open_point()?,
                b"text" if in_nav_map => in_text = true,
                b"content" if in_nav_map => {
                    if let Some(src) = attr_value(&reader, &e, b"src") {
                        toc.set_target(&src)?;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_nav_map && local_name(e.name().as_ref()) == b"content" {
                    if let Some(src) = attr_value(&reader, &e, b"src") {
                        toc.set_target(&src)?;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    toc.push_label(&text)?;
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text {
                    let name = e.decode().unwrap_or_default();
                    if let Some(resolved) = resolve_reference(&name) {
                        toc.push_label(&resolved)?;
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" if in_nav_map => toc.close_point(),
                b"navMap" => in_nav_map = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Container(format!(
                    "NCX parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(toc.finish())
}

/// Parse an EPUB 3 XHTML navigation document with default limits.
pub fn parse_nav_xhtml(content: &[u8], base_dir: &str) -> Result<Vec<TocEntry>, EpubError> {
    parse_nav_xhtml_with_limits(content, base_dir, NavigationLimits::default())
}

/// Parse the `epub:type="toc"` list of an XHTML navigation document.
///
/// List items without a link (section headings) are dropped.
pub fn parse_nav_xhtml_with_limits(
    content: &[u8],
    base_dir: &str,
    limits: NavigationLimits,
) -> Result<Vec<TocEntry>, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);

    let mut toc = TocBuilder::new(base_dir, limits);
    let mut buf = Vec::with_capacity(8);
    // Depth of nested <nav> elements while inside the toc nav.
    let mut toc_nav_depth = 0usize;
    let mut nav_depth = 0usize;
    let mut in_anchor = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"nav" => {
                    nav_depth += 1;
                    let is_toc = attr_value(&reader, &e, b"type")
                        .is_some_and(|v| v.split_whitespace().any(|t| t == "toc"));
                    if toc_nav_depth == 0 && is_toc {
                        toc_nav_depth = nav_depth;
                    }
                }
                b"li" if toc_nav_depth > 0 => toc.open_point()?,
                b"a" if toc_nav_depth > 0 => {
                    in_anchor = true;
                    if let Some(href) = attr_value(&reader, &e, b"href") {
                        toc.set_target(&href)?;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_anchor {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    toc.push_label(&text)?;
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_anchor {
                    let name = e.decode().unwrap_or_default();
                    if let Some(resolved) = resolve_reference(&name) {
                        toc.push_label(&resolved)?;
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"a" => in_anchor = false,
                b"li" if toc_nav_depth > 0 => toc.close_point(),
                b"nav" => {
                    if nav_depth == toc_nav_depth {
                        toc_nav_depth = 0;
                    }
                    nav_depth = nav_depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Container(format!(
                    "Nav XML parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    let mut entries = toc.finish();
    entries.retain(|entry| !entry.href.is_empty());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NCX: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="x"/></head>
  <docTitle><text>Book Title</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="p1a" playOrder="2">
        <navLabel><text>Section 1.1</text></navLabel>
        <content src="text/ch1.xhtml#s1"/>
      </navPoint>
    </navPoint>
    <navPoint id="p2" playOrder="3">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn test_parse_ncx_depth_first_order() {
        let toc = parse_ncx(NCX, "OEBPS/").unwrap();
        let titles: Vec<&str> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Section 1.1", "Chapter 2"]);
        assert_eq!(toc[0].href, "OEBPS/text/ch1.xhtml");
        assert_eq!(toc[0].anchor, None);
        assert_eq!(toc[1].href, "OEBPS/text/ch1.xhtml");
        assert_eq!(toc[1].anchor.as_deref(), Some("s1"));
        assert_eq!(toc[2].href, "OEBPS/text/ch2.xhtml");
    }

    #[test]
    fn test_parse_ncx_records_nesting_level() {
        let toc = parse_ncx(NCX, "").unwrap();
        let levels: Vec<usize> = toc.iter().map(|e| e.nesting_level).collect();
        assert_eq!(levels, vec![0, 1, 0]);
    }

    #[test]
    fn test_parse_ncx_doc_title_is_not_an_entry() {
        let toc = parse_ncx(NCX, "").unwrap();
        assert!(toc.iter().all(|e| e.title != "Book Title"));
    }

    #[test]
    fn test_parse_ncx_label_entities() {
        let ncx = br#"<ncx><navMap><navPoint><navLabel><text>Tom &amp; Jerry&#8217;s</text></navLabel><content src="a.xhtml"/></navPoint></navMap></ncx>"#;
        let toc = parse_ncx(ncx, "").unwrap();
        assert_eq!(toc[0].title, "Tom & Jerry\u{2019}s");
    }

    #[test]
    fn test_parse_ncx_prefixed_elements() {
        let ncx = br#"<n:ncx xmlns:n="http://www.daisy.org/z3986/2005/ncx/"><n:navMap><n:navPoint><n:navLabel><n:text>One</n:text></n:navLabel><n:content src="one.xhtml"/></n:navPoint></n:navMap></n:ncx>"#;
        let toc = parse_ncx(ncx, "").unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].href, "one.xhtml");
    }

    #[test]
    fn test_parse_ncx_empty_nav_map() {
        let toc = parse_ncx(b"<ncx><navMap/></ncx>", "").unwrap();
        assert!(toc.is_empty());
    }

    #[test]
    fn test_parse_ncx_malformed() {
        let err = parse_ncx(b"<ncx><navMap><navPoint></navMap></ncx>", "").unwrap_err();
        match err {
            EpubError::Container(msg) => assert!(msg.contains("NCX parse error")),
            other => panic!("expected container error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ncx_rejects_depth_over_limit() {
        let limits = NavigationLimits {
            max_depth: 1,
            ..NavigationLimits::default()
        };
        let err = parse_ncx_with_limits(NCX, "", limits).unwrap_err();
        match err {
            EpubError::Container(msg) => assert!(msg.contains("max_depth")),
            other => panic!("expected container error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ncx_rejects_points_over_limit() {
        let limits = NavigationLimits {
            max_points: 2,
            ..NavigationLimits::default()
        };
        let err = parse_ncx_with_limits(NCX, "", limits).unwrap_err();
        match err {
            EpubError::Container(msg) => assert!(msg.contains("max_points")),
            other => panic!("expected container error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nav_xhtml_toc_only() {
        let nav = br#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
<nav epub:type="toc">
  <ol>
    <li><a href="ch1.xhtml">Chapter <em>One</em></a>
      <ol>
        <li><a href="ch1.xhtml#s1">Section 1.1</a></li>
      </ol>
    </li>
    <li><span>Part Two</span>
      <ol><li><a href="ch2.xhtml">Chapter 2</a></li></ol>
    </li>
  </ol>
</nav>
<nav epub:type="landmarks">
  <ol><li><a href="cover.xhtml">Cover</a></li></ol>
</nav>
</body>
</html>"#;
        let toc = parse_nav_xhtml(nav, "OEBPS/").unwrap();
        let titles: Vec<&str> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter One", "Section 1.1", "Chapter 2"]);
        assert_eq!(toc[1].anchor.as_deref(), Some("s1"));
        assert_eq!(toc[1].nesting_level, 1);
        assert_eq!(toc[2].href, "OEBPS/ch2.xhtml");
        assert_eq!(toc[2].nesting_level, 1);
    }
}
