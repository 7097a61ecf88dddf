//! Archive path helpers shared by the package and navigation parsers.

use percent_encoding::percent_decode_str;

/// Collapse `..` segments and drop empty ones.
///
/// A `..` with nothing before it is ignored, so `../a` becomes `a`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(8);
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Directory portion of an archive path, including the trailing `/`.
///
/// Returns an empty string for paths without a directory.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Resolve an href against a base directory (as returned by [`parent_dir`]).
///
/// The href is percent-decoded first since zip entry names are stored raw.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    if decoded.starts_with('/') {
        return normalize_path(&decoded);
    }
    let mut joined = String::with_capacity(base_dir.len() + decoded.len());
    joined.push_str(base_dir);
    joined.push_str(&decoded);
    normalize_path(&joined)
}

/// Split `path#anchor` into its parts. An empty anchor is dropped.
pub fn split_anchor(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, anchor)) if !anchor.is_empty() => (path, Some(anchor)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pops_parent() {
        assert_eq!(normalize_path("a/b/../c"), "a/c");
    }

    #[test]
    fn test_normalize_leading_parent_is_noop() {
        assert_eq!(normalize_path("../a"), "a");
        assert_eq!(normalize_path("../../a/b"), "a/b");
    }

    #[test]
    fn test_normalize_drops_empty_segments() {
        assert_eq!(normalize_path("/OEBPS//text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS/");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn test_resolve_href_against_base() {
        assert_eq!(resolve_href("OEBPS/", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/text/", "../images/c.jpg"), "OEBPS/images/c.jpg");
        assert_eq!(resolve_href("", "ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn test_resolve_href_percent_decodes() {
        assert_eq!(
            resolve_href("OEBPS/", "chapter%201.xhtml"),
            "OEBPS/chapter 1.xhtml"
        );
    }

    #[test]
    fn test_split_anchor() {
        assert_eq!(split_anchor("ch1.xhtml#sec2"), ("ch1.xhtml", Some("sec2")));
        assert_eq!(split_anchor("ch1.xhtml#"), ("ch1.xhtml", None));
        assert_eq!(split_anchor("ch1.xhtml"), ("ch1.xhtml", None));
    }
}
