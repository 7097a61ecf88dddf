//! quick-xml helpers shared by the package, navigation and flow parsers.

use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape, unescape_with};
use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

/// Strip any namespace prefix (`opf:item` -> `item`).
pub(crate) fn local_name(raw: &[u8]) -> &[u8] {
    match raw.iter().rposition(|&b| b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    }
}

/// Decoded, unescaped value of the first attribute whose local name is `key`.
pub(crate) fn attr_value<R>(reader: &Reader<R>, e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) != key {
            continue;
        }
        let raw = reader.decoder().decode(attr.value.as_ref()).ok()?;
        return Some(match unescape(&raw) {
            Ok(value) => value.into_owned(),
            Err(_) => raw.into_owned(),
        });
    }
    None
}

/// Resolve the body of a general reference (`amp`, `eacute`, `#8217`).
pub(crate) fn resolve_reference(name: &str) -> Option<String> {
    let mut raw = String::with_capacity(name.len() + 2);
    raw.push('&');
    raw.push_str(name);
    raw.push(';');
    let decoded = decode_entities(&raw);
    (decoded != raw).then_some(decoded)
}

/// Decode XML, HTML5 named and numeric references. Undecodable input is kept
/// verbatim.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    match unescape_with(raw, |entity| {
        resolve_predefined_entity(entity).or_else(|| resolve_html5_entity(entity))
    }) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for part in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}
