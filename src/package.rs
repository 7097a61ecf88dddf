//! `META-INF/container.xml` and OPF package document parsing.
//!
//! Element names are matched by local name, so `opf:`-prefixed and
//! unprefixed documents are handled alike.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::xml::{attr_value, collapse_whitespace, local_name, resolve_reference};

/// Media type of the OPF rootfile inside `container.xml`.
pub const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";
/// Media type of an EPUB 2 navigation control file.
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Find the package document path declared by `container.xml`.
pub fn parse_container(content: &[u8]) -> Result<String, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::with_capacity(8);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"rootfile"
                    && attr_value(&reader, &e, b"media-type").as_deref() == Some(OPF_MEDIA_TYPE)
                {
                    if let Some(path) = attr_value(&reader, &e, b"full-path") {
                        if !path.is_empty() {
                            return Ok(path);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Container(format!(
                    "container.xml parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Err(EpubError::Container(
        "container.xml has no OPF rootfile".into(),
    ))
}

/// One `manifest/item`. `href` is the raw attribute value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: String,
}

impl ManifestItem {
    fn has_property(&self, name: &str) -> bool {
        self.properties.split_whitespace().any(|p| p == name)
    }
}

/// The parts of an OPF document the book model needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDocument {
    pub title: String,
    /// Manifest id named by `<meta name="cover" content="...">`.
    pub cover_id: Option<String>,
    pub manifest: Vec<ManifestItem>,
    /// `itemref/@idref` values in reading order.
    pub spine_idrefs: Vec<String>,
    /// `spine/@toc`, the NCX id in EPUB 2 packages.
    pub spine_toc: Option<String>,
}

impl PackageDocument {
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// The NCX manifest item: the literal `ncx`/`ncxtoc` ids first, then
    /// `spine/@toc`, then any item with the NCX media type.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.id == "ncx" || item.id == "ncxtoc")
            .or_else(|| {
                self.spine_toc
                    .as_deref()
                    .and_then(|id| self.manifest_item(id))
            })
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type == NCX_MEDIA_TYPE)
            })
    }

    /// The EPUB 3 navigation document (`properties="nav"`).
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// The cover image item: `meta name="cover"` first, then
    /// `properties="cover-image"`.
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.cover_id
            .as_deref()
            .and_then(|id| self.manifest_item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.has_property("cover-image"))
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Outside,
    Metadata,
    Manifest,
    Spine,
}

/// Parse an OPF package document.
///
/// `metadata`, `manifest` and `spine` must all be present and the metadata
/// must carry a non-empty title.
pub fn parse_package(content: &[u8]) -> Result<PackageDocument, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::with_capacity(8);

    let mut doc = PackageDocument::default();
    let mut section = Section::Outside;
    let mut seen_package = false;
    let mut seen = [false; 3];
    let mut title_buf: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match (section, name) {
                    (_, b"package") => seen_package = true,
                    (Section::Outside, b"metadata") => {
                        section = Section::Metadata;
                        seen[0] = true;
                    }
                    (Section::Outside, b"manifest") => {
                        section = Section::Manifest;
                        seen[1] = true;
                    }
                    (Section::Outside, b"spine") => {
                        section = Section::Spine;
                        seen[2] = true;
                        doc.spine_toc = attr_value(&reader, &e, b"toc");
                    }
                    (Section::Metadata, b"title") if doc.title.is_empty() => {
                        title_buf = Some(String::with_capacity(32));
                    }
                    _ => handle_leaf(&reader, &e, section, &mut doc),
                }
            }
            Ok(Event::Empty(e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match (section, name) {
                    (Section::Outside, b"metadata") => seen[0] = true,
                    (Section::Outside, b"manifest") => seen[1] = true,
                    (Section::Outside, b"spine") => {
                        seen[2] = true;
                        doc.spine_toc = attr_value(&reader, &e, b"toc");
                    }
                    _ => handle_leaf(&reader, &e, section, &mut doc),
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(title) = title_buf.as_mut() {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    title.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(title) = title_buf.as_mut() {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    title.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(title) = title_buf.as_mut() {
                    let name = e.decode().unwrap_or_default();
                    if let Some(resolved) = resolve_reference(&name) {
                        title.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match (section, name) {
                    (Section::Metadata, b"title") => {
                        if let Some(title) = title_buf.take() {
                            doc.title = collapse_whitespace(&title);
                        }
                    }
                    (Section::Metadata, b"metadata")
                    | (Section::Manifest, b"manifest")
                    | (Section::Spine, b"spine") => section = Section::Outside,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Container(format!(
                    "OPF parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_package {
        return Err(EpubError::Container("OPF has no package element".into()));
    }
    for (found, what) in seen.iter().zip(["metadata", "manifest", "spine"]) {
        if !found {
            return Err(EpubError::Container(format!("OPF has no {} element", what)));
        }
    }
    if doc.title.is_empty() {
        return Err(EpubError::Container("OPF metadata has no title".into()));
    }
    Ok(doc)
}

fn handle_leaf<R>(reader: &Reader<R>, e: &BytesStart<'_>, section: Section, doc: &mut PackageDocument) {
    match (section, local_name(e.name().as_ref())) {
        (Section::Metadata, b"meta") => {
            if attr_value(reader, e, b"name").as_deref() == Some("cover") {
                if let Some(content) = attr_value(reader, e, b"content") {
                    doc.cover_id = Some(content);
                }
            }
        }
        (Section::Manifest, b"item") => {
            let (Some(id), Some(href)) = (attr_value(reader, e, b"id"), attr_value(reader, e, b"href"))
            else {
                log::warn!("manifest item without id or href ignored");
                return;
            };
            doc.manifest.push(ManifestItem {
                id,
                href,
                media_type: attr_value(reader, e, b"media-type").unwrap_or_default(),
                properties: attr_value(reader, e, b"properties").unwrap_or_default(),
            });
        }
        (Section::Spine, b"itemref") => {
            if let Some(idref) = attr_value(reader, e, b"idref") {
                doc.spine_idrefs.push(idref);
            }
        }
        _ => {}
    }
}
