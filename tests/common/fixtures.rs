use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const OPF_PATH: &str = "OEBPS/content.opf";

/// Builds an EPUB archive entry by entry.
///
/// `mimetype` is always written first and stored. Everything else is
/// deflated unless added with [`EpubBuilder::stored`].
pub struct EpubBuilder {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            entries: vec![(
                "mimetype".to_string(),
                b"application/epub+zip".to_vec(),
                CompressionMethod::Stored,
            )],
        }
    }

    /// `META-INF/container.xml` pointing at `opf_path`.
    pub fn container(self, opf_path: &str) -> Self {
        self.file("META-INF/container.xml", container_xml(opf_path))
    }

    pub fn file(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries.push((
            name.to_string(),
            content.as_ref().to_vec(),
            CompressionMethod::Deflated,
        ));
        self
    }

    pub fn stored(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries.push((
            name.to_string(),
            content.as_ref().to_vec(),
            CompressionMethod::Stored,
        ));
        self
    }

    pub fn write(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap_or_else(|e| panic!("create {}: {}", path.display(), e));
        let mut zip = ZipWriter::new(file);
        for (entry, content, method) in self.entries {
            let options = SimpleFileOptions::default().compression_method(method);
            zip.start_file(entry.as_str(), options)
                .unwrap_or_else(|e| panic!("start {}: {}", entry, e));
            zip.write_all(&content)
                .unwrap_or_else(|e| panic!("write {}: {}", entry, e));
        }
        zip.finish().expect("finish zip");
        path
    }
}

pub fn container_xml(opf_path: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        opf_path
    )
}

/// Package document with one `(id, href, media-type)` manifest item per
/// tuple and the given spine order. `extra_metadata` is spliced into
/// `<metadata>`.
pub fn opf(title: &str, manifest: &[(&str, &str, &str)], spine: &[&str], extra_metadata: &str) -> String {
    let mut items = String::new();
    for (id, href, media_type) in manifest {
        items.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            id, href, media_type
        ));
    }
    let mut itemrefs = String::new();
    for idref in spine {
        itemrefs.push_str(&format!("    <itemref idref=\"{}\"/>\n", idref));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{}</dc:title>
    {}
  </metadata>
  <manifest>
{}  </manifest>
  <spine toc="ncx">
{}  </spine>
</package>"#,
        title, extra_metadata, items, itemrefs
    )
}

/// NCX with one flat nav point per `(label, src)`.
pub fn ncx(points: &[(&str, &str)]) -> String {
    let mut nav_points = String::new();
    for (i, (label, src)) in points.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="np{0}" playOrder="{0}">
      <navLabel><text>{1}</text></navLabel>
      <content src="{2}"/>
    </navPoint>
"#,
            i + 1,
            label,
            src
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
{}  </navMap>
</ncx>"#,
        nav_points
    )
}

pub fn chapter(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter</title><style>p {{ margin: 0; }}</style></head>
<body>{}</body>
</html>"#,
        body
    )
}

/// A book whose spine is one deflated XHTML file per body, with an NCX
/// entry per chapter titled `Chapter N`.
pub fn book_with_chapters(dir: &Path, name: &str, title: &str, bodies: &[&str]) -> PathBuf {
    let hrefs: Vec<String> = (1..=bodies.len()).map(|i| format!("ch{}.xhtml", i)).collect();
    let ids: Vec<String> = (1..=bodies.len()).map(|i| format!("ch{}", i)).collect();
    let labels: Vec<String> = (1..=bodies.len()).map(|i| format!("Chapter {}", i)).collect();

    let mut manifest = vec![("ncx", "toc.ncx", "application/x-dtbncx+xml")];
    for (id, href) in ids.iter().zip(&hrefs) {
        manifest.push((id.as_str(), href.as_str(), "application/xhtml+xml"));
    }
    let spine: Vec<&str> = ids.iter().map(String::as_str).collect();
    let points: Vec<(&str, &str)> = labels
        .iter()
        .map(String::as_str)
        .zip(hrefs.iter().map(String::as_str))
        .collect();

    let mut builder = EpubBuilder::new()
        .container(OPF_PATH)
        .file(OPF_PATH, opf(title, &manifest, &spine, ""))
        .file("OEBPS/toc.ncx", ncx(&points));
    for (href, body) in hrefs.iter().zip(bodies) {
        builder = builder.file(&format!("OEBPS/{}", href), chapter(body));
    }
    builder.write(dir, name)
}

/// `count` paragraphs of `words_per_paragraph` numbered words each.
pub fn long_body(count: usize, words_per_paragraph: usize) -> String {
    let mut body = String::new();
    for p in 0..count {
        body.push_str("<p>");
        for w in 0..words_per_paragraph {
            if w > 0 {
                body.push(' ');
            }
            body.push_str(&format!("word{}x{}", p, w));
        }
        body.push_str("</p>\n");
    }
    body
}
