//! The opened book: package metadata, reading order and table of contents.
//!
//! Opening walks `META-INF/container.xml` to the OPF package document,
//! resolves the manifest against the package directory and parses the
//! navigation document into a flat TOC. The archive stays open (as a parsed
//! central directory) for the lifetime of the [`Book`] so sections can be
//! streamed out later.

use std::io::Write;
use std::path::Path;

use crate::error::{ArchiveError, EpubError};
use crate::navigation::{parse_nav_xhtml_with_limits, parse_ncx_with_limits, NavigationLimits, TocEntry};
use crate::package::{parse_container, parse_package};
use crate::path::{parent_dir, resolve_href};
use crate::zip::{ZipArchive, ZipLimits};

/// Fixed location of the OCF container document.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Limits applied while opening a book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub zip: ZipLimits,
    pub navigation: NavigationLimits,
}

impl OpenOptions {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            zip: ZipLimits::embedded(),
            navigation: NavigationLimits::embedded(),
        }
    }
}

/// One entry of the reading order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest id referenced by the `itemref`.
    pub idref: String,
    /// Archive path of the section document.
    pub href: String,
}

/// An opened EPUB.
#[derive(Debug)]
pub struct Book {
    archive: ZipArchive,
    title: String,
    cover_item_path: Option<String>,
    content_base_path: String,
    spine: Vec<SpineItem>,
    toc: Vec<TocEntry>,
    cache_key: String,
}

impl Book {
    /// Open a book with default limits.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EpubError> {
        Self::open_with_options(path, OpenOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self, EpubError> {
        let path = path.as_ref();
        let archive = ZipArchive::open_with_limits(path, options.zip)?;

        let container = read_required(&archive, CONTAINER_PATH)?;
        let opf_path = parse_container(&container)?;
        let content_base_path = parent_dir(&opf_path).to_string();

        let opf = read_required(&archive, &opf_path)?;
        let package = parse_package(&opf)?;

        let mut spine = Vec::with_capacity(package.spine_idrefs.len());
        for idref in &package.spine_idrefs {
            match package.manifest_item(idref) {
                Some(item) => spine.push(SpineItem {
                    idref: idref.clone(),
                    href: resolve_href(&content_base_path, &item.href),
                }),
                None => log::warn!("spine itemref {} has no manifest item; skipped", idref),
            }
        }

        let cover_item_path = package
            .cover_item()
            .map(|item| resolve_href(&content_base_path, &item.href));

        let toc = if let Some(ncx) = package.ncx_item() {
            let ncx_path = resolve_href(&content_base_path, &ncx.href);
            let content = read_required(&archive, &ncx_path)?;
            parse_ncx_with_limits(&content, parent_dir(&ncx_path), options.navigation)?
        } else if let Some(nav) = package.nav_item() {
            let nav_path = resolve_href(&content_base_path, &nav.href);
            let content = read_required(&archive, &nav_path)?;
            parse_nav_xhtml_with_limits(&content, parent_dir(&nav_path), options.navigation)?
        } else {
            return Err(EpubError::Container(
                "package has no navigation document".into(),
            ));
        };

        let book = Self {
            archive,
            title: package.title,
            cover_item_path,
            content_base_path,
            spine,
            toc,
            cache_key: cache_key_for(path),
        };
        log::info!(
            "opened {:?}: {} spine items, {} toc entries",
            book.title,
            book.spine.len(),
            book.toc.len()
        );
        Ok(book)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Archive path of the cover image, when the package names one.
    pub fn cover_item_path(&self) -> Option<&str> {
        self.cover_item_path.as_deref()
    }

    /// Directory of the package document, with a trailing `/` unless empty.
    pub fn content_base_path(&self) -> &str {
        &self.content_base_path
    }

    pub fn spine(&self) -> &[SpineItem] {
        &self.spine
    }

    pub fn spine_item(&self, index: usize) -> Option<&SpineItem> {
        self.spine.get(index)
    }

    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Stable hex key derived from the archive path, used to name cache
    /// directories.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub fn archive(&self) -> &ZipArchive {
        &self.archive
    }

    /// Spine index of the section a TOC entry points at.
    ///
    /// The first spine item with the same href wins. An unknown TOC index or
    /// an href outside the spine maps to 0, the start of the book.
    pub fn spine_index_for_toc(&self, toc_index: usize) -> usize {
        let Some(entry) = self.toc.get(toc_index) else {
            log::warn!("toc index {} out of range; using spine 0", toc_index);
            return 0;
        };
        match self.spine.iter().position(|item| item.href == entry.href) {
            Some(index) => index,
            None => {
                log::warn!("toc entry {} not in spine; using spine 0", entry.href);
                0
            }
        }
    }

    /// First TOC entry pointing at a spine item, or 0 when none does.
    pub fn toc_index_for_spine(&self, spine_index: usize) -> usize {
        let Some(item) = self.spine.get(spine_index) else {
            log::warn!("spine index {} out of range; using toc 0", spine_index);
            return 0;
        };
        match self.toc.iter().position(|entry| entry.href == item.href) {
            Some(index) => index,
            None => {
                log::warn!("spine item {} has no toc entry; using toc 0", item.href);
                0
            }
        }
    }

    /// Inflate an archive item into memory.
    pub fn read_item_to_memory(&self, href: &str, trailing_nul: bool) -> Result<Vec<u8>, EpubError> {
        self.archive.read_entry_to_memory(href, trailing_nul)
    }

    /// Stream an archive item into `sink` in `chunk_size` compressed chunks.
    pub fn read_item_to_sink<W: Write + ?Sized>(
        &self,
        href: &str,
        sink: &mut W,
        chunk_size: usize,
    ) -> Result<u64, EpubError> {
        self.archive.read_entry_to_sink(href, sink, chunk_size)
    }
}

/// Read a package file, reporting a missing entry as a container error.
fn read_required(archive: &ZipArchive, name: &str) -> Result<Vec<u8>, EpubError> {
    match archive.read_entry_to_memory(name, false) {
        Err(EpubError::Archive(ArchiveError::EntryNotFound(_))) => {
            Err(EpubError::Container(format!("missing {}", name)))
        }
        other => other,
    }
}

fn cache_key_for(path: &Path) -> String {
    format!("{:08x}", crc32fast::hash(path.to_string_lossy().as_bytes()))
}
