//! On-disk cache layout for paginated books.
//!
//! ```text
//! <root>/epub_<cache-key>/progress.bin
//! <root>/epub_<cache-key>/.tmp_<spine>.html
//! <root>/epub_<cache-key>/<spine>/section.bin
//! <root>/epub_<cache-key>/<spine>/page_<n>.bin
//! ```
//!
//! Directories are created on first write. Files are written to a temporary
//! sibling and renamed into place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use epub_pager::Book;

use crate::error::{CacheFormatError, RenderError};
use crate::layout::LayoutParams;
use crate::page::{read_i32, read_u8};

pub const SECTION_FILE_VERSION: u8 = 3;
const SECTION_FILE_NAME: &str = "section.bin";
const PROGRESS_FILE_NAME: &str = "progress.bin";

static CACHE_WRITE_NONCE: AtomicUsize = AtomicUsize::new(0);

/// Root of the per-book cache directories.
#[derive(Clone, Debug)]
pub struct BookCache {
    root: PathBuf,
}

impl BookCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic directory for one book.
    pub fn book_dir(&self, book: &Book) -> PathBuf {
        self.root.join(format!("epub_{}", book.cache_key()))
    }

    /// Deterministic directory for one section of a book.
    pub fn section_dir(&self, book: &Book, spine_index: usize) -> PathBuf {
        self.book_dir(book).join(spine_index.to_string())
    }

    /// Remove everything cached for `book`. A missing directory is fine.
    pub fn clear_book(&self, book: &Book) -> Result<(), RenderError> {
        let dir = self.book_dir(book);
        remove_dir_if_exists(&dir)?;
        log::debug!("cleared cache {}", dir.display());
        Ok(())
    }

    /// Persist the reading position as `(spine, page)`, each as u16 LE.
    pub fn save_progress(&self, book: &Book, spine_index: usize, page: usize) -> Result<(), RenderError> {
        let spine = u16::try_from(spine_index).unwrap_or(u16::MAX);
        let page = u16::try_from(page).unwrap_or(u16::MAX);
        let mut data = [0u8; 4];
        data[..2].copy_from_slice(&spine.to_le_bytes());
        data[2..].copy_from_slice(&page.to_le_bytes());
        write_file_atomic(&self.book_dir(book).join(PROGRESS_FILE_NAME), |out| {
            out.write_all(&data)?;
            Ok(())
        })
    }

    /// The saved reading position, if any. A short or unreadable file is
    /// treated as no progress.
    pub fn load_progress(&self, book: &Book) -> Result<Option<(usize, usize)>, RenderError> {
        let path = self.book_dir(book).join(PROGRESS_FILE_NAME);
        let mut data = [0u8; 4];
        match File::open(&path).and_then(|mut file| file.read_exact(&mut data)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                log::warn!("ignoring short progress file {}", path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
        let spine = u16::from_le_bytes([data[0], data[1]]);
        let page = u16::from_le_bytes([data[2], data[3]]);
        Ok(Some((usize::from(spine), usize::from(page))))
    }
}

/// Contents of a section's `section.bin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionMetadata {
    pub params: LayoutParams,
    pub page_count: usize,
}

impl SectionMetadata {
    pub(crate) fn path(section_dir: &Path) -> PathBuf {
        section_dir.join(SECTION_FILE_NAME)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), RenderError> {
        let page_count = i32::try_from(self.page_count)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "page count overflows i32"))?;
        let p = &self.params;
        out.write_all(&[SECTION_FILE_VERSION])?;
        out.write_all(&p.font_id.to_le_bytes())?;
        out.write_all(&p.line_compression.to_le_bytes())?;
        out.write_all(&p.margin_top.to_le_bytes())?;
        out.write_all(&p.margin_right.to_le_bytes())?;
        out.write_all(&p.margin_bottom.to_le_bytes())?;
        out.write_all(&p.margin_left.to_le_bytes())?;
        out.write_all(&page_count.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<Self, RenderError> {
        let version = read_u8(input)?;
        if version != SECTION_FILE_VERSION {
            return Err(CacheFormatError::UnknownVersion {
                found: version,
                expected: SECTION_FILE_VERSION,
            }
            .into());
        }
        let font_id = read_i32(input)?;
        let line_compression = f32::from_bits(read_i32(input)? as u32);
        let margin_top = read_i32(input)?;
        let margin_right = read_i32(input)?;
        let margin_bottom = read_i32(input)?;
        let margin_left = read_i32(input)?;
        let page_count = read_i32(input)?;
        let page_count = usize::try_from(page_count).map_err(|_| CacheFormatError::Truncated)?;
        Ok(Self {
            params: LayoutParams {
                font_id,
                line_compression,
                margin_top,
                margin_right,
                margin_bottom,
                margin_left,
            },
            page_count,
        })
    }
}

/// Write `path` through a temporary sibling, creating parent directories.
pub(crate) fn write_file_atomic<F>(path: &Path, write: F) -> Result<(), RenderError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), RenderError>,
{
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;
    fs::create_dir_all(parent)?;

    let nonce = CACHE_WRITE_NONCE.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(
        "{}.tmp-{}-{}",
        file_name,
        std::process::id(),
        nonce
    ));

    let result = (|| -> Result<(), RenderError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        remove_file_quiet(&temp_path);
    }
    result
}

pub(crate) fn remove_file_quiet(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {}", path.display(), err);
        }
    }
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<(), RenderError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
