//! Minimal zip container reader for EPUB archives.
//!
//! The central directory is parsed once when the archive is opened. Each
//! entry read opens its own file handle, resolves the true data offset from
//! the entry's local header and then either inflates the whole entry into a
//! buffer ([`ZipArchive::read_entry_to_memory`]) or streams it through a
//! 32 KiB circular window into a sink ([`ZipArchive::read_entry_to_sink`]).
//!
//! Only stored (method 0) and DEFLATE (method 8) entries are supported.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use miniz_oxide::inflate::core::inflate_flags::{
    TINFL_FLAG_HAS_MORE_INPUT, TINFL_FLAG_USING_NON_WRAPPING_OUTPUT_BUF,
};
use miniz_oxide::inflate::core::{decompress, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

use crate::error::{ArchiveError, EpubError};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;

const LOCAL_HEADER_LEN: u64 = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const EOCD_LEN: usize = 22;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

const FLAG_ENCRYPTED: u16 = 0x0001;

/// DEFLATE back-reference window; the streaming output ring must match it.
pub const DEFLATE_WINDOW_BYTES: usize = 32 * 1024;

/// Bounds applied while parsing the directory and extracting into memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum number of central directory records accepted.
    pub max_entries: usize,
    /// How far back from the end of file to search for the EOCD record.
    pub max_eocd_scan: usize,
    /// Largest uncompressed entry `read_entry_to_memory` will allocate for.
    pub max_entry_bytes: usize,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_entries: 16 * 1024,
            max_eocd_scan: EOCD_LEN + u16::MAX as usize,
            max_entry_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ZipLimits {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            max_entries: 2048,
            max_eocd_scan: EOCD_LEN + u16::MAX as usize,
            max_entry_bytes: 512 * 1024,
        }
    }
}

/// One central directory record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
}

/// Read-only view over a zip file on disk.
#[derive(Clone, Debug)]
pub struct ZipArchive {
    path: PathBuf,
    entries: Vec<ZipEntry>,
    limits: ZipLimits,
}

impl ZipArchive {
    /// Open an archive and index its central directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EpubError> {
        Self::open_with_limits(path, ZipLimits::default())
    }

    /// Open an archive with explicit limits.
    pub fn open_with_limits(path: impl AsRef<Path>, limits: ZipLimits) -> Result<Self, EpubError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let entries = read_central_directory(&mut file, limits)?;
        log::debug!(
            "indexed {} zip entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self {
            path,
            entries,
            limits,
        })
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Central directory records in stored order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn limits(&self) -> ZipLimits {
        self.limits
    }

    /// Look up an entry by its exact stored name.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn require_entry(&self, name: &str) -> Result<&ZipEntry, ArchiveError> {
        self.entry(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))
    }

    /// Inflate a whole entry into a freshly allocated buffer.
    ///
    /// With `trailing_nul` one extra zero byte is appended after the content.
    pub fn read_entry_to_memory(&self, name: &str, trailing_nul: bool) -> Result<Vec<u8>, EpubError> {
        let entry = self.require_entry(name)?;
        check_supported(entry)?;
        if entry.uncompressed_size > self.limits.max_entry_bytes as u64 {
            return Err(ArchiveError::EntryTooLarge {
                entry: entry.name.clone(),
                size: entry.uncompressed_size,
                limit: self.limits.max_entry_bytes,
            }
            .into());
        }
        let out_len = usize::try_from(entry.uncompressed_size).map_err(|_| {
            EpubError::LayoutAllocation(format!("{} does not fit in memory", entry.name))
        })?;

        let mut file = File::open(&self.path)?;
        let data_offset = data_offset(&mut file, entry)?;
        file.seek(SeekFrom::Start(data_offset))?;

        let mut out = alloc_buffer(out_len + usize::from(trailing_nul), &entry.name)?;
        match entry.method {
            METHOD_STORED => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(ArchiveError::SizeMismatch {
                        entry: entry.name.clone(),
                        expected: entry.uncompressed_size,
                        actual: entry.compressed_size,
                    }
                    .into());
                }
                out.resize(out_len, 0);
                read_exact_or_truncated(&mut file, &mut out)?;
            }
            _ => {
                let in_len = usize::try_from(entry.compressed_size).map_err(|_| {
                    EpubError::LayoutAllocation(format!("{} does not fit in memory", entry.name))
                })?;
                let mut compressed = alloc_buffer(in_len, &entry.name)?;
                compressed.resize(in_len, 0);
                read_exact_or_truncated(&mut file, &mut compressed)?;
                out.resize(out_len, 0);
                inflate_one_shot(entry, &compressed, &mut out)?;
            }
        }

        verify_crc(entry, crc32fast::hash(&out))?;
        if trailing_nul {
            out.push(0);
        }
        Ok(out)
    }

    /// Stream-inflate an entry into `sink`, reading `chunk_size` compressed
    /// bytes at a time. Returns the number of bytes written.
    pub fn read_entry_to_sink<W: Write + ?Sized>(
        &self,
        name: &str,
        sink: &mut W,
        chunk_size: usize,
    ) -> Result<u64, EpubError> {
        let entry = self.require_entry(name)?;
        check_supported(entry)?;

        let mut file = File::open(&self.path)?;
        let data_offset = data_offset(&mut file, entry)?;
        file.seek(SeekFrom::Start(data_offset))?;
        let mut source = file.take(entry.compressed_size);
        let chunk_size = chunk_size.max(1);

        let mut hasher = crc32fast::Hasher::new();
        let produced = match entry.method {
            METHOD_STORED => copy_stored(&mut source, sink, &mut hasher, chunk_size)?,
            _ => inflate_streaming(entry, &mut source, sink, &mut hasher, chunk_size)?,
        };

        if produced != entry.uncompressed_size {
            return Err(ArchiveError::SizeMismatch {
                entry: entry.name.clone(),
                expected: entry.uncompressed_size,
                actual: produced,
            }
            .into());
        }
        verify_crc(entry, hasher.finalize())?;
        Ok(produced)
    }
}

fn check_supported(entry: &ZipEntry) -> Result<(), ArchiveError> {
    if entry.flags & FLAG_ENCRYPTED != 0 {
        return Err(ArchiveError::UnsupportedFeature(format!(
            "encrypted entry {}",
            entry.name
        )));
    }
    match entry.method {
        METHOD_STORED | METHOD_DEFLATE => Ok(()),
        method => Err(ArchiveError::UnsupportedCompression {
            entry: entry.name.clone(),
            method,
        }),
    }
}

fn verify_crc(entry: &ZipEntry, actual: u32) -> Result<(), ArchiveError> {
    if actual != entry.crc32 {
        return Err(ArchiveError::ChecksumMismatch {
            entry: entry.name.clone(),
        });
    }
    Ok(())
}

fn alloc_buffer(len: usize, name: &str) -> Result<Vec<u8>, EpubError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| {
        EpubError::LayoutAllocation(format!("cannot allocate {} bytes for {}", len, name))
    })?;
    Ok(buf)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), EpubError> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => EpubError::Archive(ArchiveError::TruncatedStream),
        _ => EpubError::Io(err),
    })
}

/// Resolve where entry data starts by reading its local header.
///
/// The central directory's copy of the extra field may differ from the local
/// one, so only the local lengths are used.
fn data_offset(file: &mut File, entry: &ZipEntry) -> Result<u64, EpubError> {
    file.seek(SeekFrom::Start(entry.local_header_offset))?;
    let mut header = [0u8; LOCAL_HEADER_LEN as usize];
    file.read_exact(&mut header).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => EpubError::Archive(ArchiveError::CorruptHeader(format!(
            "local header for {} is truncated",
            entry.name
        ))),
        _ => EpubError::Io(err),
    })?;
    if le_u32(&header, 0) != Some(LOCAL_HEADER_SIG) {
        return Err(ArchiveError::CorruptHeader(format!(
            "bad local header signature for {}",
            entry.name
        ))
        .into());
    }
    let name_len = le_u16(&header, 26).unwrap_or(0) as u64;
    let extra_len = le_u16(&header, 28).unwrap_or(0) as u64;
    Ok(entry.local_header_offset + LOCAL_HEADER_LEN + name_len + extra_len)
}

fn copy_stored<R: Read, W: Write + ?Sized>(
    source: &mut R,
    sink: &mut W,
    hasher: &mut crc32fast::Hasher,
    chunk_size: usize,
) -> Result<u64, EpubError> {
    let mut chunk = vec![0u8; chunk_size];
    let mut produced = 0u64;
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
        sink.write_all(&chunk[..n])?;
        produced += n as u64;
    }
    Ok(produced)
}

fn inflate_one_shot(entry: &ZipEntry, input: &[u8], out: &mut [u8]) -> Result<(), EpubError> {
    let mut inflater = Box::<DecompressorOxide>::default();
    let (status, _, written) = decompress(
        &mut inflater,
        input,
        out,
        0,
        TINFL_FLAG_USING_NON_WRAPPING_OUTPUT_BUF,
    );
    match status {
        TINFLStatus::Done if written == out.len() => Ok(()),
        TINFLStatus::Done => Err(ArchiveError::SizeMismatch {
            entry: entry.name.clone(),
            expected: entry.uncompressed_size,
            actual: written as u64,
        }
        .into()),
        TINFLStatus::HasMoreOutput => Err(ArchiveError::SizeMismatch {
            entry: entry.name.clone(),
            expected: entry.uncompressed_size,
            actual: written as u64 + 1,
        }
        .into()),
        TINFLStatus::NeedsMoreInput | TINFLStatus::FailedCannotMakeProgress => {
            Err(ArchiveError::TruncatedStream.into())
        }
        other => Err(ArchiveError::Inflate(format!("{:?} in {}", other, entry.name)).into()),
    }
}

fn inflate_streaming<R: Read, W: Write + ?Sized>(
    entry: &ZipEntry,
    source: &mut R,
    sink: &mut W,
    hasher: &mut crc32fast::Hasher,
    chunk_size: usize,
) -> Result<u64, EpubError> {
    let mut inflater = Box::<DecompressorOxide>::default();
    let mut window = vec![0u8; DEFLATE_WINDOW_BYTES];
    let mut input = vec![0u8; chunk_size];
    let mut remaining = entry.compressed_size;
    let mut in_pos = 0usize;
    let mut in_len = 0usize;
    let mut out_pos = 0usize;
    let mut produced = 0u64;

    loop {
        if in_pos >= in_len && remaining > 0 {
            let want = remaining.min(chunk_size as u64) as usize;
            let n = source.read(&mut input[..want])?;
            if n == 0 {
                return Err(ArchiveError::TruncatedStream.into());
            }
            remaining -= n as u64;
            in_pos = 0;
            in_len = n;
        }

        let flags = if remaining > 0 {
            TINFL_FLAG_HAS_MORE_INPUT
        } else {
            0
        };
        let (status, consumed, written) = decompress(
            &mut inflater,
            &input[in_pos..in_len],
            &mut window,
            out_pos,
            flags,
        );
        in_pos += consumed;

        if written > 0 {
            let produced_bytes = &window[out_pos..out_pos + written];
            hasher.update(produced_bytes);
            sink.write_all(produced_bytes)?;
            produced += written as u64;
            out_pos = (out_pos + written) & (DEFLATE_WINDOW_BYTES - 1);
        }

        match status {
            TINFLStatus::Done => return Ok(produced),
            TINFLStatus::HasMoreOutput => {}
            TINFLStatus::NeedsMoreInput => {
                if remaining == 0 && in_pos >= in_len {
                    return Err(ArchiveError::TruncatedStream.into());
                }
            }
            TINFLStatus::FailedCannotMakeProgress => {
                return Err(ArchiveError::TruncatedStream.into());
            }
            other => {
                return Err(ArchiveError::Inflate(format!("{:?} in {}", other, entry.name)).into())
            }
        }
    }
}

fn read_central_directory(file: &mut File, limits: ZipLimits) -> Result<Vec<ZipEntry>, EpubError> {
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len < EOCD_LEN as u64 {
        return Err(ArchiveError::CorruptHeader("file too small for a zip archive".into()).into());
    }
    let scan_len = file_len.min(limits.max_eocd_scan.max(EOCD_LEN) as u64);
    file.seek(SeekFrom::Start(file_len - scan_len))?;
    let mut tail = vec![0u8; scan_len as usize];
    file.read_exact(&mut tail)?;

    let eocd_at = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&at| le_u32(&tail, at) == Some(EOCD_SIG))
        .ok_or_else(|| ArchiveError::CorruptHeader("end of central directory not found".into()))?;
    let eocd = &tail[eocd_at..];

    let disk = le_u16(eocd, 4).unwrap_or(0);
    let cd_disk = le_u16(eocd, 6).unwrap_or(0);
    if disk != 0 || cd_disk != 0 {
        return Err(ArchiveError::UnsupportedFeature("multi-disk archive".into()).into());
    }
    let total = le_u16(eocd, 10).unwrap_or(0);
    let cd_size = le_u32(eocd, 12).unwrap_or(0);
    let cd_offset = le_u32(eocd, 16).unwrap_or(0);
    if total == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
        return Err(ArchiveError::UnsupportedFeature("zip64 archive".into()).into());
    }
    if total as usize > limits.max_entries {
        return Err(ArchiveError::CorruptHeader(format!(
            "archive lists {} entries, exceeds max_entries ({})",
            total, limits.max_entries
        ))
        .into());
    }
    if cd_offset as u64 + cd_size as u64 > file_len {
        return Err(
            ArchiveError::CorruptHeader("central directory extends past end of file".into()).into(),
        );
    }

    file.seek(SeekFrom::Start(cd_offset as u64))?;
    let mut cd = vec![0u8; cd_size as usize];
    file.read_exact(&mut cd)?;

    let mut entries = Vec::with_capacity(total as usize);
    let mut at = 0usize;
    for _ in 0..total {
        let entry = parse_central_record(&cd, &mut at)?;
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_central_record(cd: &[u8], at: &mut usize) -> Result<ZipEntry, ArchiveError> {
    let start = *at;
    let truncated = || ArchiveError::CorruptHeader("central directory record truncated".into());
    if le_u32(cd, start) != Some(CENTRAL_HEADER_SIG) {
        return Err(ArchiveError::CorruptHeader(format!(
            "bad central directory signature at offset {}",
            start
        )));
    }
    let flags = le_u16(cd, start + 8).ok_or_else(truncated)?;
    let method = le_u16(cd, start + 10).ok_or_else(truncated)?;
    let crc32 = le_u32(cd, start + 16).ok_or_else(truncated)?;
    let compressed = le_u32(cd, start + 20).ok_or_else(truncated)?;
    let uncompressed = le_u32(cd, start + 24).ok_or_else(truncated)?;
    let name_len = le_u16(cd, start + 28).ok_or_else(truncated)? as usize;
    let extra_len = le_u16(cd, start + 30).ok_or_else(truncated)? as usize;
    let comment_len = le_u16(cd, start + 32).ok_or_else(truncated)? as usize;
    let local_offset = le_u32(cd, start + 42).ok_or_else(truncated)?;

    let name_start = start + CENTRAL_HEADER_LEN;
    let name_bytes = cd
        .get(name_start..name_start + name_len)
        .ok_or_else(truncated)?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    if compressed == u32::MAX || uncompressed == u32::MAX || local_offset == u32::MAX {
        return Err(ArchiveError::UnsupportedFeature(format!(
            "zip64 entry {}",
            name
        )));
    }

    *at = name_start + name_len + extra_len + comment_len;
    Ok(ZipEntry {
        name,
        method,
        flags,
        crc32,
        compressed_size: compressed as u64,
        uncompressed_size: uncompressed as u64,
        local_header_offset: local_offset as u64,
    })
}

fn le_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
