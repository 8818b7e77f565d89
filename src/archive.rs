//! Zip archive access: random-access reads from a memory-mapped baseline and
//! ordered, all-or-nothing writes of a new archive.

use memmap2::Mmap;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::util;

const READ_CAPACITY_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// Read side of an archive. Holds the mapping and the parsed central directory
/// for as long as it lives.
pub struct ArchiveReader {
    path: PathBuf,
    zip: ZipArchive<Cursor<Mmap>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mmap = util::mmap_file(path)?;
        let zip = ZipArchive::new(Cursor::new(mmap)).map_err(|e| Error::archive(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }

    /// Entries in central-directory order.
    pub fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        (0..self.zip.len())
            .map(|i| {
                let file = self
                    .zip
                    .by_index_raw(i)
                    .map_err(|e| Error::archive(&self.path, e))?;
                Ok(EntryInfo {
                    name: file.name().to_string(),
                    is_dir: file.is_dir(),
                })
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Read the decompressed payload of the entry called `name`.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = match self.zip.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::NotFound(name.to_string())),
            Err(e) => return Err(Error::archive(&self.path, e)),
        };
        let mut buf = Vec::with_capacity(read_capacity(file.size()));
        file.read_to_end(&mut buf)
            .map_err(|e| Error::io(self.path.join(name), e))?;
        Ok(buf)
    }

    /// Read the decompressed payload of the entry at `index`.
    pub fn read_index(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut file = self
            .zip
            .by_index(index)
            .map_err(|e| Error::archive(&self.path, e))?;
        let mut buf = Vec::with_capacity(read_capacity(file.size()));
        file.read_to_end(&mut buf)
            .map_err(|e| Error::io(self.path.join(file.name()), e))?;
        Ok(buf)
    }
}

/// Write side of an archive. Entries are staged into a temporary file next to
/// the destination; only [`ArchiveWriter::finish`] moves it into place. Dropping
/// the writer early discards the staged file.
pub struct ArchiveWriter {
    dest: PathBuf,
    zip: ZipWriter<BufWriter<NamedTempFile>>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    pub fn create(dest: &Path) -> Result<Self> {
        let staged = staging_file(dest)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        Ok(Self {
            dest: dest.to_path_buf(),
            zip: ZipWriter::new(BufWriter::with_capacity(256 * 1024, staged)),
            options,
        })
    }

    /// Append a new entry with `data` as its payload.
    pub fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| Error::archive(&self.dest, e))?;
        self.zip
            .write_all(data)
            .map_err(|e| Error::io(&self.dest, e))
    }

    /// Copy the entry at `index` from `source` without recompressing it, so the
    /// stored bytes stay identical.
    pub fn copy_entry(&mut self, source: &mut ArchiveReader, index: usize) -> Result<()> {
        let file = source
            .zip
            .by_index_raw(index)
            .map_err(|e| Error::archive(&source.path, e))?;
        self.zip
            .raw_copy_file(file)
            .map_err(|e| Error::archive(&self.dest, e))
    }

    /// Finalize the archive and atomically move it to its destination.
    pub fn finish(self) -> Result<()> {
        let dest = self.dest;
        let buffered = self.zip.finish().map_err(|e| Error::archive(&dest, e))?;
        let staged = buffered
            .into_inner()
            .map_err(|e| Error::io(&dest, e.into_error()))?;
        persist(staged, &dest)
    }
}

/// Copy `src` to `dest` byte for byte through a staged temporary file.
pub fn copy_archive(src: &Path, dest: &Path) -> Result<()> {
    let mut staged = staging_file(dest)?;
    let mut input = std::fs::File::open(src).map_err(|e| Error::io(src, e))?;
    std::io::copy(&mut input, staged.as_file_mut()).map_err(|e| Error::io(dest, e))?;
    staged.as_file_mut().flush().map_err(|e| Error::io(dest, e))?;
    persist(staged, dest)
}

/// Initial buffer size for an entry. The declared size comes from the archive
/// header and is only trusted up to a limit; larger payloads grow the buffer
/// as they are actually read.
fn read_capacity(declared: u64) -> usize {
    usize::try_from(declared).map_or(READ_CAPACITY_LIMIT, |n| n.min(READ_CAPACITY_LIMIT))
}

fn staging_file(dest: &Path) -> Result<NamedTempFile> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))
}

fn persist(staged: NamedTempFile, dest: &Path) -> Result<()> {
    staged
        .persist(dest)
        .map(|_| ())
        .map_err(|e| Error::io(dest, e.error))
}
