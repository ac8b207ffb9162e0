//! Value Store
//!
//! Append-only payload file addressed by `(offset, length)`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{ValueCodec, MAX_CODEC_ID_LEN};
use crate::error::{BucketError, Result};
use crate::index::EntryStatus;

use super::{CODEC_ID_OFFSET, FILLER, HEADER_SIZE, VERSION_LEN};

/// Open file handles of a value store
struct StoreHandle {
    /// Append handle; flushed after every payload
    writer: BufWriter<File>,
    /// Independent handle for positioned reads
    reader: File,
    /// Current end of file (next payload offset)
    end: u64,
}

/// Append-only store of encoded values
///
/// A value is never rewritten in place: both `insert` and `update` append a
/// new payload and return its region. The caller (an index) owns the
/// `(offset, length)` bookkeeping since payloads carry no length prefix.
pub struct ValueStore<T> {
    path: PathBuf,
    codec: Box<dyn ValueCodec<T>>,
    handle: Option<StoreHandle>,
}

impl<T> ValueStore<T> {
    /// Bind a store to a path without touching the filesystem
    pub fn new(path: impl Into<PathBuf>, codec: Box<dyn ValueCodec<T>>) -> Self {
        Self {
            path: path.into(),
            codec,
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec_id(&self) -> &str {
        self.codec.id()
    }

    /// Is the store opened?
    pub fn is_opened(&self) -> bool {
        self.handle.is_some()
    }

    /// Offset the next payload will be written at
    pub fn end_offset(&self) -> Result<u64> {
        Ok(self.handle()?.end)
    }

    /// Create a new store file and open it
    ///
    /// Fails if the file already exists.
    pub fn create(&mut self) -> Result<()> {
        if self.path.is_file() {
            return Err(BucketError::StorageExists(self.path.clone()));
        }

        let header = encode_header(self.codec.id())?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.write_all(&header)?;
        file.flush()?;
        drop(file);

        tracing::debug!(path = %self.path.display(), codec = self.codec.id(), "created value store");
        self.open()
    }

    /// Open an existing store, positioning the write cursor at end of file
    pub fn open(&mut self) -> Result<()> {
        if !self.path.is_file() {
            return Err(BucketError::StorageMissing(self.path.clone()));
        }

        let mut reader = File::open(&self.path)?;
        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BucketError::HeaderCorrupt(format!(
                "value store {} is shorter than its header",
                self.path.display()
            )),
            _ => BucketError::Io(e),
        })?;

        let found = decode_codec_id(&header);
        if found != self.codec.id() {
            return Err(BucketError::CodecMismatch {
                expected: self.codec.id().to_string(),
                found,
            });
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let end = file.metadata()?.len();

        self.handle = Some(StoreHandle {
            writer: BufWriter::new(file),
            reader,
            end,
        });
        Ok(())
    }

    /// Append a new value
    pub fn insert(&mut self, value: &T) -> Result<(u64, u32)> {
        let bytes = self.codec.encode(value)?;
        self.append_raw(&bytes)
    }

    /// Store a new version of a value (same mechanics as `insert`)
    pub fn update(&mut self, value: &T) -> Result<(u64, u32)> {
        self.insert(value)
    }

    /// Read the value at `(start, size)`
    ///
    /// Deleted entries and the `size == 0` "no payload" sentinel return
    /// `None` without touching the file.
    pub fn get(&mut self, start: u64, size: u32, status: Option<EntryStatus>) -> Result<Option<T>> {
        if status == Some(EntryStatus::Deleted) || size == 0 {
            return Ok(None);
        }
        let bytes = self.read_raw(start, size)?;
        self.codec.decode(&bytes).map(Some)
    }

    /// Push buffered bytes to the OS
    pub fn flush(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.as_mut() {
            handle.writer.flush()?;
        }
        Ok(())
    }

    /// Force the OS to persist the file
    pub fn fsync(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.as_mut() {
            handle.writer.flush()?;
            handle.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Release the file handles
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut handle) = self.handle.take() {
            handle.writer.flush()?;
        }
        Ok(())
    }

    /// Close and remove the file; a missing file is not an error
    pub fn destroy(&mut self) -> Result<()> {
        self.close()?;
        remove_if_exists(&self.path)
    }

    // =========================================================================
    // Raw Payload Access (used by compaction)
    // =========================================================================

    pub(crate) fn append_raw(&mut self, bytes: &[u8]) -> Result<(u64, u32)> {
        let size = u32::try_from(bytes.len()).map_err(|_| {
            BucketError::Serialization(format!("payload of {} bytes exceeds u32 length", bytes.len()))
        })?;

        let handle = self.handle_mut()?;
        let start = handle.end;
        handle.writer.write_all(bytes)?;
        handle.writer.flush()?;
        handle.end += bytes.len() as u64;
        Ok((start, size))
    }

    pub(crate) fn read_raw(&mut self, start: u64, size: u32) -> Result<Vec<u8>> {
        let handle = self.handle_mut()?;
        let in_range = match start.checked_add(size as u64) {
            Some(end) => start >= HEADER_SIZE && end <= handle.end,
            None => false,
        };
        if !in_range {
            return Err(BucketError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("region {}+{} outside of value store (end {})", start, size, handle.end),
            )));
        }
        handle.reader.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; size as usize];
        handle.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Copy the given regions into a fresh store file at `target`
    ///
    /// Returns the new region of each input, in order. Identical regions are
    /// copied once; no-payload regions pass through unchanged.
    pub(crate) fn write_compacted(&mut self, target: &Path, regions: &[(u64, u32)]) -> Result<Vec<(u64, u32)>> {
        remove_if_exists(target)?;
        let header = encode_header(self.codec.id())?;
        let mut out = BufWriter::new(OpenOptions::new().write(true).create_new(true).open(target)?);
        out.write_all(&header)?;

        let mut end = HEADER_SIZE;
        let mut moved: HashMap<(u64, u32), (u64, u32)> = HashMap::new();
        let mut relocated = Vec::with_capacity(regions.len());
        for &region in regions {
            let (start, size) = region;
            if size == 0 {
                relocated.push(region);
                continue;
            }
            if let Some(&new_region) = moved.get(&region) {
                relocated.push(new_region);
                continue;
            }
            let bytes = self.read_raw(start, size)?;
            out.write_all(&bytes)?;
            let new_region = (end, size);
            end += size as u64;
            moved.insert(region, new_region);
            relocated.push(new_region);
        }

        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(relocated)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn handle(&self) -> Result<&StoreHandle> {
        self.handle.as_ref().ok_or(BucketError::StorageNotInitialized)
    }

    fn handle_mut(&mut self) -> Result<&mut StoreHandle> {
        self.handle.as_mut().ok_or(BucketError::StorageNotInitialized)
    }
}

/// Build the 100-byte store header: version string, filler, codec id
fn encode_header(codec_id: &str) -> Result<[u8; HEADER_SIZE as usize]> {
    if codec_id.len() > MAX_CODEC_ID_LEN {
        return Err(BucketError::Config(format!(
            "codec id {:?} longer than {} bytes",
            codec_id, MAX_CODEC_ID_LEN
        )));
    }

    let mut header = [0u8; HEADER_SIZE as usize];
    let version = crate::VERSION.as_bytes();
    let version_len = version.len().min(VERSION_LEN);
    header[..version_len].copy_from_slice(&version[..version_len]);
    header[VERSION_LEN..VERSION_LEN + FILLER.len()].copy_from_slice(FILLER);
    header[CODEC_ID_OFFSET..CODEC_ID_OFFSET + codec_id.len()].copy_from_slice(codec_id.as_bytes());
    Ok(header)
}

fn decode_codec_id(header: &[u8]) -> String {
    let field = &header[CODEC_ID_OFFSET..CODEC_ID_OFFSET + MAX_CODEC_ID_LEN];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Remove a file, treating "already gone" as success
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
