//! Memory-mapped file readers.
//!

use crate::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tcspc_ptu::{PtuHeader, RecordFormat, T3Record, RECORD_SIZE};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access a completed file without loading it into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and replay assumes it is no longer being written.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A complete PTU file opened for replay.
pub struct PtuFileReader {
    reader: MappedFileReader,
    header: PtuHeader,
    format: RecordFormat,
    data_offset: usize,
}

impl PtuFileReader {
    /// Maps the file and parses its header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, the header is
    /// malformed, or the record type is not a supported T3 layout.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let header = PtuHeader::from_bytes(reader.as_bytes())?;
        let format = header.record_format()?;
        let data_offset = usize::try_from(header.data_offset()).map_err(|_| {
            Error::InvalidFormat(format!(
                "record data offset {} does not fit in memory",
                header.data_offset()
            ))
        })?;

        let file_records = reader.len().saturating_sub(data_offset) / RECORD_SIZE;
        if let Some(declared) = header.num_records() {
            if usize::try_from(declared).ok() != Some(file_records) {
                log::warn!(
                    "{}: header declares {declared} records, file holds {file_records}",
                    reader.path().display()
                );
            }
        }

        Ok(Self {
            reader,
            header,
            format,
            data_offset,
        })
    }

    /// Parsed header.
    #[must_use]
    pub fn header(&self) -> &PtuHeader {
        &self.header
    }

    /// Record type named in the header.
    #[must_use]
    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Raw bytes following the header, including any trailing partial record.
    #[must_use]
    pub fn record_bytes(&self) -> &[u8] {
        &self.reader.as_bytes()[self.data_offset..]
    }

    /// Number of complete records in the file.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.record_bytes().len() / RECORD_SIZE
    }

    /// Iterates over complete records.
    pub fn records(&self) -> impl Iterator<Item = T3Record> + '_ {
        self.record_bytes()
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| T3Record::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    /// Splits the record bytes into slices of at most `chunk_bytes`, the way a
    /// tail would see them arrive.
    pub fn chunks(&self, chunk_bytes: usize) -> impl Iterator<Item = &[u8]> {
        self.record_bytes().chunks(chunk_bytes.max(1))
    }
}
