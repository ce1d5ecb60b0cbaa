//! Polling reader that follows a PTU file while it is being written.

use crate::buffer::{BufferAlert, StreamBuffer};
use crate::config::StartPosition;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tcspc_ptu::{PtuHeader, RECORD_SIZE};

/// Result of a single [`FileTail::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    /// Bytes read during this poll.
    pub bytes_read: usize,
    /// Pile-up transition caused by the new records.
    pub alert: Option<BufferAlert>,
}

impl PollOutcome {
    /// Returns true if the poll found nothing new.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.bytes_read == 0
    }
}

/// Follows a growing PTU file.
///
/// The header is parsed once on open. Each poll reads at most
/// `read_chunk_bytes` of newly appended data and never seeks backward.
pub struct FileTail {
    file: File,
    path: PathBuf,
    header: PtuHeader,
    position: u64,
    scratch: Vec<u8>,
}

impl FileTail {
    /// Opens `path`, parses the header and positions the reader.
    ///
    /// With [`StartPosition::End`] the reader starts at the last complete
    /// record boundary so a half-written record is not split.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the header is
    /// malformed, or `read_chunk_bytes` is zero.
    pub fn open<P: AsRef<Path>>(
        path: P,
        start: StartPosition,
        read_chunk_bytes: usize,
    ) -> Result<Self> {
        if read_chunk_bytes == 0 {
            return Err(Error::InvalidConfig(
                "read_chunk_bytes must be at least 1".to_string(),
            ));
        }

        let mut reader = BufReader::new(File::open(&path)?);
        let header = PtuHeader::read(&mut reader)?;
        let format = header.record_format()?;
        let mut file = reader.into_inner();

        let data_offset = header.data_offset();
        let len = file.metadata()?.len();
        let position = match start {
            StartPosition::Beginning => data_offset,
            StartPosition::End => {
                let body = len.saturating_sub(data_offset);
                data_offset + body - body % RECORD_SIZE as u64
            }
        };
        file.seek(SeekFrom::Start(position))?;

        log::info!(
            "tailing {} ({}) from offset {position}, {} bytes of records already present",
            path.as_ref().display(),
            format.name(),
            len.saturating_sub(data_offset)
        );

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            header,
            position,
            scratch: vec![0; read_chunk_bytes],
        })
    }

    /// Parsed file header.
    #[must_use]
    pub fn header(&self) -> &PtuHeader {
        &self.header
    }

    /// Path being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads whatever has been appended since the last poll into `buffer`.
    ///
    /// # Errors
    /// Returns [`Error::Truncated`] if the file shrank below the read
    /// position, or an I/O error from the read.
    pub fn poll(&mut self, buffer: &mut StreamBuffer) -> Result<PollOutcome> {
        let bytes_read = match self.file.read(&mut self.scratch) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e.into()),
        };

        if bytes_read == 0 {
            let len = self.file.metadata()?.len();
            if len < self.position {
                return Err(Error::Truncated {
                    position: self.position,
                    len,
                });
            }
            return Ok(PollOutcome::default());
        }

        self.position += bytes_read as u64;
        let alert = buffer.extend_from_slice(&self.scratch[..bytes_read]);
        Ok(PollOutcome { bytes_read, alert })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tcspc_ptu::header::testing::HeaderBuilder;
    use tcspc_ptu::T3Record;

    fn header_bytes() -> Vec<u8> {
        HeaderBuilder::default()
            .multiharp_t3(5e-12, 13_333_333)
            .finish()
    }

    #[test]
    fn test_poll_reads_appended_records() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&header_bytes()).unwrap();
        tmp.flush().unwrap();

        let mut tail = FileTail::open(tmp.path(), StartPosition::Beginning, 64).unwrap();
        let mut buffer = StreamBuffer::new(100);
        assert!(tail.poll(&mut buffer).unwrap().is_idle());

        tmp.write_all(&T3Record::photon(2, 10, 1).0.to_le_bytes())
            .unwrap();
        tmp.flush().unwrap();

        let outcome = tail.poll(&mut buffer).unwrap();
        assert_eq!(outcome.bytes_read, RECORD_SIZE);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_end_start_aligns_to_record_boundary() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let header = header_bytes();
        tmp.write_all(&header).unwrap();
        tmp.write_all(&T3Record::overflow(1).0.to_le_bytes()).unwrap();
        // half of the next record
        tmp.write_all(&[0xAA, 0xBB]).unwrap();
        tmp.flush().unwrap();

        let tail = FileTail::open(tmp.path(), StartPosition::End, 64).unwrap();
        assert_eq!(tail.position(), (header.len() + RECORD_SIZE) as u64);
    }

    #[test]
    fn test_zero_chunk_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&header_bytes()).unwrap();
        tmp.flush().unwrap();
        assert!(matches!(
            FileTail::open(tmp.path(), StartPosition::End, 0),
            Err(Error::InvalidConfig(_))
        ));
    }
}
