//! PTU tag directory reader.
//!
//! A PTU file starts with the 8-byte magic `PQTTTR`, an 8-byte version
//! string, then a sequence of tags. Each tag is a 32-byte identifier, an
//! `i32` index, a `u32` type code and an 8-byte value; strings, arrays and
//! blobs are followed by a payload whose byte length is the value. The
//! directory ends at the `Header_End` tag and records start right after.

use crate::record::RecordFormat;
use crate::{Error, Result};
use std::io::{Cursor, Read};
use tcspc_core::Calibration;

/// Magic identifying a PTU file.
pub const PTU_MAGIC: &str = "PQTTTR";

const TY_EMPTY8: u32 = 0xFFFF_0008;
const TY_BOOL8: u32 = 0x0000_0008;
const TY_INT8: u32 = 0x1000_0008;
const TY_BITSET64: u32 = 0x1100_0008;
const TY_COLOR8: u32 = 0x1200_0008;
const TY_FLOAT8: u32 = 0x2000_0008;
const TY_TDATETIME: u32 = 0x2100_0008;
const TY_FLOAT8_ARRAY: u32 = 0x2001_FFFF;
const TY_ANSI_STRING: u32 = 0x4001_FFFF;
const TY_WIDE_STRING: u32 = 0x4002_FFFF;
const TY_BINARY_BLOB: u32 = 0xFFFF_FFFF;

const TAG_IDENT_LEN: usize = 32;
const TAG_ENTRY_LEN: u64 = 48;
const PREAMBLE_LEN: u64 = 16;
// Guards against allocating from a corrupted length field.
const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

const HEADER_END: &str = "Header_End";
const TAG_RESOLUTION: &str = "MeasDesc_Resolution";
const TAG_GLOBAL_RESOLUTION: &str = "MeasDesc_GlobalResolution";
const TAG_SYNC_RATE: &str = "TTResult_SyncRate";
const TAG_RECORD_TYPE: &str = "TTResultFormat_TTTRRecType";
const TAG_NUM_RECORDS: &str = "TTResult_NumberOfRecords";

/// Days between the `TDateTime` epoch (1899-12-30) and the Unix epoch.
const TDATETIME_UNIX_OFFSET_DAYS: f64 = 25569.0;

/// A typed tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Empty,
    Bool(bool),
    Int(i64),
    BitSet(i64),
    Color(i64),
    Float(f64),
    /// Days since 1899-12-30.
    DateTime(f64),
    Float8Array(Vec<f64>),
    AnsiString(String),
    WideString(String),
    BinaryBlob(Vec<u8>),
}

impl TagValue {
    /// Numeric view of integer and float tags.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(v) | TagValue::BitSet(v) | TagValue::Color(v) => Some(*v as f64),
            TagValue::Float(v) | TagValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of integer-typed tags.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) | TagValue::BitSet(v) | TagValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of string tags.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::AnsiString(s) | TagValue::WideString(s) => Some(s),
            _ => None,
        }
    }

    /// Unix timestamp (seconds) of a `DateTime` tag.
    #[must_use]
    pub fn unix_seconds(&self) -> Option<f64> {
        match self {
            TagValue::DateTime(days) => Some((days - TDATETIME_UNIX_OFFSET_DAYS) * 86400.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Empty => write!(f, "<empty Tag>"),
            TagValue::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            TagValue::Int(v) | TagValue::BitSet(v) | TagValue::Color(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v:e}"),
            TagValue::DateTime(v) => write!(f, "{v} days"),
            TagValue::Float8Array(values) => write!(f, "<float array of {}>", values.len()),
            TagValue::AnsiString(s) | TagValue::WideString(s) => write!(f, "{s}"),
            TagValue::BinaryBlob(bytes) => write!(f, "<binary blob of {} bytes>", bytes.len()),
        }
    }
}

/// One tag directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Identifier without trailing NULs.
    pub name: String,
    /// Array index, or -1 for scalar tags.
    pub index: i32,
    /// Typed value.
    pub value: TagValue,
}

impl Tag {
    /// Display name, `Name(idx)` for indexed tags.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.index > -1 {
            format!("{}({})", self.name, self.index)
        } else {
            self.name.clone()
        }
    }
}

/// Parsed PTU header.
#[derive(Debug, Clone)]
pub struct PtuHeader {
    version: String,
    tags: Vec<Tag>,
    data_offset: u64,
}

impl PtuHeader {
    /// Reads the header from `reader`, leaving it positioned at the first record.
    ///
    /// # Errors
    /// Returns an error on a wrong magic, an unknown tag type, an oversized
    /// payload, or if the stream ends before `Header_End`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = read_fixed_string(reader, 8, "magic")?;
        if magic != PTU_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }
        let version = read_fixed_string(reader, 8, "version")?;

        let mut tags = Vec::new();
        let mut offset = PREAMBLE_LEN;
        loop {
            let name = read_fixed_string(reader, TAG_IDENT_LEN, "tag identifier")?;
            let index = i32::from_le_bytes(read_array(reader, &name)?);
            let type_code = u32::from_le_bytes(read_array(reader, &name)?);
            let raw: [u8; 8] = read_array(reader, &name)?;
            offset += TAG_ENTRY_LEN;

            let value = match type_code {
                TY_EMPTY8 => TagValue::Empty,
                TY_BOOL8 => TagValue::Bool(i64::from_le_bytes(raw) != 0),
                TY_INT8 => TagValue::Int(i64::from_le_bytes(raw)),
                TY_BITSET64 => TagValue::BitSet(i64::from_le_bytes(raw)),
                TY_COLOR8 => TagValue::Color(i64::from_le_bytes(raw)),
                TY_FLOAT8 => TagValue::Float(f64::from_le_bytes(raw)),
                TY_TDATETIME => TagValue::DateTime(f64::from_le_bytes(raw)),
                TY_FLOAT8_ARRAY => {
                    let payload = read_payload(reader, &name, i64::from_le_bytes(raw))?;
                    offset += payload.len() as u64;
                    TagValue::Float8Array(
                        payload
                            .chunks_exact(8)
                            .map(|chunk| {
                                let mut bytes = [0u8; 8];
                                bytes.copy_from_slice(chunk);
                                f64::from_le_bytes(bytes)
                            })
                            .collect(),
                    )
                }
                TY_ANSI_STRING => {
                    let payload = read_payload(reader, &name, i64::from_le_bytes(raw))?;
                    offset += payload.len() as u64;
                    TagValue::AnsiString(trim_nul(&String::from_utf8_lossy(&payload)))
                }
                TY_WIDE_STRING => {
                    let payload = read_payload(reader, &name, i64::from_le_bytes(raw))?;
                    offset += payload.len() as u64;
                    let units: Vec<u16> = payload
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    TagValue::WideString(trim_nul(&String::from_utf16_lossy(&units)))
                }
                TY_BINARY_BLOB => {
                    let payload = read_payload(reader, &name, i64::from_le_bytes(raw))?;
                    offset += payload.len() as u64;
                    TagValue::BinaryBlob(payload)
                }
                _ => {
                    return Err(Error::UnknownTagType {
                        tag: name,
                        type_code,
                    })
                }
            };

            let done = name == HEADER_END;
            tags.push(Tag { name, index, value });
            if done {
                break;
            }
        }

        log::debug!("PTU header {version}: {} tags, records at byte {offset}", tags.len());

        Ok(Self {
            version,
            tags,
            data_offset: offset,
        })
    }

    /// Parses the header at the start of `data`.
    ///
    /// # Errors
    /// See [`PtuHeader::read`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(data))
    }

    /// File format version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All tags in file order.
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Byte offset of the first record.
    #[must_use]
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.tags.iter().find(|t| t.name == name).map(|t| &t.value)
    }

    /// Calibration constants needed to start aggregation.
    ///
    /// The sync period comes from `MeasDesc_GlobalResolution` when present,
    /// otherwise from the inverse of `TTResult_SyncRate`.
    ///
    /// # Errors
    /// Returns [`Error::MissingTag`] if the resolution or both sync tags are
    /// absent, or a core error if a value is not positive.
    pub fn calibration(&self) -> Result<Calibration> {
        let resolution = self
            .numeric(TAG_RESOLUTION)?
            .ok_or(Error::MissingTag(TAG_RESOLUTION))?;

        if let Some(global) = self.numeric(TAG_GLOBAL_RESOLUTION)? {
            return Ok(Calibration::new(resolution, global)?);
        }
        let sync_rate = self
            .numeric(TAG_SYNC_RATE)?
            .ok_or(Error::MissingTag(TAG_GLOBAL_RESOLUTION))?;
        Ok(Calibration::from_sync_rate(resolution, sync_rate)?)
    }

    /// Record format declared by `TTResultFormat_TTTRRecType`.
    ///
    /// # Errors
    /// Returns [`Error::MissingTag`] if the tag is absent or
    /// [`Error::UnsupportedRecordType`] if the layout is not generic T3.
    pub fn record_format(&self) -> Result<RecordFormat> {
        let code = self
            .get(TAG_RECORD_TYPE)
            .and_then(TagValue::as_i64)
            .ok_or(Error::MissingTag(TAG_RECORD_TYPE))?;
        let code = u32::try_from(code).map_err(|_| Error::InvalidTagValue {
            tag: TAG_RECORD_TYPE.to_string(),
            reason: format!("{code} is not a record type code"),
        })?;
        RecordFormat::from_code(code)
    }

    /// Number of records written when the header was last updated, if recorded.
    #[must_use]
    pub fn num_records(&self) -> Option<i64> {
        self.get(TAG_NUM_RECORDS).and_then(TagValue::as_i64)
    }

    fn numeric(&self, name: &str) -> Result<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| Error::InvalidTagValue {
                tag: name.to_string(),
                reason: format!("expected a number, found {value}"),
            }),
        }
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, context: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, context))?;
    Ok(buf)
}

fn read_fixed_string<R: Read>(reader: &mut R, len: usize, context: &str) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, context))?;
    Ok(trim_nul(&String::from_utf8_lossy(&buf)))
}

fn read_payload<R: Read>(reader: &mut R, tag: &str, len: i64) -> Result<Vec<u8>> {
    let len = u64::try_from(len)
        .ok()
        .filter(|&len| len <= MAX_PAYLOAD_LEN)
        .ok_or_else(|| Error::InvalidTagValue {
            tag: tag.to_string(),
            reason: format!("payload length {len} out of range"),
        })?;
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(Error::TruncatedHeader(format!(
            "payload of {tag:?} ended after {} of {len} bytes",
            buf.len()
        )));
    }
    Ok(buf)
}

fn truncated(err: std::io::Error, context: &str) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::TruncatedHeader(format!("stream ended while reading {context}"))
    } else {
        Error::IoError(err)
    }
}

fn trim_nul(s: &str) -> String {
    s.trim_matches('\0').to_string()
}

/// Builders for synthetic headers, shared by the tests of dependent crates
/// through the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::{
        HEADER_END, TY_ANSI_STRING, TY_EMPTY8, TY_FLOAT8, TY_FLOAT8_ARRAY, TY_INT8, TY_WIDE_STRING,
    };

    /// Incrementally builds PTU header bytes.
    #[derive(Debug, Clone)]
    pub struct HeaderBuilder {
        bytes: Vec<u8>,
    }

    impl Default for HeaderBuilder {
        fn default() -> Self {
            Self::new("PQTTTR")
        }
    }

    impl HeaderBuilder {
        /// Starts a header with the given magic and version `1.0.00`.
        #[must_use]
        pub fn new(magic: &str) -> Self {
            let mut bytes = Vec::new();
            push_fixed(&mut bytes, magic, 8);
            push_fixed(&mut bytes, "1.0.00", 8);
            Self { bytes }
        }

        /// Appends a raw entry.
        #[must_use]
        pub fn raw(
            mut self,
            name: &str,
            index: i32,
            type_code: u32,
            value: [u8; 8],
            payload: &[u8],
        ) -> Self {
            push_fixed(&mut self.bytes, name, 32);
            self.bytes.extend_from_slice(&index.to_le_bytes());
            self.bytes.extend_from_slice(&type_code.to_le_bytes());
            self.bytes.extend_from_slice(&value);
            self.bytes.extend_from_slice(payload);
            self
        }

        /// Appends an `Int8` tag.
        #[must_use]
        pub fn int(self, name: &str, value: i64) -> Self {
            self.raw(name, -1, TY_INT8, value.to_le_bytes(), &[])
        }

        /// Appends a `Float8` tag.
        #[must_use]
        pub fn float(self, name: &str, value: f64) -> Self {
            self.raw(name, -1, TY_FLOAT8, value.to_le_bytes(), &[])
        }

        /// Appends an `AnsiString` tag.
        #[must_use]
        pub fn ansi(self, name: &str, value: &str) -> Self {
            let mut payload = value.as_bytes().to_vec();
            payload.push(0);
            let len = i64::try_from(payload.len()).unwrap_or(i64::MAX);
            self.raw(name, -1, TY_ANSI_STRING, len.to_le_bytes(), &payload)
        }

        /// Appends a `WideString` tag.
        #[must_use]
        pub fn wide(self, name: &str, value: &str) -> Self {
            let payload: Vec<u8> = value
                .encode_utf16()
                .chain(std::iter::once(0))
                .flat_map(u16::to_le_bytes)
                .collect();
            let len = i64::try_from(payload.len()).unwrap_or(i64::MAX);
            self.raw(name, -1, TY_WIDE_STRING, len.to_le_bytes(), &payload)
        }

        /// Appends a `Float8Array` tag.
        #[must_use]
        pub fn float_array(self, name: &str, values: &[f64]) -> Self {
            let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            let len = i64::try_from(payload.len()).unwrap_or(i64::MAX);
            self.raw(name, -1, TY_FLOAT8_ARRAY, len.to_le_bytes(), &payload)
        }

        /// Appends the standard calibration and record type tags of a MultiHarp T3 file.
        #[must_use]
        pub fn multiharp_t3(self, resolution_s: f64, sync_rate_hz: i64) -> Self {
            self.int("TTResultFormat_TTTRRecType", 0x0001_0307)
                .float("MeasDesc_Resolution", resolution_s)
                .int("TTResult_SyncRate", sync_rate_hz)
        }

        /// Terminates the directory and returns the bytes.
        #[must_use]
        pub fn finish(self) -> Vec<u8> {
            self.raw(HEADER_END, -1, TY_EMPTY8, [0; 8], &[]).bytes
        }
    }

    fn push_fixed(bytes: &mut Vec<u8>, s: &str, len: usize) {
        let mut field = s.as_bytes().to_vec();
        field.resize(len, 0);
        bytes.extend_from_slice(&field);
    }
}
