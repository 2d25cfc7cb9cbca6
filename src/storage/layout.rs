//! Partition file layout
//!
//! A partition file (`.scol`) holds one horizontal slice of a dataset:
//!
//! ```text
//! +--------------------------+
//! | Magic "SCOL"             | (4 bytes)
//! | Version                  | (u16 LE)
//! | Row Count                | (u64 LE)
//! | Column Count             | (u32 LE)
//! +--------------------------+
//! | Column Entry * N         |
//! |   Name                   | (u32 LE length + UTF-8)
//! |   Physical Type Tag      | (u8)
//! |   Chunk Offset           | (u64 LE, from start of file)
//! |   Chunk Length           | (u64 LE)
//! |   Chunk Checksum         | (u32 LE)
//! +--------------------------+
//! | Header Checksum          | (u32 LE, over all preceding bytes)
//! +--------------------------+
//! | Column Chunk * N         |
//! |   Validity Bitmap        | (ceil(rows / 8) bytes, LSB first, 1 = present)
//! |   Values                 | (one slot per row, nulls included)
//! +--------------------------+
//! ```
//!
//! Values are fixed-width little endian for numeric, date and timestamp
//! types, one byte for bools, and `u32 length + bytes` for text and binary.
//! Null slots hold zeroes (or an empty string) so every row has a slot.

use std::io::{self, Read};

use super::checksum::compute_checksum;

/// File magic
pub const MAGIC: &[u8; 4] = b"SCOL";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Extension of partition files
pub const PARTITION_EXTENSION: &str = "scol";

/// Magic + version + row count + column count
const FIXED_HEADER_LEN: usize = 4 + 2 + 8 + 4;

/// Name length prefix + tag + offset + length + checksum, excluding the name
const ENTRY_FIXED_LEN: usize = 4 + 1 + 8 + 8 + 4;

/// Upper bound on column names and counts, to reject garbage before allocating
const MAX_NAME_LEN: usize = 1 << 16;
const MAX_COLUMNS: usize = 1 << 16;

/// Physical encoding of a column chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Utf8,
    Bytes,
    Date32,
    TimestampMicros,
}

impl PhysicalType {
    pub fn tag(&self) -> u8 {
        match self {
            PhysicalType::Int32 => 1,
            PhysicalType::Int64 => 2,
            PhysicalType::Float32 => 3,
            PhysicalType::Float64 => 4,
            PhysicalType::Bool => 5,
            PhysicalType::Utf8 => 6,
            PhysicalType::Bytes => 7,
            PhysicalType::Date32 => 8,
            PhysicalType::TimestampMicros => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PhysicalType::Int32),
            2 => Some(PhysicalType::Int64),
            3 => Some(PhysicalType::Float32),
            4 => Some(PhysicalType::Float64),
            5 => Some(PhysicalType::Bool),
            6 => Some(PhysicalType::Utf8),
            7 => Some(PhysicalType::Bytes),
            8 => Some(PhysicalType::Date32),
            9 => Some(PhysicalType::TimestampMicros),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhysicalType::Int32 => "int32",
            PhysicalType::Int64 => "int64",
            PhysicalType::Float32 => "float32",
            PhysicalType::Float64 => "float64",
            PhysicalType::Bool => "bool",
            PhysicalType::Utf8 => "utf8",
            PhysicalType::Bytes => "bytes",
            PhysicalType::Date32 => "date32",
            PhysicalType::TimestampMicros => "timestamp_micros",
        }
    }
}

impl std::fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded values of one column chunk, before coercion to a logical type
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalColumn {
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Utf8(Vec<Option<String>>),
    Bytes(Vec<Option<Vec<u8>>>),
    Date32(Vec<Option<i32>>),
    TimestampMicros(Vec<Option<i64>>),
}

impl PhysicalColumn {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            PhysicalColumn::Int32(_) => PhysicalType::Int32,
            PhysicalColumn::Int64(_) => PhysicalType::Int64,
            PhysicalColumn::Float32(_) => PhysicalType::Float32,
            PhysicalColumn::Float64(_) => PhysicalType::Float64,
            PhysicalColumn::Bool(_) => PhysicalType::Bool,
            PhysicalColumn::Utf8(_) => PhysicalType::Utf8,
            PhysicalColumn::Bytes(_) => PhysicalType::Bytes,
            PhysicalColumn::Date32(_) => PhysicalType::Date32,
            PhysicalColumn::TimestampMicros(_) => PhysicalType::TimestampMicros,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PhysicalColumn::Int32(v) => v.len(),
            PhysicalColumn::Int64(v) => v.len(),
            PhysicalColumn::Float32(v) => v.len(),
            PhysicalColumn::Float64(v) => v.len(),
            PhysicalColumn::Bool(v) => v.len(),
            PhysicalColumn::Utf8(v) => v.len(),
            PhysicalColumn::Bytes(v) => v.len(),
            PhysicalColumn::Date32(v) => v.len(),
            PhysicalColumn::TimestampMicros(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the chunk: validity bitmap followed by values
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            PhysicalColumn::Int32(v) | PhysicalColumn::Date32(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    buf.extend_from_slice(&x.unwrap_or(0).to_le_bytes());
                }
            }
            PhysicalColumn::Int64(v) | PhysicalColumn::TimestampMicros(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    buf.extend_from_slice(&x.unwrap_or(0).to_le_bytes());
                }
            }
            PhysicalColumn::Float32(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    buf.extend_from_slice(&x.unwrap_or(0.0).to_le_bytes());
                }
            }
            PhysicalColumn::Float64(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    buf.extend_from_slice(&x.unwrap_or(0.0).to_le_bytes());
                }
            }
            PhysicalColumn::Bool(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    buf.push(u8::from(x.unwrap_or(false)));
                }
            }
            PhysicalColumn::Utf8(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    write_var(&mut buf, x.as_deref().map(str::as_bytes));
                }
            }
            PhysicalColumn::Bytes(v) => {
                write_validity(&mut buf, v);
                for x in v {
                    write_var(&mut buf, x.as_deref());
                }
            }
        }
        buf
    }

    /// Decodes a chunk of `rows` values.
    ///
    /// The whole chunk must be consumed; trailing bytes are corruption.
    pub fn decode(physical_type: PhysicalType, rows: usize, data: &[u8]) -> Result<Self, String> {
        let bitmap_len = rows.div_ceil(8);
        if data.len() < bitmap_len {
            return Err(format!(
                "chunk of {} bytes too short for validity bitmap of {} rows",
                data.len(),
                rows
            ));
        }
        let (bitmap, mut values) = data.split_at(bitmap_len);
        let valid = |row: usize| bitmap[row / 8] & (1 << (row % 8)) != 0;

        let column = match physical_type {
            PhysicalType::Int32 | PhysicalType::Date32 => {
                let raw = read_fixed::<4>(&mut values, rows)?;
                let decoded = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then(|| i32::from_le_bytes(b)))
                    .collect();
                if physical_type == PhysicalType::Int32 {
                    PhysicalColumn::Int32(decoded)
                } else {
                    PhysicalColumn::Date32(decoded)
                }
            }
            PhysicalType::Int64 | PhysicalType::TimestampMicros => {
                let raw = read_fixed::<8>(&mut values, rows)?;
                let decoded = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then(|| i64::from_le_bytes(b)))
                    .collect();
                if physical_type == PhysicalType::Int64 {
                    PhysicalColumn::Int64(decoded)
                } else {
                    PhysicalColumn::TimestampMicros(decoded)
                }
            }
            PhysicalType::Float32 => PhysicalColumn::Float32(
                read_fixed::<4>(&mut values, rows)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then(|| f32::from_le_bytes(b)))
                    .collect(),
            ),
            PhysicalType::Float64 => PhysicalColumn::Float64(
                read_fixed::<8>(&mut values, rows)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then(|| f64::from_le_bytes(b)))
                    .collect(),
            ),
            PhysicalType::Bool => PhysicalColumn::Bool(
                read_fixed::<1>(&mut values, rows)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then(|| b[0] != 0))
                    .collect(),
            ),
            PhysicalType::Utf8 => {
                let mut decoded = Vec::with_capacity(rows);
                for row in 0..rows {
                    let bytes = read_var(&mut values, row)?;
                    if valid(row) {
                        let text = String::from_utf8(bytes.to_vec())
                            .map_err(|e| format!("row {}: invalid UTF-8: {}", row, e))?;
                        decoded.push(Some(text));
                    } else {
                        decoded.push(None);
                    }
                }
                PhysicalColumn::Utf8(decoded)
            }
            PhysicalType::Bytes => {
                let mut decoded = Vec::with_capacity(rows);
                for row in 0..rows {
                    let bytes = read_var(&mut values, row)?;
                    decoded.push(valid(row).then(|| bytes.to_vec()));
                }
                PhysicalColumn::Bytes(decoded)
            }
        };

        if !values.is_empty() {
            return Err(format!("{} trailing bytes after {} rows", values.len(), rows));
        }
        Ok(column)
    }
}

fn write_validity<T>(buf: &mut Vec<u8>, values: &[Option<T>]) {
    let mut bitmap = vec![0u8; values.len().div_ceil(8)];
    for (row, value) in values.iter().enumerate() {
        if value.is_some() {
            bitmap[row / 8] |= 1 << (row % 8);
        }
    }
    buf.extend_from_slice(&bitmap);
}

fn write_var(buf: &mut Vec<u8>, bytes: Option<&[u8]>) {
    let bytes = bytes.unwrap_or(&[]);
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_fixed<const N: usize>(data: &mut &[u8], rows: usize) -> Result<Vec<[u8; N]>, String> {
    let needed = rows
        .checked_mul(N)
        .ok_or_else(|| format!("row count {} overflows chunk size", rows))?;
    if data.len() < needed {
        return Err(format!(
            "truncated values: need {} bytes, have {}",
            needed,
            data.len()
        ));
    }
    let (head, rest) = data.split_at(needed);
    *data = rest;
    Ok(head
        .chunks_exact(N)
        .map(|c| {
            let mut out = [0u8; N];
            out.copy_from_slice(c);
            out
        })
        .collect())
}

fn read_var<'a>(data: &mut &'a [u8], row: usize) -> Result<&'a [u8], String> {
    if data.len() < 4 {
        return Err(format!("row {}: truncated length prefix", row));
    }
    let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let rest = &data[4..];
    if rest.len() < len {
        return Err(format!(
            "row {}: value of {} bytes exceeds remaining {}",
            row,
            len,
            rest.len()
        ));
    }
    let (value, rest) = rest.split_at(len);
    *data = rest;
    Ok(value)
}

/// Directory entry for one column chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    pub name: String,
    pub physical_type: PhysicalType,
    pub offset: u64,
    pub length: u64,
    pub checksum: u32,
}

/// Fixed header plus column directory of a partition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHeader {
    pub version: u16,
    pub row_count: u64,
    pub columns: Vec<ColumnEntry>,
}

impl PartitionHeader {
    /// Encoded size of a header with the given column names
    pub fn encoded_len<'a>(names: impl IntoIterator<Item = &'a str>) -> usize {
        FIXED_HEADER_LEN
            + names
                .into_iter()
                .map(|n| ENTRY_FIXED_LEN + n.len())
                .sum::<usize>()
            + 4
    }

    pub fn column(&self, name: &str) -> Option<&ColumnEntry> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Serializes the header, including its trailing checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_len(
            self.columns.iter().map(|c| c.name.as_str()),
        ));
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.row_count.to_le_bytes());
        buf.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for entry in &self.columns {
            buf.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
            buf.extend_from_slice(entry.name.as_bytes());
            buf.push(entry.physical_type.tag());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.length.to_le_bytes());
            buf.extend_from_slice(&entry.checksum.to_le_bytes());
        }
        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Reads and verifies a header from the start of a partition file.
    ///
    /// Only the header bytes are consumed. Errors are corruption reasons.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, String> {
        let mut raw = Vec::with_capacity(FIXED_HEADER_LEN);
        let fixed = take(reader, &mut raw, FIXED_HEADER_LEN, "fixed header")?;
        if &fixed[0..4] != MAGIC {
            return Err(format!("bad magic {:?}", &fixed[0..4]));
        }
        let version = u16::from_le_bytes([fixed[4], fixed[5]]);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", version));
        }
        let row_count = u64::from_le_bytes(le_array(&fixed[6..14]));
        let column_count = u32::from_le_bytes(le_array(&fixed[14..18])) as usize;
        if column_count > MAX_COLUMNS {
            return Err(format!("implausible column count {}", column_count));
        }

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let len_bytes = take(reader, &mut raw, 4, "column name length")?;
            let name_len = u32::from_le_bytes(le_array(&len_bytes)) as usize;
            if name_len > MAX_NAME_LEN {
                return Err(format!("implausible column name length {}", name_len));
            }
            let name_bytes = take(reader, &mut raw, name_len, "column name")?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| format!("column name is not UTF-8: {}", e))?;
            let rest = take(reader, &mut raw, ENTRY_FIXED_LEN - 4, "column entry")?;
            let physical_type = PhysicalType::from_tag(rest[0]).ok_or_else(|| {
                format!("unknown physical type tag {} for column '{}'", rest[0], name)
            })?;
            columns.push(ColumnEntry {
                name,
                physical_type,
                offset: u64::from_le_bytes(le_array(&rest[1..9])),
                length: u64::from_le_bytes(le_array(&rest[9..17])),
                checksum: u32::from_le_bytes(le_array(&rest[17..21])),
            });
        }

        let mut stored = [0u8; 4];
        reader
            .read_exact(&mut stored)
            .map_err(|e| eof_reason(e, "header checksum"))?;
        let computed = compute_checksum(&raw);
        let stored = u32::from_le_bytes(stored);
        if computed != stored {
            return Err(format!(
                "header checksum mismatch: computed {:08x}, stored {:08x}",
                computed, stored
            ));
        }

        Ok(Self {
            version,
            row_count,
            columns,
        })
    }
}

fn take<R: Read>(reader: &mut R, raw: &mut Vec<u8>, len: usize, what: &str) -> Result<Vec<u8>, String> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| eof_reason(e, what))?;
    raw.extend_from_slice(&buf);
    Ok(buf)
}

fn eof_reason(err: io::Error, what: &str) -> String {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        format!("truncated {}", what)
    } else {
        format!("failed to read {}: {}", what, err)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(PhysicalType::Int32.tag(), 1);
        assert_eq!(PhysicalType::TimestampMicros.tag(), 9);
        for tag in 1..=9 {
            assert_eq!(PhysicalType::from_tag(tag).unwrap().tag(), tag);
        }
        assert_eq!(PhysicalType::from_tag(0), None);
        assert_eq!(PhysicalType::from_tag(10), None);
    }

    #[test]
    fn test_chunk_keeps_nulls_in_place() {
        let column = PhysicalColumn::Utf8(vec![Some("a".into()), None, Some("ccc".into())]);
        let bytes = column.encode();
        let decoded = PhysicalColumn::decode(PhysicalType::Utf8, 3, &bytes).unwrap();
        assert_eq!(decoded, column);
    }

    #[test]
    fn test_chunk_rejects_truncation_and_trailing_bytes() {
        let column = PhysicalColumn::Int64(vec![Some(1), Some(2)]);
        let bytes = column.encode();
        assert!(PhysicalColumn::decode(PhysicalType::Int64, 2, &bytes[..bytes.len() - 1]).is_err());
        let mut padded = bytes.clone();
        padded.push(0);
        assert!(PhysicalColumn::decode(PhysicalType::Int64, 2, &padded).is_err());
    }

    #[test]
    fn test_header_checksum_detects_damage() {
        let header = PartitionHeader {
            version: FORMAT_VERSION,
            row_count: 10,
            columns: vec![ColumnEntry {
                name: "id".into(),
                physical_type: PhysicalType::Int64,
                offset: 64,
                length: 82,
                checksum: 7,
            }],
        };
        let mut bytes = header.encode();
        assert_eq!(bytes.len(), PartitionHeader::encoded_len(["id"]));
        let parsed = PartitionHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, header);

        bytes[8] ^= 0xff;
        let err = PartitionHeader::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(err.contains("checksum"));
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let err = PartitionHeader::read_from(&mut &b"PAR1\x01\x00"[..]).unwrap_err();
        assert!(err.contains("truncated") || err.contains("magic"));
        let mut bytes = PartitionHeader {
            version: FORMAT_VERSION,
            row_count: 0,
            columns: vec![],
        }
        .encode();
        bytes[0] = b'X';
        assert!(PartitionHeader::read_from(&mut bytes.as_slice())
            .unwrap_err()
            .contains("magic"));
    }
}
