//! Raw CBOR reader.
//!
//! Everything here works on `(buffer, offset)` pairs and never allocates a
//! value tree. Only definite-length items are accepted.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    #[error("indefinite-length item at offset {0} is not supported")]
    IndefiniteLength(usize),
    #[error("reserved additional information {info} at offset {offset}")]
    Reserved { offset: usize, info: u8 },
    #[error("length overflow at offset {0}")]
    Overflow(usize),
    #[error("invalid utf-8 text at offset {0}")]
    InvalidText(usize),
    #[error("trailing bytes after document at offset {0}")]
    TrailingBytes(usize),
    #[error("document root at offset {0} is not a map")]
    NotAMap(usize),
}

/// CBOR major type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Major {
    Unsigned,
    Negative,
    Bytes,
    Text,
    Array,
    Map,
    Tag,
    Simple,
}

impl Major {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Major::Unsigned,
            1 => Major::Negative,
            2 => Major::Bytes,
            3 => Major::Text,
            4 => Major::Array,
            5 => Major::Map,
            6 => Major::Tag,
            _ => Major::Simple,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Major::Unsigned => 0,
            Major::Negative => 1,
            Major::Bytes => 2,
            Major::Text => 3,
            Major::Array => 4,
            Major::Map => 5,
            Major::Tag => 6,
            Major::Simple => 7,
        }
    }
}

/// Decoded item header. For strings `arg` is the byte length, for arrays the
/// item count, for maps the pair count. For simple values and floats the
/// encoded bits are part of the header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub major: Major,
    pub arg: u64,
    pub len: usize,
}

/// Byte range of one encoded value inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueSpan {
    pub offset: u32,
    pub length: u32,
}

impl ValueSpan {
    pub fn new(start: usize, end: usize) -> Result<Self, CborError> {
        let offset = u32::try_from(start).map_err(|_| CborError::Overflow(start))?;
        let length = end
            .checked_sub(start)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(CborError::Overflow(start))?;
        Ok(Self { offset, length })
    }

    pub fn start(&self) -> usize {
        self.offset as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }

    pub fn slice<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], CborError> {
        buf.get(self.start()..self.end())
            .ok_or(CborError::UnexpectedEof(self.start()))
    }
}

pub fn read_header(buf: &[u8], offset: usize) -> Result<Header, CborError> {
    let initial = *buf.get(offset).ok_or(CborError::UnexpectedEof(offset))?;
    let major = Major::from_bits(initial >> 5);
    let info = initial & 0x1f;
    let (arg, len) = match info {
        0..=23 => (u64::from(info), 1),
        24 => (read_be(buf, offset + 1, 1)?, 2),
        25 => (read_be(buf, offset + 1, 2)?, 3),
        26 => (read_be(buf, offset + 1, 4)?, 5),
        27 => (read_be(buf, offset + 1, 8)?, 9),
        31 => return Err(CborError::IndefiniteLength(offset)),
        _ => return Err(CborError::Reserved { offset, info }),
    };
    Ok(Header { major, arg, len })
}

fn read_be(buf: &[u8], offset: usize, width: usize) -> Result<u64, CborError> {
    let bytes = buf
        .get(offset..offset + width)
        .ok_or(CborError::UnexpectedEof(offset))?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Offset just past the value starting at `offset`, nested items included.
pub fn value_end(buf: &[u8], offset: usize) -> Result<usize, CborError> {
    let mut pos = offset;
    let mut pending: u64 = 1;
    while pending > 0 {
        let header = read_header(buf, pos)?;
        pending -= 1;
        let body = pos + header.len;
        pos = match header.major {
            Major::Unsigned | Major::Negative | Major::Simple => body,
            Major::Bytes | Major::Text => {
                let len = usize::try_from(header.arg).map_err(|_| CborError::Overflow(pos))?;
                let end = body.checked_add(len).ok_or(CborError::Overflow(pos))?;
                if end > buf.len() {
                    return Err(CborError::UnexpectedEof(body));
                }
                end
            }
            Major::Array => {
                pending = pending.checked_add(header.arg).ok_or(CborError::Overflow(pos))?;
                body
            }
            Major::Map => {
                let items = header.arg.checked_mul(2).ok_or(CborError::Overflow(pos))?;
                pending = pending.checked_add(items).ok_or(CborError::Overflow(pos))?;
                body
            }
            Major::Tag => {
                pending += 1;
                body
            }
        };
    }
    Ok(pos)
}

/// Span of the value starting at `offset`.
pub fn value_span(buf: &[u8], offset: usize) -> Result<ValueSpan, CborError> {
    let end = value_end(buf, offset)?;
    ValueSpan::new(offset, end)
}

/// Steps over any semantic tags and returns the offset of the tagged item.
pub fn skip_tags(buf: &[u8], mut offset: usize) -> Result<usize, CborError> {
    loop {
        let header = read_header(buf, offset)?;
        if header.major != Major::Tag {
            return Ok(offset);
        }
        offset += header.len;
    }
}

/// Reads a text item, returning the string and the offset after it.
/// Returns `Ok(None)` when the item at `offset` is not text.
pub fn read_text(buf: &[u8], offset: usize) -> Result<Option<(&str, usize)>, CborError> {
    let header = read_header(buf, offset)?;
    if header.major != Major::Text {
        return Ok(None);
    }
    let start = offset + header.len;
    let len = usize::try_from(header.arg).map_err(|_| CborError::Overflow(offset))?;
    let end = start.checked_add(len).ok_or(CborError::Overflow(offset))?;
    let bytes = buf.get(start..end).ok_or(CborError::UnexpectedEof(start))?;
    let text = std::str::from_utf8(bytes).map_err(|_| CborError::InvalidText(start))?;
    Ok(Some((text, end)))
}

/// One key/value pair of a map, located by offsets.
#[derive(Debug, Clone, Copy)]
pub struct MapEntry {
    pub key: usize,
    pub value: usize,
    pub end: usize,
}

/// Iterates the entries of the map whose header starts at `offset`.
pub fn map_entries(buf: &[u8], offset: usize) -> Result<Vec<MapEntry>, CborError> {
    let header = read_header(buf, offset)?;
    debug_assert_eq!(header.major, Major::Map);
    let mut pos = offset + header.len;
    let mut entries = Vec::new();
    for _ in 0..header.arg {
        let key = pos;
        let value = value_end(buf, key)?;
        let end = value_end(buf, value)?;
        entries.push(MapEntry { key, value, end });
        pos = end;
    }
    Ok(entries)
}

/// Offsets of the items of the array whose header starts at `offset`.
pub fn array_items(buf: &[u8], offset: usize) -> Result<Vec<usize>, CborError> {
    let header = read_header(buf, offset)?;
    debug_assert_eq!(header.major, Major::Array);
    let mut pos = offset + header.len;
    let mut items = Vec::new();
    for _ in 0..header.arg {
        items.push(pos);
        pos = value_end(buf, pos)?;
    }
    Ok(items)
}
