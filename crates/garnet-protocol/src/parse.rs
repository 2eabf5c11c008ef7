//! Incremental request parser.
//!
//! Operates on buffered byte slices. The caller is responsible for
//! reading data from the network into a buffer; the parser is purely
//! synchronous and never consumes past the end of one frame, so a
//! pipelined client can leave the next request sitting in the buffer.
//!
//! Requests follow a fixed grammar: one array header, then exactly that
//! many bulk strings. Anything else is a framing error.

use std::io::Cursor;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::value::Value;

/// Maximum number of elements a request array may declare. Caps the
/// `Vec` allocation a hostile header could otherwise trigger.
const MAX_ARRAY_ELEMENTS: usize = 1_048_576;

/// Maximum length of a single bulk string (512 MB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Parses one complete request array from `buf`.
///
/// Returns `Ok(Some((value, consumed)))` when a full frame was parsed,
/// `Ok(None)` when the buffer doesn't contain a complete frame yet, or
/// `Err(...)` when the data is malformed.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Value, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf);

    match try_parse_array(&mut cursor) {
        Ok(value) => {
            let consumed = cursor.position() as usize;
            Ok(Some((value, consumed)))
        }
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn try_parse_array(cursor: &mut Cursor<&[u8]>) -> Result<Value, ProtocolError> {
    let prefix = read_byte(cursor)?;
    if prefix != b'*' {
        return Err(ProtocolError::ExpectedArray(prefix));
    }

    let count = read_integer_line(cursor)?;
    if count < 0 {
        return Err(ProtocolError::InvalidLength(count));
    }
    let count = count as usize;
    if count > MAX_ARRAY_ELEMENTS {
        return Err(ProtocolError::TooManyElements(count));
    }

    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(try_parse_bulk(cursor)?);
    }
    Ok(Value::Array(items))
}

fn try_parse_bulk(cursor: &mut Cursor<&[u8]>) -> Result<Value, ProtocolError> {
    let prefix = read_byte(cursor)?;
    if prefix != b'$' {
        return Err(ProtocolError::ExpectedBulk(prefix));
    }

    let len = read_integer_line(cursor)?;
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    if len > MAX_BULK_LEN {
        return Err(ProtocolError::BulkTooLarge(len as usize));
    }
    let len = len as usize;

    // need `len` payload bytes plus the trailing \r\n
    let pos = cursor.position() as usize;
    let buf = *cursor.get_ref();
    if buf.len() - pos < len + 2 {
        return Err(ProtocolError::Incomplete);
    }
    if buf[pos + len] != b'\r' || buf[pos + len + 1] != b'\n' {
        return Err(ProtocolError::MissingTerminator);
    }

    cursor.set_position((pos + len + 2) as u64);
    Ok(Value::Bulk(Bytes::copy_from_slice(&buf[pos..pos + len])))
}

// ---------------------------------------------------------------------------
// low-level cursor helpers
// ---------------------------------------------------------------------------

fn read_byte(cursor: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    let pos = cursor.position() as usize;
    if pos >= cursor.get_ref().len() {
        return Err(ProtocolError::Incomplete);
    }
    cursor.set_position((pos + 1) as u64);
    Ok(cursor.get_ref()[pos])
}

/// Reads a header line as an i64, advancing past the `\r\n`.
fn read_integer_line(cursor: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let buf = *cursor.get_ref();
    let start = cursor.position() as usize;

    // memchr scans for \r far faster than a byte-at-a-time loop
    let mut pos = start;
    while let Some(offset) = memchr::memchr(b'\r', &buf[pos..]) {
        let cr = pos + offset;
        if cr + 1 < buf.len() {
            if buf[cr + 1] == b'\n' {
                cursor.set_position((cr + 2) as u64);
                return parse_i64_bytes(&buf[start..cr]);
            }
            // bare \r, keep scanning
            pos = cr + 1;
        } else {
            break;
        }
    }

    Err(ProtocolError::Incomplete)
}

/// Parses an i64 from raw digits without allocating.
fn parse_i64_bytes(digits: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add((b - b'0') as i64))
            .ok_or(ProtocolError::InvalidInteger)?;
    }
    Ok(if negative { -n } else { n })
}
