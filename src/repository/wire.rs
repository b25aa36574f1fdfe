//! Length-prefixed JSON record streams.
//!
//! Remote list endpoints answer with a sequence of records, each preceded by
//! a continuation flag, and a final `F` flag:
//!
//! ```text
//! T\n
//! 27\n
//! {"symbol":"pp-p1", ...}
//! T\n
//! ...
//! F\n
//! ```

use crate::core::PpError;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encodes `items` as a record stream.
pub fn encode_records<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for item in items {
        let json = serde_json::to_vec(item)?;
        out.extend_from_slice(b"T\n");
        out.extend_from_slice(format!("{}\n", json.len()).as_bytes());
        out.extend_from_slice(&json);
    }
    out.extend_from_slice(b"F\n");
    Ok(out)
}

fn protocol_error(message: impl Into<String>) -> anyhow::Error {
    PpError::Protocol {
        message: message.into(),
    }
    .into()
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn line(&mut self) -> Result<&'a str> {
        let rest = &self.bytes[self.offset..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| protocol_error("record stream ended without terminator"))?;
        self.offset += end + 1;
        std::str::from_utf8(&rest[..end]).map_err(|_| protocol_error("record header is not UTF-8"))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let rest = &self.bytes[self.offset..];
        if rest.len() < len {
            return Err(protocol_error(format!(
                "record of {len} bytes truncated to {}",
                rest.len()
            )));
        }
        self.offset += len;
        Ok(&rest[..len])
    }
}

/// Decodes a complete record stream.
///
/// # Errors
///
/// Returns [`PpError::Protocol`] for a missing terminator, an unknown flag,
/// a zero or non-numeric length, truncated records or trailing bytes.
pub fn decode_records<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut reader = Reader {
        bytes,
        offset: 0,
    };
    let mut items = Vec::new();

    loop {
        match reader.line()? {
            "T" => {
                let header = reader.line()?;
                let len: usize = header
                    .parse()
                    .map_err(|_| protocol_error(format!("invalid record length '{header}'")))?;
                if len == 0 {
                    return Err(protocol_error("record length must be positive"));
                }
                let record = reader.take(len)?;
                let index = items.len();
                let item = serde_json::from_slice(record)
                    .map_err(|e| protocol_error(format!("record {index} is not valid: {e}")))?;
                items.push(item);
            }
            "F" => break,
            other => return Err(protocol_error(format!("unexpected flag '{other}'"))),
        }
    }

    if reader.offset != bytes.len() {
        return Err(protocol_error("trailing bytes after record stream"));
    }
    Ok(items)
}
