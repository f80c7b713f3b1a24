//! Binary encoding of a counting table for transfer to the coordinator
//!
//! Layout (little-endian):
//!   magic u32 | version u32 | count u64 | count x { key_len u32 | key | value i64 }
//!
//! The decoder merges each entry into the destination as soon as it is
//! parsed; there is no intermediate table.

use crate::count_table::CountTable;
use crate::error::WireError;

pub const MAGIC: u32 = 0x4C42_5443; // "CTBL"
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// Serialize every entry of `table`
pub fn encode_table(table: &CountTable) -> Vec<u8> {
    let body: usize = table.iter().map(|(k, _)| 4 + k.len() + 8).sum();
    let mut out = Vec::with_capacity(HEADER_LEN + body);

    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(table.len() as u64).to_le_bytes());

    for (key, count) in table.iter() {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&count.to_le_bytes());
    }
    out
}

/// Parse `payload` and add each entry into `dest`. Returns the entry count.
pub fn merge_encoded(dest: &mut CountTable, payload: &[u8]) -> Result<u64, WireError> {
    let mut cur = Cursor::new(payload);

    let magic = cur.u32()?;
    if magic != MAGIC {
        return Err(WireError::BadMagic { found: magic });
    }
    let version = cur.u32()?;
    if version != VERSION {
        return Err(WireError::UnsupportedVersion { found: version });
    }
    let count = cur.u64()?;

    for _ in 0..count {
        let key_len = cur.u32()? as usize;
        let key_offset = cur.offset;
        let key = std::str::from_utf8(cur.take(key_len)?)
            .map_err(|_| WireError::InvalidKey { offset: key_offset })?;
        let value = cur.i64()?;
        dest.increment(key, value);
    }

    let rest = payload.len() - cur.offset;
    if rest != 0 {
        return Err(WireError::TrailingBytes { count: rest });
    }
    Ok(count)
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let available = self.data.len() - self.offset;
        if n > available {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed: n - available,
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
