use crate::error::{EchovolError, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Magic header every Kretz stream starts with, including the trailing NUL
pub const KRETZ_MAGIC: &[u8; 17] = b"KRETZFILE 1.0   \0";

/// Header of one tagged item: `u16 group, u16 element, u32 size`, little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub group: u16,
    pub element: u16,
    pub size: u32,
}

impl ItemHeader {
    /// Identity used for dispatch
    pub fn tag(&self) -> (u16, u16) {
        (self.group, self.element)
    }
}

/// Reader for the length-prefixed tag/item stream of a Kretz file
///
/// The format has no resynchronization marker, so an item must be either
/// fully read or fully skipped before the next header is requested.
pub struct ItemStream<R> {
    inner: R,
}

impl<R: Read + Seek> ItemStream<R> {
    /// Opens an item stream at `offset` bytes into `inner`
    ///
    /// The offset supports Kretz payloads embedded mid-file (e.g. inside a
    /// DICOM element). The magic header is verified byte-exactly.
    ///
    /// # Errors
    ///
    /// Returns [`EchovolError::BadMagic`] if the stream does not start with
    /// [`KRETZ_MAGIC`] at the given offset.
    pub fn open(mut inner: R, offset: u64) -> Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        let mut magic = [0u8; KRETZ_MAGIC.len()];
        inner.read_exact(&mut magic).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                EchovolError::BadMagic
            } else {
                EchovolError::Io(e)
            }
        })?;
        if &magic != KRETZ_MAGIC {
            return Err(EchovolError::BadMagic);
        }
        Ok(Self { inner })
    }

    /// Reads the next item header
    ///
    /// Returns `None` at end of stream or on a read error; the two are not
    /// distinguished, both end the scan.
    pub fn next_header(&mut self) -> Option<ItemHeader> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf).ok()?;
        Some(ItemHeader {
            group: LittleEndian::read_u16(&buf[0..2]),
            element: LittleEndian::read_u16(&buf[2..4]),
            size: LittleEndian::read_u32(&buf[4..8]),
        })
    }

    /// Reads exactly the declared data size of `header`
    pub fn read_data(&mut self, header: &ItemHeader) -> Result<Vec<u8>> {
        let mut data = vec![0u8; header.size as usize];
        let mut filled = 0usize;
        while filled < data.len() {
            match self.inner.read(&mut data[filled..]) {
                Ok(0) => {
                    return Err(EchovolError::ShortRead {
                        context: "Kretz item data",
                        expected: header.size as u64,
                        found: filled as u64,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(EchovolError::Io(e)),
            }
        }
        Ok(data)
    }

    /// Skips the declared data size of `header` without buffering it
    pub fn skip(&mut self, header: &ItemHeader) -> Result<()> {
        self.inner.seek(SeekFrom::Current(header.size as i64))?;
        Ok(())
    }
}

/// Encodes one tagged item, for building synthetic streams in tests
#[cfg(test)]
pub(crate) fn encode_item(group: u16, element: u16, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len());
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Concatenates the magic header and the given items, for tests
#[cfg(test)]
pub(crate) fn encode_stream(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = KRETZ_MAGIC.to_vec();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}
