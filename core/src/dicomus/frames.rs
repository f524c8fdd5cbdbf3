//! Frame framing and decompression for the Philips 4D US container
//!
//! Two schemes appear in the wild, selected by a 4-byte ASCII tag next to
//! the payload: `"None"` (concatenated fixed-size raw records) and `"ZLib"`
//! (an offset table over deflate-compressed blocks). Both trim a fixed
//! per-frame header off every record.

use crate::error::{EchovolError, Result};
use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use log::warn;
use std::io::Read;

/// Per-frame header size inside a "ZLib" payload, bytes
pub const ZLIB_FRAME_HEADER_SIZE: usize = 32;

/// Per-frame header size of a "None" (raw) record, bytes
pub const RAW_FRAME_HEADER_SIZE: usize = 16;

/// Size of one record in the CRC header blob, bytes
pub const FRAME_HEADER_RECORD_SIZE: usize = 16;

/// Compression scheme of a frame payload, from its 4-byte ASCII tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionScheme {
    /// `"ZLib"`: offset table over deflate-compressed blocks
    Zlib,
    /// `"None"`: concatenated fixed-size raw records
    Raw,
}

impl CompressionScheme {
    /// Decodes the scheme from its 4-byte tag
    ///
    /// # Errors
    ///
    /// Any tag other than `"ZLib"` or `"None"` is fatal.
    pub fn from_tag(tag: &[u8]) -> Result<Self> {
        match tag.get(..4) {
            Some(b"ZLib") => Ok(Self::Zlib),
            Some(b"None") => Ok(Self::Raw),
            _ => Err(EchovolError::UnknownCompression(
                String::from_utf8_lossy(tag).into_owned(),
            )),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Zlib => "ZLib",
            Self::Raw => "None",
        }
    }
}

/// One 16-byte record of the CRC header blob, one per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub val0: u32,
    pub val1: [u16; 2],
    pub val2: [u16; 2],
    pub img_size: u32,
}

impl FrameHeader {
    fn read(bytes: &[u8]) -> Self {
        Self {
            val0: LittleEndian::read_u32(&bytes[0..4]),
            val1: [
                LittleEndian::read_u16(&bytes[4..6]),
                LittleEndian::read_u16(&bytes[6..8]),
            ],
            val2: [
                LittleEndian::read_u16(&bytes[8..10]),
                LittleEndian::read_u16(&bytes[10..12]),
            ],
            img_size: LittleEndian::read_u32(&bytes[12..16]),
        }
    }
}

/// Parses the CRC header blob into one [`FrameHeader`] per frame
pub fn parse_frame_headers(blob: &[u8], frame_count: u32) -> Result<Vec<FrameHeader>> {
    let expected = frame_count as usize * FRAME_HEADER_RECORD_SIZE;
    if blob.len() < expected {
        return Err(EchovolError::ShortRead {
            context: "CRC header blob",
            expected: expected as u64,
            found: blob.len() as u64,
        });
    }
    Ok(blob[..expected]
        .chunks_exact(FRAME_HEADER_RECORD_SIZE)
        .map(FrameHeader::read)
        .collect())
}

/// A frame set as carried by the container, before unpacking
#[derive(Debug, Clone)]
pub struct CompressedFrameSet {
    pub scheme: CompressionScheme,
    /// Declared number of frames
    pub frame_count: u32,
    /// Declared per-frame allocated byte size, header included
    pub frame_alloc_size: u32,
    /// One header record per frame, from the CRC blob
    pub headers: Vec<FrameHeader>,
    /// Compressed or raw frame records
    pub payload: Vec<u8>,
}

/// Frames recovered from a [`CompressedFrameSet`]
#[derive(Debug, Clone)]
pub struct UnpackedFrames {
    /// Byte offset of each frame record within the payload
    pub offsets: Vec<u32>,
    /// Pixel bytes per frame, headers trimmed off
    pub frames: Vec<Vec<u8>>,
}

/// Recovers the per-frame pixel bytes of a frame set
///
/// # Errors
///
/// A decompression failure or a block decompressing to the wrong size
/// aborts the whole set: the offset table cannot be trusted past a corrupt
/// block.
pub fn unpack(set: &CompressedFrameSet) -> Result<UnpackedFrames> {
    match set.scheme {
        CompressionScheme::Raw => unpack_raw(set),
        CompressionScheme::Zlib => unpack_zlib(set),
    }
}

fn unpack_raw(set: &CompressedFrameSet) -> Result<UnpackedFrames> {
    let alloc = set.frame_alloc_size as usize;
    if alloc <= RAW_FRAME_HEADER_SIZE {
        return Err(EchovolError::Decompression(format!(
            "raw frame allocation size {} does not fit a {}-byte header",
            alloc, RAW_FRAME_HEADER_SIZE
        )));
    }

    let mut count = set.frame_count as usize;
    if set.payload.len() < count * alloc {
        warn!(
            "raw frame payload holds {} of {} declared bytes, truncating frame count",
            set.payload.len(),
            count * alloc
        );
        count = set.payload.len() / alloc;
    }

    let mut offsets = Vec::with_capacity(count);
    let mut frames = Vec::with_capacity(count);
    for index in 0..count {
        let offset = index * alloc;
        offsets.push(offset as u32);
        frames.push(set.payload[offset + RAW_FRAME_HEADER_SIZE..offset + alloc].to_vec());
    }
    Ok(UnpackedFrames { offsets, frames })
}

fn unpack_zlib(set: &CompressedFrameSet) -> Result<UnpackedFrames> {
    let payload = &set.payload;
    if payload.len() < 8 {
        return Err(EchovolError::ShortRead {
            context: "compressed frame table",
            expected: 8,
            found: payload.len() as u64,
        });
    }
    let total_size = LittleEndian::read_u32(&payload[0..4]) as usize;
    let count = LittleEndian::read_u32(&payload[4..8]) as usize;
    if count as u32 != set.frame_count {
        warn!(
            "compressed frame table declares {} frames, container declared {}",
            count, set.frame_count
        );
    }

    let table_end = 8 + count * 4;
    if payload.len() < table_end {
        return Err(EchovolError::ShortRead {
            context: "compressed frame table",
            expected: table_end as u64,
            found: payload.len() as u64,
        });
    }
    let offsets: Vec<u32> = payload[8..table_end]
        .chunks_exact(4)
        .map(LittleEndian::read_u32)
        .collect();

    let alloc = set.frame_alloc_size as usize;
    if alloc <= ZLIB_FRAME_HEADER_SIZE {
        return Err(EchovolError::Decompression(format!(
            "frame allocation size {} does not fit a {}-byte header",
            alloc, ZLIB_FRAME_HEADER_SIZE
        )));
    }
    let expected_frame_size = alloc - ZLIB_FRAME_HEADER_SIZE;

    let mut frames = Vec::with_capacity(count);
    for index in 0..count {
        let offset = offsets[index] as usize;
        let end = if index + 1 < count {
            offsets[index + 1] as usize
        } else {
            total_size
        };
        if offset + ZLIB_FRAME_HEADER_SIZE > end || end > payload.len() {
            return Err(EchovolError::Decompression(format!(
                "frame {} offset range {}..{} is out of bounds",
                index, offset, end
            )));
        }

        let compressed = &payload[offset + ZLIB_FRAME_HEADER_SIZE..end];
        let mut frame = Vec::with_capacity(expected_frame_size);
        ZlibDecoder::new(compressed)
            .read_to_end(&mut frame)
            .map_err(|e| EchovolError::Decompression(format!("frame {}: {}", index, e)))?;
        if frame.len() != expected_frame_size {
            return Err(EchovolError::Decompression(format!(
                "frame {} decompressed to {} bytes, expected {}",
                index,
                frame.len(),
                expected_frame_size
            )));
        }
        frames.push(frame);
    }

    Ok(UnpackedFrames { offsets, frames })
}
