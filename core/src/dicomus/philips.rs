//! Philips 4D US private-tag frame set extraction
//!
//! QLAB exports hide their cine data behind the `Philips US Imaging DD 109`
//! private block: a chain of single-item sequences ends in one item per
//! data stream, each carrying a datatype label, a compression scheme tag,
//! frame bookkeeping and the payload itself. This path extracts and
//! decompresses the frames; it does not attempt to assemble them into a
//! volume, since the containers carry no usable geometry for that.

use crate::dicomus::frames::{self, CompressedFrameSet, CompressionScheme, FrameHeader};
use crate::dicomus::tags::{
    first_item, PrivateBlock, PHILIPS_COMPRESSION, PHILIPS_CRC_HEADERS, PHILIPS_CREATOR,
    PHILIPS_DATATYPE, PHILIPS_FRAME_ALLOC, PHILIPS_FRAME_COUNT, PHILIPS_GROUP, PHILIPS_PAYLOAD,
    PHILIPS_ROOT, PHILIPS_STREAMS, PHILIPS_STREAM_GROUP,
};
use crate::error::Result;
use dicom_object::InMemDicomObject;

/// One extracted and decompressed data stream
#[derive(Debug, Clone)]
pub struct ExtractedFrameSet {
    /// Datatype label of the stream, e.g. `UDM_USD_DATATYPE_DIN_3D_ECHO`
    pub datatype: String,
    pub scheme: CompressionScheme,
    /// Declared per-frame allocated byte size, header included
    pub frame_alloc_size: u32,
    /// One record per declared frame, from the CRC header blob
    pub headers: Vec<FrameHeader>,
    /// Byte offset of each frame record within the payload
    pub offsets: Vec<u32>,
    /// Recovered pixel bytes per frame
    pub frames: Vec<Vec<u8>>,
}

impl ExtractedFrameSet {
    /// Byte size of one recovered frame
    pub fn frame_size(&self) -> usize {
        self.frames.first().map(|f| f.len()).unwrap_or(0)
    }
}

/// Extracts every data stream of a Philips 4D US container
///
/// The private chain is validated level by level; a missing element at any
/// depth fails the whole file with an error naming that element. Frames of
/// a corrupt stream are never partially emitted.
pub fn extract_frame_sets(dcm: &InMemDicomObject) -> Result<Vec<ExtractedFrameSet>> {
    let root = PrivateBlock::find(dcm, PHILIPS_GROUP, PHILIPS_CREATOR)?;
    let level1_item = first_item(root.sequence(&PHILIPS_ROOT)?, &PHILIPS_ROOT)?;

    let level1 = PrivateBlock::find(level1_item, PHILIPS_GROUP, PHILIPS_CREATOR)?;
    let streams_item = first_item(
        level1.sequence(&PHILIPS_STREAM_GROUP)?,
        &PHILIPS_STREAM_GROUP,
    )?;

    let streams = PrivateBlock::find(streams_item, PHILIPS_GROUP, PHILIPS_CREATOR)?;

    let mut sets = Vec::new();
    for stream_item in streams.sequence(&PHILIPS_STREAMS)? {
        sets.push(extract_stream(stream_item)?);
    }
    Ok(sets)
}

fn extract_stream(item: &InMemDicomObject) -> Result<ExtractedFrameSet> {
    let stream = PrivateBlock::find(item, PHILIPS_GROUP, PHILIPS_CREATOR)?;

    let datatype = stream.string(&PHILIPS_DATATYPE)?;
    log_unknown_datatype(&datatype);

    let scheme = CompressionScheme::from_tag(&stream.bytes(&PHILIPS_COMPRESSION)?)?;
    let frame_count = stream.u32(&PHILIPS_FRAME_COUNT)?;
    let frame_alloc_size = stream.u32(&PHILIPS_FRAME_ALLOC)?;
    let headers = frames::parse_frame_headers(&stream.bytes(&PHILIPS_CRC_HEADERS)?, frame_count)?;
    let payload = stream.bytes(&PHILIPS_PAYLOAD)?;

    let set = CompressedFrameSet {
        scheme,
        frame_count,
        frame_alloc_size,
        headers,
        payload,
    };
    let unpacked = frames::unpack(&set)?;

    Ok(ExtractedFrameSet {
        datatype,
        scheme,
        frame_alloc_size,
        headers: set.headers,
        offsets: unpacked.offsets,
        frames: unpacked.frames,
    })
}

// Datatype labels observed in QLAB exports. Logging aid only, never used
// for control flow.
#[cfg(debug_assertions)]
const KNOWN_DATATYPES: &[&str] = &[
    "UDM_USD_DATATYPE_DIN_2D_ECHO",
    "UDM_USD_DATATYPE_DIN_2D_ECHO_CONTRAST",
    "UDM_USD_DATATYPE_DIN_2D_COLOR_FLOW",
    "UDM_USD_DATATYPE_DIN_3D_ECHO",
    "UDM_USD_DATATYPE_DIN_4D_ECHO",
    "UDM_USD_DATATYPE_DIN_DOPPLER_CW",
    "UDM_USD_DATATYPE_DIN_DOPPLER_PW",
    "UDM_USD_DATATYPE_DIN_MMODE_ECHO",
    "UDM_USD_DATATYPE_DIN_MMODE_COLOR_FLOW",
    "UDM_USD_DATATYPE_DIN_PHYSIO",
    "UDM_USD_DATATYPE_DIN_PARAM_BLOCK",
    "UDM_USD_DATATYPE_DIN_XFOV_REALTIME",
];

#[cfg(debug_assertions)]
fn log_unknown_datatype(label: &str) {
    if !KNOWN_DATATYPES.contains(&label) {
        log::debug!("unrecognized datatype label: {}", label);
    }
}

#[cfg(not(debug_assertions))]
fn log_unknown_datatype(_label: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicomus::frames::{FRAME_HEADER_RECORD_SIZE, RAW_FRAME_HEADER_SIZE};
    use crate::dicomus::tags::testdata::{put_creator, put_private, put_private_seq};
    use crate::error::EchovolError;
    use dicom_core::{PrimitiveValue, VR};

    const SLOT: u16 = 0x10;

    fn with_creator() -> InMemDicomObject {
        let mut dcm = InMemDicomObject::new_empty();
        put_creator(&mut dcm, PHILIPS_GROUP, SLOT, PHILIPS_CREATOR);
        dcm
    }

    fn stream_item(
        datatype: &str,
        scheme_tag: &[u8; 4],
        frame_count: u32,
        frame_alloc_size: u32,
        payload: Vec<u8>,
    ) -> InMemDicomObject {
        let mut item = with_creator();
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_DATATYPE,
            VR::LO,
            PrimitiveValue::from(datatype),
        );
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_COMPRESSION,
            VR::OB,
            PrimitiveValue::U8(scheme_tag.to_vec().into()),
        );
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_FRAME_COUNT,
            VR::UL,
            PrimitiveValue::from(frame_count),
        );
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_FRAME_ALLOC,
            VR::UL,
            PrimitiveValue::from(frame_alloc_size),
        );
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_CRC_HEADERS,
            VR::OB,
            PrimitiveValue::U8(vec![0u8; frame_count as usize * FRAME_HEADER_RECORD_SIZE].into()),
        );
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_PAYLOAD,
            VR::OB,
            PrimitiveValue::U8(payload.into()),
        );
        item
    }

    fn philips_object(streams: Vec<InMemDicomObject>) -> InMemDicomObject {
        let mut streams_item = with_creator();
        put_private_seq(&mut streams_item, PHILIPS_GROUP, SLOT, &PHILIPS_STREAMS, streams);

        let mut level1_item = with_creator();
        put_private_seq(
            &mut level1_item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_STREAM_GROUP,
            vec![streams_item],
        );

        let mut dcm = with_creator();
        put_private_seq(&mut dcm, PHILIPS_GROUP, SLOT, &PHILIPS_ROOT, vec![level1_item]);
        dcm
    }

    fn raw_payload(frame_count: usize, alloc: usize, fill: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        for _ in 0..frame_count {
            payload.extend_from_slice(&vec![0xEE; RAW_FRAME_HEADER_SIZE]);
            payload.extend_from_slice(&vec![fill; alloc - RAW_FRAME_HEADER_SIZE]);
        }
        payload
    }

    #[test]
    fn test_extract_raw_stream() {
        let dcm = philips_object(vec![stream_item(
            "UDM_USD_DATATYPE_DIN_3D_ECHO",
            b"None",
            2,
            48,
            raw_payload(2, 48, 0x5A),
        )]);
        let sets = extract_frame_sets(&dcm).unwrap();
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.scheme, CompressionScheme::Raw);
        assert_eq!(set.frames.len(), 2);
        assert_eq!(set.frame_size(), 48 - RAW_FRAME_HEADER_SIZE);
        assert_eq!(set.headers.len(), 2);
        assert!(set.frames.iter().all(|f| f.iter().all(|&b| b == 0x5A)));
    }

    #[test]
    fn test_multiple_streams_extracted_in_order() {
        let dcm = philips_object(vec![
            stream_item("UDM_USD_DATATYPE_DIN_2D_ECHO", b"None", 1, 32, raw_payload(1, 32, 1)),
            stream_item("UDM_USD_DATATYPE_DIN_PHYSIO", b"None", 1, 24, raw_payload(1, 24, 2)),
        ]);
        let sets = extract_frame_sets(&dcm).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].datatype, "UDM_USD_DATATYPE_DIN_2D_ECHO");
        assert_eq!(sets[1].datatype, "UDM_USD_DATATYPE_DIN_PHYSIO");
        assert_eq!(sets[1].frame_size(), 24 - RAW_FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_unknown_scheme_is_fatal() {
        let dcm = philips_object(vec![stream_item(
            "UDM_USD_DATATYPE_DIN_2D_ECHO",
            b"LZ4\0",
            1,
            32,
            raw_payload(1, 32, 0),
        )]);
        assert!(matches!(
            extract_frame_sets(&dcm),
            Err(EchovolError::UnknownCompression(_))
        ));
    }

    #[test]
    fn test_missing_chain_level_is_fatal() {
        // Root present but the stream group level is absent
        let mut dcm = with_creator();
        put_private_seq(&mut dcm, PHILIPS_GROUP, SLOT, &PHILIPS_ROOT, vec![with_creator()]);
        let err = extract_frame_sets(&dcm).unwrap_err();
        assert!(format!("{}", err).contains(PHILIPS_STREAM_GROUP.name));
    }

    #[test]
    fn test_missing_payload_is_fatal() {
        let mut item = with_creator();
        put_private(
            &mut item,
            PHILIPS_GROUP,
            SLOT,
            &PHILIPS_DATATYPE,
            VR::LO,
            PrimitiveValue::from("UDM_USD_DATATYPE_DIN_2D_ECHO"),
        );
        let dcm = philips_object(vec![item]);
        assert!(matches!(
            extract_frame_sets(&dcm),
            Err(EchovolError::MissingTag(_))
        ));
    }
}
