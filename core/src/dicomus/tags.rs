use crate::error::{EchovolError, Result};
use byteorder::{ByteOrder, LittleEndian};
use dicom_core::{PrimitiveValue, Tag};
use dicom_object::InMemDicomObject;

// GE movie group container, group 0x7FE1
pub const GE_MOVIE_GROUP: u16 = 0x7FE1;
pub const GE_MOVIE_CREATOR: &str = "GEMS_Ultrasound_MovieGroup_001";

pub const MOVIE_ROOT: PrivateElement = PrivateElement::new(0x01, "movie group root");
pub const MOVIE_LEVEL1: PrivateElement = PrivateElement::new(0x10, "movie group level 1");
pub const MOVIE_LEVEL2: PrivateElement = PrivateElement::new(0x20, "movie group level 2");
pub const MOVIE_IMAGE2D: PrivateElement = PrivateElement::new(0x26, "2D image descriptions");
pub const MOVIE_IMAGE_SIZE: PrivateElement = PrivateElement::new(0x86, "image slice size");
pub const MOVIE_VOXEL_GROUPS: PrivateElement = PrivateElement::new(0x36, "voxel data groups");
pub const MOVIE_GROUP_FRAME_COUNT: PrivateElement =
    PrivateElement::new(0x37, "voxel data group frame count");
pub const MOVIE_GROUP_TIMESTAMPS: PrivateElement =
    PrivateElement::new(0x43, "voxel data group timestamps");
pub const MOVIE_GROUP_VOXELS: PrivateElement =
    PrivateElement::new(0x60, "voxel data group voxels");

// Philips 4D US container, group 0x200D
pub const PHILIPS_GROUP: u16 = 0x200D;
pub const PHILIPS_CREATOR: &str = "Philips US Imaging DD 109";

pub const PHILIPS_ROOT: PrivateElement = PrivateElement::new(0x01, "4D US data root");
pub const PHILIPS_STREAM_GROUP: PrivateElement = PrivateElement::new(0x10, "4D US stream group");
pub const PHILIPS_STREAMS: PrivateElement = PrivateElement::new(0x20, "4D US data streams");
pub const PHILIPS_DATATYPE: PrivateElement = PrivateElement::new(0x02, "stream datatype label");
pub const PHILIPS_COMPRESSION: PrivateElement =
    PrivateElement::new(0x03, "stream compression scheme");
pub const PHILIPS_FRAME_COUNT: PrivateElement = PrivateElement::new(0x04, "stream frame count");
pub const PHILIPS_FRAME_ALLOC: PrivateElement =
    PrivateElement::new(0x05, "stream frame allocated size");
pub const PHILIPS_CRC_HEADERS: PrivateElement = PrivateElement::new(0x0A, "stream CRC headers");
pub const PHILIPS_PAYLOAD: PrivateElement = PrivateElement::new(0x0B, "stream payload");

// Embedded Kretz payload, group 0x7FE1
pub const KRETZ_GROUP: u16 = 0x7FE1;
pub const KRETZ_CREATOR: &str = "KRETZ_US";
pub const KRETZ_PAYLOAD: PrivateElement = PrivateElement::new(0x01, "Kretz payload");

/// One known element of a vendor private block
///
/// Private tags are identified by `(group, element, creator)`: the creator
/// string claims a block slot in the group, and the element's high byte is
/// the slot it landed in. These descriptors are the static side of that
/// mapping; [`PrivateBlock`] binds them to a dataset.
#[derive(Debug, Clone, Copy)]
pub struct PrivateElement {
    pub element: u8,
    pub name: &'static str,
}

impl PrivateElement {
    pub const fn new(element: u8, name: &'static str) -> Self {
        Self { element, name }
    }
}

/// A resolved private creator block within one dataset
///
/// Scans the creator slots `(group, 0x0010..=0x00FF)` once; element lookups
/// then go straight to `(group, slot << 8 | element)`. Each lookup fails
/// independently with an error naming the missing element.
pub struct PrivateBlock<'a> {
    dcm: &'a InMemDicomObject,
    group: u16,
    creator: &'static str,
    slot: u8,
}

impl<'a> PrivateBlock<'a> {
    /// Locates the creator's block slot in `group`
    pub fn find(
        dcm: &'a InMemDicomObject,
        group: u16,
        creator: &'static str,
    ) -> Result<Self> {
        let slot = (0x10..=0xFFu16)
            .find(|&slot| {
                get_string_value(dcm, Tag(group, slot))
                    .map(|value| value == creator)
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                EchovolError::MissingTag(format!("({:04x}) private creator \"{}\"", group, creator))
            })?;
        Ok(Self {
            dcm,
            group,
            creator,
            slot: slot as u8,
        })
    }

    /// Tag of `element` inside this block
    pub fn tag(&self, element: &PrivateElement) -> Tag {
        Tag(self.group, ((self.slot as u16) << 8) | element.element as u16)
    }

    fn missing(&self, element: &PrivateElement) -> EchovolError {
        let tag = self.tag(element);
        EchovolError::MissingTag(format!(
            "({:04x},{:04x}) {} {}",
            tag.0, tag.1, self.creator, element.name
        ))
    }

    /// Items of a sequence element
    pub fn sequence(&self, element: &PrivateElement) -> Result<&'a [InMemDicomObject]> {
        self.dcm
            .element(self.tag(element))
            .ok()
            .and_then(|elem| elem.items())
            .map(|items| items.as_ref())
            .ok_or_else(|| self.missing(element))
    }

    pub fn string(&self, element: &PrivateElement) -> Result<String> {
        get_string_value(self.dcm, self.tag(element)).ok_or_else(|| self.missing(element))
    }

    pub fn u32(&self, element: &PrivateElement) -> Result<u32> {
        get_u32_value(self.dcm, self.tag(element)).ok_or_else(|| self.missing(element))
    }

    pub fn i32_multi(&self, element: &PrivateElement) -> Result<Vec<i32>> {
        get_multi_i32_value(self.dcm, self.tag(element)).ok_or_else(|| self.missing(element))
    }

    pub fn bytes(&self, element: &PrivateElement) -> Result<Vec<u8>> {
        get_byte_value(self.dcm, self.tag(element)).ok_or_else(|| self.missing(element))
    }

    pub fn f64_array(&self, element: &PrivateElement) -> Result<Vec<f64>> {
        get_f64_array_value(self.dcm, self.tag(element)).ok_or_else(|| self.missing(element))
    }
}

/// First item of a private sequence
pub fn first_item<'a>(
    items: &'a [InMemDicomObject],
    element: &PrivateElement,
) -> Result<&'a InMemDicomObject> {
    items.first().ok_or_else(|| {
        EchovolError::Dicom(format!("{} sequence expected to have items", element.name))
    })
}

/// Helper to get string value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to string
pub fn get_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Helper to get u32 value from DICOM tag
///
/// Accepts integer VRs as well as raw little-endian bytes in an OB element.
pub fn get_u32_value(dcm: &InMemDicomObject, tag: Tag) -> Option<u32> {
    let elem = dcm.element(tag).ok()?;
    if let Ok(value) = elem.to_int::<u32>() {
        return Some(value);
    }
    match elem.value().primitive() {
        Some(PrimitiveValue::U8(bytes)) if bytes.len() >= 4 => {
            Some(LittleEndian::read_u32(&bytes[..4]))
        }
        _ => None,
    }
}

/// Helper to get multiple i32 values from DICOM tag
pub fn get_multi_i32_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<i32>> {
    let elem = dcm.element(tag).ok()?;
    if let Ok(values) = elem.to_multi_int::<i32>() {
        return Some(values);
    }
    match elem.value().primitive() {
        Some(PrimitiveValue::U8(bytes)) => Some(
            bytes
                .chunks_exact(4)
                .map(LittleEndian::read_i32)
                .collect(),
        ),
        _ => None,
    }
}

/// Helper to get the raw byte payload of an OB/OW DICOM tag
pub fn get_byte_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<u8>> {
    match dcm.element(tag).ok()?.value().primitive()? {
        PrimitiveValue::U8(bytes) => Some(bytes.to_vec()),
        _ => None,
    }
}

/// Helper to get an f64 array from DICOM tag
///
/// Accepts a native FD array or raw little-endian bytes in an OB element.
pub fn get_f64_array_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    let elem = dcm.element(tag).ok()?;
    match elem.value().primitive()? {
        PrimitiveValue::F64(values) => Some(values.to_vec()),
        PrimitiveValue::U8(bytes) => Some(f64_slice_le(bytes)),
        _ => None,
    }
}

/// Decodes a little-endian f64 array from raw bytes, ignoring a trailing
/// partial element
pub fn f64_slice_le(bytes: &[u8]) -> Vec<f64> {
    bytes.chunks_exact(8).map(LittleEndian::read_f64).collect()
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::*;
    use dicom_core::value::DataSetSequence;
    use dicom_core::{DataElement, VR};

    /// Claims a private creator slot in a test dataset
    pub fn put_creator(dcm: &mut InMemDicomObject, group: u16, slot: u16, creator: &str) {
        dcm.put(DataElement::new(
            Tag(group, slot),
            VR::LO,
            PrimitiveValue::from(creator),
        ));
    }

    /// Puts a private element value at `(group, slot << 8 | element)`
    pub fn put_private(
        dcm: &mut InMemDicomObject,
        group: u16,
        slot: u16,
        element: &PrivateElement,
        vr: VR,
        value: PrimitiveValue,
    ) {
        dcm.put(DataElement::new(
            Tag(group, (slot << 8) | element.element as u16),
            vr,
            value,
        ));
    }

    /// Puts a private sequence element with the given items
    pub fn put_private_seq(
        dcm: &mut InMemDicomObject,
        group: u16,
        slot: u16,
        element: &PrivateElement,
        items: Vec<InMemDicomObject>,
    ) {
        dcm.put(DataElement::new(
            Tag(group, (slot << 8) | element.element as u16),
            VR::SQ,
            DataSetSequence::from(items),
        ));
    }
}
