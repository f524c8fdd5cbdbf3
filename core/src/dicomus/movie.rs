//! GE movie group cine loop extraction
//!
//! The `GEMS_Ultrasound_MovieGroup_001` private block nests three levels of
//! single-item sequences before reaching the image descriptions and the
//! voxel data groups. Each voxel data group contributes a run of 2D frames
//! sharing one slice size, with a per-frame timestamp array.

use crate::dicomus::tags::{
    first_item, PrivateBlock, GE_MOVIE_CREATOR, GE_MOVIE_GROUP, MOVIE_GROUP_FRAME_COUNT,
    MOVIE_GROUP_TIMESTAMPS, MOVIE_GROUP_VOXELS, MOVIE_IMAGE2D, MOVIE_IMAGE_SIZE, MOVIE_LEVEL1,
    MOVIE_LEVEL2, MOVIE_ROOT, MOVIE_VOXEL_GROUPS,
};
use crate::error::{EchovolError, Result};
use crate::types::{timestamp_key, Frame2d, ImageSequence, SequenceFrame};
use dicom_object::InMemDicomObject;
use log::warn;

/// Reads a GE movie group container into a timestamped frame sequence
///
/// Frames are appended in source order; the sequence index key is the
/// formatted timestamp. Truncated voxel blobs reduce the frame count of
/// their group, and frames without a timestamp are dropped; both degrade
/// with a warning instead of failing the file.
///
/// # Errors
///
/// Fails if the private sequence chain down to the voxel data groups is
/// broken, or if no usable image slice size is declared.
pub fn read_movie_sequence(dcm: &InMemDicomObject) -> Result<ImageSequence> {
    let root = PrivateBlock::find(dcm, GE_MOVIE_GROUP, GE_MOVIE_CREATOR)?;
    let level1_item = first_item(root.sequence(&MOVIE_ROOT)?, &MOVIE_ROOT)?;

    let level1 = PrivateBlock::find(level1_item, GE_MOVIE_GROUP, GE_MOVIE_CREATOR)?;
    let level2_item = first_item(level1.sequence(&MOVIE_LEVEL1)?, &MOVIE_LEVEL1)?;

    let level2 = PrivateBlock::find(level2_item, GE_MOVIE_GROUP, GE_MOVIE_CREATOR)?;
    let image_item = first_item(level2.sequence(&MOVIE_LEVEL2)?, &MOVIE_LEVEL2)?;

    let image = PrivateBlock::find(image_item, GE_MOVIE_GROUP, GE_MOVIE_CREATOR)?;

    let (width, height) = image_slice_size(&image)?;
    let slice_bytes = width as usize * height as usize;

    let mut sequence = ImageSequence::new();
    for (group_index, group_item) in image.sequence(&MOVIE_VOXEL_GROUPS)?.iter().enumerate() {
        let group = match PrivateBlock::find(group_item, GE_MOVIE_GROUP, GE_MOVIE_CREATOR) {
            Ok(block) => block,
            Err(e) => {
                warn!("voxel data group {}: {}", group_index, e);
                continue;
            }
        };
        if let Err(e) = read_voxel_group(&group, width, height, slice_bytes, &mut sequence) {
            warn!("voxel data group {}: {}", group_index, e);
        }
    }

    Ok(sequence)
}

/// Slice width/height from the 2D image description items
///
/// The size element is optional per item; the last one seen wins.
fn image_slice_size(image: &PrivateBlock) -> Result<(u32, u32)> {
    let mut width = 0i32;
    let mut height = 0i32;
    for item in image.sequence(&MOVIE_IMAGE2D)? {
        if let Ok(block) = PrivateBlock::find(item, GE_MOVIE_GROUP, GE_MOVIE_CREATOR) {
            if let Ok(values) = block.i32_multi(&MOVIE_IMAGE_SIZE) {
                if values.len() >= 2 {
                    width = values[0];
                    height = values[1];
                }
            }
        }
    }
    if width <= 0 || height <= 0 {
        return Err(EchovolError::MissingGeometry(
            "image slice size not declared in any 2D image item",
        ));
    }
    Ok((width as u32, height as u32))
}

fn read_voxel_group(
    group: &PrivateBlock,
    width: u32,
    height: u32,
    slice_bytes: usize,
    sequence: &mut ImageSequence,
) -> Result<()> {
    let mut frame_count = group.u32(&MOVIE_GROUP_FRAME_COUNT)? as usize;
    let timestamps = group.f64_array(&MOVIE_GROUP_TIMESTAMPS)?;
    let voxels = group.bytes(&MOVIE_GROUP_VOXELS)?;

    if voxels.len() < slice_bytes * frame_count {
        warn!(
            "missing frames in frame buffer: {} of {} bytes present",
            voxels.len(),
            slice_bytes * frame_count
        );
        frame_count = voxels.len() / slice_bytes;
    }

    for frame_index in 0..frame_count {
        let timestamp = match timestamps.get(frame_index) {
            Some(&t) => t,
            None => {
                warn!("missing timestamp for frame {} - skip frame", frame_index);
                continue;
            }
        };
        let pixels = voxels[frame_index * slice_bytes..(frame_index + 1) * slice_bytes].to_vec();
        sequence.push(SequenceFrame {
            index_key: timestamp_key(timestamp),
            timestamp_s: timestamp,
            image: Frame2d {
                width,
                height,
                pixels,
            },
        });
    }
    Ok(())
}
