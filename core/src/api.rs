use crate::dicomus::philips::ExtractedFrameSet;
use crate::dicomus::tags::{PrivateBlock, KRETZ_CREATOR, KRETZ_GROUP, KRETZ_PAYLOAD};
use crate::dicomus::{movie, philips};
use crate::error::Result;
use crate::kretz::{decode, ItemStream, KretzReadOptions};
use crate::types::{ImageSequence, ScalarVolume};
use dicom_object::InMemDicomObject;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// A decoded volume together with its display name
#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub name: String,
    pub volume: ScalarVolume,
}

/// Loads a standalone Kretz volume file
///
/// # Example
///
/// ```no_run
/// use echovol_core::{load_kretz, KretzReadOptions};
///
/// let loaded = load_kretz("heart.vol".as_ref(), &KretzReadOptions::default()).unwrap();
/// println!("{} voxels", loaded.volume.voxel_count());
/// ```
pub fn load_kretz(path: &Path, options: &KretzReadOptions) -> Result<LoadedVolume> {
    let file = File::open(path)?;
    let mut stream = ItemStream::open(BufReader::new(file), options.source_byte_offset)?;
    let volume = decode(&mut stream, options)?;
    Ok(LoadedVolume {
        name: display_name(path),
        volume,
    })
}

/// Loads a Kretz volume embedded in the `KRETZ_US` private element of a
/// DICOM file
pub fn load_kretz_embedded(path: &Path, options: &KretzReadOptions) -> Result<LoadedVolume> {
    let dcm = dicom::object::open_file(path)?;
    let volume = load_kretz_embedded_from(&dcm, options)?;
    Ok(LoadedVolume {
        name: display_name(path),
        volume,
    })
}

/// Decodes a Kretz payload from an already-parsed DICOM dataset
pub fn load_kretz_embedded_from(
    dcm: &InMemDicomObject,
    options: &KretzReadOptions,
) -> Result<ScalarVolume> {
    let block = PrivateBlock::find(dcm, KRETZ_GROUP, KRETZ_CREATOR)?;
    let payload = block.bytes(&KRETZ_PAYLOAD)?;
    let mut stream = ItemStream::open(Cursor::new(payload), options.source_byte_offset)?;
    decode(&mut stream, options)
}

/// Loads a GE movie group cine loop from a DICOM file
pub fn load_ge_movie(path: &Path) -> Result<ImageSequence> {
    let dcm = dicom::object::open_file(path)?;
    movie::read_movie_sequence(&dcm)
}

/// Extracts and decompresses the Philips 4D US frame sets of a DICOM file
pub fn extract_philips_frames(path: &Path) -> Result<Vec<ExtractedFrameSet>> {
    let dcm = dicom::object::open_file(path)?;
    philips::extract_frame_sets(&dcm)
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
