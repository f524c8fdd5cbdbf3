use crate::api::LoadedVolume;
use crate::dicomus::philips::ExtractedFrameSet;
use crate::types::ImageSequence;
use std::fmt;

/// Text report formatter for a decoded volume
pub struct VolumeReport<'a> {
    loaded: &'a LoadedVolume,
}

impl<'a> VolumeReport<'a> {
    /// Creates a new text report
    pub fn new(loaded: &'a LoadedVolume) -> Self {
        Self { loaded }
    }
}

impl<'a> fmt::Display for VolumeReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let volume = &self.loaded.volume;
        writeln!(f, "Decoded Volume")?;
        writeln!(f, "==============")?;
        writeln!(f)?;
        writeln!(f, "Name:       {}", self.loaded.name)?;
        writeln!(
            f,
            "Dimensions: {} x {} x {}",
            volume.dimensions[0], volume.dimensions[1], volume.dimensions[2]
        )?;
        writeln!(
            f,
            "Spacing:    {} x {} x {} mm",
            volume.spacing[0], volume.spacing[1], volume.spacing[2]
        )?;
        writeln!(
            f,
            "Origin:     ({}, {}, {}) mm",
            volume.origin[0], volume.origin[1], volume.origin[2]
        )?;
        writeln!(f, "Voxels:     {}", volume.voxel_count())?;
        Ok(())
    }
}

/// Text report formatter for a decoded cine loop
pub struct SequenceReport<'a> {
    sequence: &'a ImageSequence,
}

impl<'a> SequenceReport<'a> {
    pub fn new(sequence: &'a ImageSequence) -> Self {
        Self { sequence }
    }
}

impl<'a> fmt::Display for SequenceReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Decoded Sequence")?;
        writeln!(f, "================")?;
        writeln!(f)?;
        writeln!(f, "Frames: {}", self.sequence.len())?;
        for frame in self.sequence.frames() {
            writeln!(
                f,
                "  [{}] {} x {}",
                frame.index_key, frame.image.width, frame.image.height
            )?;
        }
        Ok(())
    }
}

/// Text report formatter for extracted Philips frame sets
pub struct FrameSetReport<'a> {
    sets: &'a [ExtractedFrameSet],
}

impl<'a> FrameSetReport<'a> {
    pub fn new(sets: &'a [ExtractedFrameSet]) -> Self {
        Self { sets }
    }
}

impl<'a> fmt::Display for FrameSetReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extracted Frame Sets")?;
        writeln!(f, "====================")?;
        writeln!(f)?;
        writeln!(f, "Streams: {}", self.sets.len())?;
        for set in self.sets {
            writeln!(
                f,
                "  {} [{}]: {} frames of {} bytes",
                set.datatype,
                set.scheme.tag(),
                set.frames.len(),
                set.frame_size()
            )?;
        }
        Ok(())
    }
}
