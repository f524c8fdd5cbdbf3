//! Core type definitions for decoded ultrasound data
//!
//! This module provides the fundamental types used throughout the echovol
//! library:
//! - [`ScalarVolume`]: a voxel volume on a regular grid (native or scan converted)
//! - [`Frame2d`], [`SequenceFrame`], [`ImageSequence`]: timestamped 2D cine frames
//! - [`OutputSpacing`]: output voxel spacing for scan conversion

mod sequence;
mod spacing;
mod volume;

pub use sequence::{timestamp_key, Frame2d, ImageSequence, SequenceFrame};
pub use spacing::OutputSpacing;
pub use volume::ScalarVolume;
