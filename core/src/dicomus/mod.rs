//! Private-tag ultrasound payload extraction
//!
//! Both supported DICOM containers hide their payloads behind vendor
//! private tags: the GE movie group nests timestamped 2D frames inside a
//! chain of private sequences, and the Philips 4D US container stores
//! compressed frame sets behind a similar chain. The outer DICOM transfer
//! syntax is parsed by `dicom-object`; this module only interprets the
//! private elements once located.

pub mod frames;
pub mod movie;
pub mod philips;
pub mod tags;

pub use frames::{CompressedFrameSet, CompressionScheme, FrameHeader, UnpackedFrames};
pub use movie::read_movie_sequence;
pub use philips::{extract_frame_sets, ExtractedFrameSet};
