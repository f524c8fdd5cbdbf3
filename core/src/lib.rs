pub mod api;
pub mod cli;
pub mod dicomus;
pub mod error;
pub mod kretz;
pub mod scan_convert;
pub mod types;

pub use api::{
    extract_philips_frames, load_ge_movie, load_kretz, load_kretz_embedded,
    load_kretz_embedded_from, LoadedVolume,
};
pub use dicomus::{read_movie_sequence, CompressionScheme, ExtractedFrameSet};
pub use error::{EchovolError, Result};
pub use kretz::KretzReadOptions;
pub use scan_convert::{scan_convert, SphericalGrid};
pub use types::*;
