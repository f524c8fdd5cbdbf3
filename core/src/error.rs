use thiserror::Error;

/// Result type for echovol operations
pub type Result<T> = std::result::Result<T, EchovolError>;

/// Error types for echovol operations
///
/// Every variant is fatal for the decode call that produced it: no partial
/// volume or sequence is returned alongside an error. Recoverable conditions
/// (truncated frame blobs, missing timestamps) are logged as warnings instead
/// and never surface here.
#[derive(Error, Debug)]
pub enum EchovolError {
    /// File does not start with the expected magic header
    #[error("not a Kretz file: expected magic header \"KRETZFILE 1.0\"")]
    BadMagic,

    /// Fewer bytes were available than the declared size
    #[error("short read in {context}: expected {expected} bytes, found {found}")]
    ShortRead {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// A required element was not found in the dataset
    #[error("{0} element not found")]
    MissingTag(String),

    /// Angle array length does not match the declared grid dimension
    #[error("{axis} angle array is invalid (expected {expected} elements, found {found})")]
    AngleCountMismatch {
        axis: &'static str,
        expected: u32,
        found: usize,
    },

    /// Start radius of the scan arc is not below the end radius
    #[error("invalid depth range: start {start_mm} mm, end {end_mm} mm")]
    InvalidDepthRange { start_mm: f64, end_mm: f64 },

    /// Required geometry items were missing when voxel data was reached
    #[error("incomplete geometry: {0}")]
    MissingGeometry(&'static str),

    /// The file ended without a single voxel data item
    #[error("voxel data not found")]
    VoxelDataNotFound,

    /// Unrecognized compression scheme tag
    #[error("unknown compression scheme tag: {0:?}")]
    UnknownCompression(String),

    /// A compressed frame failed to decompress, or decompressed to the wrong size
    #[error("frame decompression failed: {0}")]
    Decompression(String),

    /// DICOM reading error
    #[error("DICOM error: {0}")]
    Dicom(String),

    /// Invalid element value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for EchovolError {
    fn from(e: dicom_object::ReadError) -> Self {
        EchovolError::Dicom(format!("{}", e))
    }
}

impl From<dicom_core::value::ConvertValueError> for EchovolError {
    fn from(e: dicom_core::value::ConvertValueError) -> Self {
        EchovolError::InvalidValue(format!("{}", e))
    }
}
