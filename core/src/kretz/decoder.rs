use crate::error::{EchovolError, Result};
use crate::kretz::item::{ItemHeader, ItemStream};
use crate::scan_convert::{scan_convert, SphericalGrid};
use crate::types::{OutputSpacing, ScalarVolume};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use regex::Regex;
use std::io::{Read, Seek};
use std::sync::OnceLock;

// Recognized item tags. Anything else is skipped; the format is treated as
// forward-compatible.
const TAG_DIMENSION_I: (u16, u16) = (0xC000, 0x0001);
const TAG_DIMENSION_J: (u16, u16) = (0xC000, 0x0002);
const TAG_DIMENSION_K: (u16, u16) = (0xC000, 0x0003);
const TAG_RADIAL_RESOLUTION: (u16, u16) = (0xC100, 0x0001);
const TAG_RANGE_OFFSET_1: (u16, u16) = (0xC200, 0x0001);
const TAG_RANGE_OFFSET_2: (u16, u16) = (0xC200, 0x0002);
const TAG_PHI_ANGLES: (u16, u16) = (0xC300, 0x0001);
const TAG_THETA_ANGLES: (u16, u16) = (0xC300, 0x0002);
const TAG_CARTESIAN_SPACING: (u16, u16) = (0x0010, 0x0022);
const TAG_DEPTH_RANGE: (u16, u16) = (0x0150, 0x0018);
const TAG_VOXEL_DATA: (u16, u16) = (0xD000, 0x0001);

/// Probe arc radius assumed when only the displayed depth range is known, mm
const FALLBACK_PROBE_RADIUS_MM: f64 = 40.0;

/// Options controlling Kretz volume loading
#[derive(Debug, Clone)]
pub struct KretzReadOptions {
    /// Resample spherical volumes onto a Cartesian grid (default true).
    /// When false the native grid is returned untouched.
    pub scan_convert: bool,

    /// Output voxel spacing for scan conversion
    pub output_spacing_mm: OutputSpacing,

    /// Byte offset of the Kretz payload within the source stream, for
    /// payloads embedded inside another file
    pub source_byte_offset: u64,
}

impl Default for KretzReadOptions {
    fn default() -> Self {
        Self {
            scan_convert: true,
            output_spacing_mm: OutputSpacing::default(),
            source_byte_offset: 0,
        }
    }
}

/// Geometry fields accumulated while scanning the item stream
///
/// Fields fill in as a side effect of the linear scan and are only
/// validated once a voxel data item is reached; no field can be assumed
/// populated before that point.
#[derive(Debug, Default)]
struct GeometryBuilder {
    dims: [u32; 3],
    theta_angles_rad: Vec<f64>,
    phi_angles_rad: Vec<f64>,
    radial_resolution_mm: Option<f64>,
    range_offset1: f64,
    range_offset2: f64,
    cartesian_spacing_mm: Option<f64>,
    depth_range_mm: Option<(f64, f64)>,
}

impl GeometryBuilder {
    fn is_spherical(&self) -> bool {
        !self.theta_angles_rad.is_empty() && !self.phi_angles_rad.is_empty()
    }

    /// Radial sampling of the scan lines: (spacing, start radius, B-mode
    /// arc radius), all in mm
    fn radial_geometry(&self) -> Result<(f64, f64, f64)> {
        if let Some(resolution) = self.radial_resolution_mm {
            return Ok((
                resolution,
                self.range_offset1 * resolution,
                -self.range_offset2 * resolution,
            ));
        }
        // Older files carry no resolution item, only the displayed depth
        // range; derive the spacing from it.
        if let Some((start_mm, end_mm)) = self.depth_range_mm {
            if start_mm >= end_mm {
                return Err(EchovolError::InvalidDepthRange {
                    start_mm,
                    end_mm,
                });
            }
            let start = start_mm + FALLBACK_PROBE_RADIUS_MM;
            let end = end_mm + FALLBACK_PROBE_RADIUS_MM;
            let spacing = (end - start) / (self.dims[0].max(2) - 1) as f64;
            return Ok((spacing, start, 0.0));
        }
        Err(EchovolError::MissingGeometry(
            "radial resolution or depth range not found",
        ))
    }
}

/// Decodes a Kretz item stream into a volume
///
/// Drives the stream to completion, accumulating geometry items, and builds
/// one volume per voxel data item (the last one wins if a file unexpectedly
/// carries several). Spherical volumes are scan converted unless
/// `options.scan_convert` is false; natively Cartesian volumes pass through
/// with their stored spacing.
///
/// # Errors
///
/// Fails if voxel data arrives before the required geometry, if an angle
/// array disagrees with the declared dimensions, or if the file contains no
/// voxel data at all.
pub fn decode<R: Read + Seek>(
    stream: &mut ItemStream<R>,
    options: &KretzReadOptions,
) -> Result<ScalarVolume> {
    let mut builder = GeometryBuilder::default();
    let mut volume = None;

    while let Some(header) = stream.next_header() {
        match header.tag() {
            TAG_DIMENSION_I => builder.dims[0] = read_item_u16(stream, &header)? as u32,
            TAG_DIMENSION_J => builder.dims[1] = read_item_u16(stream, &header)? as u32,
            TAG_DIMENSION_K => builder.dims[2] = read_item_u16(stream, &header)? as u32,
            TAG_RADIAL_RESOLUTION => {
                // Stored in meters
                builder.radial_resolution_mm = Some(read_item_f64(stream, &header)? * 1000.0);
            }
            TAG_RANGE_OFFSET_1 => builder.range_offset1 = read_item_f64(stream, &header)?,
            TAG_RANGE_OFFSET_2 => builder.range_offset2 = read_item_f64(stream, &header)?,
            TAG_THETA_ANGLES => {
                builder.theta_angles_rad = read_item_f64_array(stream, &header)?;
            }
            TAG_PHI_ANGLES => {
                builder.phi_angles_rad = read_item_f64_array(stream, &header)?;
            }
            TAG_CARTESIAN_SPACING => {
                builder.cartesian_spacing_mm = Some(read_item_f64(stream, &header)?);
            }
            TAG_DEPTH_RANGE => {
                let data = stream.read_data(&header)?;
                builder.depth_range_mm = Some(parse_depth_range(&data)?);
            }
            TAG_VOXEL_DATA => {
                volume = Some(build_volume(stream, &header, &builder, options)?);
            }
            _ => {
                debug!(
                    "skipping item ({:04X},{:04X}), {} bytes",
                    header.group, header.element, header.size
                );
                stream.skip(&header)?;
            }
        }
    }

    volume.ok_or(EchovolError::VoxelDataNotFound)
}

fn build_volume<R: Read + Seek>(
    stream: &mut ItemStream<R>,
    header: &ItemHeader,
    builder: &GeometryBuilder,
    options: &KretzReadOptions,
) -> Result<ScalarVolume> {
    let [ni, nj, nk] = builder.dims;
    if ni == 0 || nj == 0 || nk == 0 {
        return Err(EchovolError::MissingGeometry(
            "volume dimensions not found before voxel data",
        ));
    }

    let voxel_count = ni as usize * nj as usize * nk as usize;
    let mut voxels = stream.read_data(header)?;
    if voxels.len() < voxel_count {
        return Err(EchovolError::ShortRead {
            context: "Kretz voxel data",
            expected: voxel_count as u64,
            found: voxels.len() as u64,
        });
    }
    voxels.truncate(voxel_count);

    if builder.is_spherical() && options.scan_convert {
        validate_angle_counts(builder)?;
        let (radial_spacing_mm, radial_start_mm, bmode_radius_mm) = builder.radial_geometry()?;
        let grid = SphericalGrid {
            dims: builder.dims,
            theta_angles_rad: &builder.theta_angles_rad,
            phi_angles_rad: &builder.phi_angles_rad,
            radial_spacing_mm,
            radial_start_mm,
            bmode_radius_mm,
        };
        return scan_convert(&grid, &voxels, options.output_spacing_mm.to_array());
    }

    if builder.is_spherical() {
        // Native spherical grid requested: angle arrays must still be
        // consistent so downstream conversion remains possible.
        validate_angle_counts(builder)?;
        return Ok(ScalarVolume {
            dimensions: builder.dims,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            voxels,
        });
    }

    let spacing = builder.cartesian_spacing_mm.unwrap_or(1.0);
    Ok(ScalarVolume {
        dimensions: builder.dims,
        spacing: [spacing; 3],
        origin: [0.0; 3],
        voxels,
    })
}

fn validate_angle_counts(builder: &GeometryBuilder) -> Result<()> {
    if builder.theta_angles_rad.len() != builder.dims[1] as usize {
        return Err(EchovolError::AngleCountMismatch {
            axis: "theta",
            expected: builder.dims[1],
            found: builder.theta_angles_rad.len(),
        });
    }
    if builder.phi_angles_rad.len() != builder.dims[2] as usize {
        return Err(EchovolError::AngleCountMismatch {
            axis: "phi",
            expected: builder.dims[2],
            found: builder.phi_angles_rad.len(),
        });
    }
    Ok(())
}

/// First little-endian u16 of an item, 0 if the item is shorter
fn read_item_u16<R: Read + Seek>(stream: &mut ItemStream<R>, header: &ItemHeader) -> Result<u16> {
    let data = stream.read_data(header)?;
    Ok(if data.len() >= 2 {
        LittleEndian::read_u16(&data[0..2])
    } else {
        0
    })
}

/// First little-endian f64 of an item, 0.0 if the item is shorter
fn read_item_f64<R: Read + Seek>(stream: &mut ItemStream<R>, header: &ItemHeader) -> Result<f64> {
    let data = stream.read_data(header)?;
    Ok(if data.len() >= 8 {
        LittleEndian::read_f64(&data[0..8])
    } else {
        0.0
    })
}

/// Item data as a little-endian f64 array of `size / 8` elements
fn read_item_f64_array<R: Read + Seek>(
    stream: &mut ItemStream<R>,
    header: &ItemHeader,
) -> Result<Vec<f64>> {
    let data = stream.read_data(header)?;
    Ok(data.chunks_exact(8).map(LittleEndian::read_f64).collect())
}

/// Parses a displayed depth range like `" 3.9/11.2cm"` into (start, end) mm
///
/// A value without the `/` separator is the end depth with an implicit
/// start of zero. The string must end in `cm` after whitespace removal.
fn parse_depth_range(data: &[u8]) -> Result<(f64, f64)> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let re = REGEX.get_or_init(|| {
        Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").expect("Failed to compile regex")
    });

    let text: String = String::from_utf8_lossy(data)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\0')
        .collect();

    let stripped = text.strip_suffix("cm").ok_or_else(|| {
        EchovolError::InvalidValue(format!("depth string expected to finish with 'cm': '{}'", text))
    })?;

    let mut numbers = re.find_iter(stripped).map(|m| m.as_str());
    let first: f64 = numbers
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| EchovolError::InvalidValue(format!("unparsable depth string: '{}'", text)))?;

    // cm to mm
    Ok(match numbers.next().and_then(|s| s.parse::<f64>().ok()) {
        Some(second) => (first * 10.0, second * 10.0),
        None => (0.0, first * 10.0),
    })
}
