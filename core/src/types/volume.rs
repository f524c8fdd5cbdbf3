/// A scalar voxel volume sampled on a regular grid
///
/// Used both for native-grid pass-through (the raw spherical or Cartesian
/// samples exactly as stored in the file) and for scan-converted output.
/// Voxels are unsigned 8-bit intensities stored row-major with the first
/// axis fastest: `index = i + dims[0] * (j + dims[1] * k)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVolume {
    /// Grid dimensions per axis
    pub dimensions: [u32; 3],

    /// Voxel spacing per axis, in mm
    pub spacing: [f64; 3],

    /// Position of voxel (0, 0, 0), in mm
    pub origin: [f64; 3],

    /// Voxel intensities, `dimensions[0] * dimensions[1] * dimensions[2]` bytes
    pub voxels: Vec<u8>,
}

impl ScalarVolume {
    /// Number of voxels declared by the grid dimensions
    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().map(|&d| d as usize).product()
    }

    /// Flat buffer index of voxel (i, j, k)
    pub fn index(&self, i: u32, j: u32, k: u32) -> usize {
        (i + self.dimensions[0] * (j + self.dimensions[1] * k)) as usize
    }

    /// Intensity of voxel (i, j, k)
    pub fn value_at(&self, i: u32, j: u32, k: u32) -> u8 {
        self.voxels[self.index(i, j, k)]
    }
}
