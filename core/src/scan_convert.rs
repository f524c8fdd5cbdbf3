//! Spherical-to-Cartesian scan conversion
//!
//! Ultrasound volumes from curved-array probes are sampled on a spherical
//! (range, elevation, azimuth) grid. This module resamples such a grid onto
//! a regular Cartesian grid: the forward mapping places every sample in
//! Cartesian space to find the output bounding box, then each output voxel
//! is located in the source grid by inverting the mapping analytically and
//! interpolated trilinearly. Output voxels outside the scanned hull stay 0.

use crate::error::{EchovolError, Result};
use crate::types::ScalarVolume;
use std::f64::consts::FRAC_PI_2;

/// Tolerance when matching a degenerate (single-sample) angle axis
const ANGLE_EPS: f64 = 1e-6;

/// A voxel grid sampled in spherical acquisition coordinates
///
/// Index `i` walks the range (radial) axis, `j` the elevation axis sampled
/// at `theta_angles_rad`, `k` the azimuth axis sampled at `phi_angles_rad`.
/// Angles are as stored in the file; the mapping centers them on pi/2.
#[derive(Debug, Clone)]
pub struct SphericalGrid<'a> {
    pub dims: [u32; 3],
    pub theta_angles_rad: &'a [f64],
    pub phi_angles_rad: &'a [f64],
    /// Spacing between consecutive range samples, mm
    pub radial_spacing_mm: f64,
    /// Radius of the first range sample, mm
    pub radial_start_mm: f64,
    /// Curvature offset of the probe's scan arc, mm
    pub bmode_radius_mm: f64,
}

impl SphericalGrid<'_> {
    /// Maps grid index (i, j, k) to a Cartesian point in mm
    ///
    /// Axis convention of the output frame: I->(+X), J->(+Y), K->(+Z).
    pub fn to_cartesian(&self, i: u32, j: u32, k: u32) -> [f64; 3] {
        let theta = self.theta_angles_rad[j as usize] - FRAC_PI_2;
        let phi = self.phi_angles_rad[k as usize] - FRAC_PI_2;
        let r = self.radial_start_mm + i as f64 * self.radial_spacing_mm;
        let rb = self.bmode_radius_mm;
        [
            r * theta.sin(),
            -(r * theta.cos() - rb) * phi.sin(),
            rb * (1.0 - phi.cos()) + r * theta.cos() * phi.cos(),
        ]
    }

    /// Maps a Cartesian point back to fractional grid coordinates
    ///
    /// Returns the centered (theta, phi) angles and the radius; callers
    /// convert those to fractional indices. The inversion assumes the point
    /// lies on the probe side of the arc (`r cos(theta) >= bmode_radius`);
    /// points violating that land outside the grid and get masked.
    fn to_spherical(&self, p: [f64; 3]) -> (f64, f64, f64) {
        let rb = self.bmode_radius_mm;
        let zr = p[2] - rb;
        let arc = (p[1] * p[1] + zr * zr).sqrt();
        let phi = (-p[1]).atan2(zr);
        let c = rb + arc;
        let r = (p[0] * p[0] + c * c).sqrt();
        let theta = p[0].atan2(c);
        (theta, phi, r)
    }

    fn validate(&self) -> Result<()> {
        if self.theta_angles_rad.len() != self.dims[1] as usize {
            return Err(EchovolError::AngleCountMismatch {
                axis: "theta",
                expected: self.dims[1],
                found: self.theta_angles_rad.len(),
            });
        }
        if self.phi_angles_rad.len() != self.dims[2] as usize {
            return Err(EchovolError::AngleCountMismatch {
                axis: "phi",
                expected: self.dims[2],
                found: self.phi_angles_rad.len(),
            });
        }
        Ok(())
    }
}

/// Resamples a spherical voxel grid onto a regular Cartesian grid
///
/// `voxels` holds the source intensities with the range axis fastest.
/// `output_spacing_mm` gives the output voxel spacing per axis; values
/// that are not strictly positive fall back to 1.0 mm. Output dimensions
/// are `ceil(extent / spacing)` per axis over the bounding box of the
/// forward-mapped sample points.
pub fn scan_convert(
    grid: &SphericalGrid,
    voxels: &[u8],
    output_spacing_mm: [f64; 3],
) -> Result<ScalarVolume> {
    grid.validate()?;

    let [ni, nj, nk] = grid.dims;
    if ni == 0 || nj == 0 || nk == 0 {
        return Err(EchovolError::MissingGeometry(
            "spherical grid has a zero dimension",
        ));
    }
    let sample_count = ni as usize * nj as usize * nk as usize;
    if voxels.len() < sample_count {
        return Err(EchovolError::ShortRead {
            context: "spherical voxel buffer",
            expected: sample_count as u64,
            found: voxels.len() as u64,
        });
    }

    let bounds = point_cloud_bounds(grid);
    let spacing = output_spacing_mm.map(|s| if s > 0.0 { s } else { 1.0 });

    let mut out_dims = [0u32; 3];
    for axis in 0..3 {
        let extent = bounds[axis][1] - bounds[axis][0];
        out_dims[axis] = ((extent / spacing[axis]).ceil() as u32).max(1);
    }
    let origin = [bounds[0][0], bounds[1][0], bounds[2][0]];

    let theta_table = AngleTable::new(grid.theta_angles_rad);
    let phi_table = AngleTable::new(grid.phi_angles_rad);

    let [nx, ny, nz] = out_dims;
    let mut out = vec![0u8; nx as usize * ny as usize * nz as usize];
    let mut cursor = 0usize;
    for kz in 0..nz {
        let z = origin[2] + kz as f64 * spacing[2];
        for jy in 0..ny {
            let y = origin[1] + jy as f64 * spacing[1];
            for ix in 0..nx {
                let x = origin[0] + ix as f64 * spacing[0];
                let (theta, phi, r) = grid.to_spherical([x, y, z]);

                let fi = (r - grid.radial_start_mm) / grid.radial_spacing_mm;
                let sample = fractional_radial(fi, ni)
                    .zip(theta_table.fractional_index(theta + FRAC_PI_2))
                    .zip(phi_table.fractional_index(phi + FRAC_PI_2))
                    .map(|((fi, fj), fk)| trilinear(voxels, grid.dims, fi, fj, fk));

                if let Some(value) = sample {
                    out[cursor] = value.round().clamp(0.0, 255.0) as u8;
                }
                cursor += 1;
            }
        }
    }

    Ok(ScalarVolume {
        dimensions: out_dims,
        spacing,
        origin,
        voxels: out,
    })
}

/// Axis-aligned bounding box of the forward-mapped sample points
fn point_cloud_bounds(grid: &SphericalGrid) -> [[f64; 2]; 3] {
    let mut bounds = [[f64::INFINITY, f64::NEG_INFINITY]; 3];
    for k in 0..grid.dims[2] {
        for j in 0..grid.dims[1] {
            for i in 0..grid.dims[0] {
                let p = grid.to_cartesian(i, j, k);
                for axis in 0..3 {
                    bounds[axis][0] = bounds[axis][0].min(p[axis]);
                    bounds[axis][1] = bounds[axis][1].max(p[axis]);
                }
            }
        }
    }
    bounds
}

fn fractional_radial(fi: f64, ni: u32) -> Option<f64> {
    let max = (ni - 1) as f64;
    (-ANGLE_EPS..=max + ANGLE_EPS)
        .contains(&fi)
        .then(|| fi.clamp(0.0, max))
}

/// Inverse lookup table for a monotonic angle sample array
///
/// Stores the samples in ascending order and maps matched positions back to
/// the original index direction when the source array was descending.
struct AngleTable {
    values: Vec<f64>,
    reversed: bool,
}

impl AngleTable {
    fn new(samples: &[f64]) -> Self {
        let reversed = samples.len() > 1 && samples[0] > samples[samples.len() - 1];
        let mut values = samples.to_vec();
        if reversed {
            values.reverse();
        }
        Self { values, reversed }
    }

    /// Fractional index of `value` within the sample array, `None` outside it
    fn fractional_index(&self, value: f64) -> Option<f64> {
        let s = &self.values;
        let n = s.len();
        match n {
            0 => return None,
            1 => return ((value - s[0]).abs() <= ANGLE_EPS).then_some(0.0),
            _ => {}
        }
        if value < s[0] || value > s[n - 1] {
            return None;
        }
        let hi = s.partition_point(|&a| a < value).clamp(1, n - 1);
        let lo = hi - 1;
        let span = s[hi] - s[lo];
        let frac = if span > 0.0 { (value - s[lo]) / span } else { 0.0 };
        let index = lo as f64 + frac;
        Some(if self.reversed {
            (n - 1) as f64 - index
        } else {
            index
        })
    }
}

/// Trilinear interpolation of the spherical voxel buffer at fractional indices
fn trilinear(voxels: &[u8], dims: [u32; 3], fi: f64, fj: f64, fk: f64) -> f64 {
    let [ni, nj, nk] = dims.map(|d| d as usize);
    let value = |i: usize, j: usize, k: usize| voxels[i + ni * (j + nj * k)] as f64;

    let i0 = (fi.floor() as usize).min(ni - 1);
    let j0 = (fj.floor() as usize).min(nj - 1);
    let k0 = (fk.floor() as usize).min(nk - 1);
    let i1 = (i0 + 1).min(ni - 1);
    let j1 = (j0 + 1).min(nj - 1);
    let k1 = (k0 + 1).min(nk - 1);

    let di = fi - i0 as f64;
    let dj = fj - j0 as f64;
    let dk = fk - k0 as f64;

    let lerp = |a: f64, b: f64, t: f64| a.mul_add(1.0 - t, b * t);

    let v00 = lerp(value(i0, j0, k0), value(i1, j0, k0), di);
    let v10 = lerp(value(i0, j1, k0), value(i1, j1, k0), di);
    let v01 = lerp(value(i0, j0, k1), value(i1, j0, k1), di);
    let v11 = lerp(value(i0, j1, k1), value(i1, j1, k1), di);

    let v0 = lerp(v00, v10, dj);
    let v1 = lerp(v01, v11, dj);
    lerp(v0, v1, dk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::f64::consts::PI;

    /// Evenly spaced angles centered on pi/2
    fn fan(count: usize, full_width_rad: f64) -> Vec<f64> {
        if count == 1 {
            return vec![FRAC_PI_2];
        }
        let step = full_width_rad / (count - 1) as f64;
        (0..count)
            .map(|i| FRAC_PI_2 - full_width_rad / 2.0 + i as f64 * step)
            .collect()
    }

    #[test]
    fn test_forward_map_on_axis() {
        // Centered angles of zero leave only the radial term
        let grid = SphericalGrid {
            dims: [3, 1, 1],
            theta_angles_rad: &[FRAC_PI_2],
            phi_angles_rad: &[FRAC_PI_2],
            radial_spacing_mm: 2.0,
            radial_start_mm: 10.0,
            bmode_radius_mm: 5.0,
        };
        let p = grid.to_cartesian(1, 0, 0);
        assert!(p[0].abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);
        assert!((p[2] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_inverse_round_trip() {
        let theta = fan(5, 0.8);
        let phi = fan(4, 0.6);
        let grid = SphericalGrid {
            dims: [6, 5, 4],
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 1.5,
            radial_start_mm: 20.0,
            bmode_radius_mm: 8.0,
        };
        for &(i, j, k) in &[(0, 0, 0), (5, 4, 3), (2, 3, 1)] {
            let p = grid.to_cartesian(i, j, k);
            let (theta_c, phi_c, r) = grid.to_spherical(p);
            assert!((theta_c - (theta[j as usize] - FRAC_PI_2)).abs() < 1e-9);
            assert!((phi_c - (phi[k as usize] - FRAC_PI_2)).abs() < 1e-9);
            let expected_r = 20.0 + i as f64 * 1.5;
            assert!((r - expected_r).abs() < 1e-9);
        }
    }

    #[rstest]
    #[case([0.5, 0.5, 0.5])]
    #[case([0.7, 0.3, 1.1])]
    fn test_output_dims_follow_bounds(#[case] spacing: [f64; 3]) {
        let theta = fan(7, 1.0);
        let phi = fan(6, 0.9);
        let dims = [8u32, 7, 6];
        let grid = SphericalGrid {
            dims,
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 2.0,
            radial_start_mm: 15.0,
            bmode_radius_mm: 10.0,
        };
        let voxels = vec![100u8; (dims[0] * dims[1] * dims[2]) as usize];
        let volume = scan_convert(&grid, &voxels, spacing).unwrap();

        let bounds = point_cloud_bounds(&grid);
        for axis in 0..3 {
            let extent = bounds[axis][1] - bounds[axis][0];
            let expected = (extent / spacing[axis]).ceil() as u32;
            assert_eq!(volume.dimensions[axis], expected);
            assert_eq!(volume.spacing[axis], spacing[axis]);
            assert!((volume.origin[axis] - bounds[axis][0]).abs() < 1e-12);
        }
        assert_eq!(volume.voxels.len(), volume.voxel_count());
    }

    #[test]
    fn test_nonpositive_spacing_falls_back_to_unit() {
        let theta = fan(3, 0.5);
        let phi = fan(3, 0.5);
        let grid = SphericalGrid {
            dims: [4, 3, 3],
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 3.0,
            radial_start_mm: 10.0,
            bmode_radius_mm: 0.0,
        };
        let voxels = vec![0u8; 36];
        let volume = scan_convert(&grid, &voxels, [0.0, -1.0, 0.5]).unwrap();
        assert_eq!(volume.spacing, [1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_radial_line_identity() {
        // Degenerate fan: a single scan line along +Z. Sampling the output
        // at the source radii reproduces the source intensities.
        let grid = SphericalGrid {
            dims: [4, 1, 1],
            theta_angles_rad: &[FRAC_PI_2],
            phi_angles_rad: &[FRAC_PI_2],
            radial_spacing_mm: 1.0,
            radial_start_mm: 5.0,
            bmode_radius_mm: 0.0,
        };
        let voxels = vec![10u8, 20, 30, 40];
        let volume = scan_convert(&grid, &voxels, [1.0, 1.0, 1.0]).unwrap();
        assert_eq!(volume.dimensions, [1, 1, 3]);
        // Output samples sit at origin + k * spacing = radii 5, 6, 7
        assert_eq!(volume.voxels, vec![10, 20, 30]);
    }

    #[test]
    fn test_out_of_hull_masked_to_zero() {
        // A narrow fan leaves the bounding box corners outside the hull
        let theta = fan(9, PI / 3.0);
        let phi = fan(9, PI / 3.0);
        let dims = [10u32, 9, 9];
        let grid = SphericalGrid {
            dims,
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 2.0,
            radial_start_mm: 10.0,
            bmode_radius_mm: 0.0,
        };
        let voxels = vec![255u8; (dims[0] * dims[1] * dims[2]) as usize];
        let volume = scan_convert(&grid, &voxels, [0.5, 0.5, 0.5]).unwrap();
        // Corner voxel (0, 0, 0) is outside the scanned wedge
        assert_eq!(volume.voxels[0], 0);
        // But the hull interior keeps its intensity
        let [nx, ny, nz] = volume.dimensions;
        let center = volume.index(nx / 2, ny / 2, nz / 2);
        assert_eq!(volume.voxels[center], 255);
    }

    #[test]
    fn test_angle_count_mismatch_is_fatal() {
        let theta = fan(4, 0.5);
        let phi = fan(3, 0.5);
        let grid = SphericalGrid {
            dims: [2, 5, 3],
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 1.0,
            radial_start_mm: 1.0,
            bmode_radius_mm: 0.0,
        };
        let result = scan_convert(&grid, &[0u8; 30], [0.5; 3]);
        assert!(matches!(
            result,
            Err(EchovolError::AngleCountMismatch {
                axis: "theta",
                expected: 5,
                found: 4,
            })
        ));
    }

    #[test]
    fn test_descending_angle_arrays() {
        let mut theta = fan(5, 0.8);
        theta.reverse();
        let phi = fan(4, 0.6);
        let dims = [6u32, 5, 4];
        let grid = SphericalGrid {
            dims,
            theta_angles_rad: &theta,
            phi_angles_rad: &phi,
            radial_spacing_mm: 1.5,
            radial_start_mm: 20.0,
            bmode_radius_mm: 0.0,
        };
        // Mark one source sample and find it again after conversion
        let mut voxels = vec![0u8; (dims[0] * dims[1] * dims[2]) as usize];
        let (i, j, k) = (3usize, 1usize, 2usize);
        voxels[i + 6 * (j + 5 * k)] = 200;

        let p = grid.to_cartesian(i as u32, j as u32, k as u32);
        let volume = scan_convert(&grid, &voxels, [0.25; 3]).unwrap();
        let idx = |axis: usize| ((p[axis] - volume.origin[axis]) / volume.spacing[axis]).round();
        let sampled = volume.value_at(idx(0) as u32, idx(1) as u32, idx(2) as u32);
        assert!(sampled > 0, "marked sample lost after conversion");
    }
}
