// FieldPose 🚀 AGPL-3.0 License

//! Field Accumulator: hi-res intensity surface.
//!
//! Rasterizes sparse above-threshold intensity cells into a smoothed,
//! upsampled per-joint confidence surface. Contributions accumulate
//! additively so overlapping detections reinforce each other, with the total
//! clipped at 1.0. A parallel surface records the joint scale of the
//! highest-confidence contributor at each pixel.

use ndarray::Array3;

use crate::error::{DecodeError, Result};
use crate::fields::{cif_channel, CifField};

/// Divisor applied to each cell's contribution; a full-confidence detection
/// is reconstructed from roughly this many overlapping cells.
const NEIGHBORS: f32 = 16.0;

/// Gaussian stamp radius in units of sigma. Kept at one sigma so that seeds
/// for the same joint stay suppressed by occupancy claims, which cover two.
const TRUNCATE: f32 = 1.0;

/// Accumulated per-joint confidence surface at source-image resolution.
#[derive(Debug, Clone)]
pub struct CifHr {
    /// Confidence surface, shape `[joints, h, w]`.
    pub accumulated: Array3<f32>,
    /// Scale of the highest-confidence contributor per pixel.
    pub scales: Array3<f32>,
    scale_conf: Array3<f32>,
    v_threshold: f32,
}

impl CifHr {
    /// Allocate an accumulator sized for the given intensity fields.
    ///
    /// # Arguments
    ///
    /// * `cifs` - One intensity field per scale/stride variant; all variants
    ///   are fused into the same surface.
    /// * `v_threshold` - Minimum cell confidence to contribute.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FieldError`] if no fields are given or the
    /// fields disagree on the number of joints.
    pub fn new(cifs: &[CifField], v_threshold: f32) -> Result<Self> {
        let first = cifs
            .first()
            .ok_or_else(|| DecodeError::FieldError("no intensity fields given".to_string()))?;
        let joints = first.num_joints();

        let mut height = 0usize;
        let mut width = 0usize;
        for cif in cifs {
            if cif.num_joints() != joints {
                return Err(DecodeError::FieldError(format!(
                    "intensity fields disagree on joint count: {} vs {}",
                    joints,
                    cif.num_joints()
                )));
            }
            let (h, w) = cif.grid();
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            {
                height = height.max(((h - 1) as f32 * cif.stride + 1.0) as usize);
                width = width.max(((w - 1) as f32 * cif.stride + 1.0) as usize);
            }
        }

        Ok(Self {
            accumulated: Array3::zeros((joints, height, width)),
            scales: Array3::zeros((joints, height, width)),
            scale_conf: Array3::zeros((joints, height, width)),
            v_threshold,
        })
    }

    /// Accumulate all given intensity fields.
    pub fn fill(&mut self, cifs: &[CifField]) -> &mut Self {
        for cif in cifs {
            self.fill_single(cif, cifs.len());
        }
        self
    }

    fn fill_single(&mut self, cif: &CifField, len_cifs: usize) {
        let (grid_h, grid_w) = cif.grid();
        #[allow(clippy::cast_precision_loss)]
        let value_scale = 1.0 / NEIGHBORS / len_cifs as f32;

        for j in 0..cif.num_joints() {
            for yy in 0..grid_h {
                for xx in 0..grid_w {
                    let v = cif.data[[j, cif_channel::V, yy, xx]];
                    if v <= self.v_threshold {
                        continue;
                    }
                    let s = cif.data[[j, cif_channel::S, yy, xx]] * cif.stride;
                    if s < cif.min_scale {
                        continue;
                    }
                    let x = cif.data[[j, cif_channel::X, yy, xx]] * cif.stride;
                    let y = cif.data[[j, cif_channel::Y, yy, xx]] * cif.stride;
                    let sigma = (0.5 * s).max(1.0);
                    self.add_gauss(j, x, y, sigma, v * value_scale, v, s);
                }
            }
        }
    }

    /// Scatter-add one truncated Gaussian stamp and update the scale surface.
    #[allow(clippy::too_many_arguments)]
    fn add_gauss(&mut self, j: usize, x: f32, y: f32, sigma: f32, value: f32, v: f32, s: f32) {
        let (_, height, width) = self.accumulated.dim();
        #[allow(clippy::cast_possible_truncation)]
        let min_x = ((x - TRUNCATE * sigma).round() as i64).max(0);
        #[allow(clippy::cast_possible_truncation)]
        let max_x = ((x + TRUNCATE * sigma).round() as i64 + 1).min(width as i64);
        #[allow(clippy::cast_possible_truncation)]
        let min_y = ((y - TRUNCATE * sigma).round() as i64).max(0);
        #[allow(clippy::cast_possible_truncation)]
        let max_y = ((y + TRUNCATE * sigma).round() as i64 + 1).min(height as i64);
        if min_x >= max_x || min_y >= max_y {
            return;
        }

        let inv_two_sigma2 = 0.5 / (sigma * sigma);
        for yy in min_y..max_y {
            #[allow(clippy::cast_precision_loss)]
            let dy = yy as f32 - y;
            for xx in min_x..max_x {
                #[allow(clippy::cast_precision_loss)]
                let dx = xx as f32 - x;
                let vv = value * (-(dx * dx + dy * dy) * inv_two_sigma2).exp();

                #[allow(clippy::cast_sign_loss)]
                let idx = [j, yy as usize, xx as usize];
                let cell = &mut self.accumulated[idx];
                *cell = (*cell + vv).min(1.0);

                if v > self.scale_conf[idx] {
                    self.scale_conf[idx] = v;
                    self.scales[idx] = s;
                }
            }
        }
    }

    /// Number of joint types.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.accumulated.dim().0
    }

    /// Surface size `(h, w)` in source-image pixels.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        let (_, h, w) = self.accumulated.dim();
        (h, w)
    }

    /// Confidence surface value for joint `j` at `(x, y)`, nearest-neighbor,
    /// 0.0 outside the surface.
    #[must_use]
    pub fn value(&self, j: usize, x: f32, y: f32) -> f32 {
        let (joints, height, width) = self.accumulated.dim();
        if j >= joints {
            return 0.0;
        }
        #[allow(clippy::cast_possible_truncation)]
        let xi = x.round() as i64;
        #[allow(clippy::cast_possible_truncation)]
        let yi = y.round() as i64;
        if xi < 0 || yi < 0 || xi >= width as i64 || yi >= height as i64 {
            return 0.0;
        }
        #[allow(clippy::cast_sign_loss)]
        self.accumulated[[j, yi as usize, xi as usize]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn single_cell_cif(j: usize, x: f32, y: f32, v: f32, s: f32) -> CifField {
        let mut data = Array4::zeros((2, 5, 4, 4));
        data[[j, cif_channel::V, 0, 0]] = v;
        data[[j, cif_channel::X, 0, 0]] = x;
        data[[j, cif_channel::Y, 0, 0]] = y;
        data[[j, cif_channel::S, 0, 0]] = s;
        CifField::new(data, 8.0).unwrap()
    }

    #[test]
    fn test_accumulation_is_additive() {
        let cif = single_cell_cif(0, 1.0, 1.0, 0.8, 1.0);
        let mut one = CifHr::new(std::slice::from_ref(&cif), 0.1).unwrap();
        one.fill(std::slice::from_ref(&cif));
        let single = one.value(0, 8.0, 8.0);
        assert!(single > 0.0);

        // the same detection in two fused fields contributes at full weight
        // per field divided by the field count, landing at the same value
        let both = [cif.clone(), cif];
        let mut two = CifHr::new(&both, 0.1).unwrap();
        two.fill(&both);
        assert!((two.value(0, 8.0, 8.0) - single).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_cells_reinforce() {
        let mut data = Array4::zeros((1, 5, 4, 4));
        for xx in [0usize, 1] {
            data[[0, cif_channel::V, 0, xx]] = 0.4;
            data[[0, cif_channel::X, 0, xx]] = 1.0;
            data[[0, cif_channel::Y, 0, xx]] = 1.0;
            data[[0, cif_channel::S, 0, xx]] = 1.0;
        }
        let cif = CifField::new(data, 8.0).unwrap();
        let mut hr = CifHr::new(std::slice::from_ref(&cif), 0.1).unwrap();
        hr.fill(std::slice::from_ref(&cif));
        // both cells regress to (8, 8); their contributions add up
        let expected = 2.0 * 0.4 / NEIGHBORS;
        assert!((hr.value(0, 8.0, 8.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_below_threshold_ignored() {
        let cif = single_cell_cif(0, 1.0, 1.0, 0.05, 1.0);
        let mut hr = CifHr::new(std::slice::from_ref(&cif), 0.1).unwrap();
        hr.fill(std::slice::from_ref(&cif));
        assert_eq!(hr.accumulated.iter().copied().fold(0.0f32, f32::max), 0.0);
    }

    #[test]
    fn test_scale_surface_records_strongest() {
        let strong = single_cell_cif(0, 1.0, 1.0, 0.9, 2.0);
        let weak = single_cell_cif(0, 1.0, 1.0, 0.4, 5.0);
        let fields = [strong, weak];
        let mut hr = CifHr::new(&fields, 0.1).unwrap();
        hr.fill(&fields);
        // strongest contributor's scale wins, in source-image pixels
        assert!((hr.scales[[0, 8, 8]] - 16.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_value_out_of_bounds() {
        let cif = single_cell_cif(0, 1.0, 1.0, 0.8, 1.0);
        let mut hr = CifHr::new(std::slice::from_ref(&cif), 0.1).unwrap();
        hr.fill(std::slice::from_ref(&cif));
        assert_eq!(hr.value(0, -5.0, 2.0), 0.0);
        assert_eq!(hr.value(5, 2.0, 2.0), 0.0);
        assert_eq!(hr.value(0, 1e6, 2.0), 0.0);
    }

    #[test]
    fn test_min_scale_filters_cells() {
        let cif = single_cell_cif(0, 1.0, 1.0, 0.8, 1.0).with_min_scale(12.0);
        let mut hr = CifHr::new(std::slice::from_ref(&cif), 0.1).unwrap();
        hr.fill(std::slice::from_ref(&cif));
        // scale is 8px < 12px minimum, nothing accumulated
        assert_eq!(hr.accumulated.iter().copied().fold(0.0f32, f32::max), 0.0);
    }
}
