// FieldPose 🚀 AGPL-3.0 License

//! Per-joint spatial suppression grid.
//!
//! Records which regions have been claimed by an assembled instance, at a
//! coarsened resolution. Claims are squares centered on the joint with a
//! half-width derived from the joint scale, never smaller than a minimum so
//! that even tiny joints suppress re-seeding in their cell.

use ndarray::Array3;

/// A coarse, per-joint-type occupancy grid. Grows monotonically within one
/// decode call and is discarded afterwards.
#[derive(Debug, Clone)]
pub struct Occupancy {
    grid: Array3<u8>,
    reduction: f32,
    min_scale_reduced: f32,
}

impl Occupancy {
    /// Allocate an empty grid.
    ///
    /// # Arguments
    ///
    /// * `shape` - `(joints, height, width)` of the surface being claimed,
    ///   in source-image pixels.
    /// * `reduction` - Coarsening factor (cells per source pixel axis).
    /// * `min_scale` - Minimum claim half-width in source-image pixels.
    #[must_use]
    pub fn new(shape: (usize, usize, usize), reduction: f32, min_scale: f32) -> Self {
        let (joints, height, width) = shape;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let grid = Array3::zeros((
            joints,
            (height as f32 / reduction).ceil() as usize + 1,
            (width as f32 / reduction).ceil() as usize + 1,
        ));
        Self {
            grid,
            reduction,
            min_scale_reduced: min_scale / reduction,
        }
    }

    /// Claim a square region for joint type `f`.
    pub fn set(&mut self, f: usize, x: f32, y: f32, sigma: f32) {
        let (joints, height, width) = self.grid.dim();
        if f >= joints {
            return;
        }
        let x = x / self.reduction;
        let y = y / self.reduction;
        let si = (sigma / self.reduction).max(self.min_scale_reduced);

        #[allow(clippy::cast_possible_truncation)]
        let min_x = ((x - si).round() as i64).max(0);
        #[allow(clippy::cast_possible_truncation)]
        let max_x = ((x + si).round() as i64 + 1).min(width as i64);
        #[allow(clippy::cast_possible_truncation)]
        let min_y = ((y - si).round() as i64).max(0);
        #[allow(clippy::cast_possible_truncation)]
        let max_y = ((y + si).round() as i64 + 1).min(height as i64);

        for yy in min_y..max_y {
            for xx in min_x..max_x {
                #[allow(clippy::cast_sign_loss)]
                {
                    self.grid[[f, yy as usize, xx as usize]] = 1;
                }
            }
        }
    }

    /// Whether `(x, y)` is inside an existing claim for joint type `f`.
    ///
    /// Unknown joint types count as occupied; coordinates are clamped to the
    /// grid.
    #[must_use]
    pub fn get(&self, f: usize, x: f32, y: f32) -> bool {
        let (joints, height, width) = self.grid.dim();
        if f >= joints {
            return true;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let xi = ((x / self.reduction).round().max(0.0) as usize).min(width - 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let yi = ((y / self.reduction).round().max(0.0) as usize).min(height - 1);
        self.grid[[f, yi, xi]] != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let mut occupancy = Occupancy::new((2, 100, 100), 2.0, 4.0);
        assert!(!occupancy.get(0, 50.0, 50.0));

        occupancy.set(0, 50.0, 50.0, 10.0);
        assert!(occupancy.get(0, 50.0, 50.0));
        assert!(occupancy.get(0, 58.0, 50.0));
        assert!(!occupancy.get(0, 80.0, 50.0));
        // other joint types are unaffected
        assert!(!occupancy.get(1, 50.0, 50.0));
    }

    #[test]
    fn test_minimum_claim_radius() {
        let mut occupancy = Occupancy::new((1, 100, 100), 2.0, 4.0);
        occupancy.set(0, 50.0, 50.0, 0.1);
        // a tiny sigma still claims at least min_scale around the center
        assert!(occupancy.get(0, 53.0, 50.0));
    }

    #[test]
    fn test_out_of_range() {
        let occupancy = Occupancy::new((1, 100, 100), 2.0, 4.0);
        // unknown joint type reads back as occupied
        assert!(occupancy.get(5, 50.0, 50.0));
        // out-of-bounds coordinates clamp instead of panicking
        assert!(!occupancy.get(0, -10.0, 1e6));
    }

    #[test]
    fn test_claims_are_deterministic() {
        let mut a = Occupancy::new((1, 64, 64), 2.0, 4.0);
        let mut b = Occupancy::new((1, 64, 64), 2.0, 4.0);
        for occupancy in [&mut a, &mut b] {
            occupancy.set(0, 10.0, 12.0, 3.0);
            occupancy.set(0, 40.0, 8.0, 6.0);
        }
        assert_eq!(a.grid, b.grid);
    }
}
