// FieldPose 🚀 AGPL-3.0 License

//! Seed Selector: instance-growth starting points.
//!
//! Scans the accumulated confidence surface for local maxima above the seed
//! threshold and proposes them in descending-confidence order. The ordering
//! is load-bearing: it determines which instance claims a region first. The
//! consumer re-checks occupancy before accepting a seed, since a region may
//! have been claimed by an instance grown from an earlier seed.

use crate::cifhr::CifHr;

/// One seed candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    /// Accumulated confidence at the seed location.
    pub v: f32,
    /// Joint type.
    pub joint: usize,
    /// x in source-image pixels.
    pub x: f32,
    /// y in source-image pixels.
    pub y: f32,
    /// Joint scale estimate at the seed location.
    pub s: f32,
}

/// Seed candidates extracted from an accumulated surface.
#[derive(Debug, Clone)]
pub struct CifSeeds {
    seeds: Vec<Seed>,
}

impl CifSeeds {
    /// Scan the accumulated surface for seeds.
    ///
    /// A pixel qualifies when its confidence reaches `seed_threshold` and is
    /// not exceeded by any of its eight neighbors. The result is sorted by
    /// descending confidence; ties break by scan order (joint, then y,
    /// then x), so the output is deterministic.
    #[must_use]
    pub fn fill(cifhr: &CifHr, seed_threshold: f32) -> Self {
        let (joints, height, width) = cifhr.accumulated.dim();
        let mut seeds = Vec::new();

        for j in 0..joints {
            for y in 0..height {
                for x in 0..width {
                    let v = cifhr.accumulated[[j, y, x]];
                    if v < seed_threshold {
                        continue;
                    }
                    if !Self::is_local_max(cifhr, j, y, x, v) {
                        continue;
                    }
                    #[allow(clippy::cast_precision_loss)]
                    seeds.push(Seed {
                        v,
                        joint: j,
                        x: x as f32,
                        y: y as f32,
                        s: cifhr.scales[[j, y, x]],
                    });
                }
            }
        }

        seeds.sort_by(|a, b| {
            b.v.total_cmp(&a.v)
                .then(a.joint.cmp(&b.joint))
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        Self { seeds }
    }

    fn is_local_max(cifhr: &CifHr, j: usize, y: usize, x: usize, v: f32) -> bool {
        let (_, height, width) = cifhr.accumulated.dim();
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dy == 0 && dx == 0 {
                    continue;
                }
                let yy = y as i64 + dy;
                let xx = x as i64 + dx;
                if yy < 0 || xx < 0 || yy >= height as i64 || xx >= width as i64 {
                    continue;
                }
                #[allow(clippy::cast_sign_loss)]
                if cifhr.accumulated[[j, yy as usize, xx as usize]] > v {
                    return false;
                }
            }
        }
        true
    }

    /// Seeds in descending-confidence order.
    #[must_use]
    pub fn get(&self) -> &[Seed] {
        &self.seeds
    }

    /// Number of seed candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Whether no seed qualified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}
