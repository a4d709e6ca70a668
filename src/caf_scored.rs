// FieldPose 🚀 AGPL-3.0 License

//! Association Scorer tables.
//!
//! Builds, per skeleton edge, a forward and a backward list of association
//! entries. Backward entries are the same field cells with the source and
//! target halves swapped, so a single directed lookup serves both traversal
//! directions. Entry confidences are rescored against the accumulated
//! intensity surface at their endpoint: an association into a region with no
//! intensity support is down-weighted to a configurable floor.

use crate::cifhr::CifHr;
use crate::error::{DecodeError, Result};
use crate::fields::{caf_channel, CafField};
use crate::skeleton::Skeleton;

/// Weight of the raw association confidence when no intensity support exists
/// at the endpoint.
const CIF_FLOOR: f32 = 0.1;

/// One directed association entry:
/// `[v, x1, y1, b1, s1, x2, y2, b2, s2]` in source-image pixels,
/// source half first.
pub type CafEntry = [f32; 9];

/// Directed, rescored association entries per skeleton edge.
#[derive(Debug, Clone)]
pub struct CafScored {
    forward: Vec<Vec<CafEntry>>,
    backward: Vec<Vec<CafEntry>>,
}

impl CafScored {
    /// Build the directed tables from association fields.
    ///
    /// # Arguments
    ///
    /// * `cifhr` - Accumulated intensity surface used for rescoring.
    /// * `cafs` - One association field per scale/stride variant.
    /// * `skeleton` - Edge-to-joint mapping for endpoint rescoring.
    /// * `score_th` - Minimum entry confidence, before and after rescoring.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FieldError`] if a field's edge count does not
    /// match the skeleton.
    pub fn fill(
        cifhr: &CifHr,
        cafs: &[CafField],
        skeleton: &Skeleton,
        score_th: f32,
    ) -> Result<Self> {
        let num_edges = skeleton.num_edges();
        let mut scored = Self {
            forward: vec![Vec::new(); num_edges],
            backward: vec![Vec::new(); num_edges],
        };
        for caf in cafs {
            if caf.num_edges() != num_edges {
                return Err(DecodeError::FieldError(format!(
                    "association field has {} edges, skeleton has {num_edges}",
                    caf.num_edges()
                )));
            }
            scored.fill_single(cifhr, caf, skeleton, score_th);
        }
        Ok(scored)
    }

    fn fill_single(&mut self, cifhr: &CifHr, caf: &CafField, skeleton: &Skeleton, score_th: f32) {
        let (_, _, grid_h, grid_w) = caf.data.dim();

        for (edge, &[j1, j2]) in skeleton.edges().iter().enumerate() {
            for yy in 0..grid_h {
                for xx in 0..grid_w {
                    let v = caf.data[[edge, caf_channel::V, yy, xx]];
                    if v <= score_th {
                        continue;
                    }

                    // scale coordinates, spreads and scales to source pixels
                    let mut nine: CafEntry = [0.0; 9];
                    nine[caf_channel::V] = v;
                    for c in caf_channel::X1..=caf_channel::S2 {
                        nine[c] = caf.data[[edge, c, yy, xx]] * caf.stride;
                    }

                    if caf.min_distance > 0.0 || caf.max_distance.is_some() {
                        let dx = nine[caf_channel::X2] - nine[caf_channel::X1];
                        let dy = nine[caf_channel::Y2] - nine[caf_channel::Y1];
                        let dist = dx.hypot(dy);
                        if dist < caf.min_distance {
                            continue;
                        }
                        if let Some(max_distance) = caf.max_distance {
                            if dist > max_distance {
                                continue;
                            }
                        }
                    }

                    let score_f = rescore(
                        v,
                        cifhr.value(j2, nine[caf_channel::X2], nine[caf_channel::Y2]),
                    );
                    if score_f > score_th {
                        let mut entry = nine;
                        entry[caf_channel::V] = score_f;
                        self.forward[edge].push(entry);
                    }

                    let score_b = rescore(
                        v,
                        cifhr.value(j1, nine[caf_channel::X1], nine[caf_channel::Y1]),
                    );
                    if score_b > score_th {
                        self.backward[edge].push(swap_halves(&nine, score_b));
                    }
                }
            }
        }
    }

    /// The entry lists for traversing `edge` in the given direction:
    /// `(along, against)`. The second list serves the reverse-match check.
    #[must_use]
    pub fn directed(&self, edge: usize, forward: bool) -> (&[CafEntry], &[CafEntry]) {
        if forward {
            (&self.forward[edge], &self.backward[edge])
        } else {
            (&self.backward[edge], &self.forward[edge])
        }
    }
}

fn rescore(v: f32, hr: f32) -> f32 {
    v * (CIF_FLOOR + (1.0 - CIF_FLOOR) * hr)
}

fn swap_halves(nine: &CafEntry, score: f32) -> CafEntry {
    [
        score,
        nine[caf_channel::X2],
        nine[caf_channel::Y2],
        nine[caf_channel::B2],
        nine[caf_channel::S2],
        nine[caf_channel::X1],
        nine[caf_channel::Y1],
        nine[caf_channel::B1],
        nine[caf_channel::S1],
    ]
}
