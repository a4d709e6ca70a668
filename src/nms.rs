// FieldPose 🚀 AGPL-3.0 License

//! Redundancy Filter: keypoint-level non-maximum suppression.
//!
//! Deduplicates near-identical instances after assembly. Instances are
//! processed in descending overall-score order; each placed keypoint claims
//! its region in a per-joint occupancy grid and keypoints of weaker
//! instances that fall into an existing claim are suppressed. Instances
//! whose score drops below the instance threshold are removed.

use crate::annotation::Annotation;
use crate::occupancy::Occupancy;

/// Occupancy coarsening used for suppression claims.
const REDUCTION: f32 = 2.0;
/// Minimum claim half-width in source-image pixels.
const MIN_CLAIM: f32 = 4.0;

/// Keypoint-occupancy non-maximum suppression over instances.
#[derive(Debug, Clone)]
pub struct KeypointNms {
    /// Confidence multiplier for suppressed keypoints. 0.0 removes them.
    pub suppression: f32,
    /// Minimum overall instance score.
    pub instance_threshold: f32,
    /// Minimum keypoint confidence; weaker keypoints are cleared before and
    /// after suppression.
    pub keypoint_threshold: f32,
}

impl KeypointNms {
    /// Create a filter with the given thresholds and full suppression.
    #[must_use]
    pub const fn new(instance_threshold: f32, keypoint_threshold: f32) -> Self {
        Self {
            suppression: 0.0,
            instance_threshold,
            keypoint_threshold,
        }
    }

    /// Filter a list of instances.
    ///
    /// Deterministic for identical input: ordering ties are broken by the
    /// original index.
    #[must_use]
    pub fn annotations(&self, mut anns: Vec<Annotation>) -> Vec<Annotation> {
        for ann in &mut anns {
            self.apply_keypoint_threshold(ann);
        }
        anns.retain(|ann| ann.score() >= self.instance_threshold);
        if anns.is_empty() {
            return anns;
        }

        let mut order: Vec<usize> = (0..anns.len()).collect();
        order.sort_by(|&a, &b| anns[b].score().total_cmp(&anns[a].score()).then(a.cmp(&b)));

        let shape = claim_area(&anns);
        let mut occupied = Occupancy::new(shape, REDUCTION, MIN_CLAIM);
        for &i in &order {
            let ann = &mut anns[i];
            for j in 0..ann.num_keypoints() {
                let [x, y, v] = ann.data[j];
                if v == 0.0 {
                    continue;
                }
                if occupied.get(j, x, y) {
                    ann.data[j][2] *= self.suppression;
                } else {
                    occupied.set(j, x, y, ann.joint_scales[j]);
                }
            }
        }

        for ann in &mut anns {
            self.apply_keypoint_threshold(ann);
        }
        anns.retain(|ann| ann.score() >= self.instance_threshold);
        anns.sort_by(|a, b| b.score().total_cmp(&a.score()));
        anns
    }

    fn apply_keypoint_threshold(&self, ann: &mut Annotation) {
        for xyv in &mut ann.data {
            if xyv[2] < self.keypoint_threshold {
                *xyv = [0.0; 3];
            }
        }
    }
}

/// Smallest `(joints, height, width)` extent covering all placed keypoints.
fn claim_area(anns: &[Annotation]) -> (usize, usize, usize) {
    let joints = anns.iter().map(Annotation::num_keypoints).max().unwrap_or(0);
    let mut max_x = 1.0f32;
    let mut max_y = 1.0f32;
    for ann in anns {
        for &[x, y, v] in &ann.data {
            if v > 0.0 {
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    (joints, max_y.ceil() as usize + 1, max_x.ceil() as usize + 1)
}
