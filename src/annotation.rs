// FieldPose 🚀 AGPL-3.0 License

//! Pose instance records.

use serde::{Deserialize, Serialize};

/// One committed connection, in decoding order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodedEdge {
    /// Joint the connection was grown from.
    pub source: usize,
    /// Joint the connection placed.
    pub target: usize,
    /// Source `[x, y, v]` at commit time.
    pub source_xyv: [f32; 3],
    /// Target `[x, y, v]` at commit time.
    pub target_xyv: [f32; 3],
}

/// A pose instance: labeled 2-D keypoints with confidence and scale.
///
/// Created empty when a seed is accepted, mutated in place while the
/// instance grows, then emitted as-is. A confidence of exactly 0.0 means the
/// joint was never placed; placed joints always carry a strictly positive
/// confidence, however small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Per-joint `[x, y, v]` triples, indexed by joint type.
    pub data: Vec<[f32; 3]>,
    /// Per-joint scale estimates.
    pub joint_scales: Vec<f32>,
    /// Committed connections in the order they were decoded.
    pub decoding_order: Vec<DecodedEdge>,
    /// `(source, target)` pairs in the order they entered the frontier.
    pub frontier_order: Vec<(usize, usize)>,
}

impl Annotation {
    /// Create an empty instance for `num_keypoints` joint types.
    #[must_use]
    pub fn new(num_keypoints: usize) -> Self {
        Self {
            data: vec![[0.0; 3]; num_keypoints],
            joint_scales: vec![0.0; num_keypoints],
            decoding_order: Vec::new(),
            frontier_order: Vec::new(),
        }
    }

    /// Place a joint, builder style. Used for seeding.
    #[must_use]
    pub fn add(mut self, joint: usize, xyv: [f32; 3]) -> Self {
        self.data[joint] = xyv;
        self
    }

    /// Number of joint types.
    #[must_use]
    pub fn num_keypoints(&self) -> usize {
        self.data.len()
    }

    /// Number of placed joints (confidence > 0).
    #[must_use]
    pub fn num_placed(&self) -> usize {
        self.data.iter().filter(|xyv| xyv[2] > 0.0).count()
    }

    /// Overall instance score: a mean confidence nudged towards the
    /// strongest joint.
    #[must_use]
    pub fn score(&self) -> f32 {
        let max = self.data.iter().map(|xyv| xyv[2]).fold(0.0f32, f32::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = self.data.iter().map(|xyv| xyv[2]).sum::<f32>() / self.data.len() as f32;
        0.1 * max + 0.9 * mean
    }
}
