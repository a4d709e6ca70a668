// FieldPose 🚀 AGPL-3.0 License

//! Skeleton topology: keypoint names, edge tables, and adjacency views.
//!
//! The skeleton is fixed at decoder construction time. Both adjacency views
//! (`by_source`, `by_target`) are precomputed arrays indexed by joint id and
//! never mutated afterwards, so a [`Skeleton`] can be shared across
//! concurrent per-image decodes.

use crate::error::{DecodeError, Result};

/// COCO-Pose keypoint names, in channel order.
pub const COCO_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// COCO-Pose skeleton structure (pairs of keypoint indices).
/// Defines which keypoints connect to form the pose skeleton.
pub const COCO_PERSON_SKELETON: [[usize; 2]; 19] = [
    [15, 13], // left ankle to left knee
    [13, 11], // left knee to left hip
    [16, 14], // right ankle to right knee
    [14, 12], // right knee to right hip
    [11, 12], // left hip to right hip
    [5, 11],  // left shoulder to left hip
    [6, 12],  // right shoulder to right hip
    [5, 6],   // left shoulder to right shoulder
    [5, 7],   // left shoulder to left elbow
    [6, 8],   // right shoulder to right elbow
    [7, 9],   // left elbow to left wrist
    [8, 10],  // right elbow to right wrist
    [1, 2],   // left eye to right eye
    [0, 1],   // nose to left eye
    [0, 2],   // nose to right eye
    [1, 3],   // left eye to left ear
    [2, 4],   // right eye to right ear
    [3, 5],   // left ear to left shoulder
    [4, 6],   // right ear to right shoulder
];

/// Auxiliary person connections for dense decoding.
/// These cross-body shortcuts are weaker than the base skeleton and are used
/// with a confidence multiplier well below 1.
pub const DENSE_COCO_PERSON_CONNECTIONS: [[usize; 2]; 23] = [
    [0, 3],   // nose to left ear
    [0, 4],   // nose to right ear
    [3, 4],   // left ear to right ear
    [0, 5],   // nose to left shoulder
    [0, 6],   // nose to right shoulder
    [9, 10],  // left wrist to right wrist
    [5, 8],   // left shoulder to right elbow
    [6, 7],   // right shoulder to left elbow
    [7, 8],   // left elbow to right elbow
    [5, 9],   // left shoulder to left wrist
    [6, 10],  // right shoulder to right wrist
    [7, 11],  // left elbow to left hip
    [8, 12],  // right elbow to right hip
    [9, 11],  // left wrist to left hip
    [10, 12], // right wrist to right hip
    [5, 12],  // left shoulder to right hip
    [6, 11],  // right shoulder to left hip
    [13, 14], // left knee to right knee
    [11, 15], // left hip to left ankle
    [12, 16], // right hip to right ankle
    [15, 16], // left ankle to right ankle
    [13, 16], // left knee to right ankle
    [14, 15], // right knee to left ankle
];

/// One adjacency table entry: the neighbor joint reachable over `edge`.
///
/// `forward` records whether the neighbor sits at the target end of the edge
/// as stored in the association field, or whether the edge must be traversed
/// against its stored direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// Joint id of the neighbor.
    pub joint: usize,
    /// Index into the skeleton edge list (association field channel group).
    pub edge: usize,
    /// Whether the edge is traversed in its stored direction.
    pub forward: bool,
}

/// A fixed joint-type graph with precomputed adjacency views.
#[derive(Debug, Clone)]
pub struct Skeleton {
    keypoints: Vec<String>,
    edges: Vec<[usize; 2]>,
    base_edges: usize,
    by_source: Vec<Vec<Neighbor>>,
    by_target: Vec<Vec<Neighbor>>,
}

impl Skeleton {
    /// Create a skeleton from keypoint names and edges.
    ///
    /// # Arguments
    ///
    /// * `keypoints` - Joint names, one per intensity field channel group.
    /// * `edges` - Pairs of joint indices, one per association field channel
    ///   group, in field order.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::SkeletonError`] if the edge list is empty, an
    /// edge references an unknown joint, or an edge connects a joint to
    /// itself.
    pub fn new(keypoints: Vec<String>, edges: Vec<[usize; 2]>) -> Result<Self> {
        let base_edges = edges.len();
        Self::with_aux_edges(keypoints, edges, base_edges)
    }

    /// Create a skeleton whose edges from index `base_edges` onwards are
    /// auxiliary (dense) connections.
    fn with_aux_edges(
        keypoints: Vec<String>,
        edges: Vec<[usize; 2]>,
        base_edges: usize,
    ) -> Result<Self> {
        if keypoints.is_empty() {
            return Err(DecodeError::SkeletonError(
                "keypoint list must not be empty".to_string(),
            ));
        }
        if edges.is_empty() {
            return Err(DecodeError::SkeletonError(
                "edge list must not be empty".to_string(),
            ));
        }

        let n = keypoints.len();
        let mut by_source = vec![Vec::new(); n];
        let mut by_target = vec![Vec::new(); n];
        for (edge, &[j1, j2]) in edges.iter().enumerate() {
            if j1 >= n || j2 >= n {
                return Err(DecodeError::SkeletonError(format!(
                    "edge {edge} references joint out of range: ({j1}, {j2}) with {n} keypoints"
                )));
            }
            if j1 == j2 {
                return Err(DecodeError::SkeletonError(format!(
                    "edge {edge} connects joint {j1} to itself"
                )));
            }
            by_source[j1].push(Neighbor {
                joint: j2,
                edge,
                forward: true,
            });
            by_source[j2].push(Neighbor {
                joint: j1,
                edge,
                forward: false,
            });
            by_target[j2].push(Neighbor {
                joint: j1,
                edge,
                forward: true,
            });
            by_target[j1].push(Neighbor {
                joint: j2,
                edge,
                forward: false,
            });
        }

        Ok(Self {
            keypoints,
            edges,
            base_edges,
            by_source,
            by_target,
        })
    }

    /// The standard COCO person skeleton (17 keypoints, 19 edges).
    #[must_use]
    pub fn coco_person() -> Self {
        Self::new(
            COCO_KEYPOINTS.iter().map(|s| (*s).to_string()).collect(),
            COCO_PERSON_SKELETON.to_vec(),
        )
        .expect("COCO person skeleton constants are valid")
    }

    /// The COCO person skeleton extended with dense auxiliary connections.
    ///
    /// The auxiliary edges are appended after the base edges so the
    /// association field layout stays compatible; [`Skeleton::is_aux_edge`]
    /// identifies them.
    #[must_use]
    pub fn coco_person_dense() -> Self {
        let mut edges = COCO_PERSON_SKELETON.to_vec();
        edges.extend_from_slice(&DENSE_COCO_PERSON_CONNECTIONS);
        Self::with_aux_edges(
            COCO_KEYPOINTS.iter().map(|s| (*s).to_string()).collect(),
            edges,
            COCO_PERSON_SKELETON.len(),
        )
        .expect("COCO person skeleton constants are valid")
    }

    /// Number of joint types.
    #[must_use]
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Number of edges, auxiliary edges included.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Keypoint names.
    #[must_use]
    pub fn keypoints(&self) -> &[String] {
        &self.keypoints
    }

    /// All edges in field order.
    #[must_use]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Whether `edge` is an auxiliary (dense) connection.
    #[must_use]
    pub fn is_aux_edge(&self, edge: usize) -> bool {
        edge >= self.base_edges
    }

    /// Neighbors reachable from `joint` when it acts as a connection source.
    #[must_use]
    pub fn by_source(&self, joint: usize) -> &[Neighbor] {
        &self.by_source[joint]
    }

    /// Neighbors that reach `joint` when it acts as a connection target.
    #[must_use]
    pub fn by_target(&self, joint: usize) -> &[Neighbor] {
        &self.by_target[joint]
    }

    /// Look up the edge between `source` and `target`, if any.
    #[must_use]
    pub fn edge_between(&self, source: usize, target: usize) -> Option<Neighbor> {
        self.by_source[source]
            .iter()
            .find(|n| n.joint == target)
            .copied()
    }
}
