// FieldPose 🚀 AGPL-3.0 License

//! Instance Assembler: greedy best-first decoding of pose instances.
//!
//! This is the central state machine of the crate. Each accepted seed starts
//! an instance that grows along the skeleton graph by repeatedly committing
//! the highest-scoring available connection. The frontier is a max-priority
//! queue of tagged entries:
//!
//! - *lazy* entries carry only an upper-bound priority (the square root of
//!   the source joint's confidence) and defer the expensive association
//!   lookup until they reach the top of the queue;
//! - *resolved* entries carry an actual candidate and its true score.
//!
//! Because the lazy bound never underestimates the resolved score, popping a
//! resolved entry guarantees no unresolved entry could beat it — unless
//! greedy mode is enabled, which deliberately accepts the first resolved
//! candidate without re-queuing it (a documented speed/quality tradeoff).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use crate::annotation::{Annotation, DecodedEdge};
use crate::caf_scored::{CafEntry, CafScored};
use crate::cifhr::CifHr;
use crate::config::{ConnectionMethod, DecoderConfig};
use crate::error::{DecodeError, Result};
use crate::fields::{caf_channel, CafField, CifField};
use crate::nms::KeypointNms;
use crate::occupancy::Occupancy;
use crate::seeds::CifSeeds;
use crate::skeleton::Skeleton;
use crate::verbose;

/// Association threshold used when rebuilding the scoring tables for the
/// completion pass.
const COMPLETION_CAF_TH: f32 = 0.0001;
/// Ceiling applied to joint confidences first filled by the completion pass,
/// marking them as low-trust placements.
const COMPLETION_CLIP: f32 = 0.001;
/// Nominal confidence of flood-filled joints.
const FLOOD_FILL_CONFIDENCE: f32 = 0.00001;
/// Occupancy grid coarsening.
const OCCUPANCY_REDUCTION: f32 = 2.0;
/// Minimum occupancy claim half-width in source-image pixels.
const OCCUPANCY_MIN_CLAIM: f32 = 4.0;

/// A resolved connection target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x: f32,
    y: f32,
    s: f32,
    v: f32,
}

/// Frontier scheduling unit; alive only inside one growth invocation.
#[derive(Debug, Clone, Copy)]
enum FrontierEntry {
    /// Candidate not looked up yet; priority is an admissible upper bound.
    Lazy { source: usize, target: usize },
    /// Candidate resolved; priority is the actual connection score.
    Resolved {
        candidate: Candidate,
        source: usize,
        target: usize,
    },
}

/// Max-heap wrapper: highest priority first, FIFO among equal priorities.
#[derive(Debug, Clone, Copy)]
struct Prioritized {
    priority: f32,
    seq: u64,
    entry: FrontierEntry,
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Field-to-instance pose decoder.
///
/// Construction validates the configuration and fixes all thresholds; a
/// decoder is immutable afterwards and may be shared across threads, with
/// each image decoded by an independent call.
///
/// # Example
///
/// ```no_run
/// use fieldpose::{CifCafDecoder, CifField, CafField, DecoderConfig, Skeleton};
/// use ndarray::Array4;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let decoder = CifCafDecoder::new(DecoderConfig::new(), Skeleton::coco_person())?;
///     let cif = CifField::new(Array4::zeros((17, 5, 48, 64)), 8.0)?;
///     let caf = CafField::new(Array4::zeros((19, 9, 48, 64)), 8.0)?;
///     let annotations = decoder.decode(&[cif], &[caf])?;
///     for ann in &annotations {
///         println!("instance score {:.2}", ann.score());
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CifCafDecoder {
    config: DecoderConfig,
    skeleton: Skeleton,
    keypoint_threshold: f32,
    confidence_scales: Option<Vec<f32>>,
    nms: KeypointNms,
}

impl CifCafDecoder {
    /// Create a decoder.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ConfigError`] if the configuration is
    /// inconsistent, or if dense connections are requested on a skeleton
    /// without auxiliary edges.
    pub fn new(config: DecoderConfig, skeleton: Skeleton) -> Result<Self> {
        config.validate()?;

        let confidence_scales = if config.dense_connections {
            if !(0..skeleton.num_edges()).any(|e| skeleton.is_aux_edge(e)) {
                return Err(DecodeError::ConfigError(
                    "dense_connections requires a skeleton with auxiliary edges".to_string(),
                ));
            }
            let scales = (0..skeleton.num_edges())
                .map(|e| {
                    if skeleton.is_aux_edge(e) {
                        config.dense_coupling
                    } else {
                        1.0
                    }
                })
                .collect();
            Some(scales)
        } else {
            None
        };

        let keypoint_threshold = config.resolved_keypoint_threshold();
        let nms = KeypointNms::new(config.instance_threshold, keypoint_threshold);

        Ok(Self {
            config,
            skeleton,
            keypoint_threshold,
            confidence_scales,
            nms,
        })
    }

    /// The skeleton this decoder assembles over.
    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one image's field tensors into pose instances.
    ///
    /// # Arguments
    ///
    /// * `cifs` - Intensity fields, one per scale/stride variant.
    /// * `cafs` - Association fields, one per scale/stride variant.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FieldError`] if a field does not match the
    /// skeleton or the field list is empty.
    pub fn decode(&self, cifs: &[CifField], cafs: &[CafField]) -> Result<Vec<Annotation>> {
        self.decode_with_initial(cifs, cafs, Vec::new())
    }

    /// Decode with externally provided initial instances (e.g. tracked
    /// poses). Initial instances are grown before any new seed is consumed
    /// and claim occupancy first.
    ///
    /// # Errors
    ///
    /// As [`CifCafDecoder::decode`]; additionally fails if an initial
    /// instance does not match the skeleton's joint count.
    pub fn decode_with_initial(
        &self,
        cifs: &[CifField],
        cafs: &[CafField],
        initial: Vec<Annotation>,
    ) -> Result<Vec<Annotation>> {
        let start = Instant::now();
        for ann in &initial {
            if ann.num_keypoints() != self.skeleton.num_keypoints() {
                return Err(DecodeError::FieldError(format!(
                    "initial instance has {} joints, skeleton has {}",
                    ann.num_keypoints(),
                    self.skeleton.num_keypoints()
                )));
            }
        }

        let mut cifhr = CifHr::new(cifs, self.config.cif_threshold)?;
        cifhr.fill(cifs);
        if cifhr.num_joints() != self.skeleton.num_keypoints() {
            return Err(DecodeError::FieldError(format!(
                "intensity field has {} joints, skeleton has {}",
                cifhr.num_joints(),
                self.skeleton.num_keypoints()
            )));
        }

        let seeds = CifSeeds::fill(&cifhr, self.config.seed_threshold);
        let caf_scored = CafScored::fill(&cifhr, cafs, &self.skeleton, self.config.caf_threshold)?;

        let (height, width) = cifhr.shape();
        let mut occupied = Occupancy::new(
            (cifhr.num_joints(), height, width),
            OCCUPANCY_REDUCTION,
            OCCUPANCY_MIN_CLAIM,
        );
        let mut annotations = Vec::new();

        for mut ann in initial {
            self.grow(&mut ann, &caf_scored, true);
            mark_occupied(&mut occupied, &ann);
            annotations.push(ann);
        }

        for seed in seeds.get() {
            if occupied.get(seed.joint, seed.x, seed.y) {
                continue;
            }
            let mut ann = Annotation::new(self.skeleton.num_keypoints())
                .add(seed.joint, [seed.x, seed.y, seed.v]);
            ann.joint_scales[seed.joint] = seed.s;
            self.grow(&mut ann, &caf_scored, true);
            mark_occupied(&mut occupied, &ann);
            annotations.push(ann);
        }

        verbose!(
            "{} annotations from {} seeds, {:.3}s",
            annotations.len(),
            seeds.len(),
            start.elapsed().as_secs_f64()
        );

        if self.config.force_complete {
            self.complete_annotations(&cifhr, cafs, &mut annotations)?;
        }

        Ok(self.nms.annotations(annotations))
    }

    /// Grow one instance until its frontier is exhausted.
    fn grow(&self, ann: &mut Annotation, caf_scored: &CafScored, reverse_match: bool) {
        let mut frontier: BinaryHeap<Prioritized> = BinaryHeap::new();
        let mut in_frontier: HashSet<(usize, usize)> = HashSet::new();
        let mut seq = 0u64;

        for joint in 0..ann.num_keypoints() {
            if ann.data[joint][2] > 0.0 {
                self.add_to_frontier(ann, &mut frontier, &mut in_frontier, &mut seq, joint);
            }
        }

        while let Some(Prioritized { entry, .. }) = frontier.pop() {
            let (candidate, source, target) = match entry {
                FrontierEntry::Lazy { source, target } => {
                    if ann.data[target][2] > 0.0 {
                        continue;
                    }
                    let Some(candidate) =
                        self.connection_value(ann, caf_scored, source, target, reverse_match)
                    else {
                        continue;
                    };
                    if !self.config.greedy {
                        // re-queue at the true score; the per-edge multiplier
                        // applies here, never to the lazy upper bound
                        let mut priority = candidate.v;
                        if let Some(scales) = &self.confidence_scales {
                            if let Some(n) = self.skeleton.edge_between(source, target) {
                                priority *= scales[n.edge];
                            }
                        }
                        frontier.push(Prioritized {
                            priority,
                            seq,
                            entry: FrontierEntry::Resolved {
                                candidate,
                                source,
                                target,
                            },
                        });
                        seq += 1;
                        continue;
                    }
                    (candidate, source, target)
                }
                FrontierEntry::Resolved {
                    candidate,
                    source,
                    target,
                } => {
                    if ann.data[target][2] > 0.0 {
                        continue;
                    }
                    (candidate, source, target)
                }
            };

            ann.data[target] = [candidate.x, candidate.y, candidate.v];
            ann.joint_scales[target] = candidate.s;
            ann.decoding_order.push(DecodedEdge {
                source,
                target,
                source_xyv: ann.data[source],
                target_xyv: ann.data[target],
            });
            self.add_to_frontier(ann, &mut frontier, &mut in_frontier, &mut seq, target);
        }
    }

    /// Push lazy entries for all unplaced neighbors of `start`.
    fn add_to_frontier(
        &self,
        ann: &mut Annotation,
        frontier: &mut BinaryHeap<Prioritized>,
        in_frontier: &mut HashSet<(usize, usize)>,
        seq: &mut u64,
        start: usize,
    ) {
        for neighbor in self.skeleton.by_source(start) {
            let end = neighbor.joint;
            if ann.data[end][2] > 0.0 {
                continue;
            }
            if !in_frontier.insert((start, end)) {
                continue;
            }
            let max_possible_score = ann.data[start][2].sqrt();
            frontier.push(Prioritized {
                priority: max_possible_score,
                seq: *seq,
                entry: FrontierEntry::Lazy {
                    source: start,
                    target: end,
                },
            });
            *seq += 1;
            ann.frontier_order.push((start, end));
        }
    }

    /// Score the connection from a placed `start` joint towards `end`.
    ///
    /// Returns `None` when there is no signal: empty association window,
    /// combined confidence below the keypoint threshold, or a failed
    /// reverse-match check.
    fn connection_value(
        &self,
        ann: &Annotation,
        caf_scored: &CafScored,
        start: usize,
        end: usize,
        reverse_match: bool,
    ) -> Option<Candidate> {
        let neighbor = self.skeleton.edge_between(start, end)?;
        let (caf_f, caf_b) = caf_scored.directed(neighbor.edge, neighbor.forward);
        let xyv = ann.data[start];
        let xy_scale_s = ann.joint_scales[start].max(0.0);

        let forward = self.grow_connection([xyv[0], xyv[1]], xy_scale_s, caf_f)?;
        let keypoint_score = (forward.v * xyv[2]).sqrt();
        if keypoint_score < self.keypoint_threshold {
            return None;
        }
        let xy_scale_t = forward.s.max(0.0);

        if reverse_match {
            let reverse = self.grow_connection([forward.x, forward.y], xy_scale_t, caf_b)?;
            if (xyv[0] - reverse.x).abs() + (xyv[1] - reverse.y).abs() > xy_scale_s {
                return None;
            }
        }

        Some(Candidate {
            x: forward.x,
            y: forward.y,
            s: forward.s,
            v: keypoint_score,
        })
    }

    /// Resolve an association window around a source location to a single
    /// target, using the configured connection method.
    fn grow_connection(
        &self,
        xy: [f32; 2],
        xy_scale: f32,
        caf_field: &[CafEntry],
    ) -> Option<Candidate> {
        let window = 2.0 * xy_scale;
        let sigma = 0.5 * xy_scale;

        let mut best: Option<(f32, &CafEntry)> = None;
        let mut second: Option<(f32, &CafEntry)> = None;
        for entry in caf_field {
            if (entry[caf_channel::X1] - xy[0]).abs() > window
                || (entry[caf_channel::Y1] - xy[1]).abs() > window
            {
                continue;
            }
            let d = (entry[caf_channel::X1] - xy[0]).hypot(entry[caf_channel::Y1] - xy[1]);
            let weight = if d > 0.0 {
                (-0.5 * d * d / (sigma * sigma)).exp()
            } else {
                1.0
            };
            let score = weight * entry[caf_channel::V];

            match best {
                Some((best_score, _)) if score <= best_score => match second {
                    Some((second_score, _)) if score <= second_score => {}
                    _ => second = Some((score, entry)),
                },
                _ => {
                    second = best;
                    best = Some((score, entry));
                }
            }
        }

        let (score_1, entry_1) = best?;
        match self.config.connection_method {
            ConnectionMethod::Max => Some(Candidate {
                x: entry_1[caf_channel::X2],
                y: entry_1[caf_channel::Y2],
                s: entry_1[caf_channel::S2],
                v: score_1,
            }),
            ConnectionMethod::Blend => Some(blend(score_1, entry_1, second)),
        }
    }

    /// Relaxed second growth attempt for instances with unfilled joints.
    ///
    /// Rebuilds the association tables with a near-zero threshold, grows
    /// one-way (reverse match disabled), clips newly filled joints to a
    /// low-trust confidence, and flood-fills whatever remains unreachable.
    fn complete_annotations(
        &self,
        cifhr: &CifHr,
        cafs: &[CafField],
        annotations: &mut [Annotation],
    ) -> Result<()> {
        let start = Instant::now();
        let caf_scored = CafScored::fill(cifhr, cafs, &self.skeleton, COMPLETION_CAF_TH)?;

        for ann in annotations.iter_mut() {
            let unfilled: Vec<bool> = ann.data.iter().map(|xyv| xyv[2] == 0.0).collect();
            self.grow(ann, &caf_scored, false);
            for (joint, was_unfilled) in unfilled.into_iter().enumerate() {
                if was_unfilled && ann.data[joint][2] > 0.0 {
                    ann.data[joint][2] = ann.data[joint][2].min(COMPLETION_CLIP);
                }
            }

            if ann.data.iter().any(|xyv| xyv[2] == 0.0) {
                self.flood_fill(ann);
                if ann.data.iter().any(|xyv| xyv[2] == 0.0) {
                    crate::warn!(
                        "instance still incomplete after flood fill: {} of {} joints placed",
                        ann.num_placed(),
                        ann.num_keypoints()
                    );
                }
            }
        }

        verbose!("complete annotations {:.3}s", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Copy placed neighbors onto joints the association graph never
    /// reached. Joints unreachable even through the skeleton stay at zero
    /// confidence; that is a valid terminal outcome.
    fn flood_fill(&self, ann: &mut Annotation) {
        #[derive(Debug, Clone, Copy)]
        struct FloodEntry {
            priority: f32,
            seq: u64,
            target: usize,
            xy: [f32; 2],
            s: f32,
        }
        impl PartialEq for FloodEntry {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }
        impl Eq for FloodEntry {}
        impl PartialOrd for FloodEntry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for FloodEntry {
            fn cmp(&self, other: &Self) -> Ordering {
                self.priority
                    .total_cmp(&other.priority)
                    .then(other.seq.cmp(&self.seq))
            }
        }

        let mut frontier: BinaryHeap<FloodEntry> = BinaryHeap::new();
        let mut seq = 0u64;
        let push_neighbors = |ann: &Annotation,
                                  frontier: &mut BinaryHeap<FloodEntry>,
                                  seq: &mut u64,
                                  start: usize| {
            for neighbor in self.skeleton.by_source(start) {
                if ann.data[neighbor.joint][2] > 0.0 {
                    continue;
                }
                let xyv = ann.data[start];
                frontier.push(FloodEntry {
                    priority: xyv[2],
                    seq: *seq,
                    target: neighbor.joint,
                    xy: [xyv[0], xyv[1]],
                    s: ann.joint_scales[start],
                });
                *seq += 1;
            }
        };

        for joint in 0..ann.num_keypoints() {
            if ann.data[joint][2] > 0.0 {
                push_neighbors(ann, &mut frontier, &mut seq, joint);
            }
        }

        while let Some(entry) = frontier.pop() {
            if ann.data[entry.target][2] > 0.0 {
                continue;
            }
            ann.data[entry.target] = [entry.xy[0], entry.xy[1], FLOOD_FILL_CONFIDENCE];
            ann.joint_scales[entry.target] = entry.s;
            push_neighbors(ann, &mut frontier, &mut seq, entry.target);
        }
    }
}

/// Stamp occupancy claims for every placed joint of an instance.
fn mark_occupied(occupied: &mut Occupancy, ann: &Annotation) {
    for (joint, xyv) in ann.data.iter().enumerate() {
        if xyv[2] == 0.0 {
            continue;
        }
        occupied.set(joint, xyv[0], xyv[1], ann.joint_scales[joint]);
    }
}

/// Blend the top two candidates with a confidence-weighted average.
///
/// Falls back to the top candidate at half confidence when the second is
/// weak (score below 0.01 or below half the top score) or when the two
/// targets are farther apart than half the top target's scale.
fn blend(score_1: f32, entry_1: &CafEntry, second: Option<(f32, &CafEntry)>) -> Candidate {
    let top_alone = Candidate {
        x: entry_1[caf_channel::X2],
        y: entry_1[caf_channel::Y2],
        s: entry_1[caf_channel::S2],
        v: 0.5 * score_1,
    };

    let Some((score_2, entry_2)) = second else {
        return top_alone;
    };
    if score_2 < 0.01 || score_2 < 0.5 * score_1 {
        return top_alone;
    }

    let d = (entry_1[caf_channel::X2] - entry_2[caf_channel::X2])
        .hypot(entry_1[caf_channel::Y2] - entry_2[caf_channel::Y2]);
    if d > entry_1[caf_channel::S2] / 2.0 {
        return top_alone;
    }

    let total = score_1 + score_2;
    Candidate {
        x: (score_1 * entry_1[caf_channel::X2] + score_2 * entry_2[caf_channel::X2]) / total,
        y: (score_1 * entry_1[caf_channel::Y2] + score_2 * entry_2[caf_channel::Y2]) / total,
        s: (score_1 * entry_1[caf_channel::S2] + score_2 * entry_2[caf_channel::S2]) / total,
        v: 0.5 * total,
    }
}
