// FieldPose 🚀 AGPL-3.0 License

//! End-to-end decoding tests on synthetic field tensors.
//!
//! The scenes are built at stride 4. Each joint detection is a 4x4 block of
//! sixteen field cells that all regress to the same point, so the accumulated
//! confidence at that point reconstructs the per-cell confidence.

use fieldpose::{
    caf_channel, cif_channel, Annotation, CafField, CifCafDecoder, CifField, ConnectionMethod,
    DecoderConfig, Skeleton,
};
use ndarray::Array4;

const STRIDE: f32 = 4.0;

fn two_joint_skeleton() -> Skeleton {
    Skeleton::new(vec!["a".to_string(), "b".to_string()], vec![[0, 1]]).unwrap()
}

fn chain_skeleton() -> Skeleton {
    Skeleton::new(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        vec![[0, 1], [1, 2]],
    )
    .unwrap()
}

/// Stamp a 4x4 block of cells for joint `j`, all regressing to the raw
/// coordinate `(x, y)` with confidence `v` and scale 1 (4 source pixels).
fn add_block(data: &mut Array4<f32>, j: usize, gx0: usize, gy0: usize, x: f32, y: f32, v: f32) {
    for gy in gy0..gy0 + 4 {
        for gx in gx0..gx0 + 4 {
            data[[j, cif_channel::V, gy, gx]] = v;
            data[[j, cif_channel::X, gy, gx]] = x;
            data[[j, cif_channel::Y, gy, gx]] = y;
            data[[j, cif_channel::S, gy, gx]] = 1.0;
        }
    }
}

/// One directed association cell in edge plane `e` at grid cell `(gy, gx)`.
#[allow(clippy::too_many_arguments)]
fn add_caf_cell(
    data: &mut Array4<f32>,
    e: usize,
    gy: usize,
    gx: usize,
    v: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
) {
    data[[e, caf_channel::V, gy, gx]] = v;
    data[[e, caf_channel::X1, gy, gx]] = x1;
    data[[e, caf_channel::Y1, gy, gx]] = y1;
    data[[e, caf_channel::S1, gy, gx]] = 1.0;
    data[[e, caf_channel::X2, gy, gx]] = x2;
    data[[e, caf_channel::Y2, gy, gx]] = y2;
    data[[e, caf_channel::S2, gy, gx]] = 1.0;
}

/// Single person: joint 0 at (12, 8), joint 1 at (20, 8), one association.
fn single_person_fields(v0: f32, v1: f32) -> (CifField, CafField) {
    let mut cif = Array4::zeros((2, 5, 16, 16));
    add_block(&mut cif, 0, 0, 0, 3.0, 2.0, v0);
    add_block(&mut cif, 1, 4, 0, 5.0, 2.0, v1);

    let mut caf = Array4::zeros((1, 9, 16, 16));
    add_caf_cell(&mut caf, 0, 0, 0, 0.9, 3.0, 2.0, 5.0, 2.0);

    (
        CifField::new(cif, STRIDE).unwrap(),
        CafField::new(caf, STRIDE).unwrap(),
    )
}

fn decode_single(config: DecoderConfig) -> Vec<Annotation> {
    let (cif, caf) = single_person_fields(0.9, 0.9);
    let decoder = CifCafDecoder::new(config, two_joint_skeleton()).unwrap();
    decoder.decode(&[cif], &[caf]).unwrap()
}

#[test]
fn test_single_person_end_to_end() {
    let anns = decode_single(DecoderConfig::new().with_connection_method(ConnectionMethod::Max));
    assert_eq!(anns.len(), 1);
    let ann = &anns[0];

    // seed joint reconstructs the input confidence at the regressed point
    assert!((ann.data[0][0] - 12.0).abs() < 0.5);
    assert!((ann.data[0][1] - 8.0).abs() < 0.5);
    assert!((ann.data[0][2] - 0.9).abs() < 0.1);

    // connected joint: sqrt(rescored association * source confidence)
    assert!((ann.data[1][0] - 20.0).abs() < 0.5);
    assert!((ann.data[1][1] - 8.0).abs() < 0.5);
    assert!((ann.data[1][2] - 0.86).abs() < 0.1);

    // joint scales come through in source-image pixels
    assert!((ann.joint_scales[0] - 4.0).abs() < f32::EPSILON);
    assert!((ann.joint_scales[1] - 4.0).abs() < f32::EPSILON);

    assert_eq!(ann.decoding_order.len(), 1);
    assert_eq!(ann.decoding_order[0].source, 0);
    assert_eq!(ann.decoding_order[0].target, 1);
    assert!(ann.score() > 0.8);
}

#[test]
fn test_overlapping_seeds_make_one_instance() {
    // both joints seed above threshold, but the instance grown from the
    // stronger seed claims the second joint's region first
    let anns = decode_single(DecoderConfig::new().with_connection_method(ConnectionMethod::Max));
    assert_eq!(anns.len(), 1);
    assert_eq!(anns[0].num_placed(), 2);
}

#[test]
fn test_greedy_matches_exhaustive_on_simple_scene() {
    let exhaustive =
        decode_single(DecoderConfig::new().with_connection_method(ConnectionMethod::Max));
    let greedy = decode_single(
        DecoderConfig::new()
            .with_connection_method(ConnectionMethod::Max)
            .with_greedy(true),
    );
    assert_eq!(exhaustive.len(), greedy.len());
    for (a, b) in exhaustive.iter().zip(&greedy) {
        assert_eq!(a.data, b.data);
        assert_eq!(a.joint_scales, b.joint_scales);
    }
}

#[test]
fn test_decoding_is_deterministic() {
    let (cif, caf) = single_person_fields(0.9, 0.8);
    let decoder = CifCafDecoder::new(DecoderConfig::new(), two_joint_skeleton()).unwrap();

    let first = decoder
        .decode(std::slice::from_ref(&cif), std::slice::from_ref(&caf))
        .unwrap();
    let second = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.data, b.data);
        assert_eq!(a.joint_scales, b.joint_scales);
        assert_eq!(a.decoding_order, b.decoding_order);
    }
}

#[test]
fn test_two_people_two_instances() {
    let mut cif = Array4::zeros((2, 5, 16, 16));
    add_block(&mut cif, 0, 0, 0, 3.0, 2.0, 0.9);
    add_block(&mut cif, 1, 4, 0, 5.0, 2.0, 0.9);
    add_block(&mut cif, 0, 0, 8, 3.0, 10.0, 0.8);
    add_block(&mut cif, 1, 4, 8, 5.0, 10.0, 0.8);

    let mut caf = Array4::zeros((1, 9, 16, 16));
    add_caf_cell(&mut caf, 0, 0, 0, 0.9, 3.0, 2.0, 5.0, 2.0);
    add_caf_cell(&mut caf, 0, 8, 0, 0.9, 3.0, 10.0, 5.0, 10.0);

    let cif = CifField::new(cif, STRIDE).unwrap();
    let caf = CafField::new(caf, STRIDE).unwrap();

    let config = DecoderConfig::new().with_connection_method(ConnectionMethod::Max);
    let decoder = CifCafDecoder::new(config, two_joint_skeleton()).unwrap();
    let anns = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(anns.len(), 2);
    // stronger person first
    assert!(anns[0].score() > anns[1].score());
    assert!((anns[0].data[0][1] - 8.0).abs() < 0.5);
    assert!((anns[1].data[0][1] - 40.0).abs() < 0.5);
}

/// Chain scene with a missing third joint: joints 0 and 1 detected, edge 1
/// carries only sub-threshold association evidence of confidence `v_edge1`
/// (or none at all when zero).
fn chain_fields(v_edge1: f32) -> (CifField, CafField) {
    let mut cif = Array4::zeros((3, 5, 16, 16));
    add_block(&mut cif, 0, 0, 0, 3.0, 2.0, 0.9);
    add_block(&mut cif, 1, 4, 0, 5.0, 2.0, 0.9);

    let mut caf = Array4::zeros((2, 9, 16, 16));
    add_caf_cell(&mut caf, 0, 0, 0, 0.9, 3.0, 2.0, 5.0, 2.0);
    if v_edge1 > 0.0 {
        add_caf_cell(&mut caf, 1, 0, 4, v_edge1, 5.0, 2.0, 7.0, 2.0);
    }

    (
        CifField::new(cif, STRIDE).unwrap(),
        CafField::new(caf, STRIDE).unwrap(),
    )
}

#[test]
fn test_missing_joint_stays_empty_without_completion() {
    let (cif, caf) = chain_fields(0.005);
    let config = DecoderConfig::new().with_connection_method(ConnectionMethod::Max);
    let decoder = CifCafDecoder::new(config, chain_skeleton()).unwrap();
    let anns = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(anns.len(), 1);
    assert_eq!(anns[0].num_placed(), 2);
    assert_eq!(anns[0].data[2][2], 0.0);
}

#[test]
fn test_completion_fills_from_weak_association() {
    // association confidence 0.005 is below the decoding threshold but above
    // the completion threshold; the filled joint is capped at 0.001
    let (cif, caf) = chain_fields(0.005);
    let config = DecoderConfig::new()
        .with_connection_method(ConnectionMethod::Max)
        .with_force_complete(true);
    let decoder = CifCafDecoder::new(config, chain_skeleton()).unwrap();
    let anns = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(anns.len(), 1);
    let ann = &anns[0];
    assert_eq!(ann.num_placed(), 3);
    assert!((ann.data[2][0] - 28.0).abs() < 0.5);
    assert!((ann.data[2][1] - 8.0).abs() < 0.5);
    assert_eq!(ann.data[2][2], 0.001);
    // the joints decoded in the main pass keep their confidences
    assert!(ann.data[0][2] > 0.5);
    assert!(ann.data[1][2] > 0.5);
}

#[test]
fn test_completion_flood_fills_without_any_association() {
    let (cif, caf) = chain_fields(0.0);
    let config = DecoderConfig::new()
        .with_connection_method(ConnectionMethod::Max)
        .with_force_complete(true);
    let decoder = CifCafDecoder::new(config, chain_skeleton()).unwrap();
    let anns = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(anns.len(), 1);
    let ann = &anns[0];
    // flood fill copies the neighbor's coordinates and scale at nominal
    // confidence
    assert_eq!(ann.data[2][2], 0.00001);
    assert_eq!(ann.data[2][0], ann.data[1][0]);
    assert_eq!(ann.data[2][1], ann.data[1][1]);
    assert_eq!(ann.joint_scales[2], ann.joint_scales[1]);
}

#[test]
fn test_completion_leaves_isolated_joints_unplaced() {
    // joint 2 has no skeleton edge, so neither growth nor flood fill can
    // reach it; completion warns and leaves it at zero confidence
    let skeleton = Skeleton::new(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        vec![[0, 1]],
    )
    .unwrap();

    let mut cif = Array4::zeros((3, 5, 16, 16));
    add_block(&mut cif, 0, 0, 0, 3.0, 2.0, 0.9);
    add_block(&mut cif, 1, 4, 0, 5.0, 2.0, 0.9);
    let mut caf = Array4::zeros((1, 9, 16, 16));
    add_caf_cell(&mut caf, 0, 0, 0, 0.9, 3.0, 2.0, 5.0, 2.0);
    let cif = CifField::new(cif, STRIDE).unwrap();
    let caf = CafField::new(caf, STRIDE).unwrap();

    let config = DecoderConfig::new()
        .with_connection_method(ConnectionMethod::Max)
        .with_force_complete(true);
    let decoder = CifCafDecoder::new(config, skeleton).unwrap();
    let anns = decoder.decode(&[cif], &[caf]).unwrap();

    assert_eq!(anns.len(), 1);
    assert_eq!(anns[0].num_placed(), 2);
    assert_eq!(anns[0].data[2], [0.0; 3]);
}

#[test]
fn test_warning_macro_expands_in_dependent_crates() {
    // this test crate has no direct dependency on the color crate; the
    // macro must resolve entirely through the library
    fieldpose::set_verbose(false);
    fieldpose::warn!("synthetic warning from {} v{}", fieldpose::NAME, fieldpose::VERSION);
}

#[test]
fn test_instance_threshold_drops_weak_instances() {
    let (cif, caf) = single_person_fields(0.3, 0.3);
    let config = DecoderConfig::new()
        .with_connection_method(ConnectionMethod::Max)
        .with_instance_threshold(0.9);
    let decoder = CifCafDecoder::new(config, two_joint_skeleton()).unwrap();
    assert!(decoder.decode(&[cif], &[caf]).unwrap().is_empty());
}

#[test]
fn test_empty_fields_decode_to_nothing() {
    let cif = CifField::new(Array4::zeros((2, 5, 16, 16)), STRIDE).unwrap();
    let caf = CafField::new(Array4::zeros((1, 9, 16, 16)), STRIDE).unwrap();
    let decoder = CifCafDecoder::new(DecoderConfig::new(), two_joint_skeleton()).unwrap();
    assert!(decoder.decode(&[cif], &[caf]).unwrap().is_empty());
}

#[test]
fn test_mismatched_fields_are_rejected() {
    let cif = CifField::new(Array4::zeros((5, 5, 16, 16)), STRIDE).unwrap();
    let caf = CafField::new(Array4::zeros((1, 9, 16, 16)), STRIDE).unwrap();
    let decoder = CifCafDecoder::new(DecoderConfig::new(), two_joint_skeleton()).unwrap();
    assert!(decoder.decode(&[cif], &[caf]).is_err());
}
