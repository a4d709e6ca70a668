// FieldPose 🚀 AGPL-3.0 License

//! FieldPose: composite-field pose decoding in Rust.
//!
//! FieldPose turns the dense field tensors of a bottom-up pose estimation
//! network into discrete pose instances. It consumes intensity fields (one
//! confidence/regression map per joint type) and association fields (one
//! directed map per skeleton edge) and produces scored keypoint sets, with
//! no dependency on any particular inference runtime.
//!
//! The pipeline:
//!
//! 1. [`CifHr`] fuses all intensity fields into a high-resolution
//!    accumulator at full image resolution.
//! 2. [`CifSeeds`] selects local maxima of the accumulator as candidate
//!    starting joints, strongest first.
//! 3. [`CafScored`] reindexes the association fields into per-edge directed
//!    tables, rescored against the accumulator.
//! 4. [`CifCafDecoder`] grows one instance per surviving seed with a greedy
//!    best-first traversal of the skeleton graph, claiming an [`Occupancy`]
//!    grid so later seeds cannot restart inside a decoded instance.
//! 5. [`KeypointNms`] suppresses duplicate instances keypoint by keypoint.
//!
//! # Example
//!
//! ```no_run
//! use fieldpose::{CifCafDecoder, CifField, CafField, DecoderConfig, Skeleton};
//! use ndarray::Array4;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DecoderConfig::new().with_force_complete(true);
//!     let decoder = CifCafDecoder::new(config, Skeleton::coco_person())?;
//!
//!     // field tensors as produced by the network, [J, 5, H, W] and [E, 9, H, W]
//!     let cif = CifField::new(Array4::zeros((17, 5, 48, 64)), 8.0)?;
//!     let caf = CafField::new(Array4::zeros((19, 9, 48, 64)), 8.0)?;
//!
//!     for ann in decoder.decode(&[cif], &[caf])? {
//!         println!("score {:.2}, {} keypoints", ann.score(), ann.num_placed());
//!     }
//!     Ok(())
//! }
//! ```

pub mod annotation;
pub mod caf_scored;
pub mod cifhr;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fields;
pub mod logging;
pub mod nms;
pub mod occupancy;
pub mod seeds;
pub mod skeleton;

pub use annotation::{Annotation, DecodedEdge};
pub use caf_scored::{CafEntry, CafScored};
pub use cifhr::CifHr;
pub use config::{ConnectionMethod, DecoderConfig};
pub use decoder::CifCafDecoder;
pub use error::{DecodeError, Result};
pub use fields::{caf_channel, cif_channel, CafField, CifField};
pub use logging::{is_verbose, set_verbose};
pub use nms::KeypointNms;
pub use occupancy::Occupancy;
pub use seeds::{CifSeeds, Seed};
pub use skeleton::{
    Neighbor, Skeleton, COCO_KEYPOINTS, COCO_PERSON_SKELETON, DENSE_COCO_PERSON_CONNECTIONS,
};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name from Cargo.toml.
pub const NAME: &str = env!("CARGO_PKG_NAME");
