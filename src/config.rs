// FieldPose 🚀 AGPL-3.0 License

//! Decoder configuration and policy types.
//!
//! This module defines the [`DecoderConfig`] struct, which controls the numeric
//! thresholds and decoding policies of the field-to-instance decoder, and the
//! [`ConnectionMethod`] used to resolve association candidates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

/// Strategy for resolving an association window to a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMethod {
    /// Take the single highest-scoring entry verbatim. Faster.
    Max,
    /// Blend the top two entries with a confidence-weighted average,
    /// falling back to the top entry at half confidence when the second
    /// is weak or spatially inconsistent.
    Blend,
}

impl ConnectionMethod {
    /// Returns the string representation used in configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Blend => "blend",
        }
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionMethod {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "blend" => Ok(Self::Blend),
            _ => Err(DecodeError::ConfigError(format!(
                "unknown connection method: {s}"
            ))),
        }
    }
}

/// Configuration for the field-to-instance decoder.
///
/// This struct is used to customize the behavior of the decoding engine.
/// It uses a builder pattern for convenient construction. All thresholds are
/// fixed at decoder construction time; nothing is mutated per call.
///
/// # Example
///
/// ```rust
/// use fieldpose::{ConnectionMethod, DecoderConfig};
///
/// let config = DecoderConfig::new()
///     .with_seed_threshold(0.5)
///     .with_connection_method(ConnectionMethod::Blend)
///     .with_force_complete(true);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Minimum accumulated confidence for a seed candidate (0.0 to 1.0).
    pub seed_threshold: f32,
    /// Minimum intensity-field confidence for a cell to contribute to the
    /// accumulated hi-res surface (0.0 to 1.0).
    pub cif_threshold: f32,
    /// Minimum association-field confidence for an entry to enter the
    /// directed scoring tables (0.0 to 1.0).
    pub caf_threshold: f32,
    /// Minimum combined keypoint confidence for a connection to be accepted.
    /// When `None`, resolved at construction: 0.0 if `force_complete` is set,
    /// 0.001 otherwise.
    pub keypoint_threshold: Option<f32>,
    /// Minimum overall instance score; weaker instances are filtered out.
    pub instance_threshold: f32,
    /// How association windows resolve to a single target.
    pub connection_method: ConnectionMethod,
    /// Accept the first resolved frontier candidate without re-queuing it
    /// against unresolved upper bounds. Faster, may accept a suboptimal edge.
    pub greedy: bool,
    /// Re-grow instances with relaxed one-way matching and flood-fill any
    /// joints still unreachable afterwards.
    pub force_complete: bool,
    /// Enable auxiliary lower-weight skeleton edges.
    pub dense_connections: bool,
    /// Confidence multiplier for auxiliary edges (only meaningful with
    /// `dense_connections`).
    pub dense_coupling: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            seed_threshold: 0.2,
            cif_threshold: 0.1,
            caf_threshold: 0.2,
            keypoint_threshold: None,
            instance_threshold: 0.0,
            connection_method: ConnectionMethod::Blend,
            greedy: false,
            force_complete: false,
            dense_connections: false,
            dense_coupling: 0.01,
        }
    }
}

impl DecoderConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seed threshold.
    #[must_use]
    pub const fn with_seed_threshold(mut self, threshold: f32) -> Self {
        self.seed_threshold = threshold;
        self
    }

    /// Set the intensity-field accumulation threshold.
    #[must_use]
    pub const fn with_cif_threshold(mut self, threshold: f32) -> Self {
        self.cif_threshold = threshold;
        self
    }

    /// Set the association-field entry threshold.
    #[must_use]
    pub const fn with_caf_threshold(mut self, threshold: f32) -> Self {
        self.caf_threshold = threshold;
        self
    }

    /// Set the keypoint threshold explicitly.
    #[must_use]
    pub const fn with_keypoint_threshold(mut self, threshold: f32) -> Self {
        self.keypoint_threshold = Some(threshold);
        self
    }

    /// Set the instance score threshold.
    #[must_use]
    pub const fn with_instance_threshold(mut self, threshold: f32) -> Self {
        self.instance_threshold = threshold;
        self
    }

    /// Set the connection method.
    #[must_use]
    pub const fn with_connection_method(mut self, method: ConnectionMethod) -> Self {
        self.connection_method = method;
        self
    }

    /// Enable or disable greedy frontier acceptance.
    #[must_use]
    pub const fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    /// Enable or disable the completion pass.
    #[must_use]
    pub const fn with_force_complete(mut self, force_complete: bool) -> Self {
        self.force_complete = force_complete;
        self
    }

    /// Enable auxiliary dense skeleton edges with the given coupling factor.
    #[must_use]
    pub const fn with_dense_connections(mut self, coupling: f32) -> Self {
        self.dense_connections = true;
        self.dense_coupling = coupling;
        self
    }

    /// The keypoint threshold actually applied by the decoder.
    ///
    /// A forced-complete decoder must not filter keypoints, otherwise the
    /// completion pass could never fill weak joints.
    #[must_use]
    pub fn resolved_keypoint_threshold(&self) -> f32 {
        match self.keypoint_threshold {
            Some(t) => t,
            None if self.force_complete => 0.0,
            None => 0.001,
        }
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ConfigError`] if a threshold is out of range,
    /// if the seed threshold is below the keypoint threshold, or if
    /// `force_complete` is combined with a nonzero keypoint threshold.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("seed_threshold", self.seed_threshold),
            ("cif_threshold", self.cif_threshold),
            ("caf_threshold", self.caf_threshold),
            ("instance_threshold", self.instance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DecodeError::ConfigError(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }

        let keypoint_threshold = self.resolved_keypoint_threshold();
        if !(0.0..=1.0).contains(&keypoint_threshold) {
            return Err(DecodeError::ConfigError(format!(
                "keypoint_threshold must be in [0, 1], got {keypoint_threshold}"
            )));
        }
        if self.force_complete && keypoint_threshold != 0.0 {
            return Err(DecodeError::ConfigError(
                "force_complete requires a keypoint_threshold of 0.0".to_string(),
            ));
        }
        if self.seed_threshold < keypoint_threshold {
            return Err(DecodeError::ConfigError(format!(
                "seed_threshold ({}) must be >= keypoint_threshold ({})",
                self.seed_threshold, keypoint_threshold
            )));
        }
        if self.dense_connections && !(self.dense_coupling > 0.0) {
            return Err(DecodeError::ConfigError(format!(
                "dense_coupling must be positive, got {}",
                self.dense_coupling
            )));
        }

        Ok(())
    }
}
