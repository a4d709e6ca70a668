// FieldPose 🚀 AGPL-3.0 License

//! Field tensor wrappers.
//!
//! A decoder consumes two kinds of dense prediction fields, both at a fixed
//! stride relative to the source image:
//!
//! - **Intensity (CIF)** fields with shape `[joints, 5, h, w]` and channels
//!   `(confidence, x, y, spread, scale)` per joint type.
//! - **Association (CAF)** fields with shape `[edges, 9, h, w]` and channels
//!   `(confidence, x1, y1, spread1, scale1, x2, y2, spread2, scale2)` per
//!   skeleton edge, where `1` is the source end and `2` the target end.
//!
//! Coordinates and scales are in field cells; the decoder multiplies them by
//! the stride. Fields are read-only for the duration of a decode call.

use ndarray::Array4;

use crate::error::{DecodeError, Result};

/// Channel indices of an intensity field.
pub mod cif_channel {
    /// Cell confidence.
    pub const V: usize = 0;
    /// Regressed x offset.
    pub const X: usize = 1;
    /// Regressed y offset.
    pub const Y: usize = 2;
    /// Spread (log-b); unused by decoding, carried for completeness.
    pub const B: usize = 3;
    /// Joint scale estimate.
    pub const S: usize = 4;
}

/// Channel indices of an association field.
pub mod caf_channel {
    /// Edge confidence.
    pub const V: usize = 0;
    /// Source x.
    pub const X1: usize = 1;
    /// Source y.
    pub const Y1: usize = 2;
    /// Source spread (log-b).
    pub const B1: usize = 3;
    /// Source scale.
    pub const S1: usize = 4;
    /// Target x.
    pub const X2: usize = 5;
    /// Target y.
    pub const Y2: usize = 6;
    /// Target spread (log-b).
    pub const B2: usize = 7;
    /// Target scale.
    pub const S2: usize = 8;
}

/// An intensity field head output plus its decoding metadata.
#[derive(Debug, Clone)]
pub struct CifField {
    /// Field data, shape `[joints, 5, h, w]`.
    pub data: Array4<f32>,
    /// Field stride relative to the source image.
    pub stride: f32,
    /// Minimum joint scale (in source-image pixels) for a cell to be
    /// accumulated. Used by multi-scale setups to restrict coarse heads to
    /// large instances.
    pub min_scale: f32,
}

impl CifField {
    /// Wrap an intensity field tensor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FieldError`] if the channel dimension is not 5
    /// or the stride is not positive.
    pub fn new(data: Array4<f32>, stride: f32) -> Result<Self> {
        if data.shape()[1] != 5 {
            return Err(DecodeError::FieldError(format!(
                "intensity field needs 5 channels, got {}",
                data.shape()[1]
            )));
        }
        if !(stride > 0.0) {
            return Err(DecodeError::FieldError(format!(
                "field stride must be positive, got {stride}"
            )));
        }
        Ok(Self {
            data,
            stride,
            min_scale: 0.0,
        })
    }

    /// Set the minimum accumulated joint scale.
    #[must_use]
    pub fn with_min_scale(mut self, min_scale: f32) -> Self {
        self.min_scale = min_scale;
        self
    }

    /// Number of joint types in this field.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.data.shape()[0]
    }

    /// Field grid size `(h, w)`.
    #[must_use]
    pub fn grid(&self) -> (usize, usize) {
        (self.data.shape()[2], self.data.shape()[3])
    }
}

/// An association field head output plus its decoding metadata.
#[derive(Debug, Clone)]
pub struct CafField {
    /// Field data, shape `[edges, 9, h, w]`.
    pub data: Array4<f32>,
    /// Field stride relative to the source image.
    pub stride: f32,
    /// Minimum source-to-target distance (source-image pixels) for an entry
    /// to be scored; 0.0 disables the cutoff.
    pub min_distance: f32,
    /// Maximum source-to-target distance; `None` disables the cutoff.
    pub max_distance: Option<f32>,
}

impl CafField {
    /// Wrap an association field tensor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FieldError`] if the channel dimension is not 9
    /// or the stride is not positive.
    pub fn new(data: Array4<f32>, stride: f32) -> Result<Self> {
        if data.shape()[1] != 9 {
            return Err(DecodeError::FieldError(format!(
                "association field needs 9 channels, got {}",
                data.shape()[1]
            )));
        }
        if !(stride > 0.0) {
            return Err(DecodeError::FieldError(format!(
                "field stride must be positive, got {stride}"
            )));
        }
        Ok(Self {
            data,
            stride,
            min_distance: 0.0,
            max_distance: None,
        })
    }

    /// Restrict the source-to-target distances scored from this field.
    #[must_use]
    pub fn with_distance_limits(mut self, min_distance: f32, max_distance: Option<f32>) -> Self {
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    /// Number of skeleton edges in this field.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.data.shape()[0]
    }
}
