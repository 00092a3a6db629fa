//! Source configuration types
//!
//! This module defines how a reference image source is described: its scalar
//! type, geometry and the pattern used to fill it. The export bridge itself has
//! no configuration - everything here feeds [`crate::GeneratedImage`].

use crate::types::{Extent, ExportError, Result, ScalarType, Vector3, DIMENSIONS};
use serde::{Deserialize, Serialize};

/// Configuration for a generated image source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Per-element numeric type
    #[serde(default = "default_scalar_type")]
    pub scalar_type: ScalarType,

    /// Full logical extent `[xmin, xmax, ymin, ymax, zmin, zmax]`
    #[serde(default = "default_whole_extent")]
    pub whole_extent: Extent,

    /// Physical distance between samples along each axis
    #[serde(default = "default_spacing")]
    pub spacing: Vector3,

    /// Physical position of index (0, 0, 0)
    #[serde(default)]
    pub origin: Vector3,

    /// Components per point (e.g. 3 for RGB)
    #[serde(default = "default_components")]
    pub components: usize,

    /// How sample values are generated
    #[serde(default)]
    pub pattern: Pattern,
}

fn default_scalar_type() -> ScalarType {
    ScalarType::Float
}

fn default_whole_extent() -> Extent {
    Extent::new([0, 63, 0, 63, 0, 0])
}

fn default_spacing() -> Vector3 {
    [1.0; DIMENSIONS]
}

fn default_components() -> usize {
    1
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            scalar_type: default_scalar_type(),
            whole_extent: default_whole_extent(),
            spacing: default_spacing(),
            origin: [0.0; DIMENSIONS],
            components: default_components(),
            pattern: Pattern::default(),
        }
    }
}

impl SourceConfig {
    /// Create a new source configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the scalar type
    pub fn with_scalar_type(mut self, scalar_type: ScalarType) -> Self {
        self.scalar_type = scalar_type;
        self
    }

    /// Builder method: set the whole extent
    pub fn with_whole_extent(mut self, extent: Extent) -> Self {
        self.whole_extent = extent;
        self
    }

    /// Builder method: set the spacing
    pub fn with_spacing(mut self, spacing: Vector3) -> Self {
        self.spacing = spacing;
        self
    }

    /// Builder method: set the origin
    pub fn with_origin(mut self, origin: Vector3) -> Self {
        self.origin = origin;
        self
    }

    /// Builder method: set the number of components
    pub fn with_components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    /// Builder method: set the fill pattern
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Check the configuration describes a realizable image
    pub fn validate(&self) -> Result<()> {
        if self.components == 0 {
            return Err(ExportError::InvalidConfig(
                "components must be at least 1".to_string(),
            ));
        }
        if self.whole_extent.is_empty() {
            return Err(ExportError::InvalidConfig(format!(
                "whole extent {} is empty",
                self.whole_extent
            )));
        }
        if self.spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ExportError::InvalidConfig(format!(
                "spacing must be positive and finite, got {:?}",
                self.spacing
            )));
        }
        if let Pattern::Checkerboard { square, .. } = self.pattern {
            if square == 0 {
                return Err(ExportError::InvalidConfig(
                    "checkerboard square size must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Sample generator for a [`crate::GeneratedImage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    /// Every sample has the same value
    Constant { value: f64 },

    /// `scale * (x + y + z) + component`
    Ramp {
        #[serde(default = "default_scale")]
        scale: f64,
    },

    /// Alternating cubes of `square` samples per side
    Checkerboard {
        #[serde(default = "default_square")]
        square: u32,
        #[serde(default)]
        low: f64,
        #[serde(default = "default_high")]
        high: f64,
    },
}

fn default_scale() -> f64 {
    1.0
}

fn default_square() -> u32 {
    8
}

fn default_high() -> f64 {
    255.0
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::Ramp {
            scale: default_scale(),
        }
    }
}

impl Pattern {
    /// Value of `component` at `index`
    pub fn sample(&self, index: [i32; DIMENSIONS], component: usize) -> f64 {
        match *self {
            Pattern::Constant { value } => value,
            Pattern::Ramp { scale } => {
                let sum: i64 = index.iter().map(|&i| i64::from(i)).sum();
                scale * sum as f64 + component as f64
            }
            Pattern::Checkerboard { square, low, high } => {
                let square = i64::from(square.max(1));
                let parity: i64 = index
                    .iter()
                    .map(|&i| i64::from(i).div_euclid(square))
                    .sum();
                if parity.rem_euclid(2) == 0 {
                    high
                } else {
                    low
                }
            }
        }
    }
}
