//! Core types for the image export bridge
//!
//! This module defines the geometry, scalar-type and error types shared by the
//! bridge, the callback table and the importer. The layouts of `Extent` and
//! `Vector3` are exactly what the callback table hands across the C boundary.

use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Number of axes exported through the callback table.
///
/// Lower-dimensional images are exported with `min == max == 0` on unused axes.
pub const DIMENSIONS: usize = 3;

/// Physical geometry vector (spacing or origin), one entry per axis
pub type Vector3 = [f64; DIMENSIONS];

/// An index-space bounding box in interleaved order
/// `[xmin, xmax, ymin, ymax, zmin, zmax]`.
///
/// Bounds are inclusive. Any axis with `max < min` makes the extent empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extent([i32; 2 * DIMENSIONS]);

impl Extent {
    /// Create an extent from interleaved bounds
    pub const fn new(bounds: [i32; 2 * DIMENSIONS]) -> Self {
        Self(bounds)
    }

    /// The canonical empty extent
    pub const fn empty() -> Self {
        Self([0, -1, 0, -1, 0, -1])
    }

    /// Extent starting at the origin index with the given size per axis
    pub fn from_dimensions(dims: [usize; DIMENSIONS]) -> Self {
        let mut bounds = [0i32; 2 * DIMENSIONS];
        for (axis, &size) in dims.iter().enumerate() {
            bounds[2 * axis + 1] = i32::try_from(size).unwrap_or(i32::MAX) - 1;
        }
        Self(bounds)
    }

    /// Build an extent from a slice of exactly six bounds
    pub fn from_slice(bounds: &[i32]) -> Option<Self> {
        let bounds: [i32; 2 * DIMENSIONS] = bounds.try_into().ok()?;
        Some(Self(bounds))
    }

    /// Lower bound along `axis`
    pub fn min(&self, axis: usize) -> i32 {
        self.0[2 * axis]
    }

    /// Upper bound (inclusive) along `axis`
    pub fn max(&self, axis: usize) -> i32 {
        self.0[2 * axis + 1]
    }

    /// The raw interleaved bounds
    pub fn as_array(&self) -> [i32; 2 * DIMENSIONS] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        (0..DIMENSIONS).any(|axis| self.max(axis) < self.min(axis))
    }

    /// Number of indices along each axis (all zero for an empty extent)
    pub fn dimensions(&self) -> [usize; DIMENSIONS] {
        if self.is_empty() {
            return [0; DIMENSIONS];
        }
        let mut dims = [0usize; DIMENSIONS];
        for (axis, dim) in dims.iter_mut().enumerate() {
            *dim = (i64::from(self.max(axis)) - i64::from(self.min(axis)) + 1) as usize;
        }
        dims
    }

    /// Total number of points covered by this extent, saturating at `usize::MAX`
    pub fn number_of_points(&self) -> usize {
        self.checked_number_of_points().unwrap_or(usize::MAX)
    }

    /// Total number of points, or `None` if it does not fit in `usize`
    pub fn checked_number_of_points(&self) -> Option<usize> {
        self.dimensions()
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// True if every index of `other` lies inside `self`.
    ///
    /// An empty `other` is contained in anything.
    pub fn contains(&self, other: &Extent) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..DIMENSIONS).all(|axis| {
            self.min(axis) <= other.min(axis) && other.max(axis) <= self.max(axis)
        })
    }

    /// Overlap of two extents, or `None` if they do not intersect
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let mut bounds = [0i32; 2 * DIMENSIONS];
        for axis in 0..DIMENSIONS {
            bounds[2 * axis] = self.min(axis).max(other.min(axis));
            bounds[2 * axis + 1] = self.max(axis).min(other.max(axis));
        }
        let overlap = Extent(bounds);
        if overlap.is_empty() {
            None
        } else {
            Some(overlap)
        }
    }

    /// Index of the `linear`-th point, x varying fastest
    pub fn index_at(&self, linear: usize) -> [i32; DIMENSIONS] {
        let dims = self.dimensions();
        let mut rest = linear;
        let mut index = [0i32; DIMENSIONS];
        for axis in 0..DIMENSIONS {
            let dim = dims[axis].max(1);
            index[axis] = self.min(axis) + (rest % dim) as i32;
            rest /= dim;
        }
        index
    }

    /// Linear offset of `index` within this extent, x varying fastest
    pub fn offset_of(&self, index: [i32; DIMENSIONS]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let dims = self.dimensions();
        let mut offset = 0usize;
        let mut stride = 1usize;
        for axis in 0..DIMENSIONS {
            if index[axis] < self.min(axis) || index[axis] > self.max(axis) {
                return None;
            }
            let step = (i64::from(index[axis]) - i64::from(self.min(axis))) as usize;
            offset = step.checked_mul(stride)?.checked_add(offset)?;
            if axis + 1 < DIMENSIONS {
                stride = stride.checked_mul(dims[axis])?;
            }
        }
        Some(offset)
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x0, x1, y0, y1, z0, z1] = self.0;
        write!(f, "[{}..{}, {}..{}, {}..{}]", x0, x1, y0, y1, z0, z1)
    }
}

impl FromStr for Extent {
    type Err = ExportError;

    /// Parse six comma-separated bounds, e.g. `0,63,0,63,0,0`
    fn from_str(s: &str) -> Result<Self> {
        let bounds = s
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExportError::InvalidExtent(format!("{}: {}", s, e)))?;

        Extent::from_slice(&bounds).ok_or_else(|| {
            ExportError::InvalidExtent(format!("expected 6 bounds, got {}: {}", bounds.len(), s))
        })
    }
}

/// Per-element numeric type of the exported buffer
///
/// The set is closed; the names returned by [`ScalarType::name`] are the
/// identifiers handed to the foreign consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    UnsignedChar,
    Char,
    UnsignedShort,
    Short,
    UnsignedInt,
    Int,
    /// 64-bit unsigned (LP64 `unsigned long`)
    UnsignedLong,
    /// 64-bit signed (LP64 `long`)
    Long,
    Float,
    Double,
}

impl ScalarType {
    /// Every supported scalar type
    pub const ALL: [ScalarType; 10] = [
        ScalarType::UnsignedChar,
        ScalarType::Char,
        ScalarType::UnsignedShort,
        ScalarType::Short,
        ScalarType::UnsignedInt,
        ScalarType::Int,
        ScalarType::UnsignedLong,
        ScalarType::Long,
        ScalarType::Float,
        ScalarType::Double,
    ];

    /// The identifier exported across the callback table
    pub fn as_c_str(&self) -> &'static CStr {
        match self {
            ScalarType::UnsignedChar => c"unsigned char",
            ScalarType::Char => c"char",
            ScalarType::UnsignedShort => c"unsigned short",
            ScalarType::Short => c"short",
            ScalarType::UnsignedInt => c"unsigned int",
            ScalarType::Int => c"int",
            ScalarType::UnsignedLong => c"unsigned long",
            ScalarType::Long => c"long",
            ScalarType::Float => c"float",
            ScalarType::Double => c"double",
        }
    }

    pub fn name(&self) -> &'static str {
        // All identifiers are ASCII literals.
        self.as_c_str().to_str().unwrap_or_default()
    }

    /// Look up a scalar type by exported name (`"unsigned char"`) or
    /// config name (`"unsigned_char"`)
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().replace('_', " ");
        Self::ALL.into_iter().find(|t| t.name() == normalized)
    }

    /// Size of one scalar in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ScalarType::UnsignedChar | ScalarType::Char => 1,
            ScalarType::UnsignedShort | ScalarType::Short => 2,
            ScalarType::UnsignedInt | ScalarType::Int | ScalarType::Float => 4,
            ScalarType::UnsignedLong | ScalarType::Long | ScalarType::Double => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarType {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        ScalarType::from_name(s).ok_or_else(|| ExportError::UnknownScalarType(s.to_string()))
    }
}

/// Errors that can occur while exporting
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExportError {
    #[error("Export bridge has no input data object")]
    NoInput,

    #[error("Input data object is already borrowed (re-entrant pipeline access)")]
    InputBusy,

    #[error("Requested extent {requested} is not inside the whole extent {whole}")]
    InvalidRequestedExtent { requested: Extent, whole: Extent },

    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Unknown scalar type: {0}")]
    UnknownScalarType(String),

    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("Callback '{0}' returned a null pointer")]
    NullPointer(&'static str),

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Pipeline update failed: {0}")]
    Pipeline(String),

    #[error("Callback panicked: {0}")]
    CallbackPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_geometry() {
        let extent = Extent::new([0, 9, 0, 4, 0, 0]);
        assert_eq!(extent.dimensions(), [10, 5, 1]);
        assert_eq!(extent.number_of_points(), 50);
        assert!(!extent.is_empty());

        assert!(Extent::empty().is_empty());
        assert_eq!(Extent::empty().number_of_points(), 0);
        assert_eq!(Extent::from_dimensions([4, 3, 1]), Extent::new([0, 3, 0, 2, 0, 0]));
    }

    #[test]
    fn test_extent_containment_and_intersection() {
        let whole = Extent::new([0, 63, 0, 63, 0, 9]);
        let inner = Extent::new([10, 20, 5, 5, 0, 9]);
        let outside = Extent::new([60, 70, 0, 0, 0, 0]);

        assert!(whole.contains(&inner));
        assert!(!inner.contains(&whole));
        assert!(!whole.contains(&outside));
        assert!(whole.contains(&Extent::empty()));
        assert!(!Extent::empty().contains(&inner));

        assert_eq!(
            whole.intersection(&outside),
            Some(Extent::new([60, 63, 0, 0, 0, 0]))
        );
        assert_eq!(inner.intersection(&Extent::new([30, 40, 0, 0, 0, 0])), None);
    }

    #[test]
    fn test_extent_indexing() {
        let extent = Extent::new([2, 4, 10, 11, -1, -1]);
        assert_eq!(extent.index_at(0), [2, 10, -1]);
        assert_eq!(extent.index_at(2), [4, 10, -1]);
        assert_eq!(extent.index_at(3), [2, 11, -1]);
        assert_eq!(extent.offset_of([4, 11, -1]), Some(5));
        assert_eq!(extent.offset_of([5, 11, -1]), None);

        for linear in 0..extent.number_of_points() {
            assert_eq!(extent.offset_of(extent.index_at(linear)), Some(linear));
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_extreme_extents_do_not_overflow() {
        let huge = Extent::new([i32::MIN, i32::MAX, i32::MIN, i32::MAX, i32::MIN, i32::MAX]);
        assert_eq!(huge.dimensions()[0], 1usize << 32);
        assert_eq!(huge.checked_number_of_points(), None);
        assert_eq!(huge.number_of_points(), usize::MAX);

        let wide = Extent::new([i32::MIN, i32::MAX, 0, 0, 0, 0]);
        assert_eq!(wide.offset_of([i32::MAX, 0, 0]), Some(u32::MAX as usize));
        assert_eq!(wide.offset_of([i32::MIN, 0, 0]), Some(0));
    }

    #[test]
    fn test_extent_parsing() {
        let extent: Extent = "0, 63, 0,63,0,0".parse().unwrap();
        assert_eq!(extent, Extent::new([0, 63, 0, 63, 0, 0]));
        assert!("0,1,2".parse::<Extent>().is_err());
        assert!("0,a,0,1,0,1".parse::<Extent>().is_err());
    }

    #[test]
    fn test_scalar_type_names() {
        assert_eq!(ScalarType::UnsignedChar.name(), "unsigned char");
        assert_eq!(ScalarType::Double.as_c_str().to_bytes(), b"double");
        assert_eq!(ScalarType::from_name("unsigned_short"), Some(ScalarType::UnsignedShort));
        assert_eq!(ScalarType::from_name("float"), Some(ScalarType::Float));
        assert_eq!(ScalarType::from_name("complex"), None);
        assert!("half".parse::<ScalarType>().is_err());

        for scalar_type in ScalarType::ALL {
            assert_eq!(ScalarType::from_name(scalar_type.name()), Some(scalar_type));
        }
    }

    #[test]
    fn test_scalar_type_sizes() {
        assert_eq!(ScalarType::Char.size_in_bytes(), 1);
        assert_eq!(ScalarType::Short.size_in_bytes(), 2);
        assert_eq!(ScalarType::Float.size_in_bytes(), 4);
        assert_eq!(ScalarType::Long.size_in_bytes(), 8);
    }
}
