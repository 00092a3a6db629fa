//! Typed scalar storage
//!
//! Realized image data is kept in a typed, properly aligned vector and only
//! viewed as raw bytes at the export boundary. This keeps the zero-copy
//! pointer handed to the consumer aligned for its scalar type.

use crate::types::{ExportError, Result, ScalarType};
use num_traits::{Bounded, NumCast, ToPrimitive};

/// A contiguous buffer of scalars of one [`ScalarType`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarBuffer {
    UnsignedChar(Vec<u8>),
    Char(Vec<i8>),
    UnsignedShort(Vec<u16>),
    Short(Vec<i16>),
    UnsignedInt(Vec<u32>),
    Int(Vec<i32>),
    UnsignedLong(Vec<u64>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// Apply the same expression to whichever vector the buffer holds
macro_rules! with_scalars {
    ($buffer:expr, $values:ident => $body:expr) => {
        match $buffer {
            ScalarBuffer::UnsignedChar($values) => $body,
            ScalarBuffer::Char($values) => $body,
            ScalarBuffer::UnsignedShort($values) => $body,
            ScalarBuffer::Short($values) => $body,
            ScalarBuffer::UnsignedInt($values) => $body,
            ScalarBuffer::Int($values) => $body,
            ScalarBuffer::UnsignedLong($values) => $body,
            ScalarBuffer::Long($values) => $body,
            ScalarBuffer::Float($values) => $body,
            ScalarBuffer::Double($values) => $body,
        }
    };
}

/// Build the buffer variant for `scalar_type` from a generic constructor
macro_rules! build_scalars {
    ($scalar_type:expr, $make:ident ( $($arg:expr),* )) => {
        match $scalar_type {
            ScalarType::UnsignedChar => ScalarBuffer::UnsignedChar($make($($arg),*)),
            ScalarType::Char => ScalarBuffer::Char($make($($arg),*)),
            ScalarType::UnsignedShort => ScalarBuffer::UnsignedShort($make($($arg),*)),
            ScalarType::Short => ScalarBuffer::Short($make($($arg),*)),
            ScalarType::UnsignedInt => ScalarBuffer::UnsignedInt($make($($arg),*)),
            ScalarType::Int => ScalarBuffer::Int($make($($arg),*)),
            ScalarType::UnsignedLong => ScalarBuffer::UnsignedLong($make($($arg),*)),
            ScalarType::Long => ScalarBuffer::Long($make($($arg),*)),
            ScalarType::Float => ScalarBuffer::Float($make($($arg),*)),
            ScalarType::Double => ScalarBuffer::Double($make($($arg),*)),
        }
    };
}

impl ScalarBuffer {
    /// An empty buffer of the given type
    pub fn empty(scalar_type: ScalarType) -> Self {
        Self::from_fn(scalar_type, 0, |_| 0.0)
    }

    /// Fill `len` scalars from `f`, casting each value with saturation
    /// (NaN becomes zero)
    pub fn from_fn(scalar_type: ScalarType, len: usize, mut f: impl FnMut(usize) -> f64) -> Self {
        fn fill<T: NumCast + Bounded + Default>(len: usize, f: &mut dyn FnMut(usize) -> f64) -> Vec<T> {
            (0..len).map(|i| saturating_cast(f(i))).collect()
        }

        build_scalars!(scalar_type, fill(len, &mut f))
    }

    /// Copy scalars out of an unaligned native-endian byte slice
    pub fn from_bytes(scalar_type: ScalarType, bytes: &[u8]) -> Result<Self> {
        fn decode<T: bytemuck::Pod>(bytes: &[u8], size: usize) -> Vec<T> {
            bytes
                .chunks_exact(size)
                .map(bytemuck::pod_read_unaligned::<T>)
                .collect()
        }

        let size = scalar_type.size_in_bytes();
        if bytes.len() % size != 0 {
            return Err(ExportError::BufferSizeMismatch {
                expected: bytes.len() - bytes.len() % size,
                actual: bytes.len(),
            });
        }
        Ok(build_scalars!(scalar_type, decode(bytes, size)))
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarBuffer::UnsignedChar(_) => ScalarType::UnsignedChar,
            ScalarBuffer::Char(_) => ScalarType::Char,
            ScalarBuffer::UnsignedShort(_) => ScalarType::UnsignedShort,
            ScalarBuffer::Short(_) => ScalarType::Short,
            ScalarBuffer::UnsignedInt(_) => ScalarType::UnsignedInt,
            ScalarBuffer::Int(_) => ScalarType::Int,
            ScalarBuffer::UnsignedLong(_) => ScalarType::UnsignedLong,
            ScalarBuffer::Long(_) => ScalarType::Long,
            ScalarBuffer::Float(_) => ScalarType::Float,
            ScalarBuffer::Double(_) => ScalarType::Double,
        }
    }

    /// Number of scalars (not bytes)
    pub fn len(&self) -> usize {
        with_scalars!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-copy byte view of the scalars
    pub fn as_bytes(&self) -> &[u8] {
        with_scalars!(self, values => bytemuck::cast_slice(values.as_slice()))
    }

    /// Scalar at `index` widened to f64
    pub fn get(&self, index: usize) -> Option<f64> {
        with_scalars!(self, values => values.get(index).and_then(|v| v.to_f64()))
    }

    /// Smallest and largest scalar, or `None` for an empty buffer
    pub fn range(&self) -> Option<(f64, f64)> {
        (0..self.len())
            .filter_map(|i| self.get(i))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Cast `value` into `T`, clamping to the representable range
fn saturating_cast<T: NumCast + Bounded + Default>(value: f64) -> T {
    if value.is_nan() {
        return T::default();
    }
    T::from(value).unwrap_or_else(|| {
        if value > 0.0 {
            T::max_value()
        } else {
            T::min_value()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_saturates() {
        let buffer = ScalarBuffer::from_fn(ScalarType::UnsignedChar, 4, |i| match i {
            0 => -5.0,
            1 => 12.7,
            2 => 300.0,
            _ => f64::NAN,
        });
        assert_eq!(buffer, ScalarBuffer::UnsignedChar(vec![0, 12, 255, 0]));

        let signed = ScalarBuffer::from_fn(ScalarType::Short, 2, |i| if i == 0 { -1e9 } else { 1e9 });
        assert_eq!(signed, ScalarBuffer::Short(vec![i16::MIN, i16::MAX]));
    }

    #[test]
    fn test_byte_view_matches_scalar_size() {
        for scalar_type in ScalarType::ALL {
            let buffer = ScalarBuffer::from_fn(scalar_type, 7, |i| i as f64);
            assert_eq!(buffer.scalar_type(), scalar_type);
            assert_eq!(buffer.len(), 7);
            assert_eq!(buffer.as_bytes().len(), 7 * scalar_type.size_in_bytes());
        }
    }

    #[test]
    fn test_from_bytes_copies_values() {
        let original = ScalarBuffer::from_fn(ScalarType::Float, 5, |i| i as f64 * 0.5);
        let copy = ScalarBuffer::from_bytes(ScalarType::Float, original.as_bytes()).unwrap();
        assert_eq!(copy, original);
        assert_eq!(copy.get(3), Some(1.5));

        let truncated = &original.as_bytes()[..6];
        assert!(matches!(
            ScalarBuffer::from_bytes(ScalarType::Float, truncated),
            Err(ExportError::BufferSizeMismatch { expected: 4, actual: 6 })
        ));
    }

    #[test]
    fn test_range() {
        let buffer = ScalarBuffer::from_fn(ScalarType::Int, 4, |i| [3.0, -2.0, 9.0, 0.0][i]);
        assert_eq!(buffer.range(), Some((-2.0, 9.0)));
        assert_eq!(ScalarBuffer::empty(ScalarType::Double).range(), None);
    }
}
