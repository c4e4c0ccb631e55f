//! Element type registry.
//!
//! [`ElementType`] is the closed set of element kinds a buffer can carry. Each
//! kind has a fixed size and a stable `i32` tag that crosses the transport
//! boundary. The sealed [`MpiDatatype`] trait maps Rust element types onto it.
//!
//! # Supported Types
//!
//! | Rust Type      | Element type  | Tag |
//! |----------------|---------------|-----|
//! | `u8`           | `Byte`        | 0   |
//! | `i8`           | `Int8`        | 1   |
//! | `i16`          | `Int16`       | 2   |
//! | `i32`          | `Int32`       | 3   |
//! | `i64`          | `Int64`       | 4   |
//! | (none)         | `UInt8`       | 5   |
//! | `u16`          | `UInt16`      | 6   |
//! | `u32`          | `UInt32`      | 7   |
//! | `u64`          | `UInt64`      | 8   |
//! | `f32`          | `Float32`     | 9   |
//! | `f64`          | `Float64`     | 10  |
//! | `Complex<f32>` | `Complex64`   | 11  |
//! | `Complex<f64>` | `Complex128`  | 12  |
//!
//! `u8` slices are raw byte sequences. `UInt8` is reachable through
//! [`NumArray`](crate::NumArray) arrays that declare an unsigned 8-bit type code.

use num_complex::Complex;

/// Internal module to seal the trait against external implementations.
mod sealed {
    pub trait Sealed {}
}

/// Semantic element kinds a buffer can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ElementType {
    /// Untyped byte
    Byte = 0,
    /// 8-bit signed integer
    Int8 = 1,
    /// 16-bit signed integer
    Int16 = 2,
    /// 32-bit signed integer
    Int32 = 3,
    /// 64-bit signed integer
    Int64 = 4,
    /// 8-bit unsigned integer
    UInt8 = 5,
    /// 16-bit unsigned integer
    UInt16 = 6,
    /// 32-bit unsigned integer
    UInt32 = 7,
    /// 64-bit unsigned integer
    UInt64 = 8,
    /// 32-bit floating point
    Float32 = 9,
    /// 64-bit floating point
    Float64 = 10,
    /// Complex number of two 32-bit floats
    Complex64 = 11,
    /// Complex number of two 64-bit floats
    Complex128 = 12,
}

impl ElementType {
    /// Every element type, in tag order.
    pub const ALL: [ElementType; 13] = [
        ElementType::Byte,
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Complex64,
        ElementType::Complex128,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Byte | ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64
            | ElementType::UInt64
            | ElementType::Float64
            | ElementType::Complex64 => 8,
            ElementType::Complex128 => 16,
        }
    }

    /// Tag passed to the transport.
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Look up the element type for a transport tag.
    pub fn from_tag(tag: i32) -> Option<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether the type is a signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::Int16
                | ElementType::Int32
                | ElementType::Int64
                | ElementType::UInt8
                | ElementType::UInt16
                | ElementType::UInt32
                | ElementType::UInt64
        )
    }

    /// Whether the type is a real floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    /// Whether the type is a complex type.
    pub fn is_complex(self) -> bool {
        matches!(self, ElementType::Complex64 | ElementType::Complex128)
    }
}

/// Trait for types that can be used in MPI communication operations.
///
/// This is a **sealed trait**: it cannot be implemented outside this crate.
///
/// # Example
///
/// ```
/// use mpi_bridge::{ElementType, MpiDatatype};
///
/// assert_eq!(f64::ELEMENT, ElementType::Float64);
/// assert_eq!(u8::ELEMENT, ElementType::Byte);
/// ```
pub trait MpiDatatype: sealed::Sealed + Copy + Send + 'static {
    /// The element type this Rust type maps to.
    const ELEMENT: ElementType;
}

macro_rules! impl_mpi_datatype {
    ($ty:ty, $element:expr) => {
        impl sealed::Sealed for $ty {}
        impl MpiDatatype for $ty {
            const ELEMENT: ElementType = $element;
        }
    };
}

impl_mpi_datatype!(u8, ElementType::Byte);
impl_mpi_datatype!(i8, ElementType::Int8);
impl_mpi_datatype!(i16, ElementType::Int16);
impl_mpi_datatype!(i32, ElementType::Int32);
impl_mpi_datatype!(i64, ElementType::Int64);
impl_mpi_datatype!(u16, ElementType::UInt16);
impl_mpi_datatype!(u32, ElementType::UInt32);
impl_mpi_datatype!(u64, ElementType::UInt64);
impl_mpi_datatype!(f32, ElementType::Float32);
impl_mpi_datatype!(f64, ElementType::Float64);
impl_mpi_datatype!(Complex<f32>, ElementType::Complex64);
impl_mpi_datatype!(Complex<f64>, ElementType::Complex128);
