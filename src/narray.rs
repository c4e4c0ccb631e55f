//! Dynamically typed numeric arrays.
//!
//! [`NumArray`] is the host-side array container: a flat byte store tagged
//! with a runtime [`TypeCode`]. Not every type code has an element type
//! mapping, so building a view can fail with [`Error::UnsupportedType`]
//! instead of reinterpreting the bytes.
//!
//! # Example
//!
//! ```
//! use mpi_bridge::{NumArray, TypeCode};
//!
//! let ary = NumArray::from_slice(&[1.0f64, 2.0, 3.0]);
//! assert_eq!(ary.type_code(), TypeCode::Float64);
//! assert_eq!(ary.len(), 3);
//! assert_eq!(ary.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
//! ```

use std::ptr::NonNull;

use crate::buffer::{Buffer, BufferMut, BufferView};
use crate::datatype::{ElementType, MpiDatatype};
use crate::error::{Error, Result};

/// Runtime element kind of a [`NumArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Raw bytes
    Byte,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// IEEE half precision, stored but not transferable
    Float16,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Complex of two 32-bit floats
    Complex64,
    /// Complex of two 64-bit floats
    Complex128,
    /// One byte per boolean, stored but not transferable
    Bool,
    /// Opaque host object references, stored but not transferable
    Object,
}

impl TypeCode {
    /// The element type for this code, if it has one.
    pub fn element_type(self) -> Option<ElementType> {
        match self {
            TypeCode::Byte => Some(ElementType::Byte),
            TypeCode::Int8 => Some(ElementType::Int8),
            TypeCode::Int16 => Some(ElementType::Int16),
            TypeCode::Int32 => Some(ElementType::Int32),
            TypeCode::Int64 => Some(ElementType::Int64),
            TypeCode::UInt8 => Some(ElementType::UInt8),
            TypeCode::UInt16 => Some(ElementType::UInt16),
            TypeCode::UInt32 => Some(ElementType::UInt32),
            TypeCode::UInt64 => Some(ElementType::UInt64),
            TypeCode::Float32 => Some(ElementType::Float32),
            TypeCode::Float64 => Some(ElementType::Float64),
            TypeCode::Complex64 => Some(ElementType::Complex64),
            TypeCode::Complex128 => Some(ElementType::Complex128),
            TypeCode::Float16 | TypeCode::Bool | TypeCode::Object => None,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            TypeCode::Float16 => 2,
            TypeCode::Bool => 1,
            TypeCode::Object => std::mem::size_of::<usize>(),
            other => other.element_type().map_or(0, ElementType::size),
        }
    }

    fn of(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Byte => TypeCode::Byte,
            ElementType::Int8 => TypeCode::Int8,
            ElementType::Int16 => TypeCode::Int16,
            ElementType::Int32 => TypeCode::Int32,
            ElementType::Int64 => TypeCode::Int64,
            ElementType::UInt8 => TypeCode::UInt8,
            ElementType::UInt16 => TypeCode::UInt16,
            ElementType::UInt32 => TypeCode::UInt32,
            ElementType::UInt64 => TypeCode::UInt64,
            ElementType::Float32 => TypeCode::Float32,
            ElementType::Float64 => TypeCode::Float64,
            ElementType::Complex64 => TypeCode::Complex64,
            ElementType::Complex128 => TypeCode::Complex128,
        }
    }
}

/// A flat, dynamically typed numeric array.
#[derive(Debug, Clone, PartialEq)]
pub struct NumArray {
    type_code: TypeCode,
    len: usize,
    bytes: Vec<u8>,
}

impl NumArray {
    /// A zero-filled array of `len` elements.
    pub fn zeros(type_code: TypeCode, len: usize) -> Self {
        NumArray {
            type_code,
            len,
            bytes: vec![0u8; len * type_code.size()],
        }
    }

    /// Copy a typed slice into a new array.
    pub fn from_slice<T: MpiDatatype>(data: &[T]) -> Self {
        let mut ary = Self::zeros(TypeCode::of(T::ELEMENT), data.len());
        // SAFETY: `T` is a plain numeric type without padding, and `bytes`
        // was sized to hold exactly `data.len()` elements of it.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr().cast::<u8>(),
                ary.bytes.as_mut_ptr(),
                ary.bytes.len(),
            );
        }
        ary
    }

    /// Reinterpret `bytes` as an array of `type_code` elements.
    ///
    /// Fails with [`Error::InvalidCount`] if the length is not a whole number
    /// of elements.
    pub fn from_bytes(type_code: TypeCode, bytes: Vec<u8>) -> Result<Self> {
        let size = type_code.size();
        if size == 0 || bytes.len() % size != 0 {
            return Err(Error::InvalidCount(bytes.len() as i64));
        }
        Ok(NumArray {
            type_code,
            len: bytes.len() / size,
            bytes,
        })
    }

    /// Runtime type code.
    pub fn type_code(&self) -> TypeCode {
        self.type_code
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw element storage.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy the elements out as `T`.
    ///
    /// Fails with [`Error::TypeMismatch`] when `T` is not the array's type,
    /// or [`Error::UnsupportedType`] when the array's type has no mapping.
    pub fn to_vec<T: MpiDatatype>(&self) -> Result<Vec<T>> {
        let element_type = self.element_type()?;
        if element_type != T::ELEMENT {
            return Err(Error::TypeMismatch {
                expected: element_type,
                found: T::ELEMENT,
            });
        }
        let mut out = Vec::<T>::with_capacity(self.len);
        // SAFETY: the byte store holds `len` elements of `T`, and `out` has
        // capacity for `len` of them. The copy is bytewise, so the byte
        // store's alignment does not matter.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.bytes.as_ptr(),
                out.as_mut_ptr().cast::<u8>(),
                self.bytes.len(),
            );
            out.set_len(self.len);
        }
        Ok(out)
    }

    /// Set every element to `value`.
    pub fn fill<T: MpiDatatype>(&mut self, value: T) -> Result<()> {
        let element_type = self.element_type()?;
        if element_type != T::ELEMENT {
            return Err(Error::TypeMismatch {
                expected: element_type,
                found: T::ELEMENT,
            });
        }
        let size = element_type.size();
        for chunk in self.bytes.chunks_exact_mut(size) {
            // SAFETY: each chunk is exactly one `T` wide.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (&value as *const T).cast::<u8>(),
                    chunk.as_mut_ptr(),
                    size,
                );
            }
        }
        Ok(())
    }

    fn element_type(&self) -> Result<ElementType> {
        self.type_code
            .element_type()
            .ok_or_else(|| Error::UnsupportedType(format!("{:?}", self.type_code)))
    }
}

impl Buffer for NumArray {
    fn view(&self) -> Result<BufferView<'_>> {
        let element_type = self.element_type()?;
        // SAFETY: `bytes` holds `len` elements of `element_type` and is
        // borrowed for the lifetime of the view.
        Ok(unsafe {
            BufferView::from_raw_parts(
                NonNull::from(self.bytes.as_slice()).cast::<u8>(),
                element_type,
                self.len,
                1,
                false,
            )
        })
    }
}

impl BufferMut for NumArray {
    fn view_mut(&mut self) -> Result<BufferView<'_>> {
        let element_type = self.element_type()?;
        // SAFETY: as above, with the storage borrowed exclusively.
        Ok(unsafe {
            BufferView::from_raw_parts(
                NonNull::from(self.bytes.as_mut_slice()).cast::<u8>(),
                element_type,
                self.len,
                1,
                true,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{view_of, view_of_mut};

    #[test]
    fn typed_round_trip() {
        let ary = NumArray::from_slice(&[3i32, 2, 1]);
        assert_eq!(ary.type_code(), TypeCode::Int32);
        assert_eq!(ary.as_bytes().len(), 12);
        assert_eq!(ary.to_vec::<i32>().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn to_vec_rejects_other_types() {
        let ary = NumArray::from_slice(&[1.0f32]);
        assert_eq!(
            ary.to_vec::<f64>().unwrap_err(),
            Error::TypeMismatch {
                expected: ElementType::Float32,
                found: ElementType::Float64
            }
        );
    }

    #[test]
    fn unmapped_codes_are_unsupported() {
        for code in [TypeCode::Float16, TypeCode::Bool, TypeCode::Object] {
            let mut ary = NumArray::zeros(code, 4);
            assert!(matches!(
                view_of(&ary, 0).unwrap_err(),
                Error::UnsupportedType(_)
            ));
            assert!(matches!(
                view_of_mut(&mut ary, 0).unwrap_err(),
                Error::UnsupportedType(_)
            ));
        }
    }

    #[test]
    fn unsigned_bytes_are_not_raw_bytes() {
        let ary = NumArray::zeros(TypeCode::UInt8, 2);
        let view = view_of(&ary, 2).unwrap();
        assert_eq!(view.element_type(), ElementType::UInt8);
    }

    #[test]
    fn fill_sets_every_element() {
        let mut ary = NumArray::zeros(TypeCode::Float64, 3);
        ary.fill(1.5f64).unwrap();
        assert_eq!(ary.to_vec::<f64>().unwrap(), vec![1.5; 3]);
    }

    #[test]
    fn from_bytes_requires_whole_elements() {
        assert!(NumArray::from_bytes(TypeCode::Int16, vec![0; 3]).is_err());
        let ary = NumArray::from_bytes(TypeCode::Int16, vec![1, 0, 2, 0]).unwrap();
        assert_eq!(ary.len(), 2);
    }
}
