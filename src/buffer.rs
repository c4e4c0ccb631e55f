//! Non-owning buffer views over host containers.
//!
//! A [`BufferView`] describes caller-owned memory as `(address, element type,
//! count, stride)` without copying it. The lifetime parameter ties the view to
//! the container it was built from, so the container can neither move nor be
//! freed while a view (or a [`Request`](crate::Request) holding one) exists.
//!
//! Containers opt in through [`Buffer`] (readable, for send sides) and
//! [`BufferMut`] (writable, for receive sides). [`view_of`] and
//! [`view_of_mut`] build a view and validate it for an operation.
//!
//! # Example
//!
//! ```
//! use mpi_bridge::{view_of, ElementType};
//!
//! let data = vec![1.0f64, 2.0, 3.0];
//! let view = view_of(&data, 2).unwrap();
//! assert_eq!(view.element_type(), ElementType::Float64);
//! assert_eq!(view.count(), 3);
//! assert_eq!(view.byte_len(), 24);
//! ```

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::datatype::{ElementType, MpiDatatype};
use crate::error::{Error, Result};

/// Descriptor of a region of caller-owned memory.
///
/// The view never owns the memory. A view built from a shared borrow is
/// read-only; a view built from a mutable borrow may also be written by a
/// receive.
#[derive(Debug)]
pub struct BufferView<'a> {
    addr: NonNull<u8>,
    element_type: ElementType,
    count: usize,
    stride: usize,
    writable: bool,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> BufferView<'a> {
    /// View a slice of elements for reading.
    pub fn from_slice<T: MpiDatatype>(data: &'a [T]) -> Self {
        BufferView {
            addr: NonNull::from(data).cast::<u8>(),
            element_type: T::ELEMENT,
            count: data.len(),
            stride: 1,
            writable: false,
            _marker: PhantomData,
        }
    }

    /// View a slice of elements for reading and writing.
    pub fn from_slice_mut<T: MpiDatatype>(data: &'a mut [T]) -> Self {
        let count = data.len();
        BufferView {
            addr: NonNull::from(data).cast::<u8>(),
            element_type: T::ELEMENT,
            count,
            stride: 1,
            writable: true,
            _marker: PhantomData,
        }
    }

    /// Build a view from raw parts.
    ///
    /// # Safety
    ///
    /// `addr` must point to memory that stays valid for `'a` and covers
    /// `count` elements of `element_type` placed `stride` elements apart. If
    /// `writable` is set, the memory must be exclusively borrowed for `'a`.
    pub unsafe fn from_raw_parts(
        addr: NonNull<u8>,
        element_type: ElementType,
        count: usize,
        stride: usize,
        writable: bool,
    ) -> Self {
        BufferView {
            addr,
            element_type,
            count,
            stride: stride.max(1),
            writable,
            _marker: PhantomData,
        }
    }

    /// Element type of every element in the view.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Distance between consecutive elements, in elements.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whether the elements form one gap-free region.
    pub fn is_contiguous(&self) -> bool {
        self.stride == 1 || self.count <= 1
    }

    /// Whether a receive may write through this view.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Length of the described region in bytes (contiguous views).
    pub fn byte_len(&self) -> usize {
        self.count * self.element_type.size()
    }

    /// Fail with [`Error::NotContiguous`] or [`Error::TooSmall`] unless the
    /// view can serve an operation touching `expected_min_count` elements.
    pub fn validate(self, expected_min_count: usize) -> Result<Self> {
        if !self.is_contiguous() {
            return Err(Error::NotContiguous {
                stride: self.stride,
            });
        }
        if self.count < expected_min_count {
            return Err(Error::TooSmall {
                required: expected_min_count,
                actual: self.count,
            });
        }
        Ok(self)
    }

    /// Fail with [`Error::TypeMismatch`] unless the view carries `expected`.
    pub fn expect_type(&self, expected: ElementType) -> Result<()> {
        if self.element_type == expected {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected,
                found: self.element_type,
            })
        }
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    /// Only views that passed [`view_of_mut`] are written through.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.addr.as_ptr()
    }

    pub(crate) fn count_i64(&self) -> i64 {
        self.count as i64
    }
}

/// A host container whose storage can be lent out for reading.
pub trait Buffer {
    /// Describe the container's storage.
    ///
    /// Fails with [`Error::UnsupportedType`] if the container's element kind
    /// has no [`ElementType`].
    fn view(&self) -> Result<BufferView<'_>>;
}

/// A host container whose storage can be lent out for writing.
pub trait BufferMut: Buffer {
    /// Describe the container's storage as writable.
    fn view_mut(&mut self) -> Result<BufferView<'_>>;
}

/// Build a read-only view of `container` and validate it.
///
/// Fails with [`Error::NotContiguous`] for strided storage and with
/// [`Error::TooSmall`] when the container holds fewer than
/// `expected_min_count` elements.
pub fn view_of<C: Buffer + ?Sized>(container: &C, expected_min_count: usize) -> Result<BufferView<'_>> {
    container.view()?.validate(expected_min_count)
}

/// Build a writable view of `container` and validate it.
///
/// A receive target only needs to be pre-sized to the largest message it
/// should accept. Incoming messages that do not fit are reported as
/// [`Error::MessageTruncated`] when the receive completes, not here.
///
/// Fails with [`Error::ReadOnly`] when the container hands out a view that
/// was not built from a mutable borrow.
pub fn view_of_mut<C: BufferMut + ?Sized>(
    container: &mut C,
    expected_min_count: usize,
) -> Result<BufferView<'_>> {
    let view = container.view_mut()?;
    if !view.is_writable() {
        return Err(Error::ReadOnly);
    }
    view.validate(expected_min_count)
}

impl<T: MpiDatatype> Buffer for [T] {
    fn view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice(self))
    }
}

impl<T: MpiDatatype> BufferMut for [T] {
    fn view_mut(&mut self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice_mut(self))
    }
}

impl<T: MpiDatatype> Buffer for Vec<T> {
    fn view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice(self.as_slice()))
    }
}

impl<T: MpiDatatype> BufferMut for Vec<T> {
    fn view_mut(&mut self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice_mut(self.as_mut_slice()))
    }
}

impl<T: MpiDatatype, const N: usize> Buffer for [T; N] {
    fn view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice(self.as_slice()))
    }
}

impl<T: MpiDatatype, const N: usize> BufferMut for [T; N] {
    fn view_mut(&mut self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice_mut(self.as_mut_slice()))
    }
}

// Text is send-only: a receive could leave invalid UTF-8 behind. Receive text
// into a `Vec<u8>` instead.
impl Buffer for str {
    fn view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice(self.as_bytes()))
    }
}

impl Buffer for String {
    fn view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView::from_slice(self.as_bytes()))
    }
}

/// Every `stride`-th element of a slice, such as one column of a row-major
/// matrix.
///
/// The elements do not form one region, so [`view_of`] rejects a strided
/// buffer with [`Error::NotContiguous`] whenever it spans more than one
/// element. Copy the elements into a `Vec` to send them.
#[derive(Debug, Clone, Copy)]
pub struct Strided<'a, T> {
    data: &'a [T],
    stride: usize,
}

impl<'a, T: MpiDatatype> Strided<'a, T> {
    /// Select every `stride`-th element of `data`, starting at the first.
    pub fn new(data: &'a [T], stride: usize) -> Self {
        Strided {
            data,
            stride: stride.max(1),
        }
    }

    /// Number of selected elements.
    pub fn len(&self) -> usize {
        self.data.len().div_ceil(self.stride)
    }

    /// Whether no element is selected.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy the selected elements into a contiguous vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().step_by(self.stride).copied().collect()
    }
}

impl<T: MpiDatatype> Buffer for Strided<'_, T> {
    fn view(&self) -> Result<BufferView<'_>> {
        // SAFETY: the address and element layout come from a live slice that
        // outlives the returned view, and the view is read-only.
        Ok(unsafe {
            BufferView::from_raw_parts(
                NonNull::from(self.data).cast::<u8>(),
                T::ELEMENT,
                self.len(),
                self.stride,
                false,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn slice_view_describes_storage() {
        let data = [1i32, 2, 3, 4];
        let view = view_of(&data[..], 0).unwrap();
        assert_eq!(view.element_type(), ElementType::Int32);
        assert_eq!(view.count(), 4);
        assert_eq!(view.byte_len(), 16);
        assert_eq!(view.as_ptr(), data.as_ptr().cast::<u8>());
        assert!(view.is_contiguous());
        assert!(!view.is_writable());
    }

    #[test]
    fn mutable_view_is_writable() {
        let mut data = vec![0.0f32; 3];
        let view = view_of_mut(&mut data, 3).unwrap();
        assert!(view.is_writable());
        assert_eq!(view.element_type(), ElementType::Float32);
    }

    #[test]
    fn strings_are_byte_buffers() {
        let text = String::from("Hello from 0");
        let view = view_of(&text, 0).unwrap();
        assert_eq!(view.element_type(), ElementType::Byte);
        assert_eq!(view.count(), 12);

        let view = view_of("abc", 0).unwrap();
        assert_eq!(view.count(), 3);
    }

    #[test]
    fn complex_buffers() {
        let data = vec![Complex::new(1.0f64, -1.0); 2];
        let view = view_of(&data, 0).unwrap();
        assert_eq!(view.element_type(), ElementType::Complex128);
        assert_eq!(view.byte_len(), 32);
    }

    #[test]
    fn too_small_is_rejected() {
        let data = vec![0u8; 2];
        let err = view_of(&data, 5).unwrap_err();
        assert_eq!(
            err,
            Error::TooSmall {
                required: 5,
                actual: 2
            }
        );
    }

    #[test]
    fn empty_receive_target_is_accepted() {
        let mut data: Vec<u8> = Vec::new();
        let view = view_of_mut(&mut data, 0).unwrap();
        assert_eq!(view.count(), 0);
    }

    struct Constant;

    static CONSTANT: [u8; 4] = [1, 2, 3, 4];

    impl Buffer for Constant {
        fn view(&self) -> Result<BufferView<'_>> {
            Ok(BufferView::from_slice(&CONSTANT))
        }
    }

    impl BufferMut for Constant {
        fn view_mut(&mut self) -> Result<BufferView<'_>> {
            Ok(BufferView::from_slice(&CONSTANT))
        }
    }

    #[test]
    fn read_only_views_are_not_receive_targets() {
        let mut constant = Constant;
        assert_eq!(view_of_mut(&mut constant, 0).unwrap_err(), Error::ReadOnly);
        assert_eq!(view_of(&constant, 4).unwrap().count(), 4);
        assert_eq!(CONSTANT, [1, 2, 3, 4]);
    }

    #[test]
    fn from_slice_mut_keeps_the_length() {
        let mut data = [0i64; 5];
        let view = BufferView::from_slice_mut(&mut data);
        assert_eq!(view.count(), 5);
        assert!(view.is_writable());
    }

    #[test]
    fn strided_views_are_not_contiguous() {
        let matrix = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let column = Strided::new(&matrix, 2);
        assert_eq!(column.len(), 3);
        assert_eq!(column.to_vec(), vec![1.0, 3.0, 5.0]);
        assert_eq!(
            view_of(&column, 0).unwrap_err(),
            Error::NotContiguous { stride: 2 }
        );
    }

    #[test]
    fn single_element_stride_is_contiguous() {
        let data = [7u16];
        let one = Strided::new(&data, 4);
        let view = view_of(&one, 1).unwrap();
        assert_eq!(view.count(), 1);
    }

    #[test]
    fn expect_type_reports_both_types() {
        let data = [1u32];
        let view = BufferView::from_slice(&data);
        assert!(view.expect_type(ElementType::UInt32).is_ok());
        assert_eq!(
            view.expect_type(ElementType::Int32).unwrap_err(),
            Error::TypeMismatch {
                expected: ElementType::Int32,
                found: ElementType::UInt32
            }
        );
    }
}
