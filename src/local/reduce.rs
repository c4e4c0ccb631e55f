//! Element-wise reduction kernels over raw payload bytes.

use num_complex::Complex;

use crate::datatype::ElementType;
use crate::error::ErrorClass;
use crate::ReduceOp;

/// A value that reduction kernels can read from and write to payload bytes.
trait Element: Copy {
    const SIZE: usize;

    fn read(bytes: &[u8]) -> Self;
    fn write(self, bytes: &mut [u8]);
    /// `None` when `op` is not defined for the type.
    fn apply(op: ReduceOp, a: Self, b: Self) -> Option<Self>;
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

macro_rules! impl_int_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl Element for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn read(bytes: &[u8]) -> Self {
                    <$t>::from_ne_bytes(array(bytes))
                }

                fn write(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_ne_bytes());
                }

                fn apply(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                    Some(match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Max => a.max(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Land => ((a != 0) && (b != 0)) as $t,
                        ReduceOp::Lor => ((a != 0) || (b != 0)) as $t,
                        ReduceOp::Lxor => ((a != 0) != (b != 0)) as $t,
                        ReduceOp::Band => a & b,
                        ReduceOp::Bor => a | b,
                        ReduceOp::Bxor => a ^ b,
                    })
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl Element for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn read(bytes: &[u8]) -> Self {
                    <$t>::from_ne_bytes(array(bytes))
                }

                fn write(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_ne_bytes());
                }

                fn apply(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                    match op {
                        ReduceOp::Sum => Some(a + b),
                        ReduceOp::Prod => Some(a * b),
                        ReduceOp::Max => Some(a.max(b)),
                        ReduceOp::Min => Some(a.min(b)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

macro_rules! impl_complex_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl Element for Complex<$t> {
                const SIZE: usize = 2 * std::mem::size_of::<$t>();

                fn read(bytes: &[u8]) -> Self {
                    let (re, im) = bytes.split_at(Self::SIZE / 2);
                    Complex::new(<$t>::read(re), <$t>::read(im))
                }

                fn write(self, bytes: &mut [u8]) {
                    let (re, im) = bytes.split_at_mut(Self::SIZE / 2);
                    self.re.write(re);
                    self.im.write(im);
                }

                fn apply(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                    match op {
                        ReduceOp::Sum => Some(a + b),
                        ReduceOp::Prod => Some(a * b),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_int_element!(u8, i8, i16, i32, i64, u16, u32, u64);
impl_float_element!(f32, f64);
impl_complex_element!(f32, f64);

fn fold<T: Element>(op: ReduceOp, acc: &mut [u8], other: &[u8]) -> Result<(), ErrorClass> {
    for (a, b) in acc.chunks_exact_mut(T::SIZE).zip(other.chunks_exact(T::SIZE)) {
        T::apply(op, T::read(a), T::read(b))
            .ok_or(ErrorClass::Op)?
            .write(a);
    }
    Ok(())
}

/// Fold `other` into `acc` element by element: `acc[i] = acc[i] op other[i]`.
pub(crate) fn combine(
    op: ReduceOp,
    element_type: ElementType,
    acc: &mut [u8],
    other: &[u8],
) -> Result<(), ErrorClass> {
    if !op.supports(element_type) {
        return Err(ErrorClass::Op);
    }
    if acc.len() != other.len() || acc.len() % element_type.size() != 0 {
        return Err(ErrorClass::Count);
    }
    match element_type {
        ElementType::Byte | ElementType::UInt8 => fold::<u8>(op, acc, other),
        ElementType::Int8 => fold::<i8>(op, acc, other),
        ElementType::Int16 => fold::<i16>(op, acc, other),
        ElementType::Int32 => fold::<i32>(op, acc, other),
        ElementType::Int64 => fold::<i64>(op, acc, other),
        ElementType::UInt16 => fold::<u16>(op, acc, other),
        ElementType::UInt32 => fold::<u32>(op, acc, other),
        ElementType::UInt64 => fold::<u64>(op, acc, other),
        ElementType::Float32 => fold::<f32>(op, acc, other),
        ElementType::Float64 => fold::<f64>(op, acc, other),
        ElementType::Complex64 => fold::<Complex<f32>>(op, acc, other),
        ElementType::Complex128 => fold::<Complex<f64>>(op, acc, other),
    }
}
