//! Pixel buffers and their structural descriptors.
//!
//! A [`PixelBuffer`] owns the voxel values of one image together with the
//! geometry needed to place them in space. Every mutation bumps a
//! process-wide modification counter so that cached metadata can tell when
//! it has gone stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::image::error::ImageError;

/// Buffer shared between a producer and any number of observing images.
pub type SharedBuffer = Arc<RwLock<PixelBuffer>>;

/// Non-owning handle to a [`SharedBuffer`].
pub type WeakBuffer = Weak<RwLock<PixelBuffer>>;

static MODIFIED_CLOCK: AtomicU64 = AtomicU64::new(0);

/// Next value of the monotonic modification clock.
pub(crate) fn next_stamp() -> u64 {
    MODIFIED_CLOCK.fetch_add(1, Ordering::Relaxed) + 1
}

/// Byte order of raw pixel data on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Scalar type of a single pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl ScalarType {
    /// Size of one component in bytes.
    pub const fn size(&self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    /// Whether the type can hold negative values.
    pub const fn is_signed(&self) -> bool {
        !matches!(self, ScalarType::U8 | ScalarType::U16 | ScalarType::U32)
    }

    pub const fn is_integer(&self) -> bool {
        !matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Lowercase name, matching numpy-style dtype names.
    pub const fn name(&self) -> &'static str {
        match self {
            ScalarType::U8 => "uint8",
            ScalarType::I8 => "int8",
            ScalarType::U16 => "uint16",
            ScalarType::I16 => "int16",
            ScalarType::U32 => "uint32",
            ScalarType::I32 => "int32",
            ScalarType::F32 => "float32",
            ScalarType::F64 => "float64",
        }
    }
}

/// Typed pixel storage, x fastest, then y, then z, components interleaved.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::U8($v) => $body,
            PixelData::I8($v) => $body,
            PixelData::U16($v) => $body,
            PixelData::I16($v) => $body,
            PixelData::U32($v) => $body,
            PixelData::I32($v) => $body,
            PixelData::F32($v) => $body,
            PixelData::F64($v) => $body,
        }
    };
}

macro_rules! decode_chunks {
    ($bytes:expr, $ty:ty, $order:expr) => {{
        const N: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(N)
            .map(|c| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(c);
                match $order {
                    ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                    ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

macro_rules! encode_values {
    ($values:expr, $order:expr) => {{
        let mut out = Vec::with_capacity($values.len() * std::mem::size_of_val(&$values[0]));
        for v in $values.iter() {
            match $order {
                ByteOrder::LittleEndian => out.extend_from_slice(&v.to_le_bytes()),
                ByteOrder::BigEndian => out.extend_from_slice(&v.to_be_bytes()),
            }
        }
        out
    }};
}

impl PixelData {
    /// Allocate zero-filled storage.
    pub fn zeros(scalar_type: ScalarType, len: usize) -> Self {
        match scalar_type {
            ScalarType::U8 => PixelData::U8(vec![0; len]),
            ScalarType::I8 => PixelData::I8(vec![0; len]),
            ScalarType::U16 => PixelData::U16(vec![0; len]),
            ScalarType::I16 => PixelData::I16(vec![0; len]),
            ScalarType::U32 => PixelData::U32(vec![0; len]),
            ScalarType::I32 => PixelData::I32(vec![0; len]),
            ScalarType::F32 => PixelData::F32(vec![0.0; len]),
            ScalarType::F64 => PixelData::F64(vec![0.0; len]),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            PixelData::U8(_) => ScalarType::U8,
            PixelData::I8(_) => ScalarType::I8,
            PixelData::U16(_) => ScalarType::U16,
            PixelData::I16(_) => ScalarType::I16,
            PixelData::U32(_) => ScalarType::U32,
            PixelData::I32(_) => ScalarType::I32,
            PixelData::F32(_) => ScalarType::F32,
            PixelData::F64(_) => ScalarType::F64,
        }
    }

    /// Number of stored component values.
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to `f64`.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        for_each_variant!(self, v => v.get(index).map(|&x| f64::from(x)))
    }

    /// All values widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        for_each_variant!(self, v => v.iter().map(|&x| f64::from(x)).collect())
    }

    /// Minimum and maximum value, `None` for empty storage.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for_each_variant!(self, v => {
            for &x in v.iter() {
                let x = f64::from(x);
                if x < min {
                    min = x;
                }
                if x > max {
                    max = x;
                }
            }
        });
        Some((min, max))
    }

    /// Decode raw bytes of the given scalar type.
    ///
    /// Trailing bytes that do not form a whole value are ignored.
    pub fn from_bytes(scalar_type: ScalarType, bytes: &[u8], order: ByteOrder) -> Self {
        match scalar_type {
            ScalarType::U8 => PixelData::U8(bytes.to_vec()),
            ScalarType::I8 => PixelData::I8(bytes.iter().map(|&b| b as i8).collect()),
            ScalarType::U16 => PixelData::U16(decode_chunks!(bytes, u16, order)),
            ScalarType::I16 => PixelData::I16(decode_chunks!(bytes, i16, order)),
            ScalarType::U32 => PixelData::U32(decode_chunks!(bytes, u32, order)),
            ScalarType::I32 => PixelData::I32(decode_chunks!(bytes, i32, order)),
            ScalarType::F32 => PixelData::F32(decode_chunks!(bytes, f32, order)),
            ScalarType::F64 => PixelData::F64(decode_chunks!(bytes, f64, order)),
        }
    }

    /// Encode values as raw bytes.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }
        match self {
            PixelData::U8(v) => v.clone(),
            PixelData::I8(v) => v.iter().map(|&x| x as u8).collect(),
            PixelData::U16(v) => encode_values!(v, order),
            PixelData::I16(v) => encode_values!(v, order),
            PixelData::U32(v) => encode_values!(v, order),
            PixelData::I32(v) => encode_values!(v, order),
            PixelData::F32(v) => encode_values!(v, order),
            PixelData::F64(v) => encode_values!(v, order),
        }
    }

    /// Copy of the values in `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            PixelData::U8(v) => PixelData::U8(v[start..end].to_vec()),
            PixelData::I8(v) => PixelData::I8(v[start..end].to_vec()),
            PixelData::U16(v) => PixelData::U16(v[start..end].to_vec()),
            PixelData::I16(v) => PixelData::I16(v[start..end].to_vec()),
            PixelData::U32(v) => PixelData::U32(v[start..end].to_vec()),
            PixelData::I32(v) => PixelData::I32(v[start..end].to_vec()),
            PixelData::F32(v) => PixelData::F32(v[start..end].to_vec()),
            PixelData::F64(v) => PixelData::F64(v[start..end].to_vec()),
        }
    }

    /// Append values of the same scalar type.
    ///
    /// Returns `false` (and leaves `self` untouched) on a type mismatch.
    pub fn append(&mut self, other: &PixelData) -> bool {
        match (self, other) {
            (PixelData::U8(a), PixelData::U8(b)) => a.extend_from_slice(b),
            (PixelData::I8(a), PixelData::I8(b)) => a.extend_from_slice(b),
            (PixelData::U16(a), PixelData::U16(b)) => a.extend_from_slice(b),
            (PixelData::I16(a), PixelData::I16(b)) => a.extend_from_slice(b),
            (PixelData::U32(a), PixelData::U32(b)) => a.extend_from_slice(b),
            (PixelData::I32(a), PixelData::I32(b)) => a.extend_from_slice(b),
            (PixelData::F32(a), PixelData::F32(b)) => a.extend_from_slice(b),
            (PixelData::F64(a), PixelData::F64(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// Structural description of a pixel buffer, without the pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor {
    /// Size along x, y, z (z is 1 for 2-D images).
    pub dimensions: [usize; 3],
    pub scalar_type: ScalarType,
    /// Number of interleaved components per voxel.
    pub components: usize,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
}

impl BufferDescriptor {
    /// Number of voxels (not component values).
    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Extent in VTK form: `[x0, x1, y0, y1, z0, z1]`.
    pub fn extent(&self) -> [i64; 6] {
        let [x, y, z] = self.dimensions.map(|d| d as i64);
        [0, x - 1, 0, y - 1, 0, z - 1]
    }

    /// Whether no voxel data has been allocated.
    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }
}

/// Pixel values plus geometry, with a modification stamp.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    dimensions: [usize; 3],
    components: usize,
    spacing: [f64; 3],
    origin: [f64; 3],
    data: PixelData,
    mtime: u64,
}

impl PixelBuffer {
    /// Create a buffer, checking that `data` matches the declared shape.
    pub fn new(
        dimensions: [usize; 3],
        components: usize,
        data: PixelData,
    ) -> Result<Self, ImageError> {
        let expected = dimensions.iter().product::<usize>() * components;
        if components == 0 || data.len() != expected {
            return Err(ImageError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dimensions,
            components,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            data,
            mtime: next_stamp(),
        })
    }

    /// Zero-filled buffer.
    pub fn zeros(dimensions: [usize; 3], components: usize, scalar_type: ScalarType) -> Self {
        let len = dimensions.iter().product::<usize>() * components;
        Self {
            dimensions,
            components,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            data: PixelData::zeros(scalar_type, len),
            mtime: next_stamp(),
        }
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Wrap the buffer for sharing between images.
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(RwLock::new(self))
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    /// Modification stamp of the last change.
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Mark the buffer as changed.
    pub fn modified(&mut self) {
        self.mtime = next_stamp();
    }

    /// Mutable access to the pixel values; marks the buffer modified.
    ///
    /// Callers must keep the value count matching the shape.
    pub(crate) fn data_mut(&mut self) -> &mut PixelData {
        self.modified();
        &mut self.data
    }

    /// Mutate the pixel values; marks the buffer modified.
    ///
    /// `f` may switch to another scalar type but must leave
    /// `voxels * components` values. Otherwise the previous values are
    /// restored and [`ImageError::ShapeMismatch`] is returned.
    pub fn modify_data<R>(&mut self, f: impl FnOnce(&mut PixelData) -> R) -> Result<R, ImageError> {
        let expected = self.dimensions.iter().product::<usize>() * self.components;
        let previous = self.data.clone();
        let result = f(&mut self.data);
        if self.data.len() != expected {
            let actual = self.data.len();
            self.data = previous;
            return Err(ImageError::ShapeMismatch { expected, actual });
        }
        self.modified();
        Ok(result)
    }

    pub fn set_spacing(&mut self, spacing: [f64; 3]) {
        if self.spacing != spacing {
            self.spacing = spacing;
            self.modified();
        }
    }

    pub fn set_origin(&mut self, origin: [f64; 3]) {
        if self.origin != origin {
            self.origin = origin;
            self.modified();
        }
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            dimensions: self.dimensions,
            scalar_type: self.data.scalar_type(),
            components: self.components,
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    /// Number of component values in one z-slice.
    pub fn slice_len(&self) -> usize {
        self.dimensions[0] * self.dimensions[1] * self.components
    }

    /// Copy of the values of z-slice `index`.
    pub fn slice_data(&self, index: usize) -> Result<PixelData, ImageError> {
        if index >= self.dimensions[2] {
            return Err(ImageError::SliceOutOfRange {
                index,
                depth: self.dimensions[2],
            });
        }
        let len = self.slice_len();
        Ok(self.data.slice(index * len, (index + 1) * len))
    }
}
