//! Per-frame packing of shader parameters into a few large uniform buffers.

use crate::rendering::defs::BufferUsage;
use crate::rendering::device::{DeviceError, RenderDevice};
use lucent_utils::{align_up, debug_panic};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector2, Vector3, Vector4};
use smallvec::SmallVec;
use static_assertions::{const_assert, const_assert_eq};
use std::ops::Range;
use tracing::{error, trace};

/// Capacity of every backing buffer. No single block may be larger.
pub const CONSTANT_BUFFER_SIZE: u32 = 16 * 1024;

const_assert!(CONSTANT_BUFFER_SIZE.is_power_of_two());
// largest value that fits the inline encoding buffer
const_assert_eq!(size_of::<Matrix4<f32>>(), 64);

/// A block reserved by [`ConstantBufferCollection::add_block`].
///
/// Only valid until the next [`clear_and_initialize`](ConstantBufferCollection::clear_and_initialize).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstantBufferCollectionRef {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
    pub generation: u64,
}

/// A value of a shader parameter, in the layout it has inside a constant buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderParameterValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vector2(Vector2<f32>),
    Vector3(Vector3<f32>),
    Vector4(Vector4<f32>),
    IntVector2(Vector2<i32>),
    IntVector3(Vector3<i32>),
    IntVector4(Vector4<i32>),
    /// Stored as three columns, each padded to four floats.
    Matrix3(Matrix3<f32>),
    /// Stored row by row, which shaders see as the transposed `mat3x4<f32>`.
    Matrix3x4(Matrix3x4<f32>),
    Matrix4(Matrix4<f32>),
    FloatArray(Vec<f32>),
    Vector4Array(Vec<Vector4<f32>>),
}

impl ShaderParameterValue {
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Vector4(Vector4::new(r, g, b, a))
    }

    /// Encodes the value into its constant buffer layout.
    pub fn to_bytes(&self) -> SmallVec<[u8; 64]> {
        let mut bytes = SmallVec::new();
        match self {
            Self::Bool(v) => bytes.extend_from_slice(bytemuck::bytes_of(&(*v as u32))),
            Self::Int(v) => bytes.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Float(v) => bytes.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Vector2(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::Vector3(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::Vector4(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::IntVector2(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::IntVector3(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::IntVector4(v) => bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice())),
            Self::Matrix3(m) => {
                for column in m.column_iter() {
                    let padded = [column[0], column[1], column[2], 0.0];
                    bytes.extend_from_slice(bytemuck::cast_slice(&padded));
                }
            }
            Self::Matrix3x4(m) => {
                for row in m.row_iter() {
                    let row = [row[0], row[1], row[2], row[3]];
                    bytes.extend_from_slice(bytemuck::cast_slice(&row));
                }
            }
            Self::Matrix4(m) => bytes.extend_from_slice(bytemuck::cast_slice(m.as_slice())),
            Self::FloatArray(values) => bytes.extend_from_slice(bytemuck::cast_slice(values)),
            Self::Vector4Array(values) => {
                for v in values {
                    bytes.extend_from_slice(bytemuck::cast_slice(v.as_slice()));
                }
            }
        }
        bytes
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ShaderParameterValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    Vector2<f32> => Vector2,
    Vector3<f32> => Vector3,
    Vector4<f32> => Vector4,
    Vector2<i32> => IntVector2,
    Vector3<i32> => IntVector3,
    Vector4<i32> => IntVector4,
    Matrix3<f32> => Matrix3,
    Matrix3x4<f32> => Matrix3x4,
    Matrix4<f32> => Matrix4,
    Vec<f32> => FloatArray,
    Vec<Vector4<f32>> => Vector4Array,
}

struct BackingBuffer<D: RenderDevice> {
    data: Vec<u8>,
    cursor: u32,
    dirty: Option<Range<u32>>,
    gpu: Option<D::Buffer>,
}

impl<D: RenderDevice> BackingBuffer<D> {
    fn new() -> Self {
        Self {
            data: vec![0; CONSTANT_BUFFER_SIZE as usize],
            cursor: 0,
            dirty: None,
            gpu: None,
        }
    }

    fn mark_dirty(&mut self, range: Range<u32>) {
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }
}

/// Growable set of fixed-size uniform buffers that parameter blocks are packed into.
///
/// Blocks never span two buffers. Contents live on the CPU until
/// [`upload_dirty`](Self::upload_dirty) copies the changed range of a buffer to the GPU.
pub struct ConstantBufferCollection<D: RenderDevice> {
    buffers: Vec<BackingBuffer<D>>,
    current: usize,
    alignment: u32,
    generation: u64,
}

impl<D: RenderDevice> Default for ConstantBufferCollection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: RenderDevice> ConstantBufferCollection<D> {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            current: 0,
            alignment: 1,
            generation: 0,
        }
    }

    /// Starts a new generation. Every ref handed out before is invalid afterward.
    pub fn clear_and_initialize(&mut self, alignment: u32) {
        self.alignment = alignment.max(1);
        self.generation += 1;
        self.current = 0;

        for buffer in &mut self.buffers {
            buffer.cursor = 0;
        }
        if self.buffers.is_empty() {
            self.buffers.push(BackingBuffer::new());
        }
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Index of the buffer blocks are currently taken from and its write position.
    pub fn cursor(&self) -> (usize, u32) {
        (self.current, self.buffers.get(self.current).map_or(0, |b| b.cursor))
    }

    /// Reserves `size` bytes, rounded up to the alignment, and returns them for writing.
    ///
    /// Blocks larger than [`CONSTANT_BUFFER_SIZE`] are a programming error.
    pub fn add_block(&mut self, size: u32) -> Option<(ConstantBufferCollectionRef, &mut [u8])> {
        if size > CONSTANT_BUFFER_SIZE {
            error!("Constant buffer block of {size} bytes exceeds the buffer size of {CONSTANT_BUFFER_SIZE}");
            debug_panic!("Constant buffer block of {size} bytes is too large");
            return None;
        }

        if self.buffers.is_empty() {
            self.clear_and_initialize(self.alignment);
        }

        let reserved = (align_up(size as u64, self.alignment as u64) as u32).min(CONSTANT_BUFFER_SIZE);
        if self.buffers[self.current].cursor + reserved > CONSTANT_BUFFER_SIZE {
            self.current += 1;
            if self.current == self.buffers.len() {
                trace!("Allocating constant buffer #{}", self.current);
                self.buffers.push(BackingBuffer::new());
            }
            self.buffers[self.current].cursor = 0;
        }

        let index = self.current;
        let buffer = &mut self.buffers[index];
        let offset = buffer.cursor;
        buffer.cursor += reserved;
        buffer.mark_dirty(offset..offset + size);

        let block = ConstantBufferCollectionRef {
            index: index as u32,
            offset,
            size,
            generation: self.generation,
        };
        let data = &mut buffer.data[offset as usize..(offset + size) as usize];
        data.fill(0);
        Some((block, data))
    }

    /// Writes `value` to the start of `dst`, truncated to its length. Returns the bytes written.
    pub fn store_parameter(dst: &mut [u8], value: &ShaderParameterValue) -> usize {
        let bytes = value.to_bytes();
        let len = bytes.len().min(dst.len());
        dst[..len].copy_from_slice(&bytes[..len]);
        len
    }

    /// Whether `block` was handed out in the current generation.
    pub fn is_current(&self, block: &ConstantBufferCollectionRef) -> bool {
        block.generation == self.generation && (block.index as usize) < self.buffers.len()
    }

    /// Contents of a block, for inspection.
    pub fn block_data(&self, block: &ConstantBufferCollectionRef) -> Option<&[u8]> {
        if !self.is_current(block) {
            debug_panic!("Constant buffer ref from generation {} used in {}", block.generation, self.generation);
            return None;
        }
        let start = block.offset as usize;
        self.buffers[block.index as usize]
            .data
            .get(start..start + block.size as usize)
    }

    /// Writable contents of a block. Marks the block dirty again.
    pub fn block_data_mut(&mut self, block: &ConstantBufferCollectionRef) -> Option<&mut [u8]> {
        if !self.is_current(block) {
            debug_panic!("Constant buffer ref from generation {} used in {}", block.generation, self.generation);
            return None;
        }
        let buffer = &mut self.buffers[block.index as usize];
        buffer.mark_dirty(block.offset..block.offset + block.size);
        let start = block.offset as usize;
        buffer.data.get_mut(start..start + block.size as usize)
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.buffers.get(index).is_some_and(|b| b.dirty.is_some())
    }

    /// Copies the changed range of buffer `index` to the GPU, creating the GPU buffer first if
    /// it doesn't exist yet.
    pub fn upload_dirty(&mut self, device: &D, index: usize) -> Result<(), DeviceError> {
        let Some(buffer) = self.buffers.get_mut(index) else {
            return Ok(());
        };

        if buffer.gpu.is_none() {
            let label = format!("Constant Buffer #{index}");
            let gpu = device.create_buffer(
                &label,
                CONSTANT_BUFFER_SIZE as u64,
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            )?;
            buffer.gpu = Some(gpu);
        }

        if let (Some(dirty), Some(gpu)) = (buffer.dirty.take(), &buffer.gpu) {
            // uploads must be a multiple of 4 bytes
            let start = dirty.start & !3;
            let end = align_up(dirty.end as u64, 4).min(CONSTANT_BUFFER_SIZE as u64) as u32;
            device.write_buffer(gpu, start as u64, &buffer.data[start as usize..end as usize]);
        }

        Ok(())
    }

    pub fn buffer(&self, index: usize) -> Option<&D::Buffer> {
        self.buffers.get(index).and_then(|b| b.gpu.as_ref())
    }
}
