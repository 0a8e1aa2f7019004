use super::copy_target;
use crate::rendering::device::{DeviceError, MapErr, MappedTexture, TextureRegion};
use crossbeam_channel::bounded;
use lucent_utils::align_up;
use snafu::ResultExt;
use wgpu::{
    BufferDescriptor, BufferUsages, COPY_BYTES_PER_ROW_ALIGNMENT, CommandEncoderDescriptor, Device,
    MapMode, PollType, Queue, TexelCopyBufferInfo, TexelCopyBufferLayout, Texture,
};

/// Copies one subresource region into a staging buffer and maps it. Slow, blocks on the GPU.
pub fn read_region(
    device: &Device,
    queue: &Queue,
    texture: &Texture,
    region: &TextureRegion,
) -> Result<MappedTexture, DeviceError> {
    let (info, size) = copy_target(texture, region);
    let format = texture.format();
    let (block_width, block_height) = format.block_dimensions();
    let block_bytes = format.block_copy_size(Some(info.aspect)).unwrap_or(4);

    let bytes_per_row = size.width.div_ceil(block_width) * block_bytes;
    let row_pitch = align_up(bytes_per_row as u64, COPY_BYTES_PER_ROW_ALIGNMENT as u64) as u32;
    let rows_per_image = size.height.div_ceil(block_height);
    let rows = rows_per_image * size.depth_or_array_layers.max(1);

    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("Texture Readback Buffer"),
        size: row_pitch as u64 * rows as u64,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("Texture Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        info,
        TexelCopyBufferInfo {
            buffer: &buffer,
            layout: TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_pitch),
                rows_per_image: Some(rows_per_image),
            },
        },
        size,
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = bounded(1);
    slice.map_async(MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    let _ = device.poll(PollType::Wait);

    rx.recv()
        .map_err(|_| DeviceError::MapChannelClosed)?
        .context(MapErr)?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(MappedTexture {
        data,
        row_pitch,
        rows,
    })
}
