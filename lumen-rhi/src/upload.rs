use ash::vk;
use lumen_core::log;

use crate::{Buffer, BufferDesc, ImmediateSubmit, RenderDevice, ResourceAllocator, RhiError};

/// Create a device-local buffer holding `data`, copied through a temporary staging buffer.
///
/// Blocks until the copy has finished on the GPU.
#[profiling::function]
pub fn upload_buffer(
    device: &RenderDevice,
    allocator: &ResourceAllocator,
    immediate: &ImmediateSubmit,
    name: &str,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<Buffer, RhiError> {
    if data.is_empty() {
        return Err(RhiError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED));
    }
    let size = data.len() as vk::DeviceSize;
    let mut staging = allocator.create_buffer(device, &BufferDesc::staging(&format!("{name}.staging"), size))?;
    staging.write(data)?;

    let buffer = allocator.create_buffer(device, &BufferDesc::device_local(name, size, usage))?;

    let region = vk::BufferCopy::default().size(size);
    immediate.submit(device, |encoder| {
        encoder.copy_buffer(staging.handle(), buffer.handle(), std::slice::from_ref(&region));
    })?;

    log::debug!("Uploaded {} bytes into {}", size, name);
    Ok(buffer)
}

/// Typed convenience over [`upload_buffer`].
pub fn upload_slice<T: bytemuck::Pod>(
    device: &RenderDevice,
    allocator: &ResourceAllocator,
    immediate: &ImmediateSubmit,
    name: &str,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> Result<Buffer, RhiError> {
    upload_buffer(device, allocator, immediate, name, bytemuck::cast_slice(data), usage)
}
