//! Vulkan Buffer - GPU buffer resource management.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use lumen_rhi_derive::DeviceObject;

use crate::allocator::{release, ResourceAllocator, SharedAllocator};
use crate::device::{set_debug_name_handle, DebuggableObject};
use crate::{RenderDevice, RhiError};

/// Buffer descriptor for creating GPU buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    /// Size of the buffer in bytes.
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

impl BufferDesc {
    /// Device-local buffer that is filled through a transfer.
    pub fn device_local(name: &str, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            name: name.to_owned(),
            size,
            usage: usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Host-visible source buffer for uploads.
    pub fn staging(name: &str, size: vk::DeviceSize) -> Self {
        Self {
            name: name.to_owned(),
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
        }
    }
}

/// Non-owning copy of a [`Buffer`]'s handles, for buffers kept alive elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRef {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    pub device_address: Option<vk::DeviceAddress>,
}

#[DeviceObject]
pub struct Buffer {
    name: String,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    allocation: Option<Allocation>,
    allocator: SharedAllocator,
}

impl Buffer {
    pub(crate) fn new(device: &RenderDevice, allocator: &ResourceAllocator, desc: &BufferDesc) -> Result<Self, RhiError> {
        let raw = device.handle();
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { raw.create_buffer(&create_info, None)? };
        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };

        let allocation = match allocator.allocate(&desc.name, requirements, desc.location, true) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        if let Err(err) = unsafe { raw.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
            unsafe { raw.destroy_buffer(buffer, None) };
            release(&allocator.shared(), allocation, &desc.name);
            return Err(err.into());
        }

        let buffer = Self {
            name: desc.name.clone(),
            buffer,
            size: desc.size,
            usage: desc.usage,
            allocation: Some(allocation),
            allocator: allocator.shared(),
            device: raw.clone(),
        };
        device.set_debug_name(&buffer);
        Ok(buffer)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer { self.buffer }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize { self.size }

    /// GPU virtual address, for buffers created with `SHADER_DEVICE_ADDRESS`.
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        if !self.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            return None;
        }
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        Some(unsafe { self.device.get_buffer_device_address(&info) })
    }

    pub fn to_ref(&self) -> BufferRef {
        BufferRef {
            handle: self.buffer,
            size: self.size,
            device_address: self.device_address(),
        }
    }

    /// Copy `data` into a host-visible buffer. Fails if the buffer is not mapped or too small.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RhiError> {
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or(RhiError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        let target = mapped
            .get_mut(..data.len())
            .ok_or(RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))?;
        target.copy_from_slice(data);
        Ok(())
    }

    /// Host view of the buffer contents, `None` for device-only memory.
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(|allocation| allocation.mapped_slice())
    }
}

impl DebuggableObject for Buffer {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.buffer, self.name());
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            release(&self.allocator, allocation, &self.name);
        }
    }
}
