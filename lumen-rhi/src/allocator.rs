//! Resource Allocator - GPU memory sub-allocation for images and buffers.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings, MemoryLocation};
use lumen_core::log;
use parking_lot::Mutex;

use crate::{Buffer, BufferDesc, RenderDevice, RhiCore, RhiError, Texture, TextureDesc};

/// Shared handle to the allocator; every resource holds one so it can free its memory on drop.
pub(crate) type SharedAllocator = Arc<Mutex<Allocator>>;

/// Creates images and buffers bound to sub-allocated device memory.
///
/// Configured for buffer-device-address so buffers can be addressed from shaders.
pub struct ResourceAllocator {
    allocator: SharedAllocator,
}

impl ResourceAllocator {
    pub fn new(core: &RhiCore, device: &RenderDevice) -> Result<Self, RhiError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: core.instance().clone(),
            device: device.handle().clone(),
            physical_device: device.parent_physical_device().handle(),
            debug_settings: AllocatorDebugSettings {
                log_leaks_on_shutdown: cfg!(feature = "validation"),
                ..Default::default()
            },
            buffer_device_address: true,
            allocation_sizes: AllocationSizes::default(),
        })?;

        Ok(Self {
            allocator: Arc::new(Mutex::new(allocator)),
        })
    }

    pub(crate) fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, RhiError> {
        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        log::trace!("Allocated {} bytes for {}", allocation.size(), name);
        Ok(allocation)
    }

    pub(crate) fn shared(&self) -> SharedAllocator {
        self.allocator.clone()
    }

    /// Create an image with a matching 2D view and bind memory for it.
    #[profiling::function]
    pub fn create_texture(&self, device: &RenderDevice, desc: &TextureDesc) -> Result<Texture, RhiError> {
        Texture::new(device, self, desc)
    }

    #[profiling::function]
    pub fn create_buffer(&self, device: &RenderDevice, desc: &BufferDesc) -> Result<Buffer, RhiError> {
        Buffer::new(device, self, desc)
    }
}

/// Hand an allocation back to the allocator, logging instead of failing inside `Drop`.
pub(crate) fn release(allocator: &SharedAllocator, allocation: Allocation, owner: &str) {
    if let Err(err) = allocator.lock().free(allocation) {
        log::error!("Failed to free memory of {}: {}", owner, err);
    }
}
