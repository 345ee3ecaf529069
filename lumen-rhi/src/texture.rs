//! Vulkan Texture - device images with a single view and tracked layout.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use lumen_rhi_derive::DeviceObject;

use crate::allocator::{release, ResourceAllocator, SharedAllocator};
use crate::barrier::{TextureLayout, TrackedImage};
use crate::device::{set_debug_name_handle, DebuggableObject};
use crate::{RenderDevice, RhiError};

/// Texture descriptor for creating GPU textures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub location: MemoryLocation,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub tiling: vk::ImageTiling,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::SAMPLED,
            location: MemoryLocation::GpuOnly,
            mip_levels: 1,
            array_layers: 1,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}

impl TextureDesc {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(name: &str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            name: name.to_owned(),
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            ..Default::default()
        }
    }

    /// Offscreen color target that compute shaders write and transfers read back out of.
    pub fn new_storage_target(name: &str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self::new_2d(name, extent, format).with_usage(
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )
    }

    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    fn aspect(&self) -> vk::ImageAspectFlags {
        format_to_aspect_mask(self.format)
    }
}

/// GPU texture resource that owns its image, view and memory.
#[DeviceObject]
pub struct Texture {
    name: String,
    tracked: TrackedImage,
    view: vk::ImageView,
    desc: TextureDesc,
    allocation: Option<Allocation>,
    allocator: SharedAllocator,
}

impl Texture {
    pub(crate) fn new(device: &RenderDevice, allocator: &ResourceAllocator, desc: &TextureDesc) -> Result<Self, RhiError> {
        let raw = device.handle();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { raw.create_image(&image_info, None)? };
        let requirements = unsafe { raw.get_image_memory_requirements(image) };

        let linear = desc.tiling == vk::ImageTiling::LINEAR;
        let allocation = match allocator.allocate(&desc.name, requirements, desc.location, linear) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { raw.destroy_image(image, None) };
                return Err(err);
            }
        };

        let bound = unsafe { raw.bind_image_memory(image, allocation.memory(), allocation.offset()) }
            .and_then(|_| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(desc.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(desc.aspect())
                            .base_mip_level(0)
                            .level_count(desc.mip_levels)
                            .base_array_layer(0)
                            .layer_count(desc.array_layers),
                    );
                unsafe { raw.create_image_view(&view_info, None) }
            });

        let view = match bound {
            Ok(view) => view,
            Err(err) => {
                unsafe { raw.destroy_image(image, None) };
                release(&allocator.shared(), allocation, &desc.name);
                return Err(err.into());
            }
        };

        let texture = Self {
            name: desc.name.clone(),
            tracked: TrackedImage::new(image, TextureLayout::Undefined),
            view,
            desc: desc.clone(),
            allocation: Some(allocation),
            allocator: allocator.shared(),
            device: raw.clone(),
        };
        device.set_debug_name(&texture);
        Ok(texture)
    }

    #[inline]
    pub fn image(&self) -> vk::Image { self.tracked.handle() }

    #[inline]
    pub fn view(&self) -> vk::ImageView { self.view }

    #[inline]
    pub fn format(&self) -> vk::Format { self.desc.format }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D { self.desc.extent_2d() }

    #[inline]
    pub fn desc(&self) -> &TextureDesc { &self.desc }

    #[inline]
    pub fn layout(&self) -> TextureLayout { self.tracked.layout() }

    /// Layout tag used when recording transitions for this texture.
    #[inline]
    pub fn tracked_mut(&mut self) -> &mut TrackedImage { &mut self.tracked }
}

impl DebuggableObject for Texture {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.tracked.handle(), self.name());
        set_debug_name_handle(device, self.view, &format!("{}.view", self.name()));
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.tracked.handle(), None);
        }
        if let Some(allocation) = self.allocation.take() {
            release(&self.allocator, allocation, &self.name);
        }
    }
}

/// Determine image aspect mask from format.
pub fn format_to_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}
