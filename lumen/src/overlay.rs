//! Hand-off point for an external immediate-mode UI renderer.

use lumen_rhi::{vk, DescriptorAllocator, PoolSizeRatio, Queue, RenderDevice};
use crate::config::UI_DESCRIPTOR_POOL_SIZE;

/// Draws UI into the frame's open rendering pass.
///
/// Called between `begin_rendering` and `end_rendering` with the acquired swapchain
/// image bound as the only color attachment, in color-attachment-optimal layout.
pub trait UiRenderer {
    type DrawData: ?Sized;

    fn render(
        &mut self,
        draw_data: &Self::DrawData,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()>;
}

/// Renders nothing. The pass is still opened and closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl UiRenderer for NoOverlay {
    type DrawData = ();

    fn render(&mut self, _: &(), _: vk::CommandBuffer, _: vk::Extent2D) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handles a UI backend needs to initialise itself against the engine's device.
#[derive(Debug, Clone, Copy)]
pub struct UiBackendInfo {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue: Queue,
    pub descriptor_pool: vk::DescriptorPool,
    pub color_format: vk::Format,
    pub min_image_count: u32,
    pub image_count: u32,
}

const UI_DESCRIPTOR_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// One descriptor of every type per set, so a pool of N sets holds N of each.
pub fn ui_pool_ratios() -> [PoolSizeRatio; 11] {
    UI_DESCRIPTOR_TYPES.map(|ty| PoolSizeRatio::new(ty, 1.0))
}

/// Oversized pool the UI backend allocates its font and texture sets from.
pub fn create_ui_descriptor_pool(device: &RenderDevice) -> Result<DescriptorAllocator, vk::Result> {
    DescriptorAllocator::init_pool_with_flags(
        "descriptor_pool.ui",
        device,
        UI_DESCRIPTOR_POOL_SIZE,
        &ui_pool_ratios(),
        vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
    )
}
