//! Image layout tracking and the barriers that move images between layouts.

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureLayout {
    Undefined,
    General,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
    Color,
    DepthAttachment,
    Present,
}

impl TextureLayout {
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
            TextureLayout::General => vk::ImageLayout::GENERAL,
            TextureLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            TextureLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TextureLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            TextureLayout::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            TextureLayout::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            TextureLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Aspect touched by a transition into this layout.
    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            TextureLayout::DepthAttachment => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// An image handle paired with the layout it is currently known to be in.
///
/// The tag only changes through [`TrackedImage::transition`], which also produces
/// the barrier that has to be recorded for the change to be real.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedImage {
    handle: vk::Image,
    layout: TextureLayout,
}

impl TrackedImage {
    pub fn new(handle: vk::Image, layout: TextureLayout) -> Self {
        Self { handle, layout }
    }

    #[inline]
    pub fn handle(&self) -> vk::Image { self.handle }

    #[inline]
    pub fn layout(&self) -> TextureLayout { self.layout }

    /// Move the image from `from` to `to`.
    ///
    /// `from` is either the tracked layout or `Undefined`; the latter discards the contents.
    pub fn transition(&mut self, from: TextureLayout, to: TextureLayout) -> LayoutTransition {
        debug_assert!(
            from == TextureLayout::Undefined || from == self.layout,
            "image {:?} is tracked as {:?} but a transition from {:?} was requested",
            self.handle, self.layout, from,
        );
        self.layout = to;
        LayoutTransition {
            image: self.handle,
            old_layout: from,
            new_layout: to,
        }
    }
}

/// A recorded-layout change for one image, covering every mip level and array layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub image: vk::Image,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
}

impl LayoutTransition {
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.new_layout.aspect())
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS)
    }

    /// Full-pipeline barrier: every prior write is made visible to every later access.
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(self.old_layout.to_vk())
            .new_layout(self.new_layout.to_vk())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range())
    }
}
