//! Command buffer pool and recorder.

use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::barrier::LayoutTransition;
use crate::RenderDevice;
use crate::device::{set_debug_name_handle, DebuggableObject};

/// Command pool whose buffers can be reset one by one.
#[DeviceObject]
pub struct CommandPool {
    name: String,
    pool: vk::CommandPool,
}

impl CommandPool {
    pub fn new(
        name: &str,
        device: &RenderDevice,
        queue_family: u32,
    ) -> Result<Self, vk::Result> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        let pool = Self {
            name: name.to_string(),
            pool,
            device: device.handle().clone(),
        };
        device.set_debug_name(&pool);
        Ok(pool)
    }

    /// Allocate one primary command buffer owned by this pool.
    pub fn allocate_primary(&self) -> Result<vk::CommandBuffer, vk::Result> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        buffers.first().copied().ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }

    /// Return `command_buffer` to the initial state so it can be recorded again.
    pub fn reset_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), vk::Result> {
        unsafe { self.device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty()) }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl DebuggableObject for CommandPool {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.pool, self.name());
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Full-image blit between two images already in transfer layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBlit {
    pub src: vk::Image,
    pub src_extent: vk::Extent2D,
    pub dst: vk::Image,
    pub dst_extent: vk::Extent2D,
}

impl ImageBlit {
    fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
        vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        }
    }

    /// Mip 0 / layer 0 of each image, whole source rectangle onto whole destination rectangle.
    pub fn to_vk(&self) -> vk::ImageBlit2<'static> {
        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);

        vk::ImageBlit2::default()
            .src_subresource(subresource)
            .src_offsets([vk::Offset3D::default(), Self::far_corner(self.src_extent)])
            .dst_subresource(subresource)
            .dst_offsets([vk::Offset3D::default(), Self::far_corner(self.dst_extent)])
    }
}

/// Color target for a dynamic rendering pass that keeps the existing contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorTarget {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub extent: vk::Extent2D,
}

/// Operations the frame recorder issues into a command buffer.
///
/// [`CommandEncoder`] records into Vulkan; other implementations can capture the stream.
pub trait CommandRecorder {
    fn handle(&self) -> vk::CommandBuffer;

    fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<(), vk::Result>;

    fn end(&mut self) -> Result<(), vk::Result>;

    fn transition_image(&mut self, transition: &LayoutTransition);

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    );

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, bytes: &[u8]);

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    fn blit_image(&mut self, blit: &ImageBlit);

    fn begin_rendering(&mut self, target: &ColorTarget);

    fn end_rendering(&mut self);
}

/// Command encoder wrapping a command buffer allocated (and named) elsewhere.
pub struct CommandEncoder<'a> {
    device: &'a RenderDevice,
    cmd: vk::CommandBuffer,
}

impl<'a> CommandEncoder<'a> {
    pub fn new(device: &'a RenderDevice, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.handle().cmd_copy_buffer(self.cmd, src, dst, regions) }
    }

    pub fn clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        let clear = vk::ClearColorValue { float32: color };
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .layer_count(vk::REMAINING_ARRAY_LAYERS);
        unsafe { self.device.handle().cmd_clear_color_image(self.cmd, image, layout, &clear, &[range]) }
    }
}

impl CommandRecorder for CommandEncoder<'_> {
    fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<(), vk::Result> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.handle().begin_command_buffer(self.cmd, &begin_info) }
    }

    fn end(&mut self) -> Result<(), vk::Result> {
        unsafe { self.device.handle().end_command_buffer(self.cmd) }
    }

    fn transition_image(&mut self, transition: &LayoutTransition) {
        let barrier = transition.to_vk();
        let dep = vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe { self.device.handle().cmd_pipeline_barrier2(self.cmd, &dep) }
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.handle().cmd_bind_pipeline(self.cmd, bind_point, pipeline) }
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.cmd,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                &[],
            )
        }
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, bytes: &[u8]) {
        unsafe { self.device.handle().cmd_push_constants(self.cmd, layout, stages, offset, bytes) }
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe { self.device.handle().cmd_dispatch(self.cmd, group_count_x, group_count_y, group_count_z) }
    }

    fn blit_image(&mut self, blit: &ImageBlit) {
        let region = blit.to_vk();
        let info = vk::BlitImageInfo2::default()
            .src_image(blit.src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(blit.dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(std::slice::from_ref(&region));
        unsafe { self.device.handle().cmd_blit_image2(self.cmd, &info) }
    }

    fn begin_rendering(&mut self, target: &ColorTarget) {
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target.view)
            .image_layout(target.layout)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);
        let info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&attachment));
        unsafe { self.device.handle().cmd_begin_rendering(self.cmd, &info) }
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.handle().cmd_end_rendering(self.cmd) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn per_frame_encoders_own_nothing() {
        assert!(!std::mem::needs_drop::<CommandEncoder<'static>>());
    }

    #[test]
    fn blit_spans_both_full_rectangles() {
        let blit = ImageBlit {
            src: vk::Image::from_raw(1),
            src_extent: vk::Extent2D { width: 1920, height: 1080 },
            dst: vk::Image::from_raw(2),
            dst_extent: vk::Extent2D { width: 1280, height: 720 },
        };
        let region = blit.to_vk();

        assert_eq!(region.src_offsets[0], vk::Offset3D::default());
        assert_eq!(region.src_offsets[1], vk::Offset3D { x: 1920, y: 1080, z: 1 });
        assert_eq!(region.dst_offsets[1], vk::Offset3D { x: 1280, y: 720, z: 1 });
        assert_eq!(region.src_subresource.mip_level, 0);
        assert_eq!(region.dst_subresource.layer_count, 1);
        assert_eq!(region.dst_subresource.aspect_mask, vk::ImageAspectFlags::COLOR);
    }
}
