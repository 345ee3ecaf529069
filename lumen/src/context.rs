use std::time::Duration;

use anyhow::Context;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use lumen_core::log::info;
use lumen_rhi::{
    select_physical_device, vk, AcquireOutcome, CommandEncoder, CommandRecorder, ComputePipeline, DescriptorAllocator,
    DescriptorSetLayout, DescriptorWriter, ImmediateSubmit, LayoutBinding, PoolSizeRatio, PresentStatus, Queue,
    RenderDevice, ResourceAllocator, RhiCore, SemaphoreStage, Shader, ShaderStage, SurfaceSwapchainDevice,
    SurfaceWindow, Swapchain, SwapchainError, Texture, TextureDesc, TextureLayout, NUM_BACK_BUFFERS,
};
use crate::config::{EngineConfig, DRAW_DESCRIPTOR_MAX_SETS};
use crate::draw::{ComputeBinding, FrameBackend, FrameRecording};
use crate::frame::FrameRing;
use crate::overlay::{create_ui_descriptor_pool, UiBackendInfo};
use crate::push_constants::ComputePushConstants;

const DRAW_IMAGE_BINDING: u32 = 0;

/// Every GPU object the engine owns.
///
/// Fields drop top to bottom, which is the reverse of the order [`RenderContext::new`] creates them in.
pub struct RenderContext {
    frames: FrameRing,
    ui_descriptor_pool: DescriptorAllocator,
    compute_pipeline: ComputePipeline,
    draw_descriptor_set: vk::DescriptorSet,
    draw_descriptor_pool: DescriptorAllocator,
    draw_set_layout: DescriptorSetLayout,
    draw_target: Texture,
    immediate: ImmediateSubmit,
    allocator: ResourceAllocator,
    swapchain: Swapchain,
    queue: Queue,
    device: RenderDevice,
    core: RhiCore,

    window_extent: vk::Extent2D,
    fence_timeout: Option<Duration>,
}

impl RenderContext {
    #[profiling::function]
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &EngineConfig) -> anyhow::Result<Self> {
        let display_handle = window.display_handle().context("Window has no display handle")?.as_raw();
        let core = RhiCore::new(display_handle)?;
        let surface = SurfaceWindow::new(window, &core)?;
        let physical_device = select_physical_device(core.instance(), Some(&surface))?;
        let device = core
            .create_render_device(&physical_device)
            .context("Failed to create the logical device")?;
        let queue = device.graphics_queue();

        let swapchain = Swapchain::new(
            "swapchain.main",
            SurfaceSwapchainDevice::new(&core, &device, surface),
            config.swapchain,
            config.extent,
        )
        .context("Failed to create the swapchain")?;

        let allocator = ResourceAllocator::new(&core, &device).context("Failed to create the memory allocator")?;
        let immediate = ImmediateSubmit::new(&device, queue)
            .context("Failed to create the immediate submit context")?
            .with_timeout(config.fence_timeout);

        let mut draw_target = allocator
            .create_texture(
                &device,
                &TextureDesc::new_storage_target("draw_target", config.extent, config.draw_format),
            )
            .context("Failed to create the draw target")?;
        clear_draw_target(&device, &immediate, &mut draw_target)?;

        let draw_set_layout = DescriptorSetLayout::new(
            "draw_target.set_layout",
            &device,
            &[LayoutBinding::new(DRAW_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE)],
        )?;
        let draw_descriptor_pool = DescriptorAllocator::init_pool(
            "descriptor_pool.draw",
            &device,
            DRAW_DESCRIPTOR_MAX_SETS,
            &[PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)],
        )?;
        let draw_descriptor_set = draw_descriptor_pool
            .allocate(&draw_set_layout)
            .context("Failed to allocate the draw target descriptor set")?;
        DescriptorWriter::new(&draw_set_layout)
            .write_storage_image(DRAW_IMAGE_BINDING, draw_target.view(), vk::ImageLayout::GENERAL)?
            .update_set(&device, draw_descriptor_set);

        let compute_pipeline = {
            // The module is only needed while the pipeline is created.
            let shader = Shader::from_file("gradient", &device, &config.shader_path, "main", ShaderStage::Compute)
                .with_context(|| format!("Failed to load compute shader {}", config.shader_path.display()))?;
            ComputePipeline::new("gradient", &device, &shader, &[&draw_set_layout], ComputePushConstants::SIZE)?
        };

        let ui_descriptor_pool = create_ui_descriptor_pool(&device).context("Failed to create the UI descriptor pool")?;
        let frames = FrameRing::new(&device, queue, config.frame_overlap).context("Failed to create frame slots")?;

        info!(
            "Render context ready: {} frame slots, {} swapchain images, draw target {}x{} {:?}",
            frames.len(),
            swapchain.images().len(),
            config.extent.width,
            config.extent.height,
            config.draw_format
        );

        Ok(Self {
            frames,
            ui_descriptor_pool,
            compute_pipeline,
            draw_descriptor_set,
            draw_descriptor_pool,
            draw_set_layout,
            draw_target,
            immediate,
            allocator,
            swapchain,
            queue,
            device,
            core,
            window_extent: config.extent,
            fence_timeout: config.fence_timeout,
        })
    }

    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    /// Handles an external UI renderer needs to initialise against this device.
    pub fn ui_backend_info(&self) -> UiBackendInfo {
        UiBackendInfo {
            instance: self.core.instance().handle(),
            physical_device: self.device.parent_physical_device().handle(),
            device: self.device.handle().handle(),
            queue: self.queue,
            descriptor_pool: self.ui_descriptor_pool.handle(),
            color_format: self.swapchain.format(),
            min_image_count: self.swapchain.desc().map_or(NUM_BACK_BUFFERS, |desc| desc.image_count),
            image_count: self.swapchain.images().len() as u32,
        }
    }

    #[inline]
    pub fn core(&self) -> &RhiCore { &self.core }

    #[inline]
    pub fn device(&self) -> &RenderDevice { &self.device }

    #[inline]
    pub fn queue(&self) -> Queue { self.queue }

    #[inline]
    pub fn allocator(&self) -> &ResourceAllocator { &self.allocator }

    #[inline]
    pub fn immediate(&self) -> &ImmediateSubmit { &self.immediate }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain { &self.swapchain }

    #[inline]
    pub fn draw_target(&self) -> &Texture { &self.draw_target }

    #[inline]
    pub fn frames(&self) -> &FrameRing { &self.frames }

    #[inline]
    pub fn draw_descriptor_pool(&self) -> &DescriptorAllocator { &self.draw_descriptor_pool }

    #[inline]
    pub fn draw_set_layout(&self) -> &DescriptorSetLayout { &self.draw_set_layout }
}

/// Start the draw target from a known color so the first blit never reads garbage.
fn clear_draw_target(device: &RenderDevice, immediate: &ImmediateSubmit, draw_target: &mut Texture) -> anyhow::Result<()> {
    let transition = draw_target.tracked_mut().transition(TextureLayout::Undefined, TextureLayout::General);
    immediate
        .submit(device, |encoder| {
            encoder.transition_image(&transition);
            encoder.clear_color_image(transition.image, vk::ImageLayout::GENERAL, [0.0, 0.0, 0.0, 1.0]);
        })
        .context("Failed to clear the draw target")
}

impl FrameBackend for RenderContext {
    type Recorder<'a> = CommandEncoder<'a>;

    fn ring_size(&self) -> usize {
        self.frames.len()
    }

    fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.frames.slot(slot).frame_done.wait(self.fence_timeout)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        let frame = self.frames.slot(slot);
        frame.frame_done.reset()?;
        frame.pool.reset_buffer(frame.command_buffer)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, vk::Result> {
        let frame = self.frames.slot(slot);
        self.swapchain.acquire_next_image(frame.image_acquired.handle(), self.fence_timeout)
    }

    fn rearm_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.device.signal_after_pending_work(self.queue, &self.frames.slot(slot).frame_done)
    }

    fn begin_record(
        &mut self,
        slot: usize,
        image_index: u32,
    ) -> Result<FrameRecording<'_, CommandEncoder<'_>>, vk::Result> {
        let present_extent = self.swapchain.extent();
        let present = self
            .swapchain
            .image_mut(image_index)
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)?;
        let draw_extent = self.draw_target.extent();

        Ok(FrameRecording {
            recorder: CommandEncoder::new(&self.device, self.frames.slot(slot).command_buffer),
            draw_target: self.draw_target.tracked_mut(),
            draw_extent,
            present_target: &mut present.tracked,
            present_view: present.view,
            present_extent,
            compute: ComputeBinding {
                pipeline: self.compute_pipeline.handle(),
                layout: self.compute_pipeline.layout(),
                descriptor_set: self.draw_descriptor_set,
            },
        })
    }

    fn submit(&mut self, slot: usize) -> Result<(), vk::Result> {
        let frame = self.frames.slot(slot);
        self.device.submit_commands(
            self.queue,
            frame.command_buffer,
            &[SemaphoreStage::new(&frame.image_acquired, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)],
            &[SemaphoreStage::new(&frame.render_complete, vk::PipelineStageFlags2::ALL_GRAPHICS)],
            Some(&frame.frame_done),
        )
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus, vk::Result> {
        let frame = self.frames.slot(slot);
        self.swapchain.present(self.queue, image_index, frame.render_complete.handle())
    }

    fn rebuild_swapchain(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        self.device.wait_until_idle()?;
        self.swapchain.create_swapchain(extent)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // Lost devices are torn down anyway.
        let _ = self.device.wait_until_idle();
    }
}
