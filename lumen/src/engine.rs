use std::sync::Arc;

use winit::window::Window;
use lumen_rhi::{upload_buffer, vk, BufferRef, DeletionStack, RhiError};
use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::draw::{FrameError, FrameOrchestrator, FrameOutcome};
use crate::overlay::{UiBackendInfo, UiRenderer};
use crate::push_constants::ComputePushConstants;

pub struct Engine {
    /// Released after the device is idle and before `context`.
    deletion: DeletionStack,
    orchestrator: FrameOrchestrator,
    context: RenderContext,
    pub main_window: Arc<Window>,

    should_exit: bool,
}

impl Engine {
    pub fn new(main_window: Arc<Window>, config: &EngineConfig) -> Result<Self, anyhow::Error> {
        let context = RenderContext::new(main_window.as_ref(), config)?;

        Ok(Self {
            deletion: DeletionStack::new(),
            orchestrator: FrameOrchestrator::new(),
            context,
            main_window,
            should_exit: false,
        })
    }

    /// Draw and present one frame.
    #[profiling::function]
    pub fn draw<U: UiRenderer + ?Sized>(
        &mut self,
        push_constants: &ComputePushConstants,
        ui: &mut U,
        draw_data: &U::DrawData,
    ) -> Result<FrameOutcome, FrameError> {
        let size = self.main_window.inner_size();
        self.context.set_window_extent(vk::Extent2D {
            width: size.width,
            height: size.height,
        });
        self.orchestrator.draw(&mut self.context, push_constants, ui, draw_data)
    }

    /// Schedule a swapchain rebuild for the next frame.
    #[profiling::function]
    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.set_window_extent(vk::Extent2D { width, height });
        self.orchestrator.request_rebuild();
    }

    /// Run `deleter` at shutdown, once the GPU is idle, before the engine's own resources go.
    pub fn defer_destroy(&mut self, label: impl Into<String>, deleter: impl FnOnce() + 'static) {
        self.deletion.push(label, deleter);
    }

    /// Copy `data` into a new device-local buffer. Blocks until the copy has finished.
    ///
    /// The engine keeps the buffer until shutdown and releases it before the device.
    pub fn upload(&mut self, name: &str, data: &[u8], usage: vk::BufferUsageFlags) -> Result<BufferRef, RhiError> {
        let context = &self.context;
        let buffer = upload_buffer(context.device(), context.allocator(), context.immediate(), name, data, usage)?;
        let buffer_ref = buffer.to_ref();
        self.deletion.push_owned(name, buffer);
        Ok(buffer_ref)
    }

    pub fn ui_backend_info(&self) -> UiBackendInfo {
        self.context.ui_backend_info()
    }

    #[inline]
    pub fn context(&self) -> &RenderContext { &self.context }

    #[inline]
    pub fn frame_number(&self) -> u64 { self.orchestrator.frame_number() }

    #[inline]
    pub fn request_exit(&mut self) { self.should_exit = true; }

    #[inline]
    pub fn should_exit(&self) -> bool { self.should_exit }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // A lost device still gets its resources released.
        let _ = self.context.device().wait_until_idle();
        self.deletion.flush();
    }
}
