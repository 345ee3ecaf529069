//! Per-frame protocol: wait, reset, acquire, record, submit, present, advance.

use std::fmt;

use lumen_core::log::{debug, info};
use lumen_rhi::{
    vk, AcquireOutcome, ColorTarget, CommandRecorder, ImageBlit, PresentStatus, SwapchainError, TextureLayout,
    TrackedImage,
};
use crate::config::WORKGROUP_SIZE;
use crate::frame::slot_for_frame;
use crate::overlay::UiRenderer;
use crate::push_constants::ComputePushConstants;

/// Workgroups needed to cover `extent` with `workgroup_size`×`workgroup_size` tiles.
pub fn dispatch_group_counts(extent: vk::Extent2D, workgroup_size: u32) -> [u32; 3] {
    [
        extent.width.div_ceil(workgroup_size),
        extent.height.div_ceil(workgroup_size),
        1,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Wait,
    Reset,
    Acquire,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStep::Wait => "wait",
            FrameStep::Reset => "reset",
            FrameStep::Acquire => "acquire",
            FrameStep::Record => "record",
            FrameStep::Submit => "submit",
            FrameStep::Present => "present",
        };
        f.write_str(name)
    }
}

/// Unrecoverable failure inside the frame loop.
#[derive(Debug)]
pub enum FrameError {
    Device { step: FrameStep, result: vk::Result },
    /// The slot's fence did not signal within the configured timeout.
    FenceTimeout { slot: usize },
    Swapchain(SwapchainError),
    Overlay(anyhow::Error),
}

impl FrameError {
    fn at(step: FrameStep) -> impl FnOnce(vk::Result) -> FrameError {
        move |result| FrameError::Device { step, result }
    }
}

impl From<SwapchainError> for FrameError {
    fn from(e: SwapchainError) -> Self {
        FrameError::Swapchain(e)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Device { step, result } => write!(f, "Frame {} failed: {:?}", step, result),
            FrameError::FenceTimeout { slot } => write!(f, "Timed out waiting for frame slot {}", slot),
            FrameError::Swapchain(e) => write!(f, "Swapchain rebuild failed: {}", e),
            FrameError::Overlay(e) => write!(f, "UI overlay failed: {:#}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Device { result, .. } => Some(result),
            FrameError::Swapchain(e) => Some(e),
            FrameError::Overlay(e) => Some(&**e),
            FrameError::FenceTimeout { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The window has no area (minimised).
    ZeroExtent,
    /// Acquire reported the swapchain out of date; nothing was submitted.
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, and the swapchain was rebuilt during this call.
    PresentedAndRebuilt,
    Skipped(SkipReason),
}

/// Compute pipeline state bound for the background pass.
#[derive(Debug, Clone, Copy)]
pub struct ComputeBinding {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
}

/// Everything one frame records against, borrowed from the backend for the Record step.
pub struct FrameRecording<'a, R> {
    pub recorder: R,
    pub draw_target: &'a mut TrackedImage,
    pub draw_extent: vk::Extent2D,
    pub present_target: &'a mut TrackedImage,
    pub present_view: vk::ImageView,
    pub present_extent: vk::Extent2D,
    pub compute: ComputeBinding,
}

/// GPU-facing operations of one frame, indexed by ring slot.
pub trait FrameBackend {
    type Recorder<'a>: CommandRecorder
    where
        Self: 'a;

    fn ring_size(&self) -> usize;

    /// Current drawable size of the window; zero while minimised.
    fn window_extent(&self) -> vk::Extent2D;

    /// Block until the slot's fence is signaled. Expiry is `vk::Result::TIMEOUT`.
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), vk::Result>;

    /// Unsignal the slot's fence and reset its command buffer.
    fn reset_slot(&mut self, slot: usize) -> Result<(), vk::Result>;

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, vk::Result>;

    /// Signal the slot's fence again without recording anything.
    fn rearm_slot(&mut self, slot: usize) -> Result<(), vk::Result>;

    fn begin_record(
        &mut self,
        slot: usize,
        image_index: u32,
    ) -> Result<FrameRecording<'_, Self::Recorder<'_>>, vk::Result>;

    fn submit(&mut self, slot: usize) -> Result<(), vk::Result>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus, vk::Result>;

    /// Replace the swapchain. The backend makes sure no submitted work still uses the old images.
    fn rebuild_swapchain(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError>;
}

/// Record the background compute pass, the blit to the swapchain image and the UI pass.
#[profiling::function]
pub fn record_frame<R, U>(
    frame: &mut FrameRecording<'_, R>,
    push_constants: &ComputePushConstants,
    ui: &mut U,
    draw_data: &U::DrawData,
) -> Result<(), FrameError>
where
    R: CommandRecorder,
    U: UiRenderer + ?Sized,
{
    let cmd = &mut frame.recorder;
    cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).map_err(FrameError::at(FrameStep::Record))?;

    // The previous frame's contents are overwritten, so they may be discarded.
    cmd.transition_image(&frame.draw_target.transition(TextureLayout::Undefined, TextureLayout::General));

    let compute = frame.compute;
    cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, compute.pipeline);
    cmd.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, compute.layout, 0, &[compute.descriptor_set]);
    cmd.push_constants(compute.layout, vk::ShaderStageFlags::COMPUTE, 0, push_constants.as_bytes());
    let [x, y, z] = dispatch_group_counts(frame.draw_extent, WORKGROUP_SIZE);
    cmd.dispatch(x, y, z);

    cmd.transition_image(&frame.draw_target.transition(TextureLayout::General, TextureLayout::TransferSrc));
    cmd.transition_image(&frame.present_target.transition(TextureLayout::Undefined, TextureLayout::TransferDst));
    cmd.blit_image(&ImageBlit {
        src: frame.draw_target.handle(),
        src_extent: frame.draw_extent,
        dst: frame.present_target.handle(),
        dst_extent: frame.present_extent,
    });

    cmd.transition_image(&frame.present_target.transition(TextureLayout::TransferDst, TextureLayout::Color));
    cmd.begin_rendering(&ColorTarget {
        view: frame.present_view,
        layout: TextureLayout::Color.to_vk(),
        extent: frame.present_extent,
    });
    let ui_result = ui.render(draw_data, cmd.handle(), frame.present_extent);
    cmd.end_rendering();
    ui_result.map_err(FrameError::Overlay)?;

    cmd.transition_image(&frame.present_target.transition(TextureLayout::Color, TextureLayout::Present));
    cmd.end().map_err(FrameError::at(FrameStep::Record))
}

fn is_empty(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Drives frames through a [`FrameBackend`] and owns the frame counter.
#[derive(Debug, Default)]
pub struct FrameOrchestrator {
    frame_number: u64,
    rebuild_pending: bool,
}

impl FrameOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented so far. Never resets.
    #[inline]
    pub fn frame_number(&self) -> u64 { self.frame_number }

    #[inline]
    pub fn rebuild_pending(&self) -> bool { self.rebuild_pending }

    /// Rebuild the swapchain before the next frame, e.g. after a window resize.
    pub fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    /// Run one frame. Transient swapchain conditions are handled here; everything
    /// returned as `Err` is fatal.
    #[profiling::function]
    pub fn draw<B, U>(
        &mut self,
        backend: &mut B,
        push_constants: &ComputePushConstants,
        ui: &mut U,
        draw_data: &U::DrawData,
    ) -> Result<FrameOutcome, FrameError>
    where
        B: FrameBackend,
        U: UiRenderer + ?Sized,
    {
        let extent = backend.window_extent();
        if is_empty(extent) {
            return Ok(FrameOutcome::Skipped(SkipReason::ZeroExtent));
        }

        let mut rebuilt = false;
        if self.rebuild_pending {
            if !self.rebuild(backend, extent)? {
                return Ok(FrameOutcome::Skipped(SkipReason::ZeroExtent));
            }
            rebuilt = true;
        }

        let slot = slot_for_frame(self.frame_number, backend.ring_size());

        backend.wait_for_slot(slot).map_err(|result| match result {
            vk::Result::TIMEOUT => FrameError::FenceTimeout { slot },
            result => FrameError::Device { step: FrameStep::Wait, result },
        })?;
        backend.reset_slot(slot).map_err(FrameError::at(FrameStep::Reset))?;

        let (image_index, acquired_suboptimal) =
            match backend.acquire_image(slot).map_err(FrameError::at(FrameStep::Acquire))? {
                AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
                AcquireOutcome::OutOfDate => {
                    debug!("Swapchain out of date at acquire, skipping frame {}", self.frame_number);
                    backend.rearm_slot(slot).map_err(FrameError::at(FrameStep::Acquire))?;
                    self.rebuild_or_defer(backend)?;
                    return Ok(FrameOutcome::Skipped(SkipReason::OutOfDate));
                }
            };

        {
            let mut recording = backend.begin_record(slot, image_index).map_err(FrameError::at(FrameStep::Record))?;
            record_frame(&mut recording, push_constants, ui, draw_data)?;
        }

        backend.submit(slot).map_err(FrameError::at(FrameStep::Submit))?;

        let status = backend.present(slot, image_index).map_err(FrameError::at(FrameStep::Present))?;
        if status.needs_rebuild() || acquired_suboptimal {
            debug!("Present reported {:?}", status);
            rebuilt |= self.rebuild_or_defer(backend)?;
        }

        self.frame_number += 1;
        Ok(if rebuilt { FrameOutcome::PresentedAndRebuilt } else { FrameOutcome::Presented })
    }

    /// Returns `false` if the surface has no area yet; the rebuild then stays pending.
    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B, extent: vk::Extent2D) -> Result<bool, FrameError> {
        info!("Rebuilding swapchain at {}x{}", extent.width, extent.height);
        match backend.rebuild_swapchain(extent) {
            Ok(()) => {
                self.rebuild_pending = false;
                Ok(true)
            }
            Err(SwapchainError::ZeroExtent(surface)) => {
                debug!("Surface is {}x{}, deferring swapchain rebuild", surface.width, surface.height);
                self.rebuild_pending = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild at the current window size, or remember to once the window has an area again.
    fn rebuild_or_defer<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool, FrameError> {
        let extent = backend.window_extent();
        if is_empty(extent) {
            self.rebuild_pending = true;
            return Ok(false);
        }
        self.rebuild(backend, extent)
    }
}
