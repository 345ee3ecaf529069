//! Test doubles for driving the frame orchestrator without a GPU.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lumen::rhi::vk::Handle;
use lumen::rhi::{
    vk, AcquireOutcome, ColorTarget, CommandRecorder, ImageBlit, LayoutTransition, PresentStatus, SwapchainError,
    TextureLayout, TrackedImage,
};
use lumen::{ComputeBinding, FrameBackend, FrameRecording, UiRenderer};

pub const DRAW_TARGET: u64 = 1;
pub const PIPELINE: u64 = 2;
pub const PIPELINE_LAYOUT: u64 = 3;
pub const DESCRIPTOR_SET: u64 = 4;
pub const FIRST_SWAPCHAIN_IMAGE: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin(vk::CommandBufferUsageFlags),
    End,
    Transition { image: vk::Image, from: TextureLayout, to: TextureLayout },
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    BindSets(vk::PipelineLayout, u32, Vec<vk::DescriptorSet>),
    PushConstants { stages: vk::ShaderStageFlags, offset: u32, bytes: Vec<u8> },
    Dispatch([u32; 3]),
    Blit(ImageBlit),
    BeginRendering(ColorTarget),
    EndRendering,
    Ui { draw_data: String, extent: vk::Extent2D },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Wait(usize),
    Reset(usize),
    Acquire(usize),
    Rearm(usize),
    BeginRecord { slot: usize, image_index: u32 },
    Cmd { slot: usize, command: Command },
    Submit(usize),
    Present { slot: usize, image_index: u32 },
    Rebuild(vk::Extent2D),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Captures every recorded command into the shared log.
pub struct RecordingEncoder {
    log: EventLog,
    slot: usize,
    cmd: vk::CommandBuffer,
}

impl RecordingEncoder {
    fn push(&self, command: Command) {
        self.log.borrow_mut().push(Event::Cmd { slot: self.slot, command });
    }
}

impl CommandRecorder for RecordingEncoder {
    fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<(), vk::Result> {
        self.push(Command::Begin(flags));
        Ok(())
    }

    fn end(&mut self) -> Result<(), vk::Result> {
        self.push(Command::End);
        Ok(())
    }

    fn transition_image(&mut self, transition: &LayoutTransition) {
        self.push(Command::Transition {
            image: transition.image,
            from: transition.old_layout,
            to: transition.new_layout,
        });
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(Command::BindPipeline(bind_point, pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.push(Command::BindSets(layout, first_set, descriptor_sets.to_vec()));
    }

    fn push_constants(&mut self, _layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, bytes: &[u8]) {
        self.push(Command::PushConstants {
            stages,
            offset,
            bytes: bytes.to_vec(),
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch([x, y, z]));
    }

    fn blit_image(&mut self, blit: &ImageBlit) {
        self.push(Command::Blit(*blit));
    }

    fn begin_rendering(&mut self, target: &ColorTarget) {
        self.push(Command::BeginRendering(*target));
    }

    fn end_rendering(&mut self) {
        self.push(Command::EndRendering);
    }
}

/// Overlay that logs what it was asked to draw, optionally failing.
pub struct RecordingOverlay {
    pub log: EventLog,
    pub fail: bool,
}

impl UiRenderer for RecordingOverlay {
    type DrawData = str;

    fn render(&mut self, draw_data: &str, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) -> anyhow::Result<()> {
        let slot = (command_buffer.as_raw() - 1) as usize;
        self.log.borrow_mut().push(Event::Cmd {
            slot,
            command: Command::Ui {
                draw_data: draw_data.to_owned(),
                extent,
            },
        });
        if self.fail {
            anyhow::bail!("overlay exploded");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    /// Work that will signal the fence is queued.
    Pending,
    /// Reset with nothing queued; waiting now would hang forever.
    Unsignaled,
}

/// Fake GPU that enforces the fence protocol of the frame ring.
pub struct ScriptedBackend {
    pub log: EventLog,
    pub window_extent: vk::Extent2D,
    pub draw_target: TrackedImage,
    pub draw_extent: vk::Extent2D,
    pub swapchain_images: Vec<TrackedImage>,
    pub swapchain_extent: vk::Extent2D,
    pub acquire_script: VecDeque<Result<AcquireOutcome, vk::Result>>,
    pub present_script: VecDeque<Result<PresentStatus, vk::Result>>,
    pub wait_script: VecDeque<Result<(), vk::Result>>,
    /// Collapse the window to zero size while presenting, as a minimise would.
    pub minimise_on_present: bool,
    /// Surface reports a 0x0 extent, so rebuilds fail negotiation while the window still has an area.
    pub surface_collapsed: bool,
    fences: Vec<FenceState>,
    /// Whether the slot's fence was seen signaled since its last submission.
    observed_complete: Vec<bool>,
    next_image: u32,
    rebuild_generation: u64,
}

impl ScriptedBackend {
    pub fn new(ring_size: usize, extent: vk::Extent2D) -> Self {
        Self {
            log: EventLog::default(),
            window_extent: extent,
            draw_target: TrackedImage::new(vk::Image::from_raw(DRAW_TARGET), TextureLayout::General),
            draw_extent: extent,
            swapchain_images: Self::images(0),
            swapchain_extent: extent,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            wait_script: VecDeque::new(),
            minimise_on_present: false,
            surface_collapsed: false,
            fences: vec![FenceState::Signaled; ring_size],
            observed_complete: vec![true; ring_size],
            next_image: 0,
            rebuild_generation: 0,
        }
    }

    fn images(generation: u64) -> Vec<TrackedImage> {
        (0..3)
            .map(|i| {
                TrackedImage::new(
                    vk::Image::from_raw(FIRST_SWAPCHAIN_IMAGE + generation * 10 + i),
                    TextureLayout::Undefined,
                )
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn commands(&self) -> Vec<Command> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Cmd { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn rebuild_count(&self) -> usize {
        self.log.borrow().iter().filter(|e| matches!(e, Event::Rebuild(_))).count()
    }

    pub fn submitted_slots(&self) -> Vec<usize> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect()
    }

    pub fn overlay(&self) -> RecordingOverlay {
        RecordingOverlay {
            log: self.log.clone(),
            fail: false,
        }
    }
}

impl FrameBackend for ScriptedBackend {
    type Recorder<'a> = RecordingEncoder;

    fn ring_size(&self) -> usize {
        self.fences.len()
    }

    fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.log.borrow_mut().push(Event::Wait(slot));
        if let Some(result) = self.wait_script.pop_front() {
            result?;
        }
        match self.fences[slot] {
            FenceState::Unsignaled => panic!("slot {slot} waited on a fence nothing will signal"),
            FenceState::Pending | FenceState::Signaled => {
                self.fences[slot] = FenceState::Signaled;
                self.observed_complete[slot] = true;
            }
        }
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.log.borrow_mut().push(Event::Reset(slot));
        assert_eq!(self.fences[slot], FenceState::Signaled, "slot {slot} reset while in flight");
        self.fences[slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, vk::Result> {
        self.log.borrow_mut().push(Event::Acquire(slot));
        if let Some(scripted) = self.acquire_script.pop_front() {
            return scripted;
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.swapchain_images.len() as u32;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn rearm_slot(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.log.borrow_mut().push(Event::Rearm(slot));
        self.fences[slot] = FenceState::Pending;
        Ok(())
    }

    fn begin_record(
        &mut self,
        slot: usize,
        image_index: u32,
    ) -> Result<FrameRecording<'_, RecordingEncoder>, vk::Result> {
        assert!(self.observed_complete[slot], "slot {slot} re-recorded before its fence was observed");
        self.log.borrow_mut().push(Event::BeginRecord { slot, image_index });

        let present_target = self
            .swapchain_images
            .get_mut(image_index as usize)
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)?;

        Ok(FrameRecording {
            recorder: RecordingEncoder {
                log: self.log.clone(),
                slot,
                cmd: vk::CommandBuffer::from_raw(slot as u64 + 1),
            },
            draw_target: &mut self.draw_target,
            draw_extent: self.draw_extent,
            present_target,
            present_view: vk::ImageView::from_raw(200 + image_index as u64),
            present_extent: self.swapchain_extent,
            compute: ComputeBinding {
                pipeline: vk::Pipeline::from_raw(PIPELINE),
                layout: vk::PipelineLayout::from_raw(PIPELINE_LAYOUT),
                descriptor_set: vk::DescriptorSet::from_raw(DESCRIPTOR_SET),
            },
        })
    }

    fn submit(&mut self, slot: usize) -> Result<(), vk::Result> {
        self.log.borrow_mut().push(Event::Submit(slot));
        self.fences[slot] = FenceState::Pending;
        self.observed_complete[slot] = false;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus, vk::Result> {
        self.log.borrow_mut().push(Event::Present { slot, image_index });
        if self.minimise_on_present {
            self.window_extent = vk::Extent2D::default();
        }
        self.present_script.pop_front().unwrap_or(Ok(PresentStatus::Optimal))
    }

    fn rebuild_swapchain(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        if extent.width == 0 || extent.height == 0 {
            return Err(SwapchainError::ZeroExtent(extent));
        }
        if self.surface_collapsed {
            return Err(SwapchainError::ZeroExtent(vk::Extent2D::default()));
        }
        self.log.borrow_mut().push(Event::Rebuild(extent));
        self.rebuild_generation += 1;
        self.swapchain_images = Self::images(self.rebuild_generation);
        self.swapchain_extent = extent;
        self.next_image = 0;
        Ok(())
    }
}
