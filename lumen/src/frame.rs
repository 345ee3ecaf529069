use lumen_rhi::device::set_debug_name_handle;
use lumen_rhi::{vk, CommandPool, Fence, Queue, RenderDevice, Semaphore};

/// Recording and synchronization resources for one in-flight frame.
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub pool: CommandPool,
    /// Signaled by the presentation engine once the acquired image may be written.
    pub image_acquired: Semaphore,
    /// Signaled by the queue when the frame's commands are done; present waits on it.
    pub render_complete: Semaphore,
    /// Signaled when the GPU finished this slot's last submission.
    pub frame_done: Fence,
}

impl FrameSlot {
    pub fn new(device: &RenderDevice, queue: Queue, index: usize) -> Result<Self, vk::Result> {
        let pool = CommandPool::new(&format!("frame{index}.command_pool"), device, queue.family_index())?;
        let command_buffer = pool.allocate_primary()?;
        set_debug_name_handle(device, command_buffer, &format!("frame{index}.command_buffer"));

        Ok(Self {
            command_buffer,
            pool,
            image_acquired: Semaphore::new(&format!("frame{index}.image_acquired"), device)?,
            render_complete: Semaphore::new(&format!("frame{index}.render_complete"), device)?,
            // Created signaled so the first wait on every slot returns immediately.
            frame_done: Fence::new(&format!("frame{index}.frame_done"), device, true)?,
        })
    }
}

/// Fixed ring of frame slots, selected by frame number modulo the ring size.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    pub fn new(device: &RenderDevice, queue: Queue, size: usize) -> Result<Self, vk::Result> {
        let slots = (0..size)
            .map(|index| FrameSlot::new(device, queue, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { slots })
    }

    #[inline]
    pub fn len(&self) -> usize { self.slots.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }
}

/// Slot used by frame `frame_number` in a ring of `ring_size`.
#[inline]
pub fn slot_for_frame(frame_number: u64, ring_size: usize) -> usize {
    (frame_number % ring_size as u64) as usize
}
