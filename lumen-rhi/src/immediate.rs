use std::time::Duration;

use ash::vk;
use crate::device::set_debug_name_handle;
use crate::{CommandEncoder, CommandPool, CommandRecorder, Fence, Queue, RenderDevice};

/// One-shot submission path for setup and upload work, separate from the frame ring.
///
/// Owns its own pool, command buffer and fence, and blocks the caller until the GPU
/// has finished the recorded commands.
pub struct ImmediateSubmit {
    queue: Queue,
    command_buffer: vk::CommandBuffer,
    pool: CommandPool,
    fence: Fence,
    timeout: Option<Duration>,
}

impl ImmediateSubmit {
    pub fn new(device: &RenderDevice, queue: Queue) -> Result<Self, vk::Result> {
        let pool = CommandPool::new("command_pool.immediate", device, queue.family_index())?;
        let command_buffer = pool.allocate_primary()?;
        set_debug_name_handle(device, command_buffer, "command_buffer.immediate");
        let fence = Fence::new("fence.immediate", device, true)?;

        Ok(Self {
            queue,
            command_buffer,
            pool,
            fence,
            timeout: None,
        })
    }

    /// Bound the wait for completion; expiry is reported as `vk::Result::TIMEOUT`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record commands with `record`, submit them, and wait until the GPU finishes.
    #[profiling::function]
    pub fn submit<F>(&self, device: &RenderDevice, record: F) -> Result<(), vk::Result>
    where
        F: FnOnce(&mut CommandEncoder),
    {
        self.fence.reset()?;
        self.pool.reset_buffer(self.command_buffer)?;

        let mut encoder = CommandEncoder::new(device, self.command_buffer);
        encoder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut encoder);
        encoder.end()?;

        device.submit_commands(self.queue, self.command_buffer, &[], &[], Some(&self.fence))?;
        self.fence.wait(self.timeout)
    }

    pub fn pool(&self) -> &CommandPool { &self.pool }

    pub fn command_buffer(&self) -> vk::CommandBuffer { self.command_buffer }

    pub fn fence(&self) -> &Fence { &self.fence }

    pub fn queue(&self) -> Queue { self.queue }
}
