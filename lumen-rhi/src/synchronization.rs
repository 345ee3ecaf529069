use std::time::Duration;

use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::RenderDevice;
use crate::device::{set_debug_name_handle, DebuggableObject};

/// Converts an optional timeout into the nanosecond form Vulkan waits take.
pub fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
}

/// Owned GPU-to-CPU fence.
#[DeviceObject]
pub struct Fence {
    name: String,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(name: &str, device: &RenderDevice, signaled: bool) -> Result<Self, vk::Result> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        let fence = Self {
            name: name.to_owned(),
            fence,
            device: device.handle().clone(),
        };
        device.set_debug_name(&fence);
        Ok(fence)
    }

    /// Block until the fence is signaled. Returns `vk::Result::TIMEOUT` if `timeout` elapses first.
    #[profiling::function]
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), vk::Result> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_nanos(timeout)) }
    }

    pub fn reset(&self) -> Result<(), vk::Result> {
        unsafe { self.device.reset_fences(&[self.fence]) }
    }

    pub fn is_signaled(&self) -> Result<bool, vk::Result> {
        unsafe { self.device.get_fence_status(self.fence) }
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl DebuggableObject for Fence {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.fence, self.name());
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Owned binary semaphore for GPU-to-GPU ordering.
#[DeviceObject]
pub struct Semaphore {
    name: String,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(name: &str, device: &RenderDevice) -> Result<Self, vk::Result> {
        let semaphore = unsafe {
            device.handle().create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };

        let semaphore = Self {
            name: name.to_owned(),
            semaphore,
            device: device.handle().clone(),
        };
        device.set_debug_name(&semaphore);
        Ok(semaphore)
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl DebuggableObject for Semaphore {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.semaphore, self.name());
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_timeout_waits_forever() {
        assert_eq!(timeout_nanos(None), u64::MAX);
    }

    #[test]
    fn timeout_is_converted_to_nanoseconds() {
        assert_eq!(timeout_nanos(Some(Duration::from_millis(3))), 3_000_000);
        assert_eq!(timeout_nanos(Some(Duration::MAX)), u64::MAX);
    }
}
