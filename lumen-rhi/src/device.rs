//! Vulkan Device - logical device, queue and submission helpers.

use crate::core::PhysicalDevice;
use crate::queue::Queue;
use crate::synchronization::{Fence, Semaphore};
use ash::{vk, Device, Instance};
use smallvec::SmallVec;

fn get_required_device_extensions() -> [*const std::ffi::c_char; 1] {
    [ash::khr::swapchain::NAME.as_ptr()]
}

/// Semaphore operation attached to a queue submission.
#[derive(Clone, Copy)]
pub struct SemaphoreStage<'a> {
    pub semaphore: &'a Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

impl<'a> SemaphoreStage<'a> {
    pub fn new(semaphore: &'a Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self { semaphore, stage }
    }
}

/// Vulkan logical device with its single graphics queue.
pub struct RenderDevice {
    parent_physical_device: PhysicalDevice,
    device: Device,
    graphics_queue: vk::Queue,

    #[cfg(feature = "validation")]
    debug_utils: ash::ext::debug_utils::Device,
}

impl RenderDevice {
    /// Create a logical device with dynamic rendering, synchronization2,
    /// buffer device address and descriptor indexing enabled.
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDevice,
    ) -> Result<Self, vk::Result> {
        let queue_priority = 1.0f32;
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.graphics_queue_family())
            .queue_priorities(std::slice::from_ref(&queue_priority));

        let extensions = get_required_device_extensions();

        let mut vulkan_12_features = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);

        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut vulkan_12_features)
            .push_next(&mut vulkan_13_features);

        let device = unsafe { instance.create_device(physical_device.handle(), &create_info, None)? };
        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_queue_family(), 0) };

        Ok(Self {
            parent_physical_device: physical_device.clone(),
            #[cfg(feature = "validation")]
            debug_utils: ash::ext::debug_utils::Device::new(instance, &device),
            device,
            graphics_queue,
        })
    }

    /// Get a reference to the logical device.
    #[inline]
    pub fn handle(&self) -> &Device {
        &self.device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        self.parent_physical_device.properties()
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        self.parent_physical_device.memory_properties()
    }

    pub fn graphics_queue(&self) -> Queue {
        Queue::new(self.graphics_queue, self.parent_physical_device.graphics_queue_family())
    }

    pub fn wait_until_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }

    pub fn parent_physical_device(&self) -> &PhysicalDevice {
        &self.parent_physical_device
    }

    /// Submit one command buffer with synchronization2 semaphore stages.
    pub fn submit_commands(
        &self,
        queue: Queue,
        command_buffer: vk::CommandBuffer,
        wait: &[SemaphoreStage<'_>],
        signal: &[SemaphoreStage<'_>],
        fence: Option<&Fence>,
    ) -> Result<(), vk::Result> {
        let command_submit_info = vk::CommandBufferSubmitInfo::default()
            .command_buffer(command_buffer);

        let to_submit_info = |op: &SemaphoreStage<'_>| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(op.semaphore.handle())
                .stage_mask(op.stage)
        };
        let wait_semaphore_infos = wait.iter()
            .map(to_submit_info)
            .collect::<SmallVec<[vk::SemaphoreSubmitInfo; 4]>>();
        let signal_semaphore_infos = signal.iter()
            .map(to_submit_info)
            .collect::<SmallVec<[vk::SemaphoreSubmitInfo; 4]>>();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(std::slice::from_ref(&command_submit_info))
            .wait_semaphore_infos(&wait_semaphore_infos)
            .signal_semaphore_infos(&signal_semaphore_infos);

        let fence = fence.map_or(vk::Fence::null(), Fence::handle);
        unsafe { self.device.queue_submit2(queue.handle(), &[submit_info], fence) }
    }

    /// Signal `fence` once all work already submitted to `queue` has finished.
    pub fn signal_after_pending_work(&self, queue: Queue, fence: &Fence) -> Result<(), vk::Result> {
        unsafe { self.device.queue_submit2(queue.handle(), &[], fence.handle()) }
    }

    #[inline]
    pub fn set_debug_name<T: DebuggableObject>(&self, object: &T) {
        object.set_debug_name(self);
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            // Nothing useful can be done with a lost device at this point.
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Attach a debug label to a raw handle. No-op without the `validation` feature.
#[allow(unused_variables)]
pub fn set_debug_name_handle<H: vk::Handle>(device: &RenderDevice, handle: H, name: &str) {
    #[cfg(feature = "validation")]
    {
        let Ok(name) = std::ffi::CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            let _ = device.debug_utils.set_debug_utils_object_name(&info);
        }
    }
}

/// Objects that can label their Vulkan handle for debuggers and validation messages.
pub trait DebuggableObject {
    fn set_debug_name(&self, device: &RenderDevice);
}

#[allow(dead_code)]
pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Crate-only trait for objects that own an `ash::Device` used for destruction and device calls.
#[allow(dead_code)]
pub(crate) trait DeviceObject: sealed::Sealed {
    fn device(&self) -> &Device;
}
