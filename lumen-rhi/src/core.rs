//! Vulkan Core - instance creation and physical device selection.

use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use anyhow::{anyhow, Context};
use lumen_core::log;

use crate::device::RenderDevice;
use crate::swapchain::SurfaceWindow;

/// Validation layers to enable when the `validation` feature is on.
#[cfg(feature = "validation")]
const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

/// Scoring weights for physical device selection.
const SCORE_DISCRETE_GPU: u32 = 10000;
const SCORE_INTEGRATED_GPU: u32 = 1000;
const SCORE_VIRTUAL_GPU: u32 = 500;
const SCORE_CPU: u32 = 100;
const SCORE_PER_GB_VRAM: u32 = 100;
const SCORE_VULKAN_1_4: u32 = 600;
const SCORE_VULKAN_1_3: u32 = 400;

/// Lowest API version the engine runs on.
pub const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_3;

/// Device features the engine cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFeatureSupport {
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
}

impl DeviceFeatureSupport {
    pub const ALL: Self = Self {
        dynamic_rendering: true,
        synchronization2: true,
        buffer_device_address: true,
        descriptor_indexing: true,
    };

    /// Names of required features this device lacks.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.dynamic_rendering {
            missing.push("dynamicRendering");
        }
        if !self.synchronization2 {
            missing.push("synchronization2");
        }
        if !self.buffer_device_address {
            missing.push("bufferDeviceAddress");
        }
        if !self.descriptor_indexing {
            missing.push("descriptorIndexing");
        }
        missing
    }

    fn query(instance: &Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut features_12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features_12)
            .push_next(&mut features_13);

        unsafe { instance.get_physical_device_features2(physical_device, &mut features) };

        Self {
            dynamic_rendering: features_13.dynamic_rendering == vk::TRUE,
            synchronization2: features_13.synchronization2 == vk::TRUE,
            buffer_device_address: features_12.buffer_device_address == vk::TRUE,
            descriptor_indexing: features_12.descriptor_indexing == vk::TRUE,
        }
    }
}

#[derive(Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    name: String,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue_family: u32,
}

impl PhysicalDevice {
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Family of the single queue used for graphics, compute, transfer and present.
    pub fn graphics_queue_family(&self) -> u32 { self.graphics_queue_family }
}

/// Global entry point for Vulkan: loader, instance and the validation messenger.
pub struct RhiCore {
    entry: Entry,
    instance: Instance,

    #[cfg(feature = "validation")]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    #[cfg(feature = "validation")]
    debug_utils: Option<ash::ext::debug_utils::Instance>,
}

impl RhiCore {
    /// Create an instance able to present to windows on `display_handle`.
    #[profiling::function]
    pub fn new(display_handle: RawDisplayHandle) -> Result<Self, anyhow::Error> {
        let surface_extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("The windowing system has no Vulkan surface support")?;
        Self::with_extensions(surface_extensions)
    }

    /// Create an instance without any surface extension, for offscreen work and tests.
    pub fn new_headless() -> Result<Self, anyhow::Error> {
        Self::with_extensions(&[])
    }

    fn with_extensions(surface_extensions: &[*const c_char]) -> Result<Self, anyhow::Error> {
        let entry = unsafe { Entry::load().context("Failed to load the Vulkan loader")? };

        let instance = create_instance(&entry, surface_extensions)
            .context("Failed to create a Vulkan 1.3 instance")?;

        #[cfg(feature = "validation")]
        let (debug_utils, debug_messenger) = match setup_debug_messenger(&entry, &instance) {
            Ok(messenger) => messenger,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(anyhow!("Failed to create the debug messenger: {:?}", err));
            }
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(feature = "validation")]
            debug_messenger,
            #[cfg(feature = "validation")]
            debug_utils,
        })
    }

    /// Create the logical device for `physical_device`.
    pub fn create_render_device(&self, physical_device: &PhysicalDevice) -> Result<RenderDevice, vk::Result> {
        RenderDevice::new(&self.instance, physical_device)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for RhiCore {
    fn drop(&mut self) {
        unsafe {
            #[cfg(feature = "validation")]
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn create_instance(entry: &Entry, surface_extensions: &[*const c_char]) -> Result<Instance, vk::Result> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"Lumen")
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Lumen")
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(REQUIRED_API_VERSION);

    #[allow(unused_mut)]
    let mut extensions = surface_extensions.to_vec();

    #[cfg(feature = "validation")]
    extensions.push(ash::ext::debug_utils::NAME.as_ptr());

    #[cfg(feature = "validation")]
    let layer_pointers: Vec<*const c_char> = VALIDATION_LAYERS.iter().map(|s| s.as_ptr()).collect();

    #[allow(unused_mut)]
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions);

    #[cfg(feature = "validation")]
    {
        create_info = create_info.enabled_layer_names(&layer_pointers);
    }

    unsafe { entry.create_instance(&create_info, None) }
}

#[cfg(feature = "validation")]
fn setup_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>), vk::Result> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

    Ok((Some(debug_utils), Some(messenger)))
}

#[cfg(feature = "validation")]
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message) }.to_string_lossy()
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        _ => "[Unknown]",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("Vulkan {}: {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("Vulkan {}: {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("Vulkan {}: {}", type_str, message),
        _ => log::debug!("Vulkan {}: {}", type_str, message),
    }

    vk::FALSE
}

/// First queue family with graphics support that `supports_present` accepts.
///
/// Compute and transfer are implied by graphics, so one family serves every submission.
pub fn find_graphics_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, _)| index as u32)
        .find(|&index| supports_present(index))
}

/// Calculate a score for a device that already meets every requirement (higher is better).
pub fn score_physical_device(
    properties: &vk::PhysicalDeviceProperties,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> u32 {
    let mut score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => SCORE_DISCRETE_GPU,
        vk::PhysicalDeviceType::INTEGRATED_GPU => SCORE_INTEGRATED_GPU,
        vk::PhysicalDeviceType::VIRTUAL_GPU => SCORE_VIRTUAL_GPU,
        vk::PhysicalDeviceType::CPU => SCORE_CPU,
        _ => 10,
    };

    if properties.api_version >= vk::make_api_version(0, 1, 4, 0) {
        score += SCORE_VULKAN_1_4;
    } else if properties.api_version >= vk::API_VERSION_1_3 {
        score += SCORE_VULKAN_1_3;
    }

    let heap_count = (memory_properties.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);
    let vram_bytes: u64 = memory_properties.memory_heaps[..heap_count]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum();

    let vram_gb = (vram_bytes / (1024 * 1024 * 1024)) as u32;
    score + vram_gb * SCORE_PER_GB_VRAM
}

/// Select the best physical device supporting Vulkan 1.3, the required features,
/// and (when a surface is given) presentation to that surface.
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<&SurfaceWindow>,
) -> Result<PhysicalDevice, anyhow::Error> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };

    if physical_devices.is_empty() {
        return Err(anyhow!("No Vulkan-capable GPU found"));
    }

    let mut best: Option<(u32, PhysicalDevice)> = None;

    for device in physical_devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_owned());

        if properties.api_version < REQUIRED_API_VERSION {
            log::info!("Skipping GPU {}: Vulkan 1.3 is not supported", device_name);
            continue;
        }

        let missing = DeviceFeatureSupport::query(instance, device).missing();
        if !missing.is_empty() {
            log::info!("Skipping GPU {}: missing features {:?}", device_name, missing);
            continue;
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let graphics_queue_family = find_graphics_queue_family(&families, |index| match surface {
            Some(surface) => surface.supports_queue_family(device, index),
            None => true,
        });
        let Some(graphics_queue_family) = graphics_queue_family else {
            log::info!("Skipping GPU {}: no graphics queue can present to the surface", device_name);
            continue;
        };

        let score = score_physical_device(&properties, &memory_properties);
        log::info!(
            "Found GPU: {} (score: {}, type: {:?})",
            device_name, score, properties.device_type
        );

        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, PhysicalDevice {
                handle: device,
                name: device_name,
                properties,
                memory_properties,
                graphics_queue_family,
            }));
        }
    }

    let (_, device) = best.ok_or_else(|| anyhow!("No GPU supports Vulkan 1.3 with the required features"))?;
    log::info!("Selected GPU: {}", device.name);
    Ok(device)
}
