//! Vulkan Swapchain - surface, swapchain negotiation, acquire and present.

use std::time::Duration;

use ash::vk;
use anyhow::Context;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use lumen_core::log::info;
use crate::barrier::{TextureLayout, TrackedImage};
use crate::synchronization::timeout_nanos;
use crate::{Queue, RenderDevice, RhiCore, NUM_BACK_BUFFERS};

/// Presentation surface of a window. Must outlive every swapchain built on it.
pub struct SurfaceWindow {
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl Drop for SurfaceWindow {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None); }
    }
}

impl SurfaceWindow {
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, core: &RhiCore) -> anyhow::Result<Self> {
        let display_handle = window.display_handle().context("Window has no display handle")?.as_raw();
        let window_handle = window.window_handle().context("Window has no native handle")?.as_raw();

        let surface_loader = ash::khr::surface::Instance::new(core.entry(), core.instance());
        let surface = unsafe {
            ash_window::create_surface(core.entry(), core.instance(), display_handle, window_handle, None)
                .context("Failed to create a Vulkan surface for the window")?
        };

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    pub fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether queue family `index` of `physical_device` can present to this surface.
    pub fn supports_queue_family(&self, physical_device: vk::PhysicalDevice, index: u32) -> bool {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, index, self.surface)
                .unwrap_or(false)
        }
    }
}

/// Swapchain configuration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub preferred_format: vk::Format,
    pub preferred_color_space: vk::ColorSpaceKHR,
    pub preferred_present_mode: vk::PresentModeKHR,
    pub num_back_buffers: u32,
    pub usage: vk::ImageUsageFlags,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            preferred_format: vk::Format::B8G8R8A8_UNORM,
            preferred_color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            preferred_present_mode: vk::PresentModeKHR::FIFO,
            num_back_buffers: NUM_BACK_BUFFERS,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        }
    }
}

/// What the surface reports it can do.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Negotiated parameters of one swapchain instance.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug)]
pub enum SwapchainError {
    NoSurfaceFormats,
    ZeroExtent(vk::Extent2D),
    Vulkan(vk::Result),
}

impl From<vk::Result> for SwapchainError {
    fn from(e: vk::Result) -> Self {
        SwapchainError::Vulkan(e)
    }
}

impl std::fmt::Display for SwapchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapchainError::NoSurfaceFormats => write!(f, "Surface reports no supported formats"),
            SwapchainError::ZeroExtent(extent) => {
                write!(f, "Cannot build a {}x{} swapchain", extent.width, extent.height)
            }
            SwapchainError::Vulkan(e) => write!(f, "Vulkan error: {:?}", e),
        }
    }
}

impl std::error::Error for SwapchainError {}

/// Result of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; nothing was acquired and the semaphore will not be signaled.
    OutOfDate,
}

/// Non-fatal outcome of a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}

/// Presentation engine calls the swapchain manager needs.
pub trait SwapchainDevice {
    fn surface_support(&self) -> Result<SurfaceSupport, vk::Result>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, vk::Result>;

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>, vk::Result>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView, vk::Result>;

    fn destroy_image_view(&self, view: vk::ImageView);

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result>;

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result>;
}

/// [`SwapchainDevice`] backed by a real surface and `VK_KHR_swapchain`.
pub struct SurfaceSwapchainDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: SurfaceWindow,
}

impl SurfaceSwapchainDevice {
    pub fn new(core: &RhiCore, device: &RenderDevice, surface: SurfaceWindow) -> Self {
        Self {
            physical_device: device.parent_physical_device().handle(),
            device: device.handle().clone(),
            swapchain_loader: ash::khr::swapchain::Device::new(core.instance(), device.handle()),
            surface,
        }
    }

    pub fn surface(&self) -> &SurfaceWindow {
        &self.surface
    }
}

impl SwapchainDevice for SurfaceSwapchainDevice {
    fn surface_support(&self) -> Result<SurfaceSupport, vk::Result> {
        let loader = &self.surface.surface_loader;
        let surface = self.surface.surface;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader.get_physical_device_surface_capabilities(self.physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(self.physical_device, surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(self.physical_device, surface)?,
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, vk::Result> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>, vk::Result> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView, vk::Result> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        unsafe { self.device.create_image_view(&view_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe { self.swapchain_loader.acquire_next_image(swapchain, timeout, signal, vk::Fence::null()) }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

/// One presentable image with its view and tracked layout.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    pub tracked: TrackedImage,
    pub view: vk::ImageView,
}

/// Owns the swapchain plus its images and views; they are always replaced together.
pub struct Swapchain<D: SwapchainDevice = SurfaceSwapchainDevice> {
    name: String,
    device: D,
    config: SwapchainConfig,
    swapchain: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    desc: Option<SwapchainDesc>,
}

impl<D: SwapchainDevice> Drop for Swapchain<D> {
    fn drop(&mut self) {
        self.destroy_swapchain();
    }
}

impl<D: SwapchainDevice> Swapchain<D> {
    #[profiling::function]
    pub fn new(name: &str, device: D, config: SwapchainConfig, extent: vk::Extent2D) -> Result<Self, SwapchainError> {
        let mut swapchain = Self {
            name: name.to_owned(),
            device,
            config,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            desc: None,
        };
        swapchain.create_swapchain(extent)?;
        Ok(swapchain)
    }

    /// Build a new swapchain for `extent`, replacing the current one (if any).
    ///
    /// Negotiation failures leave the current swapchain untouched. The caller must make
    /// sure the GPU no longer uses the old images.
    #[profiling::function]
    pub fn create_swapchain(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        if extent.width == 0 || extent.height == 0 {
            return Err(SwapchainError::ZeroExtent(extent));
        }

        let support = self.device.surface_support()?;
        let desc = negotiate_swapchain(&support, &self.config, extent)?;

        self.destroy_swapchain();

        info!(
            "Creating swapchain {}: {:?} {:?}, {}x{}, {} images, {:?}",
            self.name,
            desc.surface_format.format,
            desc.surface_format.color_space,
            desc.extent.width,
            desc.extent.height,
            desc.image_count,
            desc.present_mode
        );

        let swapchain = self.device.create_swapchain(&desc)?;
        self.swapchain = swapchain;

        let images = self.device.swapchain_images(swapchain)?;
        self.images.reserve(images.len());
        for image in images {
            // Views created so far are owned by `self.images` and released by the next destroy.
            let view = self.device.create_image_view(image, desc.surface_format.format)?;
            self.images.push(SwapchainImage {
                tracked: TrackedImage::new(image, TextureLayout::Undefined),
                view,
            });
        }

        self.desc = Some(desc);
        Ok(())
    }

    /// Release the image views and the swapchain. Safe to call repeatedly.
    pub fn destroy_swapchain(&mut self) {
        for image in self.images.drain(..) {
            self.device.destroy_image_view(image.view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.desc = None;
    }

    #[profiling::function]
    pub fn acquire_next_image(
        &self,
        signal: vk::Semaphore,
        timeout: Option<Duration>,
    ) -> Result<AcquireOutcome, vk::Result> {
        match self.device.acquire_next_image(self.swapchain, timeout_nanos(timeout), signal) {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e),
        }
    }

    /// Queue `image_index` for presentation once `wait` is signaled.
    #[profiling::function]
    pub fn present(&self, queue: Queue, image_index: u32, wait: vk::Semaphore) -> Result<PresentStatus, vk::Result> {
        match self.device.queue_present(queue.handle(), self.swapchain, image_index, wait) {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e),
        }
    }

    #[inline]
    pub fn name(&self) -> &str { &self.name }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR { self.swapchain }

    pub fn extent(&self) -> vk::Extent2D {
        self.desc.map(|d| d.extent).unwrap_or_default()
    }

    pub fn format(&self) -> vk::Format {
        self.desc.map_or(self.config.preferred_format, |d| d.surface_format.format)
    }

    pub fn desc(&self) -> Option<&SwapchainDesc> {
        self.desc.as_ref()
    }

    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    pub fn image_mut(&mut self, image_index: u32) -> Option<&mut SwapchainImage> {
        self.images.get_mut(image_index as usize)
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

/// Pick format, present mode, extent and image count for a surface.
pub fn negotiate_swapchain(
    support: &SurfaceSupport,
    config: &SwapchainConfig,
    window_extent: vk::Extent2D,
) -> Result<SwapchainDesc, SwapchainError> {
    let surface_format = choose_surface_format(&support.formats, config).ok_or(SwapchainError::NoSurfaceFormats)?;
    let present_mode = choose_present_mode(&support.present_modes, config);
    let extent = get_swapchain_extent(&support.capabilities, window_extent);
    if extent.width == 0 || extent.height == 0 {
        return Err(SwapchainError::ZeroExtent(extent));
    }

    let capabilities = &support.capabilities;
    let mut image_count = config.num_back_buffers.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        image_count = image_count.min(capabilities.max_image_count);
    }

    Ok(SwapchainDesc {
        surface_format,
        present_mode,
        extent,
        image_count,
        pre_transform: capabilities.current_transform,
        usage: config.usage,
    })
}

fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    config: &SwapchainConfig,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == config.preferred_format && f.color_space == config.preferred_color_space
        })
        .or_else(|| formats.first())
        .copied()
}

fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    config: &SwapchainConfig,
) -> vk::PresentModeKHR {
    if modes.contains(&config.preferred_present_mode) {
        config.preferred_present_mode
    } else {
        // FIFO is the only mode every implementation must support.
        vk::PresentModeKHR::FIFO
    }
}

fn get_swapchain_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}
