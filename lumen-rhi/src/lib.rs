//! Lumen RHI (Render Hardware Interface) - Vulkan 1.3 backend.
//!
//! Thin ownership wrappers over ash: every object here releases its Vulkan
//! handles on drop, and frame-level policy lives in the `lumen` crate.

pub mod allocator;
pub mod buffer;
pub mod command;
pub mod core;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod immediate;
pub mod pipeline;
pub mod queue;
pub mod shader;
pub mod swapchain;
pub mod texture;
pub mod upload;
mod barrier;
mod error;
mod synchronization;

/// Swapchain images requested when the surface allows it.
pub const NUM_BACK_BUFFERS: u32 = 3;

pub use ash::{vk, Device};
pub use gpu_allocator::MemoryLocation;

pub use allocator::ResourceAllocator;
pub use barrier::{LayoutTransition, TextureLayout, TrackedImage};
pub use buffer::{Buffer, BufferDesc, BufferRef};
pub use command::{ColorTarget, CommandEncoder, CommandPool, CommandRecorder, ImageBlit};
pub use self::core::{select_physical_device, DeviceFeatureSupport, PhysicalDevice, RhiCore};
pub use deletion::DeletionStack;
pub use descriptor::{
    BindingError, DescriptorAllocator, DescriptorSetLayout, DescriptorWriter, LayoutBinding, PoolSizeRatio,
};
pub use device::{DebuggableObject, RenderDevice, SemaphoreStage};
pub use error::RhiError;
pub use immediate::ImmediateSubmit;
pub use pipeline::{ComputePipeline, PipelineError};
pub use queue::Queue;
pub use shader::{reflect_spirv, Shader, ShaderError, ShaderReflection, ShaderStage};
pub use swapchain::{
    AcquireOutcome, PresentStatus, SurfaceSwapchainDevice, SurfaceWindow, Swapchain, SwapchainConfig,
    SwapchainDesc, SwapchainDevice, SwapchainError, SwapchainImage,
};
pub use synchronization::{timeout_nanos, Fence, Semaphore};
pub use texture::{Texture, TextureDesc};
pub use upload::{upload_buffer, upload_slice};
