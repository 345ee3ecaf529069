use ash::vk;
use lumen_rhi_derive::DeviceObject;
use smallvec::SmallVec;
use crate::{DescriptorSetLayout, RenderDevice, Shader};
use crate::device::{set_debug_name_handle, DebuggableObject};

#[derive(Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// The layout's push-constant range and the shader's block disagree in size.
    PushConstantMismatch { declared: u32, reflected: u32 },
    /// A compute pipeline was requested from a non-compute shader.
    WrongStage(vk::ShaderStageFlags),
    VulkanError(vk::Result),
}

impl From<vk::Result> for PipelineError {
    fn from(e: vk::Result) -> Self {
        PipelineError::VulkanError(e)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::PushConstantMismatch { declared, reflected } => write!(
                f,
                "Push constant range is {} bytes but the shader declares {} bytes",
                declared, reflected
            ),
            PipelineError::WrongStage(stage) => write!(f, "Expected a compute shader, got {:?}", stage),
            PipelineError::VulkanError(e) => write!(f, "Vulkan error: {:?}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Push-constant range used by a compute pipeline: offset 0, compute stage only.
pub fn compute_push_constant_range(size: u32) -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .offset(0)
        .size(size)
}

/// Compute pipeline with its layout and the push-constant range it was built with.
#[DeviceObject]
pub struct ComputePipeline {
    name: String,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    push_constant_range: vk::PushConstantRange,
}

impl ComputePipeline {
    /// Build a pipeline over `shader` whose layout takes `set_layouts` and
    /// `push_constant_size` bytes of push constants.
    ///
    /// The shader module may be dropped once this returns.
    pub fn new(
        name: &str,
        device: &RenderDevice,
        shader: &Shader,
        set_layouts: &[&DescriptorSetLayout],
        push_constant_size: u32,
    ) -> Result<Self, PipelineError> {
        if shader.vk_stage() != vk::ShaderStageFlags::COMPUTE {
            return Err(PipelineError::WrongStage(shader.vk_stage()));
        }

        let reflected = shader.reflection().push_constant_size;
        if reflected != push_constant_size {
            return Err(PipelineError::PushConstantMismatch {
                declared: push_constant_size,
                reflected,
            });
        }

        let raw = device.handle();
        let set_layouts: SmallVec<[vk::DescriptorSetLayout; 4]> = set_layouts.iter().map(|l| l.handle()).collect();
        let push_constant_range = compute_push_constant_range(push_constant_size);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(std::slice::from_ref(&push_constant_range));
        let layout = unsafe { raw.create_pipeline_layout(&layout_info, None)? };

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.handle())
            .name(shader.entry_point());
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .layout(layout)
            .stage(stage);

        let pipeline = match unsafe {
            raw.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        } {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { raw.destroy_pipeline_layout(layout, None) };
                return Err(err.into());
            }
        };

        let pipeline = Self {
            name: name.to_owned(),
            layout,
            pipeline,
            push_constant_range,
            device: raw.clone(),
        };
        device.set_debug_name(&pipeline);
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline { self.pipeline }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout { self.layout }

    #[inline]
    pub fn push_constant_range(&self) -> vk::PushConstantRange { self.push_constant_range }
}

impl DebuggableObject for ComputePipeline {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.pipeline, self.name());
        set_debug_name_handle(device, self.layout, &format!("{}.layout", self.name()));
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
