//! Vulkan Shader - SPIR-V loading and push-constant reflection.

use std::ffi::CString;
use std::path::Path;

use ash::vk;
use lumen_rhi_derive::DeviceObject;
use rspirv_reflect::Reflection;
use crate::RenderDevice;
use crate::device::{set_debug_name_handle, DebuggableObject};

/// Shader stage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// What the engine needs to know about a shader's interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Size in bytes of the push-constant block, 0 when the shader declares none.
    pub push_constant_size: u32,
}

/// Shader loading and reflection errors.
#[derive(Debug)]
pub enum ShaderError {
    InvalidSpirv(String),
    ReflectionFailed(String),
    VulkanError(vk::Result),
    IoError {
        path: String,
        source: std::io::Error,
    },
}

impl From<vk::Result> for ShaderError {
    fn from(e: vk::Result) -> Self {
        ShaderError::VulkanError(e)
    }
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderError::InvalidSpirv(msg) => write!(f, "Invalid SPIR-V: {}", msg),
            ShaderError::ReflectionFailed(msg) => write!(f, "Shader reflection failed: {}", msg),
            ShaderError::VulkanError(e) => write!(f, "Vulkan error: {:?}", e),
            ShaderError::IoError { path, source } => write!(f, "Failed to read shader {}: {}", path, source),
        }
    }
}

impl std::error::Error for ShaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShaderError::IoError { source, .. } => Some(source),
            ShaderError::VulkanError(e) => Some(e),
            _ => None,
        }
    }
}

/// Shader module with its entry point and reflection data.
#[DeviceObject]
pub struct Shader {
    name: String,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
    reflection: ShaderReflection,
}

impl Shader {
    /// Load pre-compiled SPIR-V from `path`.
    pub fn from_file(
        name: &str,
        device: &RenderDevice,
        path: &Path,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Self, ShaderError> {
        let spirv = std::fs::read(path).map_err(|source| ShaderError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_spirv(name, device, &spirv, entry_point, stage)
    }

    /// Create a shader from SPIR-V bytecode.
    pub fn from_spirv(
        name: &str,
        device: &RenderDevice,
        spirv: &[u8],
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Self, ShaderError> {
        let code = spirv_words(spirv)?;
        let reflection = reflect_spirv(spirv)?;
        let entry_point = CString::new(entry_point)
            .map_err(|_| ShaderError::InvalidSpirv(format!("entry point {entry_point:?} contains a NUL byte")))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let shader = Self {
            name: name.to_owned(),
            module,
            stage,
            entry_point,
            reflection,
            device: device.handle().clone(),
        };
        device.set_debug_name(&shader);
        Ok(shader)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule { self.module }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &CString {
        &self.entry_point
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    pub fn vk_stage(&self) -> vk::ShaderStageFlags {
        self.stage.to_vk_stage()
    }
}

impl DebuggableObject for Shader {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.module, self.name());
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Decode a SPIR-V byte stream into aligned words, checking the magic number.
pub fn spirv_words(spirv: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if spirv.is_empty() || spirv.len() % 4 != 0 {
        return Err(ShaderError::InvalidSpirv(format!("{} bytes is not a whole number of words", spirv.len())));
    }
    ash::util::read_spv(&mut std::io::Cursor::new(spirv))
        .map_err(|e| ShaderError::InvalidSpirv(e.to_string()))
}

pub fn reflect_spirv(spirv: &[u8]) -> Result<ShaderReflection, ShaderError> {
    let reflection = Reflection::new_from_spirv(spirv)
        .map_err(|e| ShaderError::ReflectionFailed(format!("{:?}", e)))?;

    let push_constant_size = reflection
        .get_push_constant_range()
        .map_err(|e| ShaderError::ReflectionFailed(format!("{:?}", e)))?
        .map(|info| info.size)
        .unwrap_or(0);

    Ok(ShaderReflection { push_constant_size })
}
