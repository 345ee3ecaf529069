//! Vulkan Descriptor - set layouts, ratio-sized pools and descriptor writes.

use ash::vk;
use lumen_core::log;
use lumen_rhi_derive::DeviceObject;
use smallvec::SmallVec;
use crate::RenderDevice;
use crate::device::{set_debug_name_handle, DebuggableObject};

/// Descriptor write that does not match the set layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Binding index not found in layout.
    BindingNotFound(u32),
    TypeMismatch {
        binding: u32,
        expected: vk::DescriptorType,
        got: vk::DescriptorType,
    },
}

impl std::fmt::Display for BindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingError::BindingNotFound(b) => write!(f, "Binding {} not found in layout", b),
            BindingError::TypeMismatch {
                binding,
                expected,
                got,
            } => write!(
                f,
                "Type mismatch at binding {}: expected {:?}, got {:?}",
                binding, expected, got
            ),
        }
    }
}

impl std::error::Error for BindingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl LayoutBinding {
    pub fn new(binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            descriptor_type,
            count: 1,
            stage_flags,
        }
    }
}

/// Check that `binding` exists in `bindings` with the given descriptor type.
pub fn validate_binding(
    bindings: &[LayoutBinding],
    binding: u32,
    descriptor_type: vk::DescriptorType,
) -> Result<(), BindingError> {
    let declared = bindings
        .iter()
        .find(|b| b.binding == binding)
        .ok_or(BindingError::BindingNotFound(binding))?;

    if declared.descriptor_type != descriptor_type {
        return Err(BindingError::TypeMismatch {
            binding,
            expected: declared.descriptor_type,
            got: descriptor_type,
        });
    }
    Ok(())
}

/// Descriptor set layout with binding metadata for validation.
#[DeviceObject]
pub struct DescriptorSetLayout {
    name: String,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new(name: &str, device: &RenderDevice, bindings: &[LayoutBinding]) -> Result<Self, vk::Result> {
        let vk_bindings: SmallVec<[vk::DescriptorSetLayoutBinding; 4]> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stage_flags)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { device.handle().create_descriptor_set_layout(&create_info, None)? };

        let layout = Self {
            name: name.to_owned(),
            layout,
            bindings: bindings.to_vec(),
            device: device.handle().clone(),
        };
        device.set_debug_name(&layout);
        Ok(layout)
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }
}

impl DebuggableObject for DescriptorSetLayout {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.layout, self.name());
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Share of a pool's descriptor budget given to one descriptor type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    /// Descriptors of this type per set.
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self { descriptor_type, ratio }
    }
}

/// Pool sizes for `max_sets` sets: each type gets `ratio * max_sets` descriptors.
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| {
            vk::DescriptorPoolSize::default()
                .ty(ratio.descriptor_type)
                .descriptor_count((ratio.ratio * max_sets as f32) as u32)
        })
        .collect()
}

/// Fixed-capacity descriptor pool sized from a ratio table.
///
/// Exhaustion is reported as an error from [`DescriptorAllocator::allocate`]; the pool never grows.
#[DeviceObject]
pub struct DescriptorAllocator {
    name: String,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorAllocator {
    pub fn init_pool(
        name: &str,
        device: &RenderDevice,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self, vk::Result> {
        Self::init_pool_with_flags(name, device, max_sets, ratios, vk::DescriptorPoolCreateFlags::empty())
    }

    pub fn init_pool_with_flags(
        name: &str,
        device: &RenderDevice,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> Result<Self, vk::Result> {
        let sizes = pool_sizes(max_sets, ratios);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        log::debug!("Descriptor pool {}: {} sets, sizes {:?}", name, max_sets, sizes);

        let allocator = Self {
            name: name.to_owned(),
            pool,
            max_sets,
            device: device.handle().clone(),
        };
        device.set_debug_name(&allocator);
        Ok(allocator)
    }

    /// Allocate one set. Fails with `ERROR_OUT_OF_POOL_MEMORY` once the pool is exhausted.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        sets.first().copied().ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl DebuggableObject for DescriptorAllocator {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.pool, self.name());
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Collects image writes for one set, checked against its layout, then applies them at once.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    image_writes: SmallVec<[(u32, vk::DescriptorType, vk::DescriptorImageInfo); 4]>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            image_writes: SmallVec::new(),
        }
    }

    /// Bind `view` as a storage image expected in `layout` by the shader.
    pub fn write_storage_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> Result<&mut Self, BindingError> {
        let descriptor_type = vk::DescriptorType::STORAGE_IMAGE;
        validate_binding(self.layout.bindings(), binding, descriptor_type)?;
        let info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(layout);
        self.image_writes.push((binding, descriptor_type, info));
        Ok(self)
    }

    pub fn update_set(&self, device: &RenderDevice, set: vk::DescriptorSet) {
        let writes: SmallVec<[vk::WriteDescriptorSet; 4]> = self
            .image_writes
            .iter()
            .map(|(binding, descriptor_type, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*descriptor_type)
                    .image_info(std::slice::from_ref(info))
            })
            .collect();

        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
    }
}
