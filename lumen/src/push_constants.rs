use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Per-dispatch parameters of the background compute pass.
///
/// Layout matches the shader's push-constant block: four `vec4`s, 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    pub const SIZE: u32 = size_of::<Self>() as u32;

    /// Vertical gradient from `top` to `bottom`.
    pub fn gradient(top: Vec4, bottom: Vec4) -> Self {
        Self {
            data1: top,
            data2: bottom,
            ..Self::default()
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
