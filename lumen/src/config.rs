use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use lumen_core::cli::{EngineArgs, DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH};
use lumen_rhi::{vk, SwapchainConfig};

pub use lumen_core::cli::DEFAULT_SHADER_PATH;
pub use lumen_rhi::NUM_BACK_BUFFERS;

/// Frames the CPU may record ahead of the GPU.
pub const FRAME_OVERLAP: usize = 2;

/// Local size of the gradient shader in X and Y.
pub const WORKGROUP_SIZE: u32 = 16;

pub const DRAW_DESCRIPTOR_MAX_SETS: u32 = 10;

/// Descriptors per type reserved for the UI backend.
pub const UI_DESCRIPTOR_POOL_SIZE: u32 = 1000;

/// Offscreen target written by the compute pass.
pub const DRAW_TARGET_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

#[derive(Clone, Debug, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    #[builder(default = "\"Lumen\".to_owned()")]
    pub window_title: String,
    #[builder(default = "vk::Extent2D { width: DEFAULT_WINDOW_WIDTH, height: DEFAULT_WINDOW_HEIGHT }")]
    pub extent: vk::Extent2D,
    #[builder(default = "FRAME_OVERLAP")]
    pub frame_overlap: usize,
    #[builder(default = "PathBuf::from(DEFAULT_SHADER_PATH)")]
    pub shader_path: PathBuf,
    /// `None` waits forever.
    #[builder(default)]
    pub fence_timeout: Option<Duration>,
    #[builder(default)]
    pub swapchain: SwapchainConfig,
    #[builder(default = "DRAW_TARGET_FORMAT")]
    pub draw_format: vk::Format,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.frame_overlap == Some(0) {
            return Err("frame_overlap must be at least 1".to_owned());
        }
        if let Some(extent) = self.extent {
            if extent.width == 0 || extent.height == 0 {
                return Err(format!("initial extent {}x{} is empty", extent.width, extent.height));
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn from_args(args: &EngineArgs) -> Result<Self, EngineConfigBuilderError> {
        EngineConfigBuilder::default()
            .extent(vk::Extent2D {
                width: args.width,
                height: args.height,
            })
            .shader_path(args.shader.clone())
            .fence_timeout(args.fence_timeout())
            .build()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_title: "Lumen".to_owned(),
            extent: vk::Extent2D {
                width: DEFAULT_WINDOW_WIDTH,
                height: DEFAULT_WINDOW_HEIGHT,
            },
            frame_overlap: FRAME_OVERLAP,
            shader_path: PathBuf::from(DEFAULT_SHADER_PATH),
            fence_timeout: None,
            swapchain: SwapchainConfig::default(),
            draw_format: DRAW_TARGET_FORMAT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default() {
        let built = EngineConfigBuilder::default().build().unwrap();
        let default = EngineConfig::default();

        assert_eq!(built.window_title, default.window_title);
        assert_eq!(built.extent, default.extent);
        assert_eq!(built.frame_overlap, 2);
        assert_eq!(built.shader_path, PathBuf::from("shaders/gradient.spv"));
        assert_eq!(built.fence_timeout, None);
        assert_eq!(built.swapchain, SwapchainConfig::default());
        assert_eq!(built.draw_format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn args_feed_the_config() {
        let args = EngineArgs {
            width: 1000,
            height: 700,
            shader: PathBuf::from("custom.spv"),
            fence_timeout_ms: Some(250),
            ..EngineArgs::default()
        };
        let config = EngineConfig::from_args(&args).unwrap();

        assert_eq!(config.extent, vk::Extent2D { width: 1000, height: 700 });
        assert_eq!(config.shader_path, PathBuf::from("custom.spv"));
        assert_eq!(config.fence_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn empty_ring_is_rejected() {
        let result = EngineConfigBuilder::default().frame_overlap(0usize).build();
        assert!(matches!(result, Err(EngineConfigBuilderError::ValidationError(_))));
    }

    #[test]
    fn zero_extent_is_rejected() {
        let result = EngineConfigBuilder::default()
            .extent(vk::Extent2D { width: 0, height: 600 })
            .build();
        assert!(result.is_err());
    }
}
