use winit::event::{DeviceEvent, WindowEvent};
use winit::window::Window;
use lumen_core::cli::EngineArgs;
use crate::config::EngineConfig;
use crate::draw::{FrameError, FrameOutcome};
use crate::overlay::NoOverlay;
use crate::push_constants::ComputePushConstants;
use crate::Engine;

pub trait App: Sized + 'static {
    fn new(args: &EngineArgs) -> anyhow::Result<Self>;
    fn on_window_event(&mut self, _event: &WindowEvent, _window: &Window) {}
    fn on_device_event(&mut self, _event: &DeviceEvent) {}
    fn tick(&mut self, _delta_time: f32) {}
}

pub trait RenderableApp: App {
    fn config(&self, args: &EngineArgs) -> anyhow::Result<EngineConfig> {
        Ok(EngineConfig::from_args(args)?)
    }

    /// Called once the engine exists, e.g. to set up a UI backend from [`Engine::ui_backend_info`].
    fn prepare(&mut self, _engine: &mut Engine) -> anyhow::Result<()> { Ok(()) }

    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Parameters for this frame's background pass.
    fn push_constants(&self) -> ComputePushConstants;

    /// Draw one frame. Apps with a UI overlay pass their renderer and draw data here.
    fn render(&mut self, engine: &mut Engine) -> Result<FrameOutcome, FrameError> {
        let push_constants = self.push_constants();
        engine.draw(&push_constants, &mut NoOverlay, &())
    }
}
