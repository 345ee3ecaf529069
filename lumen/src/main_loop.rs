use std::sync::Arc;

use anyhow::Context;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};
use lumen_core::cli::EngineArgs;
use lumen_core::log::{error, info};
use crate::app::RenderableApp;
use crate::draw::{FrameOutcome, SkipReason};
use crate::Engine;

/// Minimised windows stop the redraw chain; the next non-empty resize restarts it.
///
/// A window with an area keeps redrawing even when its surface briefly reports none.
fn wants_next_frame(outcome: FrameOutcome, window_size: PhysicalSize<u32>) -> bool {
    let minimised = window_size.width == 0 || window_size.height == 0;
    outcome != FrameOutcome::Skipped(SkipReason::ZeroExtent) || !minimised
}

pub struct EngineLoop<A> {
    engine: Option<Engine>,
    app: A,
    args: EngineArgs,

    frame_count: u64,
    last_tick: std::time::Instant,
    last_time_printed: std::time::Instant,
    /// First fatal error; ends the loop and is returned from [`EngineLoop::run`].
    error: Option<anyhow::Error>,
}

impl<A: RenderableApp> ApplicationHandler for EngineLoop<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }

        if let Err(err) = self.create_engine(event_loop) {
            self.fail(event_loop, err);
            return;
        }

        if let Some(engine) = self.engine.as_ref() {
            engine.main_window.request_redraw();
        }
    }

    #[profiling::function]
    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if engine.should_exit() {
            event_loop.exit();
            return;
        }

        if let Err(err) = self.process_window_event(&event) {
            self.fail(event_loop, err);
        }
    }

    #[profiling::function]
    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        self.app.on_device_event(&event);
    }
}

impl<A: RenderableApp> EngineLoop<A> {
    pub(super) fn new(app: A, args: EngineArgs) -> Self {
        Self {
            engine: None,
            app,
            args,

            frame_count: 0u64,
            last_tick: std::time::Instant::now(),
            last_time_printed: std::time::Instant::now(),
            error: None,
        }
    }

    pub fn run(mut self) -> Result<(), anyhow::Error> {
        let event_loop = EventLoop::new()?;
        // Frames are driven by redraw requests, so an idle or minimised window sleeps.
        event_loop.set_control_flow(ControlFlow::Wait);
        event_loop.run_app(&mut self)?;

        // Release GPU state before reporting, so teardown happens in every case.
        self.engine = None;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_engine(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let config = self.app.config(&self.args)?;
        let window_attributes = Window::default_attributes()
            .with_title(config.window_title.clone())
            .with_min_inner_size(LogicalSize::new(32, 32))
            .with_inner_size(PhysicalSize::new(config.extent.width, config.extent.height));

        let main_window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create the main window")?,
        );

        let mut engine = Engine::new(main_window, &config)?;
        self.app.prepare(&mut engine)?;
        self.engine = Some(engine);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        if self.error.is_none() {
            self.error = Some(err);
        }
        event_loop.exit();
    }

    #[profiling::function("main_loop")]
    fn process_window_event(&mut self, event: &WindowEvent) -> anyhow::Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        self.app.on_window_event(event, engine.main_window.as_ref());

        match event {
            WindowEvent::Resized(size) => {
                engine.resize(size.width, size.height);
                self.app.resize(size.width, size.height);
                if size.width > 0 && size.height > 0 {
                    engine.main_window.request_redraw();
                }
            }
            WindowEvent::CloseRequested => {
                engine.request_exit();
            }
            WindowEvent::RedrawRequested => {
                self.tick();

                let Some(engine) = self.engine.as_mut() else {
                    return Ok(());
                };
                let outcome = self.app.render(engine)?;
                if outcome == FrameOutcome::PresentedAndRebuilt {
                    let size = engine.main_window.inner_size();
                    info!("Swapchain rebuilt at {}x{}", size.width, size.height);
                }
                if wants_next_frame(outcome, engine.main_window.inner_size()) {
                    engine.main_window.request_redraw();
                }

                profiling::finish_frame!();
            }
            _ => {}
        }
        Ok(())
    }

    #[profiling::function]
    fn tick(&mut self) {
        let delta_time = {
            let now = std::time::Instant::now();
            let delta_time = now - self.last_tick;
            self.last_tick = now;

            let last_time_print_elapsed = (now - self.last_time_printed).as_secs_f32();
            if last_time_print_elapsed > 1. {
                info!("Frame rate: {} fps", self.frame_count as f32 / last_time_print_elapsed);
                self.last_time_printed = now;
                self.frame_count = 0;
            }

            delta_time.as_secs_f32()
        };

        self.app.tick(delta_time);
        self.frame_count += 1;
    }
}
