use crate::main_loop::EngineLoop;

mod app;
mod context;
mod engine;
mod main_loop;
pub mod config;
pub mod draw;
pub mod frame;
pub mod overlay;
pub mod push_constants;

pub use app::{App, RenderableApp};
pub use config::{EngineConfig, EngineConfigBuilder, EngineConfigBuilderError};
pub use context::RenderContext;
pub use draw::{
    dispatch_group_counts, record_frame, ComputeBinding, FrameBackend, FrameError, FrameOrchestrator, FrameOutcome,
    FrameRecording, FrameStep, SkipReason,
};
pub use engine::Engine;
pub use frame::{slot_for_frame, FrameRing, FrameSlot};
pub use lumen_core::cli::EngineArgs;
pub use overlay::{NoOverlay, UiBackendInfo, UiRenderer};
pub use push_constants::ComputePushConstants;

pub use paste::paste;

macro_rules! module_facade {
    ($name:ident) => {
        $crate::paste!{
            pub mod $name {
                pub use [<lumen_ $name>]::*;
            }
        }
    };
}

module_facade!(core);
module_facade!(rhi);

/// Initialise logging and run the event loop with `A` until the window closes.
pub fn launch<A: RenderableApp>(args: EngineArgs) -> Result<(), anyhow::Error> {
    lumen_core::log::initialize(args.log_level.into())?;

    let app = A::new(&args)?;
    EngineLoop::new(app, args).run()
}

/// Like [`launch`], for apps that were built from more than the engine arguments.
pub fn launch_with<A: RenderableApp>(app: A, args: EngineArgs) -> Result<(), anyhow::Error> {
    lumen_core::log::initialize(args.log_level.into())?;

    EngineLoop::new(app, args).run()
}
