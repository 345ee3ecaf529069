#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::process::ExitCode;

use clap::Parser;
use glam::Vec4;
use lumen::{launch_with, App, ComputePushConstants, EngineArgs, RenderableApp};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fills the window with a compute-shader gradient")]
struct Args {
    #[command(flatten)]
    engine: EngineArgs,

    /// Gradient color at the top edge, as r,g,b,a
    #[arg(long, value_parser = parse_color, default_value = "1,0,0,1")]
    top_color: Vec4,

    /// Gradient color at the bottom edge, as r,g,b,a
    #[arg(long, value_parser = parse_color, default_value = "0,0,1,1")]
    bottom_color: Vec4,
}

fn parse_color(value: &str) -> Result<Vec4, String> {
    let channels = value
        .split(',')
        .map(|channel| channel.trim().parse::<f32>().map_err(|err| format!("`{channel}`: {err}")))
        .collect::<Result<Vec<_>, _>>()?;

    match channels.as_slice() {
        [r, g, b, a] => Ok(Vec4::new(*r, *g, *b, *a)),
        [r, g, b] => Ok(Vec4::new(*r, *g, *b, 1.0)),
        _ => Err(format!("expected 3 or 4 comma separated channels, got {}", channels.len())),
    }
}

pub struct GradientApp {
    push_constants: ComputePushConstants,
}

impl GradientApp {
    fn with_colors(top: Vec4, bottom: Vec4) -> Self {
        Self {
            push_constants: ComputePushConstants::gradient(top, bottom),
        }
    }
}

impl App for GradientApp {
    fn new(_args: &EngineArgs) -> anyhow::Result<Self> {
        Ok(Self::with_colors(Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0)))
    }
}

impl RenderableApp for GradientApp {
    fn push_constants(&self) -> ComputePushConstants {
        self.push_constants
    }
}

fn main() -> ExitCode {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();
    let app = GradientApp::with_colors(args.top_color, args.bottom_color);

    match launch_with(app, args.engine) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lumen-sandbox: {err:#}");
            ExitCode::FAILURE
        }
    }
}
