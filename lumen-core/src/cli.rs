use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Location of the compiled gradient compute shader, relative to the working directory.
pub const DEFAULT_SHADER_PATH: &str = "shaders/gradient.spv";

pub const DEFAULT_WINDOW_WIDTH: u32 = 1920;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 1080;

/// Log level options for command-line argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

/// Common command-line arguments for Lumen applications.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct EngineArgs {
    /// Set the log verbosity level
    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Initial window width in pixels
    #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH)]
    pub width: u32,

    /// Initial window height in pixels
    #[arg(long, default_value_t = DEFAULT_WINDOW_HEIGHT)]
    pub height: u32,

    /// Compiled SPIR-V for the background compute pass
    #[arg(long, default_value = DEFAULT_SHADER_PATH)]
    pub shader: PathBuf,

    /// Give up on a frame fence after this many milliseconds (waits forever when absent)
    #[arg(long = "fence-timeout-ms")]
    pub fence_timeout_ms: Option<u64>,

    /// Additional positional arguments passed to the application
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl EngineArgs {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            shader: PathBuf::from(DEFAULT_SHADER_PATH),
            fence_timeout_ms: None,
            args: Vec::new(),
        }
    }
}
