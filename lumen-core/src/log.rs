pub use log::{trace, debug, info, warn, error, log_enabled, Level, LevelFilter};

/// Install the global logger. `RUST_LOG` still overrides `level` per module.
pub fn initialize(level: LevelFilter) -> Result<(), anyhow::Error> {
    env_logger::builder()
        .filter_level(level)
        .filter_module("gpu_allocator", LevelFilter::Warn)
        .filter_module("winit", LevelFilter::Warn)
        .parse_default_env()
        .try_init()?;

    Ok(())
}
