//! Demo host for the vizor engine.
//!
//! Usage: `vizor-studio [triangle|gradient] [--mailbox] [--trace] [--log=<filter>]`
//!
//! F5 reloads assets; the triangle shader also reloads when its file changes.
//! F12 saves the triangle demo's colour target as a PNG in the working directory.

mod capture;
mod gradient;
mod triangle;

use anyhow::{Result, bail};
use vizor_engine::EngineConfig;
use vizor_engine::device::{GpuInit, HudOverlay, WgpuBackend};
use vizor_engine::logging::LoggingConfig;
use vizor_engine::strategy::RenderingStrategy;
use vizor_engine::window::Runtime;

use crate::gradient::GradientStrategy;
use crate::triangle::TriangleStrategy;

const TRIANGLE_SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/triangle.wgsl");

fn main() -> Result<()> {
    let mut demo = "triangle".to_owned();
    let mut config = EngineConfig::default().with_initial_size(960.0, 600.0);
    let mut logging = LoggingConfig::default();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--mailbox" => config = config.with_present_mode(wgpu::PresentMode::Mailbox),
            "--trace" => logging = logging.with_frame_trace(true),
            filter if filter.starts_with("--log=") => {
                logging = logging.with_filter(&filter["--log=".len()..]);
            }
            "-h" | "--help" => {
                println!("usage: vizor-studio [triangle|gradient] [--mailbox] [--trace] [--log=<filter>]");
                return Ok(());
            }
            flag if flag.starts_with('-') => bail!("unknown flag `{flag}`"),
            name => demo = name.to_owned(),
        }
    }
    config = config.with_logging(logging);

    let strategy: Box<dyn RenderingStrategy<WgpuBackend>> = match demo.as_str() {
        "triangle" => {
            config = config.watch(TRIANGLE_SHADER);
            Box::new(TriangleStrategy::new(TRIANGLE_SHADER))
        }
        "gradient" => Box::new(GradientStrategy::new()),
        other => bail!("unknown demo `{other}` (expected `triangle` or `gradient`)"),
    };
    config = config.with_title(format!("vizor studio: {demo}"));

    Runtime::run(
        config,
        GpuInit::default(),
        strategy,
        Some(Box::new(HudOverlay::default())),
    )
}
