use std::path::PathBuf;
use std::time::Duration;

use winit::dpi::{LogicalSize, PhysicalSize};

use crate::backend::SurfaceRequest;
use crate::logging::LoggingConfig;

/// Engine-level configuration.
///
/// Adapter and device parameters live in [`crate::device::GpuInit`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title used by the winit runtime.
    pub title: String,

    pub initial_size: LogicalSize<f64>,

    /// Preferred present mode. Unsupported modes fall back to FIFO.
    pub present_mode: wgpu::PresentMode,

    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Hint for the number of frames queued for presentation.
    pub desired_maximum_frame_latency: u32,

    pub dt_min: Duration,
    pub dt_max: Duration,

    /// Files or directories whose modification triggers an asset reload.
    pub reload_paths: Vec<PathBuf>,

    /// How often watched paths are checked.
    pub reload_interval: Duration,

    /// Directory the windowed runtime writes F12 screenshots into.
    pub screenshot_dir: PathBuf,

    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "vizor".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            present_mode: wgpu::PresentMode::Fifo,
            prefer_srgb: true,
            desired_maximum_frame_latency: 2,
            dt_min: Duration::from_micros(100),
            dt_max: Duration::from_millis(250),
            reload_paths: Vec::new(),
            reload_interval: Duration::from_millis(500),
            screenshot_dir: PathBuf::from("."),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_initial_size(mut self, width: f64, height: f64) -> Self {
        self.initial_size = LogicalSize::new(width, height);
        self
    }

    pub fn with_present_mode(mut self, mode: wgpu::PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn with_srgb(mut self, prefer: bool) -> Self {
        self.prefer_srgb = prefer;
        self
    }

    pub fn with_frame_latency(mut self, frames: u32) -> Self {
        self.desired_maximum_frame_latency = frames.max(1);
        self
    }

    pub fn with_dt_clamps(mut self, min: Duration, max: Duration) -> Self {
        self.dt_min = min.min(max);
        self.dt_max = max;
        self
    }

    pub fn watch(mut self, path: impl Into<PathBuf>) -> Self {
        self.reload_paths.push(path.into());
        self
    }

    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Surface request for the given window size.
    pub(crate) fn surface_request(&self, size: PhysicalSize<u32>) -> SurfaceRequest {
        SurfaceRequest {
            size,
            present_mode: self.present_mode,
            prefer_srgb: self.prefer_srgb,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            desired_maximum_frame_latency: self.desired_maximum_frame_latency,
        }
    }
}
