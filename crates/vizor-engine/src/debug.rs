use winit::dpi::PhysicalSize;

use crate::strategy::{AttachmentDesc, StrategyStats};

/// Read-only copy of engine state for overlays and diagnostics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DebugSnapshot {
    pub frame_index: u64,
    pub elapsed: f64,
    pub dt: f64,

    pub backend: String,
    pub strategy: String,

    pub surface_extent: Option<PhysicalSize<u32>>,
    pub surface_format: Option<wgpu::TextureFormat>,
    pub present_mode: Option<wgpu::PresentMode>,
    pub image_count: u32,
    pub surface_rebuilds: u64,

    pub issued_value: u64,
    pub completed_value: u64,
    pub frames_in_flight: usize,
    pub ring_len: usize,

    pub attachments: Vec<AttachmentDesc>,
    pub strategy_stats: StrategyStats,
    pub strategy_failures: u64,

    pub focused: bool,
    pub minimized: bool,
}

impl DebugSnapshot {
    /// Frame time in milliseconds.
    pub fn frame_ms(&self) -> f64 {
        self.dt * 1000.0
    }

    pub fn fps(&self) -> f64 {
        if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 }
    }
}
