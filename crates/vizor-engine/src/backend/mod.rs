//! GPU backend seam.
//!
//! The orchestration core never talks to a graphics API directly. Everything it
//! needs from a device (surface images, binary signals, command recorders,
//! submission with a completion value, waiting on that value) goes through the
//! [`Backend`] trait.
//!
//! Two implementations ship with the crate:
//! - [`crate::device::WgpuBackend`]: the real device, built on wgpu.
//! - [`HeadlessBackend`]: a simulated GPU that records every call, used by tests
//!   and by headless runs.

mod headless;

pub use headless::{
    HeadlessAttachment, HeadlessBackend, HeadlessImage, HeadlessPass, HeadlessRecorder,
    HeadlessSignal, LogEntry, RecordedOp,
};

use winit::dpi::PhysicalSize;

use crate::error::EngineResult;
use crate::surface::ImageLayout;

/// Parameters used to (re)build the presentation surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRequest {
    /// Requested size in physical pixels; already clamped to at least 1x1.
    pub size: PhysicalSize<u32>,

    /// Preferred presentation mode. Falls back to FIFO when unsupported.
    pub present_mode: wgpu::PresentMode,

    /// Prefer an sRGB surface format when one is available.
    pub prefer_srgb: bool,

    /// Usages the engine needs on presentable images (render target, copy dest).
    pub usage: wgpu::TextureUsages,

    /// Hint for the number of frames queued for presentation.
    pub desired_maximum_frame_latency: u32,
}

/// What the backend actually built for a [`SurfaceRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDesc {
    pub format: wgpu::TextureFormat,
    pub size: PhysicalSize<u32>,
    pub present_mode: wgpu::PresentMode,
    pub usage: wgpu::TextureUsages,
    pub image_count: u32,
}

/// Result of asking the surface for its next image.
#[derive(Debug)]
pub enum Acquisition<I> {
    Ready { image: I, index: u32 },
    /// Surface no longer matches the output geometry; rebuild and retry.
    Stale,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PresentStatus {
    Presented,
    /// Presented (or dropped) but the surface must be rebuilt.
    Stale,
}

/// How the engine moves the offscreen colour target into the presentation image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompositeOp {
    /// 1:1 copy; only valid for equal extents and formats.
    Copy,
    /// Filtered scale into the destination extent.
    Blit { filter: wgpu::FilterMode },
}

impl CompositeOp {
    /// Picks a copy when source and destination agree, a linear blit otherwise.
    pub fn select(
        src_size: PhysicalSize<u32>,
        src_format: wgpu::TextureFormat,
        dst_size: PhysicalSize<u32>,
        dst_format: wgpu::TextureFormat,
        dst_usage: wgpu::TextureUsages,
    ) -> Self {
        let copyable = src_size == dst_size
            && src_format == dst_format
            && dst_usage.contains(wgpu::TextureUsages::COPY_DST);
        if copyable {
            Self::Copy
        } else {
            Self::Blit {
                filter: wgpu::FilterMode::Linear,
            }
        }
    }

    /// Layout the destination image is left in after the operation.
    pub fn resulting_layout(self) -> ImageLayout {
        match self {
            Self::Copy => ImageLayout::TransferDst,
            Self::Blit { .. } => ImageLayout::ColorAttachment,
        }
    }
}

/// Fully resolved description of one offscreen attachment to allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentSpec {
    pub label: String,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub size: PhysicalSize<u32>,
}

/// Device-facing operations required by the orchestrator.
///
/// Implementations are driven from a single thread. Submissions arrive in frame
/// order and every `submit` carries a strictly increasing `value`.
pub trait Backend: 'static {
    /// Records GPU commands for one frame.
    type Recorder;
    /// Binary GPU-side signal (image acquired / rendering complete).
    type Signal;
    /// Presentable image acquired for the current frame.
    type Image;
    /// Offscreen render target allocated on the device.
    type Attachment;
    /// Render pass opened on a presentable image with its contents preserved.
    type Pass<'p>;
    /// Platform event type forwarded verbatim to strategies and the overlay.
    type Event: std::fmt::Debug + 'static;

    fn name(&self) -> &str;

    /// Live size of the output window in physical pixels.
    fn window_size(&self) -> PhysicalSize<u32>;

    fn configure_surface(&mut self, request: &SurfaceRequest) -> EngineResult<SurfaceDesc>;

    /// Releases the surface and every image it owns.
    fn release_surface(&mut self);

    fn acquire_image(&mut self, acquired: &Self::Signal) -> EngineResult<Acquisition<Self::Image>>;

    fn present(&mut self, image: Self::Image, wait: &Self::Signal) -> EngineResult<PresentStatus>;

    fn create_signal(&mut self, label: &str) -> EngineResult<Self::Signal>;

    fn destroy_signal(&mut self, signal: Self::Signal);

    fn create_attachment(&mut self, spec: &AttachmentSpec) -> EngineResult<Self::Attachment>;

    fn destroy_attachment(&mut self, attachment: Self::Attachment);

    /// Returns a ready-to-record command recorder for ring slot `slot`.
    fn begin_recording(&mut self, slot: usize) -> EngineResult<Self::Recorder>;

    fn push_debug_group(&self, recorder: &mut Self::Recorder, label: &str);

    fn pop_debug_group(&self, recorder: &mut Self::Recorder);

    /// Records a layout transition. Backends with implicit layouts ignore it.
    fn transition(
        &self,
        recorder: &mut Self::Recorder,
        image: &Self::Image,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        let _ = (recorder, image, from, to);
    }

    fn composite(
        &mut self,
        recorder: &mut Self::Recorder,
        src: &Self::Attachment,
        dst: &Self::Image,
        op: CompositeOp,
    ) -> EngineResult<()>;

    /// Opens a load-preserving pass on `target`, runs `draw`, and closes it.
    fn record_load_pass(
        &self,
        recorder: &mut Self::Recorder,
        target: &Self::Image,
        label: &str,
        draw: &mut dyn FnMut(&mut Self::Pass<'_>),
    );

    /// Submits `recorder`, waiting on `wait` and signalling `signal` plus the
    /// completion value `value` when the GPU finishes this work.
    fn submit(
        &mut self,
        recorder: Self::Recorder,
        wait: &Self::Signal,
        signal: &Self::Signal,
        value: u64,
    ) -> EngineResult<()>;

    /// Highest completion value the GPU has reached.
    fn completed_value(&self) -> u64;

    /// Blocks until the GPU reaches `value`. No timeout: a wait that cannot
    /// resolve is reported as device loss.
    fn wait_for_value(&mut self, value: u64) -> EngineResult<()>;

    /// Blocks until all submitted work has completed.
    fn wait_idle(&mut self) -> EngineResult<()>;
}
