//! Optional debug overlay drawn on top of the composited frame.
//!
//! The engine calls [`Overlay::begin_frame`], lets the strategy fill the
//! [`OverlayContent`], calls [`Overlay::prepare`], then opens a load-preserving
//! pass on the presentation image and calls [`Overlay::render`] inside it.
//! The overlay owns its GPU state; nothing it allocates lives in the ring.

use crate::backend::{Backend, SurfaceDesc};
use crate::debug::DebugSnapshot;

/// Horizontal bar filled to `value / max`.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
    pub label: String,
    pub value: f32,
    pub max: f32,
}

/// Content collected for one overlay frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OverlayContent {
    items: Vec<OverlayItem>,
}

impl OverlayContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn meter(&mut self, label: impl Into<String>, value: f32, max: f32) {
        self.items.push(OverlayItem {
            label: label.into(),
            value,
            max,
        });
    }

    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl OverlayItem {
    /// Fill fraction in `0..=1`. A non-positive `max` never fills.
    pub fn fraction(&self) -> f32 {
        if self.max > 0.0 {
            (self.value / self.max).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub trait Overlay<B: Backend> {
    /// Starts a new overlay frame; previous content is discarded.
    fn begin_frame(&mut self, snapshot: &DebugSnapshot);

    /// Collector the strategy writes into during `record_overlay_content`.
    fn content(&mut self) -> &mut OverlayContent;

    /// Uploads whatever `render` needs. Runs outside any render pass.
    fn prepare(&mut self, backend: &B, surface: &SurfaceDesc) -> anyhow::Result<()>;

    /// Draws into an engine-opened pass on the presentation image.
    fn render(&mut self, backend: &B, pass: &mut B::Pass<'_>, surface: &SurfaceDesc)
    -> anyhow::Result<()>;

    fn on_event(&mut self, event: &B::Event) {
        let _ = event;
    }

    /// The presentation surface was rebuilt.
    fn on_resize(&mut self, backend: &B, surface: &SurfaceDesc) {
        let _ = (backend, surface);
    }

    fn shutdown(&mut self, backend: &B) {
        let _ = backend;
    }
}
