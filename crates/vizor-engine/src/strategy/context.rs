use std::cell::RefCell;

use winit::dpi::PhysicalSize;

use crate::backend::{Backend, SurfaceDesc};
use crate::strategy::CapabilitySet;
use crate::surface::OffscreenTarget;
use crate::sync::DeletionQueue;

/// Per-iteration data handed to every strategy hook of one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    /// Ring slot recording this frame.
    pub slot: usize,
    /// Presentable image this frame will be presented to.
    pub image_index: u32,
    pub dt: f64,
    pub elapsed: f64,
    /// Presentation surface extent.
    pub extent: PhysicalSize<u32>,
    /// Offscreen attachment extent.
    pub target_size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
}

/// Borrowed view of engine state available to strategy hooks.
///
/// Handles reached through the context are valid only for the duration of the
/// hook; the engine may rebuild the surface and the offscreen target between
/// frames.
pub struct StrategyCtx<'a, B: Backend> {
    backend: &'a B,
    surface: &'a SurfaceDesc,
    targets: &'a OffscreenTarget<B>,
    caps: &'a CapabilitySet,
    retired: &'a RefCell<DeletionQueue<B>>,
}

impl<'a, B: Backend> StrategyCtx<'a, B> {
    pub(crate) fn new(
        backend: &'a B,
        surface: &'a SurfaceDesc,
        targets: &'a OffscreenTarget<B>,
        caps: &'a CapabilitySet,
        retired: &'a RefCell<DeletionQueue<B>>,
    ) -> Self {
        Self {
            backend,
            surface,
            targets,
            caps,
            retired,
        }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn surface(&self) -> &'a SurfaceDesc {
        self.surface
    }

    pub fn targets(&self) -> &'a OffscreenTarget<B> {
        self.targets
    }

    pub fn capabilities(&self) -> &'a CapabilitySet {
        self.caps
    }

    /// Queues destruction of a resource the strategy no longer needs.
    ///
    /// The destructor runs once the GPU has finished every frame submitted so
    /// far that could still reference the resource.
    pub fn retire(&self, label: &'static str, destroy: impl FnOnce(&mut B) + 'static) {
        self.retired.borrow_mut().push(label, destroy);
    }
}
