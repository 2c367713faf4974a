use winit::dpi::PhysicalSize;

use crate::backend::{Acquisition, Backend, SurfaceDesc, SurfaceRequest};
use crate::error::{EngineError, EngineResult};

/// Clamps a requested extent to at least 1x1.
pub fn clamp_extent(size: PhysicalSize<u32>) -> PhysicalSize<u32> {
    PhysicalSize::new(size.width.max(1), size.height.max(1))
}

/// Set of presentable images bound to the output window.
///
/// The surface is either fully built (a [`SurfaceDesc`] is present) or absent.
/// A failed `create` leaves it absent.
#[derive(Debug)]
pub struct PresentationSurface {
    request: SurfaceRequest,
    desc: Option<SurfaceDesc>,
    last: Option<SurfaceDesc>,
    image_cursor: u32,
    rebuilds: u64,
}

impl PresentationSurface {
    pub fn new(request: SurfaceRequest) -> Self {
        Self {
            request,
            desc: None,
            last: None,
            image_cursor: 0,
            rebuilds: 0,
        }
    }

    /// Builds the surface at `size`.
    ///
    /// The extent is clamped to at least 1x1; the negotiated format and image
    /// count are whatever the backend reports.
    pub fn create<B: Backend>(
        &mut self,
        backend: &mut B,
        size: PhysicalSize<u32>,
    ) -> EngineResult<&SurfaceDesc> {
        if self.desc.is_some() {
            self.destroy(backend);
        }

        let mut request = self.request.clone();
        request.size = clamp_extent(size);

        let desc = backend.configure_surface(&request)?;
        if desc.image_count == 0 {
            backend.release_surface();
            return Err(EngineError::SurfaceConfiguration(
                "backend reported zero presentable images".into(),
            ));
        }

        log::info!(
            "surface: {}x{} {:?} {:?} images={}",
            desc.size.width,
            desc.size.height,
            desc.format,
            desc.present_mode,
            desc.image_count
        );

        self.request = request;
        self.image_cursor = 0;
        self.last = Some(desc.clone());
        Ok(self.desc.insert(desc))
    }

    /// Asks for the next presentable image.
    ///
    /// Returns [`Acquisition::Stale`] without touching the backend when the
    /// window no longer matches the configured extent.
    pub fn acquire_next<B: Backend>(
        &mut self,
        backend: &mut B,
        acquired: &B::Signal,
    ) -> EngineResult<Acquisition<B::Image>> {
        let desc = self.desc.as_ref().ok_or(EngineError::NotInitialized)?;
        if clamp_extent(backend.window_size()) != desc.size {
            return Ok(Acquisition::Stale);
        }

        let acquisition = backend.acquire_image(acquired)?;
        if let Acquisition::Ready { index, .. } = &acquisition {
            self.image_cursor = *index;
        }
        Ok(acquisition)
    }

    /// Releases every presentable image. Callers must ensure the GPU is idle.
    pub fn destroy<B: Backend>(&mut self, backend: &mut B) {
        if self.desc.take().is_some() {
            backend.release_surface();
            log::debug!("surface released");
        }
    }

    /// Rebuilds the surface at the window's current size.
    ///
    /// Calling this repeatedly without a geometry change yields an identical
    /// description each time.
    pub fn recreate<B: Backend>(&mut self, backend: &mut B) -> EngineResult<&SurfaceDesc> {
        let size = backend.window_size();
        self.destroy(backend);
        self.rebuilds += 1;
        self.create(backend, size)
    }

    pub fn desc(&self) -> Option<&SurfaceDesc> {
        self.desc.as_ref()
    }

    /// The live description, or the one from the most recent successful
    /// `create` if the surface has since been released.
    pub fn last_desc(&self) -> Option<&SurfaceDesc> {
        self.desc.as_ref().or(self.last.as_ref())
    }

    pub fn is_live(&self) -> bool {
        self.desc.is_some()
    }

    pub fn extent(&self) -> Option<PhysicalSize<u32>> {
        self.desc.as_ref().map(|d| d.size)
    }

    /// `true` when the surface exists and matches `size` after clamping.
    pub fn matches(&self, size: PhysicalSize<u32>) -> bool {
        self.extent() == Some(clamp_extent(size))
    }

    /// Index of the most recently acquired image.
    pub fn last_image_index(&self) -> u32 {
        self.image_cursor
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}
