//! Presentation surface and offscreen render targets.

mod negotiate;
mod offscreen;
mod presentation;

pub use negotiate::{choose_alpha_mode, choose_present_mode, choose_surface_format};
pub use offscreen::{Attachment, OffscreenTarget};
pub use presentation::{PresentationSurface, clamp_extent};

/// Layout a presentable image is in while a frame is being composed.
///
/// wgpu tracks layouts implicitly; the engine still tracks them so that custom
/// composite hooks have a precise contract to honour.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageLayout {
    /// Contents undefined; freshly acquired.
    Undefined,
    ColorAttachment,
    TransferDst,
    ShaderRead,
    General,
    /// Ready to hand back to the presentation engine.
    Present,
}

impl ImageLayout {
    /// Layouts a custom composite may leave the presentation image in.
    pub fn is_composite_output(self) -> bool {
        matches!(self, Self::ColorAttachment | Self::TransferDst)
    }
}
