use std::path::PathBuf;

use winit::dpi::PhysicalSize;

/// Event consumed by the orchestrator.
///
/// The engine interprets the lifecycle variants itself; `Other` is forwarded
/// verbatim to the strategy and the overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent<E> {
    Quit,
    Resized(PhysicalSize<u32>),
    Minimized,
    Restored,
    Focus(bool),
    ReloadRequested,
    /// Capture the next frame to the given file.
    ScreenshotRequested(PathBuf),
    Other(E),
}

impl<E> EngineEvent<E> {
    pub fn is_quit(&self) -> bool {
        matches!(self, Self::Quit)
    }
}
