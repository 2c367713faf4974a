//! wgpu implementation of the backend seam.
//!
//! Responsibilities:
//! - adapter/device creation for one window
//! - surface configuration and swapchain image acquisition
//! - offscreen attachments, copy/blit composition and completion tracking
//! - the meter HUD overlay

mod blit;
mod context;
mod hud;
mod init;
mod surface;
mod timeline;

pub use context::{WgpuAttachment, WgpuBackend, WgpuImage, WgpuRecorder, WgpuSignal};
pub use hud::HudOverlay;
pub use init::GpuInit;
