//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, builds a [`crate::Orchestrator`] on a
//! [`crate::device::WgpuBackend`] and drives one frame per redraw.

mod runtime;

pub use runtime::Runtime;
