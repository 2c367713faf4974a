//! Vizor engine crate.
//!
//! Frame orchestration for GPU rendering: a bounded set of frames in flight, a
//! presentation surface that survives resizes, offscreen targets negotiated with
//! a pluggable [`RenderingStrategy`], and a fixed per-frame composition order.
//!
//! The core is backend-agnostic ([`backend::Backend`]); [`device::WgpuBackend`]
//! drives a real GPU and [`backend::HeadlessBackend`] simulates one.

pub mod backend;
pub mod compose;
pub mod config;
pub mod debug;
pub mod device;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod overlay;
pub mod reload;
pub mod strategy;
pub mod surface;
pub mod sync;
pub mod time;
pub mod window;

pub use config::EngineConfig;
pub use debug::DebugSnapshot;
pub use engine::{EngineBuilder, FrameOutcome, Orchestrator};
pub use error::{EngineError, EngineResult, ErrorClass};
pub use event::EngineEvent;
pub use strategy::{CapabilitySet, Frame, RenderingStrategy, StrategyCtx};
