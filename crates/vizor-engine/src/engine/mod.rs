//! Frame orchestrator: init, run loop, rebuild and shutdown.

mod builder;
mod orchestrator;

pub use builder::EngineBuilder;
pub use orchestrator::{FrameOutcome, Orchestrator};
