//! Per-frame composition: strategy draw, composite, overlay, present.

mod pipeline;
mod stage;

pub use pipeline::{CompositeTarget, FrameReport};
pub use stage::{Stage, StageTracker};

pub(crate) use pipeline::{FrameInputs, compose_frame};
