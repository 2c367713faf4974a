//! Frame timing.
//!
//! One `FrameClock` per orchestrator; `tick()` once per loop iteration yields
//! the `dt`/`elapsed` pair handed to rendering strategies.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
