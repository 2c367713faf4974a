//! Frame pacing: completion counter, resource ring and deferred destruction.

mod counter;
mod deletion;
mod ring;

pub use counter::CompletionCounter;
pub use deletion::DeletionQueue;
pub use ring::{ResourceRing, ResourceSlot};
