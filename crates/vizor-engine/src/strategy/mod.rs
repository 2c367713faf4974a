//! Rendering strategy plug-in contract.
//!
//! A strategy declares its resource needs once through
//! [`RenderingStrategy::negotiate_capabilities`] and is then driven through a
//! fixed set of hooks. It never owns engine resources; it only records commands
//! against them.
//!
//! Hook order:
//! `negotiate_capabilities` → `initialize` → per frame
//! {`on_resize` (after a rebuild), `update`, `record_compute`, `record_graphics`,
//! `composite` (custom composition only), `record_overlay_content`} →
//! `on_teardown` → `destroy`.

mod caps;
mod context;
mod options;

use std::path::Path;

pub use caps::{
    AttachmentDesc, CapabilitySet, CompositionMode, DEFAULT_FRAMES_IN_FLIGHT,
    MAX_FRAMES_IN_FLIGHT, TargetSize,
};
pub use context::{Frame, StrategyCtx};
pub use options::{OptionValue, StrategyStats};

use crate::backend::Backend;
use crate::compose::CompositeTarget;
use crate::overlay::OverlayContent;

pub trait RenderingStrategy<B: Backend> {
    fn name(&self) -> &str;

    /// Called exactly once, before any engine resource exists.
    fn negotiate_capabilities(&mut self) -> CapabilitySet;

    /// A failure here aborts engine startup.
    fn initialize(&mut self, ctx: &StrategyCtx<'_, B>, caps: &CapabilitySet) -> anyhow::Result<()>;

    /// Surface (and resolution-derived targets) were rebuilt.
    fn on_resize(&mut self, ctx: &StrategyCtx<'_, B>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Platform event the engine does not interpret itself.
    fn on_event(&mut self, ctx: &StrategyCtx<'_, B>, event: &B::Event) {
        let _ = (ctx, event);
    }

    /// CPU-side simulation step. A failure skips this frame's recording hooks.
    fn update(&mut self, ctx: &StrategyCtx<'_, B>, frame: &Frame) -> anyhow::Result<()> {
        let _ = (ctx, frame);
        Ok(())
    }

    fn record_compute(
        &mut self,
        recorder: &mut B::Recorder,
        ctx: &StrategyCtx<'_, B>,
        frame: &Frame,
    ) -> anyhow::Result<()> {
        let _ = (recorder, ctx, frame);
        Ok(())
    }

    fn record_graphics(
        &mut self,
        recorder: &mut B::Recorder,
        ctx: &StrategyCtx<'_, B>,
        frame: &Frame,
    ) -> anyhow::Result<()> {
        let _ = (recorder, ctx, frame);
        Ok(())
    }

    /// Custom composition into the presentation image.
    ///
    /// Only called when the negotiated [`CompositionMode`] is `Custom`. On return
    /// `target` must be in `ColorAttachment` or `TransferDst`; otherwise the
    /// engine falls back to its own composite.
    fn composite(
        &mut self,
        recorder: &mut B::Recorder,
        ctx: &StrategyCtx<'_, B>,
        frame: &Frame,
        target: &mut CompositeTarget<'_, B>,
    ) -> anyhow::Result<()> {
        let _ = (recorder, ctx, frame, target);
        anyhow::bail!("custom composition requested but `composite` is not implemented")
    }

    fn record_overlay_content(
        &mut self,
        ctx: &StrategyCtx<'_, B>,
        frame: &Frame,
        content: &mut OverlayContent,
    ) -> anyhow::Result<()> {
        let _ = (ctx, frame, content);
        Ok(())
    }

    /// Reloads shaders or other assets from disk.
    fn reload_assets(&mut self, ctx: &StrategyCtx<'_, B>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Asks for the next rendered frame to be written to `path`. Called before
    /// that frame is recorded; strategies without capture support ignore it.
    fn request_screenshot(&mut self, ctx: &StrategyCtx<'_, B>, path: &Path) -> anyhow::Result<()> {
        let _ = ctx;
        log::debug!("strategy `{}` ignores screenshot to {}", self.name(), path.display());
        Ok(())
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats::default()
    }

    /// Returns `false` when `key` is unknown or `value` has the wrong type.
    fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        let _ = (key, value);
        false
    }

    fn option(&self, key: &str) -> Option<OptionValue> {
        let _ = key;
        None
    }

    /// Last hook with engine resources alive. The GPU is idle.
    fn on_teardown(&mut self, ctx: &StrategyCtx<'_, B>) {
        let _ = ctx;
    }

    /// Engine resources are gone; release whatever the strategy still owns.
    fn destroy(&mut self, backend: &B) {
        let _ = backend;
    }
}
