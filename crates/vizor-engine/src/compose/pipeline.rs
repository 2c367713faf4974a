use std::cell::RefCell;

use winit::dpi::PhysicalSize;

use crate::backend::{Backend, CompositeOp, SurfaceDesc};
use crate::compose::{Stage, StageTracker};
use crate::debug::DebugSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::overlay::Overlay;
use crate::strategy::{CapabilitySet, CompositionMode, Frame, RenderingStrategy, StrategyCtx};
use crate::surface::{ImageLayout, OffscreenTarget};
use crate::sync::DeletionQueue;

/// Presentation image handed to a custom composite hook.
///
/// Tracks the image layout so the engine can check the hook left the image in
/// a layout the rest of the frame can consume.
pub struct CompositeTarget<'a, B: Backend> {
    backend: &'a B,
    image: &'a B::Image,
    extent: PhysicalSize<u32>,
    format: wgpu::TextureFormat,
    layout: ImageLayout,
}

impl<'a, B: Backend> CompositeTarget<'a, B> {
    pub(crate) fn new(backend: &'a B, image: &'a B::Image, surface: &SurfaceDesc) -> Self {
        Self {
            backend,
            image,
            extent: surface.size,
            format: surface.format,
            layout: ImageLayout::Undefined,
        }
    }

    pub fn image(&self) -> &'a B::Image {
        self.image
    }

    pub fn extent(&self) -> PhysicalSize<u32> {
        self.extent
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Records a transition of the presentation image to `to`.
    pub fn transition(&mut self, recorder: &mut B::Recorder, to: ImageLayout) {
        if self.layout != to {
            self.backend.transition(recorder, self.image, self.layout, to);
            self.layout = to;
        }
    }
}

/// Everything one frame's composition borrows from the orchestrator.
pub(crate) struct FrameInputs<'a, B: Backend> {
    pub backend: &'a mut B,
    pub strategy: &'a mut (dyn RenderingStrategy<B> + 'static),
    pub overlay: Option<&'a mut (dyn Overlay<B> + 'static)>,
    pub surface: &'a SurfaceDesc,
    pub targets: &'a OffscreenTarget<B>,
    pub caps: &'a CapabilitySet,
    pub retired: &'a RefCell<DeletionQueue<B>>,
    pub snapshot: Option<DebugSnapshot>,
}

/// What happened while composing one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub stages: StageTracker,
    /// Strategy-local failures caught this frame.
    pub failures: Vec<EngineError>,
    /// `update` or `record_compute` failed; later recording hooks were skipped.
    pub recording_skipped: bool,
    /// A custom composite was rejected and the engine composite ran instead.
    pub composite_fallback: bool,
    pub overlay_drawn: bool,
}

impl FrameReport {
    fn strategy_failed(&mut self, strategy: &str, frame: &Frame, hook: &'static str, err: anyhow::Error) {
        log::warn!(
            target: "vizor_engine::frame",
            "frame {}: strategy `{strategy}` hook `{hook}` failed: {err:#}",
            frame.index
        );
        self.failures.push(EngineError::hook(hook, err));
    }
}

/// Records StrategyDraw, the composite stage, OverlayDraw and the final
/// transition to `Present` into `recorder`.
///
/// Strategy failures are caught and reported. Only backend errors are returned.
pub(crate) fn compose_frame<B: Backend>(
    inputs: FrameInputs<'_, B>,
    recorder: &mut B::Recorder,
    image: &B::Image,
    frame: &Frame,
) -> EngineResult<FrameReport> {
    let FrameInputs {
        backend,
        strategy,
        overlay,
        surface,
        targets,
        caps,
        retired,
        snapshot,
    } = inputs;
    let name = strategy.name().to_owned();
    let mut report = FrameReport::default();

    // Strategy draw.
    report.stages.enter(Stage::StrategyDraw);
    backend.push_debug_group(recorder, Stage::StrategyDraw.label());
    {
        let ctx = StrategyCtx::new(&*backend, surface, targets, caps, retired);
        let recorded = strategy
            .update(&ctx, frame)
            .map_err(|e| ("update", e))
            .and_then(|()| {
                strategy
                    .record_compute(recorder, &ctx, frame)
                    .map_err(|e| ("record_compute", e))
            });
        match recorded {
            Ok(()) => {
                if let Err(e) = strategy.record_graphics(recorder, &ctx, frame) {
                    report.strategy_failed(&name, frame, "record_graphics", e);
                }
            }
            Err((hook, e)) => {
                report.strategy_failed(&name, frame, hook, e);
                report.recording_skipped = true;
            }
        }
    }
    backend.pop_debug_group(recorder);

    // Composite.
    let mut layout = ImageLayout::Undefined;
    let mut composited = false;
    if caps.composition == CompositionMode::Custom {
        report.stages.enter(Stage::CustomComposite);
        backend.push_debug_group(recorder, Stage::CustomComposite.label());
        let ctx = StrategyCtx::new(&*backend, surface, targets, caps, retired);
        let mut target = CompositeTarget::new(&*backend, image, surface);
        let result = strategy.composite(recorder, &ctx, frame, &mut target);
        layout = target.layout();
        match result {
            Ok(()) if layout.is_composite_output() => composited = true,
            Ok(()) => {
                log::warn!(
                    target: "vizor_engine::frame",
                    "frame {}: custom composite left image in {layout:?}; using engine composite",
                    frame.index
                );
                report.failures.push(EngineError::CompositeLayout(layout));
            }
            Err(e) => report.strategy_failed(&name, frame, "composite", e),
        }
        backend.pop_debug_group(recorder);
        report.composite_fallback = !composited;
    }

    if !composited {
        report.stages.enter(Stage::EngineComposite);
        backend.push_debug_group(recorder, Stage::EngineComposite.label());
        engine_composite(backend, recorder, image, targets, surface, &mut layout)?;
        backend.pop_debug_group(recorder);
    }

    // Overlay.
    report.stages.enter(Stage::OverlayDraw);
    if let (true, Some(overlay)) = (caps.overlay, overlay) {
        backend.push_debug_group(recorder, Stage::OverlayDraw.label());
        if let Some(snapshot) = snapshot.as_ref() {
            overlay.begin_frame(snapshot);
        }

        let ctx = StrategyCtx::new(&*backend, surface, targets, caps, retired);
        if let Err(e) = strategy.record_overlay_content(&ctx, frame, overlay.content()) {
            report.strategy_failed(&name, frame, "record_overlay_content", e);
        }

        let be: &B = backend;
        match overlay.prepare(be, surface) {
            Ok(()) => {
                if layout != ImageLayout::ColorAttachment {
                    be.transition(recorder, image, layout, ImageLayout::ColorAttachment);
                    layout = ImageLayout::ColorAttachment;
                }
                let mut rendered = Ok(());
                be.record_load_pass(recorder, image, "vizor overlay", &mut |pass: &mut B::Pass<'_>| {
                    rendered = overlay.render(be, pass, surface);
                });
                match rendered {
                    Ok(()) => report.overlay_drawn = true,
                    Err(e) => log::warn!(target: "vizor_engine::frame", "overlay render failed: {e:#}"),
                }
            }
            Err(e) => log::warn!(target: "vizor_engine::frame", "overlay prepare failed: {e:#}"),
        }
        be.pop_debug_group(recorder);
    }

    // Hand the image to presentation.
    report.stages.enter(Stage::Present);
    backend.push_debug_group(recorder, Stage::Present.label());
    backend.transition(recorder, image, layout, ImageLayout::Present);
    backend.pop_debug_group(recorder);

    Ok(report)
}

/// Copies or blits the presentation attachment into `image`.
fn engine_composite<B: Backend>(
    backend: &mut B,
    recorder: &mut B::Recorder,
    image: &B::Image,
    targets: &OffscreenTarget<B>,
    surface: &SurfaceDesc,
    layout: &mut ImageLayout,
) -> EngineResult<()> {
    let Some(src) = targets.presentation() else {
        // Custom composition without attachments: nothing to copy from.
        backend.transition(recorder, image, *layout, ImageLayout::ColorAttachment);
        *layout = ImageLayout::ColorAttachment;
        return Ok(());
    };

    let op = CompositeOp::select(src.size(), src.format(), surface.size, surface.format, surface.usage);
    let to = op.resulting_layout();
    backend.transition(recorder, image, *layout, to);
    backend.composite(recorder, src.handle(), image, op)?;
    *layout = to;
    Ok(())
}
