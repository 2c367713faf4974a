//! Scripted strategy and overlay shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use vizor_engine::backend::{Backend, HeadlessBackend, HeadlessPass, HeadlessRecorder, RecordedOp, SurfaceDesc};
use vizor_engine::compose::CompositeTarget;
use vizor_engine::debug::DebugSnapshot;
use vizor_engine::overlay::{Overlay, OverlayContent};
use vizor_engine::strategy::{AttachmentDesc, CapabilitySet, CompositionMode, OptionValue};
use vizor_engine::surface::ImageLayout;
use vizor_engine::{EngineConfig, Frame, Orchestrator, RenderingStrategy, StrategyCtx};
use winit::dpi::PhysicalSize;

pub const WINDOW: PhysicalSize<u32> = PhysicalSize::new(640, 480);

pub const GRAPHICS: &str = "scripted graphics";
pub const COMPUTE: &str = "scripted compute";
pub const HUD: &str = "hud";

/// What a custom composite hook does with the presentation image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CustomComposite {
    /// Leaves the image as a colour attachment.
    Valid,
    /// Leaves the image in a layout the rest of the frame cannot use.
    WrongLayout,
    Fails,
}

/// Everything the scripted strategy observed, shared with the test body.
#[derive(Debug, Default)]
pub struct HookLog {
    pub hooks: Vec<String>,
    pub extents: Vec<PhysicalSize<u32>>,
    pub events: Vec<String>,
    pub reloads: u32,
    pub resizes: u32,
    pub overlay_calls: u32,
    pub screenshots: Vec<PathBuf>,
    /// Retired resources in destruction order, with the completed value seen
    /// when each destructor ran.
    pub destroyed: Vec<(&'static str, u64)>,
}

pub struct Scripted {
    caps: CapabilitySet,
    log: Rc<RefCell<HookLog>>,
    fail_init: bool,
    fail_update: HashSet<u64>,
    fail_compute: HashSet<u64>,
    fail_overlay: HashSet<u64>,
    fail_resize: bool,
    fail_screenshot: bool,
    retire_at: Option<u64>,
    custom: CustomComposite,
    exposure: f64,
}

impl Scripted {
    pub fn new(caps: CapabilitySet) -> (Self, Rc<RefCell<HookLog>>) {
        let log = Rc::new(RefCell::new(HookLog::default()));
        let scripted = Self {
            caps,
            log: Rc::clone(&log),
            fail_init: false,
            fail_update: HashSet::new(),
            fail_compute: HashSet::new(),
            fail_overlay: HashSet::new(),
            fail_resize: false,
            fail_screenshot: false,
            retire_at: None,
            custom: CustomComposite::Valid,
            exposure: 1.0,
        };
        (scripted, log)
    }

    /// One colour attachment, default composition, overlay enabled.
    pub fn single_color() -> (Self, Rc<RefCell<HookLog>>) {
        Self::new(single_color_caps())
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_update_at(mut self, frame: u64) -> Self {
        self.fail_update.insert(frame);
        self
    }

    pub fn failing_compute_at(mut self, frame: u64) -> Self {
        self.fail_compute.insert(frame);
        self
    }

    pub fn failing_overlay_content_at(mut self, frame: u64) -> Self {
        self.fail_overlay.insert(frame);
        self
    }

    pub fn failing_resize(mut self) -> Self {
        self.fail_resize = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    /// Retires two resources, `"first"` then `"second"`, while recording `frame`.
    pub fn retiring_at(mut self, frame: u64) -> Self {
        self.retire_at = Some(frame);
        self
    }

    pub fn with_custom(mut self, custom: CustomComposite) -> Self {
        self.custom = custom;
        self
    }

    fn hook(&self, name: &str) {
        self.log.borrow_mut().hooks.push(name.to_owned());
    }
}

pub fn single_color_caps() -> CapabilitySet {
    CapabilitySet::new().with_attachment(AttachmentDesc::color(
        "color",
        wgpu::TextureFormat::Rgba8Unorm,
    ))
}

impl RenderingStrategy<HeadlessBackend> for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn negotiate_capabilities(&mut self) -> CapabilitySet {
        self.hook("negotiate");
        self.caps.clone()
    }

    fn initialize(
        &mut self,
        _ctx: &StrategyCtx<'_, HeadlessBackend>,
        _caps: &CapabilitySet,
    ) -> anyhow::Result<()> {
        self.hook("initialize");
        if self.fail_init {
            anyhow::bail!("scripted refused to initialize");
        }
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &StrategyCtx<'_, HeadlessBackend>) -> anyhow::Result<()> {
        self.log.borrow_mut().resizes += 1;
        if self.fail_resize {
            anyhow::bail!("resize-dependent pipeline rejected");
        }
        Ok(())
    }

    fn on_event(&mut self, _ctx: &StrategyCtx<'_, HeadlessBackend>, event: &String) {
        self.log.borrow_mut().events.push(event.clone());
    }

    fn update(&mut self, _ctx: &StrategyCtx<'_, HeadlessBackend>, frame: &Frame) -> anyhow::Result<()> {
        if self.fail_update.contains(&frame.index) {
            anyhow::bail!("simulation diverged at frame {}", frame.index);
        }
        Ok(())
    }

    fn record_compute(
        &mut self,
        recorder: &mut HeadlessRecorder,
        _ctx: &StrategyCtx<'_, HeadlessBackend>,
        frame: &Frame,
    ) -> anyhow::Result<()> {
        if self.fail_compute.contains(&frame.index) {
            anyhow::bail!("dispatch rejected at frame {}", frame.index);
        }
        recorder.dispatch(COMPUTE);
        Ok(())
    }

    fn record_graphics(
        &mut self,
        recorder: &mut HeadlessRecorder,
        ctx: &StrategyCtx<'_, HeadlessBackend>,
        frame: &Frame,
    ) -> anyhow::Result<()> {
        recorder.draw(GRAPHICS);
        self.log.borrow_mut().extents.push(frame.extent);
        if self.retire_at == Some(frame.index) {
            for label in ["first", "second"] {
                let log = Rc::clone(&self.log);
                ctx.retire(label, move |backend: &mut HeadlessBackend| {
                    log.borrow_mut().destroyed.push((label, backend.completed_value()));
                });
            }
        }
        Ok(())
    }

    fn composite(
        &mut self,
        recorder: &mut HeadlessRecorder,
        _ctx: &StrategyCtx<'_, HeadlessBackend>,
        _frame: &Frame,
        target: &mut CompositeTarget<'_, HeadlessBackend>,
    ) -> anyhow::Result<()> {
        match self.custom {
            CustomComposite::Valid => {
                target.transition(recorder, ImageLayout::ColorAttachment);
                recorder.draw("tonemap");
                Ok(())
            }
            CustomComposite::WrongLayout => {
                target.transition(recorder, ImageLayout::ShaderRead);
                Ok(())
            }
            CustomComposite::Fails => anyhow::bail!("tonemap pipeline missing"),
        }
    }

    fn record_overlay_content(
        &mut self,
        _ctx: &StrategyCtx<'_, HeadlessBackend>,
        frame: &Frame,
        content: &mut OverlayContent,
    ) -> anyhow::Result<()> {
        self.log.borrow_mut().overlay_calls += 1;
        if self.fail_overlay.contains(&frame.index) {
            anyhow::bail!("overlay rows unavailable at frame {}", frame.index);
        }
        content.meter("exposure", self.exposure as f32, 4.0);
        Ok(())
    }

    fn reload_assets(&mut self, _ctx: &StrategyCtx<'_, HeadlessBackend>) -> anyhow::Result<()> {
        self.log.borrow_mut().reloads += 1;
        Ok(())
    }

    fn request_screenshot(
        &mut self,
        _ctx: &StrategyCtx<'_, HeadlessBackend>,
        path: &Path,
    ) -> anyhow::Result<()> {
        self.log.borrow_mut().screenshots.push(path.to_path_buf());
        if self.fail_screenshot {
            anyhow::bail!("no readback buffer for {}", path.display());
        }
        Ok(())
    }

    fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        match (key, value.as_float()) {
            ("exposure", Some(v)) => {
                self.exposure = v;
                true
            }
            _ => false,
        }
    }

    fn option(&self, key: &str) -> Option<OptionValue> {
        (key == "exposure").then_some(OptionValue::Float(self.exposure))
    }

    fn on_teardown(&mut self, _ctx: &StrategyCtx<'_, HeadlessBackend>) {
        self.hook("teardown");
    }

    fn destroy(&mut self, _backend: &HeadlessBackend) {
        self.hook("destroy");
    }
}

/// Overlay that draws one labelled op per meter.
#[derive(Default)]
pub struct MeterOverlay {
    content: OverlayContent,
    prepared: usize,
    pub snapshots: Rc<RefCell<Vec<DebugSnapshot>>>,
}

impl Overlay<HeadlessBackend> for MeterOverlay {
    fn begin_frame(&mut self, snapshot: &DebugSnapshot) {
        self.content.clear();
        self.snapshots.borrow_mut().push(snapshot.clone());
    }

    fn content(&mut self) -> &mut OverlayContent {
        &mut self.content
    }

    fn prepare(&mut self, _backend: &HeadlessBackend, _surface: &SurfaceDesc) -> anyhow::Result<()> {
        self.prepared = self.content.items().len();
        Ok(())
    }

    fn render(
        &mut self,
        _backend: &HeadlessBackend,
        pass: &mut HeadlessPass<'_>,
        _surface: &SurfaceDesc,
    ) -> anyhow::Result<()> {
        for _ in 0..self.prepared {
            pass.draw(HUD);
        }
        Ok(())
    }
}

pub fn backend() -> HeadlessBackend {
    HeadlessBackend::new(WINDOW)
}

pub fn engine(backend: HeadlessBackend, scripted: Scripted) -> Orchestrator<HeadlessBackend> {
    Orchestrator::builder()
        .backend(backend)
        .strategy(scripted)
        .overlay(MeterOverlay::default())
        .config(EngineConfig::default())
        .build()
        .expect("engine init")
}

pub fn custom_caps() -> CapabilitySet {
    single_color_caps().with_composition(CompositionMode::Custom)
}

/// Debug-group labels of one submission, in recording order.
pub fn stage_labels(ops: &[RecordedOp]) -> Vec<&str> {
    ops.iter()
        .filter_map(|op| match op {
            RecordedOp::PushGroup(label) => Some(label.as_str()),
            _ => None,
        })
        .collect()
}

pub fn draws(ops: &[RecordedOp], label: &str) -> usize {
    ops.iter()
        .filter(|op| matches!(op, RecordedOp::Draw(l) if l == label))
        .count()
}

pub fn dispatches(ops: &[RecordedOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, RecordedOp::Dispatch(_)))
        .count()
}

/// xorshift64*; deterministic across platforms.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}
