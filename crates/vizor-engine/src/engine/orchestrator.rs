use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::backend::{Acquisition, Backend, PresentStatus};
use crate::compose::{FrameInputs, FrameReport, compose_frame};
use crate::config::EngineConfig;
use crate::debug::DebugSnapshot;
use crate::engine::EngineBuilder;
use crate::error::{EngineError, EngineResult};
use crate::event::EngineEvent;
use crate::overlay::Overlay;
use crate::reload::HotReloadWatcher;
use crate::strategy::{CapabilitySet, Frame, OptionValue, RenderingStrategy, StrategyCtx};
use crate::surface::{OffscreenTarget, PresentationSurface};
use crate::sync::{CompletionCounter, DeletionQueue, ResourceRing};
use crate::time::{FrameClock, FrameTime};

/// Engine-owned GPU resources. Torn down through the engine deletion queue.
pub(crate) struct Core<B: Backend> {
    backend: B,
    surface: PresentationSurface,
    offscreen: Option<OffscreenTarget<B>>,
    ring: Option<ResourceRing<B>>,
}

impl<B: Backend> Core<B> {
    fn ctx<'a>(
        &'a self,
        caps: &'a CapabilitySet,
        retired: &'a RefCell<DeletionQueue<B>>,
    ) -> EngineResult<StrategyCtx<'a, B>> {
        let surface = self.surface.desc().ok_or(EngineError::NotInitialized)?;
        let targets = self.offscreen.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(StrategyCtx::new(&self.backend, surface, targets, caps, retired))
    }

    /// Like [`ctx`](Self::ctx) but tolerates a half-built state: the last
    /// known surface description stands in for a missing surface and an
    /// attachment-less target for missing targets. Returns `false` only if no
    /// surface was ever built.
    fn with_teardown_ctx(
        &self,
        caps: &CapabilitySet,
        retired: &RefCell<DeletionQueue<B>>,
        f: impl FnOnce(&StrategyCtx<'_, B>),
    ) -> bool {
        let Some(surface) = self.surface.last_desc() else {
            return false;
        };
        let empty;
        let targets = match self.offscreen.as_ref() {
            Some(targets) => targets,
            None => {
                empty = OffscreenTarget::empty(caps, surface.size);
                &empty
            }
        };
        f(&StrategyCtx::new(&self.backend, surface, targets, caps, retired));
        true
    }
}

/// Result of one [`Orchestrator::run_frame`] call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// A frame was submitted with completion value `value` and presented.
    Presented { frame_index: u64, value: u64 },
    /// Window minimised or zero-sized; nothing was recorded.
    Idle,
    /// The surface was rebuilt; rendering resumes next iteration.
    Rebuilt,
    /// Acquisition reported a stale surface; a rebuild is pending.
    SurfaceStale,
    /// The loop has stopped.
    Stopped,
}

#[derive(Debug)]
struct LoopState {
    frame_index: u64,
    running: bool,
    needs_rebuild: bool,
    minimized: bool,
    focused: bool,
    reload_requested: bool,
    screenshot: Option<PathBuf>,
}

/// Owns the frame loop and every engine resource.
///
/// Lifecycle: [`EngineBuilder::build`] → [`run`](Self::run) or repeated
/// [`run_frame`](Self::run_frame) → [`shutdown`](Self::shutdown). Independent
/// instances share no state.
pub struct Orchestrator<B: Backend> {
    core: Core<B>,
    strategy: Box<dyn RenderingStrategy<B>>,
    overlay: Option<Box<dyn Overlay<B>>>,
    caps: CapabilitySet,

    counter: CompletionCounter,
    clock: FrameClock,
    teardown: DeletionQueue<Core<B>>,
    retired: RefCell<DeletionQueue<B>>,
    watcher: Option<HotReloadWatcher>,

    state: LoopState,
    last_time: Option<FrameTime>,
    last_report: Option<FrameReport>,
    strategy_failures: u64,
    presented: u64,
    shut_down: bool,
}

impl<B: Backend> Orchestrator<B> {
    pub fn builder() -> EngineBuilder<B> {
        EngineBuilder::new()
    }

    /// Negotiates capabilities, then builds surface, offscreen target and ring
    /// in that order and initializes the strategy.
    ///
    /// Any failure releases what was already built; no engine is returned.
    pub(crate) fn init(
        backend: B,
        mut strategy: Box<dyn RenderingStrategy<B>>,
        overlay: Option<Box<dyn Overlay<B>>>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        log::info!(
            "vizor: init (backend={}, strategy={})",
            backend.name(),
            strategy.name()
        );

        let caps = strategy.negotiate_capabilities().validate()?;
        log::debug!("negotiated capabilities: {caps:?}");

        let window = backend.window_size();
        let mut core = Core {
            backend,
            surface: PresentationSurface::new(config.surface_request(window)),
            offscreen: None,
            ring: None,
        };
        let mut teardown: DeletionQueue<Core<B>> = DeletionQueue::new();
        let retired = RefCell::new(DeletionQueue::new());

        let surface_size = core.surface.create(&mut core.backend, window)?.size;
        teardown.push("presentation surface", |core: &mut Core<B>| {
            core.surface.destroy(&mut core.backend)
        });

        match OffscreenTarget::build(&mut core.backend, &caps, surface_size) {
            Ok(target) => core.offscreen = Some(target),
            Err(e) => return Err(unwind(&mut core, &mut teardown, &retired, e)),
        }
        teardown.push("offscreen target", |core: &mut Core<B>| {
            if let Some(target) = core.offscreen.take() {
                target.destroy(&mut core.backend);
            }
        });

        match ResourceRing::new(&mut core.backend, caps.frames_in_flight) {
            Ok(ring) => core.ring = Some(ring),
            Err(e) => return Err(unwind(&mut core, &mut teardown, &retired, e)),
        }
        teardown.push("resource ring", |core: &mut Core<B>| {
            if let Some(ring) = core.ring.take() {
                ring.destroy(&mut core.backend);
            }
        });

        let initialized = core
            .ctx(&caps, &retired)
            .and_then(|ctx| strategy.initialize(&ctx, &caps).map_err(EngineError::StrategyInit));
        if let Err(e) = initialized {
            log::error!("strategy `{}` failed to initialize: {e}", strategy.name());
            let e = unwind(&mut core, &mut teardown, &retired, e);
            strategy.destroy(&core.backend);
            return Err(e);
        }

        let overlay = match overlay {
            Some(mut overlay) if caps.overlay => {
                if let Some(desc) = core.surface.desc() {
                    overlay.on_resize(&core.backend, desc);
                }
                Some(overlay)
            }
            Some(_) => {
                log::debug!("overlay disabled by capability negotiation");
                None
            }
            None => None,
        };

        let watcher = if config.reload_paths.is_empty() {
            None
        } else {
            match HotReloadWatcher::new(config.reload_paths.iter().cloned(), config.reload_interval) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log::warn!("hot reload disabled: {e}");
                    None
                }
            }
        };

        log::info!(
            "vizor: ready ({} frame(s) in flight, {} attachment(s), composition {:?})",
            caps.frames_in_flight,
            caps.attachments.len(),
            caps.composition
        );

        Ok(Self {
            core,
            strategy,
            overlay,
            caps,
            counter: CompletionCounter::new(),
            clock: FrameClock::with_clamps(config.dt_min, config.dt_max),
            teardown,
            retired,
            watcher,
            state: LoopState {
                frame_index: 0,
                running: true,
                needs_rebuild: false,
                minimized: false,
                focused: true,
                reload_requested: false,
                screenshot: None,
            },
            last_time: None,
            last_report: None,
            strategy_failures: 0,
            presented: 0,
            shut_down: false,
        })
    }

    /// Applies one external event.
    pub fn handle_event(&mut self, event: EngineEvent<B::Event>) {
        match event {
            EngineEvent::Quit => {
                log::info!("quit requested");
                self.state.running = false;
            }
            EngineEvent::Resized(size) => {
                self.state.minimized = size.width == 0 || size.height == 0;
                self.state.needs_rebuild = true;
            }
            EngineEvent::Minimized => self.state.minimized = true,
            EngineEvent::Restored => {
                self.state.minimized = false;
                self.state.needs_rebuild = true;
                self.clock.reset();
            }
            EngineEvent::Focus(focused) => self.state.focused = focused,
            EngineEvent::ReloadRequested => self.state.reload_requested = true,
            EngineEvent::ScreenshotRequested(path) => self.request_screenshot(path),
            EngineEvent::Other(event) => {
                if let Ok(ctx) = self.core.ctx(&self.caps, &self.retired) {
                    self.strategy.on_event(&ctx, &event);
                }
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.on_event(&event);
                }
            }
        }
    }

    /// Runs one loop iteration after events have been pumped.
    ///
    /// Returns an error only for fatal conditions; the loop is stopped when
    /// that happens.
    pub fn run_frame(&mut self) -> EngineResult<FrameOutcome> {
        if !self.state.running || self.shut_down {
            return Ok(FrameOutcome::Stopped);
        }

        let result = self.step();
        if let Err(e) = &result {
            if e.is_fatal() {
                log::error!("fatal: {e}");
                self.state.running = false;
            }
        }
        result
    }

    /// Drives the loop until a quit event or a fatal error, then shuts down.
    ///
    /// `pump` is called once per iteration with the backend and returns the
    /// events gathered since the previous call.
    pub fn run<F, I>(&mut self, mut pump: F) -> EngineResult<()>
    where
        F: FnMut(&mut B) -> I,
        I: IntoIterator<Item = EngineEvent<B::Event>>,
    {
        while self.is_running() {
            for event in pump(&mut self.core.backend) {
                self.handle_event(event);
            }
            if !self.is_running() {
                break;
            }
            if let Err(e) = self.run_frame() {
                if let Err(teardown) = self.shutdown() {
                    log::error!("teardown after fatal error: {teardown}");
                }
                return Err(e);
            }
        }
        self.shutdown()
    }

    fn step(&mut self) -> EngineResult<FrameOutcome> {
        let time = self.clock.tick();
        self.last_time = Some(time);

        let window = self.core.backend.window_size();
        if self.state.minimized || window.width == 0 || window.height == 0 {
            return Ok(FrameOutcome::Idle);
        }

        if let Some(watcher) = self.watcher.as_mut() {
            if watcher.poll(time.now) {
                self.state.reload_requested = true;
            }
        }
        if std::mem::take(&mut self.state.reload_requested) {
            self.reload_assets();
        }
        if let Some(path) = self.state.screenshot.take() {
            self.forward_screenshot(&path);
        }

        // A size change without a resize event surfaces as a stale acquire below.
        if self.state.needs_rebuild {
            self.rebuild()?;
            return Ok(FrameOutcome::Rebuilt);
        }

        self.record_and_present(time)
    }

    fn record_and_present(&mut self, time: FrameTime) -> EngineResult<FrameOutcome> {
        let frame_index = self.state.frame_index;
        let snapshot = (self.caps.overlay && self.overlay.is_some()).then(|| self.snapshot());

        let Core {
            backend,
            surface,
            offscreen,
            ring,
        } = &mut self.core;
        let ring = ring.as_mut().ok_or(EngineError::NotInitialized)?;
        let targets = offscreen.as_ref().ok_or(EngineError::NotInitialized)?;

        let slot = ring.acquire_slot(backend, frame_index)?;
        let slot_index = slot.index();

        let (image, image_index) = match surface.acquire_next(backend, slot.acquired())? {
            Acquisition::Ready { image, index } => (image, index),
            Acquisition::Stale => {
                log::debug!(
                    target: "vizor_engine::frame",
                    "frame {frame_index}: surface stale on acquire"
                );
                self.state.needs_rebuild = true;
                return Ok(FrameOutcome::SurfaceStale);
            }
        };

        let desc = surface.desc().ok_or(EngineError::NotInitialized)?;
        let frame = Frame {
            index: frame_index,
            slot: slot_index,
            image_index,
            dt: time.dt,
            elapsed: time.elapsed,
            extent: desc.size,
            target_size: targets.size(),
            surface_format: desc.format,
        };
        log::trace!(
            target: "vizor_engine::frame",
            "frame {frame_index}: slot {slot_index} image {image_index}"
        );

        let recorder = slot.begin(backend)?;
        let inputs = FrameInputs {
            backend: &mut *backend,
            strategy: self.strategy.as_mut(),
            overlay: self.overlay.as_deref_mut(),
            surface: desc,
            targets,
            caps: &self.caps,
            retired: &self.retired,
            snapshot,
        };
        let report = match compose_frame(inputs, recorder, &image, &frame) {
            Ok(report) => report,
            Err(e) => {
                slot.abandon();
                return Err(e);
            }
        };

        let recorder = slot.take_recorder().ok_or(EngineError::NotInitialized)?;
        let value = self.counter.claim();
        backend.submit(recorder, slot.acquired(), slot.render_complete(), value)?;
        slot.defer_all(self.retired.get_mut());
        ring.retire_slot(slot_index, value);

        let slot = ring.slot(slot_index).ok_or(EngineError::NotInitialized)?;
        let status = backend.present(image, slot.render_complete())?;
        if status == PresentStatus::Stale {
            log::debug!(
                target: "vizor_engine::frame",
                "frame {frame_index}: surface stale on present"
            );
            self.state.needs_rebuild = true;
        }

        self.state.frame_index += 1;
        self.presented += 1;
        self.strategy_failures += report.failures.len() as u64;
        self.last_report = Some(report);

        Ok(FrameOutcome::Presented { frame_index, value })
    }

    /// Drains in-flight work, rebuilds the surface (and resolution-derived
    /// targets), then notifies the strategy and the overlay.
    fn rebuild(&mut self) -> EngineResult<()> {
        let Core {
            backend,
            surface,
            offscreen,
            ring,
        } = &mut self.core;

        if let Some(ring) = ring.as_mut() {
            ring.drain(backend)?;
        }
        backend.wait_idle()?;
        self.retired.get_mut().flush(backend);

        let desc = surface.recreate(backend)?.clone();
        if offscreen.as_ref().is_some_and(OffscreenTarget::tracks_surface) {
            // On failure the previous target stays in place and the rebuild
            // remains pending.
            let replacement = OffscreenTarget::build(backend, &self.caps, desc.size)?;
            if let Some(old) = offscreen.replace(replacement) {
                old.destroy(backend);
            }
        }
        self.state.needs_rebuild = false;

        log::info!(
            "surface rebuilt: {}x{} ({} total)",
            desc.size.width,
            desc.size.height,
            surface.rebuild_count()
        );

        if let Ok(ctx) = self.core.ctx(&self.caps, &self.retired) {
            if let Err(e) = self.strategy.on_resize(&ctx) {
                log::warn!("strategy `{}` on_resize failed: {e:#}", self.strategy.name());
                self.strategy_failures += 1;
            }
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.on_resize(&self.core.backend, &desc);
        }
        Ok(())
    }

    fn reload_assets(&mut self) {
        let Ok(ctx) = self.core.ctx(&self.caps, &self.retired) else {
            return;
        };
        log::info!("reloading assets for strategy `{}`", self.strategy.name());
        if let Err(e) = self.strategy.reload_assets(&ctx) {
            log::warn!("strategy `{}` reload failed: {e:#}", self.strategy.name());
            self.strategy_failures += 1;
        }
    }

    fn forward_screenshot(&mut self, path: &Path) {
        let Ok(ctx) = self.core.ctx(&self.caps, &self.retired) else {
            return;
        };
        log::info!("screenshot requested: {}", path.display());
        if let Err(e) = self.strategy.request_screenshot(&ctx, path) {
            log::warn!("strategy `{}` screenshot failed: {e:#}", self.strategy.name());
            self.strategy_failures += 1;
        }
    }

    /// Stops the loop, waits for every frame in flight, then destroys engine
    /// resources in reverse creation order. Idempotent.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.state.running = false;

        let mut first_error = None;
        let Core { backend, ring, .. } = &mut self.core;
        let in_flight = ring
            .as_ref()
            .map_or(0, |r| r.in_flight(backend.completed_value()));
        log::info!("shutdown: draining {in_flight} frame(s) in flight");

        if let Some(ring) = ring.as_mut() {
            if let Err(e) = ring.drain(backend) {
                log::error!("drain failed, continuing teardown: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = backend.wait_idle() {
            log::error!("wait idle failed, continuing teardown: {e}");
            first_error.get_or_insert(e);
        }

        let strategy = &mut self.strategy;
        let reached = self
            .core
            .with_teardown_ctx(&self.caps, &self.retired, |ctx| strategy.on_teardown(ctx));
        if !reached {
            log::warn!("strategy `{}` skipped on_teardown: surface never built", self.strategy.name());
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.shutdown(&self.core.backend);
        }

        self.retired.get_mut().flush(&mut self.core.backend);
        self.teardown.flush(&mut self.core);
        self.strategy.destroy(&self.core.backend);

        log::info!("shutdown complete after {} frame(s)", self.presented);
        first_error.map_or(Ok(()), Err)
    }

    pub fn request_shutdown(&mut self) {
        self.state.running = false;
    }

    pub fn request_reload(&mut self) {
        self.state.reload_requested = true;
    }

    /// Queues a capture of the next rendered frame. A newer request replaces
    /// one that has not been forwarded yet.
    pub fn request_screenshot(&mut self, path: impl Into<PathBuf>) {
        self.state.screenshot = Some(path.into());
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        let desc = self.core.surface.desc();
        let completed = self.core.backend.completed_value();
        let ring = self.core.ring.as_ref();

        DebugSnapshot {
            frame_index: self.state.frame_index,
            elapsed: self.last_time.map_or(0.0, |t| t.elapsed),
            dt: self.last_time.map_or(0.0, |t| t.dt),
            backend: self.core.backend.name().to_owned(),
            strategy: self.strategy.name().to_owned(),
            surface_extent: desc.map(|d| d.size),
            surface_format: desc.map(|d| d.format),
            present_mode: desc.map(|d| d.present_mode),
            image_count: desc.map_or(0, |d| d.image_count),
            surface_rebuilds: self.core.surface.rebuild_count(),
            issued_value: self.counter.issued(),
            completed_value: completed,
            frames_in_flight: ring.map_or(0, |r| r.in_flight(completed)),
            ring_len: ring.map_or(0, ResourceRing::len),
            attachments: self
                .core
                .offscreen
                .as_ref()
                .map(OffscreenTarget::descriptions)
                .unwrap_or_default(),
            strategy_stats: self.strategy.stats(),
            strategy_failures: self.strategy_failures,
            focused: self.state.focused,
            minimized: self.state.minimized,
        }
    }

    /// Forwards a runtime option to the strategy.
    pub fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        let accepted = self.strategy.set_option(key, value);
        if !accepted {
            log::debug!("strategy `{}` rejected option `{key}`", self.strategy.name());
        }
        accepted
    }

    pub fn option(&self, key: &str) -> Option<OptionValue> {
        self.strategy.option(key)
    }

    pub fn is_running(&self) -> bool {
        self.state.running && !self.shut_down
    }

    pub fn needs_rebuild(&self) -> bool {
        self.state.needs_rebuild
    }

    pub fn frame_index(&self) -> u64 {
        self.state.frame_index
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    pub fn issued_value(&self) -> u64 {
        self.counter.issued()
    }

    pub fn strategy_failures(&self) -> u64 {
        self.strategy_failures
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    pub fn surface(&self) -> &PresentationSurface {
        &self.core.surface
    }

    pub fn offscreen(&self) -> Option<&OffscreenTarget<B>> {
        self.core.offscreen.as_ref()
    }

    pub fn ring(&self) -> Option<&ResourceRing<B>> {
        self.core.ring.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.core.backend
    }

    pub fn strategy(&self) -> &dyn RenderingStrategy<B> {
        self.strategy.as_ref()
    }
}

impl<B: Backend> Drop for Orchestrator<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("shutdown on drop failed: {e}");
        }
    }
}

/// Releases everything built so far after a failed init and returns `err`.
fn unwind<B: Backend>(
    core: &mut Core<B>,
    teardown: &mut DeletionQueue<Core<B>>,
    retired: &RefCell<DeletionQueue<B>>,
    err: EngineError,
) -> EngineError {
    if let Err(e) = core.backend.wait_idle() {
        log::warn!("wait idle during init unwind failed: {e}");
    }
    retired.borrow_mut().flush(&mut core.backend);
    teardown.flush(core);
    err
}
