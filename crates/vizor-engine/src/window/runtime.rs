use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::EngineConfig;
use crate::device::{GpuInit, WgpuBackend};
use crate::engine::{FrameOutcome, Orchestrator};
use crate::event::EngineEvent;
use crate::logging::init_logging;
use crate::overlay::Overlay;
use crate::strategy::RenderingStrategy;

/// How long a minimised window sleeps between checks.
const IDLE_WAIT: Duration = Duration::from_millis(100);

type Strategy = Box<dyn RenderingStrategy<WgpuBackend>>;
type HudBox = Box<dyn Overlay<WgpuBackend>>;

/// Entry point for the windowed runtime.
pub struct Runtime;

impl Runtime {
    /// Opens a window, builds the engine on it and runs until the window closes
    /// or a fatal error stops the loop.
    pub fn run(
        config: EngineConfig,
        gpu_init: GpuInit,
        strategy: Strategy,
        overlay: Option<HudBox>,
    ) -> Result<()> {
        init_logging(config.logging.clone());

        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, strategy, overlay);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct AppState {
    config: EngineConfig,
    gpu_init: GpuInit,

    /// Handed to the engine on the first `resumed`.
    pending: Option<(Strategy, Option<HudBox>)>,

    window: Option<Arc<Window>>,
    engine: Option<Orchestrator<WgpuBackend>>,
    events: Vec<EngineEvent<WindowEvent>>,
    idle_until: Option<Instant>,
    failure: Option<anyhow::Error>,
    screenshots: u32,
}

impl AppState {
    fn new(
        config: EngineConfig,
        gpu_init: GpuInit,
        strategy: Strategy,
        overlay: Option<HudBox>,
    ) -> Self {
        Self {
            config,
            gpu_init,
            pending: Some((strategy, overlay)),
            window: None,
            engine: None,
            events: Vec::new(),
            idle_until: None,
            failure: None,
            screenshots: 0,
        }
    }

    fn create_engine(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (strategy, overlay) = self
            .pending
            .take()
            .context("engine was already created")?;

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let backend = pollster::block_on(WgpuBackend::new(
            Arc::clone(&window),
            self.gpu_init.clone(),
        ))
        .context("GPU initialization failed")?;

        let engine = Orchestrator::builder()
            .backend(backend)
            .boxed_strategy(strategy)
            .boxed_overlay(overlay)
            .config(self.config.clone())
            .build()
            .context("engine initialization failed")?;

        window.request_redraw();
        self.window = Some(window);
        self.engine = Some(engine);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else { return };

        for event in self.events.drain(..) {
            engine.handle_event(event);
        }

        match engine.run_frame() {
            Ok(FrameOutcome::Idle) => self.idle_until = Some(Instant::now() + IDLE_WAIT),
            Ok(FrameOutcome::Stopped) => event_loop.exit(),
            Ok(_) => self.idle_until = None,
            Err(e) if e.is_fatal() => {
                self.fail(event_loop, anyhow::Error::new(e).context("frame loop stopped"));
                return;
            }
            Err(e) => log::warn!("frame skipped: {e}"),
        }

        if !engine.is_running() {
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }
        if let Err(e) = self.create_engine(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(until) = self.idle_until {
            if Instant::now() < until {
                event_loop.set_control_flow(ControlFlow::WaitUntil(until));
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else { return };
        if window.id() != window_id {
            return;
        }

        if matches!(event, WindowEvent::RedrawRequested) {
            self.redraw(event_loop);
            return;
        }

        if is_key_press(&event, KeyCode::F12) {
            let path = screenshot_path(&self.config.screenshot_dir, self.screenshots);
            self.screenshots += 1;
            self.events.push(EngineEvent::ScreenshotRequested(path));
        }

        let window = Arc::clone(window);
        self.events.extend(translate_event(&window, event));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.shutdown() {
                log::error!("shutdown failed: {e}");
                self.failure.get_or_insert(e.into());
            }
        }
        self.window = None;
    }
}

/// Maps one window event to the events the engine consumes.
fn translate_event(window: &Window, event: WindowEvent) -> Vec<EngineEvent<WindowEvent>> {
    if is_key_press(&event, KeyCode::F5) {
        // Strategies still see the key press.
        return vec![EngineEvent::ReloadRequested, EngineEvent::Other(event)];
    }

    match event {
        WindowEvent::CloseRequested => vec![EngineEvent::Quit],

        WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => {
            vec![EngineEvent::Minimized]
        }
        WindowEvent::Resized(size) => vec![EngineEvent::Resized(size)],

        WindowEvent::ScaleFactorChanged { .. } => vec![EngineEvent::Resized(window.inner_size())],

        WindowEvent::Focused(focused) => vec![EngineEvent::Focus(focused)],

        WindowEvent::Occluded(true) => vec![EngineEvent::Minimized],
        WindowEvent::Occluded(false) => vec![EngineEvent::Restored],

        other => vec![EngineEvent::Other(other)],
    }
}

fn is_key_press(event: &WindowEvent, key: KeyCode) -> bool {
    match event {
        WindowEvent::KeyboardInput { event, .. } => {
            event.state == ElementState::Pressed
                && !event.repeat
                && event.physical_key == PhysicalKey::Code(key)
        }
        _ => false,
    }
}

fn screenshot_path(dir: &Path, taken: u32) -> PathBuf {
    dir.join(format!("vizor-screenshot-{taken:03}.png"))
}
