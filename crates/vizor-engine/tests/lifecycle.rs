//! Init failure modes, event forwarding, hot reload, options and the run loop.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::*;
use vizor_engine::backend::HeadlessBackend;
use vizor_engine::strategy::{AttachmentDesc, CapabilitySet, CompositionMode, OptionValue};
use vizor_engine::{EngineConfig, EngineError, EngineEvent, ErrorClass, FrameOutcome, Orchestrator};

fn build(
    backend: HeadlessBackend,
    scripted: Scripted,
    config: EngineConfig,
) -> Result<Orchestrator<HeadlessBackend>, EngineError> {
    Orchestrator::builder()
        .backend(backend)
        .strategy(scripted)
        .overlay(MeterOverlay::default())
        .config(config)
        .build()
}

#[test]
fn missing_collaborators_are_rejected() {
    let (scripted, log) = Scripted::single_color();
    let err = Orchestrator::<HeadlessBackend>::builder().strategy(scripted).build().err();
    assert!(matches!(err, Some(EngineError::MissingBackend)));
    assert!(log.borrow().hooks.is_empty());

    let err = Orchestrator::builder().backend(backend()).build().err();
    assert!(matches!(err, Some(EngineError::MissingStrategy)));
}

#[test]
fn invalid_capabilities_abort_before_any_allocation() {
    let (scripted, log) =
        Scripted::new(CapabilitySet::new().with_composition(CompositionMode::Engine));
    let err = build(backend(), scripted, EngineConfig::default()).err();
    assert!(matches!(err, Some(EngineError::InvalidCapabilities(_))));
    assert_eq!(log.borrow().hooks, ["negotiate"]);
}

#[test]
fn attachment_failure_is_fatal_and_skips_strategy_init() {
    let caps = single_color_caps()
        .with_attachment(AttachmentDesc::color("normals", wgpu::TextureFormat::Rgba16Float));
    let (scripted, log) = Scripted::new(caps);
    let mut backend = backend();
    backend.fail_attachment("vizor offscreen normals");

    let err = build(backend, scripted, EngineConfig::default()).err().unwrap();
    assert!(matches!(err, EngineError::ResourceCreation { .. }));
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(log.borrow().hooks, ["negotiate"]);
}

#[test]
fn strategy_init_failure_releases_the_strategy() {
    let (scripted, log) = Scripted::single_color();
    let err = build(backend(), scripted.failing_init(), EngineConfig::default()).err();
    assert!(matches!(err, Some(EngineError::StrategyInit(_))));
    assert_eq!(log.borrow().hooks, ["negotiate", "initialize", "destroy"]);
}

#[test]
fn unrecognised_events_reach_the_strategy_verbatim() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    engine.handle_event(EngineEvent::Other("key:space".to_owned()));
    engine.handle_event(EngineEvent::Focus(false));
    engine.handle_event(EngineEvent::Other("pointer:12,40".to_owned()));

    assert_eq!(log.borrow().events, ["key:space", "pointer:12,40"]);
    assert!(!engine.snapshot().focused);
}

#[test]
fn minimized_window_idles_until_restored() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    engine.handle_event(EngineEvent::Minimized);
    for _ in 0..3 {
        assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Idle);
    }
    assert_eq!(engine.backend().present_count(), 0);
    assert!(engine.snapshot().minimized);

    engine.handle_event(EngineEvent::Restored);
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);
    assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
}

#[test]
fn zero_sized_window_is_treated_as_minimized() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.backend_mut().resize_window(winit::dpi::PhysicalSize::new(0, 0));
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Idle);
    assert_eq!(engine.backend().present_count(), 0);
}

#[test]
fn reload_request_reaches_the_strategy_once() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    engine.handle_event(EngineEvent::ReloadRequested);
    engine.run_frame().unwrap();
    engine.run_frame().unwrap();
    assert_eq!(log.borrow().reloads, 1);

    engine.request_reload();
    engine.run_frame().unwrap();
    assert_eq!(log.borrow().reloads, 2);
}

#[test]
fn watched_file_change_triggers_reload() {
    let dir = tempfile::tempdir().unwrap();
    let shader = dir.path().join("scene.wgsl");
    std::fs::write(&shader, "// v1").unwrap();

    let config = EngineConfig::default()
        .watch(shader.clone())
        .with_reload_interval(Duration::ZERO);
    let (scripted, log) = Scripted::single_color();
    let mut engine = build(backend(), scripted, config).unwrap();

    engine.run_frame().unwrap();
    assert_eq!(log.borrow().reloads, 0);

    std::fs::write(&shader, "// v2").unwrap();
    // Filesystem events arrive on the watcher's own thread.
    for _ in 0..200 {
        engine.run_frame().unwrap();
        if log.borrow().reloads > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(log.borrow().reloads >= 1, "edit to the watched shader never reloaded");
}

#[test]
fn nested_asset_edit_triggers_reload() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("shaders").join("sub");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("a.wgsl"), "// v1").unwrap();

    let config = EngineConfig::default()
        .watch(dir.path().join("shaders"))
        .with_reload_interval(Duration::ZERO);
    let (scripted, log) = Scripted::single_color();
    let mut engine = build(backend(), scripted, config).unwrap();
    engine.run_frame().unwrap();

    std::fs::write(nested.join("a.wgsl"), "// v2").unwrap();
    for _ in 0..200 {
        engine.run_frame().unwrap();
        if log.borrow().reloads > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(log.borrow().reloads >= 1, "edit to shaders/sub/a.wgsl never reloaded");
}

#[test]
fn options_are_forwarded_to_the_strategy() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    assert!(engine.set_option("exposure", 2.5.into()));
    assert_eq!(engine.option("exposure"), Some(OptionValue::Float(2.5)));
    assert!(!engine.set_option("exposure", "bright".into()));
    assert!(!engine.set_option("gamma", 2.2.into()));
    assert_eq!(engine.option("gamma"), None);
}

#[test]
fn snapshot_reflects_engine_state() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    for _ in 0..3 {
        engine.run_frame().unwrap();
    }

    let snap = engine.snapshot();
    assert_eq!(snap.frame_index, 3);
    assert_eq!(snap.issued_value, 3);
    assert!(snap.completed_value <= snap.issued_value);
    assert_eq!(snap.backend, "headless");
    assert_eq!(snap.strategy, "scripted");
    assert_eq!(snap.surface_extent, Some(WINDOW));
    assert_eq!(snap.surface_format, Some(wgpu::TextureFormat::Bgra8UnormSrgb));
    assert_eq!(snap.image_count, 3);
    assert_eq!(snap.ring_len, 2);
    assert_eq!(snap.attachments.len(), 1);
    assert_eq!(snap.attachments[0].name, "color");
}

#[test]
fn run_drives_frames_until_quit_then_shuts_down() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    let mut iterations = 0;
    engine
        .run(|_backend| {
            iterations += 1;
            if iterations > 5 {
                vec![EngineEvent::Quit]
            } else {
                Vec::new()
            }
        })
        .unwrap();

    assert_eq!(engine.presented_frames(), 5);
    assert!(!engine.is_running());
    assert!(!engine.backend().has_surface());
    assert_eq!(engine.backend().live_attachments(), 0);
    assert!(log.borrow().hooks.ends_with(&["teardown".to_owned(), "destroy".to_owned()]));
}

#[test]
fn device_loss_stops_the_loop() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.run_frame().unwrap();

    engine.backend_mut().lose_device();
    let err = engine.run_frame().unwrap_err();
    assert!(err.is_fatal());
    assert!(!engine.is_running());
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Stopped);
}

#[test]
fn failed_target_rebuild_keeps_old_target_and_still_tears_down() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));

    engine.backend_mut().fail_attachment("vizor offscreen color");
    engine.backend_mut().resize_window(winit::dpi::PhysicalSize::new(800, 600));
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::SurfaceStale);

    let err = engine.run_frame().unwrap_err();
    assert!(matches!(err, EngineError::ResourceCreation { .. }));
    assert!(err.is_fatal());
    // The old target is still usable and the rebuild stays pending.
    assert!(engine.needs_rebuild());
    assert_eq!(engine.offscreen().map(|t| t.size()), Some(WINDOW));

    engine.shutdown().unwrap();
    assert_eq!(log.borrow().hooks, ["negotiate", "initialize", "teardown", "destroy"]);
    assert_eq!(engine.backend().live_attachments(), 0);
    assert!(engine.backend().violations().is_empty());
}

#[test]
fn screenshot_request_reaches_the_strategy_before_the_next_frame() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    engine.handle_event(EngineEvent::ScreenshotRequested("first.png".into()));
    engine.request_screenshot("second.png");
    assert!(log.borrow().screenshots.is_empty());

    engine.run_frame().unwrap();
    engine.run_frame().unwrap();
    assert_eq!(log.borrow().screenshots, [PathBuf::from("second.png")]);
    assert_eq!(engine.strategy_failures(), 0);
}

#[test]
fn failing_screenshot_is_counted_and_the_frame_still_presents() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted.failing_screenshot());

    engine.request_screenshot("shot.png");
    assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
    assert_eq!(log.borrow().screenshots.len(), 1);
    assert_eq!(engine.strategy_failures(), 1);
}
