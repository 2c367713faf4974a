//! End-to-end scenarios: single attachment, mid-loop resize, failing update and
//! shutdown with frames in flight.

mod common;

use common::*;
use vizor_engine::backend::LogEntry;
use vizor_engine::strategy::TargetSize;
use vizor_engine::{EngineError, FrameOutcome};
use winit::dpi::PhysicalSize;

#[test]
fn single_attachment_presents_once_per_iteration() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    let offscreen = engine.offscreen().unwrap();
    assert_eq!(offscreen.attachments().len(), 1);
    assert!(offscreen.depth().is_none());
    let color = &offscreen.attachments()[0];
    assert_eq!(color.name(), "color");
    assert_eq!(color.format(), wgpu::TextureFormat::Rgba8Unorm);
    assert_eq!(color.size(), WINDOW);
    assert_eq!(engine.backend().present_count(), 0);

    assert_eq!(
        engine.run_frame().unwrap(),
        FrameOutcome::Presented { frame_index: 0, value: 1 }
    );
    assert_eq!(engine.backend().present_count(), 1);
    assert_eq!(log.borrow().hooks, ["negotiate", "initialize"]);
}

#[test]
fn resize_mid_loop_rebuilds_surface_and_targets() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.run_frame().unwrap();
    engine.run_frame().unwrap();

    let resized = PhysicalSize::new(1024, 768);
    engine.backend_mut().resize_window(resized);

    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::SurfaceStale);
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);
    assert_eq!(engine.surface().extent(), Some(resized));
    assert_eq!(engine.offscreen().unwrap().size(), resized);

    assert_eq!(
        engine.run_frame().unwrap(),
        FrameOutcome::Presented { frame_index: 2, value: 3 }
    );
    assert_eq!(log.borrow().extents.last(), Some(&resized));
    assert_eq!(log.borrow().resizes, 1);

    let recreated = engine.backend().log().iter().any(|e| {
        matches!(e, LogEntry::CreateAttachment { label, size, .. }
            if label == "vizor offscreen color" && *size == resized)
    });
    assert!(recreated);
    assert!(engine.backend().violations().is_empty());
}

#[test]
fn fixed_size_targets_survive_a_resize() {
    let (scripted, _) = Scripted::new(single_color_caps().with_target_size(TargetSize::Fixed(256, 256)));
    let mut engine = engine(backend(), scripted);
    engine.run_frame().unwrap();
    engine.backend_mut().clear_log();

    engine.backend_mut().resize_window(PhysicalSize::new(800, 600));
    engine.run_frame().unwrap();
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);

    assert_eq!(engine.offscreen().unwrap().size(), PhysicalSize::new(256, 256));
    assert!(
        !engine
            .backend()
            .log()
            .iter()
            .any(|e| matches!(e, LogEntry::CreateAttachment { .. }))
    );
}

#[test]
fn failing_update_skips_recording_but_keeps_the_loop_alive() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted.failing_update_at(1));

    for k in 0..4u64 {
        assert_eq!(
            engine.run_frame().unwrap(),
            FrameOutcome::Presented { frame_index: k, value: k + 1 }
        );
        let report = engine.last_report().unwrap();
        assert_eq!(report.recording_skipped, k == 1);
    }

    let submissions: Vec<_> = engine.backend().submissions().collect();
    assert_eq!(submissions.len(), 4);
    for (_, value, ops) in &submissions {
        let expected = usize::from(*value != 2);
        assert_eq!(draws(ops, GRAPHICS), expected, "value {value}");
        assert_eq!(dispatches(ops), expected, "value {value}");
        // Composition and overlay still run.
        assert_eq!(stage_labels(ops).len(), 4);
        assert_eq!(draws(ops, HUD), 1);
    }
    assert_eq!(engine.strategy_failures(), 1);
    assert!(engine.is_running());
}

#[test]
fn failing_compute_skips_graphics_for_that_frame() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted.failing_compute_at(0));
    engine.run_frame().unwrap();

    let (_, _, ops) = engine.backend().submissions().next().unwrap();
    assert_eq!(draws(ops, GRAPHICS), 0);
    let report = engine.last_report().unwrap();
    assert!(report.recording_skipped);
    assert!(matches!(
        report.failures.as_slice(),
        [EngineError::StrategyHook { hook: "record_compute", .. }]
    ));
}

#[test]
fn shutdown_waits_for_frames_in_flight_before_destroying() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend().with_gpu_lag(None), scripted);
    engine.run_frame().unwrap();
    engine.run_frame().unwrap();
    assert_eq!(engine.backend().pending_submissions(), 2);
    assert_eq!(engine.snapshot().frames_in_flight, 2);

    engine.backend_mut().clear_log();
    engine.shutdown().unwrap();

    let backend = engine.backend();
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    assert_eq!(backend.live_signals(), 0);
    assert_eq!(backend.live_attachments(), 0);
    assert!(!backend.has_surface());

    let log_entries = backend.log();
    let position = |pred: &dyn Fn(&LogEntry) -> bool| log_entries.iter().position(|e| pred(e));
    let wait_1 = position(&|e| *e == LogEntry::Wait { value: 1 }).unwrap();
    let wait_2 = position(&|e| *e == LogEntry::Wait { value: 2 }).unwrap();
    let first_signal = position(&|e| matches!(e, LogEntry::DestroySignal { .. })).unwrap();
    let first_attachment = position(&|e| matches!(e, LogEntry::DestroyAttachment { .. })).unwrap();
    let release = position(&|e| *e == LogEntry::ReleaseSurface).unwrap();

    assert!(wait_1 < wait_2 && wait_2 < first_signal);
    // Reverse creation order: ring, then offscreen target, then surface.
    assert!(first_signal < first_attachment && first_attachment < release);

    assert_eq!(log.borrow().hooks, ["negotiate", "initialize", "teardown", "destroy"]);
}

#[test]
fn shutdown_is_idempotent() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.run_frame().unwrap();

    engine.shutdown().unwrap();
    engine.shutdown().unwrap();
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Stopped);
    drop(engine);

    let hooks = &log.borrow().hooks;
    assert_eq!(hooks.iter().filter(|h| *h == "destroy").count(), 1);
}
