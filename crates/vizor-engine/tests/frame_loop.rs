//! Frame pacing, resize and composition-order properties driven through the
//! orchestrator on the simulated GPU.

mod common;

use std::collections::HashMap;
use std::rc::Rc;

use common::*;
use vizor_engine::backend::{Backend, LogEntry, RecordedOp};
use vizor_engine::compose::Stage;
use vizor_engine::{EngineConfig, EngineError, EngineEvent, FrameOutcome, Orchestrator};
use winit::dpi::PhysicalSize;

fn assert_slot_reuse_waits(log: &[LogEntry]) {
    let mut last_value: HashMap<usize, u64> = HashMap::new();
    for entry in log {
        match entry {
            LogEntry::BeginRecording { slot, completed } => {
                if let Some(&value) = last_value.get(slot) {
                    assert!(
                        *completed >= value,
                        "slot {slot} recorded at completed={completed} before its value {value}"
                    );
                }
            }
            LogEntry::Submit { slot, value, .. } => {
                last_value.insert(*slot, *value);
            }
            _ => {}
        }
    }
}

#[test]
fn ring_slots_are_never_recorded_before_their_value_completes() {
    for frames_in_flight in [1, 2, 3] {
        for seed in [1u64, 7, 0xDEAD_BEEF] {
            let mut rng = XorShift::new(seed);
            let (scripted, _) = Scripted::new(single_color_caps().with_frames_in_flight(frames_in_flight));
            let mut engine = engine(backend().with_gpu_lag(None), scripted);

            for _ in 0..200 {
                let lag = rng.below(3) as usize;
                engine.backend_mut().advance_gpu(lag);
                let outcome = engine.run_frame().unwrap();
                assert!(matches!(outcome, FrameOutcome::Presented { .. }));
                assert!(engine.ring().unwrap().in_flight(engine.backend().completed_value()) <= frames_in_flight);
            }

            assert_slot_reuse_waits(engine.backend().log());
            assert!(
                engine.backend().violations().is_empty(),
                "n={frames_in_flight} seed={seed}: {:?}",
                engine.backend().violations()
            );
        }
    }
}

#[test]
fn completion_values_advance_by_exactly_one_per_frame() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    for k in 0..50u64 {
        match engine.run_frame().unwrap() {
            FrameOutcome::Presented { frame_index, value } => {
                assert_eq!(frame_index, k);
                assert_eq!(value, k + 1);
            }
            other => panic!("frame {k}: unexpected {other:?}"),
        }
    }

    let values: Vec<u64> = engine.backend().submissions().map(|(_, v, _)| v).collect();
    assert_eq!(values, (1..=50).collect::<Vec<_>>());
    assert_eq!(engine.issued_value(), 50);
}

#[test]
fn skipped_frames_do_not_consume_values() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);

    engine.run_frame().unwrap();
    engine.handle_event(EngineEvent::Minimized);
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Idle);
    engine.handle_event(EngineEvent::Restored);
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);

    assert_eq!(
        engine.run_frame().unwrap(),
        FrameOutcome::Presented { frame_index: 1, value: 2 }
    );
}

#[test]
fn rebuilding_at_an_unchanged_extent_is_idempotent() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.run_frame().unwrap();

    let before = engine.surface().desc().cloned().unwrap();
    let mut descs = Vec::new();
    for _ in 0..2 {
        engine.handle_event(EngineEvent::Resized(WINDOW));
        assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);
        descs.push(engine.surface().desc().cloned().unwrap());
    }

    assert_eq!(descs[0], before);
    assert_eq!(descs[0].image_count, descs[1].image_count);
    assert_eq!(descs[0].format, descs[1].format);
    assert_eq!(engine.surface().rebuild_count(), 2);
    assert!(engine.backend().violations().is_empty());
}

#[test]
fn default_composition_records_stages_in_order() {
    let (scripted, _) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    for _ in 0..3 {
        engine.run_frame().unwrap();
    }

    for (_, value, ops) in engine.backend().submissions() {
        assert_eq!(
            stage_labels(ops),
            ["strategy-draw", "engine-composite", "overlay-draw", "present"],
            "value {value}"
        );
        assert_eq!(draws(ops, GRAPHICS), 1);
        assert_eq!(draws(ops, HUD), 1);
    }

    let report = engine.last_report().unwrap();
    assert_eq!(
        report.stages.history(),
        [Stage::StrategyDraw, Stage::EngineComposite, Stage::OverlayDraw, Stage::Present]
    );
    assert!(report.overlay_drawn);
}

#[test]
fn custom_composition_replaces_only_the_composite_stage() {
    let (scripted, _) = Scripted::new(custom_caps());
    let mut engine = engine(backend(), scripted.with_custom(CustomComposite::Valid));
    engine.run_frame().unwrap();

    let (_, _, ops) = engine.backend().submissions().next().unwrap();
    assert_eq!(
        stage_labels(ops),
        ["strategy-draw", "custom-composite", "overlay-draw", "present"]
    );
    assert_eq!(draws(ops, "tonemap"), 1);
    assert!(!engine.last_report().unwrap().composite_fallback);
}

#[test]
fn custom_composite_in_wrong_layout_falls_back_to_engine_composite() {
    for custom in [CustomComposite::WrongLayout, CustomComposite::Fails] {
        let (scripted, _) = Scripted::new(custom_caps());
        let mut engine = engine(backend(), scripted.with_custom(custom));
        engine.run_frame().unwrap();

        let (_, _, ops) = engine.backend().submissions().next().unwrap();
        assert_eq!(
            stage_labels(ops),
            ["strategy-draw", "custom-composite", "engine-composite", "overlay-draw", "present"],
            "{custom:?}"
        );

        let report = engine.last_report().unwrap();
        assert!(report.composite_fallback);
        assert_eq!(report.failures.len(), 1);
        match custom {
            CustomComposite::WrongLayout => {
                assert!(matches!(report.failures[0], EngineError::CompositeLayout(_)))
            }
            _ => assert!(matches!(
                report.failures[0],
                EngineError::StrategyHook { hook: "composite", .. }
            )),
        }
        assert_eq!(engine.strategy_failures(), 1);
    }
}

#[test]
fn stale_present_schedules_a_rebuild() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend(), scripted);
    engine.backend_mut().inject_stale_present(1);

    assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
    assert!(engine.needs_rebuild());
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);
    assert_eq!(log.borrow().resizes, 1);
    assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
}

#[test]
fn disabled_overlay_records_no_overlay_pass() {
    let (scripted, log) = Scripted::new(single_color_caps().with_overlay(false));
    let overlay = MeterOverlay::default();
    let snapshots = Rc::clone(&overlay.snapshots);
    let mut engine = Orchestrator::builder()
        .backend(backend())
        .strategy(scripted)
        .overlay(overlay)
        .config(EngineConfig::default())
        .build()
        .unwrap();

    for _ in 0..3 {
        assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
    }

    for (_, value, ops) in engine.backend().submissions() {
        assert_eq!(stage_labels(ops), ["strategy-draw", "engine-composite", "present"], "value {value}");
        assert!(!ops.iter().any(|op| matches!(op, RecordedOp::BeginLoadPass(_))));
        assert_eq!(draws(ops, HUD), 0);
    }
    assert_eq!(log.borrow().overlay_calls, 0);
    assert!(snapshots.borrow().is_empty());

    let report = engine.last_report().unwrap();
    assert!(!report.overlay_drawn);
    assert_eq!(
        report.stages.history(),
        [Stage::StrategyDraw, Stage::EngineComposite, Stage::OverlayDraw, Stage::Present]
    );
}

#[test]
fn retired_resources_wait_for_their_frame_and_go_in_reverse_order() {
    let (scripted, log) = Scripted::single_color();
    let mut engine = engine(backend().with_gpu_lag(None), scripted.retiring_at(0));

    let FrameOutcome::Presented { value, .. } = engine.run_frame().unwrap() else {
        panic!("first frame should present");
    };
    assert!(log.borrow().destroyed.is_empty());

    // Frame 1 lands on the other slot; frame 0's value is still pending.
    engine.run_frame().unwrap();
    assert!(log.borrow().destroyed.is_empty());
    assert!(engine.backend().completed_value() < value);

    // Frame 2 reuses frame 0's slot and has to wait for its value first.
    engine.run_frame().unwrap();
    let destroyed = log.borrow().destroyed.clone();
    assert_eq!(destroyed.iter().map(|(l, _)| *l).collect::<Vec<_>>(), ["second", "first"]);
    assert!(destroyed.iter().all(|&(_, completed)| completed >= value));
    assert!(engine.backend().violations().is_empty());
}

#[test]
fn failing_resize_and_overlay_hooks_are_counted_without_breaking_the_ring() {
    let (scripted, log) = Scripted::single_color();
    let scripted = scripted.failing_overlay_content_at(1).failing_resize();
    let mut engine = engine(backend().with_gpu_lag(None), scripted);

    for _ in 0..3 {
        engine.backend_mut().advance_gpu(1);
        assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
    }
    assert_eq!(engine.strategy_failures(), 1);

    let resized = PhysicalSize::new(800, 600);
    engine.backend_mut().resize_window(resized);
    engine.handle_event(EngineEvent::Resized(resized));
    assert_eq!(engine.run_frame().unwrap(), FrameOutcome::Rebuilt);
    assert_eq!(log.borrow().resizes, 1);
    assert_eq!(engine.strategy_failures(), 2);

    for _ in 0..5 {
        engine.backend_mut().advance_gpu(1);
        assert!(matches!(engine.run_frame().unwrap(), FrameOutcome::Presented { .. }));
        assert!(engine.ring().unwrap().in_flight(engine.backend().completed_value()) <= 2);
    }
    assert_eq!(engine.strategy_failures(), 2);
    assert_eq!(log.borrow().extents.last(), Some(&resized));
    assert_eq!(engine.presented_frames(), 8);

    assert_slot_reuse_waits(engine.backend().log());
    assert!(engine.backend().violations().is_empty());
}
