mod support;

use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use sculptrs::config::EngineConfig;
use sculptrs::create::CreatePhase;
use sculptrs::deform::BrushKind;
use sculptrs::dispatch::Engine;
use sculptrs::errors::EngineError;
use sculptrs::float_types::Real;
use sculptrs::frame::{FingertipSample, FrameInput, GestureCommand, INDEX, THUMB};
use sculptrs::host::EditCommand;
use sculptrs::mesh::{Mesh, Segment};
use support::StubKernel;

fn engine_with(kernel: StubKernel) -> Engine<StubKernel> {
    let mut engine = Engine::new(EngineConfig::default(), kernel);
    engine.replace_mesh(Mesh::cube(1.0));
    engine
}

fn command_frame(command: GestureCommand) -> FrameInput {
    FrameInput { command, ..Default::default() }
}

/// A deform frame with hand 0 presenting thumb+index around normalized `x`.
fn draw_frame(x: Real) -> FrameInput {
    let mut frame = command_frame(GestureCommand::Deform);
    frame.hands[0].fingers[THUMB] = FingertipSample::new(x, 0.5, 0.5);
    frame.hands[0].fingers[INDEX] = FingertipSample::new(x + 0.02, 0.5, 0.5);
    frame
}

/// Cycle the brush `n` steps from the default.
fn cycle_brush<K: sculptrs::host::GeometryKernel>(engine: &mut Engine<K>, n: usize) {
    for _ in 0..n {
        engine.tick(Some(command_frame(GestureCommand::CycleBrush)));
    }
}

/// Drive a full stroke: capture ticks followed by enough idle ticks to pass
/// the release debounce.
fn record_stroke(engine: &mut Engine<StubKernel>, config: &EngineConfig) {
    cycle_brush(engine, 5); // Pinch → ... → Draw
    assert_eq!(engine.brush_state().brush, BrushKind::Draw);

    for step in 0..5 {
        engine.tick(Some(draw_frame(0.2 + 0.05 * step as Real)));
    }
    for _ in 0..config.release_debounce_ticks + 1 {
        engine.tick(Some(command_frame(GestureCommand::None)));
    }
}

#[test]
fn cycle_brush_command_advances_selection() {
    let mut engine = engine_with(StubKernel::new());
    assert_eq!(engine.brush_state().brush, BrushKind::Pinch);
    engine.tick(Some(command_frame(GestureCommand::CycleBrush)));
    assert_eq!(engine.brush_state().brush, BrushKind::Grab);

    let level = engine.brush_state().radius_level;
    engine.tick(Some(command_frame(GestureCommand::CycleRadius)));
    assert_ne!(engine.brush_state().radius_level, level);
}

#[test]
fn dropped_frame_reuses_previous_snapshot() {
    let mut engine = engine_with(StubKernel::new());
    engine.tick(Some(command_frame(GestureCommand::Orbit)));
    let report = engine.tick(None);
    assert_eq!(report.command, GestureCommand::Orbit);
}

#[test]
fn draw_stroke_reaches_pending_queue_after_debounce() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::new());

    record_stroke(&mut engine, &config);
    assert_eq!(engine.pending().len(), 1);
}

#[test]
fn failed_merge_keeps_pending_and_mesh() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::failing());
    let mesh_before = engine.mesh().clone();

    record_stroke(&mut engine, &config);
    assert_eq!(engine.pending().len(), 1);

    let report = engine.tick(Some(command_frame(GestureCommand::BooleanUnion)));
    assert!(matches!(report.error, Some(EngineError::KernelFailure(_))));
    assert_eq!(engine.pending().len(), 1, "failed merge must not drop pending work");
    assert_eq!(*engine.mesh(), mesh_before, "failed merge must not touch the mesh");

    // The merge is naturally retryable; a working kernel is the host's move,
    // but a repeat attempt must behave identically.
    let report = engine.tick(Some(command_frame(GestureCommand::BooleanUnion)));
    assert!(report.error.is_some());
    assert_eq!(engine.pending().len(), 1);
}

#[test]
fn successful_merge_replaces_mesh_and_clears_pending() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::new());

    record_stroke(&mut engine, &config);
    let report = engine.tick(Some(command_frame(GestureCommand::BooleanUnion)));
    assert_eq!(report.error, None);
    assert!(engine.pending().is_empty());
    // Stub union concatenates: cube (8) + swept tube (24 rings × 8 sides).
    assert_eq!(engine.mesh().vertices.len(), 8 + 24 * 8);
}

#[test]
fn merge_with_empty_queue_reports_no_pending() {
    let mut engine = engine_with(StubKernel::new());
    let report = engine.tick(Some(command_frame(GestureCommand::BooleanDifference)));
    assert_eq!(report.error, Some(EngineError::NoPendingGeometry));
}

#[test]
fn rewind_cancels_most_recent_pending_shape() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::new());

    record_stroke(&mut engine, &config);
    assert_eq!(engine.pending().len(), 1);

    engine.tick(Some(command_frame(GestureCommand::Rewind)));
    assert!(engine.pending().is_empty());
}

#[test]
fn create_session_sizes_locks_then_positions() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::new());
    cycle_brush(&mut engine, 6); // Pinch → ... → CreatePrimitive
    assert_eq!(engine.brush_state().brush, BrushKind::CreatePrimitive);

    // Both hands pinching: midpoints land at scene x = ±0.48, so the raw
    // distance is 0.96 and the preview scale 0.96 × scale factor.
    let mut sizing = command_frame(GestureCommand::Deform);
    sizing.hands[0].fingers[THUMB] = FingertipSample::new(0.3, 0.5, 0.5);
    sizing.hands[0].fingers[INDEX] = FingertipSample::new(0.3, 0.5, 0.5);
    sizing.hands[1].fingers[THUMB] = FingertipSample::new(0.7, 0.5, 0.5);
    sizing.hands[1].fingers[INDEX] = FingertipSample::new(0.7, 0.5, 0.5);
    engine.tick(Some(sizing));

    assert_eq!(engine.create_phase(), CreatePhase::Sizing);
    let (_, scale, _) = engine.create_preview().unwrap();
    let expected = 0.96 * config.create_scale_factor;
    assert!((scale - expected).abs() < 1e-9, "scale {scale}, expected {expected}");

    // Hands released; the fingertip grace period has to lapse before the
    // session sees them as gone and locks the size.
    for _ in 0..config.finger_grace_ticks + 2 {
        engine.tick(Some(command_frame(GestureCommand::Deform)));
    }
    assert_eq!(engine.create_phase(), CreatePhase::Positioning);

    // A single hand now repositions without resizing.
    let mut positioning = command_frame(GestureCommand::Deform);
    positioning.hands[1].fingers[THUMB] = FingertipSample::new(0.75, 0.5, 0.5);
    positioning.hands[1].fingers[INDEX] = FingertipSample::new(0.75, 0.5, 0.5);
    engine.tick(Some(positioning));

    let (_, locked_scale, center) = engine.create_preview().unwrap();
    assert!((locked_scale - expected).abs() < 1e-9, "scale must stay locked");
    assert!((center.x - 0.6).abs() < 1e-9, "center should follow the hand");

    // Confirmation bakes the preview into the pending queue.
    let report = engine.tick(Some(command_frame(GestureCommand::ConfirmPlacement)));
    assert_eq!(report.error, None);
    assert_eq!(engine.create_phase(), CreatePhase::Idle);
    assert!(engine.create_preview().is_none());
    assert_eq!(engine.pending().len(), 1);
}

#[test]
fn rewind_cancels_live_create_session_first() {
    let config = EngineConfig::default();
    let mut engine = engine_with(StubKernel::new());
    record_stroke(&mut engine, &config); // one confirmed pending shape
    cycle_brush(&mut engine, 1); // Draw → CreatePrimitive

    let mut sizing = command_frame(GestureCommand::Deform);
    sizing.hands[0].fingers[THUMB] = FingertipSample::new(0.4, 0.5, 0.5);
    sizing.hands[0].fingers[INDEX] = FingertipSample::new(0.4, 0.5, 0.5);
    sizing.hands[1].fingers[THUMB] = FingertipSample::new(0.6, 0.5, 0.5);
    sizing.hands[1].fingers[INDEX] = FingertipSample::new(0.6, 0.5, 0.5);
    engine.tick(Some(sizing));
    assert_eq!(engine.create_phase(), CreatePhase::Sizing);

    engine.tick(Some(command_frame(GestureCommand::Rewind)));
    assert_eq!(engine.create_phase(), CreatePhase::Idle);
    assert_eq!(
        engine.pending().len(),
        1,
        "cancelling the preview must not touch confirmed objects"
    );
}

#[test]
fn import_command_aligns_generated_geometry() {
    let mut engine = engine_with(StubKernel::new());
    let positions = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(3.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.4, 0.3, 1.2),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    let target = Mesh::from_positions(&positions, faces);
    engine.replace_mesh(target.clone());

    let motion = Rotation3::from_euler_angles(0.1, -0.05, 0.2)
        .to_homogeneous()
        .append_translation(&Vector3::new(1.5, -0.5, 1.0));
    let generated = target.transformed(&motion).unwrap();

    engine.commands_mut().submit(EditCommand::ImportMesh(generated));
    let report = engine.tick(Some(command_frame(GestureCommand::None)));
    assert_eq!(report.error, None);
    assert!(engine.commands_mut().is_empty(), "applied command must be acknowledged");

    // The imported geometry was aligned back onto the old mesh's frame.
    let drift = (engine.mesh().centroid() - target.centroid()).norm();
    assert!(drift < 0.05, "imported mesh centroid drifted {drift}");
}

#[test]
fn failed_fuse_command_stays_queued() {
    let mut engine = engine_with(StubKernel::failing());
    engine.set_segments(vec![
        Segment::new("a", Mesh::cube(1.0)),
        Segment::new("b", Mesh::cube(2.0)),
    ]);

    engine.commands_mut().submit(EditCommand::FuseAll);
    let report = engine.tick(Some(command_frame(GestureCommand::None)));
    assert!(matches!(report.error, Some(EngineError::KernelFailure(_))));
    assert_eq!(engine.segments().len(), 2, "failed fuse must retain segments");
    assert_eq!(
        engine.commands_mut().len(),
        1,
        "failed command must stay queued for retry"
    );
}

#[test]
fn spawn_primitive_command_replaces_active_mesh() {
    let mut engine = engine_with(StubKernel::new());
    engine.commands_mut().submit(EditCommand::SpawnPrimitive {
        kind: sculptrs::create::PrimitiveKind::Cuboid,
        center: Point3::new(1.0, 2.0, 3.0),
        scale: 2.0,
    });
    engine.tick(Some(command_frame(GestureCommand::None)));

    assert_eq!(engine.mesh().vertices.len(), 8);
    let centroid = engine.mesh().centroid();
    approx::assert_relative_eq!(centroid, Point3::new(1.0, 2.0, 3.0), epsilon = 1e-9);
    // Wholesale replacement recomputes the cached volume for the new shape.
    assert!((engine.mesh().initial_volume() - 8.0).abs() < 1e-9);
}

#[test]
fn markers_track_last_seen_fingertips() {
    let mut engine = engine_with(StubKernel::new());
    engine.tick(Some(draw_frame(0.4)));
    let marker = engine.markers().positions[0][THUMB].unwrap();
    assert!((marker.x - 2.4 * (0.4 - 0.5)).abs() < 1e-9);

    // The marker survives the finger disappearing.
    engine.tick(Some(command_frame(GestureCommand::None)));
    assert!(engine.markers().positions[0][THUMB].is_some());
}

#[test]
fn orbit_and_idle_ticks_settle_velocities() {
    let mut engine = engine_with(StubKernel::new());
    engine.replace_mesh(Mesh::sphere(1.0, 16, 8));

    // Pinch next to the sphere's (0, -1, 0) vertex so it picks up velocity.
    // Normalized z = 0.4167 maps to scene y ≈ -1 at the default axis scales.
    let mut poke = command_frame(GestureCommand::Deform);
    poke.hands[0].fingers[THUMB] = FingertipSample::new(0.5, 0.5, 0.4167);
    poke.hands[0].fingers[INDEX] = FingertipSample::new(0.55, 0.5, 0.4167);
    engine.tick(Some(poke));
    assert!(
        engine.mesh().vertices.iter().any(|v| v.velocity != Vector3::zeros()),
        "the poke should have imparted velocity"
    );

    for _ in 0..200 {
        engine.tick(Some(command_frame(GestureCommand::None)));
    }
    assert!(
        engine.mesh().vertices.iter().all(|v| v.velocity == Vector3::zeros()),
        "idle ticks must settle the mesh to rest"
    );
}

#[test]
fn spawned_then_transformed_mesh_keeps_finite_state() {
    // Regression guard: a transform with uniform scale keeps normals unit
    // length and caches coherent.
    let mut mesh = Mesh::cube(2.0);
    mesh.apply_transform(&(Matrix4::new_scaling(3.0))).unwrap();
    for v in &mesh.vertices {
        assert!((v.normal.norm() - 1.0).abs() < 1e-9);
        assert!(v.pos.coords.iter().all(|c| c.is_finite()));
    }
}
