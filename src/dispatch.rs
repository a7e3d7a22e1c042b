//! The per-tick gesture dispatcher.
//!
//! [`Engine::tick`] is the single entry point the external ~30 Hz timer
//! drives: it resolves the tick's input frame (reusing the previous snapshot
//! on a dropout), decodes the one active [`GestureCommand`], routes it to
//! exactly one of the engines, and refreshes the fingertip markers the host
//! overlay renders. The tick thread is the only writer of mesh state; no
//! error escapes a tick: failures are logged, captured on the
//! [`TickReport`], and leave mesh, history, and the pending queue
//! consistent.

use crate::camera::{self, CameraBasis};
use crate::config::{EngineConfig, RegistrationConfig};
use crate::create::CreateSession;
use crate::deform::{BrushKind, BrushState, DeformEngine};
use crate::errors::EngineError;
use crate::float_types::Real;
use crate::frame::{
    FINGER_COUNT, FrameCache, FrameInput, GestureCommand, HAND_COUNT, HandFrame, INDEX, THUMB,
};
use crate::host::{CommandQueue, EditCommand, GeometryKernel};
use crate::mesh::{Mesh, Segment, SegmentMaterial};
use crate::registration;
use crate::select::{SelectionAction, SelectionEngine};
use crate::stroke::{self, PendingQueue, PendingShape, StrokeRecorder};
use nalgebra::{Point3, Vector3};

/// Last-seen fingertip scene positions, for the host's marker overlay.
#[derive(Debug, Clone)]
pub struct MarkerState {
    pub positions: [[Option<Point3<Real>>; FINGER_COUNT]; HAND_COUNT],
}

impl Default for MarkerState {
    fn default() -> Self {
        Self { positions: [[None; FINGER_COUNT]; HAND_COUNT] }
    }
}

/// What one tick did, for callers that surface status to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub command: GestureCommand,
    pub selection_action: SelectionAction,
    /// A host-kernel or queue failure this tick; state was left retryable.
    pub error: Option<EngineError>,
}

/// Top-level interactive engine: owns the active mesh, all interaction
/// state machines, and the seams to the host.
pub struct Engine<K: GeometryKernel> {
    config: EngineConfig,
    registration_config: RegistrationConfig,
    kernel: K,

    mesh: Mesh,
    segments: Vec<Segment>,

    brush: BrushState,
    deform: DeformEngine,
    frames: FrameCache,
    recorder: StrokeRecorder,
    pending: PendingQueue,
    create: CreateSession,
    selection: SelectionEngine,
    commands: CommandQueue,

    camera: Option<CameraBasis>,
    markers: MarkerState,
    previous_grip: Option<Point3<Real>>,
}

impl<K: GeometryKernel> Engine<K> {
    pub fn new(config: EngineConfig, kernel: K) -> Self {
        Self {
            deform: DeformEngine::new(config.clone()),
            frames: FrameCache::new(config.finger_grace_ticks),
            recorder: StrokeRecorder::new(
                config.stroke_min_spacing,
                config.release_debounce_ticks,
            ),
            create: CreateSession::new(config.create_scale_factor),
            selection: SelectionEngine::new(&config),
            registration_config: RegistrationConfig::default(),
            kernel,
            mesh: Mesh::new(),
            segments: Vec::new(),
            brush: BrushState::default(),
            pending: PendingQueue::new(),
            commands: CommandQueue::new(),
            camera: None,
            markers: MarkerState::default(),
            previous_grip: None,
            config,
        }
    }

    pub const fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Hand a set of segments to the engine (mesh separation/import).
    pub fn set_segments(&mut self, segments: Vec<Segment>) {
        self.segments = segments;
    }

    pub const fn brush_state(&self) -> &BrushState {
        &self.brush
    }

    pub const fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub const fn markers(&self) -> &MarkerState {
        &self.markers
    }

    pub fn set_camera(&mut self, camera: Option<CameraBasis>) {
        self.camera = camera;
    }

    /// Phase of the live create session, for preview rendering.
    pub fn create_phase(&self) -> crate::create::CreatePhase {
        self.create.phase()
    }

    /// Live create-session preview as `(kind, scale, center)`.
    pub fn create_preview(
        &self,
    ) -> Option<(crate::create::PrimitiveKind, Real, Point3<Real>)> {
        self.create.preview()
    }

    /// Host-side handle for submitting orchestration commands.
    pub fn commands_mut(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn set_registration_config(&mut self, config: RegistrationConfig) {
        self.registration_config = config;
    }

    /// Whether selection mode is live, for the orchestration layer.
    pub const fn selection_mode_active(&self) -> bool {
        self.selection.is_active()
    }

    /// Name of the currently selected segment, if any.
    pub fn current_selection(&self) -> Option<&str> {
        self.selection.current_selection(&self.segments)
    }

    /// Replace the active mesh wholesale, resetting undo state.
    pub fn replace_mesh(&mut self, mesh: Mesh) {
        self.mesh.replace_with(mesh);
        self.deform.clear_history();
    }

    /// Run one engine tick against the latest tracker frame (or `None` when
    /// the read failed; the previous snapshot is reused).
    pub fn tick(&mut self, incoming: Option<FrameInput>) -> TickReport {
        let frame = self.frames.resolve(incoming);
        let mut report = TickReport {
            command: frame.command,
            selection_action: SelectionAction::None,
            error: None,
        };

        // Orchestration commands ride alongside gesture input; apply at most
        // one per tick, keeping it queued unless it succeeded.
        if let Err(error) = self.pump_commands() {
            report.error = Some(error);
        }

        let drawing = frame.command == GestureCommand::Deform
            && self.brush.brush == BrushKind::Draw;
        if !drawing {
            if let Some(curve) = self.recorder.release_tick() {
                self.pending.push(PendingShape::Stroke(curve));
            }
        }

        match frame.command {
            GestureCommand::Deform => self.dispatch_deform(&frame),
            GestureCommand::CycleBrush => {
                self.brush.cycle_brush();
                self.settle_tick();
            },
            GestureCommand::CycleRadius => {
                self.brush.cycle_radius();
                self.settle_tick();
            },
            GestureCommand::BooleanUnion => {
                report.error = self.merge_pending(BooleanOp::Union).err();
            },
            GestureCommand::BooleanDifference => {
                report.error = self.merge_pending(BooleanOp::Difference).err();
            },
            GestureCommand::ConfirmPlacement => {
                report.error = self.confirm_placement().err();
            },
            GestureCommand::Rewind => self.rewind(),
            GestureCommand::SegmentSelection => {
                report.selection_action = self.dispatch_selection(&frame);
            },
            // Orbit belongs to the host camera; mesh state just settles.
            GestureCommand::Orbit | GestureCommand::None => self.settle_tick(),
        }

        self.update_markers(&frame);
        report
    }

    /// Route a deform tick by the active brush.
    fn dispatch_deform(&mut self, frame: &FrameInput) {
        match self.brush.brush {
            BrushKind::Draw => {
                let midpoint = self
                    .hand_midpoint(&frame.hands[0])
                    .or_else(|| self.hand_midpoint(&frame.hands[1]));
                match midpoint {
                    Some(midpoint) => self.recorder.record(midpoint),
                    // Gesture loss counts toward the release debounce too.
                    None => {
                        if let Some(curve) = self.recorder.release_tick() {
                            self.pending.push(PendingShape::Stroke(curve));
                        }
                    },
                }
            },
            BrushKind::CreatePrimitive => {
                let left = self.hand_midpoint(&frame.hands[0]);
                let right = self.hand_midpoint(&frame.hands[1]);
                self.create.update(left, right);
            },
            brush => {
                let fingers = self.scene_fingertips(frame);
                if fingers.is_empty() {
                    self.previous_grip = None;
                    self.settle_tick();
                    return;
                }
                let grip = Point3::from(
                    fingers.iter().fold(Vector3::zeros(), |acc, f| acc + f.coords)
                        / fingers.len() as Real,
                );
                let motion = match self.previous_grip {
                    Some(previous) => grip - previous,
                    None => Vector3::zeros(),
                };
                self.previous_grip = Some(grip);

                self.deform.apply_brush(
                    &mut self.mesh,
                    &fingers,
                    brush,
                    self.brush.radius_level,
                    &motion,
                );
            },
        }
    }

    /// Selection-mode tick: enter on first use, then advance the machine.
    fn dispatch_selection(&mut self, frame: &FrameInput) -> SelectionAction {
        if !self.selection.is_active() {
            self.selection.enter();
        }

        let hand = &frame.hands[0];
        let fingers: [Option<Point3<Real>>; FINGER_COUNT] = std::array::from_fn(|i| {
            hand.fingers[i].detected.then(|| {
                camera::map_normalized(&hand.fingers[i], self.camera.as_ref(), &self.config)
            })
        });
        let pointing_tip = fingers[INDEX];
        let origin = self
            .camera
            .as_ref()
            .map(|c| c.origin)
            .unwrap_or_else(Point3::origin);

        let action =
            self.selection
                .tick(&mut self.segments, &origin, pointing_tip.as_ref(), &fingers);

        if action == SelectionAction::FuseAll {
            if let Err(error) = self.fuse_all() {
                log::warn!("fuse-all failed, segments retained: {error}");
            }
        }
        action
    }

    /// Merge every pending shape into the live mesh through the host kernel.
    /// Failure keeps the queue and the mesh untouched so the merge can be
    /// retried.
    fn merge_pending(&mut self, op: BooleanOp) -> Result<(), EngineError> {
        if self.pending.is_empty() {
            return Err(EngineError::NoPendingGeometry);
        }

        let stroke_radius = self.config.brush_radius(BrushKind::Draw, self.brush.radius_level);
        let combined = stroke::combine_pending(&self.pending, stroke_radius);
        let coarse = self.kernel.remesh(&combined, self.config.stroke_remesh_faces)?;

        let merged = match op {
            BooleanOp::Union => self.kernel.union(&self.mesh, &coarse)?,
            BooleanOp::Difference => self.kernel.difference(&self.mesh, &coarse)?,
        };

        self.replace_mesh(merged);
        self.pending.clear();
        Ok(())
    }

    /// Bake the live create-session preview into the pending queue through
    /// the fixed-parameter remesh. A remesh failure still queues the raw
    /// primitive rather than dropping the user's work.
    fn confirm_placement(&mut self) -> Result<(), EngineError> {
        let shape = self.create.confirm()?;
        let stroke_radius = self.config.brush_radius(BrushKind::Draw, self.brush.radius_level);
        match self
            .kernel
            .remesh(&shape.to_mesh(stroke_radius), self.config.primitive_remesh_faces)
        {
            Ok(remeshed) => {
                self.pending.push(PendingShape::Object(remeshed));
                Ok(())
            },
            Err(error) => {
                log::warn!("primitive remesh failed, queueing raw shape: {error}");
                self.pending.push(shape);
                Err(error)
            },
        }
    }

    /// Rewind, most specific first: an in-flight stroke capture, then the
    /// live create preview, then the most recent pending shape, then the
    /// deformation history.
    fn rewind(&mut self) {
        if self.recorder.is_active() {
            self.recorder.cancel();
        } else if self.create.cancel() {
            // live preview discarded
        } else if self.pending.cancel_last().is_some() {
            // most recent pending shape dropped
        } else if !self.deform.rewind(&mut self.mesh) {
            log::debug!("rewind with nothing to undo");
        }
    }

    /// Boolean-union every segment into one mesh and make it the active
    /// mesh. Failure retains the segments.
    fn fuse_all(&mut self) -> Result<(), EngineError> {
        let mut iter = self.segments.iter();
        let Some(first) = iter.next() else {
            return Err(EngineError::EmptyMesh);
        };

        let mut fused = first.mesh.clone();
        for segment in iter {
            fused = self.kernel.union(&fused, &segment.mesh)?;
        }

        self.replace_mesh(fused);
        self.segments.clear();
        Ok(())
    }

    /// Align externally generated geometry onto the active mesh and adopt
    /// it as the replacement.
    fn import_mesh(&mut self, incoming: Mesh) -> Result<(), EngineError> {
        if incoming.is_empty() {
            return Err(EngineError::EmptyMesh);
        }
        let mut sources = [incoming];
        let result =
            registration::align_and_apply(&self.mesh, &mut sources, &self.registration_config)?;
        log::debug!(
            "import registration: {} icp iterations, {} correspondences",
            result.report.residuals.len(),
            result.report.correspondences_used
        );
        let [aligned] = sources;
        self.replace_mesh(aligned);
        Ok(())
    }

    /// Apply at most one queued orchestration command, acknowledging it only
    /// on success.
    fn pump_commands(&mut self) -> Result<(), EngineError> {
        let Some(command) = self.commands.peek() else {
            return Ok(());
        };

        let outcome = match command.clone() {
            EditCommand::SpawnPrimitive { kind, center, scale } => {
                let mut mesh = kind.mesh(scale);
                mesh.translate(&center.coords);
                self.replace_mesh(mesh);
                Ok(())
            },
            EditCommand::ImportMesh(incoming) => self.import_mesh(incoming),
            EditCommand::FuseAll => self.fuse_all(),
            EditCommand::Select(name) => {
                let found = self.segments.iter().any(|s| s.name == name);
                if found {
                    for segment in &mut self.segments {
                        segment.material = if segment.name == name {
                            SegmentMaterial::Selected
                        } else {
                            SegmentMaterial::Default
                        };
                    }
                    Ok(())
                } else {
                    Err(EngineError::KernelFailure(format!("unknown segment {name}")))
                }
            },
        };

        if outcome.is_ok() {
            self.commands.acknowledge();
        }
        outcome
    }

    /// Thumb–index midpoint of a hand in scene space, when both are visible.
    fn hand_midpoint(&self, hand: &HandFrame) -> Option<Point3<Real>> {
        if !hand.has_thumb_index() {
            return None;
        }
        let thumb =
            camera::map_normalized(&hand.fingers[THUMB], self.camera.as_ref(), &self.config);
        let index =
            camera::map_normalized(&hand.fingers[INDEX], self.camera.as_ref(), &self.config);
        Some(camera::midpoint(&thumb, &index))
    }

    /// Scene positions of every detected fingertip across both hands.
    fn scene_fingertips(&self, frame: &FrameInput) -> Vec<Point3<Real>> {
        let mut fingers = Vec::new();
        for hand in &frame.hands {
            for sample in &hand.fingers {
                if sample.detected {
                    fingers.push(camera::map_normalized(
                        sample,
                        self.camera.as_ref(),
                        &self.config,
                    ));
                }
            }
        }
        fingers
    }

    fn settle_tick(&mut self) {
        self.previous_grip = None;
        self.deform.settle(&mut self.mesh);
    }

    fn update_markers(&mut self, frame: &FrameInput) {
        for (hand_idx, hand) in frame.hands.iter().enumerate() {
            for (finger_idx, sample) in hand.fingers.iter().enumerate() {
                if sample.detected {
                    self.markers.positions[hand_idx][finger_idx] = Some(
                        camera::map_normalized(sample, self.camera.as_ref(), &self.config),
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BooleanOp {
    Union,
    Difference,
}
