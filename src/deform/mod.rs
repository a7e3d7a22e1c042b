//! Velocity-based brush deformation.
//!
//! Brushes apply force kernels to every vertex inside their influence radius,
//! weighted by a smooth `(1 − d/r)²` falloff. Forces integrate into damped
//! per-vertex velocities; displacements are clamped, pulled toward the
//! neighborhood mean by a cohesion pass so the surface moves like connected
//! mass instead of per-vertex noise, and recorded against an undo ring.
//! With no active brush the settle phase keeps applying the damping multiply
//! until every velocity falls below the rest threshold.

use crate::config::EngineConfig;
use crate::float_types::Real;
use crate::mesh::Mesh;
use crate::spatial::PointIndex;
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub mod history;
pub use history::{HistoryRing, HistorySnapshot};

/// The active brush. `Pinch` doubles as the default kernel; `Draw` and
/// `CreatePrimitive` select the stroke and primitive builders rather than a
/// force kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushKind {
    Pinch,
    Grab,
    Smooth,
    Inflate,
    Flatten,
    Draw,
    CreatePrimitive,
}

impl BrushKind {
    /// Cycle order for the cycle-brush gesture.
    pub const CYCLE: [BrushKind; 7] = [
        BrushKind::Pinch,
        BrushKind::Grab,
        BrushKind::Smooth,
        BrushKind::Inflate,
        BrushKind::Flatten,
        BrushKind::Draw,
        BrushKind::CreatePrimitive,
    ];
}

/// Process-wide brush selection, mutated only by the explicit cycle gestures.
#[derive(Debug, Clone, Copy)]
pub struct BrushState {
    pub brush: BrushKind,
    pub radius_level: usize,
}

impl Default for BrushState {
    fn default() -> Self {
        Self { brush: BrushKind::Pinch, radius_level: 0 }
    }
}

impl BrushState {
    pub fn cycle_brush(&mut self) {
        let position = BrushKind::CYCLE
            .iter()
            .position(|&b| b == self.brush)
            .unwrap_or(0);
        self.brush = BrushKind::CYCLE[(position + 1) % BrushKind::CYCLE.len()];
    }

    pub fn cycle_radius(&mut self) {
        self.radius_level = (self.radius_level + 1) % crate::config::RADIUS_LEVELS;
    }
}

/// Applies brush kernels and the settle phase to the active mesh, and owns
/// the undo snapshot ring.
#[derive(Debug)]
pub struct DeformEngine {
    config: EngineConfig,
    history: HistoryRing,
    tick: u64,
}

impl DeformEngine {
    pub fn new(config: EngineConfig) -> Self {
        let history = HistoryRing::new(config.history_capacity);
        Self { config, history, tick: 0 }
    }

    pub const fn history(&self) -> &HistoryRing {
        &self.history
    }

    /// Drop undo state; call when the mesh is replaced wholesale.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Apply one tick of the given brush.
    ///
    /// `fingers` are active fingertip positions in scene space; `hand_motion`
    /// is the hand's scene-space movement since the previous tick (drives the
    /// grab kernel). A snapshot of the pre-deformation positions is pushed
    /// onto the history ring before anything moves.
    pub fn apply_brush(
        &mut self,
        mesh: &mut Mesh,
        fingers: &[Point3<Real>],
        brush: BrushKind,
        radius_level: usize,
        hand_motion: &Vector3<Real>,
    ) {
        self.tick += 1;
        if mesh.is_empty() || fingers.is_empty() {
            return;
        }

        self.history.push(mesh.positions(), self.tick);

        // Influence center and finger positions in mesh-local space.
        let local_fingers: Vec<Point3<Real>> =
            fingers.iter().map(|f| mesh.to_local(f)).collect();
        let center = Point3::from(
            local_fingers
                .iter()
                .fold(Vector3::zeros(), |acc, f| acc + f.coords)
                / local_fingers.len() as Real,
        );
        let local_motion = mesh.to_local_vector(hand_motion);

        let radius = self.config.brush_radius(brush, radius_level);
        let positions = mesh.positions();
        let index = PointIndex::build(&positions);
        let touched = index.within_radius(&center, radius);
        if touched.is_empty() {
            return;
        }

        let forces = self.brush_forces(
            mesh,
            brush,
            &touched,
            radius,
            &local_fingers,
            &local_motion,
        );

        self.integrate(mesh, &forces);
    }

    /// Per-vertex forces for the touched set.
    fn brush_forces(
        &self,
        mesh: &Mesh,
        brush: BrushKind,
        touched: &[(usize, Real)],
        radius: Real,
        fingers: &[Point3<Real>],
        hand_motion: &Vector3<Real>,
    ) -> Vec<(usize, Vector3<Real>)> {
        let config = &self.config;

        // Flatten fits its plane once over everything in range.
        let plane = if brush == BrushKind::Flatten {
            fit_plane(mesh, touched)
        } else {
            None
        };

        let kernel = |&(idx, dist): &(usize, Real)| -> (usize, Vector3<Real>) {
            let falloff = {
                let x = 1.0 - dist / radius;
                x * x
            };
            let vertex = &mesh.vertices[idx];

            let force = match brush {
                BrushKind::Grab => hand_motion * (config.grab_strength * falloff),
                BrushKind::Smooth => {
                    match neighbor_mean(mesh, idx) {
                        Some(mean) => (mean - vertex.pos) * (config.smooth_strength * falloff),
                        // Isolated vertex: nothing to relax toward.
                        None => Vector3::zeros(),
                    }
                },
                BrushKind::Inflate => vertex.normal * (config.inflate_strength * falloff),
                BrushKind::Flatten => match plane {
                    Some((origin, normal)) => {
                        let signed = (vertex.pos - origin).dot(&normal);
                        -normal * signed * (config.flatten_strength * falloff)
                    },
                    None => Vector3::zeros(),
                },
                // Pinch is the default kernel; Draw/CreatePrimitive route to
                // the stroke and primitive builders and never reach here with
                // forces to apply.
                BrushKind::Pinch | BrushKind::Draw | BrushKind::CreatePrimitive => {
                    let mut pull = Vector3::zeros();
                    for finger in fingers {
                        let offset = finger - vertex.pos;
                        let finger_dist = offset.norm();
                        if finger_dist > Real::EPSILON && finger_dist < config.finger_radius {
                            let finger_falloff = {
                                let x = 1.0 - finger_dist / config.finger_radius;
                                x * x
                            };
                            pull += offset / finger_dist
                                * (config.finger_strength * finger_falloff);
                        }
                    }
                    pull
                },
            };
            (idx, force)
        };

        #[cfg(feature = "parallel")]
        {
            touched.par_iter().map(kernel).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            touched.iter().map(kernel).collect()
        }
    }

    /// Damped velocity integration with displacement clamping and the
    /// neighbor-cohesion pass.
    fn integrate(&self, mesh: &mut Mesh, forces: &[(usize, Vector3<Real>)]) {
        let config = &self.config;
        let scale = self.volume_preservation_factor(mesh);

        let mut raw: HashMap<usize, Vector3<Real>> = HashMap::with_capacity(forces.len());
        for &(idx, force) in forces {
            let vertex = &mut mesh.vertices[idx];
            vertex.velocity = (vertex.velocity + force) * config.damping;

            let mut displacement = vertex.velocity * config.timestep;
            let magnitude = displacement.norm();
            if magnitude > config.max_displacement {
                displacement *= config.max_displacement / magnitude;
            }
            raw.insert(idx, displacement * scale);
        }

        // Cohesion: pull each displacement toward its topological
        // neighborhood's mean so the surface moves as connected mass.
        // Untouched neighbors count as stationary.
        let adjacency = mesh.adjacency().clone();
        let mut final_displacements = Vec::with_capacity(raw.len());
        for (&idx, &displacement) in &raw {
            let blended = match adjacency.get(&idx) {
                Some(neighbors) if !neighbors.is_empty() => {
                    let mean = neighbors
                        .iter()
                        .map(|n| raw.get(n).copied().unwrap_or_else(Vector3::zeros))
                        .fold(Vector3::zeros(), |acc, d| acc + d)
                        / neighbors.len() as Real;
                    displacement + (mean - displacement) * config.cohesion
                },
                _ => displacement,
            };
            final_displacements.push((idx, blended));
        }

        for (idx, displacement) in final_displacements {
            mesh.vertices[idx].pos += displacement;
        }

        mesh.invalidate_caches();
        mesh.compute_vertex_normals();
    }

    /// Volume-preservation scale factor.
    ///
    /// Deliberately disabled: always 1.0. The cached
    /// [`Mesh::initial_volume`] stays available as the reference a soft
    /// volume constraint would scale against, but reintroducing one is a
    /// design decision that has not been made.
    #[allow(unused_variables)]
    pub fn volume_preservation_factor(&self, mesh: &Mesh) -> Real {
        1.0
    }

    /// One tick of the settle phase: no forces, just the damping multiply,
    /// residual motion, and zeroing of negligible velocities. Returns true
    /// once every vertex is at rest.
    pub fn settle(&mut self, mesh: &mut Mesh) -> bool {
        self.tick += 1;
        let config = &self.config;
        let mut at_rest = true;
        let mut moved = false;

        for vertex in &mut mesh.vertices {
            if vertex.velocity == Vector3::zeros() {
                continue;
            }
            vertex.velocity *= config.damping;
            if vertex.velocity.norm() < config.settle_threshold {
                vertex.clear_velocity();
                continue;
            }
            at_rest = false;

            let mut displacement = vertex.velocity * config.timestep;
            let magnitude = displacement.norm();
            if magnitude > config.max_displacement {
                displacement *= config.max_displacement / magnitude;
            }
            vertex.pos += displacement;
            moved = true;
        }

        if moved {
            mesh.invalidate_caches();
            mesh.compute_vertex_normals();
        }
        at_rest
    }

    /// Restore the most recent history snapshot. Returns false when there is
    /// nothing to rewind or the snapshot no longer matches the mesh (it was
    /// replaced wholesale since).
    pub fn rewind(&mut self, mesh: &mut Mesh) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        if snapshot.positions.len() != mesh.vertices.len() {
            log::warn!(
                "history snapshot has {} positions but mesh has {} vertices, dropping it",
                snapshot.positions.len(),
                mesh.vertices.len()
            );
            return false;
        }
        for (vertex, position) in mesh.vertices.iter_mut().zip(snapshot.positions) {
            vertex.pos = position;
            vertex.clear_velocity();
        }
        mesh.invalidate_caches();
        mesh.compute_vertex_normals();
        true
    }
}

/// Mean position of a vertex's edge-linked neighbors.
fn neighbor_mean(mesh: &Mesh, idx: usize) -> Option<Point3<Real>> {
    let neighbors = mesh.adjacency().get(&idx)?;
    if neighbors.is_empty() {
        return None;
    }
    let sum = neighbors
        .iter()
        .fold(Vector3::zeros(), |acc, &n| acc + mesh.vertices[n].pos.coords);
    Some(Point3::from(sum / neighbors.len() as Real))
}

/// Plane through the touched region: centroid + mean vertex normal.
/// Returns `None` when the normals cancel out.
fn fit_plane(mesh: &Mesh, touched: &[(usize, Real)]) -> Option<(Point3<Real>, Vector3<Real>)> {
    if touched.is_empty() {
        return None;
    }
    let mut centroid = Vector3::zeros();
    let mut normal = Vector3::zeros();
    for &(idx, _) in touched {
        centroid += mesh.vertices[idx].pos.coords;
        normal += mesh.vertices[idx].normal;
    }
    centroid /= touched.len() as Real;
    let norm = normal.norm();
    if norm <= Real::EPSILON {
        return None;
    }
    Some((Point3::from(centroid), normal / norm))
}
