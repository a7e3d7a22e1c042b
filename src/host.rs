//! Seams to the host application.
//!
//! The engine never implements boolean or remesh operations itself; it
//! requests them from a [`GeometryKernel`] the host provides, and it receives
//! orchestration-level commands through a [`CommandQueue`] with idempotent
//! consumption (a command is removed only after it was applied
//! successfully).

use crate::create::PrimitiveKind;
use crate::errors::EngineError;
use crate::float_types::Real;
use crate::mesh::Mesh;
use nalgebra::Point3;
use std::collections::VecDeque;

/// Opaque geometry services the host must supply: boolean union/difference
/// and a target-face-count remesh. Requests take meshes in, results come
/// back as fresh meshes; failures surface as [`EngineError::KernelFailure`]
/// and leave the engine's state untouched.
pub trait GeometryKernel {
    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, EngineError>;
    fn difference(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, EngineError>;
    fn remesh(&self, mesh: &Mesh, target_faces: usize) -> Result<Mesh, EngineError>;
}

/// Orchestration command delivered by the host pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// Spawn a primitive as the new active mesh.
    SpawnPrimitive {
        kind: PrimitiveKind,
        center: Point3<Real>,
        scale: Real,
    },
    /// Replace the active mesh with externally generated geometry.
    ImportMesh(Mesh),
    /// Boolean-union every segment into one mesh.
    FuseAll,
    /// Force the named segment selected.
    Select(String),
}

/// Single-producer/single-consumer command channel with idempotent
/// consumption: `peek` exposes the head, `acknowledge` removes it, and a
/// command survives until its application succeeded.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<EditCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self { commands: VecDeque::new() }
    }

    /// Enqueue a command from the host side.
    pub fn submit(&mut self, command: EditCommand) {
        self.commands.push_back(command);
    }

    /// The command to apply next, left in place until acknowledged.
    pub fn peek(&self) -> Option<&EditCommand> {
        self.commands.front()
    }

    /// Remove the head command after successful application.
    pub fn acknowledge(&mut self) -> Option<EditCommand> {
        self.commands.pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
