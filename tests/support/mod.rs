//! Test support library
//! Provides shared test doubles for the integration tests.

use sculptrs::errors::EngineError;
use sculptrs::host::GeometryKernel;
use sculptrs::mesh::Mesh;

/// Host-kernel stand-in: union concatenates geometry, difference and remesh
/// pass meshes through. Construct with `failing()` to simulate a host
/// failure on every request.
pub struct StubKernel {
    fail: bool,
}

impl StubKernel {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.fail {
            Err(EngineError::KernelFailure("stub kernel set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl GeometryKernel for StubKernel {
    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, EngineError> {
        self.check()?;
        let mut positions: Vec<_> = a.vertices.iter().map(|v| v.pos).collect();
        let mut faces = a.faces.clone();
        let base = positions.len();
        positions.extend(b.vertices.iter().map(|v| v.pos));
        faces.extend(b.faces.iter().map(|f| [f[0] + base, f[1] + base, f[2] + base]));
        Ok(Mesh::from_positions(&positions, faces))
    }

    fn difference(&self, a: &Mesh, _b: &Mesh) -> Result<Mesh, EngineError> {
        self.check()?;
        Ok(a.clone())
    }

    fn remesh(&self, mesh: &Mesh, _target_faces: usize) -> Result<Mesh, EngineError> {
        self.check()?;
        Ok(mesh.clone())
    }
}
