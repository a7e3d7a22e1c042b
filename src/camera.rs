//! Mapping normalized tracker samples into scene space.

use crate::config::EngineConfig;
use crate::float_types::Real;
use crate::frame::FingertipSample;
use nalgebra::{Point3, Vector3};

/// World-space basis of the active viewing camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    /// Camera eye position, also the origin selection rays are cast from.
    pub origin: Point3<Real>,
    pub right: Vector3<Real>,
    pub up: Vector3<Real>,
    pub forward: Vector3<Real>,
}

impl CameraBasis {
    /// A camera at the origin looking down −Z with Y up.
    pub fn identity() -> Self {
        Self {
            origin: Point3::origin(),
            right: Vector3::x(),
            up: Vector3::y(),
            forward: -Vector3::z(),
        }
    }
}

/// Convert one normalized tracker sample into a scene-space point.
///
/// The tracker delivers `(x, y, z) ∈ [0, 1]³` with `y` growing downward and
/// `z` growing toward the camera, so the local vector is built from
/// `(x − 0.5, −z, 0.5 − y)` scaled per axis, then projected onto the camera
/// basis. Without a camera the local vector is used directly on world axes.
pub fn map_normalized(
    sample: &FingertipSample,
    basis: Option<&CameraBasis>,
    config: &EngineConfig,
) -> Point3<Real> {
    let [sx, sy, sz] = config.mapper_scale;
    let local = Vector3::new(
        sx * (sample.x - 0.5),
        sy * (-sample.z),
        sz * (0.5 - sample.y),
    );

    match basis {
        Some(cam) => {
            let world = cam.right * local.x + cam.up * local.z + cam.forward * local.y;
            cam.origin + world
        },
        None => Point3::from(local),
    }
}

/// Midpoint between two scene-space points (thumb–index pinch midpoint).
pub fn midpoint(a: &Point3<Real>, b: &Point3<Real>) -> Point3<Real> {
    Point3::from((a.coords + b.coords) * 0.5)
}
