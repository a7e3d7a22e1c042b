//! Engine errors

use std::fmt::Display;

/// Failures that can surface from engine operations.
///
/// Degenerate *inputs* (too few hull points, too few surface samples, empty
/// neighbor lists) are handled by documented fallbacks at the call site and
/// never reach this enum; what remains is the small set of conditions a
/// caller can meaningfully react to.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A mesh had no vertices where at least one was required
    EmptyMesh,
    /// A host boolean/remesh request failed; the pending queue is left intact
    KernelFailure(String),
    /// A merge was requested with nothing in the pending-geometry queue
    NoPendingGeometry,
    /// A confirm/cancel was requested with no live create session
    NoActiveSession,
    /// Geometry too degenerate to operate on (fewer vertices than required)
    DegenerateGeometry { required: usize, actual: usize },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::EmptyMesh => write!(f, "(EmptyMesh) The mesh has no vertices"),
            EngineError::KernelFailure(reason) => {
                write!(f, "(KernelFailure) Host geometry kernel failed: {}", reason)
            },
            EngineError::NoPendingGeometry => {
                write!(f, "(NoPendingGeometry) The pending-geometry queue is empty")
            },
            EngineError::NoActiveSession => {
                write!(f, "(NoActiveSession) No create session is live")
            },
            EngineError::DegenerateGeometry { required, actual } => write!(
                f,
                "(DegenerateGeometry) Operation requires at least {} vertices, got {}",
                required, actual
            ),
        }
    }
}
