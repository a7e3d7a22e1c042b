//! Two-phase primitive creation.
//!
//! A session runs Size → Position: while both hands present a thumb+index
//! pair, the distance between the two hands' midpoints drives a live
//! preview's uniform scale; releasing both hands locks the size, after which
//! a single hand repositions the preview. Confirmation bakes the preview
//! into the pending-geometry queue; rewind cancels the preview without
//! touching previously confirmed objects. The session is a tagged union, so
//! there is no state where a preview outlives a confirm or cancel.

use crate::errors::EngineError;
use crate::float_types::Real;
use crate::mesh::Mesh;
use crate::stroke::PendingShape;
use nalgebra::Point3;

/// Shape baked by a create session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveKind {
    #[default]
    Sphere,
    Cuboid,
}

impl PrimitiveKind {
    /// Realize the primitive at the origin with the given uniform scale
    /// (interpreted as diameter/edge length).
    pub fn mesh(&self, scale: Real) -> Mesh {
        match self {
            PrimitiveKind::Sphere => Mesh::sphere(scale * 0.5, 24, 12),
            PrimitiveKind::Cuboid => Mesh::cube(scale),
        }
    }
}

/// Phase of the live session, for host-side preview rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePhase {
    Idle,
    Sizing,
    Positioning,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Sizing {
        kind: PrimitiveKind,
        scale: Real,
        center: Point3<Real>,
    },
    Positioning {
        kind: PrimitiveKind,
        scale: Real,
        center: Point3<Real>,
    },
}

/// The two-phase primitive-creation state machine. One session is live at a
/// time; it is terminated by confirmation or cancellation.
#[derive(Debug)]
pub struct CreateSession {
    state: State,
    scale_factor: Real,
    kind: PrimitiveKind,
}

impl CreateSession {
    pub fn new(scale_factor: Real) -> Self {
        Self {
            state: State::Idle,
            scale_factor,
            kind: PrimitiveKind::default(),
        }
    }

    /// Primitive kind used for the *next* session to start.
    pub fn set_kind(&mut self, kind: PrimitiveKind) {
        self.kind = kind;
    }

    pub fn phase(&self) -> CreatePhase {
        match self.state {
            State::Idle => CreatePhase::Idle,
            State::Sizing { .. } => CreatePhase::Sizing,
            State::Positioning { .. } => CreatePhase::Positioning,
        }
    }

    /// Live preview as `(kind, scale, center)`, absent once confirmed or
    /// cancelled.
    pub fn preview(&self) -> Option<(PrimitiveKind, Real, Point3<Real>)> {
        match &self.state {
            State::Idle => None,
            State::Sizing { kind, scale, center }
            | State::Positioning { kind, scale, center } => Some((*kind, *scale, *center)),
        }
    }

    /// Advance the session one tick. Each argument is the hand's thumb–index
    /// midpoint in scene space, present only while that hand shows both
    /// fingers.
    pub fn update(&mut self, left: Option<Point3<Real>>, right: Option<Point3<Real>>) {
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = match (state, left, right) {
            // Both hands up: start or re-size.
            (State::Idle, Some(l), Some(r)) => State::Sizing {
                kind: self.kind,
                scale: (r - l).norm() * self.scale_factor,
                center: Point3::from((l.coords + r.coords) * 0.5),
            },
            (State::Sizing { kind, .. }, Some(l), Some(r)) => State::Sizing {
                kind,
                scale: (r - l).norm() * self.scale_factor,
                center: Point3::from((l.coords + r.coords) * 0.5),
            },
            // Both hands released: the size is locked.
            (State::Sizing { kind, scale, center }, None, None) => {
                State::Positioning { kind, scale, center }
            },
            // One hand lingering during sizing: hold, neither resize nor lock.
            (sizing @ State::Sizing { .. }, _, _) => sizing,
            // Position phase follows whichever single hand is up.
            (State::Positioning { kind, scale, .. }, Some(hand), None)
            | (State::Positioning { kind, scale, .. }, None, Some(hand)) => {
                State::Positioning { kind, scale, center: hand }
            },
            (positioning @ State::Positioning { .. }, _, _) => positioning,
            (State::Idle, _, _) => State::Idle,
        };
    }

    /// Bake the live preview into a pending shape, ending the session.
    pub fn confirm(&mut self) -> Result<PendingShape, EngineError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(EngineError::NoActiveSession),
            State::Sizing { kind, scale, center }
            | State::Positioning { kind, scale, center } => {
                Ok(PendingShape::Primitive { kind, center, scale })
            },
        }
    }

    /// Discard the live preview. Returns false when no session was active.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            State::Idle => false,
            _ => {
                self.state = State::Idle;
                true
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> CreateSession {
        CreateSession::new(0.75)
    }

    #[test]
    fn two_hands_start_sizing_with_scaled_distance() {
        let mut s = session();
        s.update(
            Some(Point3::new(-0.5, 0.0, 0.0)),
            Some(Point3::new(0.5, 0.0, 0.0)),
        );
        assert_eq!(s.phase(), CreatePhase::Sizing);
        let (_, scale, center) = s.preview().unwrap();
        assert!((scale - 0.75).abs() < 1e-12, "raw distance 1.0 × factor 0.75");
        approx::assert_relative_eq!(center, Point3::origin(), epsilon = 1e-12);
    }

    #[test]
    fn releasing_both_hands_locks_scale() {
        let mut s = session();
        s.update(
            Some(Point3::new(-1.0, 0.0, 0.0)),
            Some(Point3::new(1.0, 0.0, 0.0)),
        );
        s.update(None, None);
        assert_eq!(s.phase(), CreatePhase::Positioning);

        // A single hand now moves the preview but cannot resize it.
        let (_, scale_before, _) = s.preview().unwrap();
        s.update(None, Some(Point3::new(3.0, 1.0, 0.0)));
        let (_, scale_after, center) = s.preview().unwrap();
        assert_eq!(scale_before, scale_after);
        approx::assert_relative_eq!(center, Point3::new(3.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn lingering_hand_does_not_lock_or_resize() {
        let mut s = session();
        s.update(
            Some(Point3::new(-1.0, 0.0, 0.0)),
            Some(Point3::new(1.0, 0.0, 0.0)),
        );
        s.update(Some(Point3::new(-2.0, 0.0, 0.0)), None);
        assert_eq!(s.phase(), CreatePhase::Sizing);
        let (_, scale, _) = s.preview().unwrap();
        assert!((scale - 2.0 * 0.75).abs() < 1e-12);
    }

    #[test]
    fn confirm_bakes_and_ends_session() {
        let mut s = session();
        s.update(
            Some(Point3::new(0.0, 0.0, 0.0)),
            Some(Point3::new(2.0, 0.0, 0.0)),
        );
        s.update(None, None);
        let shape = s.confirm().unwrap();
        match shape {
            crate::stroke::PendingShape::Primitive { scale, .. } => {
                assert!((scale - 1.5).abs() < 1e-12);
            },
            other => panic!("expected primitive, got {other:?}"),
        }
        assert_eq!(s.phase(), CreatePhase::Idle);
        assert!(s.preview().is_none());
        assert_eq!(s.confirm(), Err(EngineError::NoActiveSession));
    }

    #[test]
    fn cancel_discards_preview_only() {
        let mut s = session();
        assert!(!s.cancel());
        s.update(
            Some(Point3::new(0.0, 0.0, 0.0)),
            Some(Point3::new(1.0, 0.0, 0.0)),
        );
        assert!(s.cancel());
        assert_eq!(s.phase(), CreatePhase::Idle);
        assert!(s.preview().is_none());
    }
}
