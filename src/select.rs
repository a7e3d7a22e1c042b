//! Segment selection: pointing-ray resolution, stability debouncing, and
//! gesture-confirmed actions.
//!
//! While selection mode is active, a ray from the camera through the
//! pointing fingertip picks a candidate segment each tick. The *displayed*
//! selection only follows the candidate after it has been stable for a
//! configured number of consecutive ticks, which keeps tracking jitter from
//! flickering materials. A separate fingertip-clustering classifier watches
//! for held fist/pinch gestures: a held fist fuses every segment into one
//! mesh, a held pinch confirms the current selection.

use crate::config::EngineConfig;
use crate::float_types::Real;
use crate::mesh::{Segment, SegmentMaterial};
use nalgebra::{Matrix4, Point3, Vector3};

/// Coarse hand pose from fingertip clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandPose {
    #[default]
    None,
    /// All visible fingertips bunched around their centroid.
    Fist,
    /// Thumb and index touching.
    Pinch,
    /// Index finger up, hand open.
    Pointing,
}

/// Classify one hand from its scene-space fingertips (`None` entries are
/// undetected fingers). Slot 0 is the thumb, slot 1 the index finger.
pub fn classify_pose(
    fingers: &[Option<Point3<Real>>; 5],
    pinch_threshold: Real,
    fist_radius: Real,
) -> HandPose {
    let detected: Vec<Point3<Real>> = fingers.iter().flatten().copied().collect();

    // Fist needs the whole hand visible and bunched.
    if detected.len() == fingers.len() {
        let centroid = Point3::from(
            detected.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords)
                / detected.len() as Real,
        );
        if detected.iter().all(|p| (p - centroid).norm() <= fist_radius) {
            return HandPose::Fist;
        }
    }

    if let (Some(thumb), Some(index)) = (fingers[0], fingers[1]) {
        if (thumb - index).norm() < pinch_threshold {
            return HandPose::Pinch;
        }
    }

    if fingers[1].is_some() {
        return HandPose::Pointing;
    }

    HandPose::None
}

/// Action fired by a held gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionAction {
    None,
    /// Held pinch: the named segment was confirmed; the rest were parented
    /// to it and the group was recentered/rescaled. Selection mode exited.
    Confirmed { selected: String },
    /// Held fist: every segment should be boolean-unioned into one mesh.
    /// Selection mode exited; the merge itself is the dispatcher's job.
    FuseAll,
}

#[derive(Debug)]
pub struct SelectionEngine {
    stability_threshold: u32,
    confirm_ticks: u32,
    pinch_threshold: Real,
    fist_radius: Real,
    canonical_extent: Real,

    active: bool,
    candidate: Option<usize>,
    stable_count: u32,
    selected: Option<usize>,
    held_pose: HandPose,
    held_count: u32,
}

impl SelectionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            stability_threshold: config.stability_threshold,
            confirm_ticks: config.gesture_confirm_ticks,
            pinch_threshold: config.pinch_threshold,
            fist_radius: config.fist_radius,
            canonical_extent: config.canonical_extent,

            active: false,
            candidate: None,
            stable_count: 0,
            selected: None,
            held_pose: HandPose::None,
            held_count: 0,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Name of the currently displayed selection, for the orchestration
    /// layer.
    pub fn current_selection<'a>(&self, segments: &'a [Segment]) -> Option<&'a str> {
        self.selected
            .and_then(|i| segments.get(i))
            .map(|s| s.name.as_str())
    }

    /// Enter selection mode with fresh counters.
    pub fn enter(&mut self) {
        self.active = true;
        self.candidate = None;
        self.stable_count = 0;
        self.held_pose = HandPose::None;
        self.held_count = 0;
    }

    /// Leave selection mode, keeping the displayed selection intact.
    pub fn exit(&mut self) {
        self.active = false;
        self.held_pose = HandPose::None;
        self.held_count = 0;
    }

    /// Advance one tick of selection mode.
    ///
    /// `ray_origin` is the camera eye; `pointing_tip` the mapped fingertip
    /// the ray passes through (absent while the finger is lost);
    /// `fingers` the full scene-space fingertip set of the pointing hand.
    pub fn tick(
        &mut self,
        segments: &mut Vec<Segment>,
        ray_origin: &Point3<Real>,
        pointing_tip: Option<&Point3<Real>>,
        fingers: &[Option<Point3<Real>>; 5],
    ) -> SelectionAction {
        if !self.active || segments.is_empty() {
            return SelectionAction::None;
        }

        // 1. Resolve the candidate under the pointing ray.
        if let Some(tip) = pointing_tip {
            let hit = cast_selection_ray(segments, ray_origin, tip);
            self.advance_candidate(segments, hit);
        }

        // 2. Gesture hold counter.
        let pose = classify_pose(fingers, self.pinch_threshold, self.fist_radius);
        if pose == self.held_pose {
            self.held_count = self.held_count.saturating_add(1);
        } else {
            self.held_pose = pose;
            self.held_count = 1;
        }

        if self.held_count >= self.confirm_ticks {
            match self.held_pose {
                HandPose::Fist => {
                    self.exit();
                    self.selected = None;
                    return SelectionAction::FuseAll;
                },
                HandPose::Pinch => {
                    if let Some(selected) = self.selected {
                        let name = segments[selected].name.clone();
                        confirm_group(segments, selected, self.canonical_extent);
                        self.exit();
                        return SelectionAction::Confirmed { selected: name };
                    }
                },
                _ => {},
            }
        }

        SelectionAction::None
    }

    /// Stability-debounced candidate tracking: the displayed selection only
    /// switches after the same candidate held for the threshold count.
    fn advance_candidate(&mut self, segments: &mut [Segment], hit: Option<usize>) {
        if hit == self.candidate {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.candidate = hit;
            self.stable_count = 1;
        }

        if self.stable_count >= self.stability_threshold && self.candidate != self.selected {
            if let Some(new) = self.candidate {
                if let Some(previous) = self.selected {
                    if let Some(segment) = segments.get_mut(previous) {
                        segment.material = SegmentMaterial::Default;
                    }
                }
                segments[new].material = SegmentMaterial::Selected;
                self.selected = self.candidate;
            }
        }
    }
}

/// First segment hit by the camera→fingertip ray, by ascending distance.
fn cast_selection_ray(
    segments: &[Segment],
    origin: &Point3<Real>,
    through: &Point3<Real>,
) -> Option<usize> {
    let direction = through - origin;
    if direction.norm() <= Real::EPSILON {
        return None;
    }

    let mut best: Option<(usize, Real)> = None;
    for (idx, segment) in segments.iter().enumerate() {
        if let Some(&(_, distance)) =
            segment.mesh.ray_intersections(origin, &direction).first()
        {
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((idx, distance));
            }
        }
    }
    best.map(|(idx, _)| idx)
}

/// Confirm `selected`: parent every other segment to it, then recenter the
/// whole group and rescale it so its largest extent matches the canonical
/// bounding extent.
fn confirm_group(segments: &mut [Segment], selected: usize, canonical_extent: Real) {
    let parent_name = segments[selected].name.clone();
    for (idx, segment) in segments.iter_mut().enumerate() {
        if idx != selected {
            segment.parent = Some(parent_name.clone());
        }
    }

    // Group bounds over every segment.
    let mut mins = Point3::new(Real::MAX, Real::MAX, Real::MAX);
    let mut maxs = Point3::new(-Real::MAX, -Real::MAX, -Real::MAX);
    for segment in segments.iter() {
        let aabb = segment.mesh.bounding_box();
        for axis in 0..3 {
            mins[axis] = mins[axis].min(aabb.mins[axis]);
            maxs[axis] = maxs[axis].max(aabb.maxs[axis]);
        }
    }
    if mins.x > maxs.x {
        return;
    }

    let extent = (maxs - mins).amax();
    let scale = if extent > Real::EPSILON {
        canonical_extent / extent
    } else {
        1.0
    };
    let center = nalgebra::center(&mins, &maxs);
    let transform = Matrix4::new_scaling(scale)
        * Matrix4::new_translation(&-center.coords);

    for segment in segments.iter_mut() {
        // Uniform scale + translation is always invertible.
        let _ = segment.mesh.apply_transform(&transform);
    }
}
