//! Tunable engine configuration.
//!
//! Every gesture heuristic (pinch distance, fist radius, stability counts,
//! debounce windows) lives here as a named field with a documented default so
//! it can be recalibrated per tracking hardware without code changes.

use crate::deform::BrushKind;
use crate::float_types::Real;

/// Number of radius levels each brush can cycle through.
pub const RADIUS_LEVELS: usize = 3;

/// Configuration for the interactive engine: brush physics, gesture
/// thresholds, history depth, and coordinate mapping.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds per tick (the external timer drives ~30 Hz)
    pub timestep: Real,
    /// Velocity damping multiplier per tick, in (0, 1]
    pub damping: Real,
    /// Hard clamp on per-tick vertex displacement magnitude
    pub max_displacement: Real,
    /// Lerp factor pulling each raw displacement toward its neighbors' mean
    pub cohesion: Real,
    /// Velocities below this magnitude are zeroed during the settle phase
    pub settle_threshold: Real,
    /// Maximum retained history snapshots
    pub history_capacity: usize,

    /// Strength multipliers per brush kernel
    pub grab_strength: Real,
    pub smooth_strength: Real,
    pub inflate_strength: Real,
    pub flatten_strength: Real,
    pub finger_strength: Real,
    /// Per-vertex influence radius of an individual fingertip (pinch brush)
    pub finger_radius: Real,

    /// Reject stroke points closer than this to the previously captured point
    pub stroke_min_spacing: Real,
    /// Ticks a non-deform command must persist before a stroke is released
    pub release_debounce_ticks: u32,

    /// Multiplier from raw inter-hand distance to preview scale
    pub create_scale_factor: Real,

    /// Thumb–index distance below which the hand reads as a pinch
    pub pinch_threshold: Real,
    /// All fingertips within this radius of their centroid read as a fist
    pub fist_radius: Real,
    /// Consecutive identical-candidate ticks before the selection switches
    pub stability_threshold: u32,
    /// Consecutive ticks a gesture must be held before it fires
    pub gesture_confirm_ticks: u32,
    /// Ticks a missing fingertip keeps its last marker before going absent
    pub finger_grace_ticks: u32,

    /// Per-axis scale applied to normalized tracker coordinates
    pub mapper_scale: [Real; 3],

    /// Max extent a confirmed selection group is rescaled to
    pub canonical_extent: Real,

    /// Target face count for the fixed-parameter remesh of baked primitives
    pub primitive_remesh_faces: usize,
    /// Target face count for the coarse remesh of merged draw strokes
    pub stroke_remesh_faces: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 30.0,
            damping: 0.82,
            max_displacement: 0.05,
            cohesion: 0.45,
            settle_threshold: 1e-4,
            history_capacity: 24,

            grab_strength: 1.6,
            smooth_strength: 2.4,
            inflate_strength: 0.9,
            flatten_strength: 3.0,
            finger_strength: 1.2,
            finger_radius: 0.25,

            stroke_min_spacing: 0.015,
            release_debounce_ticks: 6,

            create_scale_factor: 0.75,

            pinch_threshold: 0.05,
            fist_radius: 0.09,
            stability_threshold: 15,
            gesture_confirm_ticks: 20,
            finger_grace_ticks: 5,

            mapper_scale: [2.4, 2.4, 1.8],

            canonical_extent: 2.0,

            primitive_remesh_faces: 1500,
            stroke_remesh_faces: 800,
        }
    }
}

impl EngineConfig {
    /// Effective brush radius for a `(brush, radius_level)` pair.
    ///
    /// Each brush carries its own ordered radius table; `level` indexes into
    /// it and saturates at the largest entry.
    pub fn brush_radius(&self, brush: BrushKind, level: usize) -> Real {
        let table: [Real; RADIUS_LEVELS] = match brush {
            BrushKind::Pinch => [0.15, 0.3, 0.5],
            BrushKind::Grab => [0.25, 0.5, 0.9],
            BrushKind::Smooth => [0.2, 0.4, 0.7],
            BrushKind::Inflate => [0.2, 0.4, 0.7],
            BrushKind::Flatten => [0.25, 0.5, 0.8],
            BrushKind::Draw => [0.1, 0.2, 0.35],
            BrushKind::CreatePrimitive => [0.3, 0.6, 1.0],
        };
        table[level.min(RADIUS_LEVELS - 1)]
    }
}

/// Configuration for one registration invocation.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Surface samples drawn from each side before ICP
    pub sample_count: usize,
    /// Fixed ICP iteration count
    pub iterations: usize,
    /// Worst fraction of correspondences discarded each iteration, in [0, 1)
    pub trim_ratio: Real,
    /// RNG seed for the area-weighted surface sampling
    pub seed: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            sample_count: 600,
            iterations: 24,
            trim_ratio: 0.15,
            seed: 0x5eed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn radius_level_saturates() {
        let config = EngineConfig::default();
        let largest = config.brush_radius(BrushKind::Grab, RADIUS_LEVELS - 1);
        assert_eq!(config.brush_radius(BrushKind::Grab, 99), largest);
    }

    #[test]
    fn damping_is_in_unit_interval() {
        let config = EngineConfig::default();
        assert!(config.damping > 0.0 && config.damping <= 1.0);
    }
}
