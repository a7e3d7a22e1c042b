//! Per-tick input records from the external hand tracker.
//!
//! The tracker delivers, once per tick, a normalized coordinate triple and a
//! detection flag per hand and finger, plus the single decoded gesture
//! command. [`FrameCache`] smooths over tracking dropouts: a frame that never
//! arrives is replaced by the previous tick's snapshot, and a finger that
//! vanishes keeps its last visible marker for a short grace period before it
//! is treated as absent.

use crate::float_types::Real;

/// Hands tracked per frame.
pub const HAND_COUNT: usize = 2;
/// Fingers tracked per hand. Index 0 is the thumb, 1 the index finger.
pub const FINGER_COUNT: usize = 5;

/// Thumb slot in a [`HandFrame`].
pub const THUMB: usize = 0;
/// Index-finger slot in a [`HandFrame`].
pub const INDEX: usize = 1;

/// One normalized tracker sample for a single fingertip.
///
/// Coordinates are in `[0, 1]³` tracker space; `detected` is false when the
/// tracker lost this finger for the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingertipSample {
    pub x: Real,
    pub y: Real,
    pub z: Real,
    pub detected: bool,
}

impl FingertipSample {
    pub const fn new(x: Real, y: Real, z: Real) -> Self {
        Self { x, y, z, detected: true }
    }

    /// A sample the tracker never saw.
    pub const fn absent() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, detected: false }
    }
}

/// All fingertip samples for one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandFrame {
    pub fingers: [FingertipSample; FINGER_COUNT],
}

impl HandFrame {
    pub const fn empty() -> Self {
        Self { fingers: [FingertipSample::absent(); FINGER_COUNT] }
    }

    /// True when both the thumb and index finger are visible.
    pub fn has_thumb_index(&self) -> bool {
        self.fingers[THUMB].detected && self.fingers[INDEX].detected
    }

    /// Number of visible fingers.
    pub fn detected_count(&self) -> usize {
        self.fingers.iter().filter(|f| f.detected).count()
    }
}

/// The single command decoded for the current tick. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureCommand {
    #[default]
    None,
    Deform,
    Orbit,
    BooleanUnion,
    BooleanDifference,
    CycleBrush,
    CycleRadius,
    ConfirmPlacement,
    Rewind,
    SegmentSelection,
}

/// One tick's worth of tracker input: both hands, the decoded command, and
/// the orbit delta (consumed by the host camera, not the core).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub hands: [HandFrame; HAND_COUNT],
    pub command: GestureCommand,
    pub orbit_delta: [Real; 2],
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            hands: [HandFrame::empty(); HAND_COUNT],
            command: GestureCommand::None,
            orbit_delta: [0.0, 0.0],
        }
    }
}

/// Applies the dropout policy: reuse the previous snapshot when no frame
/// arrives, and keep lost fingertips at their last visible marker until the
/// grace period runs out.
#[derive(Debug, Clone)]
pub struct FrameCache {
    grace_ticks: u32,
    last: FrameInput,
    /// Last visible sample and its age in ticks, per hand and finger.
    markers: [[Option<(FingertipSample, u32)>; FINGER_COUNT]; HAND_COUNT],
}

impl FrameCache {
    pub fn new(grace_ticks: u32) -> Self {
        Self {
            grace_ticks,
            last: FrameInput::default(),
            markers: [[None; FINGER_COUNT]; HAND_COUNT],
        }
    }

    /// Resolve the tick's effective frame from an optional incoming one.
    pub fn resolve(&mut self, incoming: Option<FrameInput>) -> FrameInput {
        // A read failure reuses the previous snapshot rather than stalling.
        let mut frame = incoming.unwrap_or(self.last);

        for (hand_idx, hand) in frame.hands.iter_mut().enumerate() {
            for (finger_idx, sample) in hand.fingers.iter_mut().enumerate() {
                let marker = &mut self.markers[hand_idx][finger_idx];
                if sample.detected {
                    *marker = Some((*sample, 0));
                } else if let Some((held, age)) = marker {
                    *age += 1;
                    if *age <= self.grace_ticks {
                        *sample = *held;
                    } else {
                        *marker = None;
                    }
                }
            }
        }

        self.last = frame;
        frame
    }

    /// The most recently resolved frame.
    pub const fn last(&self) -> &FrameInput {
        &self.last
    }
}
