//! Undo snapshots for the deformation engine.

use crate::float_types::Real;
use nalgebra::Point3;
use std::collections::VecDeque;

/// A full copy of a mesh's vertex positions at one tick.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub positions: Vec<Point3<Real>>,
    /// Tick counter at capture time.
    pub tick: u64,
}

/// Bounded ring of [`HistorySnapshot`]s. A snapshot is pushed before any
/// deforming tick; `rewind` consumes the most recent one; the oldest is
/// evicted once the ring is full.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    capacity: usize,
    snapshots: VecDeque<HistorySnapshot>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, positions: Vec<Point3<Real>>, tick: u64) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
            log::trace!("history ring full, evicting oldest snapshot");
        }
        self.snapshots.push_back(HistorySnapshot { positions, tick });
    }

    /// Take the most recent snapshot.
    pub fn pop(&mut self) -> Option<HistorySnapshot> {
        self.snapshots.pop_back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drop all snapshots (mesh replaced wholesale).
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
