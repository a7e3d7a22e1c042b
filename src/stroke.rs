//! Freehand stroke capture, simplification, and the pending-geometry queue.
//!
//! A stroke is captured as raw thumb–index midpoints, then collapsed at
//! release into a four-point control curve with automatically computed
//! tangent handles. Finalized curves and confirmed primitives wait in
//! the pending queue until a boolean merge submits them to the host kernel;
//! a failed merge leaves the queue untouched so the operation stays
//! retryable.

use crate::create::PrimitiveKind;
use crate::float_types::{Real, TAU};
use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};

/// Control points a finalized stroke is reduced to.
pub const CURVE_CONTROLS: usize = 4;

/// A smooth curve through four control points with Catmull-Rom-style
/// tangent handles.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveStroke {
    pub controls: [Point3<Real>; CURVE_CONTROLS],
    pub tangents: [Vector3<Real>; CURVE_CONTROLS],
}

impl CurveStroke {
    /// Evaluate the curve at `t ∈ [0, 1]` with cubic Hermite interpolation
    /// between the bracketing controls.
    pub fn sample(&self, t: Real) -> Point3<Real> {
        let t = t.clamp(0.0, 1.0);
        let scaled = t * (CURVE_CONTROLS - 1) as Real;
        let segment = (scaled.floor() as usize).min(CURVE_CONTROLS - 2);
        let local = scaled - segment as Real;

        let p0 = self.controls[segment].coords;
        let p1 = self.controls[segment + 1].coords;
        let m0 = self.tangents[segment];
        let m1 = self.tangents[segment + 1];

        let t2 = local * local;
        let t3 = t2 * local;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + local;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        Point3::from(p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11)
    }

    /// Total control-polygon length, a cheap proxy for curve length.
    pub fn polygon_length(&self) -> Real {
        self.controls
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }
}

/// Point on a polyline at a cumulative arc-length fraction, linearly
/// interpolated within the bracketing segment.
fn point_at_fraction(points: &[Point3<Real>], lengths: &[Real], fraction: Real) -> Point3<Real> {
    let total = *lengths.last().unwrap_or(&0.0);
    if total <= Real::EPSILON {
        return points[0];
    }
    let target = fraction.clamp(0.0, 1.0) * total;

    let segment = lengths.partition_point(|&l| l < target).clamp(1, points.len() - 1);
    let prev_len = lengths[segment - 1];
    let seg_len = lengths[segment] - prev_len;
    if seg_len <= Real::EPSILON {
        return points[segment];
    }
    let local = (target - prev_len) / seg_len;
    let a = points[segment - 1];
    let b = points[segment];
    a + (b - a) * local
}

/// Simplify a captured path to exactly four control points.
///
/// N-point polylines are sampled at arc-length fractions 0, 0.25, 0.75, 1;
/// the degenerate 2-point path spreads its controls evenly at 0, ⅓, ⅔, 1 so
/// the curve stays well-conditioned. Fewer than 2 points yields `None`.
pub fn simplify(points: &[Point3<Real>]) -> Option<CurveStroke> {
    if points.len() < 2 {
        return None;
    }

    let fractions: [Real; CURVE_CONTROLS] = if points.len() == 2 {
        [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0]
    } else {
        [0.0, 0.25, 0.75, 1.0]
    };

    // Cumulative arc length per input point.
    let mut lengths = Vec::with_capacity(points.len());
    let mut total = 0.0;
    lengths.push(0.0);
    for w in points.windows(2) {
        total += (w[1] - w[0]).norm();
        lengths.push(total);
    }

    let controls: [Point3<Real>; CURVE_CONTROLS] =
        std::array::from_fn(|i| point_at_fraction(points, &lengths, fractions[i]));

    // Catmull-Rom tangents: half the chord skipping the control itself,
    // one-sided at the ends.
    let tangents: [Vector3<Real>; CURVE_CONTROLS] = [
        (controls[1] - controls[0]) * 0.5,
        (controls[2] - controls[0]) * 0.5,
        (controls[3] - controls[1]) * 0.5,
        (controls[3] - controls[2]) * 0.5,
    ];

    Some(CurveStroke { controls, tangents })
}

/// Captures one freehand stroke, applying the minimum-spacing filter on the
/// way in and the release debounce on the way out.
#[derive(Debug, Clone)]
pub struct StrokeRecorder {
    points: Vec<Point3<Real>>,
    min_spacing: Real,
    debounce_ticks: u32,
    idle_ticks: u32,
    active: bool,
}

impl StrokeRecorder {
    pub fn new(min_spacing: Real, debounce_ticks: u32) -> Self {
        Self {
            points: Vec::new(),
            min_spacing,
            debounce_ticks,
            idle_ticks: 0,
            active: false,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Feed one tick where the draw gesture is live. Starts the stroke on
    /// first contact; rejects points closer than the minimum spacing to the
    /// previously captured one.
    pub fn record(&mut self, midpoint: Point3<Real>) {
        self.active = true;
        self.idle_ticks = 0;
        match self.points.last() {
            Some(last) if (midpoint - last).norm() < self.min_spacing => {},
            _ => self.points.push(midpoint),
        }
    }

    /// Feed one tick where the draw gesture is absent. After the debounce
    /// window elapses the stroke finalizes: `Some(curve)` for a usable path,
    /// `None` both while debouncing and for paths too short to keep.
    pub fn release_tick(&mut self) -> Option<CurveStroke> {
        if !self.active {
            return None;
        }
        self.idle_ticks += 1;
        if self.idle_ticks <= self.debounce_ticks {
            return None;
        }

        let points = std::mem::take(&mut self.points);
        self.active = false;
        self.idle_ticks = 0;
        simplify(&points)
    }

    /// Abandon the in-flight stroke without finalizing.
    pub fn cancel(&mut self) {
        self.points.clear();
        self.active = false;
        self.idle_ticks = 0;
    }
}

/// Geometry waiting for the next boolean merge.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingShape {
    Stroke(CurveStroke),
    Primitive {
        kind: PrimitiveKind,
        center: Point3<Real>,
        scale: Real,
    },
    /// Already-realized geometry (a baked, remeshed primitive).
    Object(Mesh),
}

impl PendingShape {
    /// Realize the shape as mesh geometry for the host kernel. Strokes are
    /// swept into a thin tube the coarse remesh then reconstructs.
    pub fn to_mesh(&self, stroke_radius: Real) -> Mesh {
        match self {
            PendingShape::Stroke(curve) => sweep_tube(curve, stroke_radius, 24, 8),
            PendingShape::Primitive { kind, center, scale } => {
                let mut mesh = kind.mesh(*scale);
                mesh.translate(&center.coords);
                mesh
            },
            PendingShape::Object(mesh) => mesh.clone(),
        }
    }
}

/// Single-producer/single-consumer queue between the builders and the
/// boolean-merge step.
#[derive(Debug, Default)]
pub struct PendingQueue {
    shapes: Vec<PendingShape>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self { shapes: Vec::new() }
    }

    pub fn push(&mut self, shape: PendingShape) {
        self.shapes.push(shape);
    }

    /// Cancel the most recently queued shape.
    pub fn cancel_last(&mut self) -> Option<PendingShape> {
        self.shapes.pop()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shapes(&self) -> &[PendingShape] {
        &self.shapes
    }

    /// Remove everything after a successful merge.
    pub fn clear(&mut self) {
        self.shapes.clear();
    }
}

/// Sweep a circular cross-section along the sampled curve.
///
/// Frames are propagated from an initial perpendicular so the tube does not
/// twist; the ends are left open for the reconstruction pass to close.
fn sweep_tube(curve: &CurveStroke, radius: Real, rings: usize, sides: usize) -> Mesh {
    let rings = rings.max(2);
    let sides = sides.max(3);

    let centers: Vec<Point3<Real>> = (0..rings)
        .map(|i| curve.sample(i as Real / (rings - 1) as Real))
        .collect();

    let mut positions = Vec::with_capacity(rings * sides);
    let mut frame_u = Vector3::zeros();

    for i in 0..rings {
        let tangent = if i + 1 < rings {
            centers[i + 1] - centers[i]
        } else {
            centers[i] - centers[i - 1]
        };
        let tangent = if tangent.norm() > Real::EPSILON {
            tangent.normalize()
        } else {
            Vector3::x()
        };

        if i == 0 {
            // Any perpendicular seeds the frame.
            let pick = if tangent.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            frame_u = tangent.cross(&pick).normalize();
        } else {
            // Re-orthogonalize the previous frame against the new tangent.
            frame_u = (frame_u - tangent * frame_u.dot(&tangent))
                .try_normalize(Real::EPSILON)
                .unwrap_or_else(|| {
                    let pick =
                        if tangent.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
                    tangent.cross(&pick).normalize()
                });
        }
        let frame_v = tangent.cross(&frame_u);

        for s in 0..sides {
            let angle = TAU * s as Real / sides as Real;
            let offset = frame_u * angle.cos() + frame_v * angle.sin();
            positions.push(centers[i] + offset * radius);
        }
    }

    let mut faces = Vec::with_capacity((rings - 1) * sides * 2);
    for i in 0..rings - 1 {
        for s in 0..sides {
            let a = i * sides + s;
            let b = i * sides + (s + 1) % sides;
            let c = (i + 1) * sides + (s + 1) % sides;
            let d = (i + 1) * sides + s;
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }

    Mesh::from_positions(&positions, faces)
}

/// Combine every pending shape into one mesh object for the merge step.
pub fn combine_pending(queue: &PendingQueue, stroke_radius: Real) -> Mesh {
    let mut positions = Vec::new();
    let mut faces = Vec::new();
    for shape in queue.shapes() {
        let mesh = shape.to_mesh(stroke_radius);
        let base = positions.len();
        positions.extend(mesh.vertices.iter().map(|v| v.pos));
        faces.extend(mesh.faces.iter().map(|f| [f[0] + base, f[1] + base, f[2] + base]));
    }
    Mesh::from_positions(&positions, faces)
}
