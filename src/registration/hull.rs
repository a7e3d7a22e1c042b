//! Convex-hull + PCA similarity fit, the first registration stage.
//!
//! Each side (target and source) is reduced to a [`HullFrame`]: the convex
//! hull's centroid, a right-handed principal-axis basis from the
//! eigendecomposition of the centered covariance, and per-axis extents.
//! Two frames then compose into a similarity transform that the ICP stage
//! refines rigidly.

use crate::float_types::{Real, tolerance};
use chull::ConvexHullWrapper;
use nalgebra::{Matrix3, Matrix4, Point3, SymmetricEigen, Vector3};

/// Centroid, principal axes and extents of one point set's convex hull.
#[derive(Debug, Clone, Copy)]
pub struct HullFrame {
    pub centroid: Point3<Real>,
    /// Columns are principal axes ordered by descending eigenvalue,
    /// corrected to a right-handed basis.
    pub axes: Matrix3<Real>,
    /// Projection extents (max − min) along each axis, floored away from zero.
    pub extents: Vector3<Real>,
}

impl HullFrame {
    /// Frame for degenerate point sets: origin-centered (or at the raw
    /// centroid when one exists), identity axes, near-zero extents.
    fn degenerate(points: &[Point3<Real>]) -> Self {
        let centroid = if points.is_empty() {
            Point3::origin()
        } else {
            let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
            Point3::from(sum / points.len() as Real)
        };
        Self {
            centroid,
            axes: Matrix3::identity(),
            extents: Vector3::repeat(tolerance()),
        }
    }
}

/// Compute the hull frame of a world-space point set.
///
/// Fewer than 3 points, or a hull the robust wrapper rejects, yields the
/// degenerate fallback rather than an error.
pub fn hull_frame(points: &[Point3<Real>]) -> HullFrame {
    if points.len() < 3 {
        return HullFrame::degenerate(points);
    }

    let points_for_hull: Vec<Vec<Real>> =
        points.iter().map(|p| vec![p.x, p.y, p.z]).collect();

    let hull_points: Vec<Point3<Real>> = match ConvexHullWrapper::try_new(&points_for_hull, None) {
        Ok(hull) => {
            let (verts, _indices) = hull.vertices_indices();
            verts.iter().map(|v| Point3::new(v[0], v[1], v[2])).collect()
        },
        // Coplanar or otherwise degenerate input: fall back to the raw set so
        // the centroid and covariance still mean something.
        Err(_) => points.to_vec(),
    };

    if hull_points.len() < 3 {
        return HullFrame::degenerate(points);
    }

    let centroid = {
        let sum = hull_points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / hull_points.len() as Real)
    };

    // Covariance of the centered hull points.
    let mut covariance = Matrix3::zeros();
    for p in &hull_points {
        let d = p - centroid;
        covariance += d * d.transpose();
    }
    covariance /= hull_points.len() as Real;

    let eigen = SymmetricEigen::new(covariance);

    // Axes ordered by descending eigenvalue.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut axes = Matrix3::from_columns(&[
        eigen.eigenvectors.column(order[0]).into_owned(),
        eigen.eigenvectors.column(order[1]).into_owned(),
        eigen.eigenvectors.column(order[2]).into_owned(),
    ]);

    // Right-handed basis: flip the least-significant axis if needed.
    if axes.determinant() < 0.0 {
        let flipped = -axes.column(2);
        axes.set_column(2, &flipped);
    }

    // Extents by projecting the centered points onto each axis.
    let eps = tolerance();
    let mut extents = Vector3::zeros();
    for axis_idx in 0..3 {
        let axis = axes.column(axis_idx);
        let mut min_proj = Real::MAX;
        let mut max_proj = -Real::MAX;
        for p in &hull_points {
            let proj = (p - centroid).dot(&axis);
            min_proj = min_proj.min(proj);
            max_proj = max_proj.max(proj);
        }
        extents[axis_idx] = (max_proj - min_proj).max(eps);
    }

    HullFrame { centroid, axes, extents }
}

/// Compose the similarity transform mapping `source`'s frame onto `target`'s:
/// `M₀ = T(c_t) · R₀ · S(s₀) · T(−c_s)`.
///
/// `R₀ = A_t · A_sᵀ`; if that rotation comes out as a reflection the source's
/// third axis is flipped before recomputing. The single uniform scale `s₀` is
/// the geometric mean of the three extent ratios, which keeps any one axis
/// from dominating.
pub fn similarity_transform(target: &HullFrame, source: &HullFrame) -> Matrix4<Real> {
    let mut source_axes = source.axes;
    let mut rotation = target.axes * source_axes.transpose();
    if rotation.determinant() < 0.0 {
        let flipped = -source_axes.column(2);
        source_axes.set_column(2, &flipped);
        rotation = target.axes * source_axes.transpose();
    }

    let scale = ((target.extents.x / source.extents.x)
        * (target.extents.y / source.extents.y)
        * (target.extents.z / source.extents.z))
        .cbrt();

    Matrix4::new_translation(&target.centroid.coords)
        * rotation.to_homogeneous()
        * Matrix4::new_scaling(scale)
        * Matrix4::new_translation(&-source.centroid.coords)
}
