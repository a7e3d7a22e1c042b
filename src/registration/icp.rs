//! Trimmed rigid ICP, the second registration stage.
//!
//! Each iteration pairs every transformed source sample with its nearest
//! target sample, discards the worst-matching fraction as outliers, and
//! solves the remaining correspondences with the closed-form
//! Kabsch–Umeyama procedure. Only rotation and translation are solved;
//! scale was fixed once by the hull stage and stays fixed here.

use crate::float_types::Real;
use crate::spatial::PointIndex;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Outcome of one ICP refinement: the rigid transform plus convergence
/// diagnostics.
#[derive(Debug, Clone)]
pub struct IcpReport {
    /// Rigid refinement to compose onto the initial alignment.
    pub transform: Matrix4<Real>,
    /// Trimmed mean residual distance at the start of each iteration.
    pub residuals: Vec<Real>,
    /// Correspondences kept per iteration after trimming.
    pub correspondences_used: usize,
}

impl IcpReport {
    /// A refinement that does nothing (used when sampling is too sparse).
    pub fn identity() -> Self {
        Self {
            transform: Matrix4::identity(),
            residuals: Vec::new(),
            correspondences_used: 0,
        }
    }
}

/// Optimal rigid rotation + translation mapping `source` onto `target`
/// (Kabsch–Umeyama): SVD of the cross-covariance, `R = V·Uᵀ` with a
/// reflection correction when `det(R) < 0`, translation from the centroid
/// difference.
///
/// Returns `None` when the SVD fails to produce both factor matrices.
pub fn kabsch_umeyama(
    source: &[Point3<Real>],
    target: &[Point3<Real>],
) -> Option<(Matrix3<Real>, Vector3<Real>)> {
    debug_assert_eq!(source.len(), target.len());
    if source.len() < 3 {
        return None;
    }

    let n = source.len() as Real;
    let source_centroid =
        source.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let target_centroid =
        target.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;

    // Cross-covariance of the centered correspondences.
    let mut cross = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        cross += (s.coords - source_centroid) * (t.coords - target_centroid).transpose();
    }

    let svd = cross.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut rotation = v_t.transpose() * u.transpose();
    if rotation.determinant() < 0.0 {
        // Reflection: flip the singular direction with the smallest value.
        let mut v = v_t.transpose();
        let flipped = -v.column(2);
        v.set_column(2, &flipped);
        rotation = v * u.transpose();
    }

    let translation = target_centroid - rotation * source_centroid;
    Some((rotation, translation))
}

/// Refine the alignment of `source` samples onto `target` samples.
///
/// `source` is expected to already carry the hull-stage transform. Runs a
/// fixed number of iterations; `trim_ratio` of the worst correspondences is
/// discarded before each solve.
pub fn refine(
    source: &[Point3<Real>],
    target: &[Point3<Real>],
    iterations: usize,
    trim_ratio: Real,
) -> IcpReport {
    if source.len() < 3 || target.len() < 3 {
        return IcpReport::identity();
    }

    let index = PointIndex::build(target);
    let keep = (((1.0 - trim_ratio.clamp(0.0, 0.99)) * source.len() as Real).ceil()
        as usize)
        .clamp(3, source.len());

    let mut moved: Vec<Point3<Real>> = source.to_vec();
    let mut running = Matrix4::<Real>::identity();
    let mut residuals = Vec::with_capacity(iterations);

    for iteration in 0..iterations {
        // Nearest-target correspondence for every moved source point.
        let mut pairs: Vec<(usize, usize, Real)> = moved
            .iter()
            .enumerate()
            .filter_map(|(i, p)| index.nearest(p).map(|(j, d)| (i, j, d)))
            .collect();

        // Trim the worst residuals as outliers.
        pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        pairs.truncate(keep);

        let mean_residual =
            pairs.iter().map(|&(_, _, d)| d).sum::<Real>() / pairs.len() as Real;
        residuals.push(mean_residual);

        let kept_source: Vec<Point3<Real>> = pairs.iter().map(|&(i, _, _)| moved[i]).collect();
        let kept_target: Vec<Point3<Real>> = pairs.iter().map(|&(_, j, _)| target[j]).collect();

        let Some((rotation, translation)) = kabsch_umeyama(&kept_source, &kept_target) else {
            break;
        };

        let increment =
            rotation.to_homogeneous().append_translation(&translation);
        for p in &mut moved {
            *p = rotation * *p + translation;
        }
        running = increment * running;

        log::debug!(
            "icp iteration {iteration}: kept {} pairs, mean residual {mean_residual:.6}",
            pairs.len()
        );
    }

    IcpReport {
        transform: running,
        residuals,
        correspondences_used: keep,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::float_types::PI;
    use nalgebra::Rotation3;

    fn scatter() -> Vec<Point3<Real>> {
        // An asymmetric cloud so the optimal alignment is unique.
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(1.0, 1.0, 0.5),
            Point3::new(-0.5, 0.7, 1.3),
            Point3::new(2.0, -0.4, 0.2),
        ]
    }

    #[test]
    fn kabsch_recovers_known_rigid_motion() {
        let source = scatter();
        let rotation = Rotation3::from_euler_angles(0.4, -0.2, 1.1);
        let translation = Vector3::new(3.0, -1.0, 0.5);
        let target: Vec<Point3<Real>> =
            source.iter().map(|p| rotation * p + translation).collect();

        let (r, t) = kabsch_umeyama(&source, &target).unwrap();

        for (s, expected) in source.iter().zip(&target) {
            let mapped = r * s + t;
            approx::assert_relative_eq!(mapped, *expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn kabsch_rejects_underdetermined_input() {
        let two = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(kabsch_umeyama(&two, &two).is_none());
    }

    #[test]
    fn refine_converges_on_small_offset() {
        let target = scatter();
        let nudge = Rotation3::from_euler_angles(0.0, 0.0, PI / 36.0);
        let source: Vec<Point3<Real>> = target
            .iter()
            .map(|p| nudge * p + Vector3::new(0.05, -0.02, 0.01))
            .collect();

        let report = refine(&source, &target, 16, 0.0);

        for (s, expected) in source.iter().zip(&target) {
            let mapped = report.transform.transform_point(s);
            approx::assert_relative_eq!(mapped, *expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn residuals_do_not_increase() {
        let target = scatter();
        let nudge = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let source: Vec<Point3<Real>> =
            target.iter().map(|p| nudge * p + Vector3::new(0.3, 0.1, -0.2)).collect();

        let report = refine(&source, &target, 12, 0.15);

        for window in report.residuals.windows(2) {
            assert!(
                window[1] <= window[0] + 1e-9,
                "residual rose from {} to {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn sparse_input_returns_identity() {
        let two = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let report = refine(&two, &two, 8, 0.15);
        assert_eq!(report.transform, Matrix4::identity());
        assert!(report.residuals.is_empty());
    }
}
