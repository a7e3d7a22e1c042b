//! Aligning freshly generated geometry onto an existing reference mesh.
//!
//! Two stages: a convex-hull + PCA similarity fit ([`hull`]) fixes gross
//! position, orientation and the single uniform scale; trimmed rigid ICP
//! ([`icp`]) then refines pose against area-weighted surface samples. Source
//! geometry arriving as multiple parts is aligned as one rigid group: a
//! single combined point cloud is solved once and the identical transform
//! applies to every part, preserving their relative layout.

use crate::config::RegistrationConfig;
use crate::errors::EngineError;
use crate::float_types::Real;
use crate::mesh::Mesh;
use nalgebra::{Matrix4, Point3};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

pub mod hull;
pub mod icp;

pub use icp::IcpReport;

/// Result of one registration invocation.
#[derive(Debug, Clone)]
pub struct AlignResult {
    /// Similarity (hull stage) composed with the rigid ICP refinement.
    pub transform: Matrix4<Real>,
    /// ICP diagnostics; empty residuals when ICP was skipped for sparsity.
    pub report: IcpReport,
}

/// Compute the transform mapping the `sources` group onto `target`.
///
/// Degenerate inputs never fail: too few hull points fall back to an
/// identity-ish frame, too few surface samples skip ICP and return the
/// hull-only transform.
pub fn align(target: &Mesh, sources: &[Mesh], config: &RegistrationConfig) -> AlignResult {
    // One combined cloud, so multi-part sources stay rigid relative to
    // each other.
    let source_points: Vec<Point3<Real>> =
        sources.iter().flat_map(|m| m.world_positions()).collect();
    let target_points = target.world_positions();

    let source_frame = hull::hull_frame(&source_points);
    let target_frame = hull::hull_frame(&target_points);
    let hull_transform = hull::similarity_transform(&target_frame, &source_frame);

    let mut rng = Pcg64Mcg::seed_from_u64(config.seed);
    let target_samples = target.surface_samples(config.sample_count, &mut rng);
    let source_samples = sample_group(sources, config.sample_count, &mut rng);

    if target_samples.len() < 3 || source_samples.len() < 3 {
        log::debug!(
            "registration: {} target / {} source samples, skipping icp",
            target_samples.len(),
            source_samples.len()
        );
        return AlignResult { transform: hull_transform, report: IcpReport::identity() };
    }

    // ICP starts from the hull alignment.
    let initialized: Vec<Point3<Real>> = source_samples
        .iter()
        .map(|p| hull_transform.transform_point(p))
        .collect();
    let report = icp::refine(
        &initialized,
        &target_samples,
        config.iterations,
        config.trim_ratio,
    );

    AlignResult { transform: report.transform * hull_transform, report }
}

/// Compute the group alignment and apply it to every source part in place.
pub fn align_and_apply(
    target: &Mesh,
    sources: &mut [Mesh],
    config: &RegistrationConfig,
) -> Result<AlignResult, EngineError> {
    let result = align(target, sources, config);
    for mesh in sources.iter_mut() {
        mesh.apply_transform(&result.transform)?;
    }
    Ok(result)
}

/// Sample a multi-part group, splitting the budget by surface area so large
/// parts contribute proportionally.
fn sample_group(sources: &[Mesh], count: usize, rng: &mut Pcg64Mcg) -> Vec<Point3<Real>> {
    let areas: Vec<Real> = sources.iter().map(|m| m.surface_area()).collect();
    let total: Real = areas.iter().sum();
    if total <= Real::EPSILON {
        return Vec::new();
    }

    let mut samples = Vec::with_capacity(count);
    for (mesh, area) in sources.iter().zip(&areas) {
        let share = ((count as Real) * (area / total)).round() as usize;
        samples.extend(mesh.surface_samples(share, rng));
    }
    samples
}
