//! Nearest-neighbor acceleration over point sets.
//!
//! [`PointIndex`] is a balanced k-d tree built once over a mesh's vertices or
//! surface samples and queried read-only afterward: the deformation engine
//! asks for everything inside a brush radius, the registration engine asks
//! for single nearest neighbors. It is a per-operation structure; rebuild it
//! whenever the underlying point set changes.

use crate::float_types::Real;
use nalgebra::Point3;

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct KdNode {
    /// Index into the original point slice.
    point: u32,
    /// Split axis: 0 = x, 1 = y, 2 = z.
    axis: u8,
    left: u32,
    right: u32,
}

/// A balanced k-d tree over a set of points.
#[derive(Debug, Clone)]
pub struct PointIndex {
    points: Vec<Point3<Real>>,
    nodes: Vec<KdNode>,
    root: u32,
}

impl PointIndex {
    /// Build the index over a point slice. An empty slice yields an index
    /// whose queries all come back empty.
    pub fn build(points: &[Point3<Real>]) -> Self {
        let mut order: Vec<u32> = (0..points.len() as u32).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = Self::build_recursive(points, &mut order[..], 0, &mut nodes);
        Self { points: points.to_vec(), nodes, root }
    }

    fn build_recursive(
        points: &[Point3<Real>],
        order: &mut [u32],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> u32 {
        if order.is_empty() {
            return NO_CHILD;
        }
        let axis = depth % 3;
        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |&a, &b| {
            points[a as usize][axis]
                .partial_cmp(&points[b as usize][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let point = order[mid];

        let node_idx = nodes.len() as u32;
        nodes.push(KdNode { point, axis: axis as u8, left: NO_CHILD, right: NO_CHILD });

        let (lo, hi) = order.split_at_mut(mid);
        let left = Self::build_recursive(points, lo, depth + 1, nodes);
        let right = Self::build_recursive(points, &mut hi[1..], depth + 1, nodes);
        nodes[node_idx as usize].left = left;
        nodes[node_idx as usize].right = right;
        node_idx
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The closest indexed point to `query`, as `(point index, distance)`.
    pub fn nearest(&self, query: &Point3<Real>) -> Option<(usize, Real)> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best = (usize::MAX, Real::INFINITY);
        self.nearest_recursive(self.root, query, &mut best);
        (best.0 != usize::MAX).then(|| (best.0, best.1.sqrt()))
    }

    fn nearest_recursive(&self, node_idx: u32, query: &Point3<Real>, best: &mut (usize, Real)) {
        if node_idx == NO_CHILD {
            return;
        }
        let node = &self.nodes[node_idx as usize];
        let point = &self.points[node.point as usize];

        let dist_sq = (point - query).norm_squared();
        if dist_sq < best.1 {
            *best = (node.point as usize, dist_sq);
        }

        let axis = node.axis as usize;
        let delta = query[axis] - point[axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        self.nearest_recursive(near, query, best);
        // The far side can only help if the splitting plane is closer than
        // the best match found so far.
        if delta * delta < best.1 {
            self.nearest_recursive(far, query, best);
        }
    }

    /// All indexed points within `radius` of `query`, as
    /// `(point index, distance)` pairs in arbitrary order.
    pub fn within_radius(&self, query: &Point3<Real>, radius: Real) -> Vec<(usize, Real)> {
        let mut hits = Vec::new();
        if radius > 0.0 && !self.nodes.is_empty() {
            self.radius_recursive(self.root, query, radius, radius * radius, &mut hits);
        }
        hits
    }

    fn radius_recursive(
        &self,
        node_idx: u32,
        query: &Point3<Real>,
        radius: Real,
        radius_sq: Real,
        hits: &mut Vec<(usize, Real)>,
    ) {
        if node_idx == NO_CHILD {
            return;
        }
        let node = &self.nodes[node_idx as usize];
        let point = &self.points[node.point as usize];

        let dist_sq = (point - query).norm_squared();
        if dist_sq <= radius_sq {
            hits.push((node.point as usize, dist_sq.sqrt()));
        }

        let axis = node.axis as usize;
        let delta = query[axis] - point[axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        self.radius_recursive(near, query, radius, radius_sq, hits);
        if delta.abs() <= radius {
            self.radius_recursive(far, query, radius, radius_sq, hits);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid_points() -> Vec<Point3<Real>> {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    points.push(Point3::new(x as Real, y as Real, z as Real));
                }
            }
        }
        points
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = grid_points();
        let index = PointIndex::build(&points);
        let queries = [
            Point3::new(0.2, 3.9, 1.1),
            Point3::new(4.6, 4.6, 4.6),
            Point3::new(-1.0, 2.0, 2.4),
        ];
        for query in &queries {
            let (found, dist) = index.nearest(query).unwrap();
            let brute = points
                .iter()
                .map(|p| (p - query).norm())
                .fold(Real::INFINITY, Real::min);
            assert!((dist - brute).abs() < 1e-9);
            assert!(((points[found] - query).norm() - brute).abs() < 1e-9);
        }
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let points = grid_points();
        let index = PointIndex::build(&points);
        let query = Point3::new(2.2, 2.2, 2.2);
        let radius = 1.5;

        let mut found: Vec<usize> =
            index.within_radius(&query, radius).into_iter().map(|(i, _)| i).collect();
        found.sort_unstable();

        let mut brute: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - query).norm() <= radius)
            .map(|(i, _)| i)
            .collect();
        brute.sort_unstable();

        assert_eq!(found, brute);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = PointIndex::build(&[]);
        assert!(index.nearest(&Point3::origin()).is_none());
        assert!(index.within_radius(&Point3::origin(), 10.0).is_empty());
    }
}
