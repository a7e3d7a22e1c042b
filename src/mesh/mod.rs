//! Indexed triangle `Mesh` owned by the interaction engine.
//!
//! The vertex buffer carries position, normal, and per-vertex velocity; faces
//! index into it and back the adjacency map the brush kernels and the
//! cohesion pass rely on. A mesh may be replaced wholesale (primitive spawn,
//! generated-mesh import); replacement resets the cached initial volume and
//! all velocity state.

use crate::errors::EngineError;
use crate::float_types::{
    parry3d::{
        bounding_volume::Aabb,
        query::{Ray, RayCast},
        shape::Triangle,
    },
    Real, tolerance,
};
use hashbrown::HashMap;
use nalgebra::{Isometry3, Matrix4, Point3, Vector3, partial_max, partial_min};
use rand::Rng;
use std::sync::OnceLock;

use crate::float_types::{PI, TAU};

pub mod vertex;
pub use vertex::Vertex;

/// Binary selection-material state of a [`Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentMaterial {
    #[default]
    Default,
    Selected,
}

/// A named, independently selectable subset of scene geometry.
///
/// Segments are created by mesh separation/import and destroyed by
/// fuse/boolean-merge.
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub mesh: Mesh,
    pub material: SegmentMaterial,
    /// Name of the segment this one was parented to on selection confirm.
    pub parent: Option<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            mesh,
            material: SegmentMaterial::Default,
            parent: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex buffer: position + normal + velocity per entry
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into `vertices`
    pub faces: Vec<[usize; 3]>,

    /// World transform of the mesh object in the host scene
    pub world_transform: Matrix4<Real>,

    /// Signed volume at construction/replacement time
    initial_volume: Real,

    /// Lazily calculated AABB that spans `vertices`.
    bounding_box: OnceLock<Aabb>,

    /// Lazily built vertex adjacency (edge-linked neighbors).
    adjacency: OnceLock<HashMap<usize, Vec<usize>>>,
}

impl Mesh {
    /// Returns a new empty Mesh
    pub fn new() -> Self {
        Mesh {
            vertices: Vec::new(),
            faces: Vec::new(),
            world_transform: Matrix4::identity(),
            initial_volume: 0.0,
            bounding_box: OnceLock::new(),
            adjacency: OnceLock::new(),
        }
    }

    /// Build a mesh from a vertex buffer and triangle list, caching the
    /// signed volume of the fresh geometry.
    pub fn from_vertices(vertices: Vec<Vertex>, faces: Vec<[usize; 3]>) -> Self {
        let mut mesh = Mesh {
            vertices,
            faces,
            world_transform: Matrix4::identity(),
            initial_volume: 0.0,
            bounding_box: OnceLock::new(),
            adjacency: OnceLock::new(),
        };
        mesh.initial_volume = mesh.signed_volume();
        mesh
    }

    /// Build a mesh from bare positions, deriving area-weighted vertex
    /// normals from the faces.
    pub fn from_positions(positions: &[Point3<Real>], faces: Vec<[usize; 3]>) -> Self {
        let vertices = positions
            .iter()
            .map(|&p| Vertex::new(p, Vector3::zeros()))
            .collect();
        let mut mesh = Self::from_vertices(vertices, faces);
        mesh.compute_vertex_normals();
        mesh
    }

    /// Replace this mesh wholesale. Velocity state and the cached initial
    /// volume belong to the old geometry and are reset.
    pub fn replace_with(&mut self, mut other: Mesh) {
        for v in &mut other.vertices {
            v.clear_velocity();
        }
        other.initial_volume = other.signed_volume();
        *self = other;
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// All vertex positions, in buffer order.
    pub fn positions(&self) -> Vec<Point3<Real>> {
        self.vertices.iter().map(|v| v.pos).collect()
    }

    /// Positions transformed into world space.
    pub fn world_positions(&self) -> Vec<Point3<Real>> {
        self.vertices
            .iter()
            .map(|v| self.world_transform.transform_point(&v.pos))
            .collect()
    }

    /// Map a scene-space point into this mesh's local frame.
    pub fn to_local(&self, point: &Point3<Real>) -> Point3<Real> {
        match self.world_transform.try_inverse() {
            Some(inv) => inv.transform_point(point),
            None => *point,
        }
    }

    /// Map a scene-space direction into this mesh's local frame.
    pub fn to_local_vector(&self, vector: &Vector3<Real>) -> Vector3<Real> {
        match self.world_transform.try_inverse() {
            Some(inv) => inv.transform_vector(vector),
            None => *vector,
        }
    }

    /// Signed volume at construction/replacement time.
    pub const fn initial_volume(&self) -> Real {
        self.initial_volume
    }

    /// Edge-linked neighbor indices per vertex, built on first use.
    pub fn adjacency(&self) -> &HashMap<usize, Vec<usize>> {
        self.adjacency.get_or_init(|| {
            let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
            for face in &self.faces {
                for i in 0..3 {
                    let a = face[i];
                    let b = face[(i + 1) % 3];
                    let entry = adjacency.entry(a).or_default();
                    if !entry.contains(&b) {
                        entry.push(b);
                    }
                    let entry = adjacency.entry(b).or_default();
                    if !entry.contains(&a) {
                        entry.push(a);
                    }
                }
            }
            adjacency
        })
    }

    /// Invalidate caches after vertex positions changed.
    pub fn invalidate_caches(&mut self) {
        self.bounding_box = OnceLock::new();
    }

    /// Invalidate topology-dependent caches after faces changed.
    pub fn invalidate_topology(&mut self) {
        self.bounding_box = OnceLock::new();
        self.adjacency = OnceLock::new();
    }

    /// Recompute vertex normals as area-weighted averages of incident face
    /// normals. The triangle cross product already carries the 2·area factor.
    pub fn compute_vertex_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = Vector3::zeros();
        }

        for face in &self.faces {
            let [a, b, c] = *face;
            let p0 = self.vertices[a].pos;
            let p1 = self.vertices[b].pos;
            let p2 = self.vertices[c].pos;
            let weighted = (p1 - p0).cross(&(p2 - p0));
            self.vertices[a].normal += weighted;
            self.vertices[b].normal += weighted;
            self.vertices[c].normal += weighted;
        }

        let eps = tolerance();
        for v in &mut self.vertices {
            let norm = v.normal.norm();
            if norm > eps {
                v.normal /= norm;
            } else {
                // Default normal for degenerate fans
                v.normal = Vector3::z();
            }
        }
    }

    /// Signed volume via the divergence theorem:
    /// `V = Σ (v₀ · (v₁ × v₂)) / 6` over all triangles.
    pub fn signed_volume(&self) -> Real {
        self.faces
            .iter()
            .map(|&[a, b, c]| {
                let p0 = self.vertices[a].pos.coords;
                let p1 = self.vertices[b].pos.coords;
                let p2 = self.vertices[c].pos.coords;
                p0.dot(&p1.cross(&p2))
            })
            .sum::<Real>()
            / 6.0
    }

    /// Mean vertex position in local space.
    pub fn centroid(&self) -> Point3<Real> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.pos.coords);
        Point3::from(sum / self.vertices.len() as Real)
    }

    /// Apply an arbitrary 3D transform (as a 4x4 matrix) to the mesh in place.
    pub fn apply_transform(&mut self, mat: &Matrix4<Real>) -> Result<(), EngineError> {
        let mat_inv_transpose = mat
            .try_inverse()
            .ok_or_else(|| EngineError::KernelFailure("singular transform".into()))?
            .transpose();

        for vert in &mut self.vertices {
            vert.pos = mat.transform_point(&vert.pos);
            let normal = mat_inv_transpose.transform_vector(&vert.normal);
            let norm = normal.norm();
            if norm > Real::EPSILON {
                vert.normal = normal / norm;
            }
        }

        self.invalidate_caches();
        Ok(())
    }

    /// Returns a transformed copy of the mesh.
    pub fn transformed(&self, mat: &Matrix4<Real>) -> Result<Mesh, EngineError> {
        let mut mesh = self.clone();
        mesh.apply_transform(mat)?;
        Ok(mesh)
    }

    /// Translate every vertex in place. Normals are unaffected.
    pub fn translate(&mut self, offset: &Vector3<Real>) {
        for vert in &mut self.vertices {
            vert.pos += *offset;
        }
        self.invalidate_caches();
    }

    /// Returns an [`Aabb`] indicating the 3D bounds of all vertices.
    pub fn bounding_box(&self) -> Aabb {
        *self.bounding_box.get_or_init(|| {
            let mut min_x = Real::MAX;
            let mut min_y = Real::MAX;
            let mut min_z = Real::MAX;
            let mut max_x = -Real::MAX;
            let mut max_y = -Real::MAX;
            let mut max_z = -Real::MAX;

            for v in &self.vertices {
                min_x = *partial_min(&min_x, &v.pos.x).unwrap();
                min_y = *partial_min(&min_y, &v.pos.y).unwrap();
                min_z = *partial_min(&min_z, &v.pos.z).unwrap();

                max_x = *partial_max(&max_x, &v.pos.x).unwrap();
                max_y = *partial_max(&max_y, &v.pos.y).unwrap();
                max_z = *partial_max(&max_z, &v.pos.z).unwrap();
            }

            // If still uninitialized (no vertices), return a trivial AABB at origin
            if min_x > max_x {
                return Aabb::new(Point3::origin(), Point3::origin());
            }

            Aabb::new(
                Point3::new(min_x, min_y, min_z),
                Point3::new(max_x, max_y, max_z),
            )
        })
    }

    /// Casts a ray defined by `origin` + t * `direction` against all triangles
    /// of this mesh and returns a list of (intersection_point, distance),
    /// sorted by ascending distance.
    pub fn ray_intersections(
        &self,
        origin: &Point3<Real>,
        direction: &Vector3<Real>,
    ) -> Vec<(Point3<Real>, Real)> {
        let ray = Ray::new(*origin, *direction);
        let iso = Isometry3::identity(); // Triangles are cast in world space below.

        let mut hits = Vec::new();

        for face in &self.faces {
            let a = self.world_transform.transform_point(&self.vertices[face[0]].pos);
            let b = self.world_transform.transform_point(&self.vertices[face[1]].pos);
            let c = self.world_transform.transform_point(&self.vertices[face[2]].pos);

            let triangle = Triangle::new(a, b, c);

            if let Some(hit) = triangle.cast_ray_and_get_normal(&iso, &ray, Real::MAX, true) {
                let point_on_ray = ray.point_at(hit.time_of_impact);
                hits.push((Point3::from(point_on_ray.coords), hit.time_of_impact));
            }
        }

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.dedup_by(|a, b| (a.1 - b.1).abs() < tolerance());

        hits
    }

    /// Total surface area of the mesh.
    pub fn surface_area(&self) -> Real {
        self.faces
            .iter()
            .map(|&[a, b, c]| {
                let p0 = self.vertices[a].pos;
                let p1 = self.vertices[b].pos;
                let p2 = self.vertices[c].pos;
                (p1 - p0).cross(&(p2 - p0)).norm() * 0.5
            })
            .sum::<Real>()
    }

    /// Draw `count` world-space points from the surface, area-weighted.
    ///
    /// Triangles are selected proportionally to their area and points placed
    /// by uniform barycentric sampling (`u = 1 − √r₁`, `v = r₂·√r₁`), which
    /// avoids the corner clustering of naive barycentric draws. Returns an
    /// empty vector for meshes without faces.
    pub fn surface_samples<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<Point3<Real>> {
        if self.faces.is_empty() || count == 0 {
            return Vec::new();
        }

        // Cumulative area table for proportional face selection.
        let mut cumulative = Vec::with_capacity(self.faces.len());
        let mut total = 0.0;
        for &[a, b, c] in &self.faces {
            let p0 = self.vertices[a].pos;
            let p1 = self.vertices[b].pos;
            let p2 = self.vertices[c].pos;
            total += (p1 - p0).cross(&(p2 - p0)).norm() * 0.5;
            cumulative.push(total);
        }
        if total <= Real::EPSILON {
            return Vec::new();
        }

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let target = rng.random::<Real>() * total;
            let face_idx = cumulative
                .partition_point(|&area| area < target)
                .min(self.faces.len() - 1);
            let [a, b, c] = self.faces[face_idx];

            let r1: Real = rng.random();
            let r2: Real = rng.random();
            let sqrt_r1 = r1.sqrt();
            let u = 1.0 - sqrt_r1;
            let v = r2 * sqrt_r1;
            let w = 1.0 - u - v;

            let p0 = self.vertices[a].pos.coords;
            let p1 = self.vertices[b].pos.coords;
            let p2 = self.vertices[c].pos.coords;
            let local = Point3::from(p0 * u + p1 * v + p2 * w);
            samples.push(self.world_transform.transform_point(&local));
        }
        samples
    }

    /// A UV sphere of the given radius, `segments` meridians and `stacks`
    /// parallels. Poles are shared vertices.
    pub fn sphere(radius: Real, segments: usize, stacks: usize) -> Mesh {
        let segments = segments.max(3);
        let stacks = stacks.max(2);

        let mut positions = Vec::new();
        positions.push(Point3::new(0.0, 0.0, radius)); // north pole

        for stack in 1..stacks {
            let phi = PI * stack as Real / stacks as Real;
            let (sin_phi, cos_phi) = phi.sin_cos();
            for segment in 0..segments {
                let theta = TAU * segment as Real / segments as Real;
                let (sin_theta, cos_theta) = theta.sin_cos();
                positions.push(Point3::new(
                    radius * sin_phi * cos_theta,
                    radius * sin_phi * sin_theta,
                    radius * cos_phi,
                ));
            }
        }
        positions.push(Point3::new(0.0, 0.0, -radius)); // south pole
        let south = positions.len() - 1;

        let ring = |stack: usize, segment: usize| 1 + (stack - 1) * segments + segment % segments;

        let mut faces = Vec::new();
        // top cap
        for segment in 0..segments {
            faces.push([0, ring(1, segment), ring(1, segment + 1)]);
        }
        // body quads as triangle pairs
        for stack in 1..stacks - 1 {
            for segment in 0..segments {
                let a = ring(stack, segment);
                let b = ring(stack, segment + 1);
                let c = ring(stack + 1, segment + 1);
                let d = ring(stack + 1, segment);
                faces.push([a, d, c]);
                faces.push([a, c, b]);
            }
        }
        // bottom cap
        for segment in 0..segments {
            faces.push([south, ring(stacks - 1, segment + 1), ring(stacks - 1, segment)]);
        }

        Mesh::from_positions(&positions, faces)
    }

    /// An axis-aligned box centered at the origin.
    pub fn cuboid(width: Real, length: Real, height: Real) -> Mesh {
        let (hx, hy, hz) = (width * 0.5, length * 0.5, height * 0.5);
        let positions = [
            Point3::new(-hx, -hy, -hz),
            Point3::new(hx, -hy, -hz),
            Point3::new(hx, hy, -hz),
            Point3::new(-hx, hy, -hz),
            Point3::new(-hx, -hy, hz),
            Point3::new(hx, -hy, hz),
            Point3::new(hx, hy, hz),
            Point3::new(-hx, hy, hz),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2], // bottom (−z)
            [4, 5, 6], [4, 6, 7], // top (+z)
            [0, 1, 5], [0, 5, 4], // front (−y)
            [2, 3, 7], [2, 7, 6], // back (+y)
            [1, 2, 6], [1, 6, 5], // right (+x)
            [3, 0, 4], [3, 4, 7], // left (−x)
        ];
        Mesh::from_positions(&positions, faces)
    }

    /// A cube of the given edge length centered at the origin.
    pub fn cube(width: Real) -> Mesh {
        Self::cuboid(width, width, width)
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Mesh {
    /// Structural comparison over geometry; caches don't participate.
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices
            && self.faces == other.faces
            && self.world_transform == other.world_transform
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn cube_volume_and_area() {
        let cube = Mesh::cube(2.0);
        assert!((cube.signed_volume() - 8.0).abs() < 1e-9);
        assert!((cube.surface_area() - 24.0).abs() < 1e-9);
        assert!((cube.initial_volume() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn sphere_volume_approaches_analytic() {
        let sphere = Mesh::sphere(1.0, 48, 24);
        let analytic = 4.0 / 3.0 * PI;
        let volume = sphere.signed_volume();
        assert!(
            (volume - analytic).abs() / analytic < 0.02,
            "tessellated volume {volume} too far from {analytic}"
        );
    }

    #[test]
    fn adjacency_links_are_symmetric() {
        let cube = Mesh::cube(1.0);
        let adjacency = cube.adjacency();
        for (&v, neighbors) in adjacency {
            for n in neighbors {
                assert!(adjacency[n].contains(&v));
            }
        }
    }

    #[test]
    fn replacement_resets_velocity_and_volume() {
        let mut mesh = Mesh::cube(1.0);
        mesh.vertices[0].velocity = Vector3::new(1.0, 0.0, 0.0);

        let mut incoming = Mesh::cube(3.0);
        incoming.vertices[2].velocity = Vector3::new(0.0, 5.0, 0.0);
        mesh.replace_with(incoming);

        assert!((mesh.initial_volume() - 27.0).abs() < 1e-9);
        assert!(mesh.vertices.iter().all(|v| v.velocity == Vector3::zeros()));
    }

    #[test]
    fn surface_samples_stay_on_cube_surface() {
        let cube = Mesh::cube(2.0);
        let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(7);
        let samples = cube.surface_samples(200, &mut rng);
        assert_eq!(samples.len(), 200);
        for p in &samples {
            let on_face = p
                .coords
                .iter()
                .any(|&c| (c.abs() - 1.0).abs() < 1e-9);
            assert!(on_face, "sample {p} is off the cube surface");
            assert!(p.coords.iter().all(|&c| c.abs() <= 1.0 + 1e-9));
        }
    }

    #[test]
    fn ray_hits_cube_twice_through_center() {
        let cube = Mesh::cube(2.0);
        let hits =
            cube.ray_intersections(&Point3::new(-5.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(hits.len(), 2);
        assert!((hits[0].1 - 4.0).abs() < 1e-9);
        assert!((hits[1].1 - 6.0).abs() < 1e-9);
    }

    #[test]
    fn cube_normals_point_outward() {
        let cube = Mesh::cube(2.0);
        for v in &cube.vertices {
            assert!(v.normal.dot(&v.pos.coords) > 0.0);
        }
    }
}
