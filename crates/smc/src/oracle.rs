//! Field oracles: the solid being meshed, reduced to point queries.

use glam::DVec3;

use crate::mesh::TriangleSource;

/// Step used for centred-difference gradients.
const GRADIENT_STEP: f64 = 1e-5;

/// Tolerance for ray/triangle intersection tests.
const RAY_EPSILON: f64 = 1e-9;

/// Parity rays are tilted a hair off-axis. Lattice-aligned input would
/// otherwise land crossings exactly on triangle edges, where parity counts
/// the shared edge once per triangle.
const AXIS_RAY_DIRS: [DVec3; 3] = [
    DVec3::new(1.0, 5.3e-7, 8.9e-7),
    DVec3::new(8.9e-7, 1.0, 5.3e-7),
    DVec3::new(5.3e-7, 8.9e-7, 1.0),
];

/// Point classification interface over an implicitly defined solid.
///
/// `inside` must be deterministic: the same point yields the same verdict on
/// every call. `value` and `gradient` are optional capabilities; the
/// extractor falls back to midpoint placement and surrogate orientation when
/// they are absent.
pub trait FieldOracle {
    /// Whether the point lies inside the solid.
    fn inside(&self, p: DVec3) -> bool;

    /// `inside` for samples that may lie exactly on the surface, where a
    /// single test can be ill-conditioned. Defaults to the plain test.
    fn inside_robust(&self, p: DVec3) -> bool {
        self.inside(p)
    }

    /// Signed offset from the surface: negative inside, zero on the
    /// surface, positive outside. `None` when the solid has no scalar field.
    fn value(&self, _p: DVec3) -> Option<f64> {
        None
    }

    /// Gradient of the scalar field, pointing from inside to outside.
    fn gradient(&self, _p: DVec3) -> Option<DVec3> {
        None
    }
}

/// Oracle over a scalar field `f` with isovalue `tau`: inside iff `f(p) < tau`.
pub struct ImplicitOracle<F: Fn(DVec3) -> f64> {
    field: F,
    isovalue: f64,
}

impl<F: Fn(DVec3) -> f64> ImplicitOracle<F> {
    pub fn new(field: F, isovalue: f64) -> Self {
        Self { field, isovalue }
    }
}

impl<F: Fn(DVec3) -> f64> FieldOracle for ImplicitOracle<F> {
    fn inside(&self, p: DVec3) -> bool {
        (self.field)(p) < self.isovalue
    }

    fn value(&self, p: DVec3) -> Option<f64> {
        Some((self.field)(p) - self.isovalue)
    }

    fn gradient(&self, p: DVec3) -> Option<DVec3> {
        let h = GRADIENT_STEP;
        let f = &self.field;
        Some(DVec3::new(
            f(p + DVec3::X * h) - f(p - DVec3::X * h),
            f(p + DVec3::Y * h) - f(p - DVec3::Y * h),
            f(p + DVec3::Z * h) - f(p - DVec3::Z * h),
        ) / (2.0 * h))
    }
}

/// Oracle over a triangle soup, classifying points by ray-crossing parity.
///
/// A point is inside when a ray cast in +x crosses the soup an odd number of
/// times. `inside_robust` casts along all three axes and takes the majority,
/// which tolerates samples lying exactly on a face.
pub struct TriangleSoupOracle {
    triangles: Vec<[DVec3; 3]>,
}

impl TriangleSoupOracle {
    /// Collect triangles from a provider, fan-triangulating polygonal faces.
    pub fn from_source<S: TriangleSource>(source: &S) -> Self {
        let mut triangles = Vec::new();
        for i in 0..source.face_count() {
            let verts = source.face_vertices(i);
            for k in 2..verts.len() {
                triangles.push([verts[0], verts[k - 1], verts[k]]);
            }
        }
        Self { triangles }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounding box of the soup, or `None` when it has no triangles.
    pub fn bounding_box(&self) -> Option<(DVec3, DVec3)> {
        let first = *self.triangles.first()?;
        let mut min = first[0];
        let mut max = first[0];
        for tri in &self.triangles {
            for &v in tri {
                min = min.min(v);
                max = max.max(v);
            }
        }
        Some((min, max))
    }

    /// Parity of crossings of a ray from `origin` along `dir`.
    fn parity(&self, origin: DVec3, dir: DVec3) -> bool {
        let mut crossings = 0usize;
        for tri in &self.triangles {
            if ray_triangle_intersection(origin, dir, tri).is_some() {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }
}

impl FieldOracle for TriangleSoupOracle {
    fn inside(&self, p: DVec3) -> bool {
        self.parity(p, AXIS_RAY_DIRS[0])
    }

    fn inside_robust(&self, p: DVec3) -> bool {
        let odd = AXIS_RAY_DIRS
            .iter()
            .filter(|&&dir| self.parity(p, dir))
            .count();
        odd >= 2
    }
}

/// Möller-Trumbore ray/triangle intersection without backface culling.
///
/// Returns the ray parameter of the hit; hits at `t <= RAY_EPSILON` are
/// discarded so a ray starting on a face does not count that face.
pub fn ray_triangle_intersection(origin: DVec3, dir: DVec3, tri: &[DVec3; 3]) -> Option<f64> {
    let v0v1 = tri[1] - tri[0];
    let v0v2 = tri[2] - tri[0];
    let p_vec = dir.cross(v0v2);
    let determinant = v0v1.dot(p_vec);

    // Parallel (or degenerate triangle)
    if determinant.abs() < RAY_EPSILON {
        return None;
    }

    let inv_det = 1.0 / determinant;
    let t_vec = origin - tri[0];
    let u = t_vec.dot(p_vec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q_vec = t_vec.cross(v0v1);
    let v = dir.dot(q_vec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = v0v2.dot(q_vec) * inv_det;
    (t > RAY_EPSILON).then_some(t)
}
