//! Quadric error algebra
//!
//! A quadric is a symmetric 4x4 matrix Q such that for a homogeneous point
//! v = (x, y, z, 1), the quadratic form vᵀQv is the accumulated squared
//! distance from the point to a set of planes. Summing quadrics merges the
//! error surfaces of their planes, which is what makes them suitable for
//! scoring edge collapses: the error of a merged vertex against both
//! endpoints' planes is a single evaluation against the summed quadric.

use nalgebra::Vector3;
use std::ops::{Add, AddAssign};

/// Determinants below this magnitude are treated as singular when solving
/// for the position minimizing a quadric.
const DET_EPSILON: f64 = 1e-12;

/// Symmetric 4x4 error matrix stored as its 10 upper-triangle coefficients.
///
/// Coefficient order is the row-major upper triangle:
///
/// ```text
/// | m0 m1 m2 m3 |
/// |    m4 m5 m6 |
/// |       m7 m8 |
/// |          m9 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quadric {
    m: [f64; 10],
}

impl Quadric {
    /// The zero quadric: no accumulated planes, zero error everywhere.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Quadric of a single plane `ax + by + cz + d = 0` with unit normal,
    /// formed as the outer product `[a,b,c,d]ᵀ·[a,b,c,d]`.
    pub fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            m: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    /// Evaluate the quadratic form at `(x, y, z, 1)`.
    ///
    /// For quadrics accumulated from planes this is the summed squared
    /// plane distance, non-negative up to rounding.
    pub fn evaluate(&self, p: &Vector3<f64>) -> f64 {
        let m = &self.m;
        let (x, y, z) = (p.x, p.y, p.z);
        m[0] * x * x
            + 2.0 * m[1] * x * y
            + 2.0 * m[2] * x * z
            + 2.0 * m[3] * x
            + m[4] * y * y
            + 2.0 * m[5] * y * z
            + 2.0 * m[6] * y
            + m[7] * z * z
            + 2.0 * m[8] * z
            + m[9]
    }

    /// Determinant of the 3x3 matrix assembled from the coefficients at the
    /// given upper-triangle indices.
    fn minor(
        &self,
        a11: usize,
        a12: usize,
        a13: usize,
        a21: usize,
        a22: usize,
        a23: usize,
        a31: usize,
        a32: usize,
        a33: usize,
    ) -> f64 {
        let m = &self.m;
        m[a11] * m[a22] * m[a33] + m[a13] * m[a21] * m[a32] + m[a12] * m[a23] * m[a31]
            - m[a13] * m[a22] * m[a31]
            - m[a11] * m[a23] * m[a32]
            - m[a12] * m[a21] * m[a33]
    }

    /// Solve for the point minimizing the quadratic form, inverting the
    /// upper-left 3x3 submatrix via its cofactors.
    ///
    /// Returns `None` when the determinant is numerically singular, which
    /// happens for quadrics built from a single plane or from parallel
    /// planes; callers fall back to candidate positions in that case.
    pub fn solve(&self) -> Option<Vector3<f64>> {
        let det = self.minor(0, 1, 2, 1, 4, 5, 2, 5, 7);
        if det.abs() <= DET_EPSILON {
            return None;
        }
        let x = -1.0 / det * self.minor(1, 2, 3, 4, 5, 6, 5, 7, 8);
        let y = 1.0 / det * self.minor(0, 2, 3, 1, 5, 6, 2, 7, 8);
        let z = -1.0 / det * self.minor(0, 1, 3, 1, 4, 6, 2, 5, 8);
        Some(Vector3::new(x, y, z))
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        let mut m = self.m;
        for (a, b) in m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
        Quadric { m }
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        for (a, b) in self.m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
    }
}
