use nalgebra::{Matrix3, Point2, Vector3};
use std::ops::Mul;

/// Smallest magnitude accepted for the homogeneous scale and the determinant
/// of a normalized homography.
const DEGENERACY_EPS: f64 = 1e-10;

/// Planar projective transform `x' ~ H x`, normalized so that `H[2,2] == 1`.
///
/// Construction through [`Homography::from_matrix`] rejects matrices whose
/// bottom-right element or determinant is (numerically) zero, so every value of
/// this type is invertible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
    }

    /// Normalizes `m` by its bottom-right element.
    ///
    /// Returns `None` for non-finite input, a vanishing `m[(2, 2)]`, or a
    /// near-singular result.
    pub fn from_matrix(m: Matrix3<f64>) -> Option<Self> {
        if m.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let scale = m[(2, 2)];
        if scale.abs() < DEGENERACY_EPS {
            return None;
        }
        let h = m / scale;
        if h.determinant().abs() < DEGENERACY_EPS {
            return None;
        }
        Some(Self(h))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn into_inner(self) -> Matrix3<f64> {
        self.0
    }

    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().and_then(Self::from_matrix)
    }

    /// Maps `p` through the transform; `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < DEGENERACY_EPS {
            return None;
        }
        Some(Point2::new(v[0] / v[2], v[1] / v[2]))
    }

    /// Homogeneous scale `w` of `p` under the transform. Negative values mean the
    /// point lies behind the projection plane.
    pub fn depth(&self, p: Point2<f64>) -> f64 {
        self.0[(2, 0)] * p.x + self.0[(2, 1)] * p.y + self.0[(2, 2)]
    }

    /// Euclidean distance between `H * src` and `dst`.
    pub fn reprojection_error(&self, src: Point2<f64>, dst: Point2<f64>) -> f64 {
        match self.apply(src) {
            Some(p) => (p - dst).norm(),
            None => f64::INFINITY,
        }
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

/// `a * b` applies `b` first, then `a`.
impl Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Homography {
        let m = self.0 * rhs.0;
        let scale = m[(2, 2)];
        if scale.abs() < DEGENERACY_EPS {
            Homography(m)
        } else {
            Homography(m / scale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_matrix_normalizes_scale() {
        let m = Matrix3::new(2.0, 0.0, 4.0, 0.0, 2.0, 6.0, 0.0, 0.0, 2.0);
        let h = Homography::from_matrix(m).unwrap();
        assert_eq!(h.matrix()[(2, 2)], 1.0);
        assert_eq!(*h.matrix(), Homography::translation(2.0, 3.0).into_inner());
    }

    #[test]
    fn from_matrix_rejects_degenerate() {
        assert!(Homography::from_matrix(Matrix3::zeros()).is_none());

        let zero_corner = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        assert!(Homography::from_matrix(zero_corner).is_none());

        let rank_one = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 1.0, 2.0, 3.0);
        assert!(Homography::from_matrix(rank_one).is_none());

        let mut nan = Matrix3::identity();
        nan[(0, 1)] = f64::NAN;
        assert!(Homography::from_matrix(nan).is_none());
    }

    #[test]
    fn translation_moves_points() {
        let h = Homography::translation(20.0, -5.0);
        let p = h.apply(Point2::new(1.0, 1.0)).unwrap();
        assert_eq!(p, Point2::new(21.0, -4.0));
        assert_eq!(h.reprojection_error(Point2::new(0.0, 0.0), Point2::new(20.0, -5.0)), 0.0);
    }

    #[test]
    fn composition_applies_right_first() {
        let scale = Homography::from_matrix(Matrix3::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0)).unwrap();
        let shift = Homography::translation(1.0, 0.0);
        let p = (shift * scale).apply(Point2::new(3.0, 3.0)).unwrap();
        assert_eq!(p, Point2::new(7.0, 6.0));
    }

    #[test]
    fn inverse_round_trips() {
        let h = Homography::from_matrix(Matrix3::new(
            1.1, 0.05, 12.0, -0.02, 0.95, -3.0, 1e-4, 2e-4, 1.0,
        ))
        .unwrap();
        let inv = h.inverse().unwrap();
        let p = Point2::new(40.0, 25.0);
        let back = inv.apply(h.apply(p).unwrap()).unwrap();
        assert!((back - p).norm() < 1e-9);
    }
}
