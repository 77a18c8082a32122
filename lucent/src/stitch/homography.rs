//! Planar homographies and their estimation from point correspondences.

use glam::{DMat3, DVec2, DVec3};
use nalgebra::{DMatrix, SVD};

/// Bounds on how much a registered image may shrink or grow.
const MIN_AREA_RATIO: f64 = 0.25;
const MAX_AREA_RATIO: f64 = 4.0;

/// 3×3 projective transform acting on `(x, y, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: DMat3,
}

impl Homography {
    pub const IDENTITY: Self = Self {
        matrix: DMat3::IDENTITY,
    };

    /// From row-major coefficients `[h00, h01, h02, h10, …, h22]`.
    pub fn from_rows(rows: [f64; 9]) -> Self {
        Self {
            matrix: DMat3::from_cols_array(&rows).transpose(),
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::from_rows([1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0])
    }

    pub fn to_rows(&self) -> [f64; 9] {
        self.matrix.transpose().to_cols_array()
    }

    pub fn matrix(&self) -> &DMat3 {
        &self.matrix
    }

    /// Maps `p`; `None` when it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: DVec2) -> Option<DVec2> {
        let v = self.matrix * DVec3::new(p.x, p.y, 1.0);
        if v.z.abs() < 1e-12 {
            return None;
        }
        let out = DVec2::new(v.x / v.z, v.y / v.z);
        out.is_finite().then_some(out)
    }

    /// `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &Homography) -> Homography {
        Homography {
            matrix: self.matrix * other.matrix,
        }
        .normalized()
    }

    pub fn inverse(&self) -> Option<Homography> {
        let det = self.matrix.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        Some(
            Homography {
                matrix: self.matrix.inverse(),
            }
            .normalized(),
        )
    }

    /// Scales so that `h22 = 1` when possible.
    pub fn normalized(self) -> Homography {
        let scale = self.matrix.z_axis.z;
        if scale.abs() < 1e-12 {
            return self;
        }
        Homography {
            matrix: self.matrix * (1.0 / scale),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.is_finite()
    }

    /// Whether the transform maps a `width × height` frame to a plausible convex
    /// quadrilateral of comparable area.
    pub fn is_plausible(&self, width: u32, height: u32) -> bool {
        if !self.is_finite() {
            return false;
        }
        let corners = frame_corners(width, height);
        let mut mapped = [DVec2::ZERO; 4];
        for (dst, &src) in mapped.iter_mut().zip(&corners) {
            match self.apply(src) {
                Some(p) => *dst = p,
                None => return false,
            }
        }

        // Convex and consistently oriented.
        let mut sign = 0.0f64;
        for i in 0..4 {
            let a = mapped[i];
            let b = mapped[(i + 1) % 4];
            let c = mapped[(i + 2) % 4];
            let cross = (b - a).perp_dot(c - b);
            if cross.abs() < 1e-9 {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }

        let source_area = polygon_area(&corners);
        let mapped_area = polygon_area(&mapped);
        if source_area <= 0.0 {
            return false;
        }
        let ratio = mapped_area / source_area;
        (MIN_AREA_RATIO..=MAX_AREA_RATIO).contains(&ratio)
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pixel-centre corners of a frame in clockwise order (image coordinates).
pub fn frame_corners(width: u32, height: u32) -> [DVec2; 4] {
    let (w, h) = ((width.max(1) - 1) as f64, (height.max(1) - 1) as f64);
    [
        DVec2::new(0.0, 0.0),
        DVec2::new(w, 0.0),
        DVec2::new(w, h),
        DVec2::new(0.0, h),
    ]
}

fn polygon_area(points: &[DVec2]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| points[i].perp_dot(points[(i + 1) % n]))
        .sum();
    twice.abs() * 0.5
}

// ============================================================================
// Estimation
// ============================================================================

/// Estimate the homography mapping `ref_points` onto `target_points` with the
/// normalized Direct Linear Transform. Needs at least 4 correspondences.
pub fn estimate_homography(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Homography> {
    if ref_points.len() < 4 || ref_points.len() != target_points.len() {
        return None;
    }

    let (ref_norm, ref_t) = normalize_points(ref_points);
    let (tar_norm, tar_t) = normalize_points(target_points);

    // Each correspondence contributes two rows of A in A·h = 0:
    // [-x -y -1  0  0  0  x*x'  y*x'  x']
    // [ 0  0  0 -x -y -1  x*y'  y*y'  y']
    let n = ref_norm.len();
    let mut a_data = vec![0.0f64; 2 * n * 9];
    for (i, (r, t)) in ref_norm.iter().zip(&tar_norm).enumerate() {
        let base = i * 2 * 9;
        a_data[base..base + 9].copy_from_slice(&[
            -r.x,
            -r.y,
            -1.0,
            0.0,
            0.0,
            0.0,
            r.x * t.x,
            r.y * t.x,
            t.x,
        ]);
        a_data[base + 9..base + 18].copy_from_slice(&[
            0.0,
            0.0,
            0.0,
            -r.x,
            -r.y,
            -1.0,
            r.x * t.y,
            r.y * t.y,
            t.y,
        ]);
    }
    let a = DMatrix::from_row_slice(2 * n, 9, &a_data);

    let h_norm = solve_homogeneous_svd(a)?;

    // H = T_target⁻¹ · H_norm · T_ref
    let tar_t_inv = tar_t.inverse()?;
    let h = tar_t_inv.compose(&h_norm).compose(&ref_t);

    if h.matrix.z_axis.z.abs() < 1e-10 || !h.is_finite() {
        return None;
    }
    Some(h)
}

/// Translate to the centroid and scale so the mean distance from it is √2.
pub fn normalize_points(points: &[DVec2]) -> (Vec<DVec2>, Homography) {
    if points.is_empty() {
        return (Vec::new(), Homography::IDENTITY);
    }

    let c = centroid(points);
    let avg_dist = points.iter().map(|p| (*p - c).length()).sum::<f64>() / points.len() as f64;
    if avg_dist < 1e-10 {
        return (points.to_vec(), Homography::IDENTITY);
    }

    let scale = std::f64::consts::SQRT_2 / avg_dist;
    let normalized = points.iter().map(|p| (*p - c) * scale).collect();
    let t = Homography::from_rows([
        scale,
        0.0,
        -c.x * scale,
        0.0,
        scale,
        -c.y * scale,
        0.0,
        0.0,
        1.0,
    ]);
    (normalized, t)
}

/// Right singular vector of the smallest singular value of the m×9 design matrix.
fn solve_homogeneous_svd(a: DMatrix<f64>) -> Option<Homography> {
    let nrows = a.nrows();
    let ncols = a.ncols();

    // nalgebra computes a thin SVD; pad with zero rows so V^T is 9×9.
    let a = if nrows < ncols {
        let mut padded = DMatrix::zeros(ncols, ncols);
        padded.view_mut((0, 0), (nrows, ncols)).copy_from(&a);
        padded
    } else {
        a
    };

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;
    let last_row = v_t.row(ncols - 1);

    let mut rows = [0.0f64; 9];
    for (dst, &val) in rows.iter_mut().zip(last_row.iter()) {
        *dst = val;
    }
    Some(Homography::from_rows(rows))
}

pub fn centroid(points: &[DVec2]) -> DVec2 {
    if points.is_empty() {
        return DVec2::ZERO;
    }
    points.iter().copied().sum::<DVec2>() / points.len() as f64
}
