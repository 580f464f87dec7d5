//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the ArcFace reference positions with a
//! least-squares fit, then warps the face into a canonical 112×112 crop.

use crate::frame::Frame;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Least-squares estimate of the transform taking `src` points onto `dst`.
    ///
    /// Each point pair contributes two rows to the normal equations:
    /// ```text
    /// [sx, -sy, 1, 0] · [a, b, tx, ty] = dx
    /// [sy,  sx, 0, 1] · [a, b, tx, ty] = dy
    /// ```
    /// Degenerate input (all points coincident) yields the identity.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
            for (row, rhs) in rows {
                for j in 0..4 {
                    for k in 0..4 {
                        ata[j][k] += row[j] * row[k];
                    }
                    atb[j] += row[j] * rhs;
                }
            }
        }

        match solve4(ata, atb) {
            Some([a, b, tx, ty]) => Self { a, b, tx, ty },
            None => Self::IDENTITY,
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping (destination → source), `None` for a singular transform.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        // src = R⁻¹ (dst - t)
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }

    /// Warp `frame` into a `size`×`size` crop through this transform.
    ///
    /// Bilinear sampling; pixels that map outside the source are black.
    pub fn warp(&self, frame: &Frame, size: u32) -> GrayImage {
        let Some(inv) = self.inverse() else {
            return GrayImage::new(size, size);
        };

        let src = &frame.image;
        let (w, h) = (src.width() as i64, src.height() as i64);
        let sample = |x: i64, y: i64| -> f32 {
            if x >= 0 && x < w && y >= 0 && y < h {
                src.get_pixel(x as u32, y as u32)[0] as f32
            } else {
                0.0
            }
        };

        GrayImage::from_fn(size, size, |ox, oy| {
            let (sx, sy) = inv.apply((ox as f32, oy as f32));
            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            Luma([val.round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Gaussian elimination with partial pivoting on a 4×4 system.
fn solve4(mut m: [[f32; 4]; 4], mut rhs: [f32; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (rhs[i] - tail) / m[i][i];
    }
    Some(x)
}

/// Align a face to the canonical ArcFace crop using its five landmarks.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> GrayImage {
    SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS).warp(frame, ALIGNED_SIZE)
}

/// Squash the whole frame into the canonical crop size.
///
/// Used when no face was detected and detection is not enforced.
pub fn resize_whole(frame: &Frame) -> GrayImage {
    imageops::resize(&frame.image, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_estimate() {
        let t = SimilarityTransform::estimate(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_half_scale_estimate() {
        let src = REFERENCE_LANDMARKS.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS);
        assert!((t.a - 0.5).abs() < 0.01, "a = {}, expected ~0.5", t.a);
    }

    #[test]
    fn test_degenerate_points_fall_back_to_identity() {
        let src = [(10.0, 10.0); 5];
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS);
        assert_eq!(t, SimilarityTransform::IDENTITY);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = SimilarityTransform { a: 0.8, b: 0.3, tx: 12.0, ty: -4.0 };
        let inv = t.inverse().unwrap();
        let p = (31.0, 57.0);
        let (x, y) = inv.apply(t.apply(p));
        assert!((x - p.0).abs() < 1e-3 && (y - p.1).abs() < 1e-3, "got ({x}, {y})");
    }

    #[test]
    fn test_align_output_size() {
        let frame = Frame::from_gray(GrayImage::from_pixel(640, 480, Luma([128]))).unwrap();
        let aligned = align_face(&frame, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(resize_whole(&frame).dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // 5×5 bright patch on the left eye
        let (lx, ly) = (src[0].0 as u32, src[0].1 as u32);
        let gray = GrayImage::from_fn(200, 200, |x, y| {
            if x.abs_diff(lx) <= 2 && y.abs_diff(ly) <= 2 { Luma([255]) } else { Luma([0]) }
        });
        let frame = Frame::from_gray(gray).unwrap();

        let aligned = align_face(&frame, &src);

        let rx = REFERENCE_LANDMARKS[0].0.round() as u32;
        let ry = REFERENCE_LANDMARKS[0].1.round() as u32;
        let max_val = (rx - 1..=rx + 1)
            .flat_map(|x| (ry - 1..=ry + 1).map(move |y| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap_or(0);
        assert!(max_val > 100, "expected bright patch near ({rx}, {ry}), max={max_val}");
    }

    #[test]
    fn test_out_of_bounds_is_black() {
        let frame = Frame::from_gray(GrayImage::from_pixel(10, 10, Luma([200]))).unwrap();
        let far = SimilarityTransform { a: 1.0, b: 0.0, tx: 500.0, ty: 500.0 };
        let out = far.warp(&frame, 8);
        assert!(out.pixels().all(|p| p[0] == 0));
    }
}
