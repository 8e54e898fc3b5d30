//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face in an RGB frame onto the canonical 112×112 ArcFace
//! crop using the five reference landmarks and a least-squares fit.

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;
const CHANNELS: usize = 3;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`.
    ///
    /// Each point pair contributes two rows to the normal equations:
    ///   sx * a - sy * b + tx = dx
    ///   sy * a + sx * b + ty = dy
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
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

        match solve_4x4(ata, atb) {
            Some([a, b, tx, ty]) => Self { a, b, tx, ty },
            None => Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 },
        }
    }

    /// Map an output pixel back into source coordinates.
    fn invert_point(&self, ox: f32, oy: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = ox - self.tx;
        let dy = oy - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Gaussian elimination with partial pivoting. `None` if singular.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(mut m: [[f32; 4]; 4], mut rhs: [f32; 4]) -> Option<[f32; 4]> {
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
            for j in col..4 {
                m[row][j] -= factor * m[col][j];
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

/// Bilinear warp of an interleaved RGB frame. Pixels mapped outside the
/// source are black.
fn warp_rgb(frame: &[u8], width: usize, height: usize, transform: &Similarity, out_size: usize) -> Vec<u8> {
    let mut output = vec![0u8; out_size * out_size * CHANNELS];

    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
            frame[(y as usize * width + x as usize) * CHANNELS + c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) else {
                return output;
            };

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..CHANNELS {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                output[(oy * out_size + ox) * CHANNELS + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// `frame` is interleaved RGB, `width * height * 3` bytes.
pub fn align_face(frame: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    warp_rgb(frame, width as usize, height as usize, &transform, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_transform() {
        // Landmarks at twice the reference scale.
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 0.01, "a = {}, expected ~0.5", t.a);
        assert!(t.b.abs() < 0.01);
    }

    #[test]
    fn test_align_output_size() {
        let frame = vec![128u8; 640 * 480 * 3];
        let aligned = align_face(&frame, 640, 480, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE * 3);
    }

    #[test]
    fn test_channels_preserved() {
        // Solid red frame stays red after alignment (inside the source bounds).
        let (w, h) = (200usize, 200usize);
        let frame: Vec<u8> = (0..w * h).flat_map(|_| [200u8, 0, 0]).collect();
        let landmarks = REFERENCE_LANDMARKS_112.map(|(x, y)| (x + 40.0, y + 40.0));
        let aligned = align_face(&frame, w as u32, h as u32, &landmarks);

        let center = (56 * ALIGNED_SIZE + 56) * 3;
        assert_eq!(&aligned[center..center + 3], &[200, 0, 0]);
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let (w, h) = (200usize, 200usize);
        let mut frame = vec![0u8; w * h * 3];

        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // Bright 5×5 patch on the left eye.
        let (lx, ly) = (src[0].0 as usize, src[0].1 as usize);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                frame[(y * w + x) * 3..(y * w + x) * 3 + 3].copy_from_slice(&[255, 255, 255]);
            }
        }

        let aligned = align_face(&frame, w as u32, h as u32, &src);

        let rx = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as usize;
        let max_val = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (y, x)))
            .map(|(y, x)| aligned[(y * ALIGNED_SIZE + x) * 3])
            .max()
            .unwrap();
        assert!(max_val > 100, "expected bright patch near ({rx}, {ry}), max={max_val}");
    }
}
