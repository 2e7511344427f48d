//! Face crops for the recognizer: landmark alignment, box crops, and the
//! whole-image fallback.
//!
//! Alignment fits a 4-DOF similarity transform (scale, rotation, translation)
//! from the five detected landmarks to the ArcFace reference positions and
//! warps the face into a 112×112 RGB crop.

use super::detector::Detection;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

pub const ALIGNED_SIZE: u32 = 112;

/// ArcFace reference landmarks for a 112×112 crop.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
///
/// Solved in f64: the normal equations are poorly conditioned at pixel scale.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Similarity {
    /// Least-squares fit over the point pairs via the normal equations.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let mut ata = [[0.0f64; 4]; 4];
        let mut atb = [0.0f64; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy, dx, dy) = (sx as f64, sy as f64, dx as f64, dy as f64);
            // Unknowns [a, b, tx, ty]; two equations per point.
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

        let [a, b, tx, ty] = solve4(ata, atb)?;
        Some(Self { a, b, tx, ty })
    }

    /// Map a destination pixel back into the source image.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let (dx, dy) = (x as f64 - self.tx, y as f64 - self.ty);
        Some((
            ((self.a * dx + self.b * dy) / det) as f32,
            ((-self.b * dx + self.a * dy) / det) as f32,
        ))
    }
}

/// Gaussian elimination with partial pivoting. `None` for a singular system.
#[allow(clippy::needless_range_loop)]
fn solve4(mut m: [[f64; 4]; 4], mut rhs: [f64; 4]) -> Option<[f64; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-9 {
            return None;
        }
        for row in col + 1..4 {
            let factor = m[row][col] / pivot;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f64; 4];
    for i in (0..4).rev() {
        let tail: f64 = (i + 1..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (rhs[i] - tail) / m[i][i];
    }
    Some(x)
}

/// Bilinear sample; out-of-bounds neighbours read as black.
fn sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: i64, py: i64, c: usize| -> f32 {
        if px >= 0 && px < w && py >= 0 && py < h {
            image.get_pixel(px as u32, py as u32)[c] as f32
        } else {
            0.0
        }
    };

    Rgb(std::array::from_fn(|c| {
        let v = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
            + at(x0 + 1, y0, c) * fx * (1.0 - fy)
            + at(x0, y0 + 1, c) * (1.0 - fx) * fy
            + at(x0 + 1, y0 + 1, c) * fx * fy;
        v.round().clamp(0.0, 255.0) as u8
    }))
}

/// Warp the face described by `landmarks` into a canonical 112×112 crop.
///
/// Falls back to a plain resize when the landmarks are degenerate.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let Some(transform) = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS) else {
        tracing::debug!("degenerate landmarks; resizing whole image instead of aligning");
        return whole_image(image);
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        match transform.invert_point(ox as f32, oy as f32) {
            Some((sx, sy)) => sample(image, sx, sy),
            None => Rgb([0, 0, 0]),
        }
    })
}

/// Crop the detection box (clamped to the image) and resize it to 112×112.
pub fn crop_face(image: &RgbImage, detection: &Detection) -> RgbImage {
    let (w, h) = image.dimensions();
    let x0 = detection.x.max(0.0).min(w.saturating_sub(1) as f32) as u32;
    let y0 = detection.y.max(0.0).min(h.saturating_sub(1) as f32) as u32;
    let x1 = ((detection.x + detection.width).ceil().max(0.0) as u32).clamp(x0 + 1, w.max(x0 + 1));
    let y1 = ((detection.y + detection.height).ceil().max(0.0) as u32).clamp(y0 + 1, h.max(y0 + 1));

    let crop = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    imageops::resize(&crop, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}

/// Resize the whole image to 112×112. Used when no face region is known.
pub fn whole_image(image: &RgbImage) -> RgbImage {
    imageops::resize(image, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS).unwrap();
        assert!((t.a - 1.0).abs() < 1e-3, "a = {}", t.a);
        assert!(t.b.abs() < 1e-3, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-2, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-2, "ty = {}", t.ty);
    }

    #[test]
    fn test_double_scale_transform() {
        let src = REFERENCE_LANDMARKS.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS).unwrap();
        assert!((t.a - 0.5).abs() < 1e-2, "a = {}", t.a);
    }

    #[test]
    fn test_degenerate_landmarks() {
        let src = [(10.0, 10.0); 5];
        assert!(Similarity::estimate(&src, &REFERENCE_LANDMARKS).is_none());
    }

    #[test]
    fn test_align_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([90, 120, 150]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        // Identity mapping on a uniform image keeps the colour.
        assert_eq!(*aligned.get_pixel(56, 56), Rgb([90, 120, 150]));
    }

    #[test]
    fn test_align_moves_landmark_to_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // Bright 5×5 patch on the left eye.
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src);
        let (rx, ry) = (
            REFERENCE_LANDMARKS[0].0.round() as u32,
            REFERENCE_LANDMARKS[0].1.round() as u32,
        );
        let brightest = (rx - 1..=rx + 1)
            .flat_map(|x| (ry - 1..=ry + 1).map(move |y| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap();
        assert!(brightest > 100, "expected bright patch near ({rx}, {ry}), max {brightest}");
    }

    #[test]
    fn test_crop_face_clamps_to_image() {
        let image = RgbImage::from_pixel(50, 40, Rgb([1, 2, 3]));
        let d = Detection {
            x: -10.0,
            y: 30.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
            landmarks: None,
        };
        let crop = crop_face(&image, &d);
        assert_eq!(crop.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(*crop.get_pixel(0, 0), Rgb([1, 2, 3]));
    }

    #[test]
    fn test_whole_image_size() {
        let image = RgbImage::new(300, 90);
        assert_eq!(whole_image(&image).dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }
}
