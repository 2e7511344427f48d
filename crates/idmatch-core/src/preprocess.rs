//! Raster preprocessing ahead of OCR: intensity conversion, median
//! denoising, Otsu binarization.

use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::median_filter;

/// Full OCR preparation chain: intensity → 3×3 median → Otsu binarization.
pub fn prepare_for_ocr(raster: &DynamicImage) -> GrayImage {
    let gray = raster.to_luma8();
    let denoised = median_denoise(&gray);
    let threshold = otsu_threshold(&denoised);
    tracing::debug!(
        width = denoised.width(),
        height = denoised.height(),
        threshold,
        "binarizing document raster"
    );
    binarize(&denoised, threshold)
}

/// 3×3 median filter, edges padded by continuity.
///
/// Removes salt-and-pepper speckle (card texture, sensor noise) while keeping
/// glyph edges sharp enough for recognition.
pub fn median_denoise(gray: &GrayImage) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    median_filter(gray, 1, 1)
}

/// Global threshold by Otsu's method. Uniform and empty images return 0.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    if gray.width() == 0 || gray.height() == 0 {
        return 0;
    }
    otsu_level(gray)
}

/// Pixels strictly above `level` become white, the rest black.
pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    threshold(gray, level, ThresholdType::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn bimodal(w: u32, h: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([if x < w / 2 { dark } else { light }]))
    }

    #[test]
    fn test_otsu_splits_bimodal_histogram() {
        let gray = bimodal(20, 10, 40, 210);
        let t = otsu_threshold(&gray);
        assert!((40..210).contains(&t), "threshold {t} should separate the modes");
    }

    #[test]
    fn test_otsu_uneven_classes() {
        // 90% bright background, 10% dark text strokes
        let gray = GrayImage::from_fn(100, 10, |x, _| Luma([if x < 10 { 30 } else { 220 }]));
        let t = otsu_threshold(&gray);
        assert!((30..220).contains(&t));
    }

    #[test]
    fn test_otsu_uniform_image() {
        let gray = GrayImage::from_pixel(8, 8, Luma([128]));
        assert_eq!(otsu_threshold(&gray), 0);
    }

    #[test]
    fn test_otsu_empty_image() {
        let gray = GrayImage::new(0, 0);
        assert_eq!(otsu_threshold(&gray), 0);
    }

    #[test]
    fn test_binarize_outputs_two_levels() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
        let bin = binarize(&gray, 100);
        assert!(bin.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(15, 15)[0], 255);
    }

    #[test]
    fn test_binarize_level_is_exclusive() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([99 + x as u8]));
        let bin = binarize(&gray, 100);
        let levels: Vec<u8> = bin.pixels().map(|p| p[0]).collect();
        assert_eq!(levels, [0, 0, 255]);
    }

    #[test]
    fn test_otsu_matches_denoised_text_strip() {
        // Dark strokes with a salt speck in the light margin.
        let mut gray = GrayImage::from_fn(40, 12, |x, _| Luma([if x % 8 < 3 { 25 } else { 235 }]));
        gray.put_pixel(5, 6, Luma([0]));
        let denoised = median_denoise(&gray);
        let t = otsu_threshold(&denoised);
        assert!((25..235).contains(&t), "threshold {t}");
        assert_eq!(binarize(&denoised, t).get_pixel(5, 6)[0], 255);
    }

    #[test]
    fn test_median_removes_isolated_speck() {
        let mut gray = GrayImage::from_pixel(9, 9, Luma([0]));
        gray.put_pixel(4, 4, Luma([255]));
        let clean = median_denoise(&gray);
        assert!(clean.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_median_keeps_solid_regions() {
        let gray = bimodal(12, 12, 10, 200);
        let clean = median_denoise(&gray);
        assert_eq!(clean.get_pixel(0, 6)[0], 10);
        assert_eq!(clean.get_pixel(11, 6)[0], 200);
    }

    #[test]
    fn test_median_single_pixel_image() {
        let gray = GrayImage::from_pixel(1, 1, Luma([77]));
        assert_eq!(median_denoise(&gray).get_pixel(0, 0)[0], 77);
    }

    #[test]
    fn test_prepare_for_ocr_is_binary_and_same_size() {
        let rgb = RgbImage::from_fn(30, 20, |x, _| {
            if x % 6 < 3 {
                Rgb([20, 30, 25])
            } else {
                Rgb([230, 225, 240])
            }
        });
        let prepared = prepare_for_ocr(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(prepared.dimensions(), (30, 20));
        assert!(prepared.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(prepared.pixels().any(|p| p[0] == 0));
        assert!(prepared.pixels().any(|p| p[0] == 255));
    }
}
