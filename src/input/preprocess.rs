//! 帧预处理: 对比度增强 → 去噪 → 锐化
//! Frame enhancement applied before detection (pure, stateless)

use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::median_filter;

use crate::config::PreprocessConfig;

/// 3x3 锐化核 (系数和为1, 整体亮度不变)
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// 预处理一帧, 输出尺寸与输入一致
pub fn preprocess(frame: &DynamicImage, config: &PreprocessConfig) -> DynamicImage {
    if !config.enabled {
        return frame.clone();
    }

    let mut rgb = frame.to_rgb8();

    // 1. 亮度直方图均衡
    if config.equalize {
        rgb = equalize_luma(&rgb);
    }

    // 2. 中值滤波去噪
    if config.denoise_radius > 0 {
        rgb = median_filter(&rgb, config.denoise_radius, config.denoise_radius);
    }

    let mut out = DynamicImage::ImageRgb8(rgb);

    // 3. 锐化
    if config.sharpen {
        out = out.filter3x3(&SHARPEN_KERNEL);
    }

    out
}

/// 对亮度做直方图均衡, 再按 新亮度/原亮度 缩放RGB (保持色相)
fn equalize_luma(rgb: &RgbImage) -> RgbImage {
    let luma = imageops::grayscale(rgb);
    let equalized = equalize_histogram(&luma);

    let mut out = RgbImage::new(rgb.width(), rgb.height());
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let before = luma.get_pixel(x, y).0[0];
        let after = equalized.get_pixel(x, y).0[0];
        let enhanced = if before == 0 {
            // 纯黑像素: 直接取均衡后的灰度
            Rgb([after, after, after])
        } else {
            let ratio = after as f32 / before as f32;
            Rgb(pixel.0.map(|c| (c as f32 * ratio).round().clamp(0.0, 255.0) as u8))
        };
        out.put_pixel(x, y, enhanced);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32, lo: u8, hi: u8) -> DynamicImage {
        let span = (hi - lo) as u32;
        let img = RgbImage::from_fn(width, height, |x, _| {
            let v = lo + (x * span / width.max(1)) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_disabled_is_identity() {
        let frame = gradient(16, 8, 10, 200);
        let out = preprocess(&frame, &PreprocessConfig::default());
        assert_eq!(out, frame);
    }

    #[test]
    fn test_dimensions_preserved() {
        let frame = gradient(33, 17, 0, 255);
        let config = PreprocessConfig {
            enabled: true,
            ..Default::default()
        };
        let out = preprocess(&frame, &config);
        assert_eq!((out.width(), out.height()), (33, 17));
    }

    #[test]
    fn test_equalize_stretches_contrast() {
        let frame = gradient(64, 4, 100, 116);
        let config = PreprocessConfig {
            enabled: true,
            equalize: true,
            denoise_radius: 0,
            sharpen: false,
        };
        let out = preprocess(&frame, &config).to_luma8();
        let values: Vec<u8> = out.pixels().map(|p: &Luma<u8>| p.0[0]).collect();
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        assert!(max - min > 100, "range {}..{} not stretched", min, max);
    }

    #[test]
    fn test_median_removes_salt_noise() {
        let mut img = RgbImage::from_pixel(9, 9, Rgb([50, 50, 50]));
        img.put_pixel(4, 4, Rgb([255, 255, 255]));
        let config = PreprocessConfig {
            enabled: true,
            equalize: false,
            denoise_radius: 1,
            sharpen: false,
        };
        let out = preprocess(&DynamicImage::ImageRgb8(img), &config).to_rgb8();
        assert_eq!(out.get_pixel(4, 4), &Rgb([50, 50, 50]));
    }
}
