//! 帧输入边界: 编码字节 → DynamicImage
//! 解码在流水线状态之外完成, 失败只影响当前帧

use image::DynamicImage;

use crate::error::{PipelineError, Result};

/// 解码一帧 (JPEG/PNG/...), 并检查尺寸
pub fn decode_frame(bytes: &[u8]) -> Result<DynamicImage> {
    let frame = image::load_from_memory(bytes)?;
    validate_frame(&frame)?;
    Ok(frame)
}

/// 零尺寸帧视为无效输入
pub fn validate_frame(frame: &DynamicImage) -> Result<()> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(PipelineError::InvalidFrame {
            width: frame.width(),
            height: frame.height(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_decode_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 6));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_frame(b"definitely not an image"),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_zero_sized_frame() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            validate_frame(&empty),
            Err(PipelineError::InvalidFrame { width: 0, height: 0 })
        ));
    }
}
