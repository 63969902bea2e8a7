//! Image clean-up before recognition.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use super::OcrError;

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 2;

/// Scale down to `max_width`, convert to grayscale, sharpen, and re-encode
/// as PNG. Narrow images keep their size.
pub fn prepare_for_ocr(bytes: &[u8], max_width: u32) -> Result<Vec<u8>, OcrError> {
    let img = image::load_from_memory(bytes)?;
    let img = limit_width(img, max_width);
    let img = img.grayscale().unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD);

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

fn limit_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    if max_width == 0 || img.width() <= max_width {
        return img;
    }
    let height = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
    img.resize_exact(max_width, height, FilterType::Lanczos3)
}

/// Run [`prepare_for_ocr`] off the async runtime.
pub async fn prepare_blocking(bytes: Vec<u8>, max_width: u32) -> Result<Vec<u8>, OcrError> {
    tokio::task::spawn_blocking(move || prepare_for_ocr(&bytes, max_width))
        .await
        .map_err(|e| OcrError::ImageError(format!("image task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_wide_image_is_scaled_and_grayscaled() {
        let prepared = prepare_for_ocr(&png(400, 100), 200).unwrap();
        let img = image::load_from_memory(&prepared).unwrap();
        assert_eq!(img.dimensions(), (200, 50));
        assert!(matches!(img, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_narrow_image_keeps_size() {
        let prepared = prepare_for_ocr(&png(120, 80), 2400).unwrap();
        let img = image::load_from_memory(&prepared).unwrap();
        assert_eq!(img.dimensions(), (120, 80));
    }

    #[test]
    fn test_garbage_bytes_are_an_image_error() {
        let err = prepare_for_ocr(b"not an image", 2400).unwrap_err();
        assert!(matches!(err, OcrError::ImageError(_)));
    }
}
