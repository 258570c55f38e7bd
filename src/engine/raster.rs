//! In-process raster operations on decoded page images.
//!
//! These are the `image`-crate equivalents of the ImageMagick invocations in
//! [`super::magick`]. They are synchronous and CPU-bound; the native engine
//! runs them inside `spawn_blocking`.

use crate::error::PdfDiffError;
use crate::geometry::{CropRect, MaskRect};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, Pixel, Rgb, RgbImage, Rgba};
use std::path::{Path, PathBuf};

/// Composite `img` onto an opaque white background and drop the alpha channel.
///
/// Applying it to its own output returns identical pixels: with alpha 255
/// every channel maps onto itself.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = u16::from(a);
        let over = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

/// Paint `rect` with `color`, clipped to the image. Degenerate rectangles
/// paint nothing. The colour type of the input is preserved.
pub fn paint_rect(img: &DynamicImage, rect: &MaskRect, color: Rgba<u8>) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    if !rect.is_degenerate() {
        for y in rect.y0.min(h)..rect.y1.min(h) {
            for x in rect.x0.min(w)..rect.x1.min(w) {
                rgba.get_pixel_mut(x, y).blend(&color);
            }
        }
    }
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(rgba)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

/// Reject a crop that selects no pixels of a `width`×`height` page once
/// clipped to it. Both engines run this before cutting anything.
pub fn check_crop(rect: &CropRect, (width, height): (u32, u32), path: &Path) -> Result<(), PdfDiffError> {
    let visible_w = width.saturating_sub(rect.x).min(rect.width);
    let visible_h = height.saturating_sub(rect.y).min(rect.height);
    if visible_w == 0 || visible_h == 0 {
        return Err(PdfDiffError::InvalidGeometry {
            path: path.to_path_buf(),
            detail: format!(
                "crop {}x{}+{}+{} selects no pixels of a {}x{} page",
                rect.width, rect.height, rect.x, rect.y, width, height
            ),
        });
    }
    Ok(())
}

/// Extract `rect` from `img`, clipped to the image bounds.
pub fn crop(img: &DynamicImage, rect: &CropRect, path: &Path) -> Result<DynamicImage, PdfDiffError> {
    check_crop(rect, (img.width(), img.height()), path)?;
    Ok(img.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Map an ImageMagick-style quality (tens digit = zlib level) onto the
/// compression presets of the PNG encoder.
pub fn compression_for_quality(quality: u8) -> CompressionType {
    match quality / 10 {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Decode a raster file.
pub fn load(path: &Path) -> Result<DynamicImage, PdfDiffError> {
    image::open(path).map_err(|e| PdfDiffError::image(path, e))
}

/// Encode `img` as PNG and replace `path` atomically (temp file + rename).
pub fn write_png(path: &Path, img: &DynamicImage, compression: CompressionType) -> Result<(), PdfDiffError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| PdfDiffError::image(path, e))?;

    let tmp = temp_path(path);
    std::fs::write(&tmp, &buf).map_err(|e| PdfDiffError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        PdfDiffError::io(path, e)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn flatten_blends_transparency_onto_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img));
        assert_eq!(*flat.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*flat.get_pixel(1, 0), Rgb([0, 0, 0]));

        let half = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(half));
        assert_eq!(*flat.get_pixel(0, 0), Rgb([127, 127, 127]));
    }

    #[test]
    fn flatten_is_a_fixed_point() {
        let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 9, y as u8 * 7, 40, (x * y) as u8]));
        let once = flatten_onto_white(&DynamicImage::ImageRgba8(img));
        let twice = flatten_onto_white(&DynamicImage::ImageRgb8(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn paint_rect_is_clipped_and_half_open() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let out = paint_rect(&img, &MaskRect::new(2, 2, 10, 10), Rgba([0, 0, 0, 255]));
        let out = out.as_rgb8().expect("colour type preserved");
        assert_eq!(*out.get_pixel(1, 1), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(3, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_rect_paints_nothing() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let out = paint_rect(&img, &MaskRect::new(3, 3, 1, 1), Rgba([0, 0, 0, 255]));
        assert_eq!(out, img);
    }

    #[test]
    fn crop_outside_the_page_is_rejected() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let ok = crop(&img, &CropRect::new(4, 3, 1, 1), Path::new("p.png")).unwrap();
        assert_eq!((ok.width(), ok.height()), (4, 3));
        let err = crop(&img, &CropRect::new(4, 3, 20, 20), Path::new("p.png")).unwrap_err();
        assert!(matches!(err, PdfDiffError::InvalidGeometry { .. }));
    }

    #[test]
    fn crop_check_clips_before_judging() {
        let p = Path::new("p.png");
        assert!(check_crop(&CropRect::new(50, 50, 8, 8), (10, 10), p).is_ok());
        assert!(check_crop(&CropRect::new(0, 5, 1, 1), (10, 10), p).is_err());
        assert!(check_crop(&CropRect::new(5, 5, 10, 0), (10, 10), p).is_err());
        assert!(check_crop(&CropRect::new(5, 5, 0, 10), (10, 10), p).is_err());
    }

    #[test]
    fn quality_maps_to_compression() {
        assert!(matches!(compression_for_quality(10), CompressionType::Fast));
        assert!(matches!(compression_for_quality(50), CompressionType::Default));
        assert!(matches!(compression_for_quality(70), CompressionType::Best));
    }

    #[test]
    fn write_png_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-0.png");
        std::fs::write(&path, b"old").unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([1, 2, 3])));
        write_png(&path, &img, CompressionType::Default).unwrap();
        assert_eq!(load(&path).unwrap().to_rgb8(), img.to_rgb8());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
