//! Thermal page encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! Thermal reports carry their evidence in colour gradients and small printed
//! temperature scales. PNG keeps both intact where JPEG block artefacts would
//! smear a cold-spot boundary, and `detail: "high"` lets GPT-4-class models
//! read the scale legend instead of a single 512 px overview tile.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode every rendered page, preserving page order.
pub fn encode_pages(pages: &[(usize, DynamicImage)]) -> Result<Vec<ImageData>, (usize, image::ImageError)> {
    pages
        .iter()
        .map(|(idx, img)| encode_page(img).map_err(|e| (idx + 1, e)))
        .collect()
}

/// Encode one rasterised thermal page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([r, g, b, 255])))
    }

    #[test]
    fn encode_single_page_as_png() {
        let data = encode_page(&solid(0, 0, 255)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_pages_keeps_order() {
        let pages = vec![(0, solid(255, 0, 0)), (2, solid(0, 0, 255))];
        let encoded = encode_pages(&pages).expect("encode should succeed");
        assert_eq!(encoded.len(), 2);
        assert_ne!(encoded[0].data, encoded[1].data);
    }
}
