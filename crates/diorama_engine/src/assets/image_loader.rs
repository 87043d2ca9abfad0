//! Image decoding into textures

use std::sync::Arc;

use crate::assets::AssetError;
use crate::render::Texture;

/// Decoded RGBA8 image data
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Decode any format the `image` crate recognises
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to decode image: {e}")))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        log::debug!("Decoded image {}x{}", width, height);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Height over width
    pub fn aspect(&self) -> f32 {
        self.height as f32 / self.width.max(1) as f32
    }

    /// Shareable texture
    pub fn into_texture(self) -> Arc<Texture> {
        Arc::new(Texture::new(self.width, self.height, self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let data = ImageData::from_bytes(&png_bytes(4, 2, [255, 0, 0, 255])).unwrap();
        assert_eq!((data.width, data.height), (4, 2));
        assert_eq!(data.data.len(), 4 * 2 * 4);
        assert!((data.aspect() - 0.5).abs() < 1e-6);
        let texture = data.into_texture();
        assert_eq!(texture.data[0..4], [255, 0, 0, 255]);
    }

    #[test]
    fn test_garbage_fails() {
        assert!(matches!(
            ImageData::from_bytes(b"not an image"),
            Err(AssetError::LoadFailed(_))
        ));
    }
}
