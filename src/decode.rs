use image::RgbImage;

/// An RGB, 8 bits per channel pixel buffer.
#[derive(Clone, Debug)]
pub struct DecodedImage(RgbImage);

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }
}

impl From<RgbImage> for DecodedImage {
    fn from(image: RgbImage) -> Self {
        Self(image)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// Decodes an encoded image held in memory into an RGB buffer.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let image = image::load_from_memory(bytes)?;
    Ok(DecodedImage(image.to_rgb8()))
}
