use image::ColorType;
use tracing::warn;

use super::DatasetError;

/// Largest row or column count representable in the US geometry fields
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Decoded image, always normalized to interleaved 8-bit RGB
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub pixels: Vec<u8>,
    pub rows: u16,
    pub columns: u16,
    pub samples_per_pixel: u16,
    /// Color model of the source before normalization
    pub source_color: String,
    pub lossy_conversion: bool,
}

impl ImageRecord {
    /// Decode raster bytes (JPEG or PNG) into a row-major, top-to-bottom
    /// RGB buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, DatasetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| DatasetError::Decode(e.to_string()))?;

        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DatasetError::Encode(format!(
                "unsupported image dimensions {}x{}",
                width, height
            )));
        }

        let color = img.color();
        let lossy_conversion = color != ColorType::Rgb8;
        if lossy_conversion {
            warn!("Converting {:?} image to 8-bit RGB", color);
        }

        Ok(Self {
            pixels: img.into_rgb8().into_raw(),
            rows: height as u16,
            columns: width as u16,
            samples_per_pixel: 3,
            source_color: format!("{:?}", color),
            lossy_conversion,
        })
    }

    /// Pixel bytes padded with a trailing zero to an even length
    pub fn into_padded_pixels(self) -> Vec<u8> {
        let mut pixels = self.pixels;
        if pixels.len() % 2 == 1 {
            pixels.push(0);
        }
        pixels
    }
}
