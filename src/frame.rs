//! Raw sensor frames and their conversion to JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, RgbImage};

/// JPEG quality used for captured stills and thumbnails.
pub const JPEG_QUALITY: u8 = 100;

/// Pixel format representation (e.g., YUYV, MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

/// A frame as delivered by the sensor.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame bytes, `bytes_used` long.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Layout of `data`.
    pub fourcc: FourCC,
}

impl RawFrame {
    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Only meaningful for YUYV frames. For odd x coordinates the second Y
    /// of the pair is used with the shared U/V values.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        // YUYV format: [Y0 U Y1 V] repeats
        let pair_x = x & !1;
        let offset = ((y * self.width + pair_x) * 2) as usize;

        let y_val = if x % 2 == 0 {
            *self.data.get(offset)?
        } else {
            *self.data.get(offset + 2)?
        };
        let u = *self.data.get(offset + 1)?;
        let v = *self.data.get(offset + 3)?;

        Some(yuv_to_rgb(y_val, u, v))
    }

    /// Convert a YUYV frame to an RGB image.
    ///
    /// Returns `None` if the buffer is shorter than the frame dimensions.
    #[must_use]
    pub fn to_rgb(&self) -> Option<RgbImage> {
        let expected = (self.width as usize) * (self.height as usize) * 2;
        if self.data.len() < expected {
            return None;
        }

        let mut image = RgbImage::new(self.width, self.height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let (r, g, b) = self.pixel_at(x, y)?;
            pixel.0 = [r, g, b];
        }
        Some(image)
    }

    /// Encode the frame as a standalone JPEG.
    ///
    /// MJPEG frames already are one and are passed through unchanged.
    pub fn to_jpeg(&self) -> ImageResult<Vec<u8>> {
        if self.fourcc == FourCC::MJPG {
            return Ok(self.data.clone());
        }

        let rgb = self.to_rgb().ok_or_else(|| {
            image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ))
        })?;
        encode_jpeg(&rgb)
    }
}

/// Encode an RGB image at [`JPEG_QUALITY`].
pub fn encode_jpeg(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(image)?;
    Ok(out)
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    let clamp = |val: f32| -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        #[allow(clippy::cast_sign_loss)]
        {
            val.clamp(0.0, 255.0) as u8
        }
    };

    (clamp(r), clamp(g), clamp(b))
}
