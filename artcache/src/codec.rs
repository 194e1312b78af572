//! Byte-level codec between fetched/stored bytes and [`DecodedImage`].

use crate::error::{DecodeError, EncodeError};
use crate::image::DecodedImage;

/// Codec capability consumed by the pipeline (decode after fetch) and the
/// file store (decode on read, encode on write).
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError>;

    /// Produce the persistent on-disk representation.
    fn encode(&self, image: &DecodedImage) -> Result<Vec<u8>, EncodeError>;
}

/// Default codec backed by the `image` crate.
///
/// Decodes any format the crate's enabled features support; encodes PNG,
/// which is lossless and keeps the alpha channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        let decoded = ::image::load_from_memory(bytes)?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        DecodedImage::from_rgba8(width, height, rgba.into_raw())
    }

    fn encode(&self, image: &DecodedImage) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut out);
        ::image::write_buffer_with_format(
            &mut cursor,
            image.pixels(),
            image.width(),
            image.height(),
            ::image::ExtendedColorType::Rgba8,
            ::image::ImageFormat::Png,
        )?;
        Ok(out)
    }
}
