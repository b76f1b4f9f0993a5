//! JPEG frame decoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ImageDecoder};

use crate::error::MirrorError;

/// Decode a JPEG payload into an image.
///
/// Corrupt or truncated payloads yield [`MirrorError::DecodeFailure`].
pub fn decode_jpeg(data: &[u8]) -> Result<DynamicImage, MirrorError> {
    if data.is_empty() {
        return Err(MirrorError::DecodeFailure("empty payload".into()));
    }

    let decoder = JpegDecoder::new(Cursor::new(data))
        .map_err(|e| MirrorError::DecodeFailure(e.to_string()))?;
    let (w, h) = decoder.dimensions();
    if w == 0 || h == 0 {
        return Err(MirrorError::DecodeFailure(format!("bad dimensions {w}x{h}")));
    }

    DynamicImage::from_decoder(decoder).map_err(|e| MirrorError::DecodeFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encoder::encode_jpeg;
    use crate::quality::Quality;
    use image::RgbImage;

    #[test]
    fn decodes_encoded_frame() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, Quality::DEFAULT).unwrap();

        let decoded = decode_jpeg(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn corrupt_payload_is_decode_failure() {
        let err = decode_jpeg(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, MirrorError::DecodeFailure(_)));
        assert!(matches!(decode_jpeg(&[]), Err(MirrorError::DecodeFailure(_))));
    }

    #[test]
    fn truncated_payload_is_decode_failure() {
        let img = RgbImage::from_pixel(32, 32, image::Rgb([0, 0, 255]));
        let jpeg = encode_jpeg(&img, Quality::DEFAULT).unwrap();
        let cut = &jpeg[..jpeg.len() / 3];
        assert!(decode_jpeg(cut).is_err());
    }
}
