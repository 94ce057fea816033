use crate::error::EncodeError;
use crate::frame::{EncodedFrame, FrameData, FrameFormat};
use crate::quality::QualityProfile;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::trace;

/// Render a captured frame into the profile's raster and JPEG-encode it.
pub fn encode_frame(frame: &FrameData, profile: &QualityProfile) -> Result<EncodedFrame, EncodeError> {
    if !frame.is_complete() {
        return Err(EncodeError::EmptyBuffer {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        });
    }

    let rgb = to_rgb(frame)?;
    let (width, height) = profile.resolution;
    let scaled = if rgb.width() == width && rgb.height() == height {
        rgb
    } else {
        image::imageops::resize(&rgb, width, height, FilterType::Triangle)
    };

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, profile.encode_quality);
    encoder
        .encode_image(&scaled)
        .map_err(|e| EncodeError::Codec {
            details: e.to_string(),
        })?;

    trace!(
        "Encoded frame {} to {}x{} JPEG q{} ({} bytes)",
        frame.id,
        width,
        height,
        profile.encode_quality,
        buf.len()
    );

    Ok(EncodedFrame {
        source_id: frame.id,
        data: Bytes::from(buf),
        width,
        height,
        quality: profile.encode_quality,
    })
}

fn to_rgb(frame: &FrameData) -> Result<RgbImage, EncodeError> {
    match frame.format {
        FrameFormat::Rgb24 => RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or(EncodeError::EmptyBuffer {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            }),
        FrameFormat::Mjpeg => image::load_from_memory(&frame.data)
            .map(|img| img.to_rgb8())
            .map_err(|e| EncodeError::Codec {
                details: format!("JPEG decode failed: {}", e),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn rgb_frame(width: u32, height: u32) -> FrameData {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        FrameData::new(7, SystemTime::now(), data, width, height, FrameFormat::Rgb24)
    }

    #[test]
    fn test_encode_scales_to_profile_resolution() {
        let frame = rgb_frame(1280, 720);
        let encoded = encode_frame(&frame, &QualityProfile::STANDARD).unwrap();

        assert_eq!(encoded.source_id, 7);
        assert_eq!((encoded.width, encoded.height), (640, 480));
        assert_eq!(encoded.quality, 80);
        // JPEG SOI / EOI markers
        assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&encoded.data[encoded.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&encoded.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
    }

    #[test]
    fn test_constrained_profile_is_smaller() {
        let frame = rgb_frame(640, 480);
        let standard = encode_frame(&frame, &QualityProfile::STANDARD).unwrap();
        let constrained = encode_frame(&frame, &QualityProfile::PERFORMANCE_CONSTRAINED).unwrap();

        assert_eq!((constrained.width, constrained.height), (320, 240));
        assert!(constrained.len() < standard.len());
    }

    #[test]
    fn test_mjpeg_input_is_reencoded() {
        let source = encode_frame(&rgb_frame(640, 480), &QualityProfile::STANDARD).unwrap();
        let mjpeg = FrameData::new(9, SystemTime::now(), source.data.to_vec(), 640, 480, FrameFormat::Mjpeg);

        let encoded = encode_frame(&mjpeg, &QualityProfile::PERFORMANCE_CONSTRAINED).unwrap();
        assert_eq!((encoded.width, encoded.height), (320, 240));
    }

    #[test]
    fn test_zero_size_frame_is_rejected() {
        let frame = FrameData::new(1, SystemTime::now(), Vec::new(), 0, 0, FrameFormat::Rgb24);
        assert!(matches!(
            encode_frame(&frame, &QualityProfile::STANDARD),
            Err(EncodeError::EmptyBuffer { .. })
        ));
    }

    #[test]
    fn test_corrupt_mjpeg_is_codec_error() {
        let frame = FrameData::new(1, SystemTime::now(), vec![0xAB; 64], 640, 480, FrameFormat::Mjpeg);
        assert!(matches!(
            encode_frame(&frame, &QualityProfile::STANDARD),
            Err(EncodeError::Codec { .. })
        ));
    }
}
