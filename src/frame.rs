use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// A decoded frame as delivered by the capture source
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// A frame is complete when it has non-zero dimensions and, for raw
    /// formats, exactly the bytes its dimensions imply.
    pub fn is_complete(&self) -> bool {
        if self.width == 0 || self.height == 0 || self.data.is_empty() {
            return false;
        }
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }
}

/// A lossy-encoded frame ready to go on the wire
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Id of the captured frame this was encoded from
    pub source_id: u64,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// JPEG quality factor (1-100)
    pub quality: u8,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);

        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Rgb24.is_compressed());
    }

    #[test]
    fn test_frame_completeness() {
        let valid = FrameData::new(1, SystemTime::now(), vec![0u8; 4 * 2 * 3], 4, 2, FrameFormat::Rgb24);
        assert!(valid.is_complete());

        let truncated = FrameData::new(2, SystemTime::now(), vec![0u8; 10], 4, 2, FrameFormat::Rgb24);
        assert!(!truncated.is_complete());

        let zero_sized = FrameData::new(3, SystemTime::now(), Vec::new(), 0, 0, FrameFormat::Rgb24);
        assert!(!zero_sized.is_complete());

        // MJPEG frame (compressed, any non-empty size is accepted)
        let mjpeg = FrameData::new(4, SystemTime::now(), vec![0u8; 500], 640, 480, FrameFormat::Mjpeg);
        assert!(mjpeg.is_complete());
    }
}
