//! Decoded video frame representation

/// An RGBA video frame ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGBA pixel data, 4 bytes per pixel, rows tightly packed
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp in seconds
    pub pts: f64,
    /// Frame index (0-based)
    pub frame_index: u64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, pts: f64, frame_index: u64) -> Self {
        Self {
            data,
            width,
            height,
            pts,
            frame_index,
        }
    }

    /// Single-colour frame
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(Self::expected_size(width, height) / 4);
        Self::new(data, width, height, 0.0, 0)
    }

    /// Expected data size for RGBA frame dimensions (width * height * 4)
    pub fn expected_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * 4
    }

    /// Check if the frame data has the correct size
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == Self::expected_size(self.width, self.height)
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame() {
        let frame = VideoFrame::solid(4, 2, [1, 2, 3, 4]);
        assert!(frame.is_valid());
        assert_eq!(frame.stride(), 16);
        assert_eq!(&frame.data[28..32], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_frames() {
        assert!(!VideoFrame::new(vec![0; 7], 1, 2, 0.0, 0).is_valid());
        assert!(!VideoFrame::new(Vec::new(), 0, 0, 0.0, 0).is_valid());
    }
}
