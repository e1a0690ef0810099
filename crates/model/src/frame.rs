//! Captured video frames.
//!
//! Every frame handed downstream is packed 3-channel BGR, row-major with no
//! padding, regardless of what the device produced.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Bytes per pixel of a normalized frame.
pub const BGR_CHANNELS: usize = 3;

/// Which capture source produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    Webcam,
    ScreenRegion,
}

impl FrameOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webcam => "webcam",
            Self::ScreenRegion => "screen_region",
        }
    }
}

impl std::fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when a device buffer cannot be turned into a frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Empty frame dimensions {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Unsupported pixel layout with {channels} bytes per pixel")]
    UnsupportedChannels { channels: usize },

    #[error("Row stride {stride} is shorter than a {width}px row of {channels}-byte pixels")]
    StrideTooSmall {
        stride: usize,
        width: u32,
        channels: usize,
    },

    #[error("Pixel buffer holds {actual} bytes, expected at least {expected}")]
    BufferTooSmall { expected: usize, actual: usize },
}

/// A device buffer as delivered by a capture device, before normalization.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel: 3 for BGR, 4 for BGRx/BGRA.
    pub channels: usize,
    /// Bytes per row, including any padding.
    pub stride: usize,
    pub data: Vec<u8>,
}

/// A timestamped 3-channel BGR image from one capture source.
#[derive(Debug, Clone)]
pub struct Frame {
    origin: FrameOrigin,
    captured_at: DateTime<Local>,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Normalize a raw device buffer into a packed BGR frame.
    ///
    /// Row padding is skipped and a fourth (alpha or padding) byte per pixel
    /// is dropped.
    pub fn from_raw(
        origin: FrameOrigin,
        captured_at: DateTime<Local>,
        raw: RawFrame,
    ) -> Result<Self, ModelError> {
        let RawFrame {
            width,
            height,
            channels,
            stride,
            data,
        } = raw;

        let data = if channels == BGR_CHANNELS && stride == width as usize * BGR_CHANNELS {
            check_dims(width, height)?;
            check_len(&data, stride * height as usize)?;
            let mut data = data;
            data.truncate(stride * height as usize);
            data
        } else {
            pack_bgr(width, height, channels, stride, &data)?
        };

        Ok(Self {
            origin,
            captured_at,
            width,
            height,
            data,
        })
    }

    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed BGR bytes, `width * height * 3` long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGR triple at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BGR_CHANNELS;
        let px = self.data.get(offset..offset + BGR_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

/// Copy a strided 3- or 4-channel buffer into packed BGR.
pub fn pack_bgr(
    width: u32,
    height: u32,
    channels: usize,
    stride: usize,
    data: &[u8],
) -> Result<Vec<u8>, ModelError> {
    check_dims(width, height)?;
    if channels != 3 && channels != 4 {
        return Err(ModelError::UnsupportedChannels { channels });
    }

    let row_bytes = width as usize * channels;
    if stride < row_bytes {
        return Err(ModelError::StrideTooSmall {
            stride,
            width,
            channels,
        });
    }

    // The last row does not need to carry its trailing padding.
    let rows = height as usize;
    check_len(data, stride * (rows - 1) + row_bytes)?;

    let mut packed = Vec::with_capacity(width as usize * rows * BGR_CHANNELS);
    for row in data.chunks(stride).take(rows) {
        for px in row[..row_bytes].chunks_exact(channels) {
            packed.extend_from_slice(&px[..BGR_CHANNELS]);
        }
    }
    Ok(packed)
}

fn check_dims(width: u32, height: u32) -> Result<(), ModelError> {
    if width == 0 || height == 0 {
        return Err(ModelError::EmptyFrame { width, height });
    }
    Ok(())
}

fn check_len(data: &[u8], expected: usize) -> Result<(), ModelError> {
    if data.len() < expected {
        return Err(ModelError::BufferTooSmall {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw(width: u32, height: u32, channels: usize, stride: usize, data: Vec<u8>) -> RawFrame {
        RawFrame {
            width,
            height,
            channels,
            stride,
            data,
        }
    }

    #[test]
    fn bgrx_drops_fourth_byte() {
        let data = vec![
            1, 2, 3, 255, 4, 5, 6, 255, //
            7, 8, 9, 255, 10, 11, 12, 255,
        ];
        let frame =
            Frame::from_raw(FrameOrigin::ScreenRegion, Local::now(), raw(2, 2, 4, 8, data))
                .unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(frame.pixel(1, 1), Some([10, 11, 12]));
        assert_eq!(frame.pixel(2, 0), None);
    }

    #[test]
    fn padded_bgr_rows_are_repacked() {
        // 1px wide BGR rows padded to 4 bytes.
        let data = vec![1, 2, 3, 0, 4, 5, 6, 0];
        let frame =
            Frame::from_raw(FrameOrigin::Webcam, Local::now(), raw(1, 2, 3, 4, data)).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.origin(), FrameOrigin::Webcam);
    }

    #[test]
    fn last_row_may_omit_padding() {
        let data = vec![1, 2, 3, 0, 4, 5, 6];
        let packed = pack_bgr(1, 2, 3, 4, &data).unwrap();
        assert_eq!(packed, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn rejects_short_buffers_and_bad_layouts() {
        assert_eq!(
            pack_bgr(2, 2, 4, 8, &[0; 10]),
            Err(ModelError::BufferTooSmall {
                expected: 16,
                actual: 10
            })
        );
        assert!(matches!(
            pack_bgr(2, 2, 2, 4, &[0; 8]),
            Err(ModelError::UnsupportedChannels { channels: 2 })
        ));
        assert!(matches!(
            pack_bgr(4, 1, 4, 8, &[0; 16]),
            Err(ModelError::StrideTooSmall { .. })
        ));
        assert!(matches!(
            pack_bgr(0, 2, 3, 0, &[]),
            Err(ModelError::EmptyFrame { .. })
        ));
    }

    proptest! {
        #[test]
        fn packed_frames_are_always_three_channel(
            width in 1u32..32,
            height in 1u32..32,
            channels in 3usize..=4,
            padding in 0usize..8,
        ) {
            let stride = width as usize * channels + padding;
            let data = vec![7u8; stride * height as usize];
            let packed = pack_bgr(width, height, channels, stride, &data).unwrap();
            prop_assert_eq!(packed.len(), width as usize * height as usize * BGR_CHANNELS);
        }
    }
}
