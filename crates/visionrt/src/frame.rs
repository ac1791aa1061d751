// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! Frame views and the upload collaborator
//!
//! A [`FrameView`] borrows a completed buffer straight out of the mapped ring.
//! It is only valid for the duration of one [`Upload::upload`] call: the
//! session hands the buffer back to the driver as soon as the uploader
//! returns, so anything that must outlive the call has to be copied or
//! uploaded before then.

use unix_ts::Timestamp;

use crate::fourcc::FourCC;
use crate::Result;

/// Borrowed view of one captured frame.
#[derive(Debug, Clone)]
pub struct FrameView<'a> {
    /// Valid payload of the buffer, `bytes_used` long
    pub data: &'a [u8],
    /// Ring slot the frame lives in
    pub index: usize,
    /// Driver frame counter
    pub sequence: u32,
    /// Capture time reported by the driver
    pub timestamp: Timestamp,
    pub width: u32,
    pub height: u32,
    pub pixelformat: FourCC,
}

impl FrameView<'_> {
    /// Array shape of the frame as `(height, width, bytes_per_pixel)`.
    ///
    /// Only packed single-plane formats have such a shape; planar and
    /// compressed formats return `None`.
    ///
    /// # Example
    ///
    /// ```
    /// use unix_ts::Timestamp;
    /// use visionrt::fourcc::FourCC;
    /// use visionrt::frame::FrameView;
    ///
    /// let data = vec![0u8; 4 * 2 * 2];
    /// let view = FrameView {
    ///     data: &data,
    ///     index: 0,
    ///     sequence: 0,
    ///     timestamp: Timestamp::new(0, 0),
    ///     width: 4,
    ///     height: 2,
    ///     pixelformat: FourCC::YUYV,
    /// };
    /// assert_eq!(view.shape(), Some((2, 4, 2)));
    /// ```
    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        let bpp = self.pixelformat.bytes_per_pixel()?;
        Some((self.height as usize, self.width as usize, bpp))
    }

    /// Size in bytes of one tightly packed frame, when the format is packed.
    pub fn frame_size(&self) -> Option<usize> {
        self.shape().map(|(h, w, bpp)| h * w * bpp)
    }
}

/// Consumer of captured frames, typically a GPU upload.
///
/// The view is borrowed from driver memory and must not be retained past the
/// call. Implementations report failure with [`crate::Error::upload`].
pub trait Upload {
    type Output;

    fn upload(&mut self, frame: &FrameView<'_>) -> Result<Self::Output>;
}

impl<F, T> Upload for F
where
    F: FnMut(&FrameView<'_>) -> Result<T>,
{
    type Output = T;

    fn upload(&mut self, frame: &FrameView<'_>) -> Result<T> {
        self(frame)
    }
}

/// Owned copy of a frame in host memory.
#[derive(Debug, Clone)]
pub struct HostFrame {
    pub data: Vec<u8>,
    pub sequence: u32,
    pub timestamp: Timestamp,
    pub width: u32,
    pub height: u32,
    pub pixelformat: FourCC,
}

impl HostFrame {
    /// See [`FrameView::shape`].
    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        let bpp = self.pixelformat.bytes_per_pixel()?;
        Some((self.height as usize, self.width as usize, bpp))
    }
}

/// Uploader that copies every frame into a [`HostFrame`].
///
/// This is the CPU fallback when no device upload is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCopy;

impl Upload for HostCopy {
    type Output = HostFrame;

    fn upload(&mut self, frame: &FrameView<'_>) -> Result<HostFrame> {
        Ok(HostFrame {
            data: frame.data.to_vec(),
            sequence: frame.sequence,
            timestamp: frame.timestamp.clone(),
            width: frame.width,
            height: frame.height,
            pixelformat: frame.pixelformat,
        })
    }
}
