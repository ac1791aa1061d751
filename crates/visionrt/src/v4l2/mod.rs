// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! V4L2 device access and format discovery
//!
//! This module is the only place that speaks the kernel protocol. It offers a
//! thin [`Device`] seam with one method per control call, a real
//! implementation over a `/dev/video*` node ([`V4l2Device`]) and stateless
//! helpers that turn the paged enumeration calls into owned descriptors.
//!
//! # Quick Start
//!
//! ```no_run
//! use visionrt::v4l2::{enumerate_formats, query_capabilities, V4l2Device};
//!
//! let dev = V4l2Device::open("/dev/video0")?;
//! let caps = query_capabilities(&dev)?;
//! println!("{} on {}", caps.card, caps.bus_info);
//!
//! for format in enumerate_formats(&dev) {
//!     for mode in &format.intervals {
//!         println!("{} {}x{} @ {:.2} fps", format.pixelformat, mode.width, mode.height, mode.fps);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Enumeration
//!
//! Formats, frame sizes and frame intervals are paged by index until the
//! driver answers `EINVAL`:
//!
//! | Level | Request | Kept |
//! |-------|---------|------|
//! | Pixel format | `VIDIOC_ENUM_FMT` | uncompressed only |
//! | Frame size | `VIDIOC_ENUM_FRAMESIZES` | discrete only |
//! | Frame interval | `VIDIOC_ENUM_FRAMEINTERVALS` | discrete only |
//!
//! A format whose sizes yield no discrete interval is dropped entirely.
//! Errors other than `EINVAL` are logged and end that level early; the
//! entries collected so far are kept.
//!
//! # Memory Types
//!
//! | Mode | Description | Supported |
//! |------|-------------|-----------|
//! | [`MemoryType::Mmap`] | Kernel allocates, user mmaps | Yes |
//! | [`MemoryType::UserPtr`] | User allocates, passes pointer | No |
//! | [`MemoryType::DmaBuf`] | User passes dmabuf fd | No |
//!
//! Mapped buffers can still be shared zero-copy by exporting them as DMA-BUF
//! file descriptors, see [`crate::ring::BufferRing::export_dmabuf`].

mod device;
mod protocol;

#[cfg(test)]
pub(crate) mod fake;

pub use device::{BufferType, Device, MemoryType, V4l2Device};
pub use protocol::{
    enumerate_formats, query_capabilities, set_format, set_frame_interval, DeviceCapabilities,
    FormatDescriptor, Fraction, FrameInterval,
};
