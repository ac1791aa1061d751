// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! Device protocol adapter
//!
//! Stateless helpers that turn kernel control calls into owned descriptors.
//! Nothing here caches: every call is a fresh round trip through the
//! [`Device`] handle.

use std::fmt;
use std::io;

use visionrt_sys as ffi;

use super::device::Device;
use crate::fourcc::FourCC;
use crate::Error;

/// Snapshot of `VIDIOC_QUERYCAP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Driver name
    pub driver: String,
    /// Card/device name
    pub card: String,
    /// Bus information
    pub bus_info: String,
    /// Kernel driver version (`KERNEL_VERSION` encoding)
    pub version: u32,
    /// Single-planar video capture
    pub supports_capture: bool,
    /// Streaming I/O (buffer queue) support
    pub supports_streaming: bool,
    /// Extended `v4l2_pix_format` fields support
    pub supports_ext_pix_format: bool,
}

impl DeviceCapabilities {
    fn from_raw(caps: &ffi::v4l2_capability) -> Self {
        // device_caps describes the opened node; it is only filled in when the
        // driver advertises V4L2_CAP_DEVICE_CAPS.
        let flags = if caps.capabilities & ffi::V4L2_CAP_DEVICE_CAPS != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        };

        DeviceCapabilities {
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
            bus_info: c_string(&caps.bus_info),
            version: caps.version,
            supports_capture: flags & ffi::V4L2_CAP_VIDEO_CAPTURE != 0,
            supports_streaming: flags & ffi::V4L2_CAP_STREAMING != 0,
            supports_ext_pix_format: flags & ffi::V4L2_CAP_EXT_PIX_FORMAT != 0,
        }
    }
}

/// Frame period as reported by the driver, in seconds per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Fraction {
            numerator,
            denominator,
        }
    }

    /// Frames per second, the reciprocal of the interval.
    pub fn fps(&self) -> f64 {
        f64::from(self.denominator) / f64::from(self.numerator)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One discrete resolution and frame rate of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInterval {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub interval: Fraction,
}

/// An uncompressed pixel format and every discrete mode it supports.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
    pub pixelformat: FourCC,
    pub description: String,
    pub intervals: Vec<FrameInterval>,
}

/// Query the device capabilities.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if `VIDIOC_QUERYCAP` fails.
pub fn query_capabilities<D: Device + ?Sized>(dev: &D) -> Result<DeviceCapabilities, Error> {
    let mut caps = ffi::v4l2_capability::default();
    dev.querycap(&mut caps).map_err(|source| Error::Protocol {
        call: "VIDIOC_QUERYCAP",
        source,
    })?;

    Ok(DeviceCapabilities::from_raw(&caps))
}

/// Enumerate every uncompressed capture format with its discrete
/// resolutions and frame intervals.
///
/// Each level (formats, sizes, intervals) is paged by index until the driver
/// answers `EINVAL`. Any other failure is logged and ends that level early, so
/// a misbehaving driver yields a partial list instead of an error.
pub fn enumerate_formats<D: Device + ?Sized>(dev: &D) -> Vec<FormatDescriptor> {
    let mut formats = Vec::new();

    for index in 0u32.. {
        let mut desc = ffi::v4l2_fmtdesc {
            index,
            type_: ffi::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..Default::default()
        };

        if let Err(err) = dev.enum_fmt(&mut desc) {
            end_of_level("VIDIOC_ENUM_FMT", &err);
            break;
        }

        let pixelformat = FourCC::from_u32(desc.pixelformat);
        if desc.flags & ffi::V4L2_FMT_FLAG_COMPRESSED != 0 {
            log::debug!("skipping compressed format {}", pixelformat);
            continue;
        }

        let intervals = enumerate_frame_sizes(dev, desc.pixelformat);
        if intervals.is_empty() {
            log::debug!("skipping {}: no discrete frame intervals", pixelformat);
            continue;
        }

        formats.push(FormatDescriptor {
            pixelformat,
            description: c_string(&desc.description),
            intervals,
        });
    }

    formats
}

fn enumerate_frame_sizes<D: Device + ?Sized>(dev: &D, pixelformat: u32) -> Vec<FrameInterval> {
    let mut all_intervals = Vec::new();

    for index in 0u32.. {
        let mut size = ffi::v4l2_frmsizeenum {
            index,
            pixel_format: pixelformat,
            ..Default::default()
        };

        if let Err(err) = dev.enum_framesizes(&mut size) {
            end_of_level("VIDIOC_ENUM_FRAMESIZES", &err);
            break;
        }

        if size.type_ != ffi::V4L2_FRMSIZE_TYPE_DISCRETE {
            continue;
        }

        // SAFETY: type_ is DISCRETE, so the discrete member is the active one.
        let discrete = unsafe { size.u.discrete };
        all_intervals.extend(enumerate_frame_intervals(
            dev,
            pixelformat,
            discrete.width,
            discrete.height,
        ));
    }

    all_intervals
}

fn enumerate_frame_intervals<D: Device + ?Sized>(
    dev: &D,
    pixelformat: u32,
    width: u32,
    height: u32,
) -> Vec<FrameInterval> {
    let mut intervals = Vec::new();

    for index in 0u32.. {
        let mut ival = ffi::v4l2_frmivalenum {
            index,
            pixel_format: pixelformat,
            width,
            height,
            ..Default::default()
        };

        if let Err(err) = dev.enum_frameintervals(&mut ival) {
            end_of_level("VIDIOC_ENUM_FRAMEINTERVALS", &err);
            break;
        }

        if ival.type_ != ffi::V4L2_FRMIVAL_TYPE_DISCRETE {
            continue;
        }

        // SAFETY: type_ is DISCRETE, so the discrete member is the active one.
        let fract = unsafe { ival.u.discrete };
        if fract.numerator == 0 || fract.denominator == 0 {
            log::debug!(
                "ignoring degenerate interval {}/{} at {}x{}",
                fract.numerator,
                fract.denominator,
                width,
                height
            );
            continue;
        }

        let interval = Fraction::new(fract.numerator, fract.denominator);
        intervals.push(FrameInterval {
            width,
            height,
            fps: interval.fps(),
            interval,
        });
    }

    intervals
}

/// Apply a pixel format and resolution, progressive scan.
///
/// Drivers may adjust the request to the closest mode they support; such an
/// adjustment is logged but not treated as failure.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the driver rejects `VIDIOC_S_FMT`.
pub fn set_format<D: Device + ?Sized>(
    dev: &D,
    pixelformat: FourCC,
    width: u32,
    height: u32,
) -> Result<(), Error> {
    let mut fmt = ffi::v4l2_format {
        type_: ffi::V4L2_BUF_TYPE_VIDEO_CAPTURE,
        ..Default::default()
    };
    fmt.fmt.pix = ffi::v4l2_pix_format {
        width,
        height,
        pixelformat: pixelformat.as_u32(),
        field: ffi::V4L2_FIELD_NONE,
        ..Default::default()
    };

    dev.s_fmt(&mut fmt).map_err(|source| Error::Protocol {
        call: "VIDIOC_S_FMT",
        source,
    })?;

    // SAFETY: the capture queue always answers with the pix member.
    let applied = unsafe { fmt.fmt.pix };
    if (applied.width, applied.height, applied.pixelformat) != (width, height, pixelformat.as_u32())
    {
        log::warn!(
            "driver adjusted format {} {}x{} to {} {}x{}",
            pixelformat,
            width,
            height,
            FourCC::from_u32(applied.pixelformat),
            applied.width,
            applied.height
        );
    }

    Ok(())
}

/// Request a capture frame interval with `VIDIOC_S_PARM`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the driver rejects the request.
pub fn set_frame_interval<D: Device + ?Sized>(dev: &D, interval: Fraction) -> Result<(), Error> {
    let mut parm = ffi::v4l2_streamparm {
        type_: ffi::V4L2_BUF_TYPE_VIDEO_CAPTURE,
        ..Default::default()
    };
    parm.parm.capture = ffi::v4l2_captureparm {
        timeperframe: ffi::v4l2_fract {
            numerator: interval.numerator,
            denominator: interval.denominator,
        },
        ..Default::default()
    };

    dev.s_parm(&mut parm).map_err(|source| Error::Protocol {
        call: "VIDIOC_S_PARM",
        source,
    })
}

/// `EINVAL` is the normal end of a paged enumeration; anything else truncates
/// the level and is worth an error line.
fn end_of_level(call: &str, err: &io::Error) {
    if err.raw_os_error() != Some(libc::EINVAL) {
        log::error!("{} failed: {}", call, err);
    }
}

/// Kernel strings are fixed-size, NUL-padded byte arrays.
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
