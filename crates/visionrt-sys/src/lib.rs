// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! Raw V4L2 kernel ABI.
//!
//! Layouts mirror `linux/videodev2.h` for the single-planar capture subset used
//! by visionrt. Every ioctl wrapper is `unsafe` and takes the raw device fd;
//! the safe API lives in the `visionrt` crate.
//!
//! <https://www.kernel.org/doc/html/latest/userspace-api/media/v4l/user-func.html>

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

// Re-export libc so dependents use the same timeval/off_t definitions
pub use libc;

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_EXT_PIX_FORMAT: u32 = 0x0020_0000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;
pub const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;

pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_MEMORY_USERPTR: u32 = 2;
pub const V4L2_MEMORY_DMABUF: u32 = 4;

pub const V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_FMT_FLAG_COMPRESSED: u32 = 0x0001;

pub const V4L2_FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMSIZE_TYPE_STEPWISE: u32 = 3;

pub const V4L2_FRMIVAL_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMIVAL_TYPE_STEPWISE: u32 = 3;

pub const V4L2_BUF_FLAG_MAPPED: u32 = 0x0000_0001;
pub const V4L2_BUF_FLAG_DONE: u32 = 0x0000_0004;

/// Implements `Default` as the all-zero bit pattern, which is how the kernel
/// expects every request structure to start.
macro_rules! zeroed_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    // SAFETY: plain C structure; all-zero is a valid value for
                    // every integer, array, raw pointer and union field in it.
                    unsafe { std::mem::zeroed() }
                }
            }
        )*
    };
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct v4l2_fmtdesc {
    pub index: u32,
    pub type_: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct v4l2_fract {
    pub numerator: u32,
    pub denominator: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_frmsize_discrete {
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_frmsize_stepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_frmsize_union {
    pub discrete: v4l2_frmsize_discrete,
    pub stepwise: v4l2_frmsize_stepwise,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_frmsizeenum {
    pub index: u32,
    pub pixel_format: u32,
    pub type_: u32,
    pub u: v4l2_frmsize_union,
    pub reserved: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_frmival_stepwise {
    pub min: v4l2_fract,
    pub max: v4l2_fract,
    pub step: v4l2_fract,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_frmival_union {
    pub discrete: v4l2_fract,
    pub stepwise: v4l2_frmival_stepwise,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_frmivalenum {
    pub index: u32,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub type_: u32,
    pub u: v4l2_frmival_union,
    pub reserved: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// `v4l2_format.fmt`. The kernel union contains `v4l2_window`, which carries
/// pointers, so the union is pointer-aligned.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_union {
    pub pix: v4l2_pix_format,
    pub raw_data: [u8; 200],
    pub align: *mut libc::c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_union,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_captureparm {
    pub capability: u32,
    pub capturemode: u32,
    pub timeperframe: v4l2_fract,
    pub extendedmode: u32,
    pub readbuffers: u32,
    pub reserved: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_streamparm_union {
    pub capture: v4l2_captureparm,
    pub raw_data: [u8; 200],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_streamparm {
    pub type_: u32,
    pub parm: v4l2_streamparm_union,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut libc::c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct v4l2_exportbuffer {
    pub type_: u32,
    pub index: u32,
    pub plane: u32,
    pub flags: u32,
    pub fd: i32,
    pub reserved: [u32; 11],
}

zeroed_default!(
    v4l2_capability,
    v4l2_fmtdesc,
    v4l2_frmsizeenum,
    v4l2_frmivalenum,
    v4l2_format,
    v4l2_streamparm,
    v4l2_buffer,
    v4l2_exportbuffer,
);

const VIDIOC_MAGIC: u8 = b'V';

nix::ioctl_read!(
    /// `VIDIOC_QUERYCAP`
    vidioc_querycap,
    VIDIOC_MAGIC,
    0,
    v4l2_capability
);
nix::ioctl_readwrite!(
    /// `VIDIOC_ENUM_FMT`
    vidioc_enum_fmt,
    VIDIOC_MAGIC,
    2,
    v4l2_fmtdesc
);
nix::ioctl_readwrite!(
    /// `VIDIOC_S_FMT`
    vidioc_s_fmt,
    VIDIOC_MAGIC,
    5,
    v4l2_format
);
nix::ioctl_readwrite!(
    /// `VIDIOC_REQBUFS`
    vidioc_reqbufs,
    VIDIOC_MAGIC,
    8,
    v4l2_requestbuffers
);
nix::ioctl_readwrite!(
    /// `VIDIOC_QUERYBUF`
    vidioc_querybuf,
    VIDIOC_MAGIC,
    9,
    v4l2_buffer
);
nix::ioctl_readwrite!(
    /// `VIDIOC_QBUF`
    vidioc_qbuf,
    VIDIOC_MAGIC,
    15,
    v4l2_buffer
);
nix::ioctl_readwrite!(
    /// `VIDIOC_EXPBUF`
    vidioc_expbuf,
    VIDIOC_MAGIC,
    16,
    v4l2_exportbuffer
);
nix::ioctl_readwrite!(
    /// `VIDIOC_DQBUF`
    vidioc_dqbuf,
    VIDIOC_MAGIC,
    17,
    v4l2_buffer
);
nix::ioctl_write_ptr!(
    /// `VIDIOC_STREAMON`
    vidioc_streamon,
    VIDIOC_MAGIC,
    18,
    libc::c_int
);
nix::ioctl_write_ptr!(
    /// `VIDIOC_STREAMOFF`
    vidioc_streamoff,
    VIDIOC_MAGIC,
    19,
    libc::c_int
);
nix::ioctl_readwrite!(
    /// `VIDIOC_S_PARM`
    vidioc_s_parm,
    VIDIOC_MAGIC,
    22,
    v4l2_streamparm
);
nix::ioctl_readwrite!(
    /// `VIDIOC_ENUM_FRAMESIZES`
    vidioc_enum_framesizes,
    VIDIOC_MAGIC,
    74,
    v4l2_frmsizeenum
);
nix::ioctl_readwrite!(
    /// `VIDIOC_ENUM_FRAMEINTERVALS`
    vidioc_enum_frameintervals,
    VIDIOC_MAGIC,
    75,
    v4l2_frmivalenum
);
