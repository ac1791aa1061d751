// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! V4L2 device handle
//!
//! [`Device`] is the seam between the capture core and the kernel: one method
//! per control call, each a single synchronous round trip. [`V4l2Device`] is
//! the real implementation over an open `/dev/video*` file descriptor.

use std::ffi::c_int;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use visionrt_sys as ffi;

/// Buffer queue type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BufferType {
    /// Single-planar video capture queue
    #[default]
    VideoCapture = ffi::V4L2_BUF_TYPE_VIDEO_CAPTURE,

    /// Single-planar video output queue
    VideoOutput = ffi::V4L2_BUF_TYPE_VIDEO_OUTPUT,
}

impl BufferType {
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// V4L2 buffer memory method
///
/// | Mode | Allocation | Host-mappable |
/// |------|------------|---------------|
/// | [`MemoryType::Mmap`] | Kernel | Yes |
/// | [`MemoryType::UserPtr`] | User | n/a |
/// | [`MemoryType::DmaBuf`] | Importer | n/a |
///
/// The buffer ring maps kernel-allocated memory, so only
/// [`MemoryType::Mmap`] can back it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MemoryType {
    /// Memory-mapped buffers
    ///
    /// Kernel allocates buffers, user mmaps them.
    #[default]
    Mmap = ffi::V4L2_MEMORY_MMAP,

    /// User pointer buffers
    UserPtr = ffi::V4L2_MEMORY_USERPTR,

    /// DMA buffer file descriptors
    DmaBuf = ffi::V4L2_MEMORY_DMABUF,
}

impl MemoryType {
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Mmap => write!(f, "MMAP"),
            MemoryType::UserPtr => write!(f, "USERPTR"),
            MemoryType::DmaBuf => write!(f, "DMABUF"),
        }
    }
}

/// Kernel control surface used by the capture core.
///
/// Every method performs exactly one kernel request and reports failure as the
/// raw `errno` wrapped in [`io::Error`]. Callers distinguish the "no more
/// entries" signal of the enumeration calls by `EINVAL`.
pub trait Device {
    fn querycap(&self, caps: &mut ffi::v4l2_capability) -> io::Result<()>;

    fn enum_fmt(&self, desc: &mut ffi::v4l2_fmtdesc) -> io::Result<()>;

    fn enum_framesizes(&self, size: &mut ffi::v4l2_frmsizeenum) -> io::Result<()>;

    fn enum_frameintervals(&self, ival: &mut ffi::v4l2_frmivalenum) -> io::Result<()>;

    fn s_fmt(&self, fmt: &mut ffi::v4l2_format) -> io::Result<()>;

    fn s_parm(&self, parm: &mut ffi::v4l2_streamparm) -> io::Result<()>;

    fn reqbufs(&self, req: &mut ffi::v4l2_requestbuffers) -> io::Result<()>;

    fn querybuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()>;

    fn qbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()>;

    /// Blocks until the driver hands back a completed buffer.
    fn dqbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()>;

    fn expbuf(&self, exp: &mut ffi::v4l2_exportbuffer) -> io::Result<()>;

    fn streamon(&self, buf_type: BufferType) -> io::Result<()>;

    fn streamoff(&self, buf_type: BufferType) -> io::Result<()>;

    /// Maps `length` bytes of the buffer at the driver-assigned `offset` into
    /// the process, shared and read/write.
    fn map(&self, offset: u32, length: usize) -> io::Result<NonNull<u8>>;

    /// Unmaps a region previously returned by [`Device::map`].
    ///
    /// # Safety
    ///
    /// `addr` and `length` must describe a live mapping returned by `map` on
    /// this handle, and no reference into that region may be used afterwards.
    unsafe fn unmap(&self, addr: NonNull<u8>, length: usize) -> io::Result<()>;
}

/// Open V4L2 device node.
///
/// The descriptor is opened read/write in blocking mode, so
/// [`Device::dqbuf`] waits for the next completed frame. It is closed when
/// the handle is dropped.
#[derive(Debug)]
pub struct V4l2Device {
    path: PathBuf,
    fd: OwnedFd,
}

impl V4l2Device {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        log::debug!("opened {} (fd {})", path.display(), file.as_raw_fd());

        Ok(V4l2Device {
            path: path.to_owned(),
            fd: file.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(
        &self,
        request: unsafe fn(c_int, *mut T) -> nix::Result<c_int>,
        arg: &mut T,
    ) -> io::Result<()> {
        // SAFETY: the descriptor stays open for the lifetime of `self` and
        // `arg` is an exclusively borrowed structure of the exact type the
        // request number encodes.
        unsafe { request(self.fd.as_raw_fd(), arg) }
            .map(drop)
            .map_err(io::Error::from)
    }

    fn stream_ioctl(
        &self,
        request: unsafe fn(c_int, *const c_int) -> nix::Result<c_int>,
        buf_type: BufferType,
    ) -> io::Result<()> {
        let raw = buf_type.as_raw() as c_int;
        // SAFETY: STREAMON/STREAMOFF only read the int behind the pointer.
        unsafe { request(self.fd.as_raw_fd(), &raw) }
            .map(drop)
            .map_err(io::Error::from)
    }
}

impl Device for V4l2Device {
    fn querycap(&self, caps: &mut ffi::v4l2_capability) -> io::Result<()> {
        self.ioctl(ffi::vidioc_querycap, caps)
    }

    fn enum_fmt(&self, desc: &mut ffi::v4l2_fmtdesc) -> io::Result<()> {
        self.ioctl(ffi::vidioc_enum_fmt, desc)
    }

    fn enum_framesizes(&self, size: &mut ffi::v4l2_frmsizeenum) -> io::Result<()> {
        self.ioctl(ffi::vidioc_enum_framesizes, size)
    }

    fn enum_frameintervals(&self, ival: &mut ffi::v4l2_frmivalenum) -> io::Result<()> {
        self.ioctl(ffi::vidioc_enum_frameintervals, ival)
    }

    fn s_fmt(&self, fmt: &mut ffi::v4l2_format) -> io::Result<()> {
        self.ioctl(ffi::vidioc_s_fmt, fmt)
    }

    fn s_parm(&self, parm: &mut ffi::v4l2_streamparm) -> io::Result<()> {
        self.ioctl(ffi::vidioc_s_parm, parm)
    }

    fn reqbufs(&self, req: &mut ffi::v4l2_requestbuffers) -> io::Result<()> {
        self.ioctl(ffi::vidioc_reqbufs, req)
    }

    fn querybuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.ioctl(ffi::vidioc_querybuf, buf)
    }

    fn qbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.ioctl(ffi::vidioc_qbuf, buf)
    }

    fn dqbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.ioctl(ffi::vidioc_dqbuf, buf)
    }

    fn expbuf(&self, exp: &mut ffi::v4l2_exportbuffer) -> io::Result<()> {
        self.ioctl(ffi::vidioc_expbuf, exp)
    }

    fn streamon(&self, buf_type: BufferType) -> io::Result<()> {
        self.stream_ioctl(ffi::vidioc_streamon, buf_type)
    }

    fn streamoff(&self, buf_type: BufferType) -> io::Result<()> {
        self.stream_ioctl(ffi::vidioc_streamoff, buf_type)
    }

    fn map(&self, offset: u32, length: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: a fresh shared mapping of the device fd; the kernel
        // validates offset and length against the buffer it describes.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                offset as libc::off_t,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, length: usize) -> io::Result<()> {
        // SAFETY: the caller guarantees addr/length came from `map`.
        if unsafe { libc::munmap(addr.as_ptr().cast(), length) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsFd for V4l2Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for V4l2Device {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
