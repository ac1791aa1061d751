// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! In-memory stand-in for a V4L2 capture driver used by the unit tests.
//!
//! Clones share one [`FakeState`], so a test can hand a clone to the code
//! under test and keep another to script failures and inspect the call log.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs::File;
use std::io;
use std::os::fd::IntoRawFd;
use std::ptr::NonNull;
use std::rc::Rc;

use visionrt_sys as ffi;

use super::device::{BufferType, Device};
use super::protocol::Fraction;
use crate::fourcc::FourCC;

/// Distance between the mmap offsets of consecutive buffers.
pub(crate) const OFFSET_STRIDE: u32 = 0x1000;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    QueryCap,
    EnumFmt(u32),
    EnumFrameSizes,
    EnumFrameIntervals,
    SetFormat {
        pixelformat: FourCC,
        width: u32,
        height: u32,
        field: u32,
    },
    SetParm(Fraction),
    ReqBufs(u32),
    QueryBuf(u32),
    Map(u32),
    Unmap(u32),
    Qbuf(u32),
    Dqbuf,
    ExpBuf(u32),
    StreamOn,
    StreamOff,
}

#[derive(Debug, Clone)]
pub(crate) enum FakeSize {
    Discrete {
        width: u32,
        height: u32,
        intervals: Vec<(u32, u32)>,
        stepwise_interval: bool,
    },
    Stepwise,
}

impl FakeSize {
    pub(crate) fn discrete(width: u32, height: u32, intervals: &[(u32, u32)]) -> Self {
        FakeSize::Discrete {
            width,
            height,
            intervals: intervals.to_vec(),
            stepwise_interval: false,
        }
    }

    /// Appends a stepwise interval entry after the discrete ones.
    pub(crate) fn with_stepwise_interval(self) -> Self {
        match self {
            FakeSize::Discrete {
                width,
                height,
                intervals,
                ..
            } => FakeSize::Discrete {
                width,
                height,
                intervals,
                stepwise_interval: true,
            },
            FakeSize::Stepwise => FakeSize::Stepwise,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeFormat {
    pub fourcc: FourCC,
    pub description: String,
    pub compressed: bool,
    pub sizes: Vec<FakeSize>,
}

impl FakeFormat {
    pub(crate) fn raw(fourcc: FourCC, sizes: Vec<FakeSize>) -> Self {
        let description = match fourcc {
            FourCC::YUYV => "YUYV 4:2:2".to_owned(),
            other => other.to_string(),
        };
        FakeFormat {
            fourcc,
            description,
            compressed: false,
            sizes,
        }
    }

    pub(crate) fn compressed(fourcc: FourCC, sizes: Vec<FakeSize>) -> Self {
        FakeFormat {
            compressed: true,
            ..FakeFormat::raw(fourcc, sizes)
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeState {
    pub capabilities: u32,
    pub device_caps: u32,
    pub formats: Vec<FakeFormat>,

    pub fail_querycap: bool,
    pub fail_enum_fmt_at: Option<u32>,
    /// Fails ENUM_FRAMESIZES with EIO at this index, for every format.
    pub fail_framesizes_at: Option<u32>,
    /// Fails ENUM_FRAMEINTERVALS with EIO at this index, for every size.
    pub fail_frameintervals_at: Option<u32>,
    pub fail_s_fmt: bool,
    pub fail_s_parm: bool,
    pub fail_reqbufs: bool,
    /// Overrides the number of buffers granted by REQBUFS.
    pub grant: Option<u32>,
    pub fail_querybuf_at: Option<u32>,
    pub fail_map_at: Option<u32>,
    pub fail_qbuf: bool,
    pub fail_dqbuf: bool,
    pub fail_streamon: bool,
    pub fail_streamoff: bool,
    /// Reports this index from DQBUF instead of the queued one.
    pub dqbuf_index_override: Option<u32>,

    pub format: Option<(FourCC, u32, u32)>,
    pub memory: Vec<Box<[u8]>>,
    pub mapped: BTreeSet<u32>,
    pub ready: VecDeque<u32>,
    pub streaming: bool,
    pub sequence: u32,
    pub calls: Vec<Call>,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            capabilities: ffi::V4L2_CAP_VIDEO_CAPTURE
                | ffi::V4L2_CAP_STREAMING
                | ffi::V4L2_CAP_EXT_PIX_FORMAT
                | ffi::V4L2_CAP_DEVICE_CAPS,
            device_caps: ffi::V4L2_CAP_VIDEO_CAPTURE
                | ffi::V4L2_CAP_STREAMING
                | ffi::V4L2_CAP_EXT_PIX_FORMAT,
            formats: vec![FakeFormat::raw(
                FourCC::YUYV,
                vec![
                    FakeSize::discrete(640, 480, &[(1, 30)]),
                    FakeSize::discrete(320, 240, &[(1, 60)]),
                ],
            )],
            fail_querycap: false,
            fail_enum_fmt_at: None,
            fail_framesizes_at: None,
            fail_frameintervals_at: None,
            fail_s_fmt: false,
            fail_s_parm: false,
            fail_reqbufs: false,
            grant: None,
            fail_querybuf_at: None,
            fail_map_at: None,
            fail_qbuf: false,
            fail_dqbuf: false,
            fail_streamon: false,
            fail_streamoff: false,
            dqbuf_index_override: None,
            format: None,
            memory: Vec::new(),
            mapped: BTreeSet::new(),
            ready: VecDeque::new(),
            streaming: false,
            sequence: 0,
            calls: Vec::new(),
        }
    }
}

impl FakeState {
    fn buffer_size(&self) -> usize {
        match self.format {
            Some((fourcc, width, height)) => {
                (width * height) as usize * fourcc.bytes_per_pixel().unwrap_or(1)
            }
            None => OFFSET_STRIDE as usize,
        }
    }

    fn size(&self, pixel_format: u32, index: u32) -> Option<&FakeSize> {
        self.formats
            .iter()
            .find(|f| f.fourcc.as_u32() == pixel_format)
            .and_then(|f| f.sizes.get(index as usize))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDevice {
    state: Rc<RefCell<FakeState>>,
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        FakeDevice::default()
    }

    pub(crate) fn with_formats(formats: Vec<FakeFormat>) -> Self {
        let dev = FakeDevice::new();
        dev.with_state(|s| s.formats = formats);
        dev
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Device for FakeDevice {
    fn querycap(&self, caps: &mut ffi::v4l2_capability) -> io::Result<()> {
        self.log(Call::QueryCap);
        let s = self.state.borrow();
        if s.fail_querycap {
            return Err(errno(libc::EIO));
        }

        caps.driver[..7].copy_from_slice(b"fakecam");
        caps.card[..11].copy_from_slice(b"Fake Camera");
        caps.bus_info[..13].copy_from_slice(b"platform:fake");
        caps.version = 0x0006_0100;
        caps.capabilities = s.capabilities;
        caps.device_caps = s.device_caps;
        Ok(())
    }

    fn enum_fmt(&self, desc: &mut ffi::v4l2_fmtdesc) -> io::Result<()> {
        self.log(Call::EnumFmt(desc.index));
        let s = self.state.borrow();
        if s.fail_enum_fmt_at == Some(desc.index) {
            return Err(errno(libc::EIO));
        }

        let format = s.formats.get(desc.index as usize).ok_or(errno(libc::EINVAL))?;
        desc.pixelformat = format.fourcc.as_u32();
        desc.flags = if format.compressed {
            ffi::V4L2_FMT_FLAG_COMPRESSED
        } else {
            0
        };
        let text = format.description.as_bytes();
        let len = text.len().min(desc.description.len() - 1);
        desc.description[..len].copy_from_slice(&text[..len]);
        Ok(())
    }

    fn enum_framesizes(&self, size: &mut ffi::v4l2_frmsizeenum) -> io::Result<()> {
        self.log(Call::EnumFrameSizes);
        let s = self.state.borrow();
        if s.fail_framesizes_at == Some(size.index) {
            return Err(errno(libc::EIO));
        }

        match s.size(size.pixel_format, size.index) {
            Some(FakeSize::Discrete { width, height, .. }) => {
                size.type_ = ffi::V4L2_FRMSIZE_TYPE_DISCRETE;
                size.u.discrete = ffi::v4l2_frmsize_discrete {
                    width: *width,
                    height: *height,
                };
                Ok(())
            }
            Some(FakeSize::Stepwise) => {
                size.type_ = ffi::V4L2_FRMSIZE_TYPE_STEPWISE;
                size.u.stepwise = ffi::v4l2_frmsize_stepwise {
                    min_width: 16,
                    max_width: 1920,
                    step_width: 16,
                    min_height: 16,
                    max_height: 1080,
                    step_height: 16,
                };
                Ok(())
            }
            None => Err(errno(libc::EINVAL)),
        }
    }

    fn enum_frameintervals(&self, ival: &mut ffi::v4l2_frmivalenum) -> io::Result<()> {
        self.log(Call::EnumFrameIntervals);
        let s = self.state.borrow();
        if s.fail_frameintervals_at == Some(ival.index) {
            return Err(errno(libc::EIO));
        }

        let entry = s
            .formats
            .iter()
            .find(|f| f.fourcc.as_u32() == ival.pixel_format)
            .and_then(|f| {
                f.sizes.iter().find_map(|size| match size {
                    FakeSize::Discrete {
                        width,
                        height,
                        intervals,
                        stepwise_interval,
                    } if (*width, *height) == (ival.width, ival.height) => {
                        Some((intervals, *stepwise_interval))
                    }
                    _ => None,
                })
            });

        let Some((intervals, stepwise_interval)) = entry else {
            return Err(errno(libc::EINVAL));
        };

        let index = ival.index as usize;
        if let Some(&(numerator, denominator)) = intervals.get(index) {
            ival.type_ = ffi::V4L2_FRMIVAL_TYPE_DISCRETE;
            ival.u.discrete = ffi::v4l2_fract {
                numerator,
                denominator,
            };
            Ok(())
        } else if stepwise_interval && index == intervals.len() {
            ival.type_ = ffi::V4L2_FRMIVAL_TYPE_STEPWISE;
            ival.u.stepwise = ffi::v4l2_frmival_stepwise {
                min: ffi::v4l2_fract {
                    numerator: 1,
                    denominator: 120,
                },
                max: ffi::v4l2_fract {
                    numerator: 1,
                    denominator: 1,
                },
                step: ffi::v4l2_fract {
                    numerator: 1,
                    denominator: 120,
                },
            };
            Ok(())
        } else {
            Err(errno(libc::EINVAL))
        }
    }

    fn s_fmt(&self, fmt: &mut ffi::v4l2_format) -> io::Result<()> {
        // SAFETY: the capture queue always uses the pix member.
        let pix = unsafe { fmt.fmt.pix };
        let pixelformat = FourCC::from_u32(pix.pixelformat);
        self.log(Call::SetFormat {
            pixelformat,
            width: pix.width,
            height: pix.height,
            field: pix.field,
        });

        let mut s = self.state.borrow_mut();
        if s.fail_s_fmt {
            return Err(errno(libc::EINVAL));
        }
        if !s.memory.is_empty() {
            return Err(errno(libc::EBUSY));
        }
        s.format = Some((pixelformat, pix.width, pix.height));
        Ok(())
    }

    fn s_parm(&self, parm: &mut ffi::v4l2_streamparm) -> io::Result<()> {
        // SAFETY: capture parameters are the active member for capture queues.
        let tpf = unsafe { parm.parm.capture.timeperframe };
        self.log(Call::SetParm(Fraction::new(tpf.numerator, tpf.denominator)));

        if self.state.borrow().fail_s_parm {
            return Err(errno(libc::EINVAL));
        }
        Ok(())
    }

    fn reqbufs(&self, req: &mut ffi::v4l2_requestbuffers) -> io::Result<()> {
        self.log(Call::ReqBufs(req.count));
        let mut s = self.state.borrow_mut();
        if s.fail_reqbufs {
            return Err(errno(libc::ENOMEM));
        }
        if req.memory != ffi::V4L2_MEMORY_MMAP {
            return Err(errno(libc::EINVAL));
        }
        if s.streaming || !s.mapped.is_empty() {
            return Err(errno(libc::EBUSY));
        }

        let count = if req.count == 0 {
            0
        } else {
            s.grant.unwrap_or(req.count)
        };
        let size = s.buffer_size();
        s.memory = (0..count).map(|_| vec![0u8; size].into_boxed_slice()).collect();
        s.ready.clear();
        req.count = count;
        Ok(())
    }

    fn querybuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.log(Call::QueryBuf(buf.index));
        let s = self.state.borrow();
        if s.fail_querybuf_at == Some(buf.index) {
            return Err(errno(libc::EIO));
        }

        let memory = s.memory.get(buf.index as usize).ok_or(errno(libc::EINVAL))?;
        buf.length = memory.len() as u32;
        buf.m.offset = buf.index * OFFSET_STRIDE;
        Ok(())
    }

    fn qbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.log(Call::Qbuf(buf.index));
        let mut s = self.state.borrow_mut();
        if s.fail_qbuf {
            return Err(errno(libc::EIO));
        }
        if buf.index as usize >= s.memory.len() || s.ready.contains(&buf.index) {
            return Err(errno(libc::EINVAL));
        }
        s.ready.push_back(buf.index);
        Ok(())
    }

    fn dqbuf(&self, buf: &mut ffi::v4l2_buffer) -> io::Result<()> {
        self.log(Call::Dqbuf);
        let mut s = self.state.borrow_mut();
        if s.fail_dqbuf || !s.streaming {
            return Err(errno(libc::EINVAL));
        }

        let index = s.ready.pop_front().ok_or(errno(libc::EAGAIN))?;
        let sequence = s.sequence;
        s.sequence += 1;

        // Fill the frame with its sequence number so tests can check the view
        let memory = &mut s.memory[index as usize];
        memory.fill(sequence as u8);
        let bytesused = memory.len() as u32;

        buf.index = s.dqbuf_index_override.unwrap_or(index);
        buf.bytesused = bytesused;
        buf.sequence = sequence;
        buf.flags = ffi::V4L2_BUF_FLAG_MAPPED | ffi::V4L2_BUF_FLAG_DONE;
        buf.timestamp.tv_sec = libc::time_t::from(sequence as i32);
        buf.timestamp.tv_usec = 500;
        Ok(())
    }

    fn expbuf(&self, exp: &mut ffi::v4l2_exportbuffer) -> io::Result<()> {
        self.log(Call::ExpBuf(exp.index));
        if exp.index as usize >= self.state.borrow().memory.len() {
            return Err(errno(libc::EINVAL));
        }
        exp.fd = File::open("/dev/null")?.into_raw_fd();
        Ok(())
    }

    fn streamon(&self, buf_type: BufferType) -> io::Result<()> {
        self.log(Call::StreamOn);
        let mut s = self.state.borrow_mut();
        if s.fail_streamon || buf_type != BufferType::VideoCapture || s.memory.is_empty() {
            return Err(errno(libc::EINVAL));
        }
        s.streaming = true;
        Ok(())
    }

    fn streamoff(&self, _buf_type: BufferType) -> io::Result<()> {
        self.log(Call::StreamOff);
        let mut s = self.state.borrow_mut();
        if s.fail_streamoff {
            return Err(errno(libc::EIO));
        }
        s.streaming = false;
        s.ready.clear();
        Ok(())
    }

    fn map(&self, offset: u32, length: usize) -> io::Result<NonNull<u8>> {
        let index = offset / OFFSET_STRIDE;
        self.log(Call::Map(index));
        let mut s = self.state.borrow_mut();
        if s.fail_map_at == Some(index) {
            return Err(errno(libc::ENOMEM));
        }

        let memory = s
            .memory
            .get_mut(index as usize)
            .filter(|m| m.len() >= length)
            .ok_or(errno(libc::EINVAL))?;
        let addr = NonNull::new(memory.as_mut_ptr()).ok_or(errno(libc::EFAULT))?;
        s.mapped.insert(index);
        Ok(addr)
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, _length: usize) -> io::Result<()> {
        let mut s = self.state.borrow_mut();
        let index = s
            .memory
            .iter()
            .position(|m| m.as_ptr() == addr.as_ptr().cast_const())
            .map(|i| i as u32)
            .filter(|i| s.mapped.contains(i))
            .ok_or(errno(libc::EINVAL))?;
        s.mapped.remove(&index);
        s.calls.push(Call::Unmap(index));
        Ok(())
    }
}
