// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! Memory-mapped buffer ring
//!
//! A [`BufferRing`] owns a fixed pool of kernel-allocated frame buffers mapped
//! into the process and drives them through the capture queue:
//!
//! ```text
//! Unbuilt --initialize--> Mapped --start_streaming--> Streaming
//!                           ^                             |
//!                           +-------stop_streaming--------+
//! ```
//!
//! [`BufferRing::release`] returns a mapped ring to `Unbuilt` so the device
//! format can be changed, and dropping the ring stops streaming and unmaps
//! every buffer. Memory is never copied: [`BufferRing::buffer`] borrows the
//! mapping directly.

use std::fmt;
use std::io;
use std::os::fd::FromRawFd;
use std::ptr::NonNull;
use std::slice;

use dma_buf::DmaBuf;
use unix_ts::Timestamp;
use visionrt_sys as ffi;

use crate::v4l2::{BufferType, Device, MemoryType};
use crate::{Error, Result};

/// Buffer count requested when none is configured.
pub const DEFAULT_BUFFER_COUNT: u32 = 3;

/// A completed buffer handed back by the driver.
#[derive(Debug, Clone)]
pub struct Dequeued {
    /// Slot index within the ring
    pub index: usize,
    /// Bytes of valid payload, never more than the slot length
    pub bytes_used: usize,
    /// Driver frame counter
    pub sequence: u32,
    /// Capture time reported by the driver
    pub timestamp: Timestamp,
}

struct Slot {
    addr: NonNull<u8>,
    length: usize,
    queued: bool,
}

/// Fixed set of driver-allocated buffers mapped into this process.
///
/// The ring owns the device handle. Buffers cycle between the driver queue
/// and the caller through [`BufferRing::dequeue`] and [`BufferRing::queue`],
/// and are unmapped exactly once on [`BufferRing::release`] or drop.
pub struct BufferRing<D: Device> {
    device: D,
    buf_type: BufferType,
    memory: MemoryType,
    requested: u32,
    slots: Vec<Slot>,
    streaming: bool,
}

impl<D: Device> BufferRing<D> {
    /// Creates an unbuilt ring over `device`. No kernel calls are made until
    /// [`BufferRing::initialize`].
    pub fn new(device: D, count: u32) -> Self {
        Self::with_types(device, count, BufferType::VideoCapture, MemoryType::Mmap)
    }

    pub fn with_types(device: D, count: u32, buf_type: BufferType, memory: MemoryType) -> Self {
        BufferRing {
            device,
            buf_type,
            memory,
            requested: count,
            slots: Vec::new(),
            streaming: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn buf_type(&self) -> BufferType {
        self.buf_type
    }

    pub fn memory(&self) -> MemoryType {
        self.memory
    }

    /// Number of mapped buffers, zero until initialized.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Requests the buffers from the driver and maps each one.
    ///
    /// The driver may grant a different count than requested; the granted
    /// count is used. Calling this on an initialized ring does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Buffer`] if the memory type cannot be mapped, the
    /// request is rejected or grants nothing, or any query or mapping fails.
    /// On failure every buffer mapped so far is unmapped and the kernel
    /// allocation is released.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        if self.memory != MemoryType::Mmap {
            return Err(Error::buffer(
                format!("{} buffers cannot be mapped", self.memory),
                None,
            ));
        }

        let mut req = ffi::v4l2_requestbuffers {
            count: self.requested,
            type_: self.buf_type.as_raw(),
            memory: self.memory.as_raw(),
            ..Default::default()
        };
        self.device
            .reqbufs(&mut req)
            .map_err(|err| Error::buffer("VIDIOC_REQBUFS failed", Some(err)))?;

        if req.count == 0 {
            return Err(Error::buffer("driver granted no buffers", None));
        }
        if req.count != self.requested {
            log::debug!(
                "requested {} buffers, driver granted {}",
                self.requested,
                req.count
            );
        }

        for index in 0..req.count {
            match self.map_slot(index) {
                Ok(slot) => self.slots.push(slot),
                Err(err) => {
                    self.unmap_all();
                    self.free_kernel_buffers();
                    return Err(err);
                }
            }
        }

        log::debug!("mapped {} {} buffers", self.slots.len(), self.memory);
        Ok(())
    }

    fn map_slot(&self, index: u32) -> Result<Slot> {
        let mut buf = self.raw_buffer(index);
        self.device.querybuf(&mut buf).map_err(|err| {
            Error::buffer(format!("VIDIOC_QUERYBUF {} failed", index), Some(err))
        })?;

        // SAFETY: MMAP buffers report their mapping offset in m.offset.
        let offset = unsafe { buf.m.offset };
        let length = buf.length as usize;
        let addr = self
            .device
            .map(offset, length)
            .map_err(|err| Error::buffer(format!("mmap of buffer {} failed", index), Some(err)))?;

        Ok(Slot {
            addr,
            length,
            queued: false,
        })
    }

    fn raw_buffer(&self, index: u32) -> ffi::v4l2_buffer {
        ffi::v4l2_buffer {
            index,
            type_: self.buf_type.as_raw(),
            memory: self.memory.as_raw(),
            ..Default::default()
        }
    }

    fn unmap_all(&mut self) {
        for (index, slot) in self.slots.drain(..).enumerate() {
            // SAFETY: every slot holds a live mapping from `map` on this
            // device, and draining removes it so it cannot be unmapped twice.
            if let Err(err) = unsafe { self.device.unmap(slot.addr, slot.length) } {
                log::warn!("munmap of buffer {} failed: {}", index, err);
            }
        }
    }

    fn free_kernel_buffers(&self) {
        let mut req = ffi::v4l2_requestbuffers {
            count: 0,
            type_: self.buf_type.as_raw(),
            memory: self.memory.as_raw(),
            ..Default::default()
        };
        if let Err(err) = self.device.reqbufs(&mut req) {
            log::warn!("failed to release kernel buffers: {}", err);
        }
    }

    /// Queues every idle buffer and turns the stream on, initializing the
    /// ring first if needed. Does nothing when already streaming.
    pub fn start_streaming(&mut self) -> Result<()> {
        if self.streaming {
            return Ok(());
        }

        self.initialize()?;

        for index in 0..self.slots.len() {
            if !self.slots[index].queued {
                self.queue(index)?;
            }
        }

        self.device
            .streamon(self.buf_type)
            .map_err(|err| Error::buffer("VIDIOC_STREAMON failed", Some(err)))?;
        self.streaming = true;

        log::debug!("streaming started with {} buffers", self.slots.len());
        Ok(())
    }

    /// Turns the stream off. The driver returns every queued buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Buffer`] if the driver refuses; the ring then still
    /// reports itself as streaming.
    pub fn stop_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }

        self.device
            .streamoff(self.buf_type)
            .map_err(|err| Error::buffer("VIDIOC_STREAMOFF failed", Some(err)))?;
        self.streaming = false;

        for slot in &mut self.slots {
            slot.queued = false;
        }

        log::debug!("streaming stopped");
        Ok(())
    }

    /// Blocks until the driver hands back a filled buffer.
    ///
    /// The raw kernel error is returned unchanged; nothing is retried.
    pub fn dequeue(&mut self) -> io::Result<Dequeued> {
        let mut buf = self.raw_buffer(0);
        self.device.dqbuf(&mut buf)?;

        let len = self.slots.len();
        let slot = self.slots.get_mut(buf.index as usize).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("driver returned buffer {} of {}", buf.index, len),
            )
        })?;
        slot.queued = false;

        Ok(Dequeued {
            index: buf.index as usize,
            bytes_used: (buf.bytesused as usize).min(slot.length),
            sequence: buf.sequence,
            timestamp: Timestamp::new(
                buf.timestamp.tv_sec as i64,
                (buf.timestamp.tv_usec as u32) * 1000,
            ),
        })
    }

    /// Hands buffer `index` back to the driver for filling.
    pub fn queue(&mut self, index: usize) -> Result<()> {
        let len = self.slots.len();
        let queued = match self.slots.get(index) {
            Some(slot) => slot.queued,
            None => {
                return Err(Error::buffer(
                    format!("cannot queue buffer {} of {}", index, len),
                    None,
                ))
            }
        };
        if queued {
            return Err(Error::buffer(
                format!("buffer {} is already queued", index),
                None,
            ));
        }

        let mut buf = self.raw_buffer(index as u32);
        self.device
            .qbuf(&mut buf)
            .map_err(|err| Error::buffer(format!("VIDIOC_QBUF {} failed", index), Some(err)))?;
        self.slots[index].queued = true;

        Ok(())
    }

    /// Borrows the full mapping of buffer `index`.
    pub fn buffer(&self, index: usize) -> Result<&[u8]> {
        let slot = self.slot(index)?;
        // SAFETY: the mapping is live until the slot is removed, which needs
        // `&mut self` and so cannot overlap with this borrow.
        Ok(unsafe { slice::from_raw_parts(slot.addr.as_ptr(), slot.length) })
    }

    pub fn buffer_length(&self, index: usize) -> Result<usize> {
        Ok(self.slot(index)?.length)
    }

    fn slot(&self, index: usize) -> Result<&Slot> {
        self.slots.get(index).ok_or(Error::OutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    /// Exports buffer `index` as a DMA-BUF for zero-copy import elsewhere.
    ///
    /// The returned handle owns a new file descriptor; the buffer stays in the
    /// ring.
    pub fn export_dmabuf(&self, index: usize) -> Result<DmaBuf> {
        self.slot(index)?;

        let mut exp = ffi::v4l2_exportbuffer {
            type_: self.buf_type.as_raw(),
            index: index as u32,
            flags: (libc::O_CLOEXEC | libc::O_RDWR) as u32,
            ..Default::default()
        };
        self.device
            .expbuf(&mut exp)
            .map_err(|err| Error::buffer(format!("VIDIOC_EXPBUF {} failed", index), Some(err)))?;

        // SAFETY: EXPBUF returns a fresh descriptor that nothing else owns.
        Ok(unsafe { DmaBuf::from_raw_fd(exp.fd) })
    }

    /// Stops streaming, unmaps every buffer and frees the kernel allocation,
    /// returning the ring to its unbuilt state.
    pub fn release(&mut self) {
        if let Err(err) = self.stop_streaming() {
            log::warn!("{}", err);
            self.streaming = false;
        }

        if self.is_initialized() {
            self.unmap_all();
            self.free_kernel_buffers();
            log::debug!("buffers released");
        }
    }
}

impl<D: Device> Drop for BufferRing<D> {
    fn drop(&mut self) {
        if let Err(err) = self.stop_streaming() {
            log::warn!("{}", err);
        }
        self.unmap_all();
    }
}

impl<D: Device> fmt::Debug for BufferRing<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BufferRing")
            .field("buf_type", &self.buf_type)
            .field("memory", &self.memory)
            .field("buffers", &self.slots.len())
            .field("streaming", &self.streaming)
            .finish()
    }
}
