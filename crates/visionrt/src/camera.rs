// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

use std::env;
use std::fmt;

use dma_buf::DmaBuf;

use crate::fourcc::FourCC;
use crate::frame::{FrameView, Upload};
use crate::ring::{BufferRing, DEFAULT_BUFFER_COUNT};
use crate::score::Scoring;
use crate::v4l2::{
    enumerate_formats, query_capabilities, set_format, set_frame_interval, BufferType, Device,
    DeviceCapabilities, Fraction, MemoryType, V4l2Device,
};
use crate::{Error, Result};

/// Environment variable naming the default capture device.
pub const DEVICE_ENV: &str = "VISIONRT_DEVICE";

/// Device used when neither the builder nor the environment names one.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// One selectable capture mode: a pixel format at a discrete resolution and
/// frame interval.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFormat {
    pub pixelformat: FourCC,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub interval: Fraction,
    /// Driver description of the pixel format
    pub description: String,
}

impl fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {:.2} fps",
            self.pixelformat, self.width, self.height, self.fps
        )
    }
}

/// Flattens the enumerated formats into candidates in enumeration order.
fn candidates<D: Device + ?Sized>(device: &D) -> Vec<CameraFormat> {
    enumerate_formats(device)
        .into_iter()
        .flat_map(|desc| {
            let description = desc.description;
            let pixelformat = desc.pixelformat;
            desc.intervals
                .into_iter()
                .map(move |ival| CameraFormat {
                    pixelformat,
                    width: ival.width,
                    height: ival.height,
                    fps: ival.fps,
                    interval: ival.interval,
                    description: description.clone(),
                })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Camera {
    /// video device file for the camera
    device: String,

    /// number of buffers to request, the driver may grant a different count
    num_buffers: u32,

    /// weights used to pick the default format
    scoring: Scoring,

    /// buffer memory type, only MMAP can be mapped by the ring
    memory: MemoryType,
}

impl Camera {
    pub fn with_device(self, device: &str) -> Camera {
        Camera {
            device: device.to_owned(),
            ..self
        }
    }

    pub fn with_buffers(self, num_buffers: u32) -> Camera {
        Camera {
            num_buffers,
            ..self
        }
    }

    pub fn with_scoring(self, scoring: Scoring) -> Camera {
        Camera { scoring, ..self }
    }

    pub fn with_memory(self, memory: MemoryType) -> Camera {
        Camera { memory, ..self }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Opens the configured device node and starts a session on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the node cannot be opened or lacks the
    /// streaming and extended pixel format capabilities, and
    /// [`Error::Protocol`] if the default format is rejected.
    pub fn open(self) -> Result<CaptureSession<V4l2Device>> {
        let device = V4l2Device::open(&self.device)
            .map_err(|err| Error::device(format!("cannot open {}", self.device), Some(err)))?;
        self.open_with(device)
    }

    /// Starts a session on an already opened device handle.
    pub fn open_with<D: Device>(self, device: D) -> Result<CaptureSession<D>> {
        CaptureSession::init(self, device)
    }
}

impl Default for Camera {
    fn default() -> Camera {
        Camera {
            device: env::var(DEVICE_ENV).unwrap_or_else(|_| DEFAULT_DEVICE.to_owned()),
            num_buffers: DEFAULT_BUFFER_COUNT,
            scoring: Scoring::default(),
            memory: MemoryType::Mmap,
        }
    }
}

pub fn create_camera() -> Camera {
    Camera::default()
}

/// Capture session over one device.
///
/// The session owns the device handle through its buffer ring. Frames are
/// pulled one at a time with [`CaptureSession::next_frame`] or the
/// [`CaptureSession::frames`] iterator; each pull dequeues a buffer, passes a
/// borrowed view to the uploader and requeues the buffer before returning.
pub struct CaptureSession<D: Device = V4l2Device> {
    ring: Option<BufferRing<D>>,
    capabilities: DeviceCapabilities,
    formats: Vec<CameraFormat>,
    best: Option<usize>,
    current: Option<usize>,
}

impl<D: Device> CaptureSession<D> {
    fn init(camera: Camera, device: D) -> Result<Self> {
        let capabilities = query_capabilities(&device).map_err(|err| match err {
            Error::Protocol { source, .. } => {
                Error::device(format!("cannot query {}", camera.device), Some(source))
            }
            other => other,
        })?;

        if !capabilities.supports_streaming {
            return Err(Error::device(
                format!("{} does not support streaming I/O", capabilities.card),
                None,
            ));
        }
        if !capabilities.supports_ext_pix_format {
            return Err(Error::device(
                format!(
                    "{} does not support extended pixel formats",
                    capabilities.card
                ),
                None,
            ));
        }

        log::info!(
            "opened {}: {} ({} on {})",
            camera.device,
            capabilities.card,
            capabilities.driver,
            capabilities.bus_info
        );

        let formats = candidates(&device);
        let best = camera
            .scoring
            .best_candidate(formats.iter().map(|f| (f.fps, f.width, f.height)));
        log::debug!("{} candidate formats", formats.len());

        let ring = BufferRing::with_types(
            device,
            camera.num_buffers,
            BufferType::VideoCapture,
            camera.memory,
        );

        let mut session = CaptureSession {
            ring: Some(ring),
            capabilities,
            formats,
            best,
            current: None,
        };

        match best {
            Some(index) => session.select_format(index)?,
            None => log::warn!("no usable capture format on {}", camera.device),
        }

        Ok(session)
    }

    fn ring(&self) -> Result<&BufferRing<D>> {
        self.ring.as_ref().ok_or(Error::State("session is closed"))
    }

    fn ring_mut(&mut self) -> Result<&mut BufferRing<D>> {
        self.ring.as_mut().ok_or(Error::State("session is closed"))
    }

    /// Every selectable mode, in enumeration order.
    pub fn formats(&self) -> &[CameraFormat] {
        &self.formats
    }

    /// Highest scoring mode, the one applied at construction.
    pub fn best_format(&self) -> Option<&CameraFormat> {
        self.best.map(|index| &self.formats[index])
    }

    pub fn current_format(&self) -> Option<&CameraFormat> {
        self.current.map(|index| &self.formats[index])
    }

    /// Position of [`CaptureSession::best_format`] in the format list.
    pub fn best_index(&self) -> Option<usize> {
        self.best
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Applies the mode at `index` of [`CaptureSession::formats`].
    ///
    /// Mapped buffers are released first since drivers refuse a format change
    /// while buffers exist. The frame interval is applied best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for a bad index, [`Error::State`] while
    /// streaming or after close, and [`Error::Protocol`] if the driver
    /// rejects the format.
    pub fn select_format(&mut self, index: usize) -> Result<()> {
        self.ring()?;

        let len = self.formats.len();
        let format = self
            .formats
            .get(index)
            .cloned()
            .ok_or(Error::OutOfRange { index, len })?;

        let ring = self.ring_mut()?;
        if ring.is_streaming() {
            return Err(Error::State("cannot change format while streaming"));
        }
        ring.release();

        set_format(ring.device(), format.pixelformat, format.width, format.height)?;
        if let Err(err) = set_frame_interval(ring.device(), format.interval) {
            log::warn!("frame interval {} not applied: {}", format.interval, err);
        }

        log::info!("selected format {}", format);
        self.current = Some(index);
        Ok(())
    }

    fn current_or_err(&self) -> Result<&CameraFormat> {
        self.current_format()
            .ok_or(Error::State("no format has been selected"))
    }

    pub fn width(&self) -> Result<u32> {
        Ok(self.current_or_err()?.width)
    }

    pub fn height(&self) -> Result<u32> {
        Ok(self.current_or_err()?.height)
    }

    pub fn pixelformat(&self) -> Result<FourCC> {
        Ok(self.current_or_err()?.pixelformat)
    }

    pub fn start_streaming(&mut self) -> Result<()> {
        self.ring_mut()?.start_streaming()
    }

    pub fn stop_streaming(&mut self) -> Result<()> {
        self.ring_mut()?.stop_streaming()
    }

    pub fn is_streaming(&self) -> bool {
        self.ring.as_ref().is_some_and(|ring| ring.is_streaming())
    }

    pub fn is_closed(&self) -> bool {
        self.ring.is_none()
    }

    /// Pulls one frame and hands it to `uploader`.
    ///
    /// Streaming starts on the first pull. The buffer is requeued before
    /// returning, including when the uploader fails, so the view must not be
    /// retained past the upload call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if no buffer could be dequeued; there is no
    /// retry. Uploader errors are returned as is.
    pub fn next_frame<U: Upload + ?Sized>(&mut self, uploader: &mut U) -> Result<U::Output> {
        let format = self.current_or_err()?;
        let (width, height, pixelformat) = (format.width, format.height, format.pixelformat);

        let ring = self.ring_mut()?;
        ring.start_streaming()?;

        let done = ring.dequeue().map_err(Error::Capture)?;
        let output = {
            let data = ring.buffer(done.index)?;
            let view = FrameView {
                data: &data[..done.bytes_used],
                index: done.index,
                sequence: done.sequence,
                timestamp: done.timestamp,
                width,
                height,
                pixelformat,
            };
            uploader.upload(&view)
        };

        if let Err(err) = ring.queue(done.index) {
            if let Err(upload_err) = &output {
                log::warn!("discarding upload error: {}", upload_err);
            }
            return Err(err);
        }

        output
    }

    /// Iterator over frames pulled through `uploader`.
    ///
    /// Yields one result per pull and ends once the session is closed.
    pub fn frames<U: Upload>(&mut self, uploader: U) -> Frames<'_, D, U> {
        Frames {
            session: self,
            uploader,
        }
    }

    /// Exports ring buffer `index` as a DMA-BUF.
    pub fn export_dmabuf(&self, index: usize) -> Result<DmaBuf> {
        self.ring()?.export_dmabuf(index)
    }

    /// Stops streaming and releases the buffers and the device handle.
    ///
    /// Every later operation fails with [`Error::State`]. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut ring) = self.ring.take() else {
            return Ok(());
        };

        let stopped = ring.stop_streaming();
        drop(ring);
        self.current = None;

        log::info!("capture session closed");
        stopped
    }
}

impl<D: Device> fmt::Display for CaptureSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.current_format() {
            Some(format) => write!(
                f,
                "Camera(width={}, height={}, fps={:.2}, format={})",
                format.width, format.height, format.fps, format.pixelformat
            ),
            None => write!(f, "Camera(no format set)"),
        }
    }
}

impl<D: Device> fmt::Debug for CaptureSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("card", &self.capabilities.card)
            .field("current", &self.current_format())
            .field("ring", &self.ring)
            .finish()
    }
}

/// Frame cursor returned by [`CaptureSession::frames`].
pub struct Frames<'a, D: Device, U: Upload> {
    session: &'a mut CaptureSession<D>,
    uploader: U,
}

impl<D: Device, U: Upload> Frames<'_, D, U> {
    pub fn session(&self) -> &CaptureSession<D> {
        self.session
    }
}

impl<D: Device, U: Upload> Iterator for Frames<'_, D, U> {
    type Item = Result<U::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.session.is_closed() {
            return None;
        }
        Some(self.session.next_frame(&mut self.uploader))
    }
}
