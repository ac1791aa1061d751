// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! VisionRT capture library
//!
//! Turns a V4L2 capture device into a stream of memory-mapped frame buffers
//! that are handed, without any intermediate CPU copy, to a GPU upload
//! collaborator.
//!
//! The library is built from three layers:
//!
//! - [`v4l2`] - stateless protocol adapter: capability query, format /
//!   resolution / frame-interval enumeration and format selection.
//! - [`ring`] - a fixed pool of kernel buffers mapped into the process and
//!   the streaming state machine that cycles them through the kernel queue.
//! - [`camera`] - the capture session that opens the device, picks the best
//!   format and yields completed frames.
//!
//! # Quick Start
//!
//! ```no_run
//! use visionrt::camera::create_camera;
//! use visionrt::frame::HostCopy;
//!
//! let mut session = create_camera().with_device("/dev/video0").open()?;
//! println!("{}", session);
//!
//! for frame in session.frames(HostCopy).take(10) {
//!     let frame = frame?;
//!     println!("frame {} ({} bytes)", frame.sequence, frame.data.len());
//! }
//! # Ok::<(), visionrt::Error>(())
//! ```
//!
//! # Logging
//!
//! All diagnostics go through the [`log`] facade. Device identity and format
//! changes are logged at `info`, ring transitions at `debug`, swallowed
//! teardown failures at `warn` and truncated enumerations at `error`.

use std::{error, fmt, io};

/// Error type for visionrt operations
#[derive(Debug)]
pub enum Error {
    /// The device could not be opened or does not have the required
    /// capabilities. Fatal to session construction.
    Device {
        msg: String,
        source: Option<io::Error>,
    },

    /// A single kernel control call was rejected by the driver.
    Protocol {
        call: &'static str,
        source: io::Error,
    },

    /// Buffer ring failure: request, query, map, queue or stream control.
    Buffer {
        msg: String,
        source: Option<io::Error>,
    },

    /// An operation was invoked before its precondition held, for example a
    /// format query before any format was selected, or any call after close.
    State(&'static str),

    /// Dequeueing a completed buffer failed during a frame pull.
    Capture(io::Error),

    /// Buffer or format index outside the valid range.
    OutOfRange { index: usize, len: usize },

    /// The upload collaborator failed to consume a frame.
    Upload(Box<dyn error::Error + Send + Sync>),

    /// I/O error from underlying system calls
    Io(io::Error),
}

impl Error {
    /// Wraps an uploader failure.
    pub fn upload(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Error::Upload(err.into())
    }

    pub(crate) fn device(msg: impl Into<String>, source: Option<io::Error>) -> Self {
        Error::Device {
            msg: msg.into(),
            source,
        }
    }

    pub(crate) fn buffer(msg: impl Into<String>, source: Option<io::Error>) -> Self {
        Error::Buffer {
            msg: msg.into(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Device { msg, source: None } => write!(f, "device error: {}", msg),
            Error::Device {
                msg,
                source: Some(err),
            } => write!(f, "device error: {}: {}", msg, err),
            Error::Protocol { call, source } => write!(f, "{} failed: {}", call, source),
            Error::Buffer { msg, source: None } => write!(f, "buffer error: {}", msg),
            Error::Buffer {
                msg,
                source: Some(err),
            } => write!(f, "buffer error: {}: {}", msg, err),
            Error::State(msg) => write!(f, "invalid state: {}", msg),
            Error::Capture(err) => write!(f, "failed to dequeue buffer: {}", err),
            Error::OutOfRange { index, len } => {
                write!(f, "index {} out of range (len {})", index, len)
            }
            Error::Upload(err) => write!(f, "frame upload failed: {}", err),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Device { source, .. } | Error::Buffer { source, .. } => {
                source.as_ref().map(|err| err as &(dyn error::Error + 'static))
            }
            Error::Protocol { source, .. } => Some(source),
            Error::Capture(err) | Error::Io(err) => Some(err),
            Error::Upload(err) => Some(err.as_ref()),
            Error::State(_) | Error::OutOfRange { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The v4l2 module provides the device handle and the protocol adapter.
pub mod v4l2;

/// The score module ranks candidate formats.
pub mod score;

/// The ring module provides the memory-mapped buffer ring.
pub mod ring;

/// The camera module provides the capture session.
pub mod camera;

/// The frame module provides frame views and the upload collaborator trait.
pub mod frame;

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;
