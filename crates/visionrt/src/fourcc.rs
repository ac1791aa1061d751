// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors
#![forbid(unsafe_code)]

use core::{fmt, result::Result, str::FromStr};

/// Four-character pixel format code as used by V4L2.
///
/// V4L2 packs the code as `a | b << 8 | c << 16 | d << 24` independent of
/// host endianness, so conversions always go through little-endian bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const YUYV: FourCC = FourCC(*b"YUYV");
    pub const UYVY: FourCC = FourCC(*b"UYVY");
    pub const NV12: FourCC = FourCC(*b"NV12");
    pub const GREY: FourCC = FourCC(*b"GREY");
    pub const RGB3: FourCC = FourCC(*b"RGB3");
    pub const BGR3: FourCC = FourCC(*b"BGR3");
    pub const RGB4: FourCC = FourCC(*b"RGB4");
    pub const BGR4: FourCC = FourCC(*b"BGR4");
    pub const AR24: FourCC = FourCC(*b"AR24");
    pub const XR24: FourCC = FourCC(*b"XR24");
    pub const MJPG: FourCC = FourCC(*b"MJPG");

    pub const fn from_u32(val: u32) -> FourCC {
        FourCC(val.to_le_bytes())
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Bytes per pixel for packed single-plane formats, the innermost
    /// dimension of the `(height, width, bpp)` frame shape. Planar and
    /// compressed formats have no such dimension and return `None`.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match &self.0 {
            b"GREY" => Some(1),
            b"YUYV" | b"UYVY" | b"YVYU" | b"VYUY" | b"RGBP" | b"Y16 " => Some(2),
            b"RGB3" | b"BGR3" => Some(3),
            b"RGB4" | b"BGR4" | b"AR24" | b"XR24" | b"AB24" | b"XB24" => Some(4),
            _ => None,
        }
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.as_u32()
    }
}

/// Error returned when parsing a [`FourCC`] from a string that is not exactly
/// four bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFourCCError(pub String);

impl fmt::Display for ParseFourCCError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fourcc must be exactly 4 bytes: {:?}", self.0)
    }
}

impl std::error::Error for ParseFourCCError {}

impl FromStr for FourCC {
    type Err = ParseFourCCError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| ParseFourCCError(s.to_owned()))?;
        Ok(FourCC(bytes))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                // fmt::Error would make format!() panic, so escape instead
                let b = &self.0;
                f.write_fmt(format_args!(
                    "{}{}{}{}",
                    core::ascii::escape_default(b[0]),
                    core::ascii::escape_default(b[1]),
                    core::ascii::escape_default(b[2]),
                    core::ascii::escape_default(b[3])
                ))
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("FourCC")
            .field(&format_args!("{}", self))
            .finish()
    }
}
