// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors
//
// V4L2 Capture Tests
//
// TESTING LAYERS:
//
// Layer 1 (Unit Tests - No hardware required):
//   - Public types (FourCC, Scoring, Fraction)
//   - Graceful handling of missing devices
//
// Layer 3 (Hardware Integration - Requires a V4L2 capture device):
//   - Capability query and format enumeration
//   - Default format selection
//   - Streaming, frame pulls, DMA-BUF export and close
//
// The device defaults to /dev/video0 and can be overridden with
// VISIONRT_DEVICE.
//
// RUN LAYER 1:
//   cargo test --test v4l2_capture
//
// RUN LAYER 3 (on hardware):
//   cargo test --test v4l2_capture -- --ignored --nocapture

use serial_test::serial;
use visionrt::camera::{create_camera, CaptureSession};
use visionrt::fourcc::FourCC;
use visionrt::frame::{FrameView, HostCopy};
use visionrt::score::{score, Scoring};
use visionrt::v4l2::{enumerate_formats, query_capabilities, Fraction, V4l2Device};
use visionrt::Error;

// =============================================================================
// Layer 1: Unit Tests (No Hardware Required)
// =============================================================================

#[test]
fn test_fourcc_roundtrip_through_u32() {
    let raw: u32 = FourCC::YUYV.into();
    assert_eq!(FourCC::from(raw), FourCC::YUYV);
    assert_eq!("MJPG".parse::<FourCC>().unwrap(), FourCC::MJPG);
}

#[test]
fn test_fraction_fps() {
    assert_eq!(Fraction::new(1, 30).fps(), 30.0);
    assert_eq!(Fraction::new(1, 30).to_string(), "1/30");
}

#[test]
fn test_default_scoring() {
    assert_eq!(Scoring::default(), Scoring::new(1.5, 1.5));
    assert!(score(60.0, 1920, 1080) > score(30.0, 1920, 1080));
    assert_eq!(score(0.0, 1920, 1080), f64::NEG_INFINITY);
}

#[test]
fn test_open_missing_device() {
    let err = V4l2Device::open("/dev/visionrt-missing").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);

    let err = create_camera()
        .with_device("/dev/visionrt-missing")
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::Device { .. }));
    assert!(err.to_string().contains("/dev/visionrt-missing"));
}

// =============================================================================
// Layer 3: Hardware Integration (Requires V4L2 Capture Device)
// =============================================================================

fn open_session() -> Result<CaptureSession, Error> {
    let _ = env_logger::builder().is_test(true).try_init();

    let session = create_camera().open()?;
    println!("{}", session);
    Ok(session)
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_capabilities() -> Result<(), Error> {
    let device = create_camera();
    let dev = V4l2Device::open(device.device())?;
    let caps = query_capabilities(&dev)?;

    println!("{} ({}) on {}", caps.card, caps.driver, caps.bus_info);
    assert!(caps.supports_capture);
    assert!(caps.supports_streaming);
    assert!(!caps.card.is_empty());

    Ok(())
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_enumerate_formats() -> Result<(), Error> {
    let dev = V4l2Device::open(create_camera().device())?;
    let formats = enumerate_formats(&dev);

    for format in &formats {
        assert!(!format.intervals.is_empty());
        for mode in &format.intervals {
            println!(
                "{} {}x{} @ {:.2} fps",
                format.pixelformat, mode.width, mode.height, mode.fps
            );
            assert!(mode.fps > 0.0);
        }
    }

    Ok(())
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_best_format_selected() -> Result<(), Error> {
    let session = open_session()?;

    let best = session.best_format().expect("device has no usable format");
    assert_eq!(session.current_format(), Some(best));
    assert_eq!(session.width()?, best.width);
    assert_eq!(session.height()?, best.height);

    Ok(())
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_capture_frames() -> Result<(), Error> {
    let mut session = open_session()?;
    let (width, height) = (session.width()?, session.height()?);

    let mut last = None;
    for frame in session.frames(HostCopy).take(30) {
        let frame = frame?;
        assert_eq!((frame.width, frame.height), (width, height));
        assert!(!frame.data.is_empty());

        if let Some(prev) = last {
            assert!(frame.sequence > prev, "sequence went backwards");
        }
        last = Some(frame.sequence);
    }

    session.close()
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_upload_closure_sees_frame_size() -> Result<(), Error> {
    let mut session = open_session()?;

    let mut check = |frame: &FrameView<'_>| -> Result<usize, Error> {
        if let Some(size) = frame.frame_size() {
            assert!(frame.data.len() >= size);
        }
        Ok(frame.data.len())
    };

    for _ in 0..5 {
        assert!(session.next_frame(&mut check)? > 0);
    }

    session.close()
}

#[test]
#[ignore = "requires a V4L2 capture device"]
#[serial]
fn test_hw_restart_and_reselect() -> Result<(), Error> {
    let mut session = open_session()?;

    session.start_streaming()?;
    session.next_frame(&mut HostCopy)?;
    assert!(matches!(session.select_format(0), Err(Error::State(_))));

    session.stop_streaming()?;
    for index in 0..session.formats().len().min(3) {
        session.select_format(index)?;
        let frame = session.next_frame(&mut HostCopy)?;
        assert_eq!(frame.width, session.width()?);
        session.stop_streaming()?;
    }

    session.close()?;
    assert!(matches!(session.width(), Err(Error::State(_))));

    Ok(())
}

#[test]
#[ignore = "requires a V4L2 capture device with DMA-BUF export"]
#[serial]
fn test_hw_export_dmabuf() -> Result<(), Error> {
    let mut session = open_session()?;
    session.start_streaming()?;

    let _buf = session.export_dmabuf(0)?;

    session.close()
}
