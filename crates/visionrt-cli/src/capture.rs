// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

use crate::error::CliError;
use crate::metrics::MetricsCollector;
use crate::utils;
use clap::Args as ClapArgs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;
use visionrt::camera::{create_camera, CameraFormat, CaptureSession};
use visionrt::frame::FrameView;
use visionrt::score::Scoring;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Camera device path (defaults to $VISIONRT_DEVICE or /dev/video0)
    #[arg(short, long)]
    device: Option<String>,

    /// Format index as listed by `visionrt formats` (default: best scoring)
    #[arg(short = 'f', long = "format", conflicts_with_all = ["resolution", "fourcc"])]
    format_index: Option<usize>,

    /// Restrict the automatic choice to this resolution (WxH)
    #[arg(short, long)]
    resolution: Option<String>,

    /// Restrict the automatic choice to this pixel format (e.g. YUYV)
    #[arg(long)]
    fourcc: Option<String>,

    /// Number of frames to capture (0 = until Ctrl+C)
    #[arg(short = 'n', long, default_value = "100")]
    frames: u64,

    /// Number of buffers to request from the driver
    #[arg(short, long, default_value = "3")]
    buffers: u32,

    /// Print capture metrics when done
    #[arg(long)]
    metrics: bool,

    /// Append every raw frame to this file
    #[arg(long)]
    dump: Option<PathBuf>,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Capture parameters: {:?}", args);

    let mut camera = create_camera().with_buffers(args.buffers);
    if let Some(device) = &args.device {
        camera = camera.with_device(device);
    }

    log::info!("Opening camera: {}", camera.device());
    let mut session = camera.open()?;

    let index = choose_format(&session, &args)?;
    if session.current_index() != Some(index) {
        session.select_format(index)?;
    }
    log::info!("Capturing {}", session);

    let mut dump = match &args.dump {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                CliError::InvalidArgs(format!("Cannot create {}: {}", path.display(), e))
            })?;
            log::info!("Writing raw frames to {}", path.display());
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let term = utils::install_signal_handler()?;
    let mut collector = MetricsCollector::new();

    // Frames go straight from the mapped buffer into the dump file
    let mut sink = |frame: &FrameView<'_>| -> visionrt::Result<(u32, usize)> {
        if let Some(writer) = dump.as_mut() {
            writer.write_all(frame.data).map_err(visionrt::Error::upload)?;
        }
        Ok((frame.sequence, frame.data.len()))
    };

    let mut captured = 0u64;
    while !term.load(Ordering::Relaxed) && (args.frames == 0 || captured < args.frames) {
        let start = Instant::now();
        let (sequence, bytes) = session.next_frame(&mut sink)?;
        collector.record_frame(start.elapsed(), bytes);

        let dropped = collector.track_sequence(sequence);
        if dropped > 0 {
            log::debug!("Driver dropped {} frames before {}", dropped, sequence);
        }

        captured += 1;
        log::trace!("Frame {} ({} bytes)", sequence, bytes);
    }

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping capture");
    }

    session.close()?;
    if let Some(mut writer) = dump {
        writer.flush()?;
    }

    if args.metrics {
        if json {
            collector
                .print_json()
                .map_err(|e| CliError::General(format!("JSON serialization failed: {}", e)))?;
        } else {
            collector.print_text();
        }
    } else {
        log::info!("Captured {} frames", captured);
    }

    Ok(())
}

/// Resolve the format to capture with from the command line
fn choose_format(session: &CaptureSession, args: &Args) -> Result<usize, CliError> {
    if let Some(index) = args.format_index {
        let len = session.formats().len();
        if index >= len {
            return Err(CliError::InvalidArgs(format!(
                "Format index {} out of range ({} formats)",
                index, len
            )));
        }
        return Ok(index);
    }

    let resolution = args
        .resolution
        .as_deref()
        .map(utils::parse_resolution)
        .transpose()?;
    let fourcc = args.fourcc.as_deref().map(utils::parse_fourcc).transpose()?;

    let matches = |format: &CameraFormat| {
        resolution.map_or(true, |(w, h)| (format.width, format.height) == (w, h))
            && fourcc.map_or(true, |f| format.pixelformat == f)
    };

    let candidates: Vec<usize> = session
        .formats()
        .iter()
        .enumerate()
        .filter(|(_, format)| matches(format))
        .map(|(index, _)| index)
        .collect();

    let best = Scoring::default().best_candidate(candidates.iter().map(|&index| {
        let format = &session.formats()[index];
        (format.fps, format.width, format.height)
    }));

    best.map(|position| candidates[position]).ok_or_else(|| {
        CliError::Unsupported(format!(
            "No capture format matches{}{}",
            args.resolution
                .as_deref()
                .map(|r| format!(" resolution {}", r))
                .unwrap_or_default(),
            args.fourcc
                .as_deref()
                .map(|f| format!(" fourcc {}", f))
                .unwrap_or_default()
        ))
    })
}
