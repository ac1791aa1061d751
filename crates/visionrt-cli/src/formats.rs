// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

//! Capability report and numbered list of selectable capture formats.

use crate::error::CliError;
use clap::Args as ClapArgs;
use serde::Serialize;
use visionrt::camera::{create_camera, CameraFormat};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Camera device path (defaults to $VISIONRT_DEVICE or /dev/video0)
    #[arg(short, long)]
    device: Option<String>,
}

#[derive(Debug, Serialize)]
struct FormatsOutput {
    device: String,
    card: String,
    driver: String,
    bus: String,
    version: String,
    capture: bool,
    streaming: bool,
    ext_pix_format: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    best: Option<usize>,
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Serialize)]
struct FormatInfo {
    index: usize,
    fourcc: String,
    description: String,
    width: u32,
    height: u32,
    fps: f64,
    interval: String,
}

impl FormatInfo {
    fn new(index: usize, format: &CameraFormat) -> Self {
        FormatInfo {
            index,
            fourcc: format.pixelformat.to_string(),
            description: format.description.clone(),
            width: format.width,
            height: format.height,
            fps: format.fps,
            interval: format.interval.to_string(),
        }
    }
}

/// Render a `KERNEL_VERSION` encoded driver version
fn kernel_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing formats command: {:?}", args);

    let mut camera = create_camera();
    if let Some(device) = &args.device {
        camera = camera.with_device(device);
    }
    let device = camera.device().to_owned();

    let session = camera.open()?;
    let caps = session.capabilities();

    let output = FormatsOutput {
        device,
        card: caps.card.clone(),
        driver: caps.driver.clone(),
        bus: caps.bus_info.clone(),
        version: kernel_version(caps.version),
        capture: caps.supports_capture,
        streaming: caps.supports_streaming,
        ext_pix_format: caps.supports_ext_pix_format,
        best: session.best_index(),
        formats: session
            .formats()
            .iter()
            .enumerate()
            .map(|(index, format)| FormatInfo::new(index, format))
            .collect(),
    };

    if json {
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("JSON serialization failed: {}", e)))?;
        println!("{}", text);
    } else {
        print_text(&output);
    }

    Ok(())
}

fn print_text(output: &FormatsOutput) {
    println!("{}: {}", output.device, output.card);
    println!("  Driver:    {} {}", output.driver, output.version);
    println!("  Bus:       {}", output.bus);
    println!(
        "  Capture: {}  Streaming: {}  Ext pix format: {}",
        yes_no(output.capture),
        yes_no(output.streaming),
        yes_no(output.ext_pix_format)
    );

    if output.formats.is_empty() {
        println!("\nNo uncompressed discrete formats found.");
        return;
    }

    println!("\nFormats:");
    for format in &output.formats {
        let marker = if output.best == Some(format.index) {
            "*"
        } else {
            " "
        };
        println!(
            " {}[{:>2}] {} {:>4}x{:<4} {:>7.2} fps  ({})",
            marker,
            format.index,
            format.fourcc,
            format.width,
            format.height,
            format.fps,
            format.description
        );
    }
    println!("\n* best scoring format, selected by default");
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
