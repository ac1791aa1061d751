// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

use serde::Serialize;
use std::time::{Duration, Instant};

/// Largest forward sequence jump counted as drops; anything further is a restart
const MAX_SEQUENCE_GAP: u32 = u32::MAX / 2;

/// Capture performance collected over one run
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMetrics {
    /// Total number of frames pulled
    pub frames_captured: u64,
    /// Total payload bytes pulled
    pub bytes_captured: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Average throughput in frames per second
    pub throughput_fps: f64,
    /// Average bandwidth in megabits per second
    pub bandwidth_mbps: f64,
    /// Minimum pull latency in microseconds
    pub latency_min_us: u64,
    /// Maximum pull latency in microseconds
    pub latency_max_us: u64,
    /// Average pull latency in microseconds
    pub latency_avg_us: u64,
    /// 50th percentile (median) pull latency in microseconds
    pub latency_p50_us: u64,
    /// 95th percentile pull latency in microseconds
    pub latency_p95_us: u64,
    /// 99th percentile pull latency in microseconds
    pub latency_p99_us: u64,
    /// Frames the driver skipped, from gaps in the sequence counter
    pub dropped_frames: u64,
}

/// Collects per-pull latency, payload size and sequence gaps
pub struct MetricsCollector {
    start_time: Instant,
    latencies_us: Vec<u64>,
    bytes: u64,
    prev_sequence: Option<u32>,
    dropped_frames: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latencies_us: Vec::new(),
            bytes: 0,
            prev_sequence: None,
            dropped_frames: 0,
        }
    }

    /// Record one frame pull
    pub fn record_frame(&mut self, latency: Duration, bytes: usize) {
        self.latencies_us.push(latency.as_micros() as u64);
        self.bytes += bytes as u64;
    }

    /// Track the driver sequence number to detect drops
    /// Returns the number of frames skipped since the previous one
    pub fn track_sequence(&mut self, sequence: u32) -> u64 {
        let drops = match self.prev_sequence {
            Some(prev) => {
                let expected = prev.wrapping_add(1);
                let gap = sequence.wrapping_sub(expected);
                if gap <= MAX_SEQUENCE_GAP {
                    u64::from(gap)
                } else {
                    // Restarted stream, not a drop
                    log::warn!("Frame sequence decreased: {} -> {}", prev, sequence);
                    0
                }
            }
            None => 0,
        };

        self.dropped_frames += drops;
        self.prev_sequence = Some(sequence);
        drops
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> CaptureMetrics {
        let duration = self.start_time.elapsed();
        let duration_secs = duration.as_secs_f64();
        let frames_captured = self.latencies_us.len() as u64;

        let throughput_fps = if duration_secs > 0.0 {
            frames_captured as f64 / duration_secs
        } else {
            0.0
        };

        let bandwidth_mbps = if duration_secs > 0.0 {
            (self.bytes as f64 * 8.0) / (duration_secs * 1_000_000.0)
        } else {
            0.0
        };

        self.latencies_us.sort_unstable();
        let (min_us, max_us, avg_us) = match (self.latencies_us.first(), self.latencies_us.last())
        {
            (Some(&min), Some(&max)) => {
                let sum: u64 = self.latencies_us.iter().sum();
                (min, max, sum / frames_captured)
            }
            _ => (0, 0, 0),
        };

        CaptureMetrics {
            frames_captured,
            bytes_captured: self.bytes,
            duration_ms: duration.as_millis() as u64,
            throughput_fps,
            bandwidth_mbps,
            latency_min_us: min_us,
            latency_max_us: max_us,
            latency_avg_us: avg_us,
            latency_p50_us: self.percentile(50.0),
            latency_p95_us: self.percentile(95.0),
            latency_p99_us: self.percentile(99.0),
            dropped_frames: self.dropped_frames,
        }
    }

    /// Percentile of the latencies, which must already be sorted
    fn percentile(&self, p: f64) -> u64 {
        if self.latencies_us.is_empty() {
            return 0;
        }

        let len = self.latencies_us.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.latencies_us[idx.min(len - 1)]
    }

    /// Print metrics in human-readable format
    pub fn print_text(&mut self) {
        let metrics = self.finalize();
        println!("\n=== Capture Metrics ===");
        println!("Frames captured:   {}", metrics.frames_captured);
        println!(
            "Bytes captured:    {} ({:.2} MB)",
            metrics.bytes_captured,
            metrics.bytes_captured as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);
        println!("Bandwidth:         {:.2} Mbps", metrics.bandwidth_mbps);

        if metrics.frames_captured > 0 {
            println!("\nPull Latency (us):");
            println!("  Min:    {}", metrics.latency_min_us);
            println!("  Max:    {}", metrics.latency_max_us);
            println!("  Avg:    {}", metrics.latency_avg_us);
            println!("  P50:    {}", metrics.latency_p50_us);
            println!("  P95:    {}", metrics.latency_p95_us);
            println!("  P99:    {}", metrics.latency_p99_us);
        }

        if metrics.dropped_frames > 0 {
            let seen = metrics.frames_captured + metrics.dropped_frames;
            println!(
                "\nDropped frames:    {} ({:.2}%)",
                metrics.dropped_frames,
                (metrics.dropped_frames as f64 / seen as f64) * 100.0
            );
        }
    }

    /// Print metrics in JSON format
    pub fn print_json(&mut self) -> Result<(), serde_json::Error> {
        let metrics = self.finalize();
        let json = serde_json::to_string_pretty(&metrics)?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
