//! Constant-frame-rate time model.
//!
//! Mobile captures have variable cadence: frames stall, duplicate, or
//! arrive early. This module derives the recording's frame-rate statistics,
//! picks a CFR target, and maps every output slot to the source timestamp
//! that fills it, duplicating across stalls and dropping redundant frames.

use tracing::{debug, warn};

use crate::Timestamp;

/// Median and mean frame rates derived from capture timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateStats {
    pub median_fps: f32,
    pub average_fps: f32,
}

/// Derive frame-rate statistics from sorted capture timestamps. Zero or
/// negative intervals are ignored; fewer than two frames yield zeros.
pub fn frame_rate_stats(timestamps: &[Timestamp]) -> FrameRateStats {
    let mut intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .filter(|&d| d > 0.0)
        .collect();

    if intervals.is_empty() {
        return FrameRateStats {
            median_fps: 0.0,
            average_fps: 0.0,
        };
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;

    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    };

    FrameRateStats {
        median_fps: (1e9 / median) as f32,
        average_fps: (1e9 / mean) as f32,
    }
}

/// Snap a median rate to the nearest standard integer rate. Rates outside
/// the recognized bands pass through unchanged.
fn integer_band(m: f32) -> f32 {
    if m < 23.0 {
        m
    } else if m < 24.5 {
        24.0
    } else if m < 26.0 {
        25.0
    } else if m < 33.0 {
        30.0
    } else if m < 49.0 {
        48.0
    } else if m < 52.0 {
        50.0
    } else if m > 56.0 && m < 63.0 {
        60.0
    } else if m > 112.0 && m < 125.0 {
        120.0
    } else if m > 224.0 && m < 250.0 {
        240.0
    } else if m > 448.0 && m < 500.0 {
        480.0
    } else if m > 896.0 && m < 1000.0 {
        960.0
    } else {
        m
    }
}

/// Like [`integer_band`] with NTSC drop-frame rates substituted.
fn drop_frame_band(m: f32) -> f32 {
    match integer_band(m) {
        24.0 => 23.976,
        30.0 => 29.97,
        48.0 => 47.952,
        60.0 => 59.94,
        120.0 => 119.88,
        other => other,
    }
}

/// Pick the target rate for the given CFR option.
///
/// With conversion disabled, a literal target still wins if it parses;
/// otherwise the average rate is used and frames map one to one.
pub fn choose_target_fps(stats: FrameRateStats, cfr_target: &str, conversion: bool) -> f32 {
    if !conversion {
        return match cfr_target.parse::<f32>() {
            Ok(fps) if fps > 0.0 => fps,
            _ => stats.average_fps,
        };
    }

    match cfr_target {
        "Prefer Integer" => integer_band(stats.median_fps),
        "Prefer Drop Frame" => drop_frame_band(stats.median_fps),
        "Median (Slowmotion)" => stats.median_fps,
        "Average (Testing)" => stats.average_fps,
        other => match other.parse::<f32>() {
            Ok(fps) if fps > 0.0 => fps,
            _ => {
                warn!("Invalid CFR target '{other}', using median frame rate");
                stats.median_fps
            }
        },
    }
}

/// The complete output-slot mapping for a source.
#[derive(Debug, Clone)]
pub struct TimeMapping {
    pub fps: f32,
    pub median_fps: f32,
    pub average_fps: f32,
    /// `(output index, source timestamp)` pairs, ordered by index.
    pub entries: Vec<(i64, Timestamp)>,
    pub dropped: u32,
    pub duplicated: u32,
}

/// Build the CFR mapping for sorted source timestamps.
///
/// Each source frame lands on output slot `round((t - t0) * fps / 1e9)`.
/// A frame landing on the previous slot is dropped; a gap emits duplicate
/// slots referencing the frame that ends the stall. With conversion
/// disabled, slots are assigned consecutively in source order.
pub fn build_mapping(timestamps: &[Timestamp], cfr_target: &str, conversion: bool) -> TimeMapping {
    let stats = frame_rate_stats(timestamps);
    let fps = choose_target_fps(stats, cfr_target, conversion);

    let mut entries = Vec::with_capacity(timestamps.len());
    let mut dropped = 0u32;
    let mut duplicated = 0u32;

    if conversion && fps > 0.0 && !timestamps.is_empty() {
        let t0 = timestamps[0];
        let ns_per_frame = 1e9 / fps as f64;
        let mut last_emitted: i64 = -1;

        for &t in timestamps {
            let slot = (((t - t0) as f64) / ns_per_frame).round() as i64;

            if slot == last_emitted {
                dropped += 1;
                continue;
            }

            duplicated += (slot - last_emitted - 1).max(0) as u32;
            while last_emitted < slot {
                last_emitted += 1;
                entries.push((last_emitted, t));
            }
        }
    } else {
        for (i, &t) in timestamps.iter().enumerate() {
            entries.push((i as i64, t));
        }
    }

    debug!(
        fps,
        median = stats.median_fps,
        average = stats.average_fps,
        emitted = entries.len(),
        dropped,
        duplicated,
        "Built frame-time mapping"
    );

    TimeMapping {
        fps,
        median_fps: stats.median_fps,
        average_fps: stats.average_fps,
        entries,
        dropped,
        duplicated,
    }
}
