//! Keyframed exposure compensation.
//!
//! Parses comma-separated `position:value` pairs (position normalized to
//! [0, 1], value in EV) and samples them with a cubic Hermite spline.
//! Tangents are chosen so interior extrema stay smooth while monotone runs
//! and endpoints keep their slope.

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Keyframe {
    position: f32,
    value: f32,
    derivative: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExposureKeyframes {
    keyframes: Vec<Keyframe>,
}

impl ExposureKeyframes {
    /// Parse a keyframe list like `"0:-2, 0.5:0, end:2"`. `start` and `end`
    /// alias positions 0 and 1. Malformed or out-of-range pairs are dropped
    /// with a warning; an empty result yields `None`.
    pub fn parse(input: &str) -> Option<ExposureKeyframes> {
        if input.is_empty() {
            return None;
        }

        let mut keyframes = Vec::new();

        for pair in input.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let Some((pos_str, val_str)) = pair.split_once(':') else {
                warn!("Invalid keyframe pair format: {pair}");
                continue;
            };

            let position = match pos_str.trim() {
                "start" => 0.0f32,
                "end" => 1.0f32,
                other => match other.parse::<f32>() {
                    Ok(p) => p,
                    Err(_) => {
                        warn!("Invalid keyframe position: {other}");
                        continue;
                    }
                },
            };

            if !(0.0..=1.0).contains(&position) {
                warn!("Keyframe position out of range [0,1]: {position}");
                continue;
            }

            let value = match val_str.trim().parse::<f32>() {
                Ok(v) => v,
                Err(_) => {
                    warn!("Invalid exposure value: {}", val_str.trim());
                    continue;
                }
            };

            keyframes.push(Keyframe {
                position,
                value,
                derivative: 0.0,
            });
        }

        if keyframes.is_empty() {
            return None;
        }

        keyframes.sort_by(|a, b| a.position.partial_cmp(&b.position).unwrap());
        compute_derivatives(&mut keyframes);

        info!("Parsed {} exposure keyframes", keyframes.len());
        for kf in &keyframes {
            debug!(
                "  keyframe: pos={:.3}, value={:.2}ev, deriv={:.2}",
                kf.position, kf.value, kf.derivative
            );
        }

        Some(ExposureKeyframes { keyframes })
    }

    /// Exposure in EV at a normalized position. Clamps outside the keyframe
    /// range; a single keyframe is a constant.
    pub fn value_at(&self, position: f32) -> f32 {
        let kfs = &self.keyframes;
        let position = position.clamp(0.0, 1.0);

        if kfs.len() == 1 || position <= kfs[0].position {
            return kfs[0].value;
        }
        if position >= kfs[kfs.len() - 1].position {
            return kfs[kfs.len() - 1].value;
        }

        for pair in kfs.windows(2) {
            let (k0, k1) = (pair[0], pair[1]);
            if position >= k0.position && position <= k1.position {
                let t = (position - k0.position) / (k1.position - k0.position);
                return hermite(t, k0, k1);
            }
        }

        kfs[kfs.len() - 1].value
    }

    /// Exposure at a frame of a sequence: frame 0 maps to position 0 and
    /// the last frame to position 1.
    pub fn value_at_frame(&self, frame_index: i64, total_frames: i64) -> f32 {
        if total_frames <= 1 {
            return self.value_at(0.0);
        }
        self.value_at(frame_index as f32 / (total_frames - 1) as f32)
    }
}

/// Tangent rules: endpoints take the neighbor slope, strictly monotone
/// interior points average their neighbor slopes, everything else (local
/// extrema) gets zero for a smooth turn.
fn compute_derivatives(kfs: &mut [Keyframe]) {
    let n = kfs.len();
    for i in 0..n {
        let kf = kfs[i];

        if kf.position == 0.0 && i + 1 < n {
            kfs[i].derivative =
                (kfs[i + 1].value - kf.value) / (kfs[i + 1].position - kf.position);
            continue;
        }

        if kf.position == 1.0 && i > 0 {
            kfs[i].derivative = (kf.value - kfs[i - 1].value) / (kf.position - kfs[i - 1].position);
            continue;
        }

        if i > 0 && i + 1 < n {
            let prev = kfs[i - 1];
            let next = kfs[i + 1];

            let increasing = prev.value < kf.value && kf.value < next.value;
            let decreasing = prev.value > kf.value && kf.value > next.value;

            if increasing || decreasing {
                let before = (kf.value - prev.value) / (kf.position - prev.position);
                let after = (next.value - kf.value) / (next.position - kf.position);
                kfs[i].derivative = (before + after) * 0.5;
            } else {
                kfs[i].derivative = 0.0;
            }
        } else {
            kfs[i].derivative = 0.0;
        }
    }
}

/// Cubic Hermite basis with tangents scaled by the segment length.
fn hermite(t: f32, k0: Keyframe, k1: Keyframe) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    let interval = k1.position - k0.position;
    let m0 = k0.derivative * interval;
    let m1 = k1.derivative * interval;

    h00 * k0.value + h10 * m0 + h01 * k1.value + h11 * m1
}
