//! Per-frame pixel preprocessing.
//!
//! Takes a 16-bit source plane (Bayer CFA or interleaved RGB) and produces
//! the packed DNG strip plus its final levels: draft downscale, centered
//! crop, level remapping, lens-shading correction, logarithmic encoding with
//! triangular dithering, and bit-depth compaction.

use rayon::prelude::*;
use tracing::warn;

use crate::codec::bitpack;
use crate::codec::shading::ShadingMap;
use crate::error::RenderError;
use crate::metadata::{CameraConfig, FrameMetadata};


/// Source black/white level selection.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelMode {
    /// Per-frame dynamic levels from the frame metadata.
    Dynamic,
    /// Static levels from the camera configuration.
    Static,
    /// Explicit `white / black` override.
    Literal { white: f32, black: [f32; 4] },
}

impl LevelMode {
    /// Parse a levels override string: `"Dynamic"`, `"Static"`, `"W/B"` or
    /// `"W/B1,B2,B3,B4"`. Anything unparseable falls back to dynamic levels.
    pub fn parse(value: &str) -> LevelMode {
        match value {
            "" | "Dynamic" => return LevelMode::Dynamic,
            "Static" => return LevelMode::Static,
            _ => {}
        }

        let Some((white_str, black_str)) = value.split_once('/') else {
            warn!("Unrecognized levels override '{value}', using dynamic levels");
            return LevelMode::Dynamic;
        };

        let Ok(white) = white_str.trim().parse::<f32>() else {
            warn!("Bad white level in '{value}', using dynamic levels");
            return LevelMode::Dynamic;
        };

        let mut black = [0.0f32; 4];
        let tokens: Vec<&str> = black_str.split(',').collect();
        match tokens.len() {
            1 => match tokens[0].trim().parse::<f32>() {
                Ok(b) => black = [b; 4],
                Err(_) => {
                    warn!("Bad black level in '{value}', using dynamic levels");
                    return LevelMode::Dynamic;
                }
            },
            4 => {
                for (i, token) in tokens.iter().enumerate() {
                    match token.trim().parse::<f32>() {
                        Ok(b) => black[i] = b,
                        Err(_) => {
                            warn!("Bad black level in '{value}', using dynamic levels");
                            return LevelMode::Dynamic;
                        }
                    }
                }
            }
            _ => {
                warn!("Expected 1 or 4 black levels in '{value}', using dynamic levels");
                return LevelMode::Dynamic;
            }
        }

        LevelMode::Literal { white, black }
    }
}

/// Logarithmic tone-curve mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    None,
    /// Log-encode without shrinking the stored range.
    KeepInput,
    /// Log-encode and drop N bits from the stored range.
    ReduceBy(u8),
}

impl LogMode {
    pub fn parse(value: &str) -> LogMode {
        match value {
            "" => LogMode::None,
            "Keep Input" => LogMode::KeepInput,
            "Reduce by 2bit" => LogMode::ReduceBy(2),
            "Reduce by 4bit" => LogMode::ReduceBy(4),
            "Reduce by 6bit" => LogMode::ReduceBy(6),
            "Reduce by 8bit" => LogMode::ReduceBy(8),
            other => {
                warn!("Unrecognized log transform '{other}', log disabled");
                LogMode::None
            }
        }
    }

    pub fn is_active(&self) -> bool {
        *self != LogMode::None
    }
}

/// Knobs derived from the render configuration.
#[derive(Debug, Clone)]
pub struct PreprocessParams {
    /// Draft downscale factor; values above 1 are floored to even.
    pub scale: u32,
    /// Centered crop `WxH`, empty for none.
    pub crop_target: String,
    pub levels: LevelMode,
    pub log_mode: LogMode,
    pub apply_shading: bool,
    pub color_only_shading: bool,
    pub normalize_shading: bool,
    pub debug_shading: bool,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        PreprocessParams {
            scale: 1,
            crop_target: String::new(),
            levels: LevelMode::Dynamic,
            log_mode: LogMode::None,
            apply_shading: false,
            color_only_shading: false,
            normalize_shading: false,
            debug_shading: false,
        }
    }
}

/// Result of preprocessing: the packed strip and the levels that describe it.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// Packed sample data, `bits_per_sample` bits per sample, MSB first.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    pub black_level: [u16; 4],
    pub white_level: u16,
    /// Packed storage depth, one of {2,4,6,8,10,12,14,16}.
    pub bits_per_sample: u16,
    /// Stored-code -> linear-code table, present for log-encoded output.
    pub linearization: Option<Vec<u16>>,
    /// True when the shading map was multiplied into the pixels.
    pub shading_baked: bool,
    /// Offset of the rendered area within the (equally scaled) full sensor
    /// frame, for gain-map placement.
    pub sensor_left: u32,
    pub sensor_top: u32,
}

/// Number of bits needed to represent `value`.
pub fn bits_needed(value: u16) -> u16 {
    if value == 0 {
        1
    } else {
        16 - value.leading_zeros() as u16
    }
}

#[derive(Debug, Clone, Copy)]
struct BitBudget {
    used_bits: u16,
    dst_white: f32,
    zero_black: bool,
    emit_table: bool,
}

/// Resolve the output bit budget for the active mode combination.
fn bit_budget(params: &PreprocessParams, src_white: f32) -> BitBudget {
    let b0 = bits_needed(src_white.round().clamp(0.0, 65535.0) as u16);
    let log = params.log_mode;

    let clamp_bits = |bits: i32| bits.clamp(1, 16) as u16;

    if params.apply_shading {
        let used_bits = if params.normalize_shading {
            clamp_bits(b0 as i32 + 4)
        } else if params.debug_shading {
            clamp_bits(b0 as i32 + 2)
        } else {
            match log {
                LogMode::ReduceBy(n) => clamp_bits(b0 as i32 - n as i32),
                _ => clamp_bits(b0 as i32 + 2),
            }
        };

        BitBudget {
            used_bits,
            dst_white: (1u32 << used_bits) as f32 - 1.0,
            zero_black: true,
            emit_table: log.is_active() && !params.debug_shading,
        }
    } else {
        match log {
            LogMode::None => BitBudget {
                used_bits: b0,
                dst_white: src_white,
                zero_black: false,
                emit_table: false,
            },
            // Log-encoded into the unchanged source range; readers that want
            // linear data must be told separately, so no table here.
            LogMode::KeepInput => BitBudget {
                used_bits: b0,
                dst_white: src_white,
                zero_black: true,
                emit_table: false,
            },
            LogMode::ReduceBy(n) => {
                let used_bits = clamp_bits(b0 as i32 - n as i32);
                BitBudget {
                    used_bits,
                    dst_white: (1u32 << used_bits) as f32 - 1.0,
                    zero_black: true,
                    emit_table: true,
                }
            }
        }
    }
}

/// Triangular dither in [-0.5, +0.5], deterministic in the block position
/// and the sample's index within it.
#[inline(always)]
fn triangular_dither(x: u32, y: u32, i: u32) -> f32 {
    let mut seed = (x.wrapping_add(i & 1))
        .wrapping_mul(1664525)
        .wrapping_add((y.wrapping_add(i >> 1)).wrapping_mul(1013904223))
        ^ 0xdead_beef;
    seed ^= seed >> 16;
    seed = seed.wrapping_mul(0x85eb_ca6b);
    seed ^= seed >> 13;
    seed = seed.wrapping_mul(0xc2b2_ae35);
    seed ^= seed >> 16;

    let r1 = (seed & 0xffff) as f32 / 65535.0;
    let r2 = ((seed >> 16) & 0xffff) as f32 / 65535.0;

    (r1 + r2 - 1.0) * 0.5
}

const LOG_GAIN: f32 = 60.0;

#[inline(always)]
fn log_curve(u: f32) -> f32 {
    (1.0 + LOG_GAIN * u.max(0.0)).log2() / (1.0 + LOG_GAIN).log2()
}

/// Stored-code -> linear 16-bit code table inverting [`log_curve`].
fn linearization_table(dst_white: u16) -> Vec<u16> {
    let size = dst_white as usize + 1;
    let last = size - 1;

    (0..size)
        .map(|i| {
            if i == 0 {
                0
            } else if i == last {
                65535
            } else {
                let norm = i as f32 / dst_white as f32;
                let linear = ((2.0f32.powf(norm * (1.0 + LOG_GAIN).log2()) - 1.0) / LOG_GAIN)
                    .clamp(0.0, 1.0);
                (linear * 65535.0).round() as u16
            }
        })
        .collect()
}

fn parse_crop(crop_target: &str) -> Option<(u32, u32)> {
    let (w, h) = crop_target.split_once('x')?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    Some((w, h))
}

struct Transform {
    src_black: [f32; 4],
    linear: [f32; 4],
    dst_black: [f32; 4],
    dst_white: f32,
    log_active: bool,
    debug: bool,
}

impl Transform {
    /// Map one source sample to its output code. `gain` is the shading gain
    /// at the sample's sensor position, `c` the CFA channel index, `(bx, by,
    /// i)` the dither seed coordinates.
    #[inline(always)]
    fn apply(&self, s: f32, gain: f32, c: usize, bx: u32, by: u32, i: u32) -> u16 {
        let p = if self.debug {
            gain.max(0.0) * (self.dst_white - self.dst_black[c])
        } else {
            let u = self.linear[c] * (s - self.src_black[c]) * gain;
            if self.log_active {
                log_curve(u) * self.dst_white + triangular_dither(bx, by, i)
            } else {
                u.max(0.0) * (self.dst_white - self.dst_black[c])
            }
        };

        (p + self.dst_black[c]).round().clamp(0.0, self.dst_white) as u16
    }
}

/// Preprocess a Bayer CFA plane. See the module docs for the pipeline.
pub fn preprocess_bayer(
    src: &[u16],
    width: u32,
    height: u32,
    metadata: &FrameMetadata,
    camera: &CameraConfig,
    params: &PreprocessParams,
) -> Result<PreprocessOutput, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    let expected = (width as usize) * (height as usize);
    if src.len() < expected {
        return Err(RenderError::ShortPlane {
            expected,
            actual: src.len(),
        });
    }

    let scale = if params.scale > 1 {
        (params.scale / 2) * 2
    } else {
        1
    };
    let quad = metadata.needs_remosaic;

    // Centered crop; oversized or malformed targets disable cropping
    let crop = parse_crop(&params.crop_target)
        .filter(|&(cw, ch)| cw > 0 && ch > 0 && cw <= width && ch <= height);

    let (base_w, base_h) = crop.unwrap_or((width, height));
    let new_w = (base_w / scale) / 4 * 4;
    let new_h = (base_h / scale) / 4 * 4;
    if new_w == 0 || new_h == 0 {
        return Err(RenderError::InvalidDimensions {
            width: new_w,
            height: new_h,
        });
    }

    // Source levels
    let (mut src_white, mut src_black) = match &params.levels {
        LevelMode::Dynamic => (metadata.dynamic_white_level, metadata.dynamic_black_level),
        LevelMode::Static => (camera.white_level, camera.black_level),
        LevelMode::Literal { white, black } => (*white, *black),
    };

    // Binning a quad group sums four photosites
    if quad && scale == 2 {
        src_white *= 4.0;
        for b in &mut src_black {
            *b *= 4.0;
        }
    }

    let budget = bit_budget(params, src_white);

    // Shading map, mutated per the active options
    let shading = if params.apply_shading {
        metadata.shading_map.clone().map(|mut map| {
            if params.color_only_shading {
                map.color_only();
            }
            if params.normalize_shading {
                map.normalize();
            } else if params.debug_shading {
                map.invert();
            }
            map
        })
    } else {
        None
    };

    // Vignette coordinates reference the uncropped sensor frame
    let full_w = metadata.original_width.max(width);
    let full_h = metadata.original_height.max(height);
    let (left, top) = match crop {
        Some((cw, ch)) => ((full_w - cw) / 2, (full_h - ch) / 2),
        None => ((full_w - width) / 2, (full_h - height) / 2),
    };
    let inv_full_w = 1.0 / full_w as f32;
    let inv_full_h = 1.0 / full_h as f32;

    let transform = Transform {
        src_black,
        linear: std::array::from_fn(|i| 1.0 / (src_white - src_black[i])),
        dst_black: if budget.zero_black { [0.0; 4] } else { src_black },
        dst_white: budget.dst_white,
        log_active: params.log_mode.is_active() && !params.debug_shading,
        debug: params.debug_shading,
    };

    let gain_at = |sx: u32, sy: u32, c: usize| -> f32 {
        match &shading {
            Some(map) => map.sample(
                (sx + left) as f32 * inv_full_w,
                (sy + top) as f32 * inv_full_h,
                c,
            ),
            None => 1.0,
        }
    };

    let src_w = width as usize;
    let mut dst = vec![0u16; new_w as usize * new_h as usize];
    let row = new_w as usize;

    if quad && scale == 1 {
        // Full-resolution quad Bayer: 4x4 blocks, each sample keeps its
        // position and takes levels/gain from its quad cell
        dst.par_chunks_mut(4 * row)
            .enumerate()
            .for_each(|(band, out)| {
                let y = band as u32 * 4;
                for x in (0..new_w).step_by(4) {
                    for py in 0..4u32 {
                        for px in 0..4u32 {
                            let qi = ((py / 2) * 2 + px / 2) as usize;
                            let sx = x + px;
                            let sy = y + py;
                            let s = src[sy as usize * src_w + sx as usize] as f32;
                            let g = gain_at(sx, sy, qi);
                            let i = py * 4 + px;
                            out[(py as usize) * row + sx as usize] =
                                transform.apply(s, g, qi, x, y, i);
                        }
                    }
                }
            });
    } else {
        // 2x2 Bayer blocks; quad sources either bin (scale 2) or subsample
        // the same-color photosite (larger scales)
        let step = if quad { 2usize } else { 1usize };
        dst.par_chunks_mut(2 * row)
            .enumerate()
            .for_each(|(band, out)| {
                let y = band as u32 * 2;
                for x in (0..new_w).step_by(2) {
                    let sx = (x * scale) as usize;
                    let sy = (y * scale) as usize;

                    let mut s = [0.0f32; 4];
                    if quad && scale == 2 {
                        for k in 0..4 {
                            let ox = sx + (k & 1) * 2;
                            let oy = sy + (k >> 1) * 2;
                            s[k] = (src[oy * src_w + ox] as f32)
                                + (src[oy * src_w + ox + 1] as f32)
                                + (src[(oy + 1) * src_w + ox] as f32)
                                + (src[(oy + 1) * src_w + ox + 1] as f32);
                        }
                    } else {
                        s[0] = src[sy * src_w + sx] as f32;
                        s[1] = src[sy * src_w + sx + step] as f32;
                        s[2] = src[(sy + step) * src_w + sx] as f32;
                        s[3] = src[(sy + step) * src_w + sx + step] as f32;
                    }

                    for (k, &sample) in s.iter().enumerate() {
                        let off_x = (k as u32 & 1) * scale;
                        let off_y = (k as u32 >> 1) * scale;
                        let g = gain_at(x * scale + off_x, y * scale + off_y, k);
                        let out_idx = (k >> 1) * row + x as usize + (k & 1);
                        out[out_idx] = transform.apply(sample, g, k, x, y, k as u32);
                    }
                }
            });
    }

    let mut out = finish(dst, new_w, new_h, 1, &transform, &budget, shading.is_some())?;
    out.sensor_left = left / scale;
    out.sensor_top = top / scale;
    Ok(out)
}

/// Preprocess an already-linear full-range plane (decoded video): levels are
/// fixed at 0/65535, no shading or geometry changes, just the log curve and
/// packing. `channels` is 3 for interleaved RGB or 1 for a remosaiced plane.
pub fn preprocess_linear(
    src: &[u16],
    width: u32,
    height: u32,
    channels: u16,
    params: &PreprocessParams,
) -> Result<PreprocessOutput, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize * channels as usize;
    if src.len() < expected {
        return Err(RenderError::ShortPlane {
            expected,
            actual: src.len(),
        });
    }

    let new_w = width / 4 * 4;
    if new_w == 0 {
        return Err(RenderError::InvalidDimensions {
            width: new_w,
            height,
        });
    }

    let linear_params = PreprocessParams {
        apply_shading: false,
        normalize_shading: false,
        debug_shading: false,
        color_only_shading: false,
        ..params.clone()
    };
    let budget = bit_budget(&linear_params, 65535.0);
    // Full-range linear input always gets its inverse table when log-encoded
    let budget = BitBudget {
        emit_table: params.log_mode.is_active(),
        ..budget
    };

    let transform = Transform {
        src_black: [0.0; 4],
        linear: [1.0 / 65535.0; 4],
        dst_black: [0.0; 4],
        dst_white: budget.dst_white,
        log_active: params.log_mode.is_active(),
        debug: false,
    };

    let src_row = width as usize * channels as usize;
    let dst_row = new_w as usize * channels as usize;
    let mut dst = vec![0u16; dst_row * height as usize];

    dst.par_chunks_mut(dst_row)
        .enumerate()
        .for_each(|(y, out)| {
            let src_row_data = &src[y * src_row..][..src_row];
            for x in 0..new_w as usize {
                for c in 0..channels as usize {
                    let i = x * channels as usize + c;
                    out[i] = transform.apply(
                        src_row_data[i] as f32,
                        1.0,
                        c,
                        x as u32,
                        y as u32,
                        c as u32,
                    );
                }
            }
        });

    finish(dst, new_w, height, channels, &transform, &budget, false)
}

fn finish(
    plane: Vec<u16>,
    width: u32,
    height: u32,
    channels: u16,
    transform: &Transform,
    budget: &BitBudget,
    shading_baked: bool,
) -> Result<PreprocessOutput, RenderError> {
    let bits = bitpack::round_up_bits(budget.used_bits);

    let mut data: Vec<u8> = bytemuck::cast_slice(&plane).to_vec();
    bitpack::pack_plane(
        &mut data,
        width as usize * channels as usize,
        height as usize,
        bits,
    );

    let white_level = budget.dst_white.round().clamp(0.0, 65535.0) as u16;
    let linearization = if budget.emit_table {
        Some(linearization_table(white_level))
    } else {
        None
    };

    Ok(PreprocessOutput {
        data,
        width,
        height,
        samples_per_pixel: channels,
        black_level: std::array::from_fn(|i| {
            transform.dst_black[i].round().clamp(0.0, 65535.0) as u16
        }),
        white_level,
        bits_per_sample: bits,
        linearization,
        shading_baked,
        sensor_left: 0,
        sensor_top: 0,
    })
}
