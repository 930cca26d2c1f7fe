//! Decoded-video plane conversion: limited-range YCbCr to full-range
//! 16-bit RGB with Rec.2020 coefficients, plus the inverse HLG OECF for
//! HDR sources.

use rayon::prelude::*;

use crate::error::RenderError;

/// Pixel formats the log-video path understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
    Yuv420p10le,
    Yuv422p10le,
}

impl PixelFormat {
    pub fn parse(value: &str) -> Option<PixelFormat> {
        match value {
            "yuv420p" => Some(PixelFormat::Yuv420p),
            "yuv420p10le" => Some(PixelFormat::Yuv420p10le),
            "yuv422p10le" => Some(PixelFormat::Yuv422p10le),
            _ => None,
        }
    }

    pub fn bit_depth(&self) -> u32 {
        match self {
            PixelFormat::Yuv420p => 8,
            PixelFormat::Yuv420p10le | PixelFormat::Yuv422p10le => 10,
        }
    }

    fn chroma_height_div(&self) -> usize {
        match self {
            PixelFormat::Yuv422p10le => 1,
            _ => 2,
        }
    }
}

/// Borrowed planar YUV frame. Strides are in bytes; 10-bit formats store
/// each sample as two little-endian bytes.
#[derive(Debug)]
pub struct YuvPlanes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub u_stride: usize,
    pub v_stride: usize,
}

// Rec.2020 luma coefficients
const KR: f64 = 0.2627;
const KB: f64 = 0.0593;
const KG: f64 = 1.0 - KR - KB;

#[inline(always)]
fn read_sample(plane: &[u8], stride: usize, x: usize, y: usize, ten_bit: bool) -> f64 {
    if ten_bit {
        let off = y * stride + x * 2;
        u16::from_le_bytes([plane[off], plane[off + 1]]) as f64
    } else {
        plane[y * stride + x] as f64
    }
}

/// Convert limited-range planar YCbCr to full-range interleaved RGB16.
pub fn yuv_to_rgb16(
    planes: &YuvPlanes,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u16>, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }

    let w = width as usize;
    let h = height as usize;
    let ten_bit = format.bit_depth() == 10;
    let bytes_per_sample = if ten_bit { 2 } else { 1 };
    let chroma_h_div = format.chroma_height_div();

    let check_plane = |plane: &[u8], stride: usize, cols: usize, rows: usize| {
        if plane.len() < stride * (rows - 1) + cols * bytes_per_sample {
            Err(RenderError::ShortPlane {
                expected: stride * rows,
                actual: plane.len(),
            })
        } else {
            Ok(())
        }
    };
    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(chroma_h_div);
    check_plane(planes.y, planes.y_stride, w, h)?;
    check_plane(planes.u, planes.u_stride, chroma_w, chroma_h)?;
    check_plane(planes.v, planes.v_stride, chroma_w, chroma_h)?;

    let max_input = ((1u32 << format.bit_depth()) - 1) as f64;

    // Limited-range bounds, scaled up from their 8-bit definitions
    let y_min = 16.0 * (max_input / 255.0);
    let y_max = 235.0 * (max_input / 255.0);
    let c_min = 16.0 * (max_input / 255.0);
    let c_max = 240.0 * (max_input / 255.0);

    let mut rgb = vec![0u16; w * h * 3];

    rgb.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
        let chroma_y = y / chroma_h_div;
        for x in 0..w {
            let chroma_x = x / 2;

            let yv = read_sample(planes.y, planes.y_stride, x, y, ten_bit);
            let uv = read_sample(planes.u, planes.u_stride, chroma_x, chroma_y, ten_bit);
            let vv = read_sample(planes.v, planes.v_stride, chroma_x, chroma_y, ten_bit);

            let y_norm = ((yv - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
            let u_norm = (uv - c_min) / (c_max - c_min) - 0.5;
            let v_norm = (vv - c_min) / (c_max - c_min) - 0.5;

            let r = y_norm + 2.0 * (1.0 - KR) * v_norm;
            let g = y_norm
                - 2.0 * KB * (1.0 - KB) / KG * u_norm
                - 2.0 * KR * (1.0 - KR) / KG * v_norm;
            let b = y_norm + 2.0 * (1.0 - KB) * u_norm;

            let idx = x * 3;
            row[idx] = (r.clamp(0.0, 1.0) * 65535.0 + 0.5) as u16;
            row[idx + 1] = (g.clamp(0.0, 1.0) * 65535.0 + 0.5) as u16;
            row[idx + 2] = (b.clamp(0.0, 1.0) * 65535.0 + 0.5) as u16;
        }
    });

    Ok(rgb)
}

/// Inverse HLG OECF applied in place: signals at or below 0.5 follow the
/// square-law segment `x^2 / 3`, the rest the exponential segment.
pub fn hlg_to_linear(rgb: &mut [u16]) {
    const A: f32 = 0.178_832_77;
    const B: f32 = 0.284_668_92;
    const C: f32 = 0.559_910_73;

    rgb.par_iter_mut().for_each(|sample| {
        let normalized = *sample as f32 / 65535.0;

        let linear = if normalized <= 0.5 {
            normalized * normalized / 3.0
        } else {
            (((normalized - C) / A).exp() + B) / 12.0
        };

        *sample = (linear * 65535.0).clamp(0.0, 65535.0) as u16;
    });
}
