//! DNG opcode lists, big-endian per the DNG specification.
//!
//! Only the GainMap opcode (id 9) is produced and understood: the writer
//! embeds the lens-shading surface so DNG readers can undo vignetting at
//! decode time, and the sequence ingest parses it back for reporting.

use tracing::debug;

use crate::ShadingMap;

pub const OPCODE_GAIN_MAP: u32 = 9;

/// Spatial placement and payload of one GainMap opcode.
#[derive(Debug, Clone, PartialEq)]
pub struct GainMapParams {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
    pub plane: u32,
    pub planes: u32,
    pub row_pitch: u32,
    pub col_pitch: u32,
    pub map_points_v: u32,
    pub map_points_h: u32,
    pub map_spacing_v: f64,
    pub map_spacing_h: f64,
    pub map_origin_v: f64,
    pub map_origin_h: f64,
    pub map_planes: u32,
    /// Plane-major, row-major gain samples.
    pub gains: Vec<f32>,
}

/// Build the GainMap parameters for a shading map applied to an
/// `image_width` x `image_height` area whose top-left sits at `(left, top)`
/// of the full sensor. Returns `None` for an empty map.
pub fn gain_map_from_shading(
    map: &ShadingMap,
    image_width: u32,
    image_height: u32,
    left: u32,
    top: u32,
) -> Option<GainMapParams> {
    if map.is_empty() || image_width == 0 || image_height == 0 {
        return None;
    }

    let points_v = map.height() as u32;
    let points_h = map.width() as u32;

    let row_pitch = if points_v > 1 {
        ((image_height - 1) / (points_v - 1)).max(1)
    } else {
        image_height
    };
    let col_pitch = if points_h > 1 {
        ((image_width - 1) / (points_h - 1)).max(1)
    } else {
        image_width
    };

    let mut gains = Vec::with_capacity((points_v * points_h * 4) as usize);
    for plane in 0..4 {
        for &g in map.channel(plane) {
            // Non-finite or non-positive gains would poison the decode
            let g = if !g.is_finite() || g <= 0.0 {
                1.0
            } else {
                g.min(16.0)
            };
            gains.push(g);
        }
    }

    Some(GainMapParams {
        top,
        left,
        bottom: top + image_height,
        right: left + image_width,
        plane: 0,
        planes: 4,
        row_pitch,
        col_pitch,
        map_points_v: points_v,
        map_points_h: points_h,
        map_spacing_v: row_pitch as f64 / image_height as f64,
        map_spacing_h: col_pitch as f64 / image_width as f64,
        map_origin_v: top as f64 / image_height as f64,
        map_origin_h: left as f64 / image_width as f64,
        map_planes: 4,
        gains,
    })
}

/// Serialize an opcode list holding the given gain maps.
pub fn serialize_opcode_list(maps: &[GainMapParams]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(maps.len() as u32).to_be_bytes());

    for map in maps {
        let mut params = Vec::new();
        for v in [
            map.top,
            map.left,
            map.bottom,
            map.right,
            map.plane,
            map.planes,
            map.row_pitch,
            map.col_pitch,
            map.map_points_v,
            map.map_points_h,
        ] {
            params.extend_from_slice(&v.to_be_bytes());
        }
        for v in [
            map.map_spacing_v,
            map.map_spacing_h,
            map.map_origin_v,
            map.map_origin_h,
        ] {
            params.extend_from_slice(&v.to_be_bytes());
        }
        params.extend_from_slice(&map.map_planes.to_be_bytes());
        for g in &map.gains {
            params.extend_from_slice(&g.to_be_bytes());
        }

        out.extend_from_slice(&OPCODE_GAIN_MAP.to_be_bytes());
        // Opcode version 1.3.0.0
        out.extend_from_slice(&[1, 3, 0, 0]);
        // Flags: none
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(params.len() as u32).to_be_bytes());
        out.extend_from_slice(&params);
    }

    out
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(
        data.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn be_f64(data: &[u8], offset: usize) -> Option<f64> {
    Some(f64::from_be_bytes(
        data.get(offset..offset + 8)?.try_into().ok()?,
    ))
}

/// Parse an opcode list and return the first GainMap found.
///
/// The outer walk advances by each opcode's declared parameter size, tracked
/// independently of the list's own length, so unknown opcodes are skipped
/// cleanly.
pub fn parse_gain_map(list: &[u8]) -> Option<GainMapParams> {
    let opcode_count = be_u32(list, 0)?;
    let mut offset = 4usize;

    for _ in 0..opcode_count {
        let opcode_id = be_u32(list, offset)?;
        let param_size = be_u32(list, offset + 12)? as usize;
        let params_start = offset + 16;

        if list.len() < params_start + param_size {
            debug!("Opcode {opcode_id} overruns its list, stopping scan");
            return None;
        }

        if opcode_id == OPCODE_GAIN_MAP {
            if let Some(map) = parse_gain_map_params(&list[params_start..params_start + param_size])
            {
                return Some(map);
            }
        }

        offset = params_start + param_size;
    }

    None
}

fn parse_gain_map_params(p: &[u8]) -> Option<GainMapParams> {
    // 10 u32 + 4 f64 + 1 u32 of fixed header before the samples
    const HEADER: usize = 10 * 4 + 4 * 8 + 4;
    if p.len() < HEADER {
        return None;
    }

    let fixed: Vec<u32> = (0..10).map(|i| be_u32(p, i * 4)).collect::<Option<_>>()?;
    let spacing_v = be_f64(p, 40)?;
    let spacing_h = be_f64(p, 48)?;
    let origin_v = be_f64(p, 56)?;
    let origin_h = be_f64(p, 64)?;
    let map_planes = be_u32(p, 72)?;

    let sample_count = fixed[8] as usize * fixed[9] as usize * map_planes as usize;
    if p.len() < HEADER + sample_count * 4 {
        return None;
    }

    let gains = (0..sample_count)
        .map(|i| {
            let off = HEADER + i * 4;
            f32::from_be_bytes(p[off..off + 4].try_into().unwrap())
        })
        .collect();

    Some(GainMapParams {
        top: fixed[0],
        left: fixed[1],
        bottom: fixed[2],
        right: fixed[3],
        plane: fixed[4],
        planes: fixed[5],
        row_pitch: fixed[6],
        col_pitch: fixed[7],
        map_points_v: fixed[8],
        map_points_h: fixed[9],
        map_spacing_v: spacing_v,
        map_spacing_h: spacing_h,
        map_origin_v: origin_v,
        map_origin_h: origin_h,
        map_planes,
        gains,
    })
}
