//! Dense bit packing of 16-bit samples into MSB-first byte streams.
//!
//! DNG strips store samples at their true bit depth. Each packer reads
//! 16-bit little-endian samples from the buffer in place and rewrites it as a
//! packed stream, shrinking the buffer to the exact packed size. Packed
//! output never outruns the unread input, so a single buffer suffices.
//!
//! Group granularities:
//!
//! | bits | samples per group | bytes per group |
//! |------|-------------------|-----------------|
//! | 2    | 4                 | 1               |
//! | 4    | 2                 | 1               |
//! | 6    | 4                 | 3               |
//! | 8    | 1                 | 1               |
//! | 10   | 4                 | 5               |
//! | 12   | 2                 | 3               |
//! | 14   | 4                 | 7               |
//!
//! Rows are packed independently; callers align row sample counts to the
//! group size. The interleaved-RGB variant is the same layout applied to the
//! row's total sample count (3 per pixel).

/// Round a bit count up to the nearest packable depth.
pub fn round_up_bits(bits: u16) -> u16 {
    match bits {
        0..=2 => 2,
        3..=4 => 4,
        5..=6 => 6,
        7..=8 => 8,
        9..=10 => 10,
        11..=12 => 12,
        13..=14 => 14,
        _ => 16,
    }
}

/// Samples per packing group for a given depth.
pub fn group_samples(bits: u16) -> usize {
    match bits {
        2 | 6 | 10 | 14 => 4,
        4 | 12 => 2,
        _ => 1,
    }
}

#[inline(always)]
fn sample(data: &[u8], idx: usize) -> u16 {
    u16::from_le_bytes([data[idx * 2], data[idx * 2 + 1]])
}

/// Pack a plane of 16-bit LE samples to `bits` per sample, in place.
///
/// `samples_per_row` must be a multiple of the group size for `bits`;
/// use `samples_per_row = width * 3` for interleaved RGB. A depth of 16
/// leaves the buffer untouched.
///
/// # Panics
///
/// Panics if `bits` is not one of {2,4,6,8,10,12,14,16} or the row length
/// does not meet the group alignment.
pub fn pack_plane(data: &mut Vec<u8>, samples_per_row: usize, rows: usize, bits: u16) {
    if bits == 16 {
        return;
    }

    let group = group_samples(bits);
    assert!(
        samples_per_row % group == 0,
        "row of {samples_per_row} samples not aligned to {bits}-bit group of {group}"
    );
    assert!(data.len() >= samples_per_row * rows * 2, "plane too short");

    let mut src = 0usize;
    let mut dst = 0usize;

    for _row in 0..rows {
        for _g in (0..samples_per_row).step_by(group) {
            match bits {
                2 => {
                    let s0 = sample(data, src);
                    let s1 = sample(data, src + 1);
                    let s2 = sample(data, src + 2);
                    let s3 = sample(data, src + 3);
                    data[dst] = (((s0 & 0x03) << 6)
                        | ((s1 & 0x03) << 4)
                        | ((s2 & 0x03) << 2)
                        | (s3 & 0x03)) as u8;
                    src += 4;
                    dst += 1;
                }
                4 => {
                    let s0 = sample(data, src);
                    let s1 = sample(data, src + 1);
                    data[dst] = (((s0 & 0x0f) << 4) | (s1 & 0x0f)) as u8;
                    src += 2;
                    dst += 1;
                }
                6 => {
                    let v0 = sample(data, src) & 0x3f;
                    let v1 = sample(data, src + 1) & 0x3f;
                    let v2 = sample(data, src + 2) & 0x3f;
                    let v3 = sample(data, src + 3) & 0x3f;
                    data[dst] = ((v0 << 2) | (v1 >> 4)) as u8;
                    data[dst + 1] = (((v1 & 0x0f) << 4) | (v2 >> 2)) as u8;
                    data[dst + 2] = (((v2 & 0x03) << 6) | v3) as u8;
                    src += 4;
                    dst += 3;
                }
                8 => {
                    data[dst] = (sample(data, src) & 0xff) as u8;
                    src += 1;
                    dst += 1;
                }
                10 => {
                    let s0 = sample(data, src);
                    let s1 = sample(data, src + 1);
                    let s2 = sample(data, src + 2);
                    let s3 = sample(data, src + 3);
                    data[dst] = (s0 >> 2) as u8;
                    data[dst + 1] = (((s0 & 0x03) << 6) | (s1 >> 4)) as u8;
                    data[dst + 2] = (((s1 & 0x0f) << 4) | (s2 >> 6)) as u8;
                    data[dst + 3] = (((s2 & 0x3f) << 2) | (s3 >> 8)) as u8;
                    data[dst + 4] = (s3 & 0xff) as u8;
                    src += 4;
                    dst += 5;
                }
                12 => {
                    let s0 = sample(data, src);
                    let s1 = sample(data, src + 1);
                    data[dst] = (s0 >> 4) as u8;
                    data[dst + 1] = (((s0 & 0x0f) << 4) | (s1 >> 8)) as u8;
                    data[dst + 2] = (s1 & 0xff) as u8;
                    src += 2;
                    dst += 3;
                }
                14 => {
                    let s0 = sample(data, src);
                    let s1 = sample(data, src + 1);
                    let s2 = sample(data, src + 2);
                    let s3 = sample(data, src + 3);
                    data[dst] = (s0 >> 6) as u8;
                    data[dst + 1] = (((s0 & 0x3f) << 2) | (s1 >> 12)) as u8;
                    data[dst + 2] = ((s1 >> 4) & 0xff) as u8;
                    data[dst + 3] = (((s1 & 0x0f) << 4) | (s2 >> 10)) as u8;
                    data[dst + 4] = ((s2 >> 2) & 0xff) as u8;
                    data[dst + 5] = (((s2 & 0x03) << 6) | (s3 >> 8)) as u8;
                    data[dst + 6] = (s3 & 0xff) as u8;
                    src += 4;
                    dst += 7;
                }
                _ => panic!("unsupported bit depth {bits}"),
            }
        }
    }

    data.truncate(dst);
}

/// Unpack a packed plane back to 16-bit samples. Inverse of [`pack_plane`].
pub fn unpack_plane(packed: &[u8], samples_per_row: usize, rows: usize, bits: u16) -> Vec<u16> {
    if bits == 16 {
        return packed
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
    }

    let group = group_samples(bits);
    assert!(samples_per_row % group == 0);

    let mut out = Vec::with_capacity(samples_per_row * rows);
    let mut src = 0usize;

    for _row in 0..rows {
        for _g in (0..samples_per_row).step_by(group) {
            match bits {
                2 => {
                    let b = packed[src] as u16;
                    out.extend_from_slice(&[(b >> 6) & 3, (b >> 4) & 3, (b >> 2) & 3, b & 3]);
                    src += 1;
                }
                4 => {
                    let b = packed[src] as u16;
                    out.extend_from_slice(&[(b >> 4) & 0x0f, b & 0x0f]);
                    src += 1;
                }
                6 => {
                    let b0 = packed[src] as u16;
                    let b1 = packed[src + 1] as u16;
                    let b2 = packed[src + 2] as u16;
                    out.extend_from_slice(&[
                        b0 >> 2,
                        ((b0 & 0x03) << 4) | (b1 >> 4),
                        ((b1 & 0x0f) << 2) | (b2 >> 6),
                        b2 & 0x3f,
                    ]);
                    src += 3;
                }
                8 => {
                    out.push(packed[src] as u16);
                    src += 1;
                }
                10 => {
                    let b: [u16; 5] = std::array::from_fn(|i| packed[src + i] as u16);
                    out.extend_from_slice(&[
                        (b[0] << 2) | (b[1] >> 6),
                        ((b[1] & 0x3f) << 4) | (b[2] >> 4),
                        ((b[2] & 0x0f) << 6) | (b[3] >> 2),
                        ((b[3] & 0x03) << 8) | b[4],
                    ]);
                    src += 5;
                }
                12 => {
                    let b0 = packed[src] as u16;
                    let b1 = packed[src + 1] as u16;
                    let b2 = packed[src + 2] as u16;
                    out.extend_from_slice(&[(b0 << 4) | (b1 >> 4), ((b1 & 0x0f) << 8) | b2]);
                    src += 3;
                }
                14 => {
                    let b: [u16; 7] = std::array::from_fn(|i| packed[src + i] as u16);
                    out.extend_from_slice(&[
                        (b[0] << 6) | (b[1] >> 2),
                        ((b[1] & 0x03) << 12) | (b[2] << 4) | (b[3] >> 4),
                        ((b[3] & 0x0f) << 10) | (b[4] << 2) | (b[5] >> 6),
                        ((b[5] & 0x3f) << 8) | b[6],
                    ]);
                    src += 7;
                }
                _ => panic!("unsupported bit depth {bits}"),
            }
        }
    }

    out
}

/// Exact packed byte length of a plane at the given depth.
pub fn packed_len(samples_per_row: usize, rows: usize, bits: u16) -> usize {
    samples_per_row * rows * bits as usize / 8
}
