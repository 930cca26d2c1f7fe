//! RGB to Bayer remosaic.
//!
//! Collapses an interleaved RGB plane back into a single-channel CFA mosaic:
//! each output position keeps the channel its CFA phase dictates, taken from
//! the RGB pixel at the same position.

use crate::codec::CfaPattern;

pub fn remosaic_rgb_to_bayer(rgb: &[u16], width: usize, height: usize, phase: CfaPattern) -> Vec<u16> {
    assert!(
        rgb.len() >= width * height * 3,
        "RGB plane too short: {} < {}",
        rgb.len(),
        width * height * 3
    );

    let mut bayer = vec![0u16; width * height];

    for y in 0..height {
        for x in 0..width {
            let channel = phase.color_at(x, y) as usize;
            bayer[y * width + x] = rgb[(y * width + x) * 3 + channel];
        }
    }

    bayer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_plane(width: usize, height: usize, r: impl Fn(usize, usize) -> u16) -> Vec<u16> {
        let mut rgb = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                rgb.push(r(x, y));
                rgb.push(0);
                rgb.push(0);
            }
        }
        rgb
    }

    #[test]
    fn test_red_lands_on_red_positions_rggb() {
        // R ramp 0..15 over a 4x4 plane, G=B=0
        let rgb = rgb_plane(4, 4, |x, y| (y * 4 + x) as u16);
        let bayer = remosaic_rgb_to_bayer(&rgb, 4, 4, CfaPattern::Rggb);

        // Red positions (even x, even y) carry the red ramp value
        for &(x, y) in &[(0usize, 0usize), (2, 0), (0, 2), (2, 2)] {
            assert_eq!(bayer[y * 4 + x], (y * 4 + x) as u16, "red at ({x},{y})");
        }
        // Green and blue positions are zero
        for &(x, y) in &[(1usize, 0usize), (0, 1), (1, 1), (3, 2), (2, 3)] {
            assert_eq!(bayer[y * 4 + x], 0, "non-red at ({x},{y})");
        }
    }

    #[test]
    fn test_bggr_picks_blue_first() {
        let mut rgb = vec![0u16; 2 * 2 * 3];
        // One pixel at (0,0): R=10, G=20, B=30
        rgb[0] = 10;
        rgb[1] = 20;
        rgb[2] = 30;

        let bayer = remosaic_rgb_to_bayer(&rgb, 2, 2, CfaPattern::Bggr);
        assert_eq!(bayer[0], 30);

        let bayer = remosaic_rgb_to_bayer(&rgb, 2, 2, CfaPattern::Rggb);
        assert_eq!(bayer[0], 10);

        let bayer = remosaic_rgb_to_bayer(&rgb, 2, 2, CfaPattern::Grbg);
        assert_eq!(bayer[0], 20);
    }
}
