//! Lens shading (gain) maps: a low-resolution multiplicative correction
//! surface per CFA channel, sampled bilinearly at normalized sensor
//! coordinates.

/// Four-channel gain map. Channel order follows the 2x2 CFA positions
/// (top-left, top-right, bottom-left, bottom-right).
#[derive(Debug, Clone, PartialEq)]
pub struct ShadingMap {
    channels: [Vec<f32>; 4],
    width: usize,
    height: usize,
}

impl ShadingMap {
    pub fn new(channels: [Vec<f32>; 4], width: usize, height: usize) -> ShadingMap {
        let expected = width * height;
        for (i, ch) in channels.iter().enumerate() {
            assert!(
                ch.len() == expected,
                "shading channel {i} has {} cells, expected {expected}",
                ch.len()
            );
        }
        ShadingMap {
            channels,
            width,
            height,
        }
    }

    /// A flat map with the same gain everywhere.
    pub fn uniform(width: usize, height: usize, gain: f32) -> ShadingMap {
        ShadingMap::new(std::array::from_fn(|_| vec![gain; width * height]), width, height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        &self.channels[c]
    }

    /// Bilinear sample of channel `c` at normalized coordinates.
    /// Coordinates clamp to the unit square.
    pub fn sample(&self, x: f32, y: f32, c: usize) -> f32 {
        if self.is_empty() {
            return 1.0;
        }

        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);

        let map_x = x * (self.width - 1) as f32;
        let map_y = y * (self.height - 1) as f32;

        let x0 = map_x.floor() as usize;
        let y0 = map_y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let wx = map_x - x0 as f32;
        let wy = map_y - y0 as f32;

        let plane = &self.channels[c];
        let v00 = plane[y0 * self.width + x0];
        let v01 = plane[y0 * self.width + x1];
        let v10 = plane[y1 * self.width + x0];
        let v11 = plane[y1 * self.width + x1];

        let top = v00 * (1.0 - wx) + v01 * wx;
        let bottom = v10 * (1.0 - wx) + v11 * wx;

        top * (1.0 - wy) + bottom * wy
    }

    /// Scale the whole map so its maximum becomes 1.0. No-op on empty maps
    /// or an all-zero map.
    pub fn normalize(&mut self) {
        if self.is_empty() {
            return;
        }

        let max = self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |m, &v| m.max(v));

        if max == 0.0 {
            return;
        }

        for ch in &mut self.channels {
            for v in ch.iter_mut() {
                *v /= max;
            }
        }
    }

    /// Replace every gain with its reciprocal. Skipped entirely if any cell
    /// is non-positive.
    pub fn invert(&mut self) {
        if self.is_empty() {
            return;
        }

        if self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .any(|&v| v <= 0.0)
        {
            return;
        }

        for ch in &mut self.channels {
            for v in ch.iter_mut() {
                *v = 1.0 / *v;
            }
        }
    }

    /// Keep only the chromatic component of the vignette: every grid cell is
    /// divided by the smallest of its four channel gains, so the common
    /// (luminance) falloff cancels and only per-channel color differences
    /// remain. Must run before [`ShadingMap::normalize`].
    pub fn color_only(&mut self) {
        if self.is_empty() {
            return;
        }

        for i in 0..self.width * self.height {
            let local_min = self.channels[0][i]
                .min(self.channels[1][i])
                .min(self.channels[2][i])
                .min(self.channels[3][i]);
            if local_min <= 0.0 {
                continue;
            }
            for c in 0..4 {
                self.channels[c][i] /= local_min;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_map() -> ShadingMap {
        // 3x2 grid per channel, values 1..=6
        let cells: Vec<f32> = (1..=6).map(|v| v as f32).collect();
        ShadingMap::new(std::array::from_fn(|_| cells.clone()), 3, 2)
    }

    // ====================================================================
    // Sampling
    // ====================================================================

    #[test]
    fn test_sample_at_corners() {
        let map = ramp_map();
        assert_eq!(map.sample(0.0, 0.0, 0), 1.0);
        assert_eq!(map.sample(1.0, 0.0, 0), 3.0);
        assert_eq!(map.sample(0.0, 1.0, 0), 4.0);
        assert_eq!(map.sample(1.0, 1.0, 0), 6.0);
    }

    #[test]
    fn test_sample_bilinear_midpoint() {
        let map = ramp_map();
        // Center of the grid: mean of all four mid cells
        // x=0.5 -> map_x=1.0 (exact cell), y=0.5 -> between rows: (2+5)/2
        assert!((map.sample(0.5, 0.5, 0) - 3.5).abs() < 1e-6);
        // Quarter point along x on the top row: between cells 1 and 2
        assert!((map.sample(0.25, 0.0, 0) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps_out_of_range() {
        let map = ramp_map();
        assert_eq!(map.sample(-5.0, -5.0, 1), 1.0);
        assert_eq!(map.sample(5.0, 5.0, 1), 6.0);
    }

    // ====================================================================
    // Mutators
    // ====================================================================

    #[test]
    fn test_normalize() {
        let mut map = ramp_map();
        map.normalize();
        let max = map
            .channel(0)
            .iter()
            .fold(0.0f32, |m, &v| m.max(v));
        assert!((max - 1.0).abs() < 1e-6);
        assert!((map.channel(0)[0] - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_invert() {
        let mut map = ShadingMap::uniform(2, 2, 4.0);
        map.invert();
        assert!((map.channel(0)[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_invert_skips_non_positive() {
        let mut map = ShadingMap::new(
            [vec![1.0, 0.0], vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]],
            2,
            1,
        );
        let before = map.clone();
        map.invert();
        assert_eq!(map, before);
    }

    #[test]
    fn test_color_only_removes_common_component() {
        // Channel gains 2/4/6/8 at every cell: after color_only each cell is
        // divided by 2, leaving 1/2/3/4
        let mut map = ShadingMap::new(
            [
                vec![2.0; 4],
                vec![4.0; 4],
                vec![6.0; 4],
                vec![8.0; 4],
            ],
            2,
            2,
        );
        map.color_only();
        assert_eq!(map.channel(0)[0], 1.0);
        assert_eq!(map.channel(1)[0], 2.0);
        assert_eq!(map.channel(2)[0], 3.0);
        assert_eq!(map.channel(3)[0], 4.0);
    }

    #[test]
    fn test_uniform_map_sample() {
        let map = ShadingMap::uniform(4, 3, 1.5);
        assert_eq!(map.sample(0.33, 0.77, 2), 1.5);
    }
}
