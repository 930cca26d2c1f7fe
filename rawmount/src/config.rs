//! Render configuration: the option bitset and the per-mount record the UI
//! (or any adapter) constructs. A new record replaces the old one atomically
//! and triggers a full entry-table rebuild.

use std::fmt;

use rawframe::preprocess::{LevelMode, LogMode, PreprocessParams};

/// Typed option bitset with explicit set/has/clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions(u32);

impl RenderOptions {
    pub const NONE: RenderOptions = RenderOptions(0);
    pub const DRAFT: RenderOptions = RenderOptions(1 << 0);
    pub const VIGNETTE_CORRECTION: RenderOptions = RenderOptions(1 << 1);
    pub const NORMALIZE_SHADING: RenderOptions = RenderOptions(1 << 2);
    pub const DEBUG_SHADING: RenderOptions = RenderOptions(1 << 3);
    pub const VIGNETTE_ONLY_COLOR: RenderOptions = RenderOptions(1 << 4);
    pub const NORMALIZE_EXPOSURE: RenderOptions = RenderOptions(1 << 5);
    pub const FRAMERATE_CONVERSION: RenderOptions = RenderOptions(1 << 6);
    pub const CROPPING: RenderOptions = RenderOptions(1 << 7);
    pub const CAMERA_MODEL_OVERRIDE: RenderOptions = RenderOptions(1 << 8);
    pub const LOG_TRANSFORM: RenderOptions = RenderOptions(1 << 9);
    pub const REMOSAIC: RenderOptions = RenderOptions(1 << 10);

    pub fn set(&mut self, flag: RenderOptions) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: RenderOptions) {
        self.0 &= !flag.0;
    }

    pub fn has(&self, flag: RenderOptions) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn with(mut self, flag: RenderOptions) -> RenderOptions {
        self.set(flag);
        self
    }
}

impl fmt::Display for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "NONE");
        }

        const NAMES: &[(RenderOptions, &str)] = &[
            (RenderOptions::DRAFT, "DRAFT"),
            (RenderOptions::VIGNETTE_CORRECTION, "VIGNETTE_CORRECTION"),
            (RenderOptions::VIGNETTE_ONLY_COLOR, "VIGNETTE_ONLY_COLOR"),
            (RenderOptions::NORMALIZE_SHADING, "NORMALIZE_SHADING"),
            (RenderOptions::DEBUG_SHADING, "DEBUG_SHADING"),
            (RenderOptions::NORMALIZE_EXPOSURE, "NORMALIZE_EXPOSURE"),
            (RenderOptions::FRAMERATE_CONVERSION, "FRAMERATE_CONVERSION"),
            (RenderOptions::CROPPING, "CROPPING"),
            (RenderOptions::CAMERA_MODEL_OVERRIDE, "CAMERA_MODEL_OVERRIDE"),
            (RenderOptions::LOG_TRANSFORM, "LOG_TRANSFORM"),
            (RenderOptions::REMOSAIC, "REMOSAIC"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.has(*flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Consolidated per-mount render configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub options: RenderOptions,
    pub draft_scale: u32,
    pub cfr_target: String,
    pub crop_target: String,
    pub camera_model: String,
    pub levels: String,
    pub log_transform: String,
    pub exposure_compensation: String,
    pub quad_bayer: String,
    pub cfa_phase: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            options: RenderOptions::NONE,
            draft_scale: 1,
            cfr_target: "Prefer Drop Frame".to_string(),
            crop_target: String::new(),
            camera_model: "Panasonic".to_string(),
            levels: "Dynamic".to_string(),
            log_transform: "Keep Input".to_string(),
            exposure_compensation: "0ev".to_string(),
            quad_bayer: "Remosaic".to_string(),
            cfa_phase: "bggr".to_string(),
        }
    }
}

impl RenderConfig {
    /// Effective downscale factor: the draft scale only when drafting is on.
    pub fn scale(&self) -> u32 {
        if self.options.has(RenderOptions::DRAFT) {
            self.draft_scale
        } else {
            1
        }
    }

    /// The camera-model override, empty unless the override flag is set.
    pub fn camera_model_override(&self) -> &str {
        if self.options.has(RenderOptions::CAMERA_MODEL_OVERRIDE) {
            &self.camera_model
        } else {
            ""
        }
    }

    /// Static EV offset when the compensation is a plain `Nev` value rather
    /// than a keyframe list.
    pub fn static_exposure_ev(&self) -> f32 {
        let trimmed = self.exposure_compensation.trim();
        let trimmed = trimmed
            .strip_suffix("ev")
            .or_else(|| trimmed.strip_suffix("EV"))
            .unwrap_or(trimmed);
        trimmed.trim().parse().unwrap_or(0.0)
    }

    /// Derive the preprocessor knobs for this configuration.
    pub fn preprocess_params(&self) -> PreprocessParams {
        let opts = self.options;

        PreprocessParams {
            scale: self.scale(),
            crop_target: if opts.has(RenderOptions::CROPPING) {
                self.crop_target.clone()
            } else {
                String::new()
            },
            levels: LevelMode::parse(&self.levels),
            log_mode: if opts.has(RenderOptions::LOG_TRANSFORM) {
                LogMode::parse(&self.log_transform)
            } else {
                LogMode::None
            },
            apply_shading: opts.has(RenderOptions::VIGNETTE_CORRECTION),
            color_only_shading: opts.has(RenderOptions::VIGNETTE_ONLY_COLOR),
            normalize_shading: opts.has(RenderOptions::NORMALIZE_SHADING),
            debug_shading: opts.has(RenderOptions::DEBUG_SHADING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_set_has_clear() {
        let mut opts = RenderOptions::NONE;
        assert!(!opts.has(RenderOptions::DRAFT));

        opts.set(RenderOptions::DRAFT);
        opts.set(RenderOptions::LOG_TRANSFORM);
        assert!(opts.has(RenderOptions::DRAFT));
        assert!(opts.has(RenderOptions::LOG_TRANSFORM));
        assert!(!opts.has(RenderOptions::CROPPING));

        opts.clear(RenderOptions::DRAFT);
        assert!(!opts.has(RenderOptions::DRAFT));
        assert!(opts.has(RenderOptions::LOG_TRANSFORM));
    }

    #[test]
    fn test_options_display() {
        assert_eq!(RenderOptions::NONE.to_string(), "NONE");

        let opts = RenderOptions::DRAFT.with(RenderOptions::CROPPING);
        assert_eq!(opts.to_string(), "DRAFT | CROPPING");
    }

    #[test]
    fn test_scale_requires_draft_flag() {
        let mut config = RenderConfig {
            draft_scale: 4,
            ..RenderConfig::default()
        };
        assert_eq!(config.scale(), 1);

        config.options.set(RenderOptions::DRAFT);
        assert_eq!(config.scale(), 4);
    }

    #[test]
    fn test_static_exposure_parse() {
        let mut config = RenderConfig::default();
        assert_eq!(config.static_exposure_ev(), 0.0);

        config.exposure_compensation = "1.5ev".to_string();
        assert_eq!(config.static_exposure_ev(), 1.5);

        config.exposure_compensation = "-2".to_string();
        assert_eq!(config.static_exposure_ev(), -2.0);

        config.exposure_compensation = "0:1, 1:2".to_string();
        assert_eq!(config.static_exposure_ev(), 0.0);
    }

    #[test]
    fn test_preprocess_params_respect_flags() {
        let config = RenderConfig {
            options: RenderOptions::NONE,
            crop_target: "100x100".to_string(),
            log_transform: "Reduce by 2bit".to_string(),
            ..RenderConfig::default()
        };

        // Without the flags, crop and log stay off
        let params = config.preprocess_params();
        assert!(params.crop_target.is_empty());
        assert_eq!(params.log_mode, LogMode::None);

        let config = RenderConfig {
            options: RenderOptions::CROPPING.with(RenderOptions::LOG_TRANSFORM),
            ..config
        };
        let params = config.preprocess_params();
        assert_eq!(params.crop_target, "100x100");
        assert_eq!(params.log_mode, LogMode::ReduceBy(2));
    }

    #[test]
    fn test_camera_model_override_gated() {
        let config = RenderConfig::default();
        assert_eq!(config.camera_model_override(), "");

        let config = RenderConfig {
            options: RenderOptions::CAMERA_MODEL_OVERRIDE,
            ..config
        };
        assert_eq!(config.camera_model_override(), "Panasonic");
    }
}
