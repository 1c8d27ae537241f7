use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_sample_count")]
    pub sample_count: u32,
    /// Edge length of the directional shadow map.
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    /// Edge length of one point-light cube face.
    #[serde(default = "RenderSettings::default_point_shadow_map_size")]
    pub point_shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_max_shadow_point_lights")]
    pub max_shadow_point_lights: u32,
    #[serde(default = "RenderSettings::default_max_point_lights")]
    pub max_point_lights: u32,
    #[serde(default)]
    pub color_strategy: ColorStrategy,
    #[serde(default = "RenderSettings::default_true")]
    pub post_processing: bool,
    /// Scene color in 16-bit float instead of 8-bit.
    #[serde(default = "RenderSettings::default_true")]
    pub hdr: bool,
    #[serde(default = "RenderSettings::default_exposure")]
    pub exposure: f32,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_count: Self::default_sample_count(),
            shadow_map_size: Self::default_shadow_map_size(),
            point_shadow_map_size: Self::default_point_shadow_map_size(),
            max_shadow_point_lights: Self::default_max_shadow_point_lights(),
            max_point_lights: Self::default_max_point_lights(),
            color_strategy: ColorStrategy::default(),
            post_processing: true,
            hdr: true,
            exposure: Self::default_exposure(),
            clear_color: Self::default_clear_color(),
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let settings = serde_json::from_str::<RenderSettings>(contents)?;
        info!("Loaded render settings");
        Ok(settings.validate())
    }

    pub fn validate(mut self) -> Self {
        if !matches!(self.sample_count, 1 | 2 | 4 | 8) {
            warn!(
                "Sample count {} is not one of 1, 2, 4 or 8. Using default.",
                self.sample_count
            );
            self.sample_count = Self::default_sample_count();
        }

        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.point_shadow_map_size == 0 {
            warn!("Point shadow map size must be greater than zero. Using default value.");
            self.point_shadow_map_size = Self::default_point_shadow_map_size();
        }

        let max_points = crate::renderer::MAX_POINT_LIGHTS as u32;
        if self.max_point_lights > max_points {
            warn!(
                "At most {} point lights are supported. Clamping {}.",
                max_points, self.max_point_lights
            );
            self.max_point_lights = max_points;
        }

        let max_shadows = crate::renderer::MAX_SHADOW_POINT_LIGHTS as u32;
        if self.max_shadow_point_lights > max_shadows {
            warn!(
                "At most {} shadowed point lights are supported. Clamping {}.",
                max_shadows, self.max_shadow_point_lights
            );
            self.max_shadow_point_lights = max_shadows;
        }

        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            warn!("Exposure must be positive. Using default value.");
            self.exposure = Self::default_exposure();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color.map(f64::from);
        wgpu::Color { r, g, b, a }
    }

    const fn default_sample_count() -> u32 {
        4
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_point_shadow_map_size() -> u32 {
        512
    }

    const fn default_max_shadow_point_lights() -> u32 {
        4
    }

    const fn default_max_point_lights() -> u32 {
        16
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_exposure() -> f32 {
        1.0
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.02, 0.02, 0.03, 1.0]
    }
}

/// How the opaque color pass is rendered. Fixed for the life of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStrategy {
    #[default]
    Forward,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            sample_count: 3,
            shadow_map_size: 0,
            point_shadow_map_size: 0,
            max_shadow_point_lights: 99,
            max_point_lights: 99,
            exposure: -1.0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            present_mode: PresentModeSetting::Immediate,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.sample_count, defaults.sample_count);
        assert_eq!(validated.shadow_map_size, defaults.shadow_map_size);
        assert_eq!(validated.point_shadow_map_size, defaults.point_shadow_map_size);
        assert_eq!(validated.exposure, defaults.exposure);
        assert_eq!(validated.resolution, Resolution::default());
        assert_eq!(
            validated.max_point_lights as usize,
            crate::renderer::MAX_POINT_LIGHTS
        );
        assert_eq!(
            validated.max_shadow_point_lights as usize,
            crate::renderer::MAX_SHADOW_POINT_LIGHTS
        );
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            sample_count: 8,
            shadow_map_size: 1024,
            color_strategy: ColorStrategy::Deferred,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings =
            RenderSettings::from_json(r#"{ "color_strategy": "deferred", "post_processing": false }"#)
                .unwrap();
        assert_eq!(settings.color_strategy, ColorStrategy::Deferred);
        assert!(!settings.post_processing);
        assert_eq!(settings.sample_count, 4);
        assert!(settings.hdr);
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Immediate];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Immediate
        );
    }
}
