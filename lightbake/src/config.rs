use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};

/// Storage format of the accumulation buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightmapFormat {
    /// Packed unsigned float, 32 bits per texel. Falls back to `Half` when the
    /// adapter cannot render to it.
    Packed,
    /// Four 16-bit floats per texel.
    Half,
    /// Four 32-bit floats per texel. Exact readback, no filtering.
    Full,
}

impl LightmapFormat {
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            LightmapFormat::Packed => wgpu::TextureFormat::Rg11b10Ufloat,
            LightmapFormat::Half => wgpu::TextureFormat::Rgba16Float,
            LightmapFormat::Full => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Device features needed to use this format as a render target.
    pub fn required_features(self) -> wgpu::Features {
        match self {
            LightmapFormat::Packed => wgpu::Features::RG11B10UFLOAT_RENDERABLE,
            LightmapFormat::Half | LightmapFormat::Full => wgpu::Features::empty(),
        }
    }

    /// Bytes per texel as laid out in a readback buffer.
    pub fn texel_size(self) -> u32 {
        match self {
            LightmapFormat::Packed => 4,
            LightmapFormat::Half => 8,
            LightmapFormat::Full => 16,
        }
    }
}

/// Orthographic shadow settings used for directional lights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalShadowConfig {
    pub size: u32,
    /// Half width of the square orthographic frustum in world units.
    pub half_extent: f32,
    pub near: f32,
    pub far: f32,
    /// Distance from the scene origin to the virtual light eye.
    pub standoff: f32,
    pub bias: f32,
    pub pcf_radius: u32,
}

impl Default for DirectionalShadowConfig {
    fn default() -> Self {
        Self {
            size: 4096,
            half_extent: 50.0,
            near: 0.0,
            far: 500.0,
            standoff: 200.0,
            bias: 0.0002,
            pcf_radius: 3,
        }
    }
}

/// Perspective shadow settings used for spot lights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotShadowConfig {
    pub size: u32,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
    pub pcf_radius: u32,
}

impl Default for SpotShadowConfig {
    fn default() -> Self {
        Self {
            size: 2048,
            near: 0.1,
            far: 1000.0,
            bias: 0.00003,
            pcf_radius: 8,
        }
    }
}

/// Cube shadow settings used for point lights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointShadowConfig {
    /// Edge length of each cube face.
    pub size: u32,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
    pub pcf_radius: u32,
    /// Direction perturbation per PCF step.
    pub pcf_offset: f32,
}

impl Default for PointShadowConfig {
    fn default() -> Self {
        Self {
            size: 1536,
            near: 0.01,
            far: 1000.0,
            bias: 0.00006,
            pcf_radius: 2,
            pcf_offset: 0.0025,
        }
    }
}

/// Tunables for a [`LightmapBaker`](crate::LightmapBaker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    pub lightmap_format: LightmapFormat,
    pub directional: DirectionalShadowConfig,
    pub spot: SpotShadowConfig,
    pub point: PointShadowConfig,
    /// Keep shadow maps between rebuilds while neither the light nor the
    /// scene has changed.
    pub cache_shadow_maps: bool,
    /// Lower bound for squared light distance in the inverse square falloff.
    pub attenuation_floor: f32,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            lightmap_format: LightmapFormat::Packed,
            directional: DirectionalShadowConfig::default(),
            spot: SpotShadowConfig::default(),
            point: PointShadowConfig::default(),
            cache_shadow_maps: false,
            attenuation_floor: 1e-4,
        }
    }
}

impl BakeConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every shadow map size against the largest 2D texture the device
    /// can allocate.
    pub fn validate(&self, max_texture_dimension: u32) -> Result<()> {
        let sizes = [
            ("directional", self.directional.size),
            ("spot", self.spot.size),
            ("point", self.point.size),
        ];
        for (light, size) in sizes {
            if size == 0 || size > max_texture_dimension {
                return Err(BakeError::InvalidShadowMapSize {
                    light,
                    size,
                    max: max_texture_dimension,
                });
            }
        }
        Ok(())
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BakeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn with_lightmap_format(mut self, format: LightmapFormat) -> Self {
        self.lightmap_format = format;
        self
    }

    /// Override the edge length of every shadow map kind at once.
    #[must_use]
    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.directional.size = size;
        self.spot.size = size;
        self.point.size = size;
        self
    }

    #[must_use]
    pub fn with_directional_shadows(mut self, config: DirectionalShadowConfig) -> Self {
        self.directional = config;
        self
    }

    #[must_use]
    pub fn with_spot_shadows(mut self, config: SpotShadowConfig) -> Self {
        self.spot = config;
        self
    }

    #[must_use]
    pub fn with_point_shadows(mut self, config: PointShadowConfig) -> Self {
        self.point = config;
        self
    }

    #[must_use]
    pub fn with_shadow_cache(mut self, enabled: bool) -> Self {
        self.cache_shadow_maps = enabled;
        self
    }

    #[must_use]
    pub fn with_attenuation_floor(mut self, floor: f32) -> Self {
        self.attenuation_floor = floor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BakeConfig::from_json_str(
            r#"{ "lightmap_format": "full", "point": { "size": 256 } }"#,
        )
        .unwrap();
        assert_eq!(config.lightmap_format, LightmapFormat::Full);
        assert_eq!(config.point.size, 256);
        assert_eq!(config.point.pcf_radius, 2);
        assert_eq!(config.directional, DirectionalShadowConfig::default());
        assert!(!config.cache_shadow_maps);
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let config = BakeConfig::default()
            .with_shadow_map_size(512)
            .with_shadow_cache(true);
        let text = config.to_json_string().unwrap();
        assert_eq!(BakeConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn shadow_map_sizes_are_checked_against_the_device_limit() {
        assert!(BakeConfig::default().validate(8192).is_ok());

        let err = BakeConfig::default().validate(2048).unwrap_err();
        assert!(matches!(
            err,
            BakeError::InvalidShadowMapSize { light: "directional", size: 4096, max: 2048 }
        ));

        let zero = BakeConfig::from_json_str(r#"{ "spot": { "size": 0 } }"#).unwrap();
        assert!(matches!(
            zero.validate(8192),
            Err(BakeError::InvalidShadowMapSize { light: "spot", size: 0, .. })
        ));

        let oversized_cube = BakeConfig::default().with_point_shadows(PointShadowConfig {
            size: 8192,
            ..PointShadowConfig::default()
        });
        assert!(matches!(
            oversized_cube.validate(4096),
            Err(BakeError::InvalidShadowMapSize { light: "point", .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = BakeConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, BakeError::Config(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = BakeConfig::load("/definitely/not/here.json").unwrap_err();
        match err {
            BakeError::Io { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
