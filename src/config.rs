//! Road, terrain and backend settings, loadable from a TOML file.

use crate::errors::CarveError;
use crate::world::roads::road_structs::LayerProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UvMode {
    /// U from lateral offset against total road width, V from arc length.
    #[default]
    Adaptive,
    /// U, V from scaled world X, Z.
    WorldSpace,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayerLayout {
    /// Layers accumulate outward from the centerline.
    #[default]
    Stacked,
    /// Each layer sits at its own `offset_from_center`; overlap is allowed.
    Independent,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    Cpu,
    Gpu,
}

/// Fractal parameters shared by the edge wobble noise.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct NoiseOctaves {
    pub octaves: u32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub seed: u32,
}

impl Default for NoiseOctaves {
    fn default() -> Self {
        Self {
            octaves: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            seed: 1337,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoadConfig {
    /// Number of curve segments sampled; the path has `resolution + 1` points.
    pub resolution: usize,
    pub uv_mode: UvMode,
    pub uv_scale: f32,
    pub width_multiplier: f32,
    pub wobble_multiplier: f32,
    pub layout: LayerLayout,
    pub conform_to_terrain: bool,
    /// 0 ignores the terrain, 1 follows it exactly.
    pub conformity: f32,
    pub vertical_smoothness: f32,
    pub smoothing_iterations: u32,
    pub preview_height_offset: f32,
    pub wobble: NoiseOctaves,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            uv_mode: UvMode::Adaptive,
            uv_scale: 1.0,
            width_multiplier: 1.0,
            wobble_multiplier: 1.0,
            layout: LayerLayout::Stacked,
            conform_to_terrain: false,
            conformity: 1.0,
            vertical_smoothness: 0.5,
            smoothing_iterations: 0,
            preview_height_offset: 0.0,
            wobble: NoiseOctaves::default(),
        }
    }
}

/// Rect inside a baked texture atlas, in normalized UV space.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

/// Output of an external atlas bake. When present, the carver paints every road
/// cell into `smart_layer` and records which atlas rect covers it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AtlasMapping {
    pub smart_layer: String,
    pub rects: Vec<UvRect>,
    /// Material name to index into `rects`.
    pub material_to_rect: HashMap<String, u16>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Terrain settles this far below the road surface.
    pub flatten_offset: f32,
    pub flatten_strength: f32,
    pub feather_width: f32,
    pub stylize_noise_scale: f32,
    pub stylize_threshold: f32,
    pub feather_exponent: f32,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atlas: Option<AtlasMapping>,
}

impl AtlasMapping {
    /// Baked rect for a material. Indices past the end of `rects` count as unmapped.
    pub fn rect_for(&self, material: &str) -> Option<(u16, UvRect)> {
        let &index = self.material_to_rect.get(material)?;
        self.rects.get(index as usize).map(|r| (index, *r))
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            flatten_offset: 0.05,
            flatten_strength: 1.0,
            feather_width: 4.0,
            stylize_noise_scale: 0.35,
            stylize_threshold: 0.6,
            feather_exponent: 2.0,
            seed: 7,
            atlas: None,
        }
    }
}

/// Layout of the procedurally generated tile grid the binary carves into.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TileGridConfig {
    pub origin: [f32; 3],
    /// x/z extent and vertical range of each tile.
    pub tile_size: [f32; 3],
    pub tiles_x: usize,
    pub tiles_z: usize,
    pub height_resolution: usize,
    pub weight_resolution: usize,
    pub layers: Vec<String>,
    pub seed: u32,
    pub height_scale: f32,
    pub base_height: f32,
}

impl Default for TileGridConfig {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0, 0.0],
            tile_size: [128.0, 200.0, 128.0],
            tiles_x: 2,
            tiles_z: 2,
            height_resolution: 129,
            weight_resolution: 65,
            layers: vec!["grass".into(), "moss".into()],
            seed: 42,
            height_scale: 12.0,
            base_height: 50.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub processing_mode: ProcessingMode,
    pub road: RoadConfig,
    pub terrain: TerrainConfig,
    pub layers: Vec<LayerProfile>,
    pub grid: TileGridConfig,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CarveError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&data)
            .map_err(|e| CarveError::Settings(format!("{}: {e}", path.display())))?;
        settings.validated()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CarveError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = toml::to_string_pretty(self).map_err(|e| CarveError::Settings(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Clamp ranges that the generators assume. Negative widths become 0.
    pub fn validated(mut self) -> Result<Self, CarveError> {
        if self.road.resolution == 0 {
            return Err(CarveError::Settings("road.resolution must be at least 1".into()));
        }
        for layer in &mut self.layers {
            if layer.width < 0.0 {
                log::warn!("layer '{}' has negative width, clamping to 0", layer.name);
                layer.width = 0.0;
            }
        }
        self.road.conformity = self.road.conformity.clamp(0.0, 1.0);
        self.road.vertical_smoothness = self.road.vertical_smoothness.clamp(0.0, 1.0);
        self.terrain.flatten_strength = self.terrain.flatten_strength.clamp(0.0, 1.0);
        self.terrain.feather_width = self.terrain.feather_width.max(0.0);
        if self.grid.height_resolution < 2 || self.grid.weight_resolution == 0 {
            return Err(CarveError::Settings(
                "grid.height_resolution must be at least 2 and grid.weight_resolution at least 1"
                    .into(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_parse_from_toml_with_defaults() {
        let text = r#"
processing_mode = "gpu"

[road]
resolution = 32
layout = "independent"

[terrain]
feather_width = 2.5

[[layers]]
name = "asphalt"
width = 6.0
terrain_layer = "road"
"#;
        let settings: Settings = toml::from_str(text).unwrap();
        let settings = settings.validated().unwrap();
        assert_eq!(settings.processing_mode, ProcessingMode::Gpu);
        assert_eq!(settings.road.resolution, 32);
        assert_eq!(settings.road.layout, LayerLayout::Independent);
        assert_eq!(settings.road.uv_mode, UvMode::Adaptive);
        assert_eq!(settings.terrain.feather_width, 2.5);
        assert_eq!(settings.terrain.stylize_threshold, 0.6);
        assert_eq!(settings.layers.len(), 1);
        assert_eq!(settings.layers[0].blend_strength, 1.0);
    }

    #[test]
    fn validation_clamps_negative_width() {
        let mut settings = Settings::default();
        settings.layers.push(LayerProfile {
            width: -3.0,
            ..LayerProfile::new("ditch", 1.0, "dirt")
        });
        let settings = settings.validated().unwrap();
        assert_eq!(settings.layers[0].width, 0.0);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut settings = Settings::default();
        settings.road.resolution = 0;
        assert!(settings.validated().is_err());
    }
}
