use crate::config::TileGridConfig;
use crate::world::terrain::tiles::TerrainSet;
use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Procedural heights and base-layer moisture used to fill fresh tiles.
pub struct TerrainGenerator {
    elevation: Fbm<Perlin>,
    continent: Fbm<Perlin>,
    moisture: Fbm<Perlin>,

    pub height_scale: f32,
    pub base_height: f32,
}

impl TerrainGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            elevation: Fbm::<Perlin>::new(seed)
                .set_octaves(5)
                .set_frequency(0.03)
                .set_persistence(0.5),
            continent: Fbm::<Perlin>::new(seed.wrapping_add(1))
                .set_octaves(3)
                .set_frequency(0.005)
                .set_persistence(0.8),
            moisture: Fbm::<Perlin>::new(seed.wrapping_add(2))
                .set_octaves(4)
                .set_frequency(0.02)
                .set_persistence(0.6),
            height_scale: 40.0,
            base_height: 50.0,
        }
    }

    pub fn from_config(config: &TileGridConfig) -> Self {
        Self {
            height_scale: config.height_scale,
            base_height: config.base_height,
            ..Self::new(config.seed)
        }
    }

    pub fn height(&self, wx: f32, wz: f32) -> f32 {
        let e = self.elevation.get([wx as f64, wz as f64]) as f32;
        let c = self.continent.get([wx as f64, wz as f64]) as f32;

        let continent = ((c + 1.0) * 0.5).clamp(0.0, 1.0).powf(1.4);
        self.base_height + e * continent * self.height_scale
    }

    /// In [0, 1].
    pub fn moisture(&self, wx: f32, wz: f32) -> f32 {
        let m = self.moisture.get([wx as f64, wz as f64]) as f32;
        ((m + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Tile grid filled with generated heights. With two or more layers the first
    /// two are split by moisture (dry -> layer 0, wet -> layer 1).
    pub fn build_tiles(&self, config: &TileGridConfig) -> TerrainSet {
        let names: Vec<&str> = config.layers.iter().map(String::as_str).collect();
        let mut set = TerrainSet::grid(
            Vec3::from(config.origin),
            Vec3::from(config.tile_size),
            config.tiles_x,
            config.tiles_z,
            config.height_resolution,
            config.weight_resolution,
            &names,
            |x, z| self.height(x, z),
        );

        for tile in &mut set.tiles {
            let n = tile.layers.len();
            if n < 2 {
                continue;
            }
            let res = tile.weight_res;
            let step_x = tile.size.x / res.saturating_sub(1).max(1) as f32;
            let step_z = tile.size.z / res.saturating_sub(1).max(1) as f32;
            for z in 0..res {
                for x in 0..res {
                    let m = self.moisture(
                        tile.origin.x + x as f32 * step_x,
                        tile.origin.z + z as f32 * step_z,
                    );
                    let cell = &mut tile.weights[(z * res + x) * n..(z * res + x + 1) * n];
                    cell.fill(0.0);
                    cell[0] = 1.0 - m;
                    cell[1] = m;
                }
            }
        }

        log::info!(
            "generated {} terrain tile(s), {}x{} heights each",
            set.tiles.len(),
            config.height_resolution,
            config.height_resolution
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_are_deterministic_and_near_base() {
        let a = TerrainGenerator::new(9);
        let b = TerrainGenerator::new(9);
        for i in 0..50 {
            let (x, z) = (i as f32 * 3.7, i as f32 * -2.1);
            assert_eq!(a.height(x, z), b.height(x, z));
            assert!((a.height(x, z) - a.base_height).abs() <= a.height_scale * 1.5);
        }
    }

    #[test]
    fn generated_tiles_have_normalized_weights() {
        let config = TileGridConfig {
            tiles_x: 2,
            tiles_z: 1,
            height_resolution: 17,
            weight_resolution: 9,
            layers: vec!["grass".into(), "moss".into(), "road".into()],
            ..Default::default()
        };
        let set = TerrainGenerator::from_config(&config).build_tiles(&config);
        assert_eq!(set.tiles.len(), 2);
        for tile in &set.tiles {
            assert_eq!(tile.heights.len(), 17 * 17);
            for cell in tile.weights.chunks_exact(3) {
                assert!((cell.iter().sum::<f32>() - 1.0).abs() < 1e-5);
                assert_eq!(cell[2], 0.0);
            }
        }
    }
}
