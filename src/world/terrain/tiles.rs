use crate::helpers::positions::{GridRect, WorldRect};
use glam::{Vec2, Vec3};

/// Terrain height under a world XZ position, if any terrain covers it.
pub trait HeightQuery {
    fn height_at(&self, x: f32, z: f32) -> Option<f32>;
}

/// Rectangular read/write access to one tile's heightfield and weight grids.
///
/// Heights are world Y values. Weights are stored cell-major: every cell holds one
/// weight per registered terrain layer, in `terrain_layers()` order.
pub trait TerrainGridStore {
    fn origin(&self) -> Vec3;
    fn size(&self) -> Vec3;
    fn height_resolution(&self) -> usize;
    fn weight_resolution(&self) -> usize;
    fn terrain_layers(&self) -> &[String];

    fn read_heights(&self, rect: GridRect) -> Vec<f32>;
    fn write_heights(&mut self, rect: GridRect, values: &[f32]);
    fn read_weights(&self, rect: GridRect) -> Vec<f32>;
    fn write_weights(&mut self, rect: GridRect, values: &[f32]);
    /// Atlas side channel. Values are rect index + 1, 0 means no road material.
    fn read_atlas_indices(&self, rect: GridRect) -> Vec<u16>;
    fn write_atlas_indices(&mut self, rect: GridRect, values: &[u16]);

    #[inline]
    fn world_rect(&self) -> WorldRect {
        WorldRect::from_origin_size(self.origin(), self.size())
    }

    fn layer_index(&self, name: &str) -> Option<usize> {
        self.terrain_layers().iter().position(|l| l == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub usize);

/// Links to the tiles sharing each border. Z+ is "front".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileNeighbors {
    pub left: Option<TileId>,
    pub right: Option<TileId>,
    pub back: Option<TileId>,
    pub front: Option<TileId>,
}

/// Lookup of tiles by world bound, injected into the carver instead of a global registry.
pub trait TileRegistry {
    fn tile_count(&self) -> usize;
    fn tile(&self, id: TileId) -> &dyn TerrainGridStore;
    fn tile_mut(&mut self, id: TileId) -> &mut dyn TerrainGridStore;

    fn tiles_in_bound(&self, bound: &WorldRect) -> Vec<TileId> {
        (0..self.tile_count())
            .map(TileId)
            .filter(|&id| self.tile(id).world_rect().intersects(bound))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct TerrainTile {
    pub origin: Vec3,
    /// x/z extent and vertical range (`origin.y ..= origin.y + size.y`).
    pub size: Vec3,
    pub height_res: usize,
    pub weight_res: usize,
    pub heights: Vec<f32>, // indexed as z * height_res + x
    pub weights: Vec<f32>, // indexed as (z * weight_res + x) * layers + layer
    pub layers: Vec<String>,
    pub atlas_indices: Vec<u16>,
    pub normals: Vec<Vec3>,
    pub neighbors: TileNeighbors,
    pub dirty: bool,
}

impl TerrainTile {
    pub fn new(
        origin: Vec3,
        size: Vec3,
        height_res: usize,
        weight_res: usize,
        layers: Vec<String>,
        height_fn: impl Fn(f32, f32) -> f32,
    ) -> Self {
        let height_res = height_res.max(2);
        let weight_res = weight_res.max(1);
        let layer_count = layers.len().max(1);
        let layers = if layers.is_empty() {
            vec!["base".to_string()]
        } else {
            layers
        };

        let cell = Vec2::new(
            size.x / (height_res - 1) as f32,
            size.z / (height_res - 1) as f32,
        );
        let mut heights = Vec::with_capacity(height_res * height_res);
        for z in 0..height_res {
            for x in 0..height_res {
                let wx = origin.x + x as f32 * cell.x;
                let wz = origin.z + z as f32 * cell.y;
                heights.push(height_fn(wx, wz).clamp(origin.y, origin.y + size.y));
            }
        }

        let mut weights = vec![0.0; weight_res * weight_res * layer_count];
        for cell in weights.chunks_exact_mut(layer_count) {
            cell[0] = 1.0;
        }

        Self {
            origin,
            size,
            height_res,
            weight_res,
            heights,
            weights,
            layers,
            atlas_indices: vec![0; weight_res * weight_res],
            normals: vec![Vec3::Y; height_res * height_res],
            neighbors: TileNeighbors::default(),
            dirty: false,
        }
    }

    pub fn flat(
        origin: Vec3,
        size: Vec3,
        height_res: usize,
        weight_res: usize,
        layers: Vec<String>,
        height: f32,
    ) -> Self {
        Self::new(origin, size, height_res, weight_res, layers, |_, _| height)
    }

    #[inline]
    pub fn cell_size(&self) -> Vec2 {
        Vec2::new(
            self.size.x / (self.height_res - 1) as f32,
            self.size.z / (self.height_res - 1) as f32,
        )
    }

    #[inline]
    pub fn height(&self, x: usize, z: usize) -> f32 {
        self.heights[z * self.height_res + x]
    }

    /// Weight vector of one weight-grid cell.
    #[inline]
    pub fn weights_at(&self, x: usize, z: usize) -> &[f32] {
        let n = self.layers.len();
        let i = (z * self.weight_res + x) * n;
        &self.weights[i..i + n]
    }

    /// Append a terrain layer with zero weight everywhere and return its index.
    pub fn register_layer(&mut self, name: &str) -> usize {
        if let Some(i) = self.layer_index(name) {
            return i;
        }
        let old = self.layers.len();
        if old == 0 {
            // first layer owns every cell
            self.weights = vec![1.0; self.weight_res * self.weight_res];
            self.layers.push(name.to_string());
            return 0;
        }
        let mut grown = Vec::with_capacity(self.weight_res * self.weight_res * (old + 1));
        for cell in self.weights.chunks_exact(old) {
            grown.extend_from_slice(cell);
            grown.push(0.0);
        }
        self.weights = grown;
        self.layers.push(name.to_string());
        old
    }

    /// Bilinear height at world XZ, None outside the tile.
    pub fn sample_height(&self, x: f32, z: f32) -> Option<f32> {
        if !self.world_rect().contains(x, z) {
            return None;
        }
        let cell = self.cell_size();
        let gx_f = (x - self.origin.x) / cell.x;
        let gz_f = (z - self.origin.z) / cell.y;
        let n = self.height_res;

        let gx0 = (gx_f.floor() as usize).min(n - 1);
        let gz0 = (gz_f.floor() as usize).min(n - 1);
        let gx1 = (gx0 + 1).min(n - 1);
        let gz1 = (gz0 + 1).min(n - 1);

        let tx = (gx_f - gx0 as f32).clamp(0.0, 1.0);
        let tz = (gz_f - gz0 as f32).clamp(0.0, 1.0);

        let h0 = self.height(gx0, gz0) + tx * (self.height(gx1, gz0) - self.height(gx0, gz0));
        let h1 = self.height(gx0, gz1) + tx * (self.height(gx1, gz1) - self.height(gx0, gz1));
        Some(h0 + tz * (h1 - h0))
    }
}

impl TerrainGridStore for TerrainTile {
    fn origin(&self) -> Vec3 {
        self.origin
    }

    fn size(&self) -> Vec3 {
        self.size
    }

    fn height_resolution(&self) -> usize {
        self.height_res
    }

    fn weight_resolution(&self) -> usize {
        self.weight_res
    }

    fn terrain_layers(&self) -> &[String] {
        &self.layers
    }

    fn read_heights(&self, rect: GridRect) -> Vec<f32> {
        rect.cells().map(|(x, z)| self.height(x, z)).collect()
    }

    fn write_heights(&mut self, rect: GridRect, values: &[f32]) {
        let (lo, hi) = (self.origin.y, self.origin.y + self.size.y);
        for ((x, z), &h) in rect.cells().zip(values) {
            self.heights[z * self.height_res + x] = h.clamp(lo, hi);
        }
        self.dirty = true;
    }

    fn read_weights(&self, rect: GridRect) -> Vec<f32> {
        let mut out = Vec::with_capacity(rect.len() * self.layers.len());
        for (x, z) in rect.cells() {
            out.extend_from_slice(self.weights_at(x, z));
        }
        out
    }

    fn write_weights(&mut self, rect: GridRect, values: &[f32]) {
        let n = self.layers.len();
        for ((x, z), cell) in rect.cells().zip(values.chunks_exact(n)) {
            let i = (z * self.weight_res + x) * n;
            self.weights[i..i + n].copy_from_slice(cell);
        }
        self.dirty = true;
    }

    fn read_atlas_indices(&self, rect: GridRect) -> Vec<u16> {
        rect.cells()
            .map(|(x, z)| self.atlas_indices[z * self.weight_res + x])
            .collect()
    }

    fn write_atlas_indices(&mut self, rect: GridRect, values: &[u16]) {
        for ((x, z), &v) in rect.cells().zip(values) {
            self.atlas_indices[z * self.weight_res + x] = v;
        }
    }
}

/// In-memory set of terrain tiles.
#[derive(Clone, Debug, Default)]
pub struct TerrainSet {
    pub tiles: Vec<TerrainTile>,
}

impl TerrainSet {
    pub fn new(tiles: Vec<TerrainTile>) -> Self {
        Self { tiles }
    }

    /// `count_x * count_z` tiles of equal size laid edge to edge from `origin`.
    pub fn grid(
        origin: Vec3,
        tile_size: Vec3,
        count_x: usize,
        count_z: usize,
        height_res: usize,
        weight_res: usize,
        layers: &[&str],
        height_fn: impl Fn(f32, f32) -> f32,
    ) -> Self {
        let names: Vec<String> = layers.iter().map(|s| s.to_string()).collect();
        let mut tiles = Vec::with_capacity(count_x * count_z);
        for tz in 0..count_z {
            for tx in 0..count_x {
                let tile_origin =
                    origin + Vec3::new(tx as f32 * tile_size.x, 0.0, tz as f32 * tile_size.z);
                tiles.push(TerrainTile::new(
                    tile_origin,
                    tile_size,
                    height_res,
                    weight_res,
                    names.clone(),
                    &height_fn,
                ));
            }
        }
        Self { tiles }
    }

    pub fn get(&self, id: TileId) -> Option<&TerrainTile> {
        self.tiles.get(id.0)
    }
}

impl HeightQuery for TerrainSet {
    fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        self.tiles.iter().find_map(|t| t.sample_height(x, z))
    }
}

impl TileRegistry for TerrainSet {
    fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn tile(&self, id: TileId) -> &dyn TerrainGridStore {
        &self.tiles[id.0]
    }

    fn tile_mut(&mut self, id: TileId) -> &mut dyn TerrainGridStore {
        &mut self.tiles[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> TerrainTile {
        TerrainTile::new(
            Vec3::new(10.0, 0.0, 20.0),
            Vec3::new(16.0, 100.0, 16.0),
            17,
            9,
            vec!["grass".into(), "road".into()],
            |x, _| x,
        )
    }

    #[test]
    fn bilinear_sample_matches_ramp() {
        let t = tile();
        assert!((t.sample_height(14.5, 25.0).unwrap() - 14.5).abs() < 1e-4);
        assert!(t.sample_height(9.0, 25.0).is_none());
    }

    #[test]
    fn rect_round_trip_through_store() {
        let mut t = tile();
        let rect = GridRect { min_x: 2, min_z: 3, max_x: 4, max_z: 3 };
        t.write_heights(rect, &[5.0, 6.0, 7.0]);
        assert_eq!(t.read_heights(rect), vec![5.0, 6.0, 7.0]);
        assert!(t.dirty);

        let wrect = GridRect { min_x: 0, min_z: 0, max_x: 0, max_z: 0 };
        t.write_weights(wrect, &[0.25, 0.75]);
        assert_eq!(t.weights_at(0, 0), &[0.25, 0.75]);
    }

    #[test]
    fn writes_clamp_to_vertical_range() {
        let mut t = tile();
        let rect = GridRect { min_x: 0, min_z: 0, max_x: 1, max_z: 0 };
        t.write_heights(rect, &[-5.0, 500.0]);
        assert_eq!(t.read_heights(rect), vec![0.0, 100.0]);
    }

    #[test]
    fn registering_layer_keeps_weights_normalized() {
        let mut t = tile();
        let idx = t.register_layer("gravel");
        assert_eq!(idx, 2);
        assert_eq!(t.register_layer("gravel"), 2);
        let w = t.weights_at(3, 3);
        assert_eq!(w.len(), 3);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn registry_finds_tiles_in_bound() {
        let set = TerrainSet::grid(
            Vec3::ZERO,
            Vec3::new(10.0, 50.0, 10.0),
            3,
            2,
            11,
            11,
            &["grass"],
            |_, _| 1.0,
        );
        let bound = WorldRect::new(Vec2::new(12.0, 2.0), Vec2::new(22.0, 4.0));
        let ids = set.tiles_in_bound(&bound);
        assert_eq!(ids, vec![TileId(1), TileId(2)]);
        assert_eq!(set.height_at(25.0, 15.0), Some(1.0));
    }
}
