//! Shared-canvas rasterizer: road triangles become per-cell records, then the
//! stylize, flatten and feather passes run once over the whole canvas.

use crate::config::{RoadConfig, TerrainConfig};
use crate::helpers::positions::WorldRect;
use crate::world::noise::StylizeNoise;
use crate::world::roads::road_mesh_manager::RoadGeometry;
use crate::world::terrain::tile_locator::VirtualCanvas;
use crate::world::terrain::tiles::{TileId, TileRegistry};
use glam::{Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Triangles with a smaller doubled XZ area are skipped.
const DEGENERATE_AREA: f32 = 1e-8;

/// What the road wants at one canvas cell. Plain old data so the GPU kernel can
/// write the same layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CellRecord {
    /// Target terrain height (road surface minus offsets).
    pub height: f32,
    pub layer: u32,
    pub strength: f32,
    pub set: u32,
}

impl CellRecord {
    #[inline]
    pub fn new(height: f32, layer: u32, strength: f32) -> Self {
        Self {
            height,
            layer,
            strength,
            set: 1,
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.set != 0
    }
}

/// Canvas-sized working buffers for one apply.
#[derive(Clone, Debug)]
pub struct CanvasGrid {
    pub canvas: VirtualCanvas,
    pub heights: Vec<f32>,
    /// False where no tile has a sample (gaps in the tile layout).
    pub covered: Vec<bool>,
    pub records: Vec<CellRecord>,
}

impl CanvasGrid {
    pub fn empty(canvas: VirtualCanvas) -> Self {
        let n = canvas.len();
        Self {
            canvas,
            heights: vec![0.0; n],
            covered: vec![false; n],
            records: vec![CellRecord::default(); n],
        }
    }

    /// Copy current tile heights into the canvas. The first tile to cover a cell wins.
    pub fn gather(registry: &dyn TileRegistry, tiles: &[TileId], canvas: VirtualCanvas) -> Self {
        let mut grid = Self::empty(canvas);
        for &id in tiles {
            let tile = registry.tile(id);
            let Some(overlap) = canvas.tile_overlap(tile) else {
                continue;
            };
            let heights = tile.read_heights(overlap.rect);
            for (h, ci) in heights.into_iter().zip(&overlap.canvas_index) {
                if let Some(ci) = *ci
                    && !grid.covered[ci]
                {
                    grid.heights[ci] = h;
                    grid.covered[ci] = true;
                }
            }
        }
        grid
    }

    pub fn set_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_set()).count()
    }

    // ========================================================================
    // Pass 1: triangles -> records
    // ========================================================================

    pub fn rasterize(&mut self, geometry: &RoadGeometry, road: &RoadConfig, terrain: &TerrainConfig) {
        let lowered = road.preview_height_offset + terrain.flatten_offset;
        for (l, layer) in geometry.layers.iter().enumerate() {
            for tri in geometry.world_triangles(l) {
                self.rasterize_triangle(tri, l as u32, layer.blend_strength, lowered);
            }
        }
    }

    fn rasterize_triangle(&mut self, [a, b, c]: [Vec3; 3], layer: u32, strength: f32, lowered: f32) {
        let (a2, b2, c2) = (Vec2::new(a.x, a.z), Vec2::new(b.x, b.z), Vec2::new(c.x, c.z));
        let area = edge(a2, b2, c2);
        if area.abs() < DEGENERATE_AREA {
            return;
        }
        let Some(bound) = WorldRect::from_points([a, b, c]) else {
            return;
        };
        let Some(rect) = self.canvas.pixel_rect(&bound) else {
            return;
        };

        for (x, z) in rect.cells() {
            let p = self.canvas.world_pos(x, z);
            let e0 = edge(b2, c2, p);
            let e1 = edge(c2, a2, p);
            let e2 = edge(a2, b2, p);
            let has_neg = e0 < 0.0 || e1 < 0.0 || e2 < 0.0;
            let has_pos = e0 > 0.0 || e1 > 0.0 || e2 > 0.0;
            if has_neg && has_pos {
                continue;
            }

            let (wa, wb, wc) = (e0 / area, e1 / area, e2 / area);
            let h = wa * a.y + wb * b.y + wc * c.y;
            let i = self.canvas.index(x, z);
            self.records[i] = CellRecord::new(h - lowered, layer, strength);
        }
    }

    // ========================================================================
    // Pass 2: ragged layer boundaries
    // ========================================================================

    /// Set cells on a layer boundary may take a random differing neighbour's layer
    /// where the noise is above the threshold. Reads from a snapshot.
    pub fn stylize(&mut self, config: &TerrainConfig) {
        let noise = StylizeNoise::new(config.seed, config.stylize_noise_scale);
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let snapshot = self.records.clone();
        let (w, d) = (self.canvas.width, self.canvas.depth);
        let mut differing = Vec::with_capacity(4);

        for z in 0..d {
            for x in 0..w {
                let i = self.canvas.index(x, z);
                let here = snapshot[i];
                if !here.is_set() {
                    continue;
                }

                differing.clear();
                for (nx, nz) in neighbors4(x, z, w, d) {
                    let n = snapshot[self.canvas.index(nx, nz)];
                    if n.is_set() && n.layer != here.layer {
                        differing.push(n);
                    }
                }
                if differing.is_empty() {
                    continue;
                }

                let p = self.canvas.world_pos(x, z);
                if noise.sample(p.x, p.y) > config.stylize_threshold {
                    let pick = differing[rng.random_range(0..differing.len())];
                    self.records[i].layer = pick.layer;
                    self.records[i].strength = pick.strength;
                }
            }
        }
    }

    // ========================================================================
    // Pass 3: heights
    // ========================================================================

    /// `lerp(current, target, strength)` on every covered set cell.
    pub fn flatten(&mut self, strength: f32) {
        let s = strength.clamp(0.0, 1.0);
        for ((h, r), &covered) in self
            .heights
            .iter_mut()
            .zip(&self.records)
            .zip(&self.covered)
        {
            if covered && r.is_set() {
                *h = *h * (1.0 - s) + r.height * s;
            }
        }
    }

    /// Smooth shoulder around the footprint. Unset cells within `feather_width` of
    /// a set cell move toward their 3x3 mean by `influence ^ feather_exponent`.
    pub fn feather(&mut self, config: &TerrainConfig) {
        let width = config.feather_width;
        if width <= 0.0 {
            return;
        }
        let (w, d) = (self.canvas.width, self.canvas.depth);
        let cell = self.canvas.cell;
        let rx = (width / cell.x).ceil() as usize;
        let rz = (width / cell.y).ceil() as usize;
        let snapshot = self.heights.clone();

        for z in 0..d {
            for x in 0..w {
                let i = self.canvas.index(x, z);
                if !self.covered[i] || self.records[i].is_set() {
                    continue;
                }

                let influence = self.influence_at(x, z, rx, rz, width);
                if influence <= 0.0 {
                    continue;
                }

                let mut sum = 0.0;
                let mut count = 0u32;
                for nz in z.saturating_sub(1)..=(z + 1).min(d - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        let j = self.canvas.index(nx, nz);
                        if self.covered[j] {
                            sum += snapshot[j];
                            count += 1;
                        }
                    }
                }
                let mean = sum / count as f32;
                let t = influence.powf(config.feather_exponent);
                self.heights[i] = snapshot[i] + (mean - snapshot[i]) * t;
            }
        }
    }

    /// Linear falloff from the nearest set cell, 0 beyond `width`.
    fn influence_at(&self, x: usize, z: usize, rx: usize, rz: usize, width: f32) -> f32 {
        let (w, d) = (self.canvas.width, self.canvas.depth);
        let cell = self.canvas.cell;
        let mut best = 0.0f32;
        for nz in z.saturating_sub(rz)..=(z + rz).min(d - 1) {
            for nx in x.saturating_sub(rx)..=(x + rx).min(w - 1) {
                if !self.records[self.canvas.index(nx, nz)].is_set() {
                    continue;
                }
                let dx = (nx as f32 - x as f32) * cell.x;
                let dz = (nz as f32 - z as f32) * cell.y;
                let dist = (dx * dx + dz * dz).sqrt();
                best = best.max(1.0 - dist / width);
            }
        }
        best
    }
}

/// Doubled signed area of (a, b, p) in the XZ plane.
#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn neighbors4(x: usize, z: usize, w: usize, d: usize) -> impl Iterator<Item = (usize, usize)> {
    let left = (x > 0).then(|| (x - 1, z));
    let right = (x + 1 < w).then_some((x + 1, z));
    let back = (z > 0).then(|| (x, z - 1));
    let front = (z + 1 < d).then_some((x, z + 1));
    [left, right, back, front].into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: usize, d: usize) -> VirtualCanvas {
        VirtualCanvas {
            origin: Vec2::ZERO,
            cell: Vec2::ONE,
            width: w,
            depth: d,
        }
    }

    fn covered_grid(w: usize, d: usize, h: f32) -> CanvasGrid {
        let mut grid = CanvasGrid::empty(canvas(w, d));
        grid.heights.fill(h);
        grid.covered.fill(true);
        grid
    }

    #[test]
    fn triangle_covers_cells_with_barycentric_height() {
        let mut grid = covered_grid(10, 10, 0.0);
        let tri = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(8.0, 8.0, 0.0),
            Vec3::new(0.0, 0.0, 8.0),
        ];
        grid.rasterize_triangle(tri, 2, 0.5, 0.0);

        let r = grid.records[grid.canvas.index(4, 2)];
        assert!(r.is_set());
        assert_eq!(r.layer, 2);
        assert!((r.height - 4.0).abs() < 1e-5);
        // (7, 7) lies outside the hypotenuse
        assert!(!grid.records[grid.canvas.index(7, 7)].is_set());

        // winding does not matter
        let mut flipped = covered_grid(10, 10, 0.0);
        flipped.rasterize_triangle([tri[0], tri[2], tri[1]], 2, 0.5, 0.0);
        assert_eq!(flipped.set_count(), grid.set_count());
    }

    #[test]
    fn later_layer_overwrites_earlier() {
        let mut grid = covered_grid(6, 6, 0.0);
        let tri = [Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 5.0)];
        grid.rasterize_triangle(tri, 0, 1.0, 0.0);
        grid.rasterize_triangle(tri, 1, 0.3, 0.0);
        let r = grid.records[grid.canvas.index(1, 1)];
        assert_eq!(r.layer, 1);
        assert_eq!(r.strength, 0.3);
    }

    #[test]
    fn stylize_leaves_uniform_cells_alone() {
        let mut grid = covered_grid(8, 8, 0.0);
        for r in grid.records.iter_mut() {
            *r = CellRecord::new(1.0, 3, 1.0);
        }
        let config = TerrainConfig {
            stylize_threshold: 0.0,
            ..Default::default()
        };
        let before = grid.records.clone();
        grid.stylize(&config);
        assert_eq!(grid.records, before);
    }

    #[test]
    fn stylize_only_touches_boundary_cells() {
        let mut grid = covered_grid(8, 8, 0.0);
        for z in 0..8 {
            for x in 0..8 {
                let layer = if x < 4 { 0 } else { 1 };
                grid.records[z * 8 + x] = CellRecord::new(0.0, layer, 1.0);
            }
        }
        let config = TerrainConfig {
            stylize_threshold: -1.0,
            ..Default::default()
        };
        grid.stylize(&config);
        for z in 0..8 {
            for x in 0..8 {
                let r = grid.records[z * 8 + x];
                match x {
                    3 => assert_eq!(r.layer, 1),
                    4 => assert_eq!(r.layer, 0),
                    x if x < 3 => assert_eq!(r.layer, 0),
                    _ => assert_eq!(r.layer, 1),
                }
            }
        }
    }

    #[test]
    fn flatten_lerps_set_cells_only() {
        let mut grid = covered_grid(3, 1, 10.0);
        grid.records[1] = CellRecord::new(2.0, 0, 1.0);
        grid.flatten(0.5);
        assert_eq!(grid.heights, vec![10.0, 6.0, 10.0]);
    }

    #[test]
    fn feather_skips_cells_without_influence() {
        let mut grid = covered_grid(20, 1, 5.0);
        grid.heights[0] = 0.0;
        grid.records[0] = CellRecord::new(0.0, 0, 1.0);
        // bump far away from the road, outside the 3 m feather
        grid.heights[15] = 9.0;
        let config = TerrainConfig {
            feather_width: 3.0,
            ..Default::default()
        };
        let before = grid.heights.clone();
        grid.feather(&config);

        for i in 3..20 {
            assert_eq!(grid.heights[i], before[i], "cell {i} moved");
        }
        assert_eq!(grid.heights[0], 0.0);
        // cell 1 is 1 m away: influence 2/3, moves toward its neighbourhood mean
        assert!(grid.heights[1] < 5.0);
    }

    #[test]
    fn gather_reads_tile_heights() {
        use crate::world::terrain::tiles::TerrainSet;
        let set = TerrainSet::grid(
            Vec3::ZERO,
            Vec3::new(8.0, 50.0, 8.0),
            1,
            1,
            9,
            9,
            &["grass"],
            |x, z| x + z,
        );
        let canvas = VirtualCanvas {
            origin: Vec2::new(2.0, 3.0),
            cell: Vec2::ONE,
            width: 3,
            depth: 2,
        };
        let grid = CanvasGrid::gather(&set, &[TileId(0)], canvas);
        assert!(grid.covered.iter().all(|&c| c));
        assert_eq!(grid.heights, vec![5.0, 6.0, 7.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn preview_lift_is_removed_from_target_height() {
        use crate::world::roads::road_mesh_manager::build_road_geometry;
        use crate::world::roads::road_structs::{ControlPoint, LayerProfile};
        use glam::Mat4;

        let points = vec![
            ControlPoint::new(Vec3::new(2.0, 10.0, 8.0)),
            ControlPoint::new(Vec3::new(14.0, 10.0, 8.0)),
        ];
        let mut layers = vec![LayerProfile::new("asphalt", 2.0, "asphalt")];
        layers[0].vertical_offset = 0.3;
        let road = RoadConfig {
            resolution: 8,
            preview_height_offset: 0.5,
            ..Default::default()
        };
        let terrain = TerrainConfig::default();
        let geometry = build_road_geometry(&points, &layers, &road, Mat4::IDENTITY, None);

        let mut grid = covered_grid(16, 16, 30.0);
        grid.rasterize(&geometry, &road, &terrain);
        let r = grid.records[grid.canvas.index(8, 9)];
        assert!(r.is_set());
        assert!((r.height - (10.0 + 0.3 - terrain.flatten_offset)).abs() < 1e-4);
    }
}
