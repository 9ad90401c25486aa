//! Coordinate conversions between world space, tile grids and the shared canvas.

use crate::helpers::positions::{GridRect, WorldRect};
use crate::world::terrain::tiles::{TerrainGridStore, TileId, TileRegistry};
use glam::Vec2;

/// Lattice snapping tolerance, in cells.
const SNAP_EPS: f32 = 1e-3;

/// Every tile whose XZ rectangle touches `bound`, in registry order.
pub fn locate_tiles(registry: &dyn TileRegistry, bound: &WorldRect) -> Vec<TileId> {
    registry.tiles_in_bound(bound)
}

#[inline]
fn cell_of(store: &dyn TerrainGridStore) -> Vec2 {
    let steps = store.height_resolution().saturating_sub(1).max(1) as f32;
    Vec2::new(store.size().x / steps, store.size().z / steps)
}

/// Continuous heightfield pixel coordinate of a world XZ position.
#[inline]
pub fn world_to_heightfield(store: &dyn TerrainGridStore, x: f32, z: f32) -> Vec2 {
    let o = store.origin();
    (Vec2::new(x, z) - Vec2::new(o.x, o.z)) / cell_of(store)
}

#[inline]
pub fn heightfield_to_world(store: &dyn TerrainGridStore, px: usize, pz: usize) -> Vec2 {
    let o = store.origin();
    Vec2::new(o.x, o.z) + Vec2::new(px as f32, pz as f32) * cell_of(store)
}

/// Heightfield pixels covering `bound`, padded by one pixel and clamped to the grid.
pub fn heightfield_rect(store: &dyn TerrainGridStore, bound: &WorldRect) -> Option<GridRect> {
    let lo = world_to_heightfield(store, bound.min.x, bound.min.y);
    let hi = world_to_heightfield(store, bound.max.x, bound.max.y);
    let res = store.height_resolution();
    GridRect::clamped(
        lo.x.floor() as i64 - 1,
        lo.y.floor() as i64 - 1,
        hi.x.ceil() as i64 + 1,
        hi.y.ceil() as i64 + 1,
        res,
        res,
    )
}

/// Proportional rescale from one grid resolution to another, clamped.
#[inline]
fn rescale(v: usize, from_res: usize, to_res: usize) -> usize {
    if from_res <= 1 || to_res <= 1 {
        return 0;
    }
    let t = v as f32 / (from_res - 1) as f32;
    ((t * (to_res - 1) as f32).round() as usize).min(to_res - 1)
}

#[inline]
pub fn heightfield_to_weight(store: &dyn TerrainGridStore, hx: usize, hz: usize) -> (usize, usize) {
    let (h, w) = (store.height_resolution(), store.weight_resolution());
    (rescale(hx, h, w), rescale(hz, h, w))
}

#[inline]
pub fn weight_to_heightfield(store: &dyn TerrainGridStore, wx: usize, wz: usize) -> (usize, usize) {
    let (h, w) = (store.height_resolution(), store.weight_resolution());
    (rescale(wx, w, h), rescale(wz, w, h))
}

pub fn heightfield_rect_to_weight(store: &dyn TerrainGridStore, rect: GridRect) -> GridRect {
    let (min_x, min_z) = heightfield_to_weight(store, rect.min_x, rect.min_z);
    let (max_x, max_z) = heightfield_to_weight(store, rect.max_x, rect.max_z);
    GridRect {
        min_x,
        min_z,
        max_x,
        max_z,
    }
}

// ============================================================================
// Virtual Canvas
// ============================================================================

/// Temporary grid spanning every tile touched by one footprint. Its lattice is
/// the reference tile's lattice, so tile samples land exactly on canvas cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualCanvas {
    /// World XZ of cell (0, 0).
    pub origin: Vec2,
    pub cell: Vec2,
    pub width: usize,
    pub depth: usize,
}

impl VirtualCanvas {
    /// Union of the tiles' rects, clipped to `bound`, snapped outward to the
    /// lattice of `tiles[0]`.
    pub fn from_tiles(
        registry: &dyn TileRegistry,
        tiles: &[TileId],
        bound: &WorldRect,
    ) -> Option<VirtualCanvas> {
        let reference = registry.tile(*tiles.first()?);
        let union = tiles
            .iter()
            .map(|&id| registry.tile(id).world_rect())
            .reduce(|a, b| a.union(&b))?;
        let area = union.intersection(bound)?;

        let cell = cell_of(reference);
        let ref_origin = Vec2::new(reference.origin().x, reference.origin().z);
        let lo = ((area.min - ref_origin) / cell + SNAP_EPS).floor();
        let hi = ((area.max - ref_origin) / cell - SNAP_EPS).ceil().max(lo);
        let span = hi - lo;

        Some(VirtualCanvas {
            origin: ref_origin + lo * cell,
            cell,
            width: span.x as usize + 1,
            depth: span.y as usize + 1,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, x: usize, z: usize) -> usize {
        z * self.width + x
    }

    #[inline]
    pub fn world_pos(&self, x: usize, z: usize) -> Vec2 {
        self.origin + Vec2::new(x as f32, z as f32) * self.cell
    }

    #[inline]
    pub fn world_to_canvas(&self, x: f32, z: f32) -> Vec2 {
        (Vec2::new(x, z) - self.origin) / self.cell
    }

    /// Nearest canvas cell to a world position, None outside the canvas.
    pub fn cell_at(&self, x: f32, z: f32) -> Option<(usize, usize)> {
        let p = self.world_to_canvas(x, z).round();
        if p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let (cx, cz) = (p.x as usize, p.y as usize);
        (cx < self.width && cz < self.depth).then_some((cx, cz))
    }

    /// Canvas cells covering `bound`, clamped. No padding: callers pass exact bounds.
    pub fn pixel_rect(&self, bound: &WorldRect) -> Option<GridRect> {
        let lo = self.world_to_canvas(bound.min.x, bound.min.y);
        let hi = self.world_to_canvas(bound.max.x, bound.max.y);
        GridRect::clamped(
            lo.x.floor() as i64,
            lo.y.floor() as i64,
            hi.x.ceil() as i64,
            hi.y.ceil() as i64,
            self.width,
            self.depth,
        )
    }

    pub fn world_rect(&self) -> WorldRect {
        WorldRect::new(
            self.origin,
            self.origin
                + Vec2::new(
                    (self.width.saturating_sub(1)) as f32,
                    (self.depth.saturating_sub(1)) as f32,
                ) * self.cell,
        )
    }

    /// Tile heightfield pixels whose world position lies on the canvas.
    pub fn tile_overlap(&self, store: &dyn TerrainGridStore) -> Option<TileOverlap> {
        let area = self.world_rect();
        let lo = world_to_heightfield(store, area.min.x, area.min.y);
        let hi = world_to_heightfield(store, area.max.x, area.max.y);
        let res = store.height_resolution();
        let rect = GridRect::clamped(
            (lo.x - SNAP_EPS).ceil() as i64,
            (lo.y - SNAP_EPS).ceil() as i64,
            (hi.x + SNAP_EPS).floor() as i64,
            (hi.y + SNAP_EPS).floor() as i64,
            res,
            res,
        )?;

        let canvas_index = rect
            .cells()
            .map(|(px, pz)| {
                let w = heightfield_to_world(store, px, pz);
                self.cell_at(w.x, w.y).map(|(cx, cz)| self.index(cx, cz))
            })
            .collect();
        Some(TileOverlap { rect, canvas_index })
    }
}

/// Heightfield rectangle of one tile that the canvas covers, with the canvas cell
/// behind each pixel (rect-local, row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct TileOverlap {
    pub rect: GridRect,
    pub canvas_index: Vec<Option<usize>>,
}

impl TileOverlap {
    #[inline]
    pub fn canvas_index_of(&self, px: usize, pz: usize) -> Option<usize> {
        if !self.rect.contains(px, pz) {
            return None;
        }
        self.canvas_index[self.rect.local_index(px, pz)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::terrain::tiles::TerrainSet;
    use glam::Vec3;

    fn two_tiles() -> TerrainSet {
        // 2 x 1 tiles of 16 m, 17 samples: 1 m cells, seam at x = 16
        TerrainSet::grid(
            Vec3::ZERO,
            Vec3::new(16.0, 100.0, 16.0),
            2,
            1,
            17,
            9,
            &["grass", "road"],
            |_, _| 10.0,
        )
    }

    #[test]
    fn heightfield_rect_is_padded_and_clamped() {
        let set = two_tiles();
        let tile = &set.tiles[0];
        let bound = WorldRect::new(Vec2::new(3.5, 4.0), Vec2::new(6.2, 30.0));
        let rect = heightfield_rect(tile, &bound).unwrap();
        assert_eq!(rect, GridRect { min_x: 2, min_z: 3, max_x: 8, max_z: 16 });
    }

    #[test]
    fn weight_conversion_rescales_proportionally() {
        let set = two_tiles();
        let tile = &set.tiles[0];
        assert_eq!(heightfield_to_weight(tile, 16, 16), (8, 8));
        assert_eq!(heightfield_to_weight(tile, 8, 0), (4, 0));
        assert_eq!(weight_to_heightfield(tile, 8, 4), (16, 8));
    }

    #[test]
    fn canvas_spans_both_tiles_and_is_clipped() {
        let set = two_tiles();
        let bound = WorldRect::new(Vec2::new(10.2, 2.0), Vec2::new(20.7, 6.0));
        let tiles = locate_tiles(&set, &bound);
        assert_eq!(tiles, vec![TileId(0), TileId(1)]);

        let canvas = VirtualCanvas::from_tiles(&set, &tiles, &bound).unwrap();
        assert_eq!(canvas.origin, Vec2::new(10.0, 2.0));
        assert_eq!(canvas.width, 12);
        assert_eq!(canvas.depth, 5);
        assert_eq!(canvas.cell_at(16.0, 4.0), Some((6, 2)));
        assert_eq!(canvas.cell_at(40.0, 4.0), None);
    }

    #[test]
    fn seam_pixels_of_both_tiles_share_a_canvas_cell() {
        let set = two_tiles();
        let bound = WorldRect::new(Vec2::new(12.0, 0.0), Vec2::new(20.0, 4.0));
        let tiles = locate_tiles(&set, &bound);
        let canvas = VirtualCanvas::from_tiles(&set, &tiles, &bound).unwrap();

        let left = canvas.tile_overlap(&set.tiles[0]).unwrap();
        let right = canvas.tile_overlap(&set.tiles[1]).unwrap();
        assert_eq!(left.rect, GridRect { min_x: 12, min_z: 0, max_x: 16, max_z: 4 });
        assert_eq!(right.rect, GridRect { min_x: 0, min_z: 0, max_x: 4, max_z: 4 });
        assert!(left.canvas_index.iter().all(Option::is_some));

        let left_seam = left.canvas_index_of(16, 2);
        let right_seam = right.canvas_index_of(0, 2);
        assert!(left_seam.is_some());
        assert_eq!(left_seam, right_seam);
    }
}
