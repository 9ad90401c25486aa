use crate::world::terrain::tiles::{TerrainSet, TerrainTile, TileId, TileNeighbors};
use glam::Vec3;

/// Placement tolerance when matching tile borders, in world units.
const EDGE_EPS: f32 = 1e-3;

/// Heights one lattice step past each border, taken from the neighbouring tile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborEdgeHeights {
    /// Samples past the +X border (indexed by z).
    pub pos_x: Option<Vec<f32>>,
    /// Samples past the -X border (indexed by z).
    pub neg_x: Option<Vec<f32>>,
    /// Samples past the +Z border (indexed by x).
    pub pos_z: Option<Vec<f32>>,
    /// Samples past the -Z border (indexed by x).
    pub neg_z: Option<Vec<f32>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub links: usize,
    pub seam_samples_fixed: usize,
    pub normals_rebuilt: usize,
}

/// Relink neighbours, make shared seams agree, then rebuild normals of every dirty
/// tile and the tiles bordering it. Call after carving.
pub fn reconcile(set: &mut TerrainSet) -> ReconcileReport {
    let links = link_neighbors(set);
    let seam_samples_fixed = stitch_seams(set);

    let mut touched: Vec<TileId> = Vec::new();
    for (i, tile) in set.tiles.iter().enumerate() {
        if !tile.dirty {
            continue;
        }
        let n = tile.neighbors;
        for id in [Some(TileId(i)), n.left, n.right, n.back, n.front]
            .into_iter()
            .flatten()
        {
            if !touched.contains(&id) {
                touched.push(id);
            }
        }
    }
    touched.sort();

    for &id in &touched {
        let edges = gather_neighbor_edge_heights(set, id);
        regenerate_normals(&mut set.tiles[id.0], Some(&edges));
    }

    let report = ReconcileReport {
        links,
        seam_samples_fixed,
        normals_rebuilt: touched.len(),
    };
    log::debug!("reconciled tiles: {report:?}");
    report
}

#[inline]
fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= EDGE_EPS
}

/// Recompute left/right/back/front links from tile placement. Returns the number of
/// shared borders found.
pub fn link_neighbors(set: &mut TerrainSet) -> usize {
    let count = set.tiles.len();
    let mut links = vec![TileNeighbors::default(); count];
    let mut shared = 0;

    for a in 0..count {
        for b in 0..count {
            if a == b {
                continue;
            }
            let (ta, tb) = (&set.tiles[a], &set.tiles[b]);
            let same_row = close(ta.origin.z, tb.origin.z) && close(ta.size.z, tb.size.z);
            let same_col = close(ta.origin.x, tb.origin.x) && close(ta.size.x, tb.size.x);

            if same_row && close(ta.origin.x + ta.size.x, tb.origin.x) {
                links[a].right = Some(TileId(b));
                links[b].left = Some(TileId(a));
                shared += 1;
            }
            if same_col && close(ta.origin.z + ta.size.z, tb.origin.z) {
                links[a].front = Some(TileId(b));
                links[b].back = Some(TileId(a));
                shared += 1;
            }
        }
    }

    for (tile, n) in set.tiles.iter_mut().zip(links) {
        tile.neighbors = n;
    }
    shared
}

/// Average diverging samples on shared borders of equal resolution. Returns the
/// number of seam samples changed.
pub fn stitch_seams(set: &mut TerrainSet) -> usize {
    let mut fixed = 0;
    for a in 0..set.tiles.len() {
        let n = set.tiles[a].neighbors;
        if let Some(TileId(b)) = n.right {
            fixed += stitch_edge(set, a, b, Axis::X);
        }
        if let Some(TileId(b)) = n.front {
            fixed += stitch_edge(set, a, b, Axis::Z);
        }
    }
    fixed
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Z,
}

fn stitch_edge(set: &mut TerrainSet, a: usize, b: usize, axis: Axis) -> usize {
    let res = set.tiles[a].height_res;
    if set.tiles[b].height_res != res {
        log::debug!("seam {a}<->{b} skipped: resolution {res} vs {}", set.tiles[b].height_res);
        return 0;
    }
    let last = res - 1;
    let mut fixed = 0;

    for k in 0..res {
        let (ia, ib) = match axis {
            Axis::X => (k * res + last, k * res),
            Axis::Z => (last * res + k, k),
        };
        let ha = set.tiles[a].heights[ia];
        let hb = set.tiles[b].heights[ib];
        if ha != hb {
            let mid = (ha + hb) * 0.5;
            set.tiles[a].heights[ia] = mid;
            set.tiles[b].heights[ib] = mid;
            set.tiles[a].dirty = true;
            set.tiles[b].dirty = true;
            fixed += 1;
        }
    }
    fixed
}

/// Heights one cell past each border of `id`, sampled bilinearly from its neighbours.
pub fn gather_neighbor_edge_heights(set: &TerrainSet, id: TileId) -> NeighborEdgeHeights {
    let Some(own) = set.get(id) else {
        return NeighborEdgeHeights::default();
    };
    let res = own.height_res;
    let cell = own.cell_size();
    let (x0, z0) = (own.origin.x, own.origin.z);
    let (x1, z1) = (x0 + own.size.x, z0 + own.size.z);
    let links = own.neighbors;

    let edge = |neighbor: Option<TileId>, at: &dyn Fn(usize) -> (f32, f32)| {
        let tile = set.get(neighbor?)?;
        (0..res)
            .map(|k| {
                let (x, z) = at(k);
                tile.sample_height(x, z)
            })
            .collect::<Option<Vec<f32>>>()
    };

    NeighborEdgeHeights {
        pos_x: edge(links.right, &|k| (x1 + cell.x, z0 + k as f32 * cell.y)),
        neg_x: edge(links.left, &|k| (x0 - cell.x, z0 + k as f32 * cell.y)),
        pos_z: edge(links.front, &|k| (x0 + k as f32 * cell.x, z1 + cell.y)),
        neg_z: edge(links.back, &|k| (x0 + k as f32 * cell.x, z0 - cell.y)),
    }
}

/// Central-difference normals. Border samples use the neighbour edge when given,
/// otherwise fall back to a one-sided difference.
pub fn regenerate_normals(tile: &mut TerrainTile, neighbor_edges: Option<&NeighborEdgeHeights>) {
    let res = tile.height_res;
    let cell = tile.cell_size();
    let h = |x: usize, z: usize| tile.heights[z * res + x];
    let mut normals = vec![Vec3::Y; res * res];

    for z in 0..res {
        for x in 0..res {
            let here = h(x, z);

            let (h_l, span_l) = if x > 0 {
                (h(x - 1, z), 1.0)
            } else {
                neighbor_edges
                    .and_then(|n| n.neg_x.as_ref())
                    .and_then(|e| e.get(z).copied())
                    .map_or((here, 0.0), |v| (v, 1.0))
            };
            let (h_r, span_r) = if x + 1 < res {
                (h(x + 1, z), 1.0)
            } else {
                neighbor_edges
                    .and_then(|n| n.pos_x.as_ref())
                    .and_then(|e| e.get(z).copied())
                    .map_or((here, 0.0), |v| (v, 1.0))
            };
            let (h_d, span_d) = if z > 0 {
                (h(x, z - 1), 1.0)
            } else {
                neighbor_edges
                    .and_then(|n| n.neg_z.as_ref())
                    .and_then(|e| e.get(x).copied())
                    .map_or((here, 0.0), |v| (v, 1.0))
            };
            let (h_u, span_u) = if z + 1 < res {
                (h(x, z + 1), 1.0)
            } else {
                neighbor_edges
                    .and_then(|n| n.pos_z.as_ref())
                    .and_then(|e| e.get(x).copied())
                    .map_or((here, 0.0), |v| (v, 1.0))
            };

            let dx_span: f32 = span_l + span_r;
            let dz_span: f32 = span_d + span_u;
            let dhdx = if dx_span > 0.0 { (h_r - h_l) / (dx_span * cell.x) } else { 0.0 };
            let dhdz = if dz_span > 0.0 { (h_u - h_d) / (dz_span * cell.y) } else { 0.0 };

            normals[z * res + x] = Vec3::new(-dhdx, 1.0, -dhdz).normalize();
        }
    }
    tile.normals = normals;
}
