use crate::config::{ProcessingMode, RoadConfig, TerrainConfig};
use crate::errors::{CarveError, TileError};
use crate::renderer::gpu_carve::GpuCarver;
use crate::world::roads::road_mesh_manager::RoadGeometry;
use crate::helpers::positions::WorldRect;
use crate::world::terrain::blending::{blend_toward_layer, normalize};
use crate::world::terrain::rasterizer::CanvasGrid;
use crate::world::terrain::tile_locator::{
    VirtualCanvas, heightfield_rect, heightfield_rect_to_weight, locate_tiles,
    weight_to_heightfield,
};
use crate::world::terrain::tiles::{TerrainGridStore, TileId, TileRegistry};

/// Incoming weight cells further than this from a unit sum are renormalized first.
const WEIGHT_SUM_EPS: f32 = 1e-4;

pub enum CarveBackend {
    Cpu,
    Gpu(GpuCarver),
}

impl CarveBackend {
    /// GPU selection creates the device up front; failure is reported, not hidden.
    pub fn for_mode(mode: ProcessingMode) -> Result<Self, CarveError> {
        match mode {
            ProcessingMode::Cpu => Ok(CarveBackend::Cpu),
            ProcessingMode::Gpu => Ok(CarveBackend::Gpu(GpuCarver::new()?)),
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        match self {
            CarveBackend::Cpu => ProcessingMode::Cpu,
            CarveBackend::Gpu(_) => ProcessingMode::Gpu,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TileOutcome {
    Carved {
        heights_changed: usize,
        weight_cells_painted: usize,
    },
    /// The tile touched the road bound but no canvas sample landed on it.
    Untouched,
    Failed(TileError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TileReport {
    pub tile: TileId,
    pub outcome: TileOutcome,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub tiles: Vec<TileReport>,
    /// Set when the progress callback stopped processing between tiles.
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn carved(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| matches!(t.outcome, TileOutcome::Carved { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (TileId, &TileError)> {
        self.tiles.iter().filter_map(|t| match &t.outcome {
            TileOutcome::Failed(e) => Some((t.tile, e)),
            _ => None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileProgress {
    pub tile: TileId,
    /// Tiles committed so far.
    pub done: usize,
    pub total: usize,
}

/// Carve a road into every tile under its footprint. See [`TerrainEditor::apply_with_progress`].
pub fn apply(
    registry: &mut dyn TileRegistry,
    geometry: &RoadGeometry,
    road: &RoadConfig,
    terrain: &TerrainConfig,
) -> ApplyReport {
    let mut editor = TerrainEditor::new(CarveBackend::Cpu);
    match editor.apply(registry, geometry, road, terrain) {
        Ok(report) => report,
        // the CPU backend has no fallible stage
        Err(e) => {
            log::error!("cpu carve failed: {e}");
            ApplyReport::default()
        }
    }
}

pub struct TerrainEditor {
    backend: CarveBackend,
}

impl TerrainEditor {
    pub fn new(backend: CarveBackend) -> Self {
        Self { backend }
    }

    pub fn for_mode(mode: ProcessingMode) -> Result<Self, CarveError> {
        Ok(Self::new(CarveBackend::for_mode(mode)?))
    }

    pub fn mode(&self) -> ProcessingMode {
        self.backend.mode()
    }

    pub fn apply(
        &mut self,
        registry: &mut dyn TileRegistry,
        geometry: &RoadGeometry,
        road: &RoadConfig,
        terrain: &TerrainConfig,
    ) -> Result<ApplyReport, CarveError> {
        self.apply_with_progress(registry, geometry, road, terrain, |_| true)
    }

    /// Rasterize once into a shared canvas, then commit tile by tile. `progress` runs
    /// before each tile; returning false stops before that tile is touched.
    pub fn apply_with_progress(
        &mut self,
        registry: &mut dyn TileRegistry,
        geometry: &RoadGeometry,
        road: &RoadConfig,
        terrain: &TerrainConfig,
        mut progress: impl FnMut(&TileProgress) -> bool,
    ) -> Result<ApplyReport, CarveError> {
        let mut report = ApplyReport::default();

        let Some(mesh_bound) = geometry.world_bound() else {
            log::warn!("terrain carve skipped: road mesh is empty");
            return Ok(report);
        };
        let bound = mesh_bound.expand(terrain.feather_width.max(0.0));
        let tiles = locate_tiles(registry, &bound);
        let Some(canvas) = VirtualCanvas::from_tiles(registry, &tiles, &bound) else {
            log::info!("terrain carve skipped: no terrain tile under the road");
            return Ok(report);
        };

        log::debug!(
            "carving {} tile(s) through a {}x{} canvas ({:?})",
            tiles.len(),
            canvas.width,
            canvas.depth,
            self.backend.mode()
        );

        let mut grid = CanvasGrid::gather(registry, &tiles, canvas);
        match &mut self.backend {
            CarveBackend::Cpu => {
                grid.rasterize(geometry, road, terrain);
                grid.flatten(terrain.flatten_strength);
            }
            CarveBackend::Gpu(gpu) => gpu.carve(&mut grid, geometry, terrain)?,
        }
        grid.stylize(terrain);
        grid.feather(terrain);

        let total = tiles.len();
        for (done, &id) in tiles.iter().enumerate() {
            if !progress(&TileProgress { tile: id, done, total }) {
                log::info!("terrain carve stopped after {done}/{total} tiles");
                report.cancelled = true;
                break;
            }

            let tile = registry.tile_mut(id);
            let outcome = match commit_tile(tile, &grid, &bound, geometry, terrain) {
                Ok(Some((heights_changed, weight_cells_painted))) => TileOutcome::Carved {
                    heights_changed,
                    weight_cells_painted,
                },
                Ok(None) => TileOutcome::Untouched,
                Err(e) => {
                    log::warn!("tile {} skipped: {e}", id.0);
                    TileOutcome::Failed(e)
                }
            };
            report.tiles.push(TileReport { tile: id, outcome });
        }

        Ok(report)
    }
}

/// Terrain weight-layer index for every road layer.
fn resolve_layers(
    tile: &dyn TerrainGridStore,
    geometry: &RoadGeometry,
    terrain: &TerrainConfig,
) -> Result<Vec<usize>, TileError> {
    if let Some(atlas) = &terrain.atlas {
        let smart = tile
            .layer_index(&atlas.smart_layer)
            .ok_or_else(|| TileError::MissingTerrainLayer(atlas.smart_layer.clone()))?;
        return Ok(vec![smart; geometry.layers.len()]);
    }
    geometry
        .layers
        .iter()
        .map(|l| {
            tile.layer_index(&l.terrain_layer)
                .ok_or_else(|| TileError::MissingTerrainLayer(l.terrain_layer.clone()))
        })
        .collect()
}

/// Copy canvas results into one tile. None when no canvas cell lands on it.
fn commit_tile(
    tile: &mut dyn TerrainGridStore,
    grid: &CanvasGrid,
    bound: &WorldRect,
    geometry: &RoadGeometry,
    terrain: &TerrainConfig,
) -> Result<Option<(usize, usize)>, TileError> {
    if tile.height_resolution() < 2 || tile.weight_resolution() == 0 {
        return Err(TileError::MalformedGrid(format!(
            "height resolution {}, weight resolution {}",
            tile.height_resolution(),
            tile.weight_resolution()
        )));
    }
    if heightfield_rect(tile, bound).is_none() {
        return Ok(None);
    }
    let layer_count = tile.terrain_layers().len();
    if layer_count == 0 {
        return Err(TileError::MalformedGrid("no terrain layers registered".into()));
    }
    let layer_map = resolve_layers(tile, geometry, terrain)?;

    let Some(overlap) = grid.canvas.tile_overlap(tile) else {
        return Ok(None);
    };

    // ---- heights ----
    let mut heights = tile.read_heights(overlap.rect);
    let mut heights_changed = 0;
    for (h, ci) in heights.iter_mut().zip(&overlap.canvas_index) {
        let Some(ci) = *ci else { continue };
        if grid.covered[ci] && *h != grid.heights[ci] {
            *h = grid.heights[ci];
            heights_changed += 1;
        }
    }
    tile.write_heights(overlap.rect, &heights);

    // ---- weights ----
    let wrect = heightfield_rect_to_weight(tile, overlap.rect);
    let mut weights = tile.read_weights(wrect);
    let mut atlas = terrain
        .atlas
        .as_ref()
        .map(|_| tile.read_atlas_indices(wrect));
    let mut painted = 0;

    for (k, (wx, wz)) in wrect.cells().enumerate() {
        let (hx, hz) = weight_to_heightfield(tile, wx, wz);
        let Some(ci) = overlap.canvas_index_of(hx, hz) else {
            continue;
        };
        let record = grid.records[ci];
        if !record.is_set() {
            continue;
        }
        let layer = record.layer as usize;
        let cell = &mut weights[k * layer_count..(k + 1) * layer_count];
        if (cell.iter().sum::<f32>() - 1.0).abs() > WEIGHT_SUM_EPS {
            normalize(cell);
        }
        blend_toward_layer(cell, layer_map[layer], record.strength);
        painted += 1;

        if let (Some(values), Some(mapping)) = (atlas.as_mut(), terrain.atlas.as_ref()) {
            values[k] = mapping
                .rect_for(&geometry.layers[layer].material)
                .map_or(0, |(r, _)| r + 1);
        }
    }

    tile.write_weights(wrect, &weights);
    if let Some(values) = atlas {
        tile.write_atlas_indices(wrect, &values);
    }

    Ok(Some((heights_changed, painted)))
}
