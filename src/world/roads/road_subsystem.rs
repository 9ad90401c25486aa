use crate::config::{RoadConfig, Settings, TerrainConfig};
use crate::errors::CarveError;
use crate::world::roads::road_mesh_manager::{RoadGeometry, build_road_geometry};
use crate::world::roads::road_persistence::{export_control_points, import_control_points};
use crate::world::roads::road_structs::{ControlPoint, LayerProfile, RoadMesh};
use crate::world::terrain::neighbors::{ReconcileReport, reconcile};
use crate::world::terrain::terrain_editing::{ApplyReport, TerrainEditor, TileProgress};
use crate::world::terrain::tiles::{HeightQuery, TerrainSet};
use glam::{Mat4, Vec3};
use std::path::Path;

/// What changed in the road data, passed to observers after each mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoadChange {
    ControlPoints,
    Layers,
    Config,
    Transform,
    MeshGenerated,
    TerrainCarved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(RoadChange)>;

#[derive(Clone, Debug, PartialEq)]
pub struct ExecuteReport {
    pub apply: ApplyReport,
    pub reconcile: ReconcileReport,
}

/// Owner of one road's data. Every mutation goes through here so registered
/// observers (editors, previews) hear about it.
pub struct RoadSubsystem {
    points: Vec<ControlPoint>,
    layers: Vec<LayerProfile>,
    road: RoadConfig,
    terrain: TerrainConfig,
    transform: Mat4,
    geometry: RoadGeometry,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl RoadSubsystem {
    pub fn new(settings: &Settings) -> Self {
        Self {
            points: Vec::new(),
            layers: settings.layers.clone(),
            road: settings.road.clone(),
            terrain: settings.terrain.clone(),
            transform: Mat4::IDENTITY,
            geometry: RoadGeometry::default(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    // ---- observers ----

    pub fn subscribe(&mut self, observer: impl FnMut(RoadChange) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(o, _)| *o != id);
        self.observers.len() != before
    }

    fn notify(&mut self, change: RoadChange) {
        for (_, observer) in &mut self.observers {
            observer(change);
        }
    }

    // ---- data ----

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn layers(&self) -> &[LayerProfile] {
        &self.layers
    }

    pub fn road_config(&self) -> &RoadConfig {
        &self.road
    }

    pub fn terrain_config(&self) -> &TerrainConfig {
        &self.terrain
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn geometry(&self) -> &RoadGeometry {
        &self.geometry
    }

    pub fn mesh(&self) -> &RoadMesh {
        &self.geometry.mesh
    }

    pub fn set_points(&mut self, points: Vec<ControlPoint>) {
        self.points = points;
        self.notify(RoadChange::ControlPoints);
    }

    pub fn add_point(&mut self, position: Vec3) {
        self.points.push(ControlPoint::new(position));
        self.notify(RoadChange::ControlPoints);
    }

    /// Clamped to the end of the list.
    pub fn insert_point(&mut self, index: usize, point: ControlPoint) {
        let index = index.min(self.points.len());
        self.points.insert(index, point);
        self.notify(RoadChange::ControlPoints);
    }

    pub fn move_point(&mut self, index: usize, position: Vec3) -> bool {
        let Some(p) = self.points.get_mut(index) else {
            return false;
        };
        p.position = position;
        self.notify(RoadChange::ControlPoints);
        true
    }

    pub fn remove_point(&mut self, index: usize) -> Option<ControlPoint> {
        if index >= self.points.len() {
            return None;
        }
        let removed = self.points.remove(index);
        self.notify(RoadChange::ControlPoints);
        Some(removed)
    }

    pub fn set_layers(&mut self, mut layers: Vec<LayerProfile>) {
        for layer in &mut layers {
            if layer.width < 0.0 {
                log::warn!("layer '{}' has negative width, clamping to 0", layer.name);
                layer.width = 0.0;
            }
        }
        self.layers = layers;
        self.notify(RoadChange::Layers);
    }

    pub fn set_road_config(&mut self, config: RoadConfig) {
        self.road = config;
        self.notify(RoadChange::Config);
    }

    pub fn set_terrain_config(&mut self, config: TerrainConfig) {
        self.terrain = config;
        self.notify(RoadChange::Config);
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.notify(RoadChange::Transform);
    }

    // ---- persistence ----

    pub fn import_points<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CarveError> {
        let points = import_control_points(path)?;
        self.set_points(points);
        Ok(())
    }

    pub fn export_points<P: AsRef<Path>>(&self, path: P) -> Result<(), CarveError> {
        export_control_points(path, &self.points)
    }

    // ---- generation ----

    /// Rebuild the mesh, optionally conforming to terrain heights.
    pub fn generate_mesh(&mut self, terrain: Option<&(dyn HeightQuery + Sync)>) -> &RoadGeometry {
        self.geometry = build_road_geometry(
            &self.points,
            &self.layers,
            &self.road,
            self.transform,
            terrain,
        );
        self.notify(RoadChange::MeshGenerated);
        &self.geometry
    }

    /// Regenerate against the terrain, carve it, then reconcile tile seams and normals.
    pub fn execute(
        &mut self,
        terrain: &mut TerrainSet,
        editor: &mut TerrainEditor,
        progress: impl FnMut(&TileProgress) -> bool,
    ) -> Result<ExecuteReport, CarveError> {
        let query: &(dyn HeightQuery + Sync) = &*terrain;
        self.generate_mesh(Some(query));
        if self.geometry.is_empty() {
            return Ok(ExecuteReport {
                apply: ApplyReport::default(),
                reconcile: ReconcileReport::default(),
            });
        }

        let apply = editor.apply_with_progress(
            &mut *terrain,
            &self.geometry,
            &self.road,
            &self.terrain,
            progress,
        )?;
        let reconcile = reconcile(terrain);
        self.notify(RoadChange::TerrainCarved);

        log::info!(
            "road carved: {} tile(s) carved, {} failed, {} seam samples fixed",
            apply.carved(),
            apply.failures().count(),
            reconcile.seam_samples_fixed
        );
        Ok(ExecuteReport { apply, reconcile })
    }
}
