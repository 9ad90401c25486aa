use glam::Vec3;
use serde::{Deserialize, Serialize};

/// User placed anchor on the road centerline. Order in the owning list is path order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    pub position: Vec3,
    /// Bank angle in degrees around the local forward axis.
    #[serde(default)]
    pub roll: f32,
    /// Reserved for hand-authored tangents; the curve ignores it.
    #[serde(default)]
    pub tangent: Vec3,
}

impl ControlPoint {
    #[inline]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            roll: 0.0,
            tangent: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn with_roll(position: Vec3, roll: f32) -> Self {
        Self {
            position,
            roll,
            tangent: Vec3::ZERO,
        }
    }
}

/// One band of the road cross-section (asphalt, shoulder, ditch...).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LayerProfile {
    pub name: String,
    pub width: f32,
    pub vertical_offset: f32,
    /// Render material for this layer's submesh.
    pub material: String,
    /// Terrain texture layer painted under this band.
    pub terrain_layer: String,
    pub blend_strength: f32,
    pub offset_from_center: f32,
    pub wobble_frequency: f32,
    pub wobble_amplitude: f32,
    /// Inspector fold state, not used by generation.
    pub expanded: bool,
}

impl Default for LayerProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 4.0,
            vertical_offset: 0.0,
            material: String::new(),
            terrain_layer: String::new(),
            blend_strength: 1.0,
            offset_from_center: 0.0,
            wobble_frequency: 0.2,
            wobble_amplitude: 0.0,
            expanded: true,
        }
    }
}

impl LayerProfile {
    pub fn new(name: &str, width: f32, terrain_layer: &str) -> Self {
        Self {
            name: name.to_string(),
            width,
            material: name.to_string(),
            terrain_layer: terrain_layer.to_string(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Mesh Output
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct RoadVertex {
    /// Position in the road object's local space.
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub layer: u32,
}

/// Triangle list for one layer, drawn with that layer's material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubMesh {
    pub layer: usize,
    pub material: String,
    pub indices: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoadMesh {
    pub vertices: Vec<RoadVertex>,
    pub submeshes: Vec<SubMesh>,
}

impl RoadMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn index_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.indices.len()).sum()
    }

    /// Vertex positions of every triangle in a submesh.
    pub fn triangles(&self, submesh: usize) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.submeshes[submesh].indices.chunks_exact(3).map(|t| {
            [
                Vec3::from(self.vertices[t[0] as usize].position),
                Vec3::from(self.vertices[t[1] as usize].position),
                Vec3::from(self.vertices[t[2] as usize].position),
            ]
        })
    }
}
