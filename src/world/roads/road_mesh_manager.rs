//# road_mesh_manager.rs
//! Cross-section extruder: turns sampled path points and layer profiles into a
//! multi-submesh road mesh, one submesh per layer.

use crate::config::{LayerLayout, RoadConfig, UvMode};
use crate::helpers::positions::WorldRect;
use crate::world::noise::LayeredNoise;
use crate::world::roads::path_sampler::{PathPoint, sample_path};
use crate::world::roads::road_structs::{ControlPoint, LayerProfile, RoadMesh, RoadVertex, SubMesh};
use crate::world::terrain::tiles::HeightQuery;
use glam::{Mat4, Vec3};
use rayon::prelude::*;

// ============================================================================
// Constants & Configuration
// ============================================================================

/// Smallest gap kept between a wobbled outer edge and its inner edge.
pub const MIN_EDGE_GAP: f32 = 0.1;
const VERTS_PER_LAYER: usize = 4;
const INDICES_PER_SEGMENT: usize = 12;

/// Lateral distances from the centerline for one layer at one sample. Left values
/// are distances toward `-right`, right values toward `+right`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerSpan {
    pub inner_left: f32,
    pub outer_left: f32,
    pub inner_right: f32,
    pub outer_right: f32,
}

/// Everything the terrain carver needs about a generated road.
#[derive(Clone, Debug, Default)]
pub struct RoadGeometry {
    pub mesh: RoadMesh,
    /// Road object transform; mesh vertices are in its local space.
    pub transform: Mat4,
    pub path: Vec<PathPoint>,
    /// Sample-major: `spans[sample * layers.len() + layer]`.
    pub spans: Vec<LayerSpan>,
    pub layers: Vec<LayerProfile>,
}

impl RoadGeometry {
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }

    #[inline]
    pub fn span(&self, sample: usize, layer: usize) -> LayerSpan {
        self.spans[sample * self.layers.len() + layer]
    }

    /// Triangles of one layer's submesh in world space.
    pub fn world_triangles(&self, layer: usize) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        let m = self.transform;
        self.mesh
            .triangles(layer)
            .map(move |t| t.map(|p| m.transform_point3(p)))
    }

    pub fn world_bound(&self) -> Option<WorldRect> {
        WorldRect::from_points(
            self.mesh
                .vertices
                .iter()
                .map(|v| self.transform.transform_point3(Vec3::from(v.position))),
        )
    }
}

// ============================================================================
// Mesh Builders
// ============================================================================

/// Mesh-only entry point. Never fails: degenerate input gives an empty mesh.
pub fn generate_mesh(
    points: &[ControlPoint],
    layers: &[LayerProfile],
    config: &RoadConfig,
    transform: Mat4,
) -> RoadMesh {
    build_road_geometry(points, layers, config, transform, None).mesh
}

pub fn build_road_geometry(
    points: &[ControlPoint],
    layers: &[LayerProfile],
    config: &RoadConfig,
    transform: Mat4,
    terrain: Option<&(dyn HeightQuery + Sync)>,
) -> RoadGeometry {
    if points.len() < 2 {
        log::warn!(
            "road generation skipped: need at least 2 control points, got {}",
            points.len()
        );
        return RoadGeometry {
            transform,
            ..Default::default()
        };
    }
    if layers.is_empty() {
        log::warn!("road generation skipped: no layers configured");
        return RoadGeometry {
            transform,
            ..Default::default()
        };
    }

    if transform.determinant().abs() <= f32::EPSILON || !transform.is_finite() {
        log::warn!("road generation skipped: road transform is singular");
        return RoadGeometry {
            transform,
            ..Default::default()
        };
    }

    let path = sample_path(points, config, terrain);
    let base = base_offsets(layers, config);
    let total_width = base
        .iter()
        .map(|&(_, outer)| outer)
        .fold(0.0f32, f32::max)
        * 2.0;
    let noise = LayeredNoise::new(&config.wobble);

    // Stage 4a: per-sample edge spans (wobble applied)
    let spans: Vec<LayerSpan> = path
        .par_iter()
        .flat_map_iter(|p| {
            let noise = &noise;
            layers
                .iter()
                .zip(base.iter())
                .enumerate()
                .map(move |(l, (layer, &(inner, outer)))| {
                    wobble_span(noise, layer, l, inner, outer, p.arc_length, config)
                })
        })
        .collect();

    // Stage 4b: per-sample vertex emission
    let inverse = transform.inverse();
    let layer_count = layers.len();
    let vertices: Vec<RoadVertex> = path
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, p)| {
            let spans = &spans[i * layer_count..(i + 1) * layer_count];
            emit_sample(p, layers, spans, config, total_width, &inverse)
        })
        .collect();

    let submeshes = build_submeshes(layers, path.len());

    log::debug!(
        "road mesh: {} samples, {} layers, {} vertices",
        path.len(),
        layer_count,
        vertices.len()
    );

    RoadGeometry {
        mesh: RoadMesh {
            vertices,
            submeshes,
        },
        transform,
        path,
        spans,
        layers: layers.to_vec(),
    }
}

/// Un-wobbled (inner, outer) lateral offsets per layer.
pub fn base_offsets(layers: &[LayerProfile], config: &RoadConfig) -> Vec<(f32, f32)> {
    let mult = config.width_multiplier.max(0.0);
    match config.layout {
        LayerLayout::Stacked => {
            let mut running = 0.0;
            layers
                .iter()
                .map(|layer| {
                    let inner = running;
                    let outer = inner + layer.width.max(0.0) * mult;
                    running = outer;
                    (inner, outer)
                })
                .collect()
        }
        LayerLayout::Independent => layers
            .iter()
            .map(|layer| {
                let half = layer.width.max(0.0) * mult * 0.5;
                let center = layer.offset_from_center.abs();
                ((center - half).max(0.0), center + half)
            })
            .collect(),
    }
}

fn wobble_span(
    noise: &LayeredNoise,
    layer: &LayerProfile,
    layer_index: usize,
    inner: f32,
    outer: f32,
    arc_length: f32,
    config: &RoadConfig,
) -> LayerSpan {
    let amplitude = layer.wobble_amplitude * config.wobble_multiplier;
    let gap = MIN_EDGE_GAP.min(outer - inner);
    let edge = |lane: f32| {
        if amplitude.abs() <= f32::EPSILON || outer - inner <= f32::EPSILON {
            return outer;
        }
        let n = noise.sample(arc_length, layer_index as f32 * 17.31 + lane, layer.wobble_frequency);
        (outer + n * amplitude).max(inner + gap)
    };

    LayerSpan {
        inner_left: inner,
        outer_left: edge(0.5),
        inner_right: inner,
        outer_right: edge(101.5),
    }
}

fn emit_sample(
    p: &PathPoint,
    layers: &[LayerProfile],
    spans: &[LayerSpan],
    config: &RoadConfig,
    total_width: f32,
    inverse: &Mat4,
) -> Vec<RoadVertex> {
    let normal_world = p.forward.cross(p.right).try_normalize().unwrap_or(Vec3::Y);
    let normal = inverse
        .transform_vector3(normal_world)
        .try_normalize()
        .unwrap_or(Vec3::Y)
        .to_array();

    let mut out = Vec::with_capacity(layers.len() * VERTS_PER_LAYER);
    for (l, (layer, span)) in layers.iter().zip(spans).enumerate() {
        let lift = Vec3::Y * (layer.vertical_offset + config.preview_height_offset);
        let corners = [
            -span.inner_left,
            -span.outer_left,
            span.inner_right,
            span.outer_right,
        ];
        for lateral in corners {
            let world = p.position + p.right * lateral + lift;
            let uv = match config.uv_mode {
                UvMode::Adaptive => {
                    let u = if total_width > f32::EPSILON {
                        0.5 + lateral / total_width
                    } else {
                        0.5
                    };
                    [u, p.arc_length * config.uv_scale]
                }
                UvMode::WorldSpace => [world.x * config.uv_scale, world.z * config.uv_scale],
            };
            out.push(RoadVertex {
                position: inverse.transform_point3(world).to_array(),
                normal,
                uv,
                layer: l as u32,
            });
        }
    }
    out
}

/// Two quads (left strip, right strip) per segment per layer.
fn build_submeshes(layers: &[LayerProfile], samples: usize) -> Vec<SubMesh> {
    let layer_count = layers.len();
    layers
        .iter()
        .enumerate()
        .map(|(l, layer)| {
            let segments = samples.saturating_sub(1);
            let mut indices = Vec::with_capacity(segments * INDICES_PER_SEGMENT);
            for i in 0..segments {
                let a = ((i * layer_count + l) * VERTS_PER_LAYER) as u32;
                let b = (((i + 1) * layer_count + l) * VERTS_PER_LAYER) as u32;
                let (il_a, ol_a, ir_a, or_a) = (a, a + 1, a + 2, a + 3);
                let (il_b, ol_b, ir_b, or_b) = (b, b + 1, b + 2, b + 3);

                // left strip
                indices.extend_from_slice(&[il_a, ol_a, il_b, ol_a, ol_b, il_b]);
                // right strip
                indices.extend_from_slice(&[ir_a, ir_b, or_a, or_a, ir_b, or_b]);
            }
            SubMesh {
                layer: l,
                material: layer.material.clone(),
                indices,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers() -> Vec<LayerProfile> {
        vec![
            LayerProfile::new("asphalt", 6.0, "road"),
            LayerProfile::new("shoulder", 2.0, "gravel"),
            LayerProfile::new("ditch", 1.5, "dirt"),
        ]
    }

    fn curve() -> Vec<ControlPoint> {
        vec![
            ControlPoint::new(Vec3::new(0.0, 0.0, 0.0)),
            ControlPoint::new(Vec3::new(10.0, 1.0, 20.0)),
            ControlPoint::new(Vec3::new(-5.0, 0.0, 40.0)),
        ]
    }

    #[test]
    fn vertex_and_index_counts_match_layout() {
        let config = RoadConfig {
            resolution: 24,
            ..Default::default()
        };
        let mesh = generate_mesh(&curve(), &layers(), &config, Mat4::IDENTITY);
        assert_eq!(mesh.vertices.len(), 25 * 3 * 4);
        assert_eq!(mesh.submeshes.len(), 3);
        assert_eq!(mesh.index_count(), 24 * 3 * 12);
        for sub in &mesh.submeshes {
            assert!(sub.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
            assert!(sub.indices.iter().all(|&i| mesh.vertices[i as usize].layer == sub.layer as u32));
        }
    }

    #[test]
    fn degenerate_input_gives_empty_mesh() {
        let config = RoadConfig::default();
        let one = vec![ControlPoint::new(Vec3::ZERO)];
        assert!(generate_mesh(&one, &layers(), &config, Mat4::IDENTITY).is_empty());
        assert!(generate_mesh(&curve(), &[], &config, Mat4::IDENTITY).is_empty());
        assert_eq!(generate_mesh(&[], &layers(), &config, Mat4::IDENTITY).index_count(), 0);
    }

    #[test]
    fn stacked_offsets_accumulate() {
        let offsets = base_offsets(&layers(), &RoadConfig::default());
        assert_eq!(offsets, vec![(0.0, 6.0), (6.0, 8.0), (8.0, 9.5)]);
    }

    #[test]
    fn independent_layers_may_overlap() {
        let mut ls = layers();
        ls[0].offset_from_center = 0.0;
        ls[1].offset_from_center = 2.0;
        ls[1].width = 4.0;
        let config = RoadConfig {
            layout: LayerLayout::Independent,
            resolution: 4,
            ..Default::default()
        };
        let offsets = base_offsets(&ls, &config);
        assert_eq!(offsets[0], (0.0, 3.0));
        assert_eq!(offsets[1], (0.0, 4.0));

        let geometry = build_road_geometry(&curve(), &ls, &config, Mat4::IDENTITY, None);
        assert_eq!(geometry.mesh.vertices.len(), 5 * 3 * 4);
        assert!(geometry.mesh.vertices.iter().all(|v| v.position.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn zero_width_layer_is_degenerate_but_valid() {
        let mut ls = layers();
        ls[1].width = 0.0;
        ls[1].wobble_amplitude = 2.0;
        let config = RoadConfig {
            resolution: 6,
            ..Default::default()
        };
        let geometry = build_road_geometry(&curve(), &ls, &config, Mat4::IDENTITY, None);
        for i in 0..geometry.path.len() {
            let span = geometry.span(i, 1);
            assert_eq!(span.outer_left, span.inner_left);
            assert_eq!(span.outer_right, span.inner_right);
        }
        for [a, b, c] in geometry.mesh.triangles(1) {
            let area = (b - a).cross(c - a).length();
            assert!(area < 1e-3);
        }
        assert_eq!(geometry.mesh.submeshes[1].indices.len(), 6 * 12);
    }

    #[test]
    fn wobble_never_crosses_inner_edge() {
        let mut ls = layers();
        for l in &mut ls {
            l.wobble_amplitude = 50.0;
            l.wobble_frequency = 0.7;
        }
        let config = RoadConfig {
            resolution: 64,
            ..Default::default()
        };
        let geometry = build_road_geometry(&curve(), &ls, &config, Mat4::IDENTITY, None);
        for span in &geometry.spans {
            assert!(span.outer_left - span.inner_left >= MIN_EDGE_GAP - 1e-6);
            assert!(span.outer_right - span.inner_right >= MIN_EDGE_GAP - 1e-6);
        }
    }

    #[test]
    fn vertices_are_in_local_space() {
        let transform = Mat4::from_translation(Vec3::new(100.0, 5.0, -50.0));
        let config = RoadConfig {
            resolution: 4,
            ..Default::default()
        };
        let geometry = build_road_geometry(&curve(), &layers(), &config, transform, None);
        // first inner-left vertex sits on the first control point
        let first = Vec3::from(geometry.mesh.vertices[0].position);
        assert!(first.distance(Vec3::new(-100.0, -5.0, 50.0)) < 1e-4);
        let tri = geometry.world_triangles(0).next().unwrap();
        assert!(tri[0].distance(Vec3::ZERO) < 1e-4);
    }

    #[test]
    fn adaptive_uvs_span_unit_range() {
        let config = RoadConfig {
            resolution: 8,
            ..Default::default()
        };
        let mesh = generate_mesh(&curve(), &layers(), &config, Mat4::IDENTITY);
        for v in &mesh.vertices {
            assert!((-1e-5..=1.0 + 1e-5).contains(&v.uv[0]));
        }
    }

    #[test]
    fn world_space_uvs_follow_world_xz() {
        let offset = Vec3::new(40.0, 2.0, -12.0);
        let config = RoadConfig {
            resolution: 8,
            uv_mode: UvMode::WorldSpace,
            uv_scale: 0.25,
            ..Default::default()
        };
        let mesh = generate_mesh(&curve(), &layers(), &config, Mat4::from_translation(offset));
        for v in &mesh.vertices {
            let world = Vec3::from(v.position) + offset;
            assert!((v.uv[0] - world.x * 0.25).abs() < 1e-4);
            assert!((v.uv[1] - world.z * 0.25).abs() < 1e-4);
        }
    }

    #[test]
    fn singular_transform_gives_empty_geometry() {
        let config = RoadConfig {
            resolution: 4,
            ..Default::default()
        };
        let flat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let geometry = build_road_geometry(&curve(), &layers(), &config, flat, None);
        assert!(geometry.is_empty());
        assert!(geometry.world_bound().is_none());
    }
}
