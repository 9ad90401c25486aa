use crate::config::RoadConfig;
use crate::world::roads::road_structs::ControlPoint;
use crate::world::roads::spline::CatmullRom;
use crate::world::terrain::tiles::HeightQuery;
use glam::{Quat, Vec3};
use rayon::prelude::*;

/// Forward vectors closer than this to vertical use the road-forward fallback for `right`.
const VERTICAL_DOT: f32 = 0.999;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPoint {
    pub position: Vec3,
    pub right: Vec3,
    pub forward: Vec3,
    /// Distance along the displayed path from the first sample.
    pub arc_length: f32,
}

/// Sample `config.resolution + 1` points along the curve. Empty when fewer than two
/// control points are given.
pub fn sample_path(
    points: &[ControlPoint],
    config: &RoadConfig,
    terrain: Option<&(dyn HeightQuery + Sync)>,
) -> Vec<PathPoint> {
    let Some(curve) = CatmullRom::new(points) else {
        return Vec::new();
    };
    let count = config.resolution.max(1) + 1;
    let step = 1.0 / (count - 1) as f32;
    let road_forward = horizontal(curve.coarse_direction());

    // Stage 1: raw curve samples
    let raw: Vec<(Vec3, Vec3, f32)> = (0..count)
        .into_par_iter()
        .map(|i| {
            let t = i as f32 * step;
            (curve.position(t), curve.forward(t), curve.roll(t))
        })
        .collect();

    // Stage 2: terrain conform
    let mut display: Vec<Vec3> = match terrain {
        Some(terrain) if config.conform_to_terrain => {
            let conformity = config.conformity.clamp(0.0, 1.0);
            raw.par_iter()
                .map(|&(p, _, _)| match terrain.height_at(p.x, p.z) {
                    Some(h) => Vec3::new(p.x, p.y + (h - p.y) * conformity, p.z),
                    None => p,
                })
                .collect()
        }
        _ => raw.iter().map(|&(p, _, _)| p).collect(),
    };

    if config.conform_to_terrain && config.smoothing_iterations > 0 {
        smooth_heights(
            &mut display,
            config.vertical_smoothness,
            config.smoothing_iterations,
        );
    }

    let arc = cumulative_lengths(&display);

    // Stage 3: frames
    raw.par_iter()
        .zip(display.par_iter())
        .zip(arc.par_iter())
        .map(|((&(_, forward, roll), &position), &arc_length)| PathPoint {
            position,
            right: right_vector(forward, road_forward, roll),
            forward,
            arc_length,
        })
        .collect()
}

/// Iterative 3-point Laplacian smooth over Y only. Endpoints stay fixed.
pub fn smooth_heights(points: &mut [Vec3], smoothness: f32, iterations: u32) {
    if points.len() < 3 {
        return;
    }
    let s = smoothness.clamp(0.0, 1.0);
    let mut prev: Vec<f32> = points.iter().map(|p| p.y).collect();

    for _ in 0..iterations {
        for i in 1..points.len() - 1 {
            let avg = (prev[i - 1] + prev[i + 1]) * 0.5;
            points[i].y = prev[i] + (avg - prev[i]) * s;
        }
        for (dst, p) in prev.iter_mut().zip(points.iter()) {
            *dst = p.y;
        }
    }
}

pub fn cumulative_lengths(points: &[Vec3]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += p.distance(points[i - 1]);
        }
        out.push(total);
    }
    out
}

/// `normalize(cross(up, forward))`, banked by `roll_deg` around forward.
pub fn right_vector(forward: Vec3, road_forward: Vec3, roll_deg: f32) -> Vec3 {
    let right = if forward.dot(Vec3::Y).abs() < VERTICAL_DOT {
        Vec3::Y.cross(forward).normalize()
    } else {
        road_forward
            .cross(forward)
            .try_normalize()
            .unwrap_or(Vec3::X)
    };

    if roll_deg.abs() > f32::EPSILON {
        Quat::from_axis_angle(forward, roll_deg.to_radians()) * right
    } else {
        right
    }
}

fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z).try_normalize().unwrap_or(Vec3::Z)
}
