//! Uniform Catmull-Rom curve through the road control points.
//!
//! End segments duplicate the first/last point as the missing neighbour, which clamps
//! the end tangents and keeps the curve from overshooting past the path ends.

use crate::world::roads::road_structs::ControlPoint;
use glam::Vec3;

pub struct CatmullRom<'a> {
    points: &'a [ControlPoint],
}

impl<'a> CatmullRom<'a> {
    /// None for fewer than two points.
    pub fn new(points: &'a [ControlPoint]) -> Option<Self> {
        (points.len() >= 2).then_some(Self { points })
    }

    #[inline]
    pub fn segments(&self) -> usize {
        self.points.len() - 1
    }

    /// Active segment and local parameter `u` in [0, 1] for a global `t`.
    #[inline]
    pub fn locate(&self, t: f32) -> (usize, f32) {
        let segs = self.segments();
        let scaled = t.clamp(0.0, 1.0) * segs as f32;
        let seg = (scaled.floor() as usize).min(segs - 1);
        (seg, scaled - seg as f32)
    }

    fn control_quad(&self, seg: usize) -> [Vec3; 4] {
        let last = self.points.len() - 1;
        [
            self.points[seg.saturating_sub(1)].position,
            self.points[seg].position,
            self.points[seg + 1].position,
            self.points[(seg + 2).min(last)].position,
        ]
    }

    pub fn position(&self, t: f32) -> Vec3 {
        let (seg, u) = self.locate(t);
        let [p0, p1, p2, p3] = self.control_quad(seg);
        let u2 = u * u;
        let u3 = u2 * u;

        0.5 * (2.0 * p1
            + (p2 - p0) * u
            + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * u2
            + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * u3)
    }

    /// d(position)/dt, the analytic derivative of the same basis.
    pub fn velocity(&self, t: f32) -> Vec3 {
        let (seg, u) = self.locate(t);
        let [p0, p1, p2, p3] = self.control_quad(seg);
        let u2 = u * u;

        let d_du = 0.5
            * ((p2 - p0)
                + 2.0 * (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * u
                + 3.0 * (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * u2);
        d_du * self.segments() as f32
    }

    /// Roll in degrees, linear between the two control points of the active segment.
    pub fn roll(&self, t: f32) -> f32 {
        let (seg, u) = self.locate(t);
        let a = self.points[seg].roll;
        let b = self.points[seg + 1].roll;
        a + (b - a) * u
    }

    /// Unit forward direction. Zero velocity (duplicate points) falls back to the
    /// coarse path direction, then to +Z.
    pub fn forward(&self, t: f32) -> Vec3 {
        let v = self.velocity(t);
        if v.length_squared() > 1e-12 {
            return v.normalize();
        }
        self.coarse_direction()
    }

    pub fn coarse_direction(&self) -> Vec3 {
        let first = self.points[0].position;
        let last = self.points[self.points.len() - 1].position;
        (last - first).try_normalize().unwrap_or(Vec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(list: &[[f32; 3]]) -> Vec<ControlPoint> {
        list.iter().map(|p| ControlPoint::new(Vec3::from(*p))).collect()
    }

    #[test]
    fn passes_through_endpoints() {
        let points = pts(&[[0.0, 0.0, 0.0], [10.0, 2.0, 5.0], [20.0, -1.0, 0.0], [25.0, 0.0, 12.0]]);
        let curve = CatmullRom::new(&points).unwrap();
        assert!(curve.position(0.0).distance(points[0].position) < 1e-5);
        assert!(curve.position(1.0).distance(points[3].position) < 1e-5);
        // interior control points are hit at segment boundaries too
        assert!(curve.position(1.0 / 3.0).distance(points[1].position) < 1e-4);
    }

    #[test]
    fn tangent_is_continuous_across_segments() {
        let points = pts(&[[0.0, 0.0, 0.0], [10.0, 3.0, 8.0], [18.0, 0.0, -4.0], [30.0, 1.0, 2.0]]);
        let curve = CatmullRom::new(&points).unwrap();
        for boundary in [1.0 / 3.0, 2.0 / 3.0] {
            let eps = 1e-4;
            let before = curve.velocity(boundary - eps);
            let after = curve.velocity(boundary + eps);
            let rel = (before - after).length() / before.length();
            assert!(rel < 1e-2, "tangent jump {rel} at {boundary}");
        }
    }

    #[test]
    fn velocity_matches_position_derivative() {
        let points = pts(&[[0.0, 0.0, 0.0], [4.0, 1.0, 6.0], [9.0, 0.0, 2.0]]);
        let curve = CatmullRom::new(&points).unwrap();
        let t = 0.3;
        let h = 1e-3;
        let numeric = (curve.position(t + h) - curve.position(t - h)) / (2.0 * h);
        let analytic = curve.velocity(t);
        assert!((numeric - analytic).length() / analytic.length() < 1e-2);
    }

    #[test]
    fn duplicate_points_fall_back_to_default_forward() {
        let points = pts(&[[3.0, 0.0, 3.0], [3.0, 0.0, 3.0]]);
        let curve = CatmullRom::new(&points).unwrap();
        assert_eq!(curve.forward(0.5), Vec3::Z);
        assert!(CatmullRom::new(&points[..1]).is_none());
    }

    #[test]
    fn two_point_curve_is_straight() {
        let points = pts(&[[0.0, 0.0, 0.0], [0.0, 0.0, 10.0]]);
        let curve = CatmullRom::new(&points).unwrap();
        let mid = curve.position(0.5);
        assert!(mid.distance(Vec3::new(0.0, 0.0, 5.0)) < 1e-5);
        assert!(curve.forward(0.2).distance(Vec3::Z) < 1e-5);
    }
}
