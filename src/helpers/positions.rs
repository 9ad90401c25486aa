use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Axis aligned rectangle on the horizontal (XZ) plane. `min.y` / `max.y` hold Z.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldRect {
    #[inline]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_origin_size(origin: Vec3, size: Vec3) -> Self {
        Self {
            min: Vec2::new(origin.x, origin.z),
            max: Vec2::new(origin.x + size.x, origin.z + size.z),
        }
    }

    /// Smallest rect containing every point, or None for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        let mut any = false;
        for p in points {
            any = true;
            min = min.min(Vec2::new(p.x, p.z));
            max = max.max(Vec2::new(p.x, p.z));
        }
        any.then_some(Self { min, max })
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn depth(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y
    }

    #[inline]
    pub fn contains(&self, x: f32, z: f32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.y && z <= self.max.y
    }

    #[inline]
    pub fn intersects(&self, other: &WorldRect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn intersection(&self, other: &WorldRect) -> Option<WorldRect> {
        let r = WorldRect {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        };
        (!r.is_empty()).then_some(r)
    }

    pub fn union(&self, other: &WorldRect) -> WorldRect {
        WorldRect {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expand(&self, amount: f32) -> WorldRect {
        WorldRect {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }
}

/// Inclusive cell rectangle inside a grid. Always non-empty and inside the grid
/// it was clamped against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridRect {
    pub min_x: usize,
    pub min_z: usize,
    pub max_x: usize,
    pub max_z: usize,
}

impl GridRect {
    /// Clamp a signed span to `[0, res - 1]` on both axes. Returns None when the span
    /// misses the grid entirely.
    pub fn clamped(
        min_x: i64,
        min_z: i64,
        max_x: i64,
        max_z: i64,
        res_x: usize,
        res_z: usize,
    ) -> Option<GridRect> {
        if res_x == 0 || res_z == 0 {
            return None;
        }
        let hi_x = res_x as i64 - 1;
        let hi_z = res_z as i64 - 1;
        if max_x < 0 || max_z < 0 || min_x > hi_x || min_z > hi_z || min_x > max_x || min_z > max_z
        {
            return None;
        }
        Some(GridRect {
            min_x: min_x.clamp(0, hi_x) as usize,
            min_z: min_z.clamp(0, hi_z) as usize,
            max_x: max_x.clamp(0, hi_x) as usize,
            max_z: max_z.clamp(0, hi_z) as usize,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.max_z - self.min_z + 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width() * self.depth()
    }

    #[inline]
    pub fn contains(&self, x: usize, z: usize) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }

    /// Row-major index (z outer, x inner) of an absolute cell inside this rect.
    #[inline]
    pub fn local_index(&self, x: usize, z: usize) -> usize {
        (z - self.min_z) * self.width() + (x - self.min_x)
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.min_z..=self.max_z).flat_map(move |z| (self.min_x..=self.max_x).map(move |x| (x, z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_rect_rejects_spans_outside_grid() {
        assert!(GridRect::clamped(-5, -5, -1, 3, 8, 8).is_none());
        assert!(GridRect::clamped(8, 0, 12, 3, 8, 8).is_none());
        let r = GridRect::clamped(-2, 3, 20, 5, 8, 8).unwrap();
        assert_eq!(r, GridRect { min_x: 0, min_z: 3, max_x: 7, max_z: 5 });
        assert_eq!(r.len(), 24);
    }

    #[test]
    fn world_rect_intersection_and_union() {
        let a = WorldRect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let b = WorldRect::new(Vec2::new(5.0, -5.0), Vec2::new(15.0, 5.0));
        let i = a.intersection(&b).unwrap();
        assert_eq!(i.min, Vec2::new(5.0, 0.0));
        assert_eq!(i.max, Vec2::new(10.0, 5.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec2::new(0.0, -5.0));
        assert_eq!(u.max, Vec2::new(15.0, 10.0));

        let far = WorldRect::new(Vec2::new(50.0, 50.0), Vec2::new(60.0, 60.0));
        assert!(a.intersection(&far).is_none());
    }

    #[test]
    fn grid_rect_cells_are_row_major() {
        let r = GridRect { min_x: 2, min_z: 1, max_x: 3, max_z: 2 };
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(cells, vec![(2, 1), (3, 1), (2, 2), (3, 2)]);
        assert_eq!(r.local_index(3, 2), 3);
    }
}
