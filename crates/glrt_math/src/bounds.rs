use crate::Vec3;

/// Magnitude of the corners of an empty box.
///
/// A finite value rather than infinity, so that `area()` of an empty box stays
/// finite and `0 * area` is `0` in cost sums.
pub const BOUNDS_SENTINEL: f32 = 1.0e8;

/// Axis-aligned bounding box used for hierarchy construction and cost evaluation.
///
/// An empty box has `min` at `+BOUNDS_SENTINEL` and `max` at `-BOUNDS_SENTINEL`
/// on every axis, so merging anything into it yields that thing's true extrema.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Bounds {
    /// The identity element for `merge`.
    pub const EMPTY: Bounds = Bounds {
        min: Vec3::splat(BOUNDS_SENTINEL),
        max: Vec3::splat(-BOUNDS_SENTINEL),
    };

    /// Create a box from two corner points (in any order).
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Tight box around the three vertices of a triangle.
    pub fn from_triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            min: v0.min(v1.min(v2)),
            max: v0.max(v1.max(v2)),
        }
    }

    /// Grow this box to contain a point.
    pub fn merge_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Create a box that surrounds two other boxes.
    pub fn merge(a: &Bounds, b: &Bounds) -> Bounds {
        Bounds {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// True when nothing has been merged into this box yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Absolute extent along each axis.
    pub fn span(&self) -> Vec3 {
        (self.max - self.min).abs()
    }

    /// Total surface area, `2 * (xy + yz + zx)`.
    ///
    /// Only meaningful as a relative cost; an empty box reports the (large)
    /// area of its sentinel corners.
    pub fn area(&self) -> f32 {
        let s = self.span();
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// Returns the index (0=X, 1=Y, 2=Z) of the axis with the largest span.
    ///
    /// Ties go to the lowest axis.
    pub fn max_extent(&self) -> usize {
        let s = self.span();
        let max_span = s.x.max(s.y.max(s.z));
        if max_span == s.x {
            0
        } else if max_span == s.y {
            1
        } else {
            2
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_empty_is_merge_identity() {
        let b = Bounds::from_points(Vec3::new(-1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));

        assert_eq!(Bounds::merge(&Bounds::EMPTY, &b), b);
        assert_eq!(Bounds::merge(&b, &Bounds::EMPTY), b);
        assert!(Bounds::EMPTY.is_empty());
        assert!(!b.is_empty());
    }

    #[test]
    fn test_merge_point_establishes_extrema() {
        let mut b = Bounds::EMPTY;
        b.merge_point(Vec3::new(1.0, -2.0, 3.0));

        assert_eq!(b.min, Vec3::new(1.0, -2.0, 3.0));
        assert_eq!(b.max, Vec3::new(1.0, -2.0, 3.0));

        b.merge_point(Vec3::new(-1.0, 5.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 5.0, 3.0));
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let a = Bounds::from_points(Vec3::ZERO, Vec3::new(5.0, 5.0, 5.0));
        let b = Bounds::from_points(Vec3::new(3.0, -3.0, 3.0), Vec3::new(10.0, 1.0, 4.0));
        let c = Bounds::from_points(Vec3::new(-7.0, 2.0, 8.0), Vec3::new(-6.0, 2.5, 9.0));

        assert_eq!(Bounds::merge(&a, &b), Bounds::merge(&b, &a));
        assert_eq!(
            Bounds::merge(&Bounds::merge(&a, &b), &c),
            Bounds::merge(&a, &Bounds::merge(&b, &c))
        );
    }

    #[test]
    fn test_from_triangle() {
        let b = Bounds::from_triangle(
            Vec3::new(0.0, 1.0, 2.0),
            Vec3::new(3.0, -1.0, 0.0),
            Vec3::new(1.0, 4.0, 1.0),
        );

        assert_eq!(b.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(3.0, 4.0, 2.0));
    }

    #[test]
    fn test_area() {
        let b = Bounds::from_points(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        // 2 * (1*2 + 2*3 + 3*1)
        assert_eq!(b.area(), 22.0);

        let flat = Bounds::from_points(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(flat.area(), 0.0);

        assert!(Bounds::EMPTY.area().is_finite());
    }

    #[test]
    fn test_max_extent() {
        let bx = Bounds::from_points(Vec3::ZERO, Vec3::new(10.0, 1.0, 1.0));
        assert_eq!(bx.max_extent(), 0);

        let by = Bounds::from_points(Vec3::ZERO, Vec3::new(1.0, 10.0, 1.0));
        assert_eq!(by.max_extent(), 1);

        let bz = Bounds::from_points(Vec3::ZERO, Vec3::new(1.0, 1.0, 10.0));
        assert_eq!(bz.max_extent(), 2);
    }

    #[test]
    fn test_max_extent_ties_prefer_lower_axis() {
        let cube = Bounds::from_points(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(cube.max_extent(), 0);

        let yz = Bounds::from_points(Vec3::ZERO, Vec3::new(1.0, 3.0, 3.0));
        assert_eq!(yz.max_extent(), 1);

        let point = Bounds::from_points(Vec3::ONE, Vec3::ONE);
        assert_eq!(point.max_extent(), 0);
    }

    #[test]
    fn test_centroid() {
        let b = Bounds::from_points(Vec3::ZERO, Vec3::new(10.0, 10.0, 10.0));
        assert_eq!(b.centroid(), Vec3::new(5.0, 5.0, 5.0));
    }
}
