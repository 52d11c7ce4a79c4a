//! Small fixed-size vector helpers and the axis-aligned box used by the tree.

/// A point or direction in 3-D space
pub type Vec3 = [f64; 3];

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    norm(sub(a, b))
}

/// Unit vector along `a`, or `None` for a (near) zero vector
#[inline]
pub fn normalize(a: Vec3) -> Option<Vec3> {
    let n = norm(a);
    if n > f64::MIN_POSITIVE && n.is_finite() {
        Some(scale(a, 1.0 / n))
    } else {
        None
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner coordinates
    pub min: Vec3,
    /// Maximum corner coordinates
    pub max: Vec3,
}

impl Aabb {
    /// An empty box that any point expands
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// Smallest box containing all `points`
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.expand(*p);
        }
        b
    }

    /// Expand the bounding box to include a point
    pub fn expand(&mut self, point: Vec3) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn center(&self) -> Vec3 {
        scale(add(self.min, self.max), 0.5)
    }

    /// Largest edge length
    pub fn max_dimension(&self) -> f64 {
        (0..3)
            .map(|i| self.max[i] - self.min[i])
            .fold(0.0, f64::max)
    }
}

/// Octant index (0-7) of `point` relative to `center`
///
/// Half-open convention: a coordinate equal to the center goes to the upper
/// half, so every point lands in exactly one octant.
#[inline]
pub fn octant(center: Vec3, point: Vec3) -> usize {
    let mut index = 0;
    if point[0] >= center[0] {
        index |= 1;
    }
    if point[1] >= center[1] {
        index |= 2;
    }
    if point[2] >= center[2] {
        index |= 4;
    }
    index
}

/// Center of child octant `index` of a cube with the given center and half width
#[inline]
pub fn octant_center(center: Vec3, half_width: f64, index: usize) -> Vec3 {
    let q = half_width * 0.5;
    let mut c = center;
    for (axis, bit) in [1usize, 2, 4].into_iter().enumerate() {
        c[axis] += if index & bit != 0 { q } else { -q };
    }
    c
}
