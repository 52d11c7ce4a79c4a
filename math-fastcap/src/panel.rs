//! Flat charge panels
//!
//! A panel is a planar triangle or quadrilateral carrying a uniform charge
//! density. Geometry is validated and derived once at construction:
//! centroid, unit normal, area and the largest edge.

use crate::error::{FastcapError, Result};
use crate::geometry::{Vec3, add, cross, distance, dot, norm, normalize, scale, sub};

/// Minimum ratio `area / max_edge^2` accepted as a non-degenerate panel
pub const MIN_AREA_RATIO: f64 = 1e-12;

/// Maximum `max_edge^2 / area` before a panel is considered numerically degenerate
pub const MAX_ASPECT_RATIO: f64 = 1e8;

/// Role of a panel in the linear system
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelKind {
    /// Charge panel on the surface of a conductor (index into the conductor table)
    Conductor { conductor: usize },
    /// Interface between two dielectrics; the normal points into the outer medium
    Dielectric { inner_perm: f64 },
}

/// How the panel normal is oriented
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Orientation {
    /// Right-hand rule on the vertex order
    #[default]
    Winding,
    /// Orient relative to a reference point.
    ///
    /// With `inside == false` the point lies in the outer medium and the normal
    /// points toward it; with `inside == true` it points away from it.
    Reference { point: Vec3, inside: bool },
}

/// A validated flat panel
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    /// Vertices projected onto the panel plane, in normal-consistent order
    pub vertices: Vec<Vec3>,
    /// Area centroid
    pub centroid: Vec3,
    /// Unit normal
    pub normal: Vec3,
    /// Area
    pub area: f64,
    /// Longest edge
    pub max_edge: f64,
    /// Largest distance from the centroid to a vertex
    pub radius: f64,
    /// Relative permittivity on the normal side (or surrounding a conductor)
    pub outer_perm: f64,
    /// Conductor or dielectric role
    pub kind: PanelKind,
}

impl Panel {
    /// Build and validate a panel.
    ///
    /// Fails with [`FastcapError::InputGeometry`] for a wrong vertex count,
    /// non-finite coordinates, (near) zero area or an inconsistently wound
    /// quadrilateral. Slightly non-planar quadrilaterals are projected onto
    /// their mean plane.
    pub fn new(
        vertices: &[Vec3],
        kind: PanelKind,
        outer_perm: f64,
        orientation: Orientation,
    ) -> Result<Self> {
        if vertices.len() != 3 && vertices.len() != 4 {
            return Err(FastcapError::geometry(format!(
                "a panel needs 3 or 4 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().flatten().any(|c| !c.is_finite()) {
            return Err(FastcapError::geometry("panel has non-finite coordinates"));
        }
        if !(outer_perm > 0.0) || !outer_perm.is_finite() {
            return Err(FastcapError::geometry(format!(
                "relative permittivity must be positive, got {}",
                outer_perm
            )));
        }
        if let PanelKind::Dielectric { inner_perm } = kind {
            if !(inner_perm > 0.0) || !inner_perm.is_finite() {
                return Err(FastcapError::geometry(format!(
                    "relative permittivity must be positive, got {}",
                    inner_perm
                )));
            }
        }

        let n = vertices.len();
        let max_edge = (0..n)
            .map(|i| distance(vertices[i], vertices[(i + 1) % n]))
            .fold(0.0, f64::max);

        if n == 4 {
            let v = vertices;
            let n1 = cross(sub(v[1], v[0]), sub(v[2], v[0]));
            let n2 = cross(sub(v[2], v[0]), sub(v[3], v[0]));
            if dot(n1, n2) <= 0.0 {
                return Err(FastcapError::geometry(format!(
                    "inconsistent winding in quadrilateral panel {:?}",
                    vertices
                )));
            }
        }

        // Newell normal; its length is the projected area
        let mut newell = [0.0; 3];
        for i in 0..n {
            newell = add(newell, cross(vertices[i], vertices[(i + 1) % n]));
        }
        let area = 0.5 * norm(newell);
        if !(area > MIN_AREA_RATIO * max_edge * max_edge) {
            return Err(FastcapError::geometry(format!(
                "degenerate panel with area {:.3e} (longest edge {:.3e})",
                area, max_edge
            )));
        }
        let mut normal = normalize(newell)
            .ok_or_else(|| FastcapError::geometry("panel normal is undefined"))?;

        // Project onto the mean plane
        let mean = scale(vertices.iter().fold([0.0; 3], |acc, v| add(acc, *v)), 1.0 / n as f64);
        let mut projected: Vec<Vec3> = vertices
            .iter()
            .map(|v| sub(*v, scale(normal, dot(sub(*v, mean), normal))))
            .collect();

        // Area-weighted centroid of the fan triangles
        let mut centroid = [0.0; 3];
        let mut total = 0.0;
        for k in 1..n - 1 {
            let (a, b, c) = (projected[0], projected[k], projected[k + 1]);
            let w = 0.5 * dot(cross(sub(b, a), sub(c, a)), normal);
            centroid = add(centroid, scale(add(add(a, b), c), w / 3.0));
            total += w;
        }
        let centroid = scale(centroid, 1.0 / total);

        if let Orientation::Reference { point, inside } = orientation {
            let side = dot(sub(point, centroid), normal);
            if (side < 0.0 && !inside) || (side > 0.0 && inside) {
                projected.reverse();
                normal = scale(normal, -1.0);
            }
        }

        let radius = projected
            .iter()
            .map(|v| distance(*v, centroid))
            .fold(0.0, f64::max);

        Ok(Self {
            vertices: projected,
            centroid,
            normal,
            area,
            max_edge,
            radius,
            outer_perm,
            kind,
        })
    }

    /// `max_edge^2 / area`, large for sliver panels
    pub fn aspect_ratio(&self) -> f64 {
        self.max_edge * self.max_edge / self.area
    }

    pub fn is_dielectric(&self) -> bool {
        matches!(self.kind, PanelKind::Dielectric { .. })
    }

    /// Conductor index for conductor panels
    pub fn conductor(&self) -> Option<usize> {
        match self.kind {
            PanelKind::Conductor { conductor } => Some(conductor),
            PanelKind::Dielectric { .. } => None,
        }
    }

    /// Copy of this panel shifted by `d`
    pub fn translated(&self, d: Vec3) -> Self {
        let mut p = self.clone();
        for v in p.vertices.iter_mut() {
            *v = add(*v, d);
        }
        p.centroid = add(p.centroid, d);
        p
    }
}
