//! Exact near-field integrals over flat panels
//!
//! For a flat polygon `S` with unit normal `n` and an evaluation point `x`:
//!
//! - [`potential`]: `∫_S 1/|x-y| dA`
//! - [`field`]: `∫_S (x-y)/|x-y|^3 dA`, the negative gradient of the potential
//!
//! Both are evaluated edge by edge in closed form. With `h` the height of `x`
//! above the panel plane and, per edge, `s-`/`s+` the signed distances of the
//! edge end points along the edge from the foot of `x`, `t0` the distance of
//! that foot to the edge line (positive inside), `R-`/`R+` the distances from
//! `x` to the end points:
//!
//! ```text
//! ∫ 1/R dA = Σ t0 ln((R+ + s+)/(R- + s-))
//!          - |h| Σ [atan(t0 s+ / (R0² + |h| R+)) - atan(t0 s- / (R0² + |h| R-))]
//! ```
//!
//! with `R0² = t0² + h²`. The field is `n Ω + Σ m ln((R+ + s+)/(R- + s-))`
//! where `Ω` is the signed solid angle and `m` the outward in-plane edge normal.
//! On the panel plane the normal component is taken as its principal value 0.

use crate::geometry::{Vec3, add, cross, dot, norm, normalize, scale, sub};
use crate::panel::Panel;

/// Relative tolerance for "on the plane" and "on the edge line" tests
const GEOM_EPS: f64 = 1e-12;

/// Per-edge quantities shared by the potential and the field
struct EdgeTerms {
    /// Outward in-plane edge normal
    m: Vec3,
    t0: f64,
    s_minus: f64,
    s_plus: f64,
    r_minus: f64,
    r_plus: f64,
}

fn edges<'a>(panel: &'a Panel, x: Vec3) -> impl Iterator<Item = EdgeTerms> + 'a {
    let v = &panel.vertices;
    let n = v.len();
    (0..n).filter_map(move |i| {
        let a = v[i];
        let b = v[(i + 1) % n];
        let l = normalize(sub(b, a))?;
        let m = cross(l, panel.normal);
        Some(EdgeTerms {
            m,
            t0: dot(sub(a, x), m),
            s_minus: dot(sub(a, x), l),
            s_plus: dot(sub(b, x), l),
            r_minus: norm(sub(a, x)),
            r_plus: norm(sub(b, x)),
        })
    })
}

/// `ln((R+ + s+)/(R- + s-))`, the integral of `1/R` along the edge
///
/// Uses the algebraically equal `ln((R- - s-)/(R+ - s+))` when the foot of
/// `x` lies beyond the start of the edge to avoid cancellation. Returns 0
/// when `x` lies on the edge itself.
fn edge_log(e: &EdgeTerms, tol: f64) -> f64 {
    if e.s_minus + e.s_plus >= 0.0 {
        let num = e.r_plus + e.s_plus;
        let den = e.r_minus + e.s_minus;
        if den <= tol || num <= tol {
            return 0.0;
        }
        (num / den).ln()
    } else {
        let num = e.r_minus - e.s_minus;
        let den = e.r_plus - e.s_plus;
        if den <= tol || num <= tol {
            return 0.0;
        }
        (num / den).ln()
    }
}

/// Height of `x` above the panel plane
fn height(panel: &Panel, x: Vec3) -> f64 {
    dot(sub(x, panel.centroid), panel.normal)
}

/// `∫_S 1/|x-y| dA` over the panel
pub fn potential(panel: &Panel, x: Vec3) -> f64 {
    let tol = GEOM_EPS * panel.max_edge;
    let h = height(panel, x).abs();
    let on_plane = h <= tol;

    let mut total = 0.0;
    for e in edges(panel, x) {
        if e.t0.abs() > tol {
            total += e.t0 * edge_log(&e, tol);
        }
        if !on_plane {
            let r0_sqr = e.t0 * e.t0 + h * h;
            let a_plus = (e.t0 * e.s_plus).atan2(r0_sqr + h * e.r_plus);
            let a_minus = (e.t0 * e.s_minus).atan2(r0_sqr + h * e.r_minus);
            total -= h * (a_plus - a_minus);
        }
    }
    total
}

/// Signed solid angle subtended by the panel at `x`
///
/// Positive when `x` is on the normal side. Zero on the panel plane.
pub fn solid_angle(panel: &Panel, x: Vec3) -> f64 {
    if height(panel, x).abs() <= GEOM_EPS * panel.max_edge {
        return 0.0;
    }
    let v = &panel.vertices;
    let a = sub(v[0], x);
    let la = norm(a);
    let mut omega = 0.0;
    for k in 1..v.len() - 1 {
        let b = sub(v[k], x);
        let c = sub(v[k + 1], x);
        let (lb, lc) = (norm(b), norm(c));
        let triple = dot(a, cross(b, c));
        let denom = la * lb * lc + dot(a, b) * lc + dot(a, c) * lb + dot(b, c) * la;
        omega -= 2.0 * triple.atan2(denom);
    }
    omega
}

/// `∫_S (x-y)/|x-y|^3 dA` over the panel
pub fn field(panel: &Panel, x: Vec3) -> Vec3 {
    let tol = GEOM_EPS * panel.max_edge;
    let h = height(panel, x);
    let mut g = scale(panel.normal, solid_angle(panel, x));
    for e in edges(panel, x) {
        let r0 = (e.t0 * e.t0 + h * h).sqrt();
        if r0 <= tol && e.s_minus <= 0.0 && e.s_plus >= 0.0 {
            continue;
        }
        g = add(g, scale(e.m, edge_log(&e, tol)));
    }
    g
}

/// Potential at `x` of the panel carrying unit total charge
#[inline]
pub fn potential_coefficient(panel: &Panel, x: Vec3) -> f64 {
    potential(panel, x) / panel.area
}

/// Field at `x` of the panel carrying unit total charge
#[inline]
pub fn field_coefficient(panel: &Panel, x: Vec3) -> Vec3 {
    scale(field(panel, x), 1.0 / panel.area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance;
    use crate::panel::{Orientation, PanelKind};
    use crate::quadrature::polygon_rule;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn make(vertices: &[Vec3]) -> Panel {
        Panel::new(
            vertices,
            PanelKind::Conductor { conductor: 0 },
            1.0,
            Orientation::Winding,
        )
        .unwrap()
    }

    fn unit_square() -> Panel {
        make(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]])
    }

    fn triangle() -> Panel {
        make(&[[0.0, 0.0, 0.0], [2.0, 0.2, 0.1], [0.5, 1.5, -0.2]])
    }

    /// Brute-force quadrature reference, valid away from the panel
    fn quad_potential(panel: &Panel, x: Vec3) -> f64 {
        polygon_rule(&panel.vertices, 16)
            .iter()
            .map(|(y, w)| w / distance(x, *y))
            .sum()
    }

    fn quad_field(panel: &Panel, x: Vec3) -> Vec3 {
        polygon_rule(&panel.vertices, 16)
            .iter()
            .fold([0.0; 3], |acc, (y, w)| {
                let d = sub(x, *y);
                let r = norm(d);
                add(acc, scale(d, w / (r * r * r)))
            })
    }

    #[test]
    fn test_self_potential_of_square() {
        let p = unit_square();
        // ∫ 1/r over a unit square from its center: 4 ln(1 + √2)
        let expected = 4.0 * (1.0 + 2.0_f64.sqrt()).ln();
        assert_relative_eq!(potential(&p, p.centroid), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_potential_matches_quadrature_off_panel() {
        for p in [unit_square(), triangle()] {
            for x in [[0.3, 0.4, 0.8], [2.5, -1.0, 0.3], [-0.5, 0.5, -1.2], [1.5, 1.5, 0.0]] {
                assert_relative_eq!(potential(&p, x), quad_potential(&p, x), max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_field_matches_quadrature_off_panel() {
        for p in [unit_square(), triangle()] {
            for x in [[0.3, 0.4, 0.8], [2.5, -1.0, 0.3], [-0.5, 0.5, -1.2]] {
                let exact = field(&p, x);
                let reference = quad_field(&p, x);
                for i in 0..3 {
                    assert_relative_eq!(exact[i], reference[i], epsilon = 1e-6, max_relative = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_point_charge_limit() {
        let p = triangle();
        let x = [300.0, -200.0, 400.0];
        let r = distance(x, p.centroid);
        assert_relative_eq!(potential_coefficient(&p, x), 1.0 / r, max_relative = 1e-4);
        let e = field_coefficient(&p, x);
        let d = sub(x, p.centroid);
        for i in 0..3 {
            assert_relative_eq!(e[i], d[i] / (r * r * r), max_relative = 1e-3);
        }
    }

    #[test]
    fn test_solid_angle_sign_and_limit() {
        let p = unit_square();
        // just above the center the square covers almost a hemisphere
        let above = solid_angle(&p, [0.5, 0.5, 1e-6]);
        assert_relative_eq!(above, 2.0 * PI, epsilon = 1e-4);
        let below = solid_angle(&p, [0.5, 0.5, -1e-6]);
        assert_relative_eq!(below, -2.0 * PI, epsilon = 1e-4);
        assert_eq!(solid_angle(&p, [0.5, 0.5, 0.0]), 0.0);
        // a cube face seen from the cube center subtends 4π/6
        assert_relative_eq!(solid_angle(&p, [0.5, 0.5, -0.5]), -4.0 * PI / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_in_plane_field_of_symmetric_panel_vanishes_at_center() {
        let p = unit_square();
        let g = field(&p, p.centroid);
        for c in g {
            assert_relative_eq!(c, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_potential_continuous_across_plane() {
        let p = triangle();
        let on = [0.8, 0.5, 0.0];
        let on = sub(on, scale(p.normal, dot(sub(on, p.centroid), p.normal)));
        let above = add(on, scale(p.normal, 1e-9));
        assert_relative_eq!(potential(&p, on), potential(&p, above), max_relative = 1e-7);
    }
}
