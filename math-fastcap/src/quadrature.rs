//! Gauss-Legendre rules and panel quadrature
//!
//! Used for the multipole moments of a panel, where the integrand is a
//! polynomial of known degree and a tensor rule on collapsed triangles is
//! exact.

use std::f64::consts::PI;

use crate::geometry::{Vec3, add, cross, norm, scale, sub};

/// Gauss-Legendre abscissas and weights on [-1, 1]
///
/// Nodes are found by Newton iteration on the Legendre recurrence.
pub fn gauss_legendre(order: usize) -> (Vec<f64>, Vec<f64>) {
    let n = order.max(1);
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];

    for i in 0..n.div_ceil(2) {
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, d) = legendre(n, z);
            let dz = p / d;
            z -= dz;
            if dz.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(n, z);
        let weight = 2.0 / ((1.0 - z * z) * dp * dp);
        x[i] = -z;
        x[n - 1 - i] = z;
        w[i] = weight;
        w[n - 1 - i] = weight;
    }

    (x, w)
}

/// Legendre polynomial P_n(z) and its derivative
fn legendre(n: usize, z: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = z;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * z * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (z * p1 - p0) / (z * z - 1.0);
    (p1, dp)
}

/// Quadrature points and weights over a flat polygon
///
/// The polygon is fanned into triangles from its first vertex and each
/// triangle is integrated with a collapsed (Duffy) tensor rule of `order`
/// points per direction. Weights sum to the polygon area. The rule is exact
/// for polynomials of total degree `2 * order - 2`.
pub fn polygon_rule(vertices: &[Vec3], order: usize) -> Vec<(Vec3, f64)> {
    let (x, w) = gauss_legendre(order);
    let mut rule = Vec::with_capacity((vertices.len().saturating_sub(2)) * x.len() * x.len());

    for k in 1..vertices.len().saturating_sub(1) {
        let (a, b, c) = (vertices[0], vertices[k], vertices[k + 1]);
        let jac = norm(cross(sub(b, a), sub(c, a)));
        for (xu, wu) in x.iter().zip(&w) {
            let u = 0.5 * (xu + 1.0);
            for (xv, wv) in x.iter().zip(&w) {
                let v = 0.5 * (xv + 1.0);
                // y = a + u (b - a) + u v (c - b)
                let p = add(a, add(scale(sub(b, a), u), scale(sub(c, b), u * v)));
                rule.push((p, 0.25 * wu * wv * u * jac));
            }
        }
    }

    rule
}
