//! Mesh generators for common conductor shapes
//!
//! All generators return a [`Surface`] with outward-facing winding.

use std::collections::HashMap;

use crate::error::{FastcapError, Result};
use crate::geometry::{Vec3, add, normalize, scale};
use crate::surface::Surface;

/// Number of divisions so that no edge exceeds `max_edge`
fn divisions(length: f64, max_edge: f64) -> usize {
    ((length / max_edge).ceil() as usize).max(1)
}

fn check_positive(what: &str, v: f64) -> Result<()> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(FastcapError::geometry(format!(
            "{} must be positive and finite, got {}",
            what, v
        )))
    }
}

/// Mesh a parallelogram spanned by `u` and `v` from `origin` into `nu x nv` quads.
///
/// Panels are wound counter-clockwise about `u x v`.
fn mesh_parallelogram(surface: &mut Surface, origin: Vec3, u: Vec3, v: Vec3, nu: usize, nv: usize) {
    let du = scale(u, 1.0 / nu as f64);
    let dv = scale(v, 1.0 / nv as f64);
    for i in 0..nu {
        for j in 0..nv {
            let p = |a: usize, b: usize| add(origin, add(scale(du, a as f64), scale(dv, b as f64)));
            surface.add_quad(p(i, j), p(i + 1, j), p(i + 1, j + 1), p(i, j + 1));
        }
    }
}

/// Axis-aligned box `[origin, origin + size]` meshed with quads no longer than `max_edge`
pub fn box_surface(name: &str, origin: Vec3, size: Vec3, max_edge: f64) -> Result<Surface> {
    for (axis, len) in ["x", "y", "z"].iter().zip(size) {
        check_positive(&format!("box size along {}", axis), len)?;
    }
    check_positive("maximum edge", max_edge)?;

    let mut s = Surface::with_name(name)?;
    let [lx, ly, lz] = size;
    let (nx, ny, nz) = (
        divisions(lx, max_edge),
        divisions(ly, max_edge),
        divisions(lz, max_edge),
    );
    let ex = [lx, 0.0, 0.0];
    let ey = [0.0, ly, 0.0];
    let ez = [0.0, 0.0, lz];
    let o = origin;

    // bottom (-z) and top (+z)
    mesh_parallelogram(&mut s, o, ey, ex, ny, nx);
    mesh_parallelogram(&mut s, add(o, ez), ex, ey, nx, ny);
    // front (-y) and back (+y)
    mesh_parallelogram(&mut s, o, ex, ez, nx, nz);
    mesh_parallelogram(&mut s, add(o, ey), ez, ex, nz, nx);
    // left (-x) and right (+x)
    mesh_parallelogram(&mut s, o, ez, ey, nz, ny);
    mesh_parallelogram(&mut s, add(o, ex), ey, ez, ny, nz);

    Ok(s)
}

/// Zero-thickness rectangle in the plane `z = origin[2]`, normal along +z
pub fn plate(name: &str, origin: Vec3, width: f64, depth: f64, max_edge: f64) -> Result<Surface> {
    check_positive("plate width", width)?;
    check_positive("plate depth", depth)?;
    check_positive("maximum edge", max_edge)?;

    let mut s = Surface::with_name(name)?;
    mesh_parallelogram(
        &mut s,
        origin,
        [width, 0.0, 0.0],
        [0.0, depth, 0.0],
        divisions(width, max_edge),
        divisions(depth, max_edge),
    );
    Ok(s)
}

/// Triangulated sphere from a subdivided icosahedron
///
/// `subdivisions = 0` gives 20 triangles; each level multiplies by 4.
pub fn icosphere(name: &str, center: Vec3, radius: f64, subdivisions: usize) -> Result<Surface> {
    check_positive("sphere radius", radius)?;

    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut vertices: Vec<Vec3> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .filter_map(|v| normalize(*v))
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next = Vec::with_capacity(faces.len() * 4);
        for &[a, b, c] in &faces {
            let ab = midpoint(&mut vertices, &mut midpoints, a, b);
            let bc = midpoint(&mut vertices, &mut midpoints, b, c);
            let ca = midpoint(&mut vertices, &mut midpoints, c, a);
            next.push([a, ab, ca]);
            next.push([b, bc, ab]);
            next.push([c, ca, bc]);
            next.push([ab, bc, ca]);
        }
        faces = next;
    }

    let mut s = Surface::with_name(name)?;
    let place = |v: Vec3| add(center, scale(v, radius));
    for [a, b, c] in faces {
        s.add_tri(place(vertices[a]), place(vertices[b]), place(vertices[c]));
    }
    Ok(s)
}

/// Index of the unit-sphere midpoint of edge (a, b), created on first use
fn midpoint(
    vertices: &mut Vec<Vec3>,
    cache: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    if let Some(&i) = cache.get(&key) {
        return i;
    }
    let m = scale(add(vertices[a], vertices[b]), 0.5);
    vertices.push(normalize(m).unwrap_or(m));
    let i = vertices.len() - 1;
    cache.insert(key, i);
    i
}
