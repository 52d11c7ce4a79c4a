//! Cartesian Taylor expansions of `1/r`
//!
//! Coefficients are indexed by multi-indices `α = (a, b, c)` with total degree
//! `|α| <= p`, ordered by degree. A multipole expansion about `c` stores the
//! moments `M_α = Σ q (y - c)^α`, so that
//!
//! ```text
//! φ(x) = Σ_α (-1)^|α| M_α T_α(x - c),    T_α = ∂^α (1/r) / α!
//! ```
//!
//! and a local expansion about `t` stores `L_β` with `φ(x) = Σ_β L_β (x - t)^β`.
//! All translation operators work on plain coefficient slices.

use crate::geometry::{Vec3, sub};

/// Highest supported expansion order
pub const MAX_ORDER: usize = 12;

/// Expansion order used when the configured order is 0
pub fn auto_order(num_panels: usize) -> usize {
    match num_panels {
        0..=5000 => 4,
        5001..=20000 => 3,
        _ => 2,
    }
}

/// Number of coefficients of an expansion of order `p`
pub fn num_terms(order: usize) -> usize {
    (order + 1) * (order + 2) * (order + 3) / 6
}

/// Precomputed multi-index tables for one expansion order
#[derive(Debug, Clone)]
pub struct Expansion {
    order: usize,
    /// Multi-index of each coefficient
    terms: Vec<[usize; 3]>,
    /// Total degree of each coefficient
    degree: Vec<usize>,
    /// Index of `α - e_i`, if any
    minus_one: Vec<[Option<usize>; 3]>,
    /// Index of `α - 2 e_i`, if any
    minus_two: Vec<[Option<usize>; 3]>,
    /// `(α, β, α - β, C(α, β))` for all `β <= α`
    shift_pairs: Vec<(usize, usize, usize, f64)>,
    /// `(α, β, α + β, (-1)^|α| C(α + β, α))` for `|α| + |β| <= p`
    m2l_pairs: Vec<(usize, usize, usize, f64)>,
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn multi_binomial(a: [usize; 3], b: [usize; 3]) -> f64 {
    (0..3).map(|i| binomial(a[i], b[i])).product()
}

impl Expansion {
    /// Build the tables for order `order` (at most [`MAX_ORDER`])
    pub fn new(order: usize) -> Self {
        let order = order.min(MAX_ORDER);
        let mut terms = Vec::with_capacity(num_terms(order));
        for deg in 0..=order {
            for a in (0..=deg).rev() {
                for b in (0..=deg - a).rev() {
                    terms.push([a, b, deg - a - b]);
                }
            }
        }

        let side = order + 1;
        let mut lookup = vec![usize::MAX; side * side * side];
        for (i, t) in terms.iter().enumerate() {
            lookup[(t[0] * side + t[1]) * side + t[2]] = i;
        }
        let find = |t: [isize; 3]| -> Option<usize> {
            if t.iter().any(|&c| c < 0) || t.iter().sum::<isize>() as usize > order {
                return None;
            }
            let [a, b, c] = t.map(|c| c as usize);
            Some(lookup[(a * side + b) * side + c])
        };

        let signed = |t: [usize; 3]| t.map(|c| c as isize);
        let minus = |t: [usize; 3], axis: usize, k: isize| {
            let mut s = signed(t);
            s[axis] -= k;
            find(s)
        };
        let minus_one = terms
            .iter()
            .map(|&t| [0, 1, 2].map(|axis| minus(t, axis, 1)))
            .collect();
        let minus_two = terms
            .iter()
            .map(|&t| [0, 1, 2].map(|axis| minus(t, axis, 2)))
            .collect();
        let degree = terms.iter().map(|t| t.iter().sum()).collect();

        let mut shift_pairs = Vec::new();
        let mut m2l_pairs = Vec::new();
        for (ia, &a) in terms.iter().enumerate() {
            for (ib, &b) in terms.iter().enumerate() {
                if (0..3).all(|i| b[i] <= a[i]) {
                    let diff = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
                    if let Some(id) = find(signed(diff)) {
                        shift_pairs.push((ia, ib, id, multi_binomial(a, b)));
                    }
                }
                let sum = [a[0] + b[0], a[1] + b[1], a[2] + b[2]];
                if let Some(is) = find(signed(sum)) {
                    let sign = if (a[0] + a[1] + a[2]) % 2 == 0 { 1.0 } else { -1.0 };
                    m2l_pairs.push((ia, ib, is, sign * multi_binomial(sum, a)));
                }
            }
        }

        Self {
            order,
            terms,
            degree,
            minus_one,
            minus_two,
            shift_pairs,
            m2l_pairs,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Multi-index of coefficient `i`
    pub fn term(&self, i: usize) -> [usize; 3] {
        self.terms[i]
    }

    /// Monomials `d^α` for every term
    pub fn powers(&self, d: Vec3, out: &mut [f64]) {
        out[0] = 1.0;
        for i in 1..self.terms.len() {
            let (prev, axis) = self.minus_one[i]
                .iter()
                .enumerate()
                .find_map(|(axis, p)| p.map(|p| (p, axis)))
                .unwrap_or((0, 0));
            out[i] = out[prev] * d[axis];
        }
    }

    /// Taylor coefficients `T_α(r) = ∂^α (1/|r|) / α!` for every term
    ///
    /// Uses `|k| r² T_k + (2|k| - 1) Σ_i r_i T_{k-e_i} + (|k| - 1) Σ_i T_{k-2e_i} = 0`.
    pub fn derivatives(&self, r: Vec3, out: &mut [f64]) {
        let r2 = r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
        out[0] = 1.0 / r2.sqrt();
        for i in 1..self.terms.len() {
            let k = self.degree[i] as f64;
            let mut acc = 0.0;
            for axis in 0..3 {
                if let Some(j) = self.minus_one[i][axis] {
                    acc += (2.0 * k - 1.0) * r[axis] * out[j];
                }
                if let Some(j) = self.minus_two[i][axis] {
                    acc += (k - 1.0) * out[j];
                }
            }
            out[i] = -acc / (k * r2);
        }
    }

    /// Accumulate `scale * Σ w (y - center)^α` over quadrature points into `out`
    pub fn add_moments(&self, points: &[(Vec3, f64)], center: Vec3, scale: f64, out: &mut [f64]) {
        let mut pw = vec![0.0; self.num_terms()];
        for (y, w) in points {
            self.powers(sub(*y, center), &mut pw);
            for (o, p) in out.iter_mut().zip(&pw) {
                *o += scale * w * p;
            }
        }
    }

    /// Translate moments about a child center to its parent; `d = child - parent`
    pub fn m2m(&self, child: &[f64], d: Vec3, parent: &mut [f64]) {
        let mut dp = vec![0.0; self.num_terms()];
        self.powers(d, &mut dp);
        for &(a, b, g, c) in &self.shift_pairs {
            parent[a] += c * dp[g] * child[b];
        }
    }

    /// Convert moments about `c` into a local expansion about `t`; `r = t - c`
    ///
    /// `scratch` must hold at least `num_terms` values.
    pub fn m2l(&self, moments: &[f64], r: Vec3, local: &mut [f64], scratch: &mut [f64]) {
        self.derivatives(r, scratch);
        for &(a, b, s, c) in &self.m2l_pairs {
            local[b] += c * moments[a] * scratch[s];
        }
    }

    /// Re-center a local expansion at a child; `d = child - parent`
    pub fn l2l(&self, parent: &[f64], d: Vec3, child: &mut [f64]) {
        let mut dp = vec![0.0; self.num_terms()];
        self.powers(d, &mut dp);
        for &(a, b, g, c) in &self.shift_pairs {
            child[b] += c * dp[g] * parent[a];
        }
    }

    /// Row mapping local coefficients to the potential at offset `z` from the center
    pub fn potential_row(&self, z: Vec3, out: &mut [f64]) {
        self.powers(z, out);
    }

    /// Row mapping local coefficients to `dir · ∇φ` at offset `z` from the center
    pub fn gradient_row(&self, z: Vec3, dir: Vec3, out: &mut [f64]) {
        let mut pw = vec![0.0; self.num_terms()];
        self.powers(z, &mut pw);
        for (i, t) in self.terms.iter().enumerate() {
            out[i] = (0..3)
                .filter_map(|axis| {
                    self.minus_one[i][axis].map(|j| dir[axis] * t[axis] as f64 * pw[j])
                })
                .sum();
        }
    }

    /// Evaluate a local expansion: potential and gradient at offset `z`
    pub fn evaluate_local(&self, local: &[f64], z: Vec3) -> (f64, Vec3) {
        let mut pw = vec![0.0; self.num_terms()];
        self.powers(z, &mut pw);
        let mut phi = 0.0;
        let mut grad = [0.0; 3];
        for (i, t) in self.terms.iter().enumerate() {
            phi += local[i] * pw[i];
            for axis in 0..3 {
                if let Some(j) = self.minus_one[i][axis] {
                    grad[axis] += local[i] * t[axis] as f64 * pw[j];
                }
            }
        }
        (phi, grad)
    }

    /// Evaluate a multipole expansion at offset `r = x - c`
    pub fn evaluate_multipole(&self, moments: &[f64], r: Vec3) -> f64 {
        let mut t = vec![0.0; self.num_terms()];
        self.derivatives(r, &mut t);
        self.degree
            .iter()
            .zip(moments.iter().zip(&t))
            .map(|(&deg, (m, d))| if deg % 2 == 0 { m * d } else { -m * d })
            .sum()
    }
}
