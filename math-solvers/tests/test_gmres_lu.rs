//! GMRES against the dense LU solution on a potential-coefficient matrix

use ndarray::{Array1, Array2, s};
use solvers::{
    GmresConfig, LuFactorization, Preconditioner, gmres, gmres_preconditioned, lu_factorize,
    lu_solve,
};

/// Collocation matrix of 1/r between points on a spiral, with a dominant self term
fn potential_matrix(n: usize) -> Array2<f64> {
    let points: Vec<[f64; 3]> = (0..n)
        .map(|i| {
            let t = i as f64 * 0.37;
            [t.cos() * (1.0 + 0.1 * t), t.sin() * (1.0 + 0.1 * t), 0.05 * t]
        })
        .collect();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            8.0
        } else {
            let d: f64 = (0..3).map(|k| (points[i][k] - points[j][k]).powi(2)).sum();
            1.0 / d.sqrt()
        }
    })
}

/// Block-Jacobi preconditioner from exact LU factors of diagonal blocks
struct BlockJacobi {
    blocks: Vec<(usize, usize, LuFactorization<f64>)>,
    size: usize,
}

impl BlockJacobi {
    fn new(a: &Array2<f64>, block: usize) -> Self {
        let n = a.nrows();
        let blocks = (0..n)
            .step_by(block)
            .map(|start| {
                let end = (start + block).min(n);
                let sub = a.slice(s![start..end, start..end]).to_owned();
                (start, end, lu_factorize(&sub).unwrap())
            })
            .collect();
        Self { blocks, size: n }
    }
}

impl Preconditioner<f64> for BlockJacobi {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(self.size);
        for (start, end, lu) in &self.blocks {
            let rb = r.slice(s![*start..*end]).to_owned();
            if let Ok(yb) = lu.solve(&rb) {
                y.slice_mut(s![*start..*end]).assign(&yb);
            }
        }
        y
    }
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

#[test]
fn test_gmres_matches_lu() {
    let n = 120;
    let a = potential_matrix(n);
    let b = Array1::from_shape_fn(n, |i| if i < n / 2 { 1.0 } else { 0.0 });

    let exact = lu_solve(&a, &b).unwrap();
    let outcome = gmres(&a, &b, &GmresConfig::with_tolerance(1e-10));
    assert!(outcome.is_converged());
    let error = norm(&(outcome.solution() - &exact)) / norm(&exact);
    assert!(error < 1e-8, "relative error {error:.3e}");
}

#[test]
fn test_preconditioning_reduces_iterations() {
    let n = 120;
    let a = potential_matrix(n);
    let b = Array1::from_elem(n, 1.0);
    let config = GmresConfig::with_tolerance(1e-8);

    let plain = gmres(&a, &b, &config);
    let precond = BlockJacobi::new(&a, 20);
    let preconditioned = gmres_preconditioned(&a, &precond, &b, &config);

    assert!(plain.is_converged() && preconditioned.is_converged());
    assert!(preconditioned.iterations() <= plain.iterations());
    let diff = norm(&(plain.solution() - preconditioned.solution())) / norm(plain.solution());
    assert!(diff < 1e-6);
}

#[test]
fn test_iteration_cap_reports_best_iterate() {
    let n = 80;
    let a = potential_matrix(n);
    let b = Array1::from_elem(n, 1.0);
    let config = GmresConfig {
        max_iterations: 3,
        restart: 2,
        tolerance: 1e-12,
        print_interval: 1,
    };

    let outcome = gmres(&a, &b, &config);
    assert!(!outcome.is_converged());
    assert!(outcome.iterations() <= 3);
    assert!(outcome.residual() < 1.0);
    let r = &b - &a.dot(outcome.solution());
    assert!((norm(&r) / norm(&b) - outcome.residual()).abs() < 1e-10);
}
