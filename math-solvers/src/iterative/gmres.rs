//! GMRES (Generalized Minimal Residual) solver
//!
//! Restarted GMRES(m) after Saad & Schultz (1986) with right preconditioning:
//! the Krylov space is built for `A M` and the iterate is recovered as
//! `x = M y`. With right preconditioning the least-squares residual tracked by
//! the Givens rotations is the true residual `b - A x`, so the stopping test is
//! made on the quantity the caller cares about. A true residual is nevertheless
//! recomputed after every cycle to guard against loss of orthogonality.

use crate::blas_helpers::{axpy, inner_product, scale_inplace, vector_norm};
use crate::traits::{IdentityPreconditioner, LinearOperator, Preconditioner, Scalar};
use ndarray::{Array1, Array2};

/// GMRES solver configuration
#[derive(Debug, Clone)]
pub struct GmresConfig<R> {
    /// Maximum number of inner iterations (operator applications) over all cycles
    pub max_iterations: usize,
    /// Restart parameter (Krylov basis size before restart)
    pub restart: usize,
    /// Relative residual target ||b - Ax|| / ||b||
    pub tolerance: R,
    /// Log progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for GmresConfig<f64> {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            restart: 80,
            tolerance: 1e-6,
            print_interval: 0,
        }
    }
}

impl<R: Scalar> GmresConfig<R> {
    /// Create config with a specific tolerance and default limits
    pub fn with_tolerance(tolerance: R) -> Self {
        Self {
            max_iterations: 400,
            restart: 80,
            tolerance,
            print_interval: 0,
        }
    }
}

/// Outcome of a GMRES solve
///
/// Both variants carry the best available iterate; `NotConverged` means the
/// iteration cap was reached (or the Krylov process stagnated) before the
/// residual fell below the tolerance.
#[derive(Debug, Clone)]
pub enum GmresOutcome<T> {
    Converged {
        x: Array1<T>,
        iterations: usize,
        residual: T,
    },
    NotConverged {
        x: Array1<T>,
        iterations: usize,
        residual: T,
    },
}

impl<T: Scalar> GmresOutcome<T> {
    /// Whether the tolerance was reached
    pub fn is_converged(&self) -> bool {
        matches!(self, GmresOutcome::Converged { .. })
    }

    /// Number of operator applications inside Arnoldi steps
    pub fn iterations(&self) -> usize {
        match self {
            GmresOutcome::Converged { iterations, .. }
            | GmresOutcome::NotConverged { iterations, .. } => *iterations,
        }
    }

    /// Final relative true residual
    pub fn residual(&self) -> T {
        match self {
            GmresOutcome::Converged { residual, .. }
            | GmresOutcome::NotConverged { residual, .. } => *residual,
        }
    }

    /// Borrow the (best) solution vector
    pub fn solution(&self) -> &Array1<T> {
        match self {
            GmresOutcome::Converged { x, .. } | GmresOutcome::NotConverged { x, .. } => x,
        }
    }

    /// Take the (best) solution vector
    pub fn into_solution(self) -> Array1<T> {
        match self {
            GmresOutcome::Converged { x, .. } | GmresOutcome::NotConverged { x, .. } => x,
        }
    }
}

/// Solve Ax = b using restarted GMRES without preconditioning
pub fn gmres<T, A>(operator: &A, b: &Array1<T>, config: &GmresConfig<T>) -> GmresOutcome<T>
where
    T: Scalar,
    A: LinearOperator<T>,
{
    gmres_preconditioned(operator, &IdentityPreconditioner, b, config)
}

/// Solve Ax = b using right-preconditioned restarted GMRES
///
/// The iteration starts from a zero guess and is deterministic: the same
/// operator, preconditioner and right-hand side always produce the same
/// sequence of iterates.
pub fn gmres_preconditioned<T, A, P>(
    operator: &A,
    precond: &P,
    b: &Array1<T>,
    config: &GmresConfig<T>,
) -> GmresOutcome<T>
where
    T: Scalar,
    A: LinearOperator<T>,
    P: Preconditioner<T>,
{
    let n = b.len();
    let m = config.restart.max(1);
    let mut x = Array1::from_elem(n, T::zero());

    let b_norm = vector_norm(b);
    if b_norm <= T::min_positive_value() {
        return GmresOutcome::Converged {
            x,
            iterations: 0,
            residual: T::zero(),
        };
    }

    let breakdown_tol = T::from_f64_lossy(1e-14);
    let mut total_iterations = 0;
    let mut restarts = 0;
    let mut r = b.clone();

    loop {
        let beta = vector_norm(&r);
        let rel_residual = beta / b_norm;
        if rel_residual < config.tolerance {
            return GmresOutcome::Converged {
                x,
                iterations: total_iterations,
                residual: rel_residual,
            };
        }
        if total_iterations >= config.max_iterations {
            break;
        }

        // Krylov basis V
        let mut v: Vec<Array1<T>> = Vec::with_capacity(m + 1);
        let mut v0 = r.clone();
        scale_inplace(&mut v0, T::one() / beta);
        v.push(v0);

        // Upper Hessenberg matrix H
        let mut h: Array2<T> = Array2::from_elem((m + 1, m), T::zero());
        let mut cs: Vec<T> = Vec::with_capacity(m);
        let mut sn: Vec<T> = Vec::with_capacity(m);

        // Right-hand side of the least-squares problem
        let mut g: Array1<T> = Array1::from_elem(m + 1, T::zero());
        g[0] = beta;

        let mut k = 0;
        let mut stagnated = false;
        while k < m && total_iterations < config.max_iterations {
            total_iterations += 1;

            // w = A M v_k
            let z = precond.apply(&v[k]);
            let mut w = operator.apply(&z);

            // Modified Gram-Schmidt orthogonalization
            for i in 0..=k {
                let h_ik = inner_product(&v[i], &w);
                h[[i, k]] = h_ik;
                axpy(-h_ik, &v[i], &mut w);
            }
            let w_norm = vector_norm(&w);
            h[[k + 1, k]] = w_norm;

            let happy_breakdown = w_norm < breakdown_tol * beta;
            if !happy_breakdown {
                scale_inplace(&mut w, T::one() / w_norm);
                v.push(w);
            }

            // Apply previous Givens rotations to new column of H
            for i in 0..k {
                let temp = cs[i] * h[[i, k]] + sn[i] * h[[i + 1, k]];
                h[[i + 1, k]] = -sn[i] * h[[i, k]] + cs[i] * h[[i + 1, k]];
                h[[i, k]] = temp;
            }

            let (c, s) = givens_rotation(h[[k, k]], h[[k + 1, k]]);
            cs.push(c);
            sn.push(s);

            h[[k, k]] = c * h[[k, k]] + s * h[[k + 1, k]];
            h[[k + 1, k]] = T::zero();

            let temp = c * g[k] + s * g[k + 1];
            g[k + 1] = -s * g[k] + c * g[k + 1];
            g[k] = temp;
            k += 1;

            let estimate = g[k].abs() / b_norm;
            if config.print_interval > 0 && total_iterations % config.print_interval == 0 {
                log::debug!(
                    "GMRES iteration {} (restart {}): relative residual = {:.6e}",
                    total_iterations,
                    restarts,
                    estimate.to_f64().unwrap_or(0.0)
                );
            }

            if estimate < config.tolerance {
                break;
            }
            if happy_breakdown {
                stagnated = true;
                break;
            }
        }

        // x = x + M (V y)
        let y = solve_upper_triangular(&h, &g, k);
        let mut update = Array1::from_elem(n, T::zero());
        for (i, &yi) in y.iter().enumerate() {
            axpy(yi, &v[i], &mut update);
        }
        let correction = precond.apply(&update);
        axpy(T::one(), &correction, &mut x);

        let ax = operator.apply(&x);
        r = b - &ax;
        restarts += 1;

        if stagnated {
            let rel_residual = vector_norm(&r) / b_norm;
            if rel_residual < config.tolerance {
                continue;
            }
            log::debug!(
                "GMRES stagnated after {} iterations at relative residual {:.6e}",
                total_iterations,
                rel_residual.to_f64().unwrap_or(0.0)
            );
            break;
        }
    }

    let rel_residual = vector_norm(&r) / b_norm;
    if rel_residual < config.tolerance {
        GmresOutcome::Converged {
            x,
            iterations: total_iterations,
            residual: rel_residual,
        }
    } else {
        GmresOutcome::NotConverged {
            x,
            iterations: total_iterations,
            residual: rel_residual,
        }
    }
}

/// Compute Givens rotation coefficients
#[inline]
fn givens_rotation<T: Scalar>(a: T, b: T) -> (T, T) {
    if b == T::zero() {
        return (T::one(), T::zero());
    }
    if a == T::zero() {
        return (T::zero(), T::one());
    }
    let r = a.hypot(b);
    (a / r, b / r)
}

/// Solve upper triangular system Hy = g for the leading k x k block
fn solve_upper_triangular<T: Scalar>(h: &Array2<T>, g: &Array1<T>, k: usize) -> Vec<T> {
    let mut y = vec![T::zero(); k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[[i, j]] * y[j];
        }
        if h[[i, i]] != T::zero() {
            y[i] = sum / h[[i, i]];
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn config(tolerance: f64) -> GmresConfig<f64> {
        GmresConfig {
            max_iterations: 100,
            restart: 10,
            tolerance,
            print_interval: 0,
        }
    }

    /// Diagonally dominant non-symmetric test matrix
    fn test_matrix(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                4.0 + i as f64 * 0.1
            } else {
                0.5 / (1.0 + (i as f64 - 2.0 * j as f64).abs())
            }
        })
    }

    struct JacobiPreconditioner(Array1<f64>);

    impl Preconditioner<f64> for JacobiPreconditioner {
        fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
            r / &self.0
        }
    }

    #[test]
    fn test_gmres_simple() {
        let a = array![[4.0_f64, 1.0], [1.0, 3.0]];
        let b = array![1.0_f64, 2.0];

        let outcome = gmres(&a, &b, &config(1e-10));
        assert!(outcome.is_converged(), "GMRES should converge");

        let ax = a.dot(outcome.solution());
        let error = vector_norm(&(&ax - &b));
        assert!(error < 1e-8, "Solution should satisfy Ax = b");
    }

    #[test]
    fn test_gmres_identity() {
        let n = 5;
        let id = Array2::<f64>::eye(n);
        let b = Array1::from_iter((1..=n).map(|i| i as f64));

        let outcome = gmres(&id, &b, &config(1e-12));

        assert!(outcome.is_converged());
        assert!(outcome.iterations() <= 2);
        assert_relative_eq!(vector_norm(&(outcome.solution() - &b)), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_gmres_zero_rhs() {
        let a = test_matrix(4);
        let outcome = gmres(&a, &Array1::zeros(4), &config(1e-8));
        assert!(outcome.is_converged());
        assert_eq!(outcome.iterations(), 0);
        assert_relative_eq!(vector_norm(outcome.solution()), 0.0);
    }

    #[test]
    fn test_gmres_with_restarts() {
        let n = 30;
        let a = test_matrix(n);
        let b = Array1::from_iter((0..n).map(|i| (i as f64).sin() + 1.0));
        let cfg = GmresConfig {
            max_iterations: 300,
            restart: 5,
            tolerance: 1e-10,
            print_interval: 0,
        };

        let outcome = gmres(&a, &b, &cfg);
        assert!(outcome.is_converged());
        assert!(outcome.residual() < 1e-10);

        let ax = a.dot(outcome.solution());
        assert!(vector_norm(&(&ax - &b)) / vector_norm(&b) < 1e-9);
    }

    #[test]
    fn test_gmres_right_preconditioned_true_residual() {
        let n = 20;
        let a = test_matrix(n);
        let b = Array1::from_elem(n, 1.0);
        let precond = JacobiPreconditioner(a.diag().to_owned());

        let outcome = gmres_preconditioned(&a, &precond, &b, &config(1e-9));
        assert!(outcome.is_converged());

        let ax = a.dot(outcome.solution());
        let true_rel = vector_norm(&(&ax - &b)) / vector_norm(&b);
        assert!(true_rel < 1e-9);
        assert_relative_eq!(true_rel, outcome.residual(), epsilon = 1e-12);
    }

    #[test]
    fn test_gmres_reports_not_converged() {
        let n = 20;
        let a = test_matrix(n);
        let b = Array1::from_elem(n, 1.0);
        let cfg = GmresConfig {
            max_iterations: 2,
            restart: 10,
            tolerance: 1e-14,
            print_interval: 0,
        };

        let outcome = gmres(&a, &b, &cfg);
        assert!(!outcome.is_converged());
        assert_eq!(outcome.iterations(), 2);
        assert!(outcome.residual() < 1.0);
        assert_eq!(outcome.solution().len(), n);
    }

    #[test]
    fn test_gmres_tighter_tolerance_needs_more_iterations() {
        let n = 25;
        let a = test_matrix(n);
        let b = Array1::from_iter((0..n).map(|i| 1.0 + i as f64 * 0.01));

        let mut previous = 0;
        for tol in [1e-2, 1e-4, 1e-6, 1e-8] {
            let outcome = gmres(&a, &b, &config(tol));
            assert!(outcome.is_converged());
            assert!(outcome.iterations() >= previous);
            previous = outcome.iterations();
        }
    }

    #[test]
    fn test_gmres_is_deterministic() {
        let n = 15;
        let a = test_matrix(n);
        let b = Array1::from_iter((0..n).map(|i| (i as f64 * 0.3).cos()));

        let first = gmres(&a, &b, &config(1e-8)).into_solution();
        let second = gmres(&a, &b, &config(1e-8)).into_solution();
        assert_eq!(first, second);
    }
}
