//! Small projected problem $T_m(lambda) = sum_k f_k(lambda) V^H M_k V$
//! and its dense solver by successive linear problems.

use crate::{
  error::NepError,
  function::is_finite,
  split::SplitOperator,
  CMatrix, CVector, C64,
};

use num_traits::Zero;

const SCHUR_MAX_ITERATIONS: usize = 1000;
const MAX_PERTURBATIONS: usize = 8;

#[derive(Debug, Clone)]
pub struct InnerConfig {
  /// SLP stops once $|mu| <= "tol" max(1, |lambda|)$.
  pub tol: f64,
  pub max_iterations: usize,
}
impl Default for InnerConfig {
  fn default() -> Self {
    Self {
      tol: 1e-12,
      max_iterations: 50,
    }
  }
}

/// Eigenvalues that must not be found again.
#[derive(Debug, Clone, Copy)]
pub struct Deflation<'l> {
  pub locked: &'l [C64],
  /// Relative distance below which a value counts as locked.
  pub radius: f64,
}
impl Deflation<'_> {
  pub fn none() -> Deflation<'static> {
    Deflation {
      locked: &[],
      radius: 0.0,
    }
  }
  pub fn admits(&self, lambda: C64) -> bool {
    self
      .locked
      .iter()
      .all(|l| (lambda - l).norm() > self.radius * l.norm().max(1.0))
  }
}

#[derive(Debug, Clone)]
pub struct ProjectedPair {
  pub eigenvalue: C64,
  /// Unit coefficient vector $y$ with $T_m(lambda) y approx 0$.
  pub coeffs: CVector,
  pub iterations: usize,
  pub converged: bool,
}

pub struct ProjectedProblem<'s, 'a> {
  split: &'s SplitOperator<'a>,
  matrices: Vec<CMatrix>,
}

impl<'s, 'a> ProjectedProblem<'s, 'a> {
  pub fn new(split: &'s SplitOperator<'a>, basis: &CMatrix) -> Self {
    let matrices = split.projected_matrices(basis);
    Self { split, matrices }
  }

  pub fn dim(&self) -> usize {
    self.matrices[0].nrows()
  }
  pub fn matrices(&self) -> &[CMatrix] {
    &self.matrices
  }

  /// Returns $(T_m(lambda), T'_m(lambda))$.
  pub fn eval(&self, lambda: C64) -> Result<(CMatrix, CMatrix), NepError> {
    let (values, derivatives) = self.split.coefficients(lambda)?;
    let m = self.dim();
    let mut t = CMatrix::zeros(m, m);
    let mut tp = CMatrix::zeros(m, m);
    for ((mat, v), d) in self.matrices.iter().zip(values).zip(derivatives) {
      t += mat * v;
      tp += mat * d;
    }
    Ok((t, tp))
  }

  /// Successive linear problems started at `seed`.
  ///
  /// Each step solves the pencil $T_m(lambda) x = mu T'_m(lambda) x$ and moves
  /// to $lambda - mu$ for the admissible $mu$ of smallest modulus.
  pub fn solve_slp(
    &self,
    seed: C64,
    deflation: Deflation,
    config: &InnerConfig,
  ) -> Result<ProjectedPair, NepError> {
    let mut lambda = seed;
    let mut converged = false;
    let mut perturbations = 0;
    let mut iterations = 0;

    while iterations < config.max_iterations {
      iterations += 1;
      let (t, tp) = match self.eval(lambda) {
        Ok(mats) => mats,
        Err(err) if perturbations < MAX_PERTURBATIONS => {
          tracing::trace!("slp: {err}; moving off lambda={lambda}");
          perturbations += 1;
          lambda += perturbation(lambda);
          continue;
        }
        Err(err) => return Err(err),
      };

      let step = pencil_eigenvalues(&t, &tp)
        .into_iter()
        .filter(|&mu| deflation.admits(lambda - mu))
        .min_by(|a, b| a.norm().total_cmp(&b.norm()));

      let Some(mu) = step else {
        if perturbations == MAX_PERTURBATIONS {
          tracing::trace!("slp stagnated at lambda={lambda}");
          break;
        }
        perturbations += 1;
        lambda += perturbation(lambda);
        continue;
      };

      lambda -= mu;
      tracing::trace!("slp it={iterations} lambda={lambda} |mu|={:.3e}", mu.norm());
      if mu.norm() <= config.tol * lambda.norm().max(1.0) {
        converged = true;
        break;
      }
    }

    let coeffs = self.null_vector(lambda)?;
    Ok(ProjectedPair {
      eigenvalue: lambda,
      coeffs,
      iterations,
      converged,
    })
  }

  /// Right singular vector of the smallest singular value of $T_m(lambda)$.
  pub fn null_vector(&self, lambda: C64) -> Result<CVector, NepError> {
    let (t, _) = self.eval(lambda)?;
    let svd = t.svd(false, true);
    let imin = svd.singular_values.argmin().0;
    let mut y = match svd.v_t {
      Some(v_t) => v_t.row(imin).adjoint(),
      None => return Err(NepError::EvaluationFailure { lambda }),
    };
    let norm = y.norm();
    if norm == 0.0 || !norm.is_finite() {
      return Err(NepError::EvaluationFailure { lambda });
    }
    y.unscale_mut(norm);
    Ok(y)
  }
}

/// Finite eigenvalues $mu$ of the pencil $(A, B)$, $A x = mu B x$.
fn pencil_eigenvalues(a: &CMatrix, b: &CMatrix) -> Vec<C64> {
  if let Some(m) = b.clone().lu().solve(a) {
    if m.iter().all(|z| is_finite(*z)) {
      return eigenvalues(m);
    }
  }
  // $B$ singular: use the reciprocal eigenvalues of $A^(-1) B$.
  match a.clone().lu().solve(b) {
    Some(m) if m.iter().all(|z| is_finite(*z)) => eigenvalues(m)
      .into_iter()
      .filter(|nu| !nu.is_zero())
      .map(|nu| nu.inv())
      .filter(|mu| is_finite(*mu))
      .collect(),
    _ => Vec::new(),
  }
}

fn eigenvalues(m: CMatrix) -> Vec<C64> {
  if m.nrows() == 1 {
    return vec![m[(0, 0)]];
  }
  na::Schur::try_new(m, f64::EPSILON, SCHUR_MAX_ITERATIONS)
    .and_then(|schur| schur.eigenvalues())
    .map(|evs| evs.iter().copied().filter(|z| is_finite(*z)).collect())
    .unwrap_or_default()
}

/// Complex kick off a point where no step is defined, e.g. a critical point
/// of a real problem or a pole of some $f_k$.
fn perturbation(lambda: C64) -> C64 {
  C64::new(1e-3, 1e-3) * lambda.norm().max(1.0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{function::ScalarFunction, sparse::SparseMatrix};
  use approx::assert_abs_diff_eq;

  fn c(re: f64, im: f64) -> C64 {
    C64::new(re, im)
  }

  #[test]
  fn linear_pencil_is_solved_in_one_step() {
    // T(lambda) = A - lambda I with A = diag(1, 3, 7).
    let a = SparseMatrix::from_diagonal(&[1.0, 3.0, 7.0]).to_nalgebra_csr();
    let id = SparseMatrix::identity(3).to_nalgebra_csr();
    let op = SplitOperator::new(vec![
      (&a, ScalarFunction::one()),
      (&id, ScalarFunction::neg_identity()),
    ])
    .unwrap();
    let basis = CMatrix::identity(3, 3);
    let problem = ProjectedProblem::new(&op, &basis);

    let pair = problem
      .solve_slp(c(2.6, 0.0), Deflation::none(), &InnerConfig::default())
      .unwrap();
    assert!(pair.converged);
    assert_abs_diff_eq!((pair.eigenvalue - c(3.0, 0.0)).norm(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(pair.coeffs[1].norm(), 1.0, epsilon = 1e-10);
  }

  #[test]
  fn deflation_skips_locked_eigenvalue() {
    let a = SparseMatrix::from_diagonal(&[1.0, 3.0, 7.0]).to_nalgebra_csr();
    let id = SparseMatrix::identity(3).to_nalgebra_csr();
    let op = SplitOperator::new(vec![
      (&a, ScalarFunction::one()),
      (&id, ScalarFunction::neg_identity()),
    ])
    .unwrap();
    let basis = CMatrix::identity(3, 3);
    let problem = ProjectedProblem::new(&op, &basis);

    let locked = [c(3.0, 0.0)];
    let deflation = Deflation {
      locked: &locked,
      radius: 1e-6,
    };
    let pair = problem
      .solve_slp(c(2.6, 0.0), deflation, &InnerConfig::default())
      .unwrap();
    assert!(pair.converged);
    assert_abs_diff_eq!((pair.eigenvalue - c(1.0, 0.0)).norm(), 0.0, epsilon = 1e-12);
  }

  #[test]
  fn quadratic_critical_point_reaches_complex_root() {
    // T(lambda) = (lambda^2 + 1) I, T'(0) = 0.
    let id = SparseMatrix::identity(2).to_nalgebra_csr();
    let op = SplitOperator::new(vec![(&id, ScalarFunction::polynomial(&[1.0, 0.0, 1.0]))]).unwrap();
    let basis = CMatrix::from_fn(2, 1, |i, _| c((i == 0) as u8 as f64, 0.0));
    let problem = ProjectedProblem::new(&op, &basis);

    let pair = problem
      .solve_slp(C64::zero(), Deflation::none(), &InnerConfig::default())
      .unwrap();
    assert!(pair.converged);
    assert_abs_diff_eq!(pair.eigenvalue.re, 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(pair.eigenvalue.im.abs(), 1.0, epsilon = 1e-10);
  }

  #[test]
  fn seed_at_pole_is_moved_off() {
    // T(lambda) = (lambda - 2) / lambda, undefined at the seed.
    let id = SparseMatrix::identity(1).to_nalgebra_csr();
    let op = SplitOperator::new(vec![(&id, ScalarFunction::rational(&[-2.0, 1.0], &[0.0, 1.0]))])
      .unwrap();
    let basis = CMatrix::identity(1, 1);
    let problem = ProjectedProblem::new(&op, &basis);
    assert!(problem.eval(C64::zero()).is_err());

    let pair = problem
      .solve_slp(C64::zero(), Deflation::none(), &InnerConfig::default())
      .unwrap();
    assert!(pair.converged);
    assert_abs_diff_eq!((pair.eigenvalue - c(2.0, 0.0)).norm(), 0.0, epsilon = 1e-10);
  }

  #[test]
  fn nonlinear_scalar_root() {
    // T(lambda) = exp(-lambda) - 0.5, root ln 2.
    let id = SparseMatrix::identity(1).to_nalgebra_csr();
    let op = SplitOperator::new(vec![
      (&id, ScalarFunction::exp(-1.0, 0.0)),
      (&id, ScalarFunction::constant(-0.5)),
    ])
    .unwrap();
    let basis = CMatrix::identity(1, 1);
    let problem = ProjectedProblem::new(&op, &basis);
    let pair = problem
      .solve_slp(C64::zero(), Deflation::none(), &InnerConfig::default())
      .unwrap();
    assert!(pair.converged);
    assert_abs_diff_eq!(
      (pair.eigenvalue - c(2f64.ln(), 0.0)).norm(),
      0.0,
      epsilon = 1e-12
    );
  }
}
