//! The delay PDE problem
//! $-u_(x x) + a u + b(x) u(t - tau) = lambda u$ on $(0, pi)$,
//! discretized by finite differences and solved near the origin.

extern crate nalgebra_sparse as nas;

use narnoldi::{
  lse::{DenseLu, LinearSolveOutcome, LinearSolveService},
  sparse::SparseMatrix,
  split::ShiftedOperator,
  store::ErrorKind,
  CVector, NArnoldi, NArnoldiConfig, NepError, ScalarFunction, SolveStatus, SplitOperator, C64,
};

use std::f64::consts::PI;

struct DelayMatrices {
  a: nas::CsrMatrix<f64>,
  id: nas::CsrMatrix<f64>,
  b: nas::CsrMatrix<f64>,
}

fn delay_matrices(n: usize) -> DelayMatrices {
  let h = PI / (n + 1) as f64;
  let a = SparseMatrix::tridiagonal(n, 1.0 / (h * h), -2.0 / (h * h) + 20.0, 1.0 / (h * h));
  let b: Vec<f64> = (0..n)
    .map(|i| {
      let x = (i + 1) as f64 * h;
      -4.1 + x * (1.0 - (x - PI).exp())
    })
    .collect();
  DelayMatrices {
    a: a.to_nalgebra_csr(),
    id: SparseMatrix::identity(n).to_nalgebra_csr(),
    b: SparseMatrix::from_diagonal(&b).to_nalgebra_csr(),
  }
}

fn delay_operator(m: &DelayMatrices, tau: f64) -> SplitOperator<'_> {
  SplitOperator::new(vec![
    (&m.a, ScalarFunction::one()),
    (&m.id, ScalarFunction::neg_identity()),
    (&m.b, ScalarFunction::exp_delay(tau)),
  ])
  .unwrap()
}

fn assert_eigenpair(op: &SplitOperator, lambda: C64, u: &CVector, tol: f64) {
  let residual = op.apply(lambda, u).unwrap().norm() / u.norm();
  assert!(
    residual <= tol * lambda.norm().max(1.0),
    "residual {residual:e} at lambda={lambda}"
  );
}

#[test]
fn default_start_converges() {
  let m = delay_matrices(16);
  let op = delay_operator(&m, 0.001);
  let config = NArnoldiConfig {
    tol: 1e-8,
    max_iterations: 50,
    ..Default::default()
  };

  let solution = NArnoldi::new(&op, &config).unwrap().solve();
  assert_eq!(solution.status, SolveStatus::Converged);
  assert!(solution.iterations <= 50);
  assert_eq!(solution.eigenpairs.count(), 1);

  let pair = solution.eigenpairs.get(0).unwrap();
  assert!(pair.error(ErrorKind::Relative) <= 1e-8);
  assert_eigenpair(&op, pair.eigenvalue, &pair.eigenvector, 1e-8);
}

#[test]
fn user_initial_vector_converges() {
  let n = 16;
  let m = delay_matrices(n);
  let op = delay_operator(&m, 0.001);
  let initv = CVector::from_fn(n, |i, _| {
    C64::new((4.0 * PI * i as f64 / n as f64).sin(), 0.0)
  });
  let config = NArnoldiConfig {
    max_iterations: 50,
    initial_space: vec![initv],
    ..Default::default()
  };

  let solution = NArnoldi::new(&op, &config).unwrap().solve();
  assert_eq!(solution.status, SolveStatus::Converged);
  let pair = solution.eigenpairs.get(0).unwrap();
  assert_eigenpair(&op, pair.eigenvalue, &pair.eigenvector, 1e-8);
}

#[test]
fn repeated_solves_are_identical() {
  let m = delay_matrices(16);
  let op = delay_operator(&m, 0.001);
  let config = NArnoldiConfig::default();
  let solver = NArnoldi::new(&op, &config).unwrap();

  let first = solver.solve();
  let second = solver.solve();
  assert_eq!(first.status, second.status);
  assert_eq!(first.iterations, second.iterations);
  assert_eq!(first.eigenpairs.eigenvalues(), second.eigenpairs.eigenvalues());
  assert_eq!(first.stats, second.stats);
}

#[test]
fn small_search_space_restarts_and_converges() {
  let m = delay_matrices(16);
  let op = delay_operator(&m, 0.001);
  let config = NArnoldiConfig {
    max_subspace_dim: Some(2),
    max_iterations: 100,
    ..Default::default()
  };

  let solution = NArnoldi::new(&op, &config).unwrap().solve();
  assert_eq!(solution.status, SolveStatus::Converged);
  assert!(solution.stats.restarts > 0);
  assert!(solution.history.iter().all(|r| r.subspace_dim <= 2));
  let pair = solution.eigenpairs.get(0).unwrap();
  assert_eigenpair(&op, pair.eigenvalue, &pair.eigenvector, 1e-8);
}

/// Forwards to an inner service and counts refreshes.
struct Counting<S> {
  inner: S,
  refreshes: usize,
  shifts: Vec<C64>,
}
impl<S: LinearSolveService> LinearSolveService for Counting<S> {
  fn refresh(&mut self, op: &ShiftedOperator) -> Result<(), NepError> {
    self.refreshes += 1;
    self.shifts.push(op.shift());
    self.inner.refresh(op)
  }
  fn solve(&mut self, op: &ShiftedOperator, rhs: &CVector) -> LinearSolveOutcome {
    self.inner.solve(op, rhs)
  }
}

#[test]
fn lag_bounds_refreshes() {
  let m = delay_matrices(16);
  let op = delay_operator(&m, 0.001);
  let config = NArnoldiConfig {
    tol: 1e-30,
    max_iterations: 12,
    lag: 4,
    ..Default::default()
  };

  let mut service = Counting {
    inner: DenseLu::default(),
    refreshes: 0,
    shifts: Vec::new(),
  };
  let solution = NArnoldi::new(&op, &config)
    .unwrap()
    .solve_with(&mut service);

  assert_eq!(solution.status, SolveStatus::MaxItReached);
  assert_eq!(solution.iterations, 12);
  assert!(service.refreshes <= 3);
  assert_eq!(service.refreshes, solution.stats.refreshes);
  assert_eq!(service.shifts[0], config.target);
  let refreshed: Vec<usize> = solution
    .history
    .iter()
    .filter(|r| r.refreshed)
    .map(|r| r.iteration)
    .collect();
  assert_eq!(refreshed.len(), service.refreshes);
}

#[test]
fn every_lag_setting_converges() {
  let m = delay_matrices(16);
  let op = delay_operator(&m, 0.001);
  for lag in [1, 2, 5] {
    let config = NArnoldiConfig {
      lag,
      ..Default::default()
    };
    let solution = NArnoldi::new(&op, &config).unwrap().solve();
    assert_eq!(solution.status, SolveStatus::Converged, "lag={lag}");
    let pair = solution.eigenpairs.get(0).unwrap();
    assert_eigenpair(&op, pair.eigenvalue, &pair.eigenvector, 1e-8);
  }
}
