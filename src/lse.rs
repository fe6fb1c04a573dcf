//! Linear systems $T(sigma) t = r$ arising in the correction step.
//!
//! The outer iteration talks to a [`LinearSolveService`]. Which service is
//! used is chosen by [`LinearSolverConfig`].

use crate::{error::NepError, split::ShiftedOperator, CMatrix, CVector, C64};

use faer::{complex_native::c64, solvers::SpSolver};
use num_traits::Zero;

#[derive(Debug, Clone)]
pub struct LinearSolveOutcome {
  pub solution: CVector,
  pub converged: bool,
  pub iterations: usize,
  /// $norm(b - A x) / norm(b)$
  pub residual: f64,
}

pub trait LinearSolveService {
  /// Rebuilds the preconditioner or factorization for the given operator.
  fn refresh(&mut self, op: &ShiftedOperator) -> Result<(), NepError>;

  /// Solves `op * x = rhs`. A non-converged outcome still carries the
  /// last iterate.
  fn solve(&mut self, op: &ShiftedOperator, rhs: &CVector) -> LinearSolveOutcome;
}

#[derive(Debug, Clone)]
pub enum LinearSolverConfig {
  Krylov(KrylovConfig),
  SparseLu,
  DenseLu,
}
impl Default for LinearSolverConfig {
  fn default() -> Self {
    Self::Krylov(KrylovConfig::default())
  }
}

pub fn build_service(config: &LinearSolverConfig) -> Box<dyn LinearSolveService> {
  match config {
    LinearSolverConfig::Krylov(krylov) => Box::new(BiCgStab::new(krylov.clone())),
    LinearSolverConfig::SparseLu => Box::new(SparseLu::default()),
    LinearSolverConfig::DenseLu => Box::new(DenseLu::default()),
  }
}

#[derive(Debug, Clone)]
pub struct KrylovConfig {
  pub rtol: f64,
  pub max_iterations: usize,
  pub preconditioner: PreconditionerKind,
}
impl Default for KrylovConfig {
  fn default() -> Self {
    Self {
      rtol: 1e-8,
      max_iterations: 200,
      preconditioner: PreconditionerKind::BlockJacobi { block_size: 16 },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionerKind {
  None,
  Jacobi,
  /// Dense LU of contiguous diagonal blocks.
  BlockJacobi { block_size: usize },
}

pub enum Preconditioner {
  Identity,
  Jacobi(CVector),
  BlockJacobi(Vec<(usize, usize, na::LU<C64, na::Dyn, na::Dyn>)>),
}

impl Preconditioner {
  pub fn build(kind: PreconditionerKind, mat: &nas::CsrMatrix<C64>) -> Result<Self, NepError> {
    match kind {
      PreconditionerKind::None => Ok(Self::Identity),
      PreconditionerKind::Jacobi => {
        let mut inv_diagonal = CVector::zeros(mat.nrows());
        for i in 0..mat.nrows() {
          let d = mat
            .get_entry(i, i)
            .map(|e| e.into_value())
            .unwrap_or_else(C64::zero);
          if d.is_zero() {
            return Err(NepError::Factorization(format!(
              "zero diagonal entry in row {i}"
            )));
          }
          inv_diagonal[i] = d.inv();
        }
        Ok(Self::Jacobi(inv_diagonal))
      }
      PreconditionerKind::BlockJacobi { block_size } => {
        if block_size == 0 {
          return Err(NepError::InvalidConfig("block size must be positive".into()));
        }
        let n = mat.nrows();
        let mut blocks = Vec::new();
        for start in (0..n).step_by(block_size) {
          let len = block_size.min(n - start);
          let mut block = CMatrix::zeros(len, len);
          for r in 0..len {
            let row = mat.row(start + r);
            for (&c, &v) in row.col_indices().iter().zip(row.values()) {
              if (start..start + len).contains(&c) {
                block[(r, c - start)] += v;
              }
            }
          }
          let lu = block.lu();
          if !lu.is_invertible() {
            return Err(NepError::Factorization(format!(
              "singular diagonal block at offset {start}"
            )));
          }
          blocks.push((start, len, lu));
        }
        Ok(Self::BlockJacobi(blocks))
      }
    }
  }

  /// $K^(-1) r$
  pub fn apply(&self, r: &CVector) -> CVector {
    match self {
      Self::Identity => r.clone(),
      Self::Jacobi(inv_diagonal) => r.component_mul(inv_diagonal),
      Self::BlockJacobi(blocks) => {
        let mut z = r.clone();
        for &(start, len, ref lu) in blocks {
          let mut segment = z.rows(start, len).into_owned();
          let solved = lu.solve_mut(&mut segment);
          debug_assert!(solved);
          z.rows_mut(start, len).copy_from(&segment);
        }
        z
      }
    }
  }
}

/// Right-preconditioned BiCGStab.
pub struct BiCgStab {
  config: KrylovConfig,
  preconditioner: Preconditioner,
}

impl BiCgStab {
  pub fn new(config: KrylovConfig) -> Self {
    Self {
      config,
      preconditioner: Preconditioner::Identity,
    }
  }
}

impl LinearSolveService for BiCgStab {
  fn refresh(&mut self, op: &ShiftedOperator) -> Result<(), NepError> {
    let assembled = op.assemble();
    self.preconditioner = Preconditioner::build(self.config.preconditioner, &assembled)?;
    Ok(())
  }

  fn solve(&mut self, op: &ShiftedOperator, rhs: &CVector) -> LinearSolveOutcome {
    bicgstab(
      |x| op.apply(x),
      &self.preconditioner,
      rhs,
      self.config.rtol,
      self.config.max_iterations,
    )
  }
}

pub fn bicgstab<A>(
  apply: A,
  preconditioner: &Preconditioner,
  rhs: &CVector,
  rtol: f64,
  max_iterations: usize,
) -> LinearSolveOutcome
where
  A: Fn(&CVector) -> CVector,
{
  let n = rhs.len();
  let one = C64::new(1.0, 0.0);
  let rhs_norm = rhs.norm();
  let mut x = CVector::zeros(n);
  if rhs_norm == 0.0 {
    return LinearSolveOutcome {
      solution: x,
      converged: true,
      iterations: 0,
      residual: 0.0,
    };
  }

  let mut r = rhs.clone();
  let r_shadow = rhs.clone();
  let mut p = CVector::zeros(n);
  let mut v = CVector::zeros(n);
  let (mut rho, mut alpha, mut omega) = (one, one, one);
  let threshold = rtol * rhs_norm;

  let mut iterations = 0;
  let mut converged = false;
  while iterations < max_iterations {
    iterations += 1;

    let rho_next = r_shadow.dotc(&r);
    if rho_next.is_zero() || omega.is_zero() {
      tracing::trace!("bicgstab breakdown at it={iterations}");
      break;
    }
    let beta = (rho_next / rho) * (alpha / omega);
    p = &r + (&p - &v * omega) * beta;
    let p_hat = preconditioner.apply(&p);
    v = apply(&p_hat);
    let denom = r_shadow.dotc(&v);
    if denom.is_zero() {
      break;
    }
    alpha = rho_next / denom;
    let s = &r - &v * alpha;
    if s.norm() <= threshold {
      x.axpy(alpha, &p_hat, one);
      converged = true;
      break;
    }
    let s_hat = preconditioner.apply(&s);
    let t = apply(&s_hat);
    let t_norm_sq = t.norm_squared();
    omega = if t_norm_sq == 0.0 {
      C64::zero()
    } else {
      t.dotc(&s) / t_norm_sq
    };
    x.axpy(alpha, &p_hat, one);
    x.axpy(omega, &s_hat, one);
    r = s - t * omega;
    rho = rho_next;

    if r.norm() <= threshold {
      converged = true;
      break;
    }
  }

  let residual = (rhs - apply(&x)).norm() / rhs_norm;
  LinearSolveOutcome {
    solution: x,
    converged,
    iterations,
    residual,
  }
}

/// Exact solves by a sparse LU of $T(sigma)$, computed at refresh.
#[derive(Default)]
pub struct SparseLu {
  lu: Option<faer::sparse::linalg::solvers::Lu<usize, c64>>,
}

impl LinearSolveService for SparseLu {
  fn refresh(&mut self, op: &ShiftedOperator) -> Result<(), NepError> {
    self.lu = None;
    let n = op.dim();
    let triplets: Vec<_> = op
      .assemble()
      .triplet_iter()
      .map(|(r, c, v)| (r, c, c64::new(v.re, v.im)))
      .collect();
    let mat = faer::sparse::SparseColMat::<usize, c64>::try_new_from_triplets(n, n, &triplets)
      .map_err(|err| NepError::Factorization(format!("{err:?}")))?;
    let lu = mat
      .sp_lu()
      .map_err(|err| NepError::Factorization(format!("{err:?}")))?;
    self.lu = Some(lu);
    Ok(())
  }

  fn solve(&mut self, _op: &ShiftedOperator, rhs: &CVector) -> LinearSolveOutcome {
    let Some(lu) = &self.lu else {
      return unfactored(rhs);
    };
    let buffer: Vec<c64> = rhs.iter().map(|z| c64::new(z.re, z.im)).collect();
    let x = lu.solve(faer::col::from_slice(&buffer));
    let solution = CVector::from_iterator(
      x.nrows(),
      x.as_slice().iter().map(|z| C64::new(z.re, z.im)),
    );
    exact_outcome(solution)
  }
}

/// Exact solves by a dense LU of $T(sigma)$. For small problems.
#[derive(Default)]
pub struct DenseLu {
  lu: Option<na::LU<C64, na::Dyn, na::Dyn>>,
}

impl LinearSolveService for DenseLu {
  fn refresh(&mut self, op: &ShiftedOperator) -> Result<(), NepError> {
    let dense: CMatrix = (&op.assemble()).into();
    let lu = dense.lu();
    if !lu.is_invertible() {
      self.lu = None;
      return Err(NepError::Factorization(format!(
        "T({}) is singular",
        op.shift()
      )));
    }
    self.lu = Some(lu);
    Ok(())
  }

  fn solve(&mut self, _op: &ShiftedOperator, rhs: &CVector) -> LinearSolveOutcome {
    match self.lu.as_ref().and_then(|lu| lu.solve(rhs)) {
      Some(solution) => exact_outcome(solution),
      None => unfactored(rhs),
    }
  }
}

fn exact_outcome(solution: CVector) -> LinearSolveOutcome {
  let converged = solution.iter().all(|z| z.re.is_finite() && z.im.is_finite());
  LinearSolveOutcome {
    solution,
    converged,
    iterations: 1,
    residual: if converged { 0.0 } else { f64::INFINITY },
  }
}

fn unfactored(rhs: &CVector) -> LinearSolveOutcome {
  tracing::warn!("linear solve requested without a valid factorization");
  LinearSolveOutcome {
    solution: rhs.clone(),
    converged: false,
    iterations: 0,
    residual: f64::INFINITY,
  }
}
