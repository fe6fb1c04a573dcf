//! Nonlinear Arnoldi method with residual inverse iteration corrections.
//!
//! Each outer step projects $T$ onto an orthonormal search space $V$, solves
//! the small projected problem, and either accepts the Ritz pair or expands
//! $V$ by the correction $t = T(sigma)^(-1) r$. The linear solver for
//! $T(sigma)$ is refreshed every `lag` correction steps. The pole $sigma$ is
//! the target at first and afterwards the eigenvalue approximation of the
//! preceding correction step.

use crate::{
  error::NepError,
  lse::{build_service, LinearSolveService, LinearSolverConfig},
  projected::{Deflation, InnerConfig, ProjectedPair, ProjectedProblem},
  split::{ShiftedOperator, SplitOperator},
  store::{scaled, Eigenpair, EigenpairStore},
  subspace::{random_vector, Subspace},
  CVector, C64,
};

use num_traits::Zero;
use rand::{rngs::StdRng, SeedableRng};

const DEFAULT_MAX_SUBSPACE_DIM: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvergenceTest {
  /// $norm(T(lambda) u) / norm(u)$
  Absolute,
  /// The absolute test divided by $|lambda|$, unless $|lambda|$ vanishes.
  #[default]
  Relative,
}

#[derive(Debug, Clone)]
pub struct NArnoldiConfig {
  /// Number of eigenpairs to compute.
  pub nev: usize,
  /// Eigenvalues are sought near this point.
  pub target: C64,
  pub tol: f64,
  pub max_iterations: usize,
  /// Refresh period of the linear solver, in correction steps.
  pub lag: usize,
  /// Defaults to `min(n, 100)`.
  pub max_subspace_dim: Option<usize>,
  /// Defaults to a seeded random vector.
  pub initial_space: Vec<CVector>,
  pub conv_test: ConvergenceTest,
  pub inner: InnerConfig,
  pub linear: LinearSolverConfig,
  /// Consecutive non-converged linear solves tolerated before failing.
  pub max_linear_failures: usize,
  /// Relative distance below which a candidate is taken for a locked eigenvalue.
  pub deflation_radius: f64,
  pub seed: u64,
}

impl Default for NArnoldiConfig {
  fn default() -> Self {
    Self {
      nev: 1,
      target: C64::zero(),
      tol: 1e-8,
      max_iterations: 100,
      lag: 1,
      max_subspace_dim: None,
      initial_space: Vec::new(),
      conv_test: ConvergenceTest::default(),
      inner: InnerConfig::default(),
      linear: LinearSolverConfig::default(),
      max_linear_failures: 3,
      deflation_radius: 1e-6,
      seed: 0x5EED,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
  Converged,
  MaxItReached,
  Failed(NepError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveStats {
  pub refreshes: usize,
  pub linear_solves: usize,
  pub linear_failures: usize,
  pub restarts: usize,
  pub breakdowns: usize,
  pub discarded: usize,
}

/// One outer step, as reported by the monitor.
#[derive(Debug, Clone)]
pub struct IterationRecord {
  pub iteration: usize,
  pub eigenvalue: C64,
  pub error: f64,
  pub subspace_dim: usize,
  pub nconv: usize,
  pub refreshed: bool,
  pub linear_iterations: usize,
  pub linear_converged: bool,
}

#[derive(Debug, Clone)]
pub struct NepSolution {
  pub status: SolveStatus,
  pub eigenpairs: EigenpairStore,
  pub history: Vec<IterationRecord>,
  pub stats: SolveStats,
  pub iterations: usize,
  pub max_iterations: usize,
}

impl NepSolution {
  pub fn is_converged(&self) -> bool {
    self.status == SolveStatus::Converged
  }

  /// Turns a non-converged status into the corresponding error.
  pub fn ensure_converged(&self) -> Result<(), NepError> {
    match &self.status {
      SolveStatus::Converged => Ok(()),
      SolveStatus::MaxItReached => Err(NepError::MaxIterationsExceeded(self.max_iterations)),
      SolveStatus::Failed(err) => Err(err.clone()),
    }
  }
}

/// Iterations since the linear solver was last refreshed.
#[derive(Debug, Clone, Copy)]
struct LagState {
  since_refresh: usize,
  lag: usize,
}
impl LagState {
  fn new(lag: usize) -> Self {
    Self {
      since_refresh: 0,
      lag,
    }
  }
  fn refresh_due(&self) -> bool {
    self.since_refresh == 0
  }
  fn advance(&mut self) {
    self.since_refresh = (self.since_refresh + 1) % self.lag;
  }
}

pub struct NArnoldi<'s, 'a> {
  op: &'s SplitOperator<'a>,
  config: &'s NArnoldiConfig,
}

impl<'s, 'a> NArnoldi<'s, 'a> {
  pub fn new(op: &'s SplitOperator<'a>, config: &'s NArnoldiConfig) -> Result<Self, NepError> {
    let n = op.dim();
    let invalid = |msg: String| Err(NepError::InvalidConfig(msg));

    if config.nev == 0 || config.nev > n {
      return invalid(format!("nev must lie in 1..={n}, got {}", config.nev));
    }
    if !(config.tol > 0.0 && config.tol.is_finite()) {
      return invalid(format!("tolerance must be positive, got {}", config.tol));
    }
    if config.max_iterations == 0 || config.lag == 0 || config.inner.max_iterations == 0 {
      return invalid("iteration counts and lag must be positive".into());
    }
    if let Some(max_dim) = config.max_subspace_dim {
      if max_dim == 0 || max_dim > n {
        return invalid(format!("max subspace dimension must lie in 1..={n}, got {max_dim}"));
      }
    }
    if let Some(v) = config.initial_space.iter().find(|v| v.len() != n) {
      return invalid(format!("initial vector has length {}, expected {n}", v.len()));
    }

    Ok(Self { op, config })
  }

  pub fn config(&self) -> &NArnoldiConfig {
    self.config
  }

  pub fn max_subspace_dim(&self) -> usize {
    self
      .config
      .max_subspace_dim
      .unwrap_or(self.op.dim().min(DEFAULT_MAX_SUBSPACE_DIM))
  }

  /// Solves with the linear solver selected by the configuration.
  pub fn solve(&self) -> NepSolution {
    let mut service = build_service(&self.config.linear);
    self.solve_with(service.as_mut())
  }

  pub fn solve_with(&self, service: &mut dyn LinearSolveService) -> NepSolution {
    let op = self.op;
    let config = self.config;
    let n = op.dim();
    let max_dim = self.max_subspace_dim();

    tracing::info!(
      "nonlinear arnoldi: n={n} nterms={} nev={} target={} tol={:e} lag={} max_dim={max_dim}",
      op.nterms(),
      config.nev,
      config.target,
      config.tol,
      config.lag,
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut space = Subspace::new(n);
    for v in config.initial_space.iter().take(max_dim) {
      if let Err(err) = space.push(v.clone()) {
        tracing::warn!("ignoring initial vector: {err}");
      }
    }
    if space.is_empty() {
      if let Err(err) = space.push(random_vector(n, &mut rng)) {
        tracing::warn!("initial random vector rejected: {err}");
      }
    }

    let mut lag = LagState::new(config.lag);
    let mut store = EigenpairStore::new();
    let mut history = Vec::new();
    let mut stats = SolveStats::default();
    let mut lambda = config.target;
    let mut pole = config.target;
    let mut shifted: Option<ShiftedOperator> = None;
    let mut consecutive_failures = 0;
    let mut iterations = 0;

    let status = loop {
      if iterations == config.max_iterations {
        break SolveStatus::MaxItReached;
      }
      iterations += 1;
      let it = iterations;

      let locked = store.eigenvalues();
      let deflation = Deflation {
        locked: &locked,
        radius: config.deflation_radius,
      };

      let basis = space.basis();
      let projected = ProjectedProblem::new(op, &basis);
      let candidate = self
        .solve_projected(&projected, lambda, deflation)
        .and_then(|pair| {
          let mut u = space.expand(&pair.coeffs);
          u.unscale_mut(u.norm());
          let r = op.apply(pair.eigenvalue, &u)?;
          Ok((pair, u, r))
        });

      let (pair, u, r) = match candidate {
        Ok(c) => c,
        Err(err) => {
          tracing::warn!("it={it}: discarding candidate: {err}");
          stats.discarded += 1;
          lambda = config.target;
          let w = random_vector(n, &mut rng);
          if let Err(err) = self.expand(&mut space, w, &mut rng, &store, None, &mut stats) {
            break SolveStatus::Failed(err);
          }
          continue;
        }
      };

      let residual_norm = r.norm();
      let error = match config.conv_test {
        ConvergenceTest::Absolute => residual_norm,
        ConvergenceTest::Relative => scaled(residual_norm, pair.eigenvalue.norm()),
      };
      let mut record = IterationRecord {
        iteration: it,
        eigenvalue: pair.eigenvalue,
        error,
        subspace_dim: space.len(),
        nconv: store.count(),
        refreshed: false,
        linear_iterations: 0,
        linear_converged: true,
      };
      tracing::debug!(
        "{it:3} NEP nconv={} first unconverged value (error) {} ({error:.8e}) dim={}",
        store.count(),
        pair.eigenvalue,
        space.len(),
      );

      if error <= config.tol && deflation.admits(pair.eigenvalue) {
        let operator_norm = op.norm_estimate(pair.eigenvalue).unwrap_or(0.0);
        tracing::info!("it={it}: accepted lambda={} error={error:.3e}", pair.eigenvalue);
        store.push(Eigenpair {
          eigenvalue: pair.eigenvalue,
          eigenvector: u,
          residual_norm,
          operator_norm,
          iteration: it,
        });
        record.nconv = store.count();
        history.push(record);
        if store.count() >= config.nev {
          break SolveStatus::Converged;
        }
        lambda = config.target;
        continue;
      }
      lambda = pair.eigenvalue;

      // The pole lags one step behind, since $T(lambda)^(-1) T(lambda) u = u$.
      if lag.refresh_due() {
        let refreshed = ShiftedOperator::new(op, pole).and_then(|s| {
          service.refresh(&s)?;
          Ok(s)
        });
        match refreshed {
          Ok(s) => {
            stats.refreshes += 1;
            record.refreshed = true;
            shifted = Some(s);
          }
          Err(err) => {
            tracing::warn!("it={it}: refresh at sigma={pole} failed: {err}");
            stats.linear_failures += 1;
            consecutive_failures += 1;
            shifted = None;
          }
        }
      }
      lag.advance();
      pole = lambda;

      let correction = match &shifted {
        Some(s) => {
          let outcome = service.solve(s, &r);
          stats.linear_solves += 1;
          record.linear_iterations = outcome.iterations;
          record.linear_converged = outcome.converged;
          if outcome.converged {
            consecutive_failures = 0;
          } else {
            tracing::warn!(
              "it={it}: linear solve did not converge in {} iterations (residual {:.3e})",
              outcome.iterations,
              outcome.residual
            );
            stats.linear_failures += 1;
            consecutive_failures += 1;
          }
          outcome.solution
        }
        None => r,
      };
      history.push(record);

      if consecutive_failures > config.max_linear_failures {
        break SolveStatus::Failed(NepError::LinearSolveDivergence {
          failures: consecutive_failures,
        });
      }

      let expanded = self.expand(&mut space, correction, &mut rng, &store, Some(&u), &mut stats);
      if let Err(err) = expanded {
        break SolveStatus::Failed(err);
      }
    };

    match &status {
      SolveStatus::Converged => {
        tracing::info!("converged {} eigenpairs in {iterations} iterations", store.count())
      }
      SolveStatus::MaxItReached => tracing::warn!(
        "maximum iterations reached with {}/{} eigenpairs",
        store.count(),
        config.nev
      ),
      SolveStatus::Failed(err) => {
        tracing::warn!("solve failed after {iterations} iterations: {err}")
      }
    }

    NepSolution {
      status,
      eigenpairs: store,
      history,
      stats,
      iterations,
      max_iterations: config.max_iterations,
    }
  }

  /// Runs the inner solver from the current approximation, the target and,
  /// for real problems, the conjugates of locked eigenvalues. Converged
  /// admissible candidates nearest the target are preferred.
  fn solve_projected(
    &self,
    projected: &ProjectedProblem,
    lambda: C64,
    deflation: Deflation,
  ) -> Result<ProjectedPair, NepError> {
    let target = self.config.target;
    let mut seeds = vec![lambda];
    if lambda != target {
      seeds.push(target);
    }
    if self.op.is_real() {
      seeds.extend(
        deflation
          .locked
          .iter()
          .filter(|l| l.im != 0.0)
          .map(|l| l.conj())
          .filter(|l| deflation.admits(*l)),
      );
    }

    let mut best: Option<ProjectedPair> = None;
    let mut first_err = None;
    for seed in seeds {
      match projected.solve_slp(seed, deflation, &self.config.inner) {
        Ok(pair) => {
          let better = match &best {
            None => true,
            Some(b) => {
              let key = |p: &ProjectedPair| {
                (
                  !(p.converged && deflation.admits(p.eigenvalue)),
                  (p.eigenvalue - target).norm(),
                )
              };
              key(&pair) < key(b)
            }
          };
          if better {
            best = Some(pair);
          }
        }
        Err(err) => {
          tracing::trace!("inner solve from seed {seed} failed: {err}");
          first_err.get_or_insert(err);
        }
      }
    }

    match (best, first_err) {
      (Some(pair), _) => Ok(pair),
      (None, Some(err)) => Err(err),
      (None, None) => Err(NepError::EvaluationFailure { lambda }),
    }
  }

  /// Appends `w` to the search space, restarting when it is full and
  /// falling back to random vectors on breakdown.
  fn expand(
    &self,
    space: &mut Subspace,
    w: CVector,
    rng: &mut StdRng,
    store: &EigenpairStore,
    current: Option<&CVector>,
    stats: &mut SolveStats,
  ) -> Result<(), NepError> {
    let max_dim = self.max_subspace_dim();
    let n = space.dim_ambient();

    if space.len() >= max_dim {
      self.restart(space, store, current, stats)?;
    }

    match space.push(w) {
      Ok(()) => return Ok(()),
      Err(err) => {
        tracing::warn!("{err}; expanding with a random vector");
        stats.breakdowns += 1;
      }
    }
    if space.push(random_vector(n, rng)).is_ok() {
      return Ok(());
    }

    self.restart(space, store, current, stats)?;
    if space.len() < max_dim {
      if let Err(err) = space.push(random_vector(n, rng)) {
        tracing::warn!("no random expansion after restart: {err}");
      }
    }
    Ok(())
  }

  /// Rebuilds the search space from the locked eigenvectors and the
  /// current approximation.
  fn restart(
    &self,
    space: &mut Subspace,
    store: &EigenpairStore,
    current: Option<&CVector>,
    stats: &mut SolveStats,
  ) -> Result<(), NepError> {
    let max_dim = self.max_subspace_dim();
    let needed = store.count() + current.is_some() as usize + 1;
    if needed > max_dim {
      return Err(NepError::SubspaceOverflow {
        needed,
        max: max_dim,
      });
    }
    tracing::debug!("restarting search space at dimension {}", space.len());
    stats.restarts += 1;
    let keep = store
      .iter()
      .map(|p| p.eigenvector.clone())
      .chain(current.cloned());
    space.restart(keep);
    if space.is_empty() {
      let n = space.dim_ambient();
      let mut rng = StdRng::seed_from_u64(self.config.seed ^ stats.restarts as u64);
      if let Err(err) = space.push(random_vector(n, &mut rng)) {
        tracing::warn!("restarted space stays empty: {err}");
      }
    }
    Ok(())
  }
}
