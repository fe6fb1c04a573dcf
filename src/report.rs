//! Textual summaries of a solve.

use crate::{
  evp::{NepSolution, SolveStatus},
  store::ErrorKind,
  C64,
};

use itertools::Itertools;
use std::fmt::Write;

/// Errors above this are flagged in the terse view.
const TERSE_THRESHOLD: f64 = 1e-6;

pub fn format_eigenvalue(lambda: C64) -> String {
  let clean = |x: f64| if x.abs() < 5e-13 { 0.0 } else { x };
  let (re, im) = (clean(lambda.re), clean(lambda.im));
  if im == 0.0 {
    format!("{re:.5}")
  } else {
    let sign = if im < 0.0 { '-' } else { '+' };
    format!("{re:.5}{sign}{:.5}i", im.abs())
  }
}

pub fn status_line(solution: &NepSolution) -> String {
  let nconv = solution.eigenpairs.count();
  let its = solution.iterations;
  match &solution.status {
    SolveStatus::Converged => {
      format!("Nonlinear eigensolve converged ({nconv} eigenpairs) due to CONVERGED_TOL; iterations {its}")
    }
    SolveStatus::MaxItReached => {
      format!("Nonlinear eigensolve did not converge ({nconv} eigenpairs) due to DIVERGED_ITS; iterations {its}")
    }
    SolveStatus::Failed(err) => {
      format!("Nonlinear eigensolve failed ({nconv} eigenpairs) after {its} iterations: {err}")
    }
  }
}

/// Eigenvalues only, or a warning if some are not accurate.
pub fn terse(solution: &NepSolution, nev: usize) -> String {
  let pairs = &solution.eigenpairs;
  if pairs.count() < nev {
    return format!(
      " Problem: less than {nev} eigenvalues converged\n\n{}\n",
      status_line(solution)
    );
  }
  if pairs
    .iter()
    .any(|p| p.error(ErrorKind::Relative) > TERSE_THRESHOLD)
  {
    return format!(" Problem: some of the first {nev} relative errors are higher than the tolerance\n\n");
  }
  let values = pairs
    .iter()
    .take(nev)
    .map(|p| format_eigenvalue(p.eigenvalue))
    .join(", ");
  format!(" All requested eigenvalues computed up to the required tolerance:\n     {values}\n\n")
}

/// Status, per-pair error table and optionally the convergence history.
pub fn detailed(solution: &NepSolution, kind: ErrorKind, with_history: bool) -> String {
  let header = match kind {
    ErrorKind::Absolute => "||T(k)x||",
    ErrorKind::Relative => "||T(k)x||/|k|",
    ErrorKind::Backward => "eta(x,k)",
  };

  let mut out = String::new();
  let _ = writeln!(out, "{}\n", status_line(solution));
  let _ = writeln!(out, "{:>20} {:>20}", "k", header);
  let _ = writeln!(out, "   {} {}", "-".repeat(17), "-".repeat(20));
  for pair in &solution.eigenpairs {
    let _ = writeln!(
      out,
      "{:>20} {:>20.6e}",
      format_eigenvalue(pair.eigenvalue),
      pair.error(kind)
    );
  }
  let _ = writeln!(out, "   {} {}", "-".repeat(17), "-".repeat(20));

  if with_history {
    let _ = writeln!(out);
    for record in &solution.history {
      let _ = writeln!(
        out,
        "{:3} NEP nconv={} first unconverged value (error) {} ({:.8e}){}",
        record.iteration,
        record.nconv,
        format_eigenvalue(record.eigenvalue),
        record.error,
        if record.refreshed { " [refresh]" } else { "" }
      );
    }
  }
  out
}
