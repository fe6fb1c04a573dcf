use crate::C64;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NepError {
  #[error("Dimension mismatch in term {term}: expected {expected}x{expected}, found {found_rows}x{found_cols}.")]
  DimensionMismatch {
    term: usize,
    expected: usize,
    found_rows: usize,
    found_cols: usize,
  },

  /// A scalar function is undefined at a candidate eigenvalue.
  #[error("Scalar function could not be evaluated at lambda = {lambda}.")]
  EvaluationFailure { lambda: C64 },

  #[error("Linear solve failed to converge {failures} consecutive times.")]
  LinearSolveDivergence { failures: usize },

  #[error("Subspace breakdown at dimension {dim}: orthogonal component is negligible.")]
  SubspaceBreakdown { dim: usize },

  #[error("Subspace of dimension {max} cannot hold {needed} vectors after restart.")]
  SubspaceOverflow { needed: usize, max: usize },

  #[error("Maximum number of iterations ({0}) exceeded.")]
  MaxIterationsExceeded(usize),

  #[error("Factorization of the shifted operator failed: {0}")]
  Factorization(String),

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dimension_mismatch_message() {
    let error = NepError::DimensionMismatch {
      term: 2,
      expected: 16,
      found_rows: 16,
      found_cols: 15,
    };
    assert_eq!(
      error.to_string(),
      "Dimension mismatch in term 2: expected 16x16, found 16x15."
    );
  }

  #[test]
  fn evaluation_failure_carries_lambda() {
    let error = NepError::EvaluationFailure {
      lambda: C64::new(1.0, -2.0),
    };
    assert_eq!(
      error.to_string(),
      "Scalar function could not be evaluated at lambda = 1-2i."
    );
  }
}
