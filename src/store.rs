//! Accepted eigenpairs, kept in order of discovery.

use crate::{CVector, C64};

/// Scales below this are treated as zero, and the error is left unscaled.
pub const SCALE_FLOOR: f64 = f64::EPSILON;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
  /// $norm(T(lambda) u)$ for unit $u$.
  Absolute,
  /// Absolute error over $|lambda|$.
  #[default]
  Relative,
  /// Absolute error over $sum_k |f_k(lambda)| norm(M_k)_infinity$.
  Backward,
}

#[derive(Debug, Clone)]
pub struct Eigenpair {
  pub eigenvalue: C64,
  /// Unit norm.
  pub eigenvector: CVector,
  pub residual_norm: f64,
  /// $sum_k |f_k(lambda)| norm(M_k)_infinity$ at acceptance.
  pub operator_norm: f64,
  /// Outer iteration at which the pair was accepted.
  pub iteration: usize,
}

impl Eigenpair {
  pub fn error(&self, kind: ErrorKind) -> f64 {
    match kind {
      ErrorKind::Absolute => self.residual_norm,
      ErrorKind::Relative => scaled(self.residual_norm, self.eigenvalue.norm()),
      ErrorKind::Backward => scaled(self.residual_norm, self.operator_norm),
    }
  }
}

pub(crate) fn scaled(error: f64, scale: f64) -> f64 {
  if scale > SCALE_FLOOR {
    error / scale
  } else {
    error
  }
}

/// Append-only; ordered by discovery.
#[derive(Debug, Clone, Default)]
pub struct EigenpairStore {
  pairs: Vec<Eigenpair>,
}

impl EigenpairStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn push(&mut self, pair: Eigenpair) {
    self.pairs.push(pair);
  }

  pub fn count(&self) -> usize {
    self.pairs.len()
  }
  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }
  pub fn get(&self, i: usize) -> Option<&Eigenpair> {
    self.pairs.get(i)
  }
  pub fn iter(&self) -> std::slice::Iter<'_, Eigenpair> {
    self.pairs.iter()
  }

  pub fn eigenvalues(&self) -> Vec<C64> {
    self.pairs.iter().map(|p| p.eigenvalue).collect()
  }

  pub fn error(&self, i: usize, kind: ErrorKind) -> Option<f64> {
    self.get(i).map(|p| p.error(kind))
  }

  pub fn relative_errors(&self) -> Vec<f64> {
    self.pairs.iter().map(|p| p.error(ErrorKind::Relative)).collect()
  }
}

impl<'a> IntoIterator for &'a EigenpairStore {
  type Item = &'a Eigenpair;
  type IntoIter = std::slice::Iter<'a, Eigenpair>;
  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn pair(eigenvalue: C64, residual_norm: f64, iteration: usize) -> Eigenpair {
    Eigenpair {
      eigenvalue,
      eigenvector: CVector::from_element(1, C64::new(1.0, 0.0)),
      residual_norm,
      operator_norm: 4.0,
      iteration,
    }
  }

  #[test]
  fn discovery_order_is_kept() {
    let mut store = EigenpairStore::new();
    store.push(pair(C64::new(3.0, 0.0), 1e-9, 4));
    store.push(pair(C64::new(1.0, 0.0), 1e-12, 7));
    assert_eq!(store.count(), 2);
    assert_eq!(
      store.eigenvalues(),
      vec![C64::new(3.0, 0.0), C64::new(1.0, 0.0)]
    );
    assert_eq!(store.get(1).unwrap().iteration, 7);
    assert!(store.get(2).is_none());
  }

  #[test]
  fn error_kinds() {
    let mut store = EigenpairStore::new();
    store.push(pair(C64::new(0.0, 2.0), 1e-8, 1));
    assert_relative_eq!(store.error(0, ErrorKind::Absolute).unwrap(), 1e-8);
    assert_relative_eq!(store.error(0, ErrorKind::Relative).unwrap(), 5e-9);
    assert_relative_eq!(store.error(0, ErrorKind::Backward).unwrap(), 2.5e-9);
    assert_eq!(store.relative_errors().len(), 1);
  }

  #[test]
  fn zero_eigenvalue_does_not_divide_by_zero() {
    let p = pair(C64::new(0.0, 0.0), 1e-10, 1);
    assert_relative_eq!(p.error(ErrorKind::Relative), 1e-10);
  }
}
