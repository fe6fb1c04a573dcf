//! Orthonormal search space of the outer iteration.

use crate::{error::NepError, CMatrix, CVector, C64};

use rand::{rngs::StdRng, Rng};

/// Relative size of the orthogonal component below which an expansion
/// vector is considered to lie in the span already.
const BREAKDOWN_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct Subspace {
  dim_ambient: usize,
  vectors: Vec<CVector>,
}

impl Subspace {
  pub fn new(dim_ambient: usize) -> Self {
    Self {
      dim_ambient,
      vectors: Vec::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.vectors.len()
  }
  pub fn is_empty(&self) -> bool {
    self.vectors.is_empty()
  }
  pub fn dim_ambient(&self) -> usize {
    self.dim_ambient
  }
  pub fn vectors(&self) -> &[CVector] {
    &self.vectors
  }

  /// $V$ as an $n times m$ matrix.
  pub fn basis(&self) -> CMatrix {
    CMatrix::from_columns(&self.vectors)
  }

  /// $V y$
  pub fn expand(&self, coeffs: &CVector) -> CVector {
    assert_eq!(coeffs.len(), self.len());
    let mut u = CVector::zeros(self.dim_ambient);
    for (v, &c) in self.vectors.iter().zip(coeffs.iter()) {
      u.axpy(c, v, C64::new(1.0, 0.0));
    }
    u
  }

  /// Classical Gram-Schmidt with one reorthogonalization pass.
  /// Returns the norm of the orthogonal component.
  pub fn orthogonalize(&self, w: &mut CVector) -> f64 {
    for _ in 0..2 {
      let coeffs: Vec<C64> = self.vectors.iter().map(|v| v.dotc(&*w)).collect();
      for (v, c) in self.vectors.iter().zip(coeffs) {
        w.axpy(-c, v, C64::new(1.0, 0.0));
      }
    }
    w.norm()
  }

  /// Orthonormalizes `w` against the basis and appends it.
  pub fn push(&mut self, mut w: CVector) -> Result<(), NepError> {
    assert_eq!(w.len(), self.dim_ambient);
    let norm_before = w.norm();
    let norm_after = self.orthogonalize(&mut w);
    let negligible = !norm_after.is_finite()
      || norm_before == 0.0
      || norm_after <= BREAKDOWN_TOL * norm_before
      || self.len() == self.dim_ambient;
    if negligible {
      return Err(NepError::SubspaceBreakdown { dim: self.len() });
    }
    w.unscale_mut(norm_after);
    self.vectors.push(w);
    Ok(())
  }

  /// Restarts from the given vectors, skipping dependent ones.
  pub fn restart(&mut self, vectors: impl IntoIterator<Item = CVector>) {
    self.vectors.clear();
    for v in vectors {
      if let Err(err) = self.push(v) {
        tracing::warn!("dropping dependent restart vector: {err}");
      }
    }
  }
}

/// Reproducible random vector with entries in $[-1, 1)$.
pub fn random_vector(n: usize, rng: &mut StdRng) -> CVector {
  CVector::from_fn(n, |_, _| C64::new(rng.random_range(-1.0..1.0), 0.0))
}
