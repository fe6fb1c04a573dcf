//! Split form $T(lambda) = sum_k f_k(lambda) M_k$.

use crate::{
  error::NepError,
  function::ScalarFunction,
  sparse::{self, norm_inf},
  CMatrix, CVector, C64,
};

use num_traits::Zero;

#[derive(Debug, Clone)]
pub struct SplitTerm<'a> {
  pub matrix: &'a nas::CsrMatrix<f64>,
  pub function: ScalarFunction,
}

/// Nonlinear operator in split form.
///
/// The matrices are borrowed from the caller and never mutated.
#[derive(Debug, Clone)]
pub struct SplitOperator<'a> {
  terms: Vec<SplitTerm<'a>>,
  dim: usize,
  /// $norm(M_k)_infinity$ per term.
  norms: Vec<f64>,
}

impl<'a> SplitOperator<'a> {
  /// All matrices must be square and of equal size.
  pub fn new(terms: Vec<(&'a nas::CsrMatrix<f64>, ScalarFunction)>) -> Result<Self, NepError> {
    let Some((first, _)) = terms.first() else {
      return Err(NepError::InvalidConfig(
        "split operator needs at least one term".into(),
      ));
    };
    let dim = first.nrows();

    for (term, (matrix, _)) in terms.iter().enumerate() {
      if matrix.nrows() != dim || matrix.ncols() != dim {
        return Err(NepError::DimensionMismatch {
          term,
          expected: dim,
          found_rows: matrix.nrows(),
          found_cols: matrix.ncols(),
        });
      }
    }

    let norms = terms.iter().map(|(m, _)| norm_inf(m)).collect();
    let terms = terms
      .into_iter()
      .map(|(matrix, function)| SplitTerm { matrix, function })
      .collect();

    Ok(Self { terms, dim, norms })
  }

  pub fn dim(&self) -> usize {
    self.dim
  }
  pub fn nterms(&self) -> usize {
    self.terms.len()
  }
  pub fn terms(&self) -> &[SplitTerm<'a>] {
    &self.terms
  }
  pub fn norms(&self) -> &[f64] {
    &self.norms
  }

  /// Real data implies eigenvalues come in conjugate pairs.
  pub fn is_real(&self) -> bool {
    self.terms.iter().all(|t| t.function.is_real())
  }

  /// Returns $(f_k(lambda))_k$ and $(f'_k(lambda))_k$.
  pub fn coefficients(&self, lambda: C64) -> Result<(Vec<C64>, Vec<C64>), NepError> {
    let mut values = Vec::with_capacity(self.nterms());
    let mut derivatives = Vec::with_capacity(self.nterms());
    for term in &self.terms {
      let (v, d) = term.function.eval(lambda)?;
      values.push(v);
      derivatives.push(d);
    }
    Ok((values, derivatives))
  }

  /// $T(lambda) x$
  pub fn apply(&self, lambda: C64, x: &CVector) -> Result<CVector, NepError> {
    let (values, _) = self.coefficients(lambda)?;
    Ok(self.combine(&values, x))
  }

  /// $T'(lambda) x$
  pub fn apply_derivative(&self, lambda: C64, x: &CVector) -> Result<CVector, NepError> {
    let (_, derivatives) = self.coefficients(lambda)?;
    Ok(self.combine(&derivatives, x))
  }

  /// $sum_k c_k M_k x$
  pub fn combine(&self, coeffs: &[C64], x: &CVector) -> CVector {
    assert_eq!(x.len(), self.dim);
    let mut y = CVector::zeros(self.dim);
    for (term, &c) in self.terms.iter().zip(coeffs) {
      if !c.is_zero() {
        sparse::spmv_acc(term.matrix, c, x, &mut y);
      }
    }
    y
  }

  /// $(V^H M_k V)_k$ for a basis $V$ stored column-wise.
  pub fn projected_matrices(&self, basis: &CMatrix) -> Vec<CMatrix> {
    assert_eq!(basis.nrows(), self.dim);
    let basis_adjoint = basis.adjoint();
    self
      .terms
      .iter()
      .map(|term| &basis_adjoint * sparse::spmm(term.matrix, basis))
      .collect()
  }

  /// $sum_k |f_k(lambda)| norm(M_k)_infinity$
  pub fn norm_estimate(&self, lambda: C64) -> Result<f64, NepError> {
    let (values, _) = self.coefficients(lambda)?;
    Ok(values.iter().zip(&self.norms).map(|(c, n)| c.norm() * n).sum())
  }

  /// Sparse $T(lambda)$ with the term patterns merged.
  pub fn assemble(&self, lambda: C64) -> Result<nas::CsrMatrix<C64>, NepError> {
    let (values, _) = self.coefficients(lambda)?;
    Ok(self.assemble_with(&values))
  }

  pub fn assemble_with(&self, coeffs: &[C64]) -> nas::CsrMatrix<C64> {
    let mut coo = nas::CooMatrix::new(self.dim, self.dim);
    for (term, &c) in self.terms.iter().zip(coeffs) {
      for (r, col, &v) in term.matrix.triplet_iter() {
        coo.push(r, col, c * v);
      }
    }
    (&coo).into()
  }

  /// Dense $T(lambda)$. Only sensible for small dimensions.
  pub fn eval_dense(&self, lambda: C64) -> Result<CMatrix, NepError> {
    let assembled = self.assemble(lambda)?;
    Ok((&assembled).into())
  }
}

/// $T(sigma)$ for a fixed shift, as handed to the linear solver.
#[derive(Debug, Clone)]
pub struct ShiftedOperator<'s, 'a> {
  split: &'s SplitOperator<'a>,
  shift: C64,
  coeffs: Vec<C64>,
}

impl<'s, 'a> ShiftedOperator<'s, 'a> {
  pub fn new(split: &'s SplitOperator<'a>, shift: C64) -> Result<Self, NepError> {
    let (coeffs, _) = split.coefficients(shift)?;
    Ok(Self {
      split,
      shift,
      coeffs,
    })
  }

  pub fn shift(&self) -> C64 {
    self.shift
  }
  pub fn dim(&self) -> usize {
    self.split.dim()
  }
  pub fn split(&self) -> &SplitOperator<'a> {
    self.split
  }

  pub fn apply(&self, x: &CVector) -> CVector {
    self.split.combine(&self.coeffs, x)
  }

  pub fn assemble(&self) -> nas::CsrMatrix<C64> {
    self.split.assemble_with(&self.coeffs)
  }
}
