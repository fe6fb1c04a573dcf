//! Real sparse matrices of the split form and their action on complex vectors.

use crate::{CMatrix, CVector, C64};

use num_traits::Zero;

/// Triplet builder for the real matrices $M_k$.
#[derive(Default, Debug, Clone)]
pub struct SparseMatrix {
  nrows: usize,
  ncols: usize,
  triplets: Vec<(usize, usize, f64)>,
}

impl SparseMatrix {
  pub fn zeros(nrows: usize, ncols: usize) -> Self {
    Self::new(nrows, ncols, Vec::new())
  }
  pub fn new(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, f64)>) -> Self {
    Self {
      nrows,
      ncols,
      triplets,
    }
  }
  pub fn identity(n: usize) -> Self {
    Self::from_diagonal(&vec![1.0; n])
  }
  pub fn from_diagonal(diagonal: &[f64]) -> Self {
    let n = diagonal.len();
    let mut mat = Self::zeros(n, n);
    for (i, &v) in diagonal.iter().enumerate() {
      mat.push(i, i, v);
    }
    mat
  }
  /// Tridiagonal matrix with constant sub-, main- and superdiagonal.
  pub fn tridiagonal(n: usize, lower: f64, main: f64, upper: f64) -> Self {
    let mut mat = Self::zeros(n, n);
    for i in 0..n {
      if i > 0 {
        mat.push(i, i - 1, lower);
      }
      mat.push(i, i, main);
      if i + 1 < n {
        mat.push(i, i + 1, upper);
      }
    }
    mat
  }

  pub fn nrows(&self) -> usize {
    self.nrows
  }
  pub fn ncols(&self) -> usize {
    self.ncols
  }
  pub fn triplets(&self) -> &[(usize, usize, f64)] {
    &self.triplets
  }

  pub fn push(&mut self, r: usize, c: usize, v: f64) {
    assert!(r < self.nrows() && c < self.ncols());
    if v != 0.0 {
      self.triplets.push((r, c, v));
    }
  }

  pub fn to_nalgebra_coo(&self) -> nas::CooMatrix<f64> {
    let mut coo = nas::CooMatrix::new(self.nrows, self.ncols);
    for &(r, c, v) in &self.triplets {
      coo.push(r, c, v);
    }
    coo
  }

  pub fn to_nalgebra_csr(&self) -> nas::CsrMatrix<f64> {
    (&self.to_nalgebra_coo()).into()
  }
}

/// $y <- y + alpha M x$
pub fn spmv_acc(mat: &nas::CsrMatrix<f64>, alpha: C64, x: &CVector, y: &mut CVector) {
  for (i, row) in mat.row_iter().enumerate() {
    let mut acc = C64::zero();
    for (&j, &v) in row.col_indices().iter().zip(row.values()) {
      acc += x[j] * v;
    }
    y[i] += alpha * acc;
  }
}

/// $M x$ for complex $x$.
pub fn spmv(mat: &nas::CsrMatrix<f64>, x: &CVector) -> CVector {
  let mut y = CVector::zeros(mat.nrows());
  spmv_acc(mat, C64::new(1.0, 0.0), x, &mut y);
  y
}

/// $M V$ column by column.
pub fn spmm(mat: &nas::CsrMatrix<f64>, v: &CMatrix) -> CMatrix {
  let mut out = CMatrix::zeros(mat.nrows(), v.ncols());
  for (j, col) in v.column_iter().enumerate() {
    let x = col.into_owned();
    out.set_column(j, &spmv(mat, &x));
  }
  out
}

/// Maximum absolute row sum.
pub fn norm_inf(mat: &nas::CsrMatrix<f64>) -> f64 {
  mat
    .row_iter()
    .map(|row| row.values().iter().map(|v| v.abs()).sum::<f64>())
    .fold(0.0, f64::max)
}
