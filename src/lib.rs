//! Nonlinear Arnoldi eigensolver for split-form nonlinear eigenproblems
//!
//! Finds eigenpairs $(lambda, u)$ of $T(lambda) u = 0$ with
//! $T(lambda) = sum_k f_k(lambda) M_k$, where the $M_k$ are sparse matrices
//! and the $f_k$ scalar analytic functions.

extern crate nalgebra as na;
extern crate nalgebra_sparse as nas;

pub mod error;
pub mod evp;
pub mod function;
pub mod lse;
pub mod projected;
pub mod report;
pub mod sparse;
pub mod split;
pub mod store;
pub mod subspace;

pub use error::NepError;
pub use evp::{NArnoldi, NArnoldiConfig, NepSolution, SolveStatus};
pub use function::ScalarFunction;
pub use split::SplitOperator;
pub use store::{Eigenpair, EigenpairStore};

pub type C64 = na::Complex<f64>;
pub type CVector = na::DVector<C64>;
pub type CMatrix = na::DMatrix<C64>;
