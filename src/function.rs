//! Scalar functions $f(lambda)$ of the split form.

use crate::{error::NepError, C64};

use num_traits::Zero;

/// Analytic scalar function together with its derivative.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarFunction {
  Constant(C64),
  /// $p(lambda) / q(lambda)$ with coefficients in ascending order.
  /// An empty denominator stands for $q = 1$.
  Rational {
    numerator: Vec<C64>,
    denominator: Vec<C64>,
  },
  /// $exp(a lambda + b)$
  Exp { scale_linear: C64, scale_const: C64 },
}

impl ScalarFunction {
  pub fn constant(value: f64) -> Self {
    Self::Constant(C64::new(value, 0.0))
  }
  pub fn one() -> Self {
    Self::constant(1.0)
  }
  pub fn polynomial(coeffs: &[f64]) -> Self {
    Self::rational(coeffs, &[])
  }
  pub fn rational(numerator: &[f64], denominator: &[f64]) -> Self {
    Self::Rational {
      numerator: numerator.iter().map(|&c| C64::new(c, 0.0)).collect(),
      denominator: denominator.iter().map(|&c| C64::new(c, 0.0)).collect(),
    }
  }
  /// $f(lambda) = -lambda$
  pub fn neg_identity() -> Self {
    Self::polynomial(&[0.0, -1.0])
  }
  pub fn exp(scale_linear: f64, scale_const: f64) -> Self {
    Self::Exp {
      scale_linear: C64::new(scale_linear, 0.0),
      scale_const: C64::new(scale_const, 0.0),
    }
  }
  /// Delay kernel $f(lambda) = exp(-tau lambda)$.
  pub fn exp_delay(tau: f64) -> Self {
    Self::exp(-tau, 0.0)
  }

  /// Returns $(f(lambda), f'(lambda))$.
  pub fn eval(&self, lambda: C64) -> Result<(C64, C64), NepError> {
    let (value, derivative) = match self {
      Self::Constant(c) => (*c, C64::zero()),
      Self::Rational {
        numerator,
        denominator,
      } => {
        let (p, dp) = horner(numerator, lambda);
        if denominator.is_empty() {
          (p, dp)
        } else {
          let (q, dq) = horner(denominator, lambda);
          if q.is_zero() {
            return Err(NepError::EvaluationFailure { lambda });
          }
          (p / q, (dp * q - p * dq) / (q * q))
        }
      }
      Self::Exp {
        scale_linear,
        scale_const,
      } => {
        let e = (scale_linear * lambda + scale_const).exp();
        (e, scale_linear * e)
      }
    };

    if is_finite(value) && is_finite(derivative) {
      Ok((value, derivative))
    } else {
      Err(NepError::EvaluationFailure { lambda })
    }
  }

  pub fn value(&self, lambda: C64) -> Result<C64, NepError> {
    self.eval(lambda).map(|(v, _)| v)
  }
  pub fn derivative(&self, lambda: C64) -> Result<C64, NepError> {
    self.eval(lambda).map(|(_, d)| d)
  }

  /// Real coefficients imply $f(overline(lambda)) = overline(f(lambda))$.
  pub fn is_real(&self) -> bool {
    match self {
      Self::Constant(c) => c.im == 0.0,
      Self::Rational {
        numerator,
        denominator,
      } => numerator.iter().chain(denominator).all(|c| c.im == 0.0),
      Self::Exp {
        scale_linear,
        scale_const,
      } => scale_linear.im == 0.0 && scale_const.im == 0.0,
    }
  }
}

/// Polynomial value and derivative by Horner's scheme.
fn horner(coeffs: &[C64], x: C64) -> (C64, C64) {
  let mut p = C64::zero();
  let mut dp = C64::zero();
  for &c in coeffs.iter().rev() {
    dp = dp * x + p;
    p = p * x + c;
  }
  (p, dp)
}

pub(crate) fn is_finite(z: C64) -> bool {
  z.re.is_finite() && z.im.is_finite()
}
