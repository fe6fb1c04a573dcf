//! Delay PDE eigenproblem
//! $u_t = u_(x x) + a u + b(x) u(t - tau)$ on $(0, pi)$ with Dirichlet
//! boundary, leading to $T(lambda) = -lambda I + A + e^(-tau lambda) B$.
//!
//! Flags: `-n/--n <usize>`, `--tau <f64>`, `--initv`, `--terse`.

use narnoldi::{
  lse::{KrylovConfig, LinearSolverConfig, PreconditionerKind},
  report,
  sparse::SparseMatrix,
  store::ErrorKind,
  CVector, NArnoldi, NArnoldiConfig, ScalarFunction, SplitOperator, C64,
};

use clap::Parser;
use std::f64::consts::PI;

/// Delay PDE eigenproblem solved by nonlinear Arnoldi.
#[derive(Parser, Debug)]
#[clap(name = "delay")]
struct Args {
  /// Number of interior grid points.
  #[clap(short, long, default_value_t = 128)]
  n: usize,
  /// Delay parameter.
  #[clap(long, default_value_t = 0.001)]
  tau: f64,
  /// Start from $sin(4 pi i / n)$ instead of a random vector.
  #[clap(long)]
  initv: bool,
  /// Print only the eigenvalues.
  #[clap(long)]
  terse: bool,
}

fn main() {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let Args { n, tau, .. } = args;
  if n == 0 {
    eprintln!("n must be positive");
    std::process::exit(1);
  }

  println!("\nDelay PDE eigenproblem, n={n}, tau={tau}\n");

  let a = 20.0;
  let h = PI / (n + 1) as f64;
  let xn = 1.0 / (h * h);
  let mat_a = SparseMatrix::tridiagonal(n, xn, -2.0 * xn + a, xn).to_nalgebra_csr();
  let mat_id = SparseMatrix::identity(n).to_nalgebra_csr();
  let b: Vec<f64> = (0..n)
    .map(|i| {
      let x = (i + 1) as f64 * h;
      -4.1 + x * (1.0 - (x - PI).exp())
    })
    .collect();
  let mat_b = SparseMatrix::from_diagonal(&b).to_nalgebra_csr();

  let op = SplitOperator::new(vec![
    (&mat_id, ScalarFunction::neg_identity()),
    (&mat_a, ScalarFunction::one()),
    (&mat_b, ScalarFunction::exp_delay(tau)),
  ])
  .unwrap();

  let initial_space = if args.initv {
    vec![CVector::from_fn(n, |i, _| {
      C64::new((4.0 * PI * i as f64 / n as f64).sin(), 0.0)
    })]
  } else {
    Vec::new()
  };

  let config = NArnoldiConfig {
    initial_space,
    linear: LinearSolverConfig::Krylov(KrylovConfig {
      preconditioner: PreconditionerKind::BlockJacobi { block_size: 16 },
      ..Default::default()
    }),
    ..Default::default()
  };
  let solver = NArnoldi::new(&op, &config).unwrap();

  println!(" Number of requested eigenvalues: {}", config.nev);
  println!(" Linear solver refresh lag: {}\n", config.lag);

  let solution = solver.solve();
  if args.terse {
    print!("{}", report::terse(&solution, config.nev));
  } else {
    print!("{}", report::detailed(&solution, ErrorKind::Relative, true));
  }
}
