use std::hint::black_box;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use nalgebra::DVector;
use ndarray::Array2;
use quantfolio::blend::posterior_returns;
use quantfolio::equilibrium::ViewSet;
use quantfolio::equilibrium::implied_returns;
use quantfolio::estimator::sample_covariance;
use quantfolio::factors::reduce;
use quantfolio::optimizer::optimize_weights;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

const N_ASSETS: usize = 8;
const N_PERIODS: usize = 252;

fn synthetic_returns() -> Array2<f64> {
  let mut rng = StdRng::seed_from_u64(1234);
  Array2::from_shape_fn((N_ASSETS, N_PERIODS), |_| (rng.gen::<f64>() - 0.5) * 0.02)
}

fn bench_estimation(c: &mut Criterion) {
  let returns = synthetic_returns();
  c.bench_function("covariance_and_projection", |b| {
    b.iter(|| {
      let cov = sample_covariance(black_box(&returns)).unwrap();
      let reduced = reduce(&returns.t().to_owned(), 0.95).unwrap();
      black_box((cov, reduced));
    })
  });
}

fn bench_blend_and_optimize(c: &mut Criterion) {
  let returns = synthetic_returns();
  let cov = sample_covariance(&returns).unwrap();
  let w_ref = DVector::from_element(N_ASSETS, 1.0 / N_ASSETS as f64);
  let pi = implied_returns(&cov, &w_ref, 3.0);
  let views = ViewSet::empty().padded(N_ASSETS).unwrap();

  c.bench_function("blend_and_optimize", |b| {
    b.iter(|| {
      let mu = posterior_returns(black_box(&pi), &cov, &views, 0.025).unwrap();
      let w = optimize_weights(&mu, &cov, 3.0, 0.05, 0.35).unwrap();
      black_box(w);
    })
  });
}

criterion_group!(benches, bench_estimation, bench_blend_and_optimize);
criterion_main!(benches);
