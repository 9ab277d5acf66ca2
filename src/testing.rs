//! Seeded synthetic datasets shared by the unit tests.
use crate::data::{Dataset, FeatureVector, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Gaussian blobs in two dimensions, one per class, centres `spread` apart on
/// each axis. Classes alternate.
pub fn make_blobs(n: usize, n_classes: usize, spread: f64, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = (0..n)
        .map(|i| {
            let label = (i % n_classes) as f64;
            let x = [label * spread + normal(&mut rng), label * spread + normal(&mut rng)];
            Record::new(FeatureVector::from_dense(&x).unwrap(), label)
        })
        .collect();
    Dataset::new(records)
}

/// Overlapping blobs.
pub fn make_multiclass(n: usize, n_classes: usize, seed: u64) -> Dataset {
    make_blobs(n, n_classes, 1.5, seed)
}

pub fn make_classification(n: usize, seed: u64) -> Dataset {
    make_multiclass(n, 2, seed)
}

/// `y = 2 x0 + x1 + noise`, noise standard deviation growing with `x1`.
pub fn make_regression(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = (0..n)
        .map(|_| {
            let x = [rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)];
            let y = 2.0 * x[0] + x[1] + (0.5 + 0.2 * x[1]) * normal(&mut rng);
            Record::new(FeatureVector::from_dense(&x).unwrap(), y)
        })
        .collect();
    Dataset::new(records)
}
