//! Privacy-preserving learning primitives.
//!
//! - Differential privacy: Laplace mechanism over the aggregated weights
//! - Secure aggregation: pairwise additive masks that cancel in the sum
//!
//! All functions take the random source explicitly so rounds are reproducible
//! under a seeded generator.

use rand::Rng;

/// L1 sensitivity assumed for normalized weights.
pub const SENSITIVITY: f64 = 1.0;
/// Masks are drawn uniformly from `[-MASK_SCALE, MASK_SCALE)`.
pub const MASK_SCALE: f64 = 0.01;

/// Draws one sample from Laplace(0, scale) via the inverse CDF.
pub fn laplace_noise<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen::<f64>() - 0.5;
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}

/// Adds Laplace noise calibrated to `SENSITIVITY / epsilon` to every dimension.
/// Returns the privacy budget consumed by this release.
pub fn apply_differential_privacy<R: Rng + ?Sized>(weights: &mut [f32], epsilon: f64, rng: &mut R) -> f64 {
    if epsilon <= 0.0 { return 0.0; }
    let scale = SENSITIVITY / epsilon;
    for w in weights.iter_mut() { *w = (*w as f64 + laplace_noise(rng, scale)) as f32; }
    1.0 / epsilon
}

/// Masks every pair (i, j), i < j: contributor i gains the mask and j loses it.
/// The per-dimension sum over all vectors is unchanged.
pub fn pairwise_masks<R: Rng + ?Sized>(vectors: &mut [Vec<f64>], rng: &mut R) {
    let n = vectors.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (head, tail) = vectors.split_at_mut(j);
            let (vi, vj) = (&mut head[i], &mut tail[0]);
            for (a, b) in vi.iter_mut().zip(vj.iter_mut()) {
                let mask = rng.gen_range(-MASK_SCALE..MASK_SCALE);
                *a += mask;
                *b -= mask;
            }
        }
    }
}
