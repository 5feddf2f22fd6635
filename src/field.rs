//! Arithmetic over the small prime field `Z_F` in centered representation.
//!
//! All user data and shares are stored as `i64` values in
//! `[-floor(F/2), ceil(F/2) - 1]`. Intermediate sums and inner products are
//! carried in `i128` so that they never overflow for `F < 2^62`.

use rand::{CryptoRng, Rng, RngCore};

use crate::error::{P4PError, Result};

/// Half-width of the integer range the unscaled vector in
/// [`random_vector_with_norm`] is drawn from.
const UNSCALED_RANGE: i64 = 10_000;

/// Reduces `x` into the centered residue range of `Z_F`.
///
/// # Arguments
/// * `x` - Any integer, including negative values
/// * `modulus` - The field modulus `F` (must be positive)
///
/// # Returns
/// * `i64` - The unique value in `[-floor(F/2), ceil(F/2) - 1]` congruent to `x`
#[inline]
pub fn centered_mod(x: i128, modulus: i64) -> i64 {
    debug_assert!(modulus > 0, "field modulus must be positive");
    let f = modulus as i128;
    let mut r = x.rem_euclid(f);
    if r >= (f + 1) / 2 {
        r -= f;
    }
    r as i64
}

/// Plain integer inner product, no modular reduction.
///
/// # Errors
/// * `InvalidDimension` if the vectors differ in length
pub fn inner_product<A, B>(a: &[A], b: &[B]) -> Result<i128>
where
    A: Copy + Into<i128>,
    B: Copy + Into<i128>,
{
    if a.len() != b.len() {
        return Err(P4PError::InvalidDimension {
            expected: a.len(),
            got: b.len(),
        });
    }

    Ok(a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.into() * y.into())
        .sum())
}

/// Elementwise `centered_mod(a_i + b_i, F)`.
pub fn vector_add(a: &[i64], b: &[i64], modulus: i64) -> Result<Vec<i64>> {
    if a.len() != b.len() {
        return Err(P4PError::InvalidDimension {
            expected: a.len(),
            got: b.len(),
        });
    }

    Ok(a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| centered_mod(x as i128 + y as i128, modulus))
        .collect())
}

/// Draws a single element uniformly from `Z_F`.
pub fn random_element<R: RngCore + CryptoRng>(modulus: i64, rng: &mut R) -> i64 {
    centered_mod(rng.gen_range(0..modulus) as i128, modulus)
}

/// Draws an `m`-dimensional vector uniformly from `Z_F^m`.
pub fn random_vector<R: RngCore + CryptoRng>(dimension: usize, modulus: i64, rng: &mut R) -> Vec<i64> {
    (0..dimension)
        .map(|_| random_element(modulus, rng))
        .collect()
}

/// Generates a random vector whose L2 norm is close to `target_l2`.
///
/// If `target_l2 <= 0` every coordinate is drawn uniformly from the field.
/// Otherwise an unscaled vector is drawn from `[-10000, 10000]^m` and each
/// coordinate is rescaled by `target_l2 / realized_norm`. Rounding is applied
/// to the magnitude and the sign is restored afterwards, so `x` and `-x`
/// always round to opposite values. The scaled coordinates are not reduced
/// into the field.
///
/// # Arguments
/// * `dimension` - Number of coordinates `m`
/// * `modulus` - Field modulus `F`, only used when `target_l2 <= 0`
/// * `target_l2` - Desired Euclidean norm
/// * `rng` - Cryptographically secure randomness
pub fn random_vector_with_norm<R: RngCore + CryptoRng>(
    dimension: usize,
    modulus: i64,
    target_l2: f64,
    rng: &mut R,
) -> Vec<i64> {
    if target_l2 <= 0.0 {
        return random_vector(dimension, modulus, rng);
    }

    let raw: Vec<i64> = (0..dimension)
        .map(|_| rng.gen_range(-UNSCALED_RANGE..=UNSCALED_RANGE))
        .collect();

    let realized = l2_norm(&raw);
    if realized == 0.0 {
        return raw;
    }

    let scale = target_l2 / realized;
    raw.into_iter()
        .map(|x| {
            let magnitude = ((x.unsigned_abs() as f64) * scale).round() as i64;
            if x < 0 {
                -magnitude
            } else {
                magnitude
            }
        })
        .collect()
}

/// Euclidean norm of an integer vector, computed in floating point.
pub fn l2_norm(v: &[i64]) -> f64 {
    v.iter()
        .map(|&x| (x as f64) * (x as f64))
        .sum::<f64>()
        .sqrt()
}

/// Largest absolute coordinate, 0 for an empty vector.
pub fn max_abs(v: &[i64]) -> u64 {
    v.iter().map(|x| x.unsigned_abs()).max().unwrap_or(0)
}

/// Maps field elements in `[-F/2, F/2)` linearly onto reals in `[-R, R]`.
pub fn to_real(v: &[i64], modulus: i64, range: f64) -> Vec<f64> {
    let alpha = 2.0 * range / modulus as f64;
    v.iter().map(|&x| x as f64 * alpha).collect()
}

/// Inverse of [`to_real`]: rounds each real to the nearest field element.
pub fn from_real(v: &[f64], modulus: i64, range: f64) -> Vec<i64> {
    let alpha = 2.0 * range / modulus as f64;
    v.iter()
        .map(|&x| centered_mod((x / alpha).round() as i128, modulus))
        .collect()
}

/// Deterministic Miller-Rabin test, exact for every `u64`.
pub fn is_prime_u64(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = pow_mod_u64(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..r - 1 {
            x = mul_mod_u64(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

#[inline]
fn mul_mod_u64(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod_u64(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod_u64(result, base, m);
        }
        base = mul_mod_u64(base, base, m);
        exp >>= 1;
    }
    result
}
