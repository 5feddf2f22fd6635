use rand::{CryptoRng, RngCore};
use sha3::{Digest, Sha3_256};

use crate::config::ProtocolConfig;
use crate::error::{P4PError, Result};

/// Digest identifying one challenge matrix.
pub type ChallengeDigest = [u8; 32];

/// The shared `N x m` ternary matrix of one verification round.
///
/// Rows are stored contiguously; row `k` holds the challenge vector `c_k`.
/// Every coefficient is in `{-1, 0, 1}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeMatrix {
    iterations: usize,
    dimension: usize,
    coefficients: Vec<i8>,
}

impl ChallengeMatrix {
    /// Builds a matrix from explicit rows.
    ///
    /// # Errors
    /// * `InvalidArgument` if there are no rows, a row is empty, or a
    ///   coefficient is outside `{-1, 0, 1}`
    /// * `InvalidDimension` if the rows differ in length
    pub fn from_rows(rows: Vec<Vec<i8>>) -> Result<Self> {
        let iterations = rows.len();
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        if iterations == 0 || dimension == 0 {
            return Err(P4PError::InvalidArgument(
                "Challenge matrix must have at least one non-empty row".to_string(),
            ));
        }

        let mut coefficients = Vec::with_capacity(iterations * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(P4PError::InvalidDimension {
                    expected: dimension,
                    got: row.len(),
                });
            }
            if let Some(c) = row.iter().find(|c| !(-1..=1).contains(*c)) {
                return Err(P4PError::InvalidArgument(format!(
                    "Challenge coefficient {} is not in {{-1, 0, 1}}",
                    c
                )));
            }
            coefficients.extend(row);
        }

        Ok(Self {
            iterations,
            dimension,
            coefficients,
        })
    }

    /// Number of rows `N`.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of columns `m`.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Row `k`, or `None` past the last row.
    pub fn row(&self, k: usize) -> Option<&[i8]> {
        if k >= self.iterations {
            return None;
        }
        let start = k * self.dimension;
        Some(&self.coefficients[start..start + self.dimension])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i8]> + '_ {
        self.coefficients.chunks_exact(self.dimension)
    }

    /// SHA3-256 over the shape and the coefficients. Parties compare digests
    /// to confirm they hold the same matrix.
    pub fn digest(&self) -> ChallengeDigest {
        let mut hasher = Sha3_256::new();
        hasher.update(b"p4p-challenge-matrix");
        hasher.update((self.iterations as u64).to_le_bytes());
        hasher.update((self.dimension as u64).to_le_bytes());
        hasher.update(self.coefficients.iter().map(|&c| c as u8).collect::<Vec<u8>>());
        hasher.finalize().into()
    }

    /// Checks that the matrix fits a configuration.
    ///
    /// # Errors
    /// * `InvalidDimension` on a row-length or row-count mismatch
    pub fn check_shape(&self, iterations: usize, dimension: usize) -> Result<()> {
        if self.dimension != dimension {
            return Err(P4PError::InvalidDimension {
                expected: dimension,
                got: self.dimension,
            });
        }
        if self.iterations != iterations {
            return Err(P4PError::InvalidDimension {
                expected: iterations,
                got: self.iterations,
            });
        }
        Ok(())
    }
}

/// Samples challenge matrices for a fixed shape.
///
/// Each coefficient is `0` with probability 1/2 and `+1` or `-1` with
/// probability 1/4 each. Two bit-planes are drawn from the random source:
/// bit `idx = i * m + j` of the first decides zero/nonzero, the same bit of
/// the second decides the sign.
#[derive(Clone, Debug)]
pub struct ChallengeGenerator {
    iterations: usize,
    dimension: usize,
}

impl ChallengeGenerator {
    pub fn new(iterations: usize, dimension: usize) -> Result<Self> {
        if iterations == 0 || dimension == 0 {
            return Err(P4PError::InvalidArgument(format!(
                "Challenge matrix shape {}x{} is empty",
                iterations, dimension
            )));
        }
        Ok(Self {
            iterations,
            dimension,
        })
    }

    pub fn from_config(config: &ProtocolConfig) -> Result<Self> {
        Self::new(config.iterations, config.dimension)
    }

    /// Draws a fresh matrix. Must be called once per round; a matrix is never
    /// reused across rounds.
    pub fn generate<R: RngCore + CryptoRng>(&self, rng: &mut R) -> ChallengeMatrix {
        let total = self.iterations * self.dimension;
        let plane_len = (total + 7) / 8;

        let mut nonzero = vec![0u8; plane_len];
        let mut sign = vec![0u8; plane_len];
        rng.fill_bytes(&mut nonzero);
        rng.fill_bytes(&mut sign);

        let bit = |plane: &[u8], idx: usize| (plane[idx / 8] >> (idx % 8)) & 1 == 1;
        let coefficients = (0..total)
            .map(|idx| match (bit(&nonzero, idx), bit(&sign, idx)) {
                (false, _) => 0,
                (true, false) => 1,
                (true, true) => -1,
            })
            .collect();

        ChallengeMatrix {
            iterations: self.iterations,
            dimension: self.dimension,
            coefficients,
        }
    }
}
