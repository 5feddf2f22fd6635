//! Static protocol parameters shared by the prover, the privacy peer and the
//! server. A configuration is built once, validated, and then only read.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{P4PError, Result};
use crate::field::is_prime_u64;
use crate::group::GroupParameters;

/// Largest field modulus accepted. Keeps every pairwise sum and every
/// `{-1,0,1}`-weighted inner product of field elements inside `i128`.
pub const MAX_FIELD_MODULUS: i64 = 1 << 62;

/// Parameters of one aggregation deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Dimension `m` of every user vector
    pub dimension: usize,
    /// Prime modulus `F` of the small field
    pub field_modulus: i64,
    /// Bit length `l` of the norm bound, `L = 2^{l-1}`
    pub norm_bits: u32,
    /// Number of checksum iterations `N` in the norm proof
    pub iterations: usize,
    /// Bit length of the safe prime used when a group is generated
    pub group_bits: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            dimension: 10,
            field_modulus: 4_611_686_018_427_387_847, // 2^62 - 57
            norm_bits: 40,
            iterations: 50,
            group_bits: 2048,
        }
    }
}

impl ProtocolConfig {
    pub fn new(dimension: usize, field_modulus: i64, norm_bits: u32, iterations: usize) -> Result<Self> {
        let config = Self {
            dimension,
            field_modulus,
            norm_bits,
            iterations,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every static constraint on the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.dimension < 1 {
            return Err(P4PError::Configuration(
                "Vector dimension must be at least 1".to_string(),
            ));
        }
        if self.field_modulus < 2 || self.field_modulus >= MAX_FIELD_MODULUS {
            return Err(P4PError::Configuration(format!(
                "Field modulus {} must lie in [2, 2^62)",
                self.field_modulus
            )));
        }
        if !is_prime_u64(self.field_modulus as u64) {
            return Err(P4PError::Configuration(format!(
                "Field modulus {} is not prime",
                self.field_modulus
            )));
        }
        if self.norm_bits < 1 || self.norm_bits > 62 {
            return Err(P4PError::Configuration(format!(
                "Norm bound bit length {} must lie in [1, 62]",
                self.norm_bits
            )));
        }
        if self.iterations < 1 {
            return Err(P4PError::Configuration(
                "At least one checksum iteration is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The public norm bound `L = 2^{l-1}`.
    pub fn norm_bound(&self) -> u64 {
        1u64 << (self.norm_bits - 1)
    }

    /// Largest number of bit proofs a valid proof may carry:
    /// `ceil(log2 N) + 2l`.
    pub fn max_bit_count(&self) -> usize {
        ceil_log2(self.iterations) + 2 * self.norm_bits as usize
    }
}

fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// A validated configuration paired with the group it runs in.
#[derive(Clone, Debug)]
pub struct ProtocolContext {
    config: ProtocolConfig,
    group: GroupParameters,
}

impl ProtocolContext {
    /// # Errors
    /// * `Configuration` if the config is invalid, or if the group order is
    ///   too small to hold any `2 * sum(s_k^2)` a prover can commit to
    pub fn new(config: ProtocolConfig, group: GroupParameters) -> Result<Self> {
        config.validate()?;

        // The server only pins |s_k| <= 2F, so 2 * sum(s_k^2) <= 8 * N * F^2.
        let f = BigUint::from(config.field_modulus as u64);
        let reachable = BigUint::from(8 * config.iterations as u64) * &f * &f;
        let needed = (config.max_bit_count() as u64 + 1).max(reachable.bits());
        if group.q().bits() <= needed {
            return Err(P4PError::Configuration(format!(
                "Group order has {} bits, need more than {}",
                group.q().bits(),
                needed
            )));
        }

        Ok(Self { config, group })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn group(&self) -> &GroupParameters {
        &self.group
    }

    pub fn field_modulus(&self) -> i64 {
        self.config.field_modulus
    }

    /// `F` as a group exponent.
    pub(crate) fn field_modulus_scalar(&self) -> BigUint {
        BigUint::from(self.config.field_modulus as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.norm_bound(), 1u64 << 39);
        assert_eq!(config.max_bit_count(), 6 + 80);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            ProtocolConfig::new(4, 91, 5, 8),
            Err(P4PError::Configuration(_))
        ));
        assert!(matches!(
            ProtocolConfig::new(4, -97, 5, 8),
            Err(P4PError::Configuration(_))
        ));
        assert!(matches!(
            ProtocolConfig::new(0, 97, 5, 8),
            Err(P4PError::Configuration(_))
        ));
        assert!(matches!(
            ProtocolConfig::new(4, 97, 0, 8),
            Err(P4PError::Configuration(_))
        ));
        assert!(matches!(
            ProtocolConfig::new(4, 97, 5, 0),
            Err(P4PError::Configuration(_))
        ));
    }

    #[test]
    fn test_bit_bound() {
        let config = ProtocolConfig::new(4, 97, 5, 8).unwrap();
        assert_eq!(config.norm_bound(), 16);
        assert_eq!(config.max_bit_count(), 13);

        let config = ProtocolConfig::new(4, 97, 5, 9).unwrap();
        assert_eq!(config.max_bit_count(), 14);

        let config = ProtocolConfig::new(4, 97, 5, 1).unwrap();
        assert_eq!(config.max_bit_count(), 10);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "dimension": 16,
            "field_modulus": 1000003,
            "norm_bits": 12,
            "iterations": 40,
            "group_bits": 512
        }"#;
        let config: ProtocolConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.dimension, 16);
        assert_eq!(config.group_bits, 512);
    }
}
