use merlin::Transcript;
use num_bigint::BigUint;

use crate::group::{GroupParameters, Scalar};

/// Extra challenge bytes beyond the size of `q`, so that reducing the
/// challenge mod `q` is statistically uniform.
const CHALLENGE_SLACK_BYTES: usize = 16;

/// Fiat-Shamir helpers for the sigma protocols over `GroupParameters`.
pub trait TranscriptProtocol {
    /// Binds the public group description.
    fn append_group(&mut self, group: &GroupParameters);

    fn append_biguint(&mut self, label: &'static [u8], value: &BigUint);

    /// Derives a challenge scalar uniform in `[0, q)`.
    fn challenge_scalar(&mut self, label: &'static [u8], group: &GroupParameters) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn append_group(&mut self, group: &GroupParameters) {
        self.append_biguint(b"p", group.p());
        self.append_biguint(b"g", group.g());
        self.append_biguint(b"h", group.h());
    }

    fn append_biguint(&mut self, label: &'static [u8], value: &BigUint) {
        self.append_message(label, &value.to_bytes_be());
    }

    fn challenge_scalar(&mut self, label: &'static [u8], group: &GroupParameters) -> Scalar {
        let len = (group.q().bits() as usize + 7) / 8 + CHALLENGE_SLACK_BYTES;
        let mut bytes = vec![0u8; len];
        self.challenge_bytes(label, &mut bytes);
        BigUint::from_bytes_be(&bytes) % group.q()
    }
}
