//! The monotonic AEAD nonce counter (Design Note: "Nonce discipline").
//!
//! Represented as an opaque value with only an `advance` operation so that a
//! session can never accidentally rewind or reuse a nonce with the same key.

use crate::crypto::AEAD_NONCEBYTES;

/// A monotonically increasing nonce counter. The 8-byte counter is expanded
/// to the AEAD's 24-byte nonce by left-padding with zeros, per §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(u64);

impl Nonce {
    /// Starts a counter at the given base value (2 for a host's read nonce
    /// and a client's write nonce, 1 for the opposite pairing -- see §3).
    pub fn starting_at(base: u64) -> Nonce {
        Nonce(base)
    }

    /// The current counter value, left-padded with zeros into a 24-byte
    /// nonce suitable for the AEAD interface.
    pub fn to_bytes(&self) -> [u8; AEAD_NONCEBYTES] {
        let mut out = [0u8; AEAD_NONCEBYTES];
        out[AEAD_NONCEBYTES - 8..].copy_from_slice(&self.0.to_be_bytes());
        out
    }

    /// Advances the counter by 2, reserving the low bit to disambiguate
    /// sender identity between the two directions sharing one session key.
    pub fn advance(&mut self) {
        self.0 = self.0.checked_add(2).expect("salt channel nonce counter exhausted");
    }

    /// The raw counter value, exposed for tests and invariant checks.
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn advances_by_two() {
        let mut n = Nonce::starting_at(1);
        assert_eq!(n.value(), 1);
        n.advance();
        assert_eq!(n.value(), 3);
        n.advance();
        assert_eq!(n.value(), 5);
    }

    #[test]
    fn pads_left_with_zeros() {
        let n = Nonce::starting_at(0x0102_0304_0506_0708);
        let bytes = n.to_bytes();
        assert_eq!(&bytes[..16], &[0u8; 16]);
        assert_eq!(&bytes[16..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn host_and_client_write_nonces_differ_in_parity() {
        let host_write = Nonce::starting_at(1);
        let client_write = Nonce::starting_at(2);
        assert_ne!(host_write.value() % 2, client_write.value() % 2);
    }
}
