//! The crypto interface (§6, component C1): a thin facade over DH, signing,
//! AEAD, and hashing. The primitives themselves are an external collaborator
//! per spec's scope; this module only narrows them to what the engine needs
//! and wires up a default backend.
//!
//! [`CryptoProvider`] is the seam. [`Sodium`] is the only implementation
//! shipped here, backed by `sodiumoxide`, the same crypto dependency the
//! teacher crate used. A caller could supply a different backend (hardware
//! token, a different curve library) by implementing the trait themselves.

use sodiumoxide::crypto::{hash::sha512, scalarmult, secretbox, sign};
use sodiumoxide::randombytes::randombytes_into;

use crate::error::SaltError;

/// Length of an X25519 public or secret key.
pub const DH_PUBLICKEYBYTES: usize = 32;
/// Length of an X25519 secret key.
pub const DH_SECRETKEYBYTES: usize = 32;
/// Length of an Ed25519-style signing public key.
pub const SIGN_PUBLICKEYBYTES: usize = 32;
/// Length of an Ed25519-style signing secret key.
pub const SIGN_SECRETKEYBYTES: usize = 64;
/// Length of a detached Ed25519-style signature.
pub const SIGNATUREBYTES: usize = 64;
/// Length of a SHA-512 digest.
pub const HASHBYTES: usize = 64;
/// Length of an AEAD symmetric key.
pub const AEAD_KEYBYTES: usize = 32;
/// Length of the AEAD nonce (the 8-byte monotonic counter, left-padded).
pub const AEAD_NONCEBYTES: usize = 24;
/// Bytes of ciphertext overhead added by the AEAD (the authentication tag).
pub const AEAD_OVERHEAD: usize = 16;

/// The narrow set of cryptographic operations the engine depends on.
///
/// Every method operates on fixed-size arrays or caller-owned slices; the
/// engine itself never allocates to call into this trait. A `Provider`
/// implementation, being an external collaborator, may allocate internally
/// (the shipped [`Sodium`] backend does, via `sodiumoxide`'s high-level API)
/// -- that allocation is outside the engine's no-alloc boundary.
pub trait CryptoProvider {
    /// Generates a fresh X25519 keypair.
    fn dh_keypair(
        &self,
        pk: &mut [u8; DH_PUBLICKEYBYTES],
        sk: &mut [u8; DH_SECRETKEYBYTES],
    ) -> Result<(), SaltError>;

    /// Computes the raw X25519 shared secret `DH(sk, pk)`. Used directly as
    /// the Salt Channel session key, with no further key-derivation hash.
    fn dh(
        &self,
        shared: &mut [u8; DH_PUBLICKEYBYTES],
        pk: &[u8; DH_PUBLICKEYBYTES],
        sk: &[u8; DH_SECRETKEYBYTES],
    ) -> Result<(), SaltError>;

    /// Generates a fresh Ed25519-style signing keypair.
    fn sign_keypair(
        &self,
        pk: &mut [u8; SIGN_PUBLICKEYBYTES],
        sk: &mut [u8; SIGN_SECRETKEYBYTES],
    ) -> Result<(), SaltError>;

    /// Produces a detached signature over `msg` using `sk`.
    fn sign(
        &self,
        sig: &mut [u8; SIGNATUREBYTES],
        msg: &[u8],
        sk: &[u8; SIGN_SECRETKEYBYTES],
    ) -> Result<(), SaltError>;

    /// Verifies a detached signature over `msg` against `pk`.
    fn sign_verify_detached(
        &self,
        sig: &[u8; SIGNATUREBYTES],
        msg: &[u8],
        pk: &[u8; SIGN_PUBLICKEYBYTES],
    ) -> bool;

    /// In-place AEAD seal. `buf[..plaintext_len]` holds the plaintext on
    /// entry; on success, `buf[..plaintext_len + AEAD_OVERHEAD]` holds the
    /// ciphertext-with-tag, and the new length is returned. `buf` must be at
    /// least `plaintext_len + AEAD_OVERHEAD` bytes long.
    fn aead_encrypt(
        &self,
        buf: &mut [u8],
        plaintext_len: usize,
        key: &[u8; AEAD_KEYBYTES],
        nonce: &[u8; AEAD_NONCEBYTES],
    ) -> Result<usize, SaltError>;

    /// In-place AEAD open. `buf[..ciphertext_len]` holds the ciphertext-with-
    /// tag on entry; on success, `buf[..ciphertext_len - AEAD_OVERHEAD]` holds
    /// the recovered plaintext, and the new length is returned. Fails with
    /// [`SaltError::CryptoError`] if the tag does not verify.
    fn aead_decrypt(
        &self,
        buf: &mut [u8],
        ciphertext_len: usize,
        key: &[u8; AEAD_KEYBYTES],
        nonce: &[u8; AEAD_NONCEBYTES],
    ) -> Result<usize, SaltError>;

    /// Computes SHA-512 over `data`.
    fn hash_sha512(&self, out: &mut [u8; HASHBYTES], data: &[u8]);

    /// Fills `out` with cryptographically secure random bytes.
    fn random_bytes(&self, out: &mut [u8]);
}

/// The default crypto backend, implemented with `sodiumoxide`.
///
/// DH uses raw X25519 scalar multiplication (`crypto_scalarmult`), not
/// NaCl's `box_` construction, since Salt Channel uses the raw shared
/// secret directly as the session key rather than hashing it through
/// HSalsa20 first.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sodium;

impl CryptoProvider for Sodium {
    fn dh_keypair(
        &self,
        pk: &mut [u8; DH_PUBLICKEYBYTES],
        sk: &mut [u8; DH_SECRETKEYBYTES],
    ) -> Result<(), SaltError> {
        let mut secret = [0u8; DH_SECRETKEYBYTES];
        randombytes_into(&mut secret);
        let scalar = scalarmult::Scalar(secret);
        let group = scalarmult::scalarmult_base(&scalar).map_err(|_| SaltError::CryptoError)?;
        sk.copy_from_slice(&secret);
        pk.copy_from_slice(&group.0);
        Ok(())
    }

    fn dh(
        &self,
        shared: &mut [u8; DH_PUBLICKEYBYTES],
        pk: &[u8; DH_PUBLICKEYBYTES],
        sk: &[u8; DH_SECRETKEYBYTES],
    ) -> Result<(), SaltError> {
        let scalar = scalarmult::Scalar(*sk);
        let point = scalarmult::GroupElement(*pk);
        let out = scalarmult::scalarmult(&scalar, &point).map_err(|_| SaltError::CryptoError)?;
        shared.copy_from_slice(&out.0);
        Ok(())
    }

    fn sign_keypair(
        &self,
        pk: &mut [u8; SIGN_PUBLICKEYBYTES],
        sk: &mut [u8; SIGN_SECRETKEYBYTES],
    ) -> Result<(), SaltError> {
        let (sign::PublicKey(pub_bytes), sign::SecretKey(sec_bytes)) = sign::gen_keypair();
        pk.copy_from_slice(&pub_bytes);
        sk.copy_from_slice(&sec_bytes);
        Ok(())
    }

    fn sign(
        &self,
        sig: &mut [u8; SIGNATUREBYTES],
        msg: &[u8],
        sk: &[u8; SIGN_SECRETKEYBYTES],
    ) -> Result<(), SaltError> {
        let key = sign::SecretKey(*sk);
        let sign::Signature(bytes) = sign::sign_detached(msg, &key);
        sig.copy_from_slice(&bytes);
        Ok(())
    }

    fn sign_verify_detached(
        &self,
        sig: &[u8; SIGNATUREBYTES],
        msg: &[u8],
        pk: &[u8; SIGN_PUBLICKEYBYTES],
    ) -> bool {
        let signature = sign::Signature(*sig);
        let key = sign::PublicKey(*pk);
        sign::verify_detached(&signature, msg, &key)
    }

    fn aead_encrypt(
        &self,
        buf: &mut [u8],
        plaintext_len: usize,
        key: &[u8; AEAD_KEYBYTES],
        nonce: &[u8; AEAD_NONCEBYTES],
    ) -> Result<usize, SaltError> {
        let sealed = secretbox::seal(
            &buf[..plaintext_len],
            &secretbox::Nonce(*nonce),
            &secretbox::Key(*key),
        );
        let out_len = sealed.len();
        buf[..out_len].copy_from_slice(&sealed);
        Ok(out_len)
    }

    fn aead_decrypt(
        &self,
        buf: &mut [u8],
        ciphertext_len: usize,
        key: &[u8; AEAD_KEYBYTES],
        nonce: &[u8; AEAD_NONCEBYTES],
    ) -> Result<usize, SaltError> {
        let opened = secretbox::open(
            &buf[..ciphertext_len],
            &secretbox::Nonce(*nonce),
            &secretbox::Key(*key),
        )
        .map_err(|_| SaltError::CryptoError)?;
        let out_len = opened.len();
        buf[..out_len].copy_from_slice(&opened);
        Ok(out_len)
    }

    fn hash_sha512(&self, out: &mut [u8; HASHBYTES], data: &[u8]) {
        let sha512::Digest(digest) = sha512::hash(data);
        out.copy_from_slice(&digest);
    }

    fn random_bytes(&self, out: &mut [u8]) {
        randombytes_into(out);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dh_is_symmetric() {
        let crypto = Sodium;
        let mut a_pk = [0u8; DH_PUBLICKEYBYTES];
        let mut a_sk = [0u8; DH_SECRETKEYBYTES];
        let mut b_pk = [0u8; DH_PUBLICKEYBYTES];
        let mut b_sk = [0u8; DH_SECRETKEYBYTES];
        crypto.dh_keypair(&mut a_pk, &mut a_sk).unwrap();
        crypto.dh_keypair(&mut b_pk, &mut b_sk).unwrap();

        let mut shared_a = [0u8; DH_PUBLICKEYBYTES];
        let mut shared_b = [0u8; DH_PUBLICKEYBYTES];
        crypto.dh(&mut shared_a, &b_pk, &a_sk).unwrap();
        crypto.dh(&mut shared_b, &a_pk, &b_sk).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn sign_verify_round_trip() {
        let crypto = Sodium;
        let mut pk = [0u8; SIGN_PUBLICKEYBYTES];
        let mut sk = [0u8; SIGN_SECRETKEYBYTES];
        crypto.sign_keypair(&mut pk, &mut sk).unwrap();

        let mut sig = [0u8; SIGNATUREBYTES];
        crypto.sign(&mut sig, b"hello salt channel", &sk).unwrap();
        assert!(crypto.sign_verify_detached(&sig, b"hello salt channel", &pk));
        assert!(!crypto.sign_verify_detached(&sig, b"tampered", &pk));
    }

    #[test]
    fn aead_round_trip_and_tamper_detection() {
        let crypto = Sodium;
        let key = [7u8; AEAD_KEYBYTES];
        let nonce = [9u8; AEAD_NONCEBYTES];

        let mut buf = [0u8; 64];
        let plaintext = b"ping";
        buf[..plaintext.len()].copy_from_slice(plaintext);
        let ct_len = crypto.aead_encrypt(&mut buf, plaintext.len(), &key, &nonce).unwrap();
        assert_eq!(ct_len, plaintext.len() + AEAD_OVERHEAD);

        let mut decrypt_buf = buf;
        let pt_len = crypto.aead_decrypt(&mut decrypt_buf, ct_len, &key, &nonce).unwrap();
        assert_eq!(&decrypt_buf[..pt_len], plaintext);

        let mut tampered = buf;
        tampered[0] ^= 0xff;
        assert!(crypto.aead_decrypt(&mut tampered, ct_len, &key, &nonce).is_err());
    }
}
